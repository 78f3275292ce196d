//! Tests for running commands with inherited streams

mod common;

use common::tester_command;
use simple_exec::{CancellationToken, Command, Error, Executor, LaunchSpec};

#[test]
fn test_running_a_succeeding_command() {
    futures::executor::block_on(async {
        tester_command(["hello", "world"]).run().await.unwrap();
    });
}

#[test]
fn test_running_a_failing_command() {
    futures::executor::block_on(async {
        let err = tester_command(["error", "hello", "world"])
            .run()
            .await
            .unwrap_err();

        assert_eq!(err.exit_code(), Some(1));
        assert!(err.to_string().contains("code 1"), "message: {err}");
    });
}

#[test]
fn test_run_blocking() {
    tester_command(["hello"]).run_blocking().unwrap();

    let err = tester_command(["7"]).run_blocking().unwrap_err();
    assert_eq!(err.exit_code(), Some(7));
}

#[cfg(unix)]
#[test]
fn test_run_forwards_stdin() {
    futures::executor::block_on(async {
        let check = |input: &str| {
            Command::new("sh")
                .args(["-c", r#"read line; test "$line" = "from run""#])
                .stdin(input)
                .no_echo()
                .timeout(std::time::Duration::from_secs(5))
        };

        check("from run\n").run().await.unwrap();
        let err = check("something else\n").run().await.unwrap_err();
        assert_eq!(err.exit_code(), Some(1));
    });
}

#[test]
fn test_command_with_env_vars() {
    futures::executor::block_on(async {
        let output = tester_command(["environment"])
            .env("foo", "bar")
            .read()
            .await
            .unwrap();

        assert!(output.stdout.contains("foo=bar"), "stdout: {}", output.stdout);
    });
}

#[test]
fn test_removed_env_var_is_not_inherited() {
    futures::executor::block_on(async {
        let output = tester_command(["environment"])
            .env("foo", "bar")
            .env_remove("foo")
            .read()
            .await
            .unwrap();

        assert!(output.stdout.contains("foo=\n"), "stdout: {}", output.stdout);
    });
}

#[test]
fn test_working_directory() {
    futures::executor::block_on(async {
        let dir = tempfile::tempdir().unwrap();
        let cwd = dir.path().canonicalize().unwrap();

        let output = Command::new(if cfg!(windows) { "cmd" } else { "pwd" })
            .args(if cfg!(windows) { vec!["/C", "cd"] } else { vec![] })
            .current_dir(&cwd)
            .no_echo()
            .read()
            .await
            .unwrap();

        let reported = std::path::PathBuf::from(output.stdout.trim());
        assert_eq!(reported.canonicalize().unwrap(), cwd);
    });
}

#[test]
fn test_command_not_found() {
    futures::executor::block_on(async {
        let err = Command::new("this_command_does_not_exist_12345")
            .no_echo()
            .run()
            .await
            .unwrap_err();

        assert!(err.is_not_found(), "unexpected error: {err}");
        match err {
            Error::LaunchFailed { program, source } => {
                assert_eq!(program, "this_command_does_not_exist_12345");
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("expected launch failure, got {other}"),
        }
    });
}

#[test]
fn test_blank_program_is_rejected() {
    futures::executor::block_on(async {
        for program in ["", "   "] {
            let err = Command::new(program).no_echo().run().await.unwrap_err();
            match err {
                Error::InvalidArgument { parameter, .. } => assert_eq!(parameter, "program"),
                other => panic!("expected invalid argument, got {other}"),
            }
        }
    });
}

#[test]
fn test_executor_exit_code_propagation() {
    futures::executor::block_on(async {
        let spec = LaunchSpec::builder(common::tester()).arg("42").build();
        let outcome = Executor::default()
            .no_echo()
            .execute(&spec, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.exit_code, 42);
        assert_eq!(outcome.stdout, None);
        assert_eq!(outcome.stderr, None);
    });
}

#[test]
fn test_spec_can_be_reused() {
    futures::executor::block_on(async {
        let executor = Executor::default().no_echo();
        let spec = LaunchSpec::builder(common::tester()).arg("3").build();

        for _ in 0..3 {
            let outcome = executor
                .execute(&spec, &CancellationToken::new())
                .await
                .unwrap();
            assert_eq!(outcome.exit_code, 3);
        }
    });
}
