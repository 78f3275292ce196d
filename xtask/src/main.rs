mod targets;

use clap::{Parser, ValueEnum};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use targets::Target;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Development task runner for simple-exec")]
struct Args {
    /// Targets to run, with their dependencies
    #[arg(value_enum, default_value = "default")]
    targets: Vec<Target>,

    /// Label written before echoed commands
    #[arg(long, env = "SIMPLE_EXEC_ECHO_PREFIX", default_value = "xtask")]
    echo_prefix: String,

    /// Print the targets that would run without running them
    #[arg(long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let plan = targets::plan(&args.targets);

    if args.dry_run {
        for target in &plan {
            if let Some(value) = target.to_possible_value() {
                println!("{}", value.get_name());
            }
        }
        return ExitCode::SUCCESS;
    }

    let result = smol::block_on(targets::run(&plan, &args.echo_prefix));
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("xtask: {err:#}");
            exit_code_for(&err)
        }
    }
}

/// Mirror a failing child's exit code, or fail with 1
fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    err.downcast_ref::<simple_exec::Error>()
        .and_then(simple_exec::Error::exit_code)
        .and_then(|code| u8::try_from(code).ok())
        .filter(|&code| code != 0)
        .map_or(ExitCode::FAILURE, ExitCode::from)
}
