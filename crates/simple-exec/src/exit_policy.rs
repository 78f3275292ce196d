//! Exit-code policy
//!
//! Zero is success and everything else is an [`ExitCodeFailure`], unless a
//! caller-supplied handler accepts the code.

use crate::error::ExitCodeFailure;
use crate::executor::RunOutcome;

/// Predicate deciding whether an exit code is acceptable
///
/// Returning true accepts the code whatever its value, zero included.
pub type ExitCodeHandler = dyn Fn(i32) -> bool + Send + Sync;

/// Decide whether `exit_code` is a success
pub fn evaluate(exit_code: i32, handler: Option<&ExitCodeHandler>) -> Result<(), ExitCodeFailure> {
    if handler.is_some_and(|accept| accept(exit_code)) || exit_code == 0 {
        Ok(())
    } else {
        Err(ExitCodeFailure::new(exit_code))
    }
}

/// Like [`evaluate`], attaching any captured output to the failure
pub fn evaluate_outcome(
    outcome: &RunOutcome,
    handler: Option<&ExitCodeHandler>,
) -> Result<(), ExitCodeFailure> {
    evaluate(outcome.exit_code, handler).map_err(|failure| {
        if outcome.stdout.is_none() && outcome.stderr.is_none() {
            return failure;
        }
        failure.with_output(
            outcome.stdout.as_deref().unwrap_or_default(),
            outcome.stderr.as_deref().unwrap_or_default(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        assert!(evaluate(0, None).is_ok());
        for code in [1, 2, 127, -1, 255] {
            assert_eq!(evaluate(code, None).unwrap_err().exit_code, code);
        }
    }

    #[test]
    fn test_handler_accepts_nonzero() {
        let linter: &ExitCodeHandler = &|code| code == 1;

        assert!(evaluate(0, Some(linter)).is_ok());
        assert!(evaluate(1, Some(linter)).is_ok());
        assert_eq!(evaluate(2, Some(linter)).unwrap_err().exit_code, 2);
    }

    #[test]
    fn test_handler_rejecting_zero_still_succeeds() {
        let nothing: &ExitCodeHandler = &|_| false;
        assert!(evaluate(0, Some(nothing)).is_ok());
    }

    #[test]
    fn test_outcome_failure_carries_output() {
        let outcome = RunOutcome {
            exit_code: 1,
            stdout: Some("partial".into()),
            stderr: Some("boom".into()),
        };
        let failure = evaluate_outcome(&outcome, None).unwrap_err();
        let output = failure.output.unwrap();

        assert_eq!(output.stdout, "partial");
        assert_eq!(output.stderr, "boom");
    }

    #[test]
    fn test_outcome_without_capture() {
        let outcome = RunOutcome {
            exit_code: 5,
            stdout: None,
            stderr: None,
        };
        assert_eq!(evaluate_outcome(&outcome, None).unwrap_err(), ExitCodeFailure::new(5));
    }
}
