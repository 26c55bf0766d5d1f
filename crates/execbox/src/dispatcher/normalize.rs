//! Result normalization
//!
//! Folds the strategy-specific [`ExecutionOutcome`] and every dispatch-level
//! error into the one public [`ExecutionResult`] shape.

use crate::dispatcher::ExecuteError;
use crate::types::{ExecutionOutcome, ExecutionResult, ExitSignal, FailureKind};

/// Build the result for a strategy run
///
/// `language_name` only feeds the message for a runtime that could not be
/// launched.
pub fn normalize(
    outcome: ExecutionOutcome,
    files_created: Vec<String>,
    language_name: &str,
) -> ExecutionResult {
    let ExecutionOutcome {
        success,
        stdout,
        stderr,
        exit,
        fault,
    } = outcome;

    let (success, error, failure) = match exit {
        ExitSignal::Timeout(limit) => (
            false,
            format!("Code execution timed out after {}s", limit.as_secs_f64()),
            Some(FailureKind::Timeout),
        ),
        ExitSignal::LaunchFailure(program) => (
            false,
            format!("Runtime '{program}' not found. {language_name} execution not supported."),
            Some(FailureKind::RuntimeUnavailable),
        ),
        ExitSignal::InternalError(message) => (
            false,
            format!("Execution failed: {message}"),
            Some(FailureKind::InternalDispatchError),
        ),
        ExitSignal::Normal(_) if fault.is_some() => (
            false,
            fault.map(|fault| fault.to_string()).unwrap_or_default(),
            Some(FailureKind::RuntimeFault),
        ),
        ExitSignal::Normal(_) if success => (true, stderr, None),
        ExitSignal::Normal(code) => {
            let error = if stderr.is_empty() {
                format!("Process exited with code {code}")
            } else {
                stderr
            };
            // A zero exit can only fail here when the embedded run wrote to
            // its error channel
            let kind = if code == 0 {
                FailureKind::ErrorOutput
            } else {
                FailureKind::NonZeroExit
            };
            (false, error, Some(kind))
        }
    };

    ExecutionResult {
        success,
        output: stdout,
        error,
        execution_time: 0.0,
        files_created,
        failure,
    }
}

/// Build the result for a request that never reached a strategy
pub fn failure(err: &ExecuteError) -> ExecutionResult {
    let kind = err.kind();
    let error = match kind {
        FailureKind::InternalDispatchError => format!("Execution failed: {err}"),
        _ => err.to_string(),
    };
    ExecutionResult {
        success: false,
        error,
        failure: Some(kind),
        ..Default::default()
    }
}
