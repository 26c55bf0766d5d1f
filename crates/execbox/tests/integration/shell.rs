use std::time::{Duration, Instant};

use execbox::{Dispatcher, ExecutionRequest, FailureKind};

use super::{fixture_config, fixture_project, sources};

#[tokio::test]
async fn test_sourced_library() {
    let dispatcher = Dispatcher::with_defaults();
    let request = ExecutionRequest::new(fixture_project("bash_lib"), "bash", "main");

    let result = dispatcher.execute(request).await;
    assert!(result.success, "{}", result.error);
    assert_eq!(result.output, "hello, world\n");
    assert_eq!(result.files_created, vec!["lib.sh", "main.sh"]);
}

#[tokio::test]
async fn test_denied_token_in_entry_file() {
    let dispatcher = Dispatcher::with_defaults();
    let request = ExecutionRequest::single("rm -rf /", "bash");

    let result = dispatcher.execute(request).await;
    assert!(!result.success);
    assert_eq!(result.failure, Some(FailureKind::DeniedCommand));
    assert_eq!(
        result.error,
        "Command 'rm' in file 'main' is not allowed for security reasons"
    );
    assert!(result.files_created.is_empty());
    assert!(result.output.is_empty());
}

#[tokio::test]
async fn test_denied_token_in_sibling_file() {
    let dispatcher = Dispatcher::with_defaults();
    let files = sources(&[
        ("main.sh", "source ./net.sh\n"),
        ("net.sh", "CURL -s example.org\n"),
    ]);

    let result = dispatcher
        .execute(ExecutionRequest::new(files, "bash", "main"))
        .await;
    assert!(!result.success);
    assert_eq!(
        result.error,
        "Command 'curl' in file 'net.sh' is not allowed for security reasons"
    );
}

#[tokio::test]
async fn test_non_zero_exit() {
    let dispatcher = Dispatcher::with_defaults();
    let result = dispatcher
        .execute_source("echo partial\necho oops >&2\nexit 3", "bash")
        .await;

    assert!(!result.success);
    assert_eq!(result.failure, Some(FailureKind::NonZeroExit));
    assert_eq!(result.output, "partial\n");
    assert_eq!(result.error, "oops\n");
}

#[tokio::test]
async fn test_silent_non_zero_exit() {
    let dispatcher = Dispatcher::with_defaults();
    let result = dispatcher.execute_source("exit 4", "sh").await;

    assert!(!result.success);
    assert_eq!(result.error, "Process exited with code 4");
}

#[tokio::test]
async fn test_stderr_on_zero_exit_succeeds() {
    let dispatcher = Dispatcher::with_defaults();
    let result = dispatcher
        .execute_source("echo note >&2\necho ok", "bash")
        .await;

    assert!(result.success, "{}", result.error);
    assert_eq!(result.output, "ok\n");
    assert_eq!(result.error, "note\n");
}

#[tokio::test]
async fn test_timeout_is_bounded() {
    let dispatcher = Dispatcher::new(fixture_config("short_timeout.toml"));

    let start = Instant::now();
    let result = dispatcher
        .execute_source("echo started\nsleep 30\necho never", "bash")
        .await;
    let elapsed = start.elapsed();

    assert!(!result.success);
    assert_eq!(result.failure, Some(FailureKind::Timeout));
    assert_eq!(result.error, "Code execution timed out after 0.5s");
    assert!(elapsed < Duration::from_secs(5), "took {elapsed:?}");
    assert!(result.execution_time >= 0.5);
}

#[tokio::test]
async fn test_runs_inside_workspace() {
    let dispatcher = Dispatcher::with_defaults();
    let files = sources(&[("main.sh", "ls\n"), ("data.txt", "payload\n")]);

    let result = dispatcher
        .execute(ExecutionRequest::new(files, "bash", "main"))
        .await;
    assert!(result.success, "{}", result.error);
    assert_eq!(result.output, "data.txt.sh\nmain.sh\n");
}
