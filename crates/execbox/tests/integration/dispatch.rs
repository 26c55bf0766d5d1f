use execbox::{Dispatcher, ExecutionRequest, FailureKind, SourceFiles};
use tokio::task::JoinSet;

use super::sources;

#[tokio::test]
async fn test_unsupported_language() {
    let dispatcher = Dispatcher::with_defaults();
    let request = ExecutionRequest::single("puts 1", "ruby");

    let result = dispatcher.execute(request).await;
    assert!(!result.success);
    assert_eq!(result.error, "Unsupported language: ruby");
    assert_eq!(result.failure, Some(FailureKind::UnsupportedLanguage));
    assert!(result.files_created.is_empty());
    assert!(result.execution_time > 0.0);
}

#[tokio::test]
async fn test_empty_files() {
    let dispatcher = Dispatcher::with_defaults();
    let request = ExecutionRequest::new(SourceFiles::new(), "python", "main");

    let result = dispatcher.execute(request).await;
    assert!(!result.success);
    assert_eq!(result.error, "No files provided");
    assert_eq!(result.failure, Some(FailureKind::InvalidRequest));
}

#[tokio::test]
async fn test_entry_point_not_found() {
    let dispatcher = Dispatcher::with_defaults();
    let request = ExecutionRequest::new(
        sources(&[("helper.py", "print('x')")]),
        "python",
        "main",
    );

    let result = dispatcher.execute(request).await;
    assert!(!result.success);
    assert_eq!(result.error, "Entry point 'main' not found in provided files");
    assert_eq!(result.failure, Some(FailureKind::EntryPointNotFound));
    assert!(result.output.is_empty());
}

#[tokio::test]
async fn test_traversal_names_are_rejected() {
    let dispatcher = Dispatcher::with_defaults();
    let request = ExecutionRequest::new(
        sources(&[("main.py", "print(1)"), ("../escape.py", "print(2)")]),
        "python",
        "main",
    );

    let result = dispatcher.execute(request).await;
    assert!(!result.success);
    assert_eq!(result.failure, Some(FailureKind::InvalidRequest));
    assert!(result.error.contains("../escape.py"), "{}", result.error);
}

#[tokio::test]
async fn test_colliding_names_are_rejected() {
    let dispatcher = Dispatcher::with_defaults();
    // Both normalize to main.py
    let request = ExecutionRequest::new(
        sources(&[("main", "print(1)"), ("main.py", "print(2)")]),
        "python",
        "main",
    );

    let result = dispatcher.execute(request).await;
    assert!(!result.success);
    assert_eq!(result.failure, Some(FailureKind::InvalidRequest));
}

#[tokio::test]
async fn test_language_synonyms() {
    let dispatcher = Dispatcher::with_defaults();

    for tag in ["bash", "shell", "sh", "BASH"] {
        let result = dispatcher
            .execute(ExecutionRequest::single("echo ok", tag))
            .await;
        assert!(result.success, "{tag}: {}", result.error);
        assert_eq!(result.output, "ok\n");
        assert_eq!(result.files_created, vec!["main.sh"]);
    }
}

#[tokio::test]
async fn test_entry_point_with_or_without_extension() {
    let dispatcher = Dispatcher::with_defaults();
    let files = sources(&[("main.py", "print('entry')")]);

    for entry in ["main", "main.py"] {
        let request = ExecutionRequest::new(files.clone(), "python", entry);
        let result = dispatcher.execute(request).await;
        assert!(result.success, "{entry}: {}", result.error);
        assert_eq!(result.output, "entry\n");
    }
}

#[tokio::test]
async fn test_repeated_runs_are_identical() {
    let dispatcher = Dispatcher::with_defaults();
    let request = ExecutionRequest::single("print(sum(range(10)))", "python");

    let first = dispatcher.execute(request.clone()).await;
    let second = dispatcher.execute(request).await;

    assert!(first.success, "{}", first.error);
    assert_eq!(first.success, second.success);
    assert_eq!(first.output, second.output);
    assert_eq!(first.output, "45\n");
    assert!(first.execution_time > 0.0);
    assert!(second.execution_time > 0.0);
}

#[tokio::test]
async fn test_concurrent_requests_keep_their_output() {
    let dispatcher = Dispatcher::with_defaults();
    let mut tasks = JoinSet::new();

    for i in 0..6 {
        let dispatcher = dispatcher.clone();
        tasks.spawn(async move {
            let (code, language) = if i % 2 == 0 {
                (format!("print('request {i}')"), "python")
            } else {
                (format!("echo 'request {i}'"), "bash")
            };
            let result = dispatcher
                .execute(ExecutionRequest::single(code, language))
                .await;
            (i, result)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let (i, result) = joined.unwrap();
        assert!(result.success, "request {i}: {}", result.error);
        assert_eq!(result.output, format!("request {i}\n"));
    }
}

#[tokio::test]
async fn test_result_wire_shape() {
    let dispatcher = Dispatcher::with_defaults();
    let result = dispatcher.execute_source("print('hi')", "python").await;

    let value = serde_json::to_value(&result).unwrap();
    let object = value.as_object().unwrap();
    let mut keys: Vec<_> = object.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(
        keys,
        vec!["error", "execution_time", "files_created", "output", "success"]
    );
    assert_eq!(value["output"], "hi\n");
    assert_eq!(value["files_created"][0], "main.py");
}

#[tokio::test]
async fn test_request_accepts_camel_case_entry_point() {
    let json = r#"{
        "files": {"main.js": "console.log(1)"},
        "language": "js",
        "entryPoint": "main"
    }"#;
    let request: ExecutionRequest = serde_json::from_str(json).unwrap();
    assert_eq!(request.entry_point, "main");
    assert_eq!(request.language, "js");
}
