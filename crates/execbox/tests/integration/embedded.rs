use execbox::{Dispatcher, ExecutionRequest, FailureKind};

use super::{fixture_project, sources};

#[tokio::test]
async fn test_hello() {
    let dispatcher = Dispatcher::with_defaults();
    let result = dispatcher.execute_source("print(\"hi\")", "python").await;

    assert!(result.success, "{}", result.error);
    assert_eq!(result.output, "hi\n");
    assert_eq!(result.error, "");
}

#[tokio::test]
async fn test_sibling_module_project() {
    let dispatcher = Dispatcher::with_defaults();
    let request = ExecutionRequest::new(fixture_project("python_stats"), "python", "main");

    let result = dispatcher.execute(request).await;
    assert!(result.success, "{}", result.error);
    assert_eq!(result.output, "mean: 18.0\nspread: 38\n");
    assert_eq!(result.files_created, vec!["main.py", "stats.py"]);
}

#[tokio::test]
async fn test_division_by_zero() {
    let dispatcher = Dispatcher::with_defaults();
    let code = "print('before')\nx = 1 / 0\nprint('after')\n";

    let result = dispatcher.execute_source(code, "python").await;
    assert!(!result.success);
    assert_eq!(result.failure, Some(FailureKind::RuntimeFault));
    assert!(result.error.contains("ZeroDivisionError"), "{}", result.error);
    assert!(result.error.contains("division by zero"), "{}", result.error);
    assert!(result.error.contains("Traceback"), "{}", result.error);
    assert_eq!(result.output, "before\n");
}

#[tokio::test]
async fn test_fault_in_sibling_module() {
    let dispatcher = Dispatcher::with_defaults();
    let files = sources(&[
        ("main.py", "import parser\nparser.parse('x')\n"),
        ("parser.py", "def parse(text):\n    raise ValueError('bad input: ' + text)\n"),
    ]);

    let result = dispatcher
        .execute(ExecutionRequest::new(files, "python", "main"))
        .await;
    assert!(!result.success);
    assert!(result.error.contains("ValueError: bad input: x"), "{}", result.error);
}

#[tokio::test]
async fn test_error_output_alone_fails_the_run() {
    let dispatcher = Dispatcher::with_defaults();
    let code = "print('result', 42)\nprint('careful', file=sys.stderr)\n";

    let result = dispatcher.execute_source(code, "python").await;
    assert!(!result.success);
    assert_eq!(result.failure, Some(FailureKind::ErrorOutput));
    assert_eq!(result.output, "result 42\n");
    assert_eq!(result.error, "careful\n");
}

#[tokio::test]
async fn test_direct_stream_writes_are_captured() {
    let dispatcher = Dispatcher::with_defaults();
    let code = "import sys\nsys.stdout.write('out\\n')\nsys.stderr.write('err\\n')\n";

    let result = dispatcher.execute_source(code, "python").await;
    assert_eq!(result.failure, Some(FailureKind::ErrorOutput));
    assert_eq!(result.output, "out\n");
    assert_eq!(result.error, "err\n");
}

#[tokio::test]
async fn test_warnings_fail_the_run() {
    let dispatcher = Dispatcher::with_defaults();
    let code = "import warnings\nwarnings.warn('deprecated thing')\nprint('done')\n";

    let result = dispatcher.execute_source(code, "python").await;
    assert_eq!(result.failure, Some(FailureKind::ErrorOutput));
    assert_eq!(result.output, "done\n");
    assert!(result.error.contains("UserWarning: deprecated thing"), "{}", result.error);
}

#[tokio::test]
async fn test_builtins_are_restricted() {
    let dispatcher = Dispatcher::with_defaults();

    for code in ["open('/etc/hostname')", "eval('1 + 1')", "compile('1', 'x', 'eval')"] {
        let result = dispatcher.execute_source(code, "python").await;
        assert!(!result.success, "{code} should fail");
        assert!(result.error.contains("NameError"), "{code}: {}", result.error);
    }
}

#[tokio::test]
async fn test_preloaded_modules() {
    let dispatcher = Dispatcher::with_defaults();
    let code = "print(math.sqrt(16), json.dumps({'a': 1}), re.sub('b', 'c', 'abc'))";

    let result = dispatcher.execute_source(code, "python").await;
    assert!(result.success, "{}", result.error);
    assert_eq!(result.output, "4.0 {\"a\": 1} acc\n");
}

#[tokio::test]
async fn test_input_reads_nothing() {
    let dispatcher = Dispatcher::with_defaults();
    let result = dispatcher
        .execute_source("name = input('name? ')\nprint(len(name), type(name).__name__)", "python")
        .await;

    assert!(result.success, "{}", result.error);
    assert_eq!(result.output, "0 str\n");
}

#[tokio::test]
async fn test_state_does_not_leak_between_runs() {
    let dispatcher = Dispatcher::with_defaults();

    let first = dispatcher
        .execute_source("leaked = 'secret'\nprint('set')", "python")
        .await;
    assert!(first.success, "{}", first.error);

    let second = dispatcher.execute_source("print(leaked)", "python").await;
    assert!(!second.success);
    assert!(second.error.contains("NameError"), "{}", second.error);
    assert_eq!(second.output, "");
}

#[tokio::test]
async fn test_same_module_name_in_different_projects() {
    let dispatcher = Dispatcher::with_defaults();

    for value in ["one", "two"] {
        let files = sources(&[
            ("main.py", "import config\nprint(config.VALUE)\n"),
            ("config.py", &format!("VALUE = '{value}'\n")),
        ]);
        let result = dispatcher
            .execute(ExecutionRequest::new(files, "python", "main"))
            .await;
        assert!(result.success, "{}", result.error);
        assert_eq!(result.output, format!("{value}\n"));
    }
}

#[tokio::test]
async fn test_exit_codes() {
    let dispatcher = Dispatcher::with_defaults();

    let clean = dispatcher
        .execute_source("print('bye')\nsys.exit(0)\nprint('unreachable')", "python")
        .await;
    assert!(clean.success, "{}", clean.error);
    assert_eq!(clean.output, "bye\n");

    let failed = dispatcher.execute_source("sys.exit(2)", "python").await;
    assert!(!failed.success);
    assert!(failed.error.contains("SystemExit"), "{}", failed.error);
}

#[tokio::test]
async fn test_capabilities_are_exposed() {
    let dispatcher = Dispatcher::with_defaults();
    let capabilities = dispatcher.capabilities();

    assert!(capabilities.has_builtin("print"));
    assert!(capabilities.has_builtin("len"));
    assert!(!capabilities.has_builtin("open"));
    assert!(capabilities.has_module("math"));
    assert!(capabilities.has_module("sys"));
}
