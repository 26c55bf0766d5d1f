use std::time::Duration;

use execbox::{Config, ConfigError, Dispatcher, ExecutionRequest, FailureKind};

use super::{FIXTURES_PATH, fixture_config};

#[test]
fn test_load_valid_config() {
    let config = fixture_config("valid_full.toml");

    assert_eq!(config.timeout(), Duration::from_secs(10));
    assert_eq!(config.python.name, "Python 3");
    assert_eq!(config.python.modules, vec!["math", "json"]);
    assert!(config.python.optional_modules.is_empty());
    assert_eq!(
        config.javascript.run.command,
        vec!["node", "--no-warnings", "{source}"]
    );
    assert_eq!(config.bash.denylist, vec!["rm", "curl"]);
    assert_eq!(config.bash.run.env["EXECBOX_GREETING"], "hi there");
}

#[test]
fn test_load_minimal_config() {
    let config = fixture_config("valid_minimal.toml");

    assert_eq!(config.timeout, 5.0);
    // Everything else comes from the embedded defaults
    let defaults = Config::default();
    assert_eq!(config.python.builtins, defaults.python.builtins);
    assert_eq!(config.bash.denylist, defaults.bash.denylist);
    assert_eq!(config.javascript.run.program(), Some("node"));
}

#[test]
fn test_load_invalid_configs() {
    let cases = [
        "invalid_zero_timeout.toml",
        "invalid_empty_denylist.toml",
        "invalid_extension.toml",
        "invalid_empty_run_command.toml",
    ];

    for name in cases {
        let path = format!("{FIXTURES_PATH}/configs/{name}");
        assert!(Config::from_file(&path).is_err(), "{name} should be rejected");
    }
}

#[test]
fn test_load_missing_file() {
    let path = format!("{FIXTURES_PATH}/configs/does_not_exist.toml");
    assert!(matches!(
        Config::from_file(&path),
        Err(ConfigError::Parse(_))
    ));
}

#[tokio::test]
async fn test_restricted_builtins_apply_to_runs() {
    let dispatcher = Dispatcher::new(fixture_config("valid_full.toml"));

    // `sorted` is in the default allow-list but not in this one
    let result = dispatcher
        .execute_source("print(sorted([3, 1, 2]))", "python")
        .await;
    assert!(!result.success);
    assert_eq!(result.failure, Some(FailureKind::RuntimeFault));
    assert!(result.error.contains("NameError"), "{}", result.error);

    let result = dispatcher
        .execute_source("print(sum(range(4)), math.floor(2.5))", "python")
        .await;
    assert!(result.success, "{}", result.error);
    assert_eq!(result.output, "6 2\n");
}

#[tokio::test]
async fn test_configured_env_reaches_shell() {
    let dispatcher = Dispatcher::new(fixture_config("valid_full.toml"));

    let result = dispatcher
        .execute(ExecutionRequest::single("echo \"$EXECBOX_GREETING\"", "bash"))
        .await;
    assert!(result.success, "{}", result.error);
    assert_eq!(result.output, "hi there\n");
}
