//! Configuration file loading for execbox
//!
//! Handles loading and parsing configuration files using the config crate.
//! User sources are layered over the embedded example config, so a file only
//! needs the keys it wants to change.

use std::path::Path;

use config::{Config as ConfigBuilder, File, FileFormat};

use crate::config::{Config, ConfigError, EXAMPLE_CONFIG, RunConfig, timeout_from_secs};

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(EXAMPLE_CONFIG, FileFormat::Toml))
            .add_source(File::from(path))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(EXAMPLE_CONFIG, FileFormat::Toml))
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if timeout_from_secs(self.timeout).is_none() {
            return Err(ConfigError::Invalid(format!(
                "timeout must be a positive number of seconds, got {}",
                self.timeout
            )));
        }

        let names = [
            ("python", &self.python.name, &self.python.extension),
            ("javascript", &self.javascript.name, &self.javascript.extension),
            ("bash", &self.bash.name, &self.bash.extension),
        ];
        for (id, name, extension) in names {
            if name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty name"
                )));
            }
            if extension.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty extension"
                )));
            }
        }

        validate_run("javascript", &self.javascript.run)?;
        validate_run("bash", &self.bash.run)?;

        if self.bash.denylist.iter().all(|token| token.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "language 'bash' has empty denylist".to_owned(),
            ));
        }

        for optional in &self.python.optional_modules {
            if optional.module.is_empty() || optional.aliases.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "optional module '{}' needs a module path and at least one alias",
                    optional.module
                )));
            }
        }

        Ok(())
    }
}

fn validate_run(id: &str, run: &RunConfig) -> Result<(), ConfigError> {
    match run.program() {
        Some(program) if !program.is_empty() => Ok(()),
        _ => Err(ConfigError::Invalid(format!(
            "language '{id}' has empty run command"
        ))),
    }
}
