use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub use crate::config::language::{
    EmbeddedLanguage, FileExtension, OptionalModule, ProcessLanguage, RunConfig,
    SOURCE_PLACEHOLDER, ShellLanguage,
};
use crate::types::LanguageKind;

pub mod language;
mod loader;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file. It also
/// provides every default that a user config leaves out.
pub const EXAMPLE_CONFIG: &str = include_str!("../../execbox.example.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid characters in file extension")]
    InvalidFileExtChars,

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for execbox
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Wall-clock bound in seconds for child-process strategies.
    ///
    /// The embedded interpreter does not enforce a timeout of its own.
    #[serde(default = "default_timeout")]
    pub timeout: f64,

    /// Directory under which workspaces are created (system temp dir if unset)
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,

    /// Embedded interpreter settings
    pub python: EmbeddedLanguage,

    /// External runtime settings
    pub javascript: ProcessLanguage,

    /// Shell settings
    pub bash: ShellLanguage,
}

impl Config {
    /// Create a new config with the embedded defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// The configured child-process timeout
    ///
    /// A value that does not fit a [`Duration`] falls back to the default.
    pub fn timeout(&self) -> Duration {
        timeout_from_secs(self.timeout)
            .unwrap_or_else(|| Duration::from_secs_f64(default_timeout()))
    }

    /// Timeout for one call, preferring a usable override
    pub fn effective_timeout(&self, override_secs: Option<f64>) -> Duration {
        override_secs
            .and_then(timeout_from_secs)
            .unwrap_or_else(|| self.timeout())
    }

    /// Where workspaces go
    pub fn workspace_root(&self) -> Option<&Path> {
        self.workspace_root.as_deref()
    }

    /// Canonical file extension for a language
    pub fn extension(&self, kind: LanguageKind) -> &FileExtension {
        match kind {
            LanguageKind::Python => &self.python.extension,
            LanguageKind::JavaScript => &self.javascript.extension,
            LanguageKind::Bash => &self.bash.extension,
        }
    }

    /// Human-readable language name
    pub fn language_name(&self, kind: LanguageKind) -> &str {
        match kind {
            LanguageKind::Python => &self.python.name,
            LanguageKind::JavaScript => &self.javascript.name,
            LanguageKind::Bash => &self.bash.name,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn default_timeout() -> f64 {
    25.0
}

/// Positive seconds that fit a [`Duration`]
pub(crate) fn timeout_from_secs(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|timeout| !timeout.is_zero())
}
