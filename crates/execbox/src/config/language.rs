use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize, de};

use crate::config::ConfigError;

const INVALID_FILE_EXT_CHARS: [char; 2] = ['/', '.'];

/// Placeholder replaced by the entry file name in run commands
pub const SOURCE_PLACEHOLDER: &str = "{source}";

/// File extension without dot (e.g., "py")
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileExtension(String);

impl FileExtension {
    pub fn new(extension: &str) -> Result<Self, ConfigError> {
        let contains_invalid = extension
            .chars()
            .any(|c| INVALID_FILE_EXT_CHARS.contains(&c));
        if contains_invalid {
            return Err(ConfigError::InvalidFileExtChars);
        }
        Ok(Self(extension.to_owned()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Suffix including the dot (e.g., ".py")
    pub fn suffix(&self) -> String {
        format!(".{}", self.0)
    }
}

impl<'de> Deserialize<'de> for FileExtension {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FileExtension::new(&s).map_err(|_| {
            de::Error::invalid_value(
                de::Unexpected::Str(&s),
                &"a file extension without '/' or '.' characters",
            )
        })
    }
}

impl std::fmt::Display for FileExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Settings for the in-process interpreter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedLanguage {
    /// Human-readable name (e.g., "Python 3 (embedded)")
    pub name: String,

    /// File extension
    pub extension: FileExtension,

    /// Built-in names exposed to user code
    #[serde(default)]
    pub builtins: Vec<String>,

    /// Standard library modules bound into the namespace under their own name
    #[serde(default)]
    pub modules: Vec<String>,

    /// Modules bound only when importable on this host
    #[serde(default)]
    pub optional_modules: Vec<OptionalModule>,
}

/// A module the embedded namespace picks up if the host has it installed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionalModule {
    /// Dotted import path (e.g., "matplotlib.pyplot")
    pub module: String,

    /// Names the module is bound to (e.g., ["plt"])
    pub aliases: Vec<String>,
}

/// Settings for a language run as a child process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessLanguage {
    /// Human-readable name (e.g., "JavaScript (Node.js)")
    pub name: String,

    /// File extension
    pub extension: FileExtension,

    /// Execution configuration
    pub run: RunConfig,
}

/// Settings for the shell language
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellLanguage {
    /// Human-readable name (e.g., "Bash")
    pub name: String,

    /// File extension
    pub extension: FileExtension,

    /// Execution configuration
    pub run: RunConfig,

    /// Command tokens rejected anywhere in any submitted file
    pub denylist: Vec<String>,
}

/// Configuration for the execution step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Command and arguments with placeholders
    /// Placeholders: {source}
    pub command: Vec<String>,

    /// Environment Variables to set
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl RunConfig {
    /// Expand placeholders in the run command
    pub fn expand_command(&self, source: &str) -> Vec<String> {
        self.command
            .iter()
            .map(|arg| arg.replace(SOURCE_PLACEHOLDER, source))
            .collect()
    }

    /// The runtime binary (first element of the command)
    pub fn program(&self) -> Option<&str> {
        self.command.first().map(String::as_str)
    }
}
