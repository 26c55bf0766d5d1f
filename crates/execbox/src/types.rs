use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Source files keyed by logical file name.
///
/// Ordered so that materialization and `files_created` are deterministic.
pub type SourceFiles = BTreeMap<String, String>;

/// The closed set of languages execbox knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageKind {
    /// Runs in the embedded interpreter
    Python,

    /// Runs under an external runtime binary
    JavaScript,

    /// Runs under a shell interpreter after a denylist scan
    Bash,
}

impl LanguageKind {
    pub const ALL: [LanguageKind; 3] = [
        LanguageKind::Python,
        LanguageKind::JavaScript,
        LanguageKind::Bash,
    ];

    /// Resolve a user-supplied language tag, folding synonyms.
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_lowercase().as_str() {
            "python" => Some(LanguageKind::Python),
            "javascript" | "js" | "node" => Some(LanguageKind::JavaScript),
            "bash" | "shell" | "sh" => Some(LanguageKind::Bash),
            _ => None,
        }
    }

    /// Canonical tag
    pub fn as_str(&self) -> &'static str {
        match self {
            LanguageKind::Python => "python",
            LanguageKind::JavaScript => "javascript",
            LanguageKind::Bash => "bash",
        }
    }

    /// Every tag accepted by [`parse`](Self::parse) for this language
    pub fn synonyms(&self) -> &'static [&'static str] {
        match self {
            LanguageKind::Python => &["python"],
            LanguageKind::JavaScript => &["javascript", "js", "node"],
            LanguageKind::Bash => &["bash", "shell", "sh"],
        }
    }
}

impl fmt::Display for LanguageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to run a multi-file project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Logical file name to source text
    pub files: SourceFiles,

    /// Language tag (see [`LanguageKind::parse`])
    #[serde(default = "default_language")]
    pub language: String,

    /// Logical name of the file to start from
    #[serde(alias = "entryPoint")]
    pub entry_point: String,
}

impl ExecutionRequest {
    pub fn new(
        files: SourceFiles,
        language: impl Into<String>,
        entry_point: impl Into<String>,
    ) -> Self {
        Self {
            files,
            language: language.into(),
            entry_point: entry_point.into(),
        }
    }

    /// Wrap a single source text as file `main` with entry point `main`
    pub fn single(code: impl Into<String>, language: impl Into<String>) -> Self {
        let mut files = SourceFiles::new();
        files.insert(SINGLE_FILE_NAME.to_owned(), code.into());
        Self::new(files, language, SINGLE_FILE_NAME)
    }
}

/// File name used by [`ExecutionRequest::single`]
pub const SINGLE_FILE_NAME: &str = "main";

fn default_language() -> String {
    LanguageKind::Python.as_str().to_owned()
}

/// How a strategy invocation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitSignal {
    /// Ran to completion with this exit code
    ///
    /// A child killed by a signal reports `-signal`.
    Normal(i32),

    /// Wall-clock bound expired and the child was killed
    Timeout(Duration),

    /// The runtime could not be started
    LaunchFailure(String),

    /// Something went wrong in execbox itself
    InternalError(String),
}

/// A condition raised inside the embedded interpreter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeFault {
    /// Exception type name (e.g. `ZeroDivisionError`)
    pub type_name: String,

    /// `str()` of the exception
    pub message: String,

    /// Formatted call stack
    pub trace: String,
}

impl fmt::Display for RuntimeFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}\n{}", self.type_name, self.message, self.trace)
    }
}

/// Raw result of one strategy invocation, before normalization
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// Strategy-specific success verdict
    pub success: bool,

    /// Captured standard output
    pub stdout: String,

    /// Captured standard error
    pub stderr: String,

    /// How the run ended
    pub exit: ExitSignal,

    /// Condition raised by the embedded interpreter, if any
    pub fault: Option<RuntimeFault>,
}

impl ExecutionOutcome {
    /// Outcome of a finished child process. Success iff the exit code is zero.
    pub fn exited(code: i32, stdout: String, stderr: String) -> Self {
        Self {
            success: code == 0,
            stdout,
            stderr,
            exit: ExitSignal::Normal(code),
            fault: None,
        }
    }

    pub fn timed_out(limit: Duration) -> Self {
        Self::failed(ExitSignal::Timeout(limit))
    }

    pub fn launch_failure(message: impl Into<String>) -> Self {
        Self::failed(ExitSignal::LaunchFailure(message.into()))
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::failed(ExitSignal::InternalError(message.into()))
    }

    fn failed(exit: ExitSignal) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            exit,
            fault: None,
        }
    }
}

/// Failure classes reported alongside an unsuccessful [`ExecutionResult`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Malformed request (no files, bad or duplicate file names)
    InvalidRequest,
    UnsupportedLanguage,
    EntryPointNotFound,
    /// Shell denylist hit
    DeniedCommand,
    /// External binary missing or not startable
    RuntimeUnavailable,
    Timeout,
    NonZeroExit,
    /// Condition raised during embedded execution
    RuntimeFault,
    /// Embedded run wrote to its error channel without raising
    ErrorOutput,
    InternalDispatchError,
}

/// The public result of an execution request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,

    /// Captured standard output
    pub output: String,

    /// Error text; empty on a clean run
    pub error: String,

    /// Wall-clock seconds spent on the whole request
    pub execution_time: f64,

    /// Materialized file names, in materialization order
    pub files_created: Vec<String>,

    /// Failure class for in-process callers; not part of the wire shape
    #[serde(skip)]
    pub failure: Option<FailureKind>,
}

impl ExecutionResult {
    /// Record the time spent on the request
    #[must_use]
    pub fn with_execution_time(mut self, elapsed: Duration) -> Self {
        self.execution_time = elapsed.as_secs_f64();
        self
    }
}
