//! A library for dispatching multi-file code execution requests.
//!
//! Execbox takes a named set of source files, a language tag and an entry
//! point, materializes the files into a throwaway workspace, runs them with
//! the strategy matching the language and folds whatever happened into one
//! [`ExecutionResult`].
//!
//! # Strategies
//!
//! - **Embedded**: Python runs in-process inside a restricted namespace with
//!   per-invocation capture buffers.
//! - **External runtime**: JavaScript runs under `node` as a child process
//!   with the workspace as its working directory.
//! - **Shell**: Bash scripts are screened against a command denylist and
//!   then run under `bash`.
//!
//! None of this is an OS-level sandbox. Execbox assumes the host is already
//! isolated and only layers coarse, language-level restrictions on top.

pub use config::{Config, ConfigError, EXAMPLE_CONFIG, FileExtension};
pub use dispatcher::{Dispatcher, ExecuteError};
pub use evaluator::{Capabilities, Evaluator, Strategy};
pub use types::{
    ExecutionOutcome, ExecutionRequest, ExecutionResult, ExitSignal, FailureKind, LanguageKind,
    RuntimeFault, SourceFiles,
};
pub use workspace::{MaterializedFile, Workspace, WorkspaceError};

pub mod config;
pub mod dispatcher;
pub mod evaluator;
pub mod types;
pub mod workspace;
