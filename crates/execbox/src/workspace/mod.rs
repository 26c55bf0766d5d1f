//! Per-request workspaces
//!
//! A workspace is a uniquely named directory that holds one request's
//! materialized files for exactly as long as the request runs. This module
//! also resolves which of those files is the entry point.

use thiserror::Error;

pub use crate::workspace::entry::{ensure_declared, normalize_name, resolve};
pub use crate::workspace::manager::{MaterializedFile, WORKSPACE_PREFIX, Workspace};

mod entry;
mod manager;

/// Errors that occur while preparing a workspace
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("failed to create workspace: {0}")]
    CreateFailed(#[source] std::io::Error),

    #[error("invalid file name '{0}'")]
    InvalidFileName(String),

    #[error("duplicate file '{0}' after extension normalization")]
    DuplicateFile(String),

    #[error("Entry point '{0}' not found in provided files")]
    EntryPointNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
