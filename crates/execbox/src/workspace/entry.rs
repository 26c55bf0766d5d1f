//! Entry point resolution
//!
//! The entry point is checked twice: against the submitted file names before
//! a workspace exists, so a typo fails without touching the disk, and against
//! the materialized files once they are written.

use crate::config::FileExtension;
use crate::types::SourceFiles;
use crate::workspace::WorkspaceError;
use crate::workspace::manager::MaterializedFile;

/// Append the language extension unless the name already carries it
pub fn normalize_name(name: &str, extension: &FileExtension) -> String {
    if name.ends_with(&extension.suffix()) {
        name.to_owned()
    } else {
        format!("{name}{}", extension.suffix())
    }
}

/// Check that the requested entry point names one of the submitted files.
///
/// Returns the normalized entry file name.
pub fn ensure_declared(
    files: &SourceFiles,
    entry_point: &str,
    extension: &FileExtension,
) -> Result<String, WorkspaceError> {
    let wanted = normalize_name(entry_point, extension);
    if files
        .keys()
        .any(|name| normalize_name(name, extension) == wanted)
    {
        Ok(wanted)
    } else {
        Err(WorkspaceError::EntryPointNotFound(entry_point.to_owned()))
    }
}

/// Find the materialized file for the requested entry point
pub fn resolve<'a>(
    materialized: &'a [MaterializedFile],
    entry_point: &str,
    extension: &FileExtension,
) -> Result<&'a MaterializedFile, WorkspaceError> {
    let wanted = normalize_name(entry_point, extension);
    materialized
        .iter()
        .find(|file| file.name == wanted)
        .ok_or_else(|| WorkspaceError::EntryPointNotFound(entry_point.to_owned()))
}
