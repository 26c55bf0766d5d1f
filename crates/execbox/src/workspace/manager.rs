//! Workspace lifecycle management
//!
//! Creates, populates and tears down the per-request directory.

use std::collections::HashSet;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, instrument, warn};

use crate::config::FileExtension;
use crate::types::SourceFiles;
use crate::workspace::WorkspaceError;
use crate::workspace::entry::normalize_name;

/// Prefix of every workspace directory name
pub const WORKSPACE_PREFIX: &str = "execbox-";

const EXECUTABLE_MODE: u32 = 0o755;

/// A file written into a workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedFile {
    /// File name with the language extension
    pub name: String,

    /// Absolute path on the host
    pub path: PathBuf,

    /// Whether the executable bit was set
    pub executable: bool,
}

/// An ephemeral directory owned by one request
///
/// # Cleanup
///
/// Call [`destroy()`](Self::destroy) when the request is done. It removes the
/// materialized files and then the directory, swallowing any failure. If the
/// workspace is dropped without it (a panic, a cancelled future) the
/// directory is still removed recursively on drop.
#[derive(Debug)]
pub struct Workspace {
    /// Owning handle; `None` once destroyed
    dir: Option<TempDir>,

    /// Path to the workspace directory
    path: PathBuf,

    /// Files written so far, in materialization order
    files: Vec<MaterializedFile>,
}

impl Workspace {
    /// Create a fresh, uniquely named workspace
    ///
    /// The directory goes under `root` when given (created if missing),
    /// otherwise under the system temp directory.
    #[instrument]
    pub fn create(root: Option<&Path>) -> Result<Self, WorkspaceError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);

        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root).map_err(WorkspaceError::CreateFailed)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .map_err(WorkspaceError::CreateFailed)?;

        let path = dir.path().to_path_buf();
        debug!(?path, "workspace created");

        Ok(Self {
            dir: Some(dir),
            path,
            files: Vec::new(),
        })
    }

    /// Get the path to the workspace directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Files materialized so far
    pub fn files(&self) -> &[MaterializedFile] {
        &self.files
    }

    /// Names of the materialized files, in order
    pub fn file_names(&self) -> Vec<String> {
        self.files.iter().map(|file| file.name.clone()).collect()
    }

    /// Get the host path to a file inside the workspace
    ///
    /// Returns an error if the name is empty or tries to leave the workspace.
    pub fn file_path(&self, name: &str) -> Result<PathBuf, WorkspaceError> {
        if name.is_empty() || name.contains("..") || name.starts_with('/') {
            return Err(WorkspaceError::InvalidFileName(name.to_owned()));
        }
        Ok(self.path.join(name))
    }

    /// Write every submitted file under its normalized name
    ///
    /// All names are validated before anything touches the disk. Shell
    /// scripts get the executable bit.
    #[instrument(skip(self, files), fields(count = files.len()))]
    pub async fn materialize(
        &mut self,
        files: &SourceFiles,
        extension: &FileExtension,
        executable: bool,
    ) -> Result<&[MaterializedFile], WorkspaceError> {
        let mut seen = HashSet::new();
        let mut planned = Vec::with_capacity(files.len());
        for (name, content) in files {
            let normalized = normalize_name(name, extension);
            let path = self.file_path(&normalized)?;
            if !seen.insert(normalized.clone()) {
                return Err(WorkspaceError::DuplicateFile(normalized));
            }
            planned.push((normalized, path, content));
        }

        for (name, path, content) in planned {
            self.write_file(&path, content.as_bytes(), executable).await?;
            self.files.push(MaterializedFile {
                name,
                path,
                executable,
            });
        }

        Ok(&self.files)
    }

    async fn write_file(
        &self,
        path: &Path,
        content: &[u8],
        executable: bool,
    ) -> Result<(), WorkspaceError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(path, content).await?;
        if executable {
            let permissions = std::fs::Permissions::from_mode(EXECUTABLE_MODE);
            tokio::fs::set_permissions(path, permissions).await?;
        }

        debug!(?path, len = content.len(), executable, "wrote file to workspace");
        Ok(())
    }

    /// Read a materialized file back
    pub async fn read_file(&self, name: &str) -> Result<String, WorkspaceError> {
        let path = self.file_path(name)?;
        Ok(tokio::fs::read_to_string(&path).await?)
    }

    /// Check if a file exists in the workspace
    pub async fn file_exists(&self, name: &str) -> Result<bool, WorkspaceError> {
        let path = self.file_path(name)?;
        Ok(tokio::fs::metadata(&path).await.is_ok())
    }

    /// Remove the materialized files, then the directory
    ///
    /// Failures are logged and swallowed: cleanup is advisory, never a
    /// reason to fail the request.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn destroy(mut self) {
        for file in self.files.drain(..) {
            if let Err(e) = tokio::fs::remove_file(&file.path).await {
                debug!(path = ?file.path, error = %e, "materialized file already gone");
            }
        }

        if let Some(dir) = self.dir.take() {
            // Also removes anything the program itself wrote
            match dir.close() {
                Ok(()) => debug!("workspace destroyed"),
                Err(e) => warn!(error = %e, "failed to remove workspace directory"),
            }
        }
    }

    /// Check if the workspace has not been destroyed yet
    pub fn is_live(&self) -> bool {
        self.dir.is_some()
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.dir.is_some() {
            // TempDir removes the directory when it drops right after this
            warn!(
                path = %self.path.display(),
                "Workspace dropped without explicit destroy; removing directory on drop"
            );
        }
    }
}
