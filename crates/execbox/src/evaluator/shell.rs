//! Shell strategy
//!
//! Every submitted file is scanned against a static denylist before anything
//! is written. Scripts that pass are run through the configured shell with
//! the same timeout and capture contract as the external runtime.
//!
//! The scan is a case-insensitive substring test. It rejects innocent text
//! that happens to contain a token (`format` in a comment, `rm` inside
//! `warm`) and misses anything hidden behind aliases, variables or encoding.
//! It is a tripwire, not a sandbox.

use std::time::Duration;

use tracing::{debug, instrument};

use crate::config::{RunConfig, ShellLanguage};
use crate::dispatcher::ExecuteError;
use crate::evaluator::Evaluator;
use crate::evaluator::process::run_child;
use crate::types::{ExecutionOutcome, SourceFiles};
use crate::workspace::{MaterializedFile, Workspace};

/// First denylist hit found in a set of files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenylistHit {
    /// The matched denylist token
    pub token: String,

    /// The submitted file name containing it
    pub file: String,
}

/// Find the first denylisted token in `files`
///
/// Files are visited in name order and tokens in list order. Blank tokens
/// never match.
pub fn scan(files: &SourceFiles, denylist: &[String]) -> Option<DenylistHit> {
    for (file, content) in files {
        let content = content.to_lowercase();
        for token in denylist {
            let needle = token.trim().to_lowercase();
            if !needle.is_empty() && content.contains(&needle) {
                return Some(DenylistHit {
                    token: token.clone(),
                    file: file.clone(),
                });
            }
        }
    }
    None
}

/// Shell interpreter strategy
#[derive(Debug, Clone)]
pub struct ShellProcess {
    run: RunConfig,
    denylist: Vec<String>,
}

impl ShellProcess {
    pub fn new(language: &ShellLanguage) -> Self {
        Self {
            run: language.run.clone(),
            denylist: language.denylist.clone(),
        }
    }

    pub fn denylist(&self) -> &[String] {
        &self.denylist
    }
}

impl Evaluator for ShellProcess {
    fn screen(&self, files: &SourceFiles) -> Result<(), ExecuteError> {
        match scan(files, &self.denylist) {
            Some(hit) => {
                debug!(token = %hit.token, file = %hit.file, "denylisted command");
                Err(ExecuteError::DeniedCommand {
                    token: hit.token,
                    file: hit.file,
                })
            }
            None => Ok(()),
        }
    }

    fn executable_files(&self) -> bool {
        true
    }

    #[instrument(skip_all, fields(entry = %entry.name))]
    async fn run(
        &self,
        entry: &MaterializedFile,
        workspace: &Workspace,
        timeout: Duration,
    ) -> ExecutionOutcome {
        let command = self.run.expand_command(&entry.name);
        debug!(?command, "running shell script");
        run_child(command, &self.run.env, workspace.path(), timeout).await
    }
}
