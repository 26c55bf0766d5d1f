//! External runtime strategy
//!
//! Runs the entry file under a runtime binary (node by default) with the
//! workspace as working directory, so the runtime's own module system
//! resolves sibling files.

use std::time::Duration;

use tracing::{debug, instrument};

use crate::config::{ProcessLanguage, RunConfig};
use crate::evaluator::Evaluator;
use crate::evaluator::process::run_child;
use crate::types::ExecutionOutcome;
use crate::workspace::{MaterializedFile, Workspace};

/// Child-process strategy for a configured runtime
#[derive(Debug, Clone)]
pub struct ExternalProcess {
    run: RunConfig,
}

impl ExternalProcess {
    pub fn new(language: &ProcessLanguage) -> Self {
        Self {
            run: language.run.clone(),
        }
    }

    /// The runtime binary this strategy launches
    pub fn program(&self) -> Option<&str> {
        self.run.program()
    }
}

impl Evaluator for ExternalProcess {
    #[instrument(skip_all, fields(entry = %entry.name))]
    async fn run(
        &self,
        entry: &MaterializedFile,
        workspace: &Workspace,
        timeout: Duration,
    ) -> ExecutionOutcome {
        let command = self.run.expand_command(&entry.name);
        debug!(?command, "running external runtime");
        run_child(command, &self.run.env, workspace.path(), timeout).await
    }
}
