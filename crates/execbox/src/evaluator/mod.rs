//! Execution strategies
//!
//! Each supported language is run by one [`Evaluator`]: the embedded
//! interpreter, an external runtime binary or a shell. [`Strategy`] is the
//! closed set the dispatcher selects from.

use std::future::Future;
use std::time::Duration;

pub use crate::evaluator::capabilities::Capabilities;
pub use crate::evaluator::embedded::EmbeddedSandbox;
pub use crate::evaluator::external::ExternalProcess;
pub use crate::evaluator::process::run_child;
pub use crate::evaluator::shell::{DenylistHit, ShellProcess, scan};

mod capabilities;
mod embedded;
mod external;
mod process;
mod shell;

use crate::dispatcher::ExecuteError;
use crate::types::{ExecutionOutcome, SourceFiles};
use crate::workspace::{MaterializedFile, Workspace};

/// A way of running an entry file that lives in a workspace
pub trait Evaluator {
    /// Static check of the submitted files before anything is written
    fn screen(&self, _files: &SourceFiles) -> Result<(), ExecuteError> {
        Ok(())
    }

    /// Whether materialized files need the executable bit
    fn executable_files(&self) -> bool {
        false
    }

    /// Run `entry` and report how it went
    ///
    /// Never fails: every problem is folded into the outcome.
    fn run(
        &self,
        entry: &MaterializedFile,
        workspace: &Workspace,
        timeout: Duration,
    ) -> impl Future<Output = ExecutionOutcome> + Send;
}

/// The strategy selected for a language
#[derive(Debug, Clone)]
pub enum Strategy {
    Embedded(EmbeddedSandbox),
    External(ExternalProcess),
    Shell(ShellProcess),
}

impl Evaluator for Strategy {
    fn screen(&self, files: &SourceFiles) -> Result<(), ExecuteError> {
        match self {
            Strategy::Embedded(strategy) => strategy.screen(files),
            Strategy::External(strategy) => strategy.screen(files),
            Strategy::Shell(strategy) => strategy.screen(files),
        }
    }

    fn executable_files(&self) -> bool {
        match self {
            Strategy::Embedded(strategy) => strategy.executable_files(),
            Strategy::External(strategy) => strategy.executable_files(),
            Strategy::Shell(strategy) => strategy.executable_files(),
        }
    }

    async fn run(
        &self,
        entry: &MaterializedFile,
        workspace: &Workspace,
        timeout: Duration,
    ) -> ExecutionOutcome {
        match self {
            Strategy::Embedded(strategy) => strategy.run(entry, workspace, timeout).await,
            Strategy::External(strategy) => strategy.run(entry, workspace, timeout).await,
            Strategy::Shell(strategy) => strategy.run(entry, workspace, timeout).await,
        }
    }
}
