//! Execution dispatcher
//!
//! Validates a request, picks the strategy for its language, owns the
//! workspace for the duration of the run and turns whatever happens into an
//! [`ExecutionResult`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

pub use crate::dispatcher::normalize::{failure, normalize};

mod normalize;

use crate::config::Config;
use crate::evaluator::{
    Capabilities, EmbeddedSandbox, Evaluator, ExternalProcess, ShellProcess, Strategy,
};
use crate::types::{ExecutionRequest, ExecutionResult, FailureKind, LanguageKind};
use crate::workspace::{self, Workspace, WorkspaceError};

/// Errors that stop a request before or around its strategy run
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error("Command '{token}' in file '{file}' is not allowed for security reasons")]
    DeniedCommand { token: String, file: String },

    #[error("{0}")]
    Internal(String),
}

impl ExecuteError {
    /// The failure class reported to callers
    pub fn kind(&self) -> FailureKind {
        match self {
            ExecuteError::InvalidRequest(_) => FailureKind::InvalidRequest,
            ExecuteError::UnsupportedLanguage(_) => FailureKind::UnsupportedLanguage,
            ExecuteError::Workspace(WorkspaceError::EntryPointNotFound(_)) => {
                FailureKind::EntryPointNotFound
            }
            ExecuteError::Workspace(
                WorkspaceError::InvalidFileName(_) | WorkspaceError::DuplicateFile(_),
            ) => FailureKind::InvalidRequest,
            ExecuteError::Workspace(_) | ExecuteError::Internal(_) => {
                FailureKind::InternalDispatchError
            }
            ExecuteError::DeniedCommand { .. } => FailureKind::DeniedCommand,
        }
    }
}

#[derive(Debug)]
struct Inner {
    config: Config,
    capabilities: Arc<Capabilities>,
    python: Strategy,
    javascript: Strategy,
    bash: Strategy,
}

/// Runs execution requests
///
/// Cheap to clone; clones share the configuration and the embedded
/// capability table. Requests are independent of each other and may run
/// concurrently.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    /// Create a dispatcher, probing the embedded interpreter's capabilities
    pub fn new(config: Config) -> Self {
        let capabilities = Arc::new(Capabilities::probe(&config.python));
        let python = Strategy::Embedded(EmbeddedSandbox::new(
            Arc::clone(&capabilities),
            config.python.extension.clone(),
        ));
        let javascript = Strategy::External(ExternalProcess::new(&config.javascript));
        let bash = Strategy::Shell(ShellProcess::new(&config.bash));

        Self {
            inner: Arc::new(Inner {
                config,
                capabilities,
                python,
                javascript,
                bash,
            }),
        }
    }

    /// Create a dispatcher with the default configuration
    pub fn with_defaults() -> Self {
        Self::new(Config::default())
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The capability table the embedded strategy resolved at startup
    pub fn capabilities(&self) -> &Capabilities {
        &self.inner.capabilities
    }

    fn strategy(&self, kind: LanguageKind) -> &Strategy {
        match kind {
            LanguageKind::Python => &self.inner.python,
            LanguageKind::JavaScript => &self.inner.javascript,
            LanguageKind::Bash => &self.inner.bash,
        }
    }

    /// Run a request to completion
    ///
    /// Never fails: every problem, including a panic inside the run, comes
    /// back as `success == false` with an error message.
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        self.execute_with_timeout(request, None).await
    }

    /// Run a request with a per-call timeout override in seconds
    ///
    /// Overrides that are not a positive duration fall back to the configured
    /// timeout.
    #[instrument(
        skip(self, request),
        fields(language = %request.language, entry = %request.entry_point)
    )]
    pub async fn execute_with_timeout(
        &self,
        request: ExecutionRequest,
        timeout_secs: Option<f64>,
    ) -> ExecutionResult {
        let start = Instant::now();
        let timeout = self.inner.config.effective_timeout(timeout_secs);

        let dispatcher = self.clone();
        let handle = tokio::spawn(async move { dispatcher.dispatch(request, timeout).await });

        let result = match handle.await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "execution task failed");
                let detail = if e.is_panic() {
                    "execution task panicked".to_owned()
                } else {
                    e.to_string()
                };
                failure(&ExecuteError::Internal(detail))
            }
        };

        let result = result.with_execution_time(start.elapsed());
        info!(
            success = result.success,
            failure = ?result.failure,
            elapsed = result.execution_time,
            "execution finished"
        );
        result
    }

    /// Run a single source text as file `main`
    pub async fn execute_source(
        &self,
        code: impl Into<String>,
        language: impl Into<String>,
    ) -> ExecutionResult {
        self.execute(ExecutionRequest::single(code, language)).await
    }

    async fn dispatch(&self, request: ExecutionRequest, timeout: Duration) -> ExecutionResult {
        let prepared = match self.prepare(&request) {
            Ok(prepared) => prepared,
            Err(e) => {
                debug!(error = %e, "request rejected");
                return failure(&e);
            }
        };

        let mut workspace = match Workspace::create(self.inner.config.workspace_root()) {
            Ok(workspace) => workspace,
            Err(e) => return failure(&e.into()),
        };

        let result = self.run_in(&mut workspace, &request, prepared, timeout).await;
        workspace.destroy().await;
        result
    }

    /// Everything that can be checked without touching the disk
    fn prepare(&self, request: &ExecutionRequest) -> Result<LanguageKind, ExecuteError> {
        if request.files.is_empty() {
            return Err(ExecuteError::InvalidRequest("No files provided".to_owned()));
        }

        let kind = LanguageKind::parse(&request.language)
            .ok_or_else(|| ExecuteError::UnsupportedLanguage(request.language.clone()))?;

        let extension = self.inner.config.extension(kind);
        workspace::ensure_declared(&request.files, &request.entry_point, extension)?;
        self.strategy(kind).screen(&request.files)?;

        Ok(kind)
    }

    async fn run_in(
        &self,
        workspace: &mut Workspace,
        request: &ExecutionRequest,
        kind: LanguageKind,
        timeout: Duration,
    ) -> ExecutionResult {
        let strategy = self.strategy(kind);
        let extension = self.inner.config.extension(kind);

        let materialized = match workspace
            .materialize(&request.files, extension, strategy.executable_files())
            .await
        {
            Ok(materialized) => materialized,
            Err(e) => return failure(&e.into()),
        };
        let files_created: Vec<String> = materialized.iter().map(|f| f.name.clone()).collect();

        let entry = match workspace::resolve(workspace.files(), &request.entry_point, extension) {
            Ok(entry) => entry.clone(),
            Err(e) => {
                let mut result = failure(&e.into());
                result.files_created = files_created;
                return result;
            }
        };

        debug!(%kind, entry = %entry.name, "running strategy");
        let outcome = strategy.run(&entry, workspace, timeout).await;
        normalize(
            outcome,
            files_created,
            self.inner.config.language_name(kind),
        )
    }
}
