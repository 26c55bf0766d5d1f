//! Embedded interpreter strategy
//!
//! Runs the entry file inside the host's CPython with a restricted
//! namespace. Output is captured by per-run buffer objects handed to the
//! program through its `print`, `help` and a `sys` proxy; the process-wide
//! `sys.stdout` and `sys.stderr` are never swapped. Warnings raised during
//! the run are recorded and land in the error buffer.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use pyo3::exceptions::PySystemExit;
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyModule, PyTuple};
use tracing::{debug, instrument, warn};

use crate::config::FileExtension;
use crate::evaluator::Evaluator;
use crate::evaluator::capabilities::{Capabilities, HELP, Overrides, SYS};
use crate::types::{ExecutionOutcome, ExitSignal, RuntimeFault};
use crate::workspace::{MaterializedFile, Workspace};

/// Serializes embedded runs: `sys.path` and `sys.modules` are
/// interpreter-wide.
static INTERPRETER: Mutex<()> = Mutex::new(());

/// In-process Python strategy
#[derive(Debug, Clone)]
pub struct EmbeddedSandbox {
    capabilities: Arc<Capabilities>,
    extension: FileExtension,
}

impl EmbeddedSandbox {
    pub fn new(capabilities: Arc<Capabilities>, extension: FileExtension) -> Self {
        Self {
            capabilities,
            extension,
        }
    }

    /// The capability table shared by every run
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }
}

impl Evaluator for EmbeddedSandbox {
    /// Runs to completion; the embedded strategy has no wall-clock bound.
    #[instrument(skip_all, fields(entry = %entry.name))]
    async fn run(
        &self,
        entry: &MaterializedFile,
        workspace: &Workspace,
        _timeout: Duration,
    ) -> ExecutionOutcome {
        let source = match tokio::fs::read_to_string(&entry.path).await {
            Ok(source) => source,
            Err(e) => {
                return ExecutionOutcome::internal_error(format!(
                    "failed to read entry point '{}': {e}",
                    entry.name
                ));
            }
        };

        let capabilities = Arc::clone(&self.capabilities);
        let entry_path = entry.path.clone();
        let workspace_path = workspace.path().to_path_buf();
        let suffix = self.extension.suffix();

        let task = tokio::task::spawn_blocking(move || {
            let _guard = INTERPRETER.lock().unwrap_or_else(PoisonError::into_inner);
            Python::with_gil(|py| {
                run_program(py, &capabilities, &source, &entry_path, &workspace_path, suffix)
                    .unwrap_or_else(|e| {
                        ExecutionOutcome::internal_error(format!(
                            "embedded interpreter setup failed: {e}"
                        ))
                    })
            })
        });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => ExecutionOutcome::internal_error(format!("embedded run aborted: {e}")),
        }
    }
}

/// Execute one program to completion and collect its outcome
///
/// Only errors in building the sandbox itself come back as `Err`; anything
/// the program raises becomes the outcome's fault.
fn run_program(
    py: Python<'_>,
    capabilities: &Capabilities,
    source: &str,
    entry: &Path,
    workspace: &Path,
    suffix: String,
) -> PyResult<ExecutionOutcome> {
    let sys = py.import_bound("sys")?;
    let stdout = Py::new(py, CaptureBuffer::default())?;
    let stderr = Py::new(py, CaptureBuffer::default())?;
    let sys_proxy = Bound::new(
        py,
        SandboxSys {
            stdout: stdout.clone_ref(py),
            stderr: stderr.clone_ref(py),
            real: sys.clone().unbind(),
        },
    )?
    .into_any();
    let help = if capabilities.has_builtin(HELP) {
        Some(help_for(py, &stdout)?)
    } else {
        None
    };

    let overrides = Overrides {
        print: Bound::new(
            py,
            SandboxPrint {
                stdout: stdout.clone_ref(py),
                stderr: stderr.clone_ref(py),
                sys: sys.clone().unbind(),
            },
        )?
        .into_any(),
        input: Bound::new(py, SandboxInput {})?.into_any(),
        import: Bound::new(
            py,
            SandboxImport {
                fallback: py.import_bound("builtins")?.getattr("__import__")?.unbind(),
                workspace: workspace.to_path_buf(),
                suffix,
                sys: sys_proxy.clone().unbind(),
            },
        )?
        .into_any(),
        help,
        sys: sys_proxy,
    };
    let globals = capabilities.namespace(py, &overrides, entry)?;

    let (fault, warnings) = {
        let _search_path = SearchPath::push(&sys, workspace)?;
        let recorder = WarningRecorder::start(py)?;
        let fault = match exec_source(py, source, entry, &globals) {
            Ok(()) => None,
            Err(err) if is_clean_exit(py, &err) => None,
            Err(err) => Some(describe_fault(py, &err)),
        };
        (fault, recorder.finish()?)
    };
    stderr.borrow_mut(py).contents.push_str(&warnings);

    let stdout = stdout.borrow(py).contents.clone();
    let stderr = stderr.borrow(py).contents.clone();

    // Anything on the error channel counts as failure, even without a fault
    let success = fault.is_none() && stderr.is_empty();
    debug!(success, faulted = fault.is_some(), "embedded run complete");

    Ok(ExecutionOutcome {
        success,
        stdout,
        stderr,
        exit: ExitSignal::Normal(if fault.is_some() { 1 } else { 0 }),
        fault,
    })
}

/// Compile `source` under the file name `path` and run it in `globals`
fn exec_source(
    py: Python<'_>,
    source: &str,
    path: &Path,
    globals: &Bound<'_, PyDict>,
) -> PyResult<()> {
    let builtins = py.import_bound("builtins")?;
    let code = builtins
        .getattr("compile")?
        .call1((source, path.to_string_lossy().as_ref(), "exec"))?;
    builtins.getattr("exec")?.call1((code, globals))?;
    Ok(())
}

/// `sys.exit()` and `sys.exit(0)` end the program without a fault
fn is_clean_exit(py: Python<'_>, err: &PyErr) -> bool {
    if !err.is_instance_of::<PySystemExit>(py) {
        return false;
    }
    match err.value_bound(py).getattr("code") {
        Ok(code) => code.is_none() || code.extract::<i64>().is_ok_and(|code| code == 0),
        Err(_) => false,
    }
}

fn describe_fault(py: Python<'_>, err: &PyErr) -> RuntimeFault {
    let type_name = err
        .get_type_bound(py)
        .name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "Exception".to_owned());
    let message = err
        .value_bound(py)
        .str()
        .map(|message| message.to_string_lossy().into_owned())
        .unwrap_or_default();
    let trace = format_trace(py, err).unwrap_or_else(|e| {
        debug!(error = %e, "could not format traceback");
        String::new()
    });

    RuntimeFault {
        type_name,
        message,
        trace,
    }
}

fn format_trace(py: Python<'_>, err: &PyErr) -> PyResult<String> {
    let lines: Vec<String> = py
        .import_bound("traceback")?
        .getattr("format_exception")?
        .call1((
            err.get_type_bound(py),
            err.value_bound(py),
            err.traceback_bound(py),
        ))?
        .extract()?;
    Ok(lines.concat())
}

/// Path of the file a module was loaded from, if any
fn module_file(module: &Bound<'_, PyAny>) -> Option<PathBuf> {
    let file = module.getattr("__file__").ok()?;
    file.extract::<String>().ok().map(PathBuf::from)
}

/// In-memory text sink for one stream of one run
///
/// Exposes the file-like subset programs use on `sys.stdout`.
#[pyclass]
#[derive(Debug, Default)]
struct CaptureBuffer {
    contents: String,
}

#[pymethods]
impl CaptureBuffer {
    fn write(&mut self, text: &str) -> usize {
        self.contents.push_str(text);
        text.chars().count()
    }

    fn flush(&self) {}

    fn isatty(&self) -> bool {
        false
    }
}

/// `sys` stand-in whose `stdout` and `stderr` are the run's capture buffers
///
/// Every other attribute is read from the real module.
#[pyclass(frozen)]
struct SandboxSys {
    stdout: Py<CaptureBuffer>,
    stderr: Py<CaptureBuffer>,
    real: Py<PyModule>,
}

#[pymethods]
impl SandboxSys {
    #[getter]
    fn stdout(&self, py: Python<'_>) -> Py<CaptureBuffer> {
        self.stdout.clone_ref(py)
    }

    #[getter]
    fn stderr(&self, py: Python<'_>) -> Py<CaptureBuffer> {
        self.stderr.clone_ref(py)
    }

    fn __getattr__(&self, py: Python<'_>, name: &str) -> PyResult<PyObject> {
        Ok(self.real.bind(py).getattr(name)?.unbind())
    }
}

/// `help` that writes its pages to the run's output buffer
fn help_for<'py>(py: Python<'py>, stdout: &Py<CaptureBuffer>) -> PyResult<Bound<'py, PyAny>> {
    let kwargs = PyDict::new_bound(py);
    kwargs.set_item("output", stdout.clone_ref(py))?;
    py.import_bound("pydoc")?
        .getattr("Helper")?
        .call((), Some(&kwargs))
}

/// Collects warnings raised while it is active instead of letting them
/// reach the process stderr
struct WarningRecorder<'py> {
    warnings: Bound<'py, PyModule>,
    context: Bound<'py, PyAny>,
    log: Bound<'py, PyAny>,
    active: bool,
}

impl<'py> WarningRecorder<'py> {
    fn start(py: Python<'py>) -> PyResult<Self> {
        let warnings = py.import_bound("warnings")?;
        let kwargs = PyDict::new_bound(py);
        kwargs.set_item("record", true)?;
        let context = warnings
            .getattr("catch_warnings")?
            .call((), Some(&kwargs))?;
        let log = context.call_method0("__enter__")?;
        Ok(Self {
            warnings,
            context,
            log,
            active: true,
        })
    }

    /// Stop recording and render the caught warnings as Python prints them
    fn finish(mut self) -> PyResult<String> {
        self.restore()?;

        let format = self.warnings.getattr("formatwarning")?;
        let mut text = String::new();
        for warning in self.log.iter()? {
            let warning = warning?;
            let rendered = format.call1((
                warning.getattr("message")?,
                warning.getattr("category")?,
                warning.getattr("filename")?,
                warning.getattr("lineno")?,
                warning.getattr("line")?,
            ))?;
            text.push_str(&rendered.str()?.to_cow()?);
        }
        Ok(text)
    }

    fn restore(&mut self) -> PyResult<()> {
        if std::mem::take(&mut self.active) {
            let py = self.context.py();
            self.context
                .call_method1("__exit__", (py.None(), py.None(), py.None()))?;
        }
        Ok(())
    }
}

impl Drop for WarningRecorder<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            warn!(error = %e, "failed to restore warning filters");
        }
    }
}

/// `print` replacement bound to a run's capture buffers
///
/// The real `sys.stdout` and `sys.stderr` are redirected to the buffers too,
/// for programs that got hold of them through a library.
#[pyclass]
struct SandboxPrint {
    stdout: Py<CaptureBuffer>,
    stderr: Py<CaptureBuffer>,
    sys: Py<PyModule>,
}

#[pymethods]
impl SandboxPrint {
    #[pyo3(signature = (*args, sep=None, end=None, file=None, flush=false))]
    fn __call__(
        &self,
        py: Python<'_>,
        args: &Bound<'_, PyTuple>,
        sep: Option<String>,
        end: Option<String>,
        file: Option<Bound<'_, PyAny>>,
        flush: bool,
    ) -> PyResult<()> {
        let sep = sep.as_deref().unwrap_or(" ");
        let end = end.as_deref().unwrap_or("\n");

        let mut text = String::new();
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                text.push_str(sep);
            }
            text.push_str(&arg.str()?.to_cow()?);
        }
        text.push_str(end);

        let Some(file) = file.filter(|file| !file.is_none()) else {
            self.stdout.borrow_mut(py).contents.push_str(&text);
            return Ok(());
        };

        let sys = self.sys.bind(py);
        if file.is(&sys.getattr("stdout")?) {
            self.stdout.borrow_mut(py).contents.push_str(&text);
        } else if file.is(&sys.getattr("stderr")?) {
            self.stderr.borrow_mut(py).contents.push_str(&text);
        } else {
            file.call_method1("write", (text,))?;
            if flush {
                file.call_method0("flush")?;
            }
        }
        Ok(())
    }
}

/// `input` replacement; programs never receive interactive input
#[pyclass(frozen)]
struct SandboxInput {}

#[pymethods]
impl SandboxInput {
    #[pyo3(signature = (*_args, **_kwargs))]
    fn __call__(
        &self,
        _args: &Bound<'_, PyTuple>,
        _kwargs: Option<&Bound<'_, PyDict>>,
    ) -> &'static str {
        ""
    }
}

/// `__import__` replacement that loads sibling workspace modules into the
/// same restricted namespace as the entry point
///
/// `import sys` yields the run's proxy. Top-level names that match a file in
/// the workspace are executed with the importer's `__builtins__`, so their
/// output is captured too. Everything else goes to the real import
/// machinery.
#[pyclass(frozen)]
struct SandboxImport {
    fallback: Py<PyAny>,
    workspace: PathBuf,
    suffix: String,
    sys: Py<PyAny>,
}

#[pymethods]
impl SandboxImport {
    #[pyo3(signature = (name, globals=None, locals=None, fromlist=None, level=0))]
    fn __call__(
        &self,
        py: Python<'_>,
        name: &str,
        globals: Option<Bound<'_, PyAny>>,
        locals: Option<Bound<'_, PyAny>>,
        fromlist: Option<Bound<'_, PyAny>>,
        level: i32,
    ) -> PyResult<PyObject> {
        if level == 0 && name == SYS {
            return Ok(self.sys.clone_ref(py));
        }

        if level == 0
            && !name.is_empty()
            && !name.contains('.')
            && let Some(builtins) = globals.as_ref().and_then(importer_builtins)
        {
            let path = self.workspace.join(format!("{name}{}", self.suffix));
            if path.is_file() {
                return load_sibling(py, name, &path, &builtins);
            }
        }

        let module = self
            .fallback
            .bind(py)
            .call1((name, globals, locals, fromlist, level))?;
        Ok(module.unbind())
    }
}

/// The `__builtins__` dict of the importing module, if it has one
fn importer_builtins<'py>(globals: &Bound<'py, PyAny>) -> Option<Bound<'py, PyDict>> {
    let globals = globals.downcast::<PyDict>().ok()?;
    let builtins = globals.get_item("__builtins__").ok()??;
    builtins.downcast_into::<PyDict>().ok()
}

fn load_sibling(
    py: Python<'_>,
    name: &str,
    path: &Path,
    builtins: &Bound<'_, PyDict>,
) -> PyResult<PyObject> {
    let modules = py.import_bound("sys")?.getattr("modules")?;
    if let Ok(existing) = modules.get_item(name)
        && module_file(&existing).as_deref() == Some(path)
    {
        return Ok(existing.unbind());
    }

    let source = std::fs::read_to_string(path)?;
    let module = PyModule::new_bound(py, name)?;
    module.setattr("__file__", path.to_string_lossy().as_ref())?;
    module.setattr("__builtins__", builtins)?;
    modules.set_item(name, &module)?;

    if let Err(err) = exec_source(py, &source, path, &module.dict()) {
        if let Err(e) = modules.del_item(name) {
            debug!(name, error = %e, "could not evict failed sibling module");
        }
        return Err(err);
    }
    debug!(name, "loaded sibling module");
    Ok(module.into_any().unbind())
}

/// Puts the workspace at the front of `sys.path` for the lifetime of the
/// guard
///
/// On drop the entry is removed again and every module loaded from the
/// workspace is evicted from `sys.modules`.
struct SearchPath<'py> {
    sys: Bound<'py, PyModule>,
    workspace: PathBuf,
}

impl<'py> SearchPath<'py> {
    fn push(sys: &Bound<'py, PyModule>, workspace: &Path) -> PyResult<Self> {
        sys.getattr("path")?
            .call_method1("insert", (0, workspace.to_string_lossy().as_ref()))?;
        Ok(Self {
            sys: sys.clone(),
            workspace: workspace.to_path_buf(),
        })
    }

    fn pop(&self) -> PyResult<()> {
        self.sys
            .getattr("path")?
            .call_method1("remove", (self.workspace.to_string_lossy().as_ref(),))?;
        Ok(())
    }

    fn evict_modules(&self) -> PyResult<usize> {
        let modules = self.sys.getattr("modules")?.downcast_into::<PyDict>()?;
        let mut evicted = 0;
        for (name, module) in modules.copy()?.iter() {
            if let Some(file) = module_file(&module)
                && file.starts_with(&self.workspace)
            {
                modules.del_item(name)?;
                evicted += 1;
            }
        }
        Ok(evicted)
    }
}

impl Drop for SearchPath<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.pop() {
            warn!(error = %e, "workspace missing from sys.path");
        }
        match self.evict_modules() {
            Ok(evicted) => debug!(evicted, "evicted workspace modules"),
            Err(e) => warn!(error = %e, "failed to evict workspace modules"),
        }
    }
}
