//! Capability table for the embedded interpreter
//!
//! The allow-listed builtins and modules are resolved once, when the
//! dispatcher is built, and shared by every embedded run. Each run gets a
//! fresh namespace assembled from this table.

use std::path::Path;

use pyo3::prelude::*;
use pyo3::types::PyDict;
use tracing::{debug, instrument, warn};

use crate::config::EmbeddedLanguage;

/// Builtins that each run replaces with its own capture-aware object
pub(crate) const PRINT: &str = "print";
pub(crate) const INPUT: &str = "input";
pub(crate) const IMPORT: &str = "__import__";
pub(crate) const HELP: &str = "help";

/// Module binding replaced by a per-run proxy
pub(crate) const SYS: &str = "sys";

/// Resolved builtins and modules exposed to embedded programs
#[derive(Debug, Default)]
pub struct Capabilities {
    /// Builtin name to object, in configuration order
    builtins: Vec<(String, Py<PyAny>)>,

    /// Binding name to module, including optional-module aliases
    modules: Vec<(String, Py<PyAny>)>,

    /// Configured names the host could not provide
    missing: Vec<String>,
}

/// Per-run objects that stand in for the real `print`, `input`,
/// `__import__`, `help` and `sys`
pub(crate) struct Overrides<'py> {
    pub print: Bound<'py, PyAny>,
    pub input: Bound<'py, PyAny>,
    pub import: Bound<'py, PyAny>,
    pub help: Option<Bound<'py, PyAny>>,
    pub sys: Bound<'py, PyAny>,
}

impl<'py> Overrides<'py> {
    fn builtin(&self, name: &str) -> Option<&Bound<'py, PyAny>> {
        match name {
            PRINT => Some(&self.print),
            INPUT => Some(&self.input),
            IMPORT => Some(&self.import),
            HELP => self.help.as_ref(),
            _ => None,
        }
    }

    fn module(&self, name: &str) -> Option<&Bound<'py, PyAny>> {
        match name {
            SYS => Some(&self.sys),
            _ => None,
        }
    }
}

impl Capabilities {
    /// Resolve the configured allow-lists against the host interpreter
    ///
    /// Missing builtins and required modules are logged at `warn`; missing
    /// optional modules at `debug`. Nothing here fails: an unavailable
    /// capability is simply absent from every namespace.
    #[instrument(skip_all)]
    pub fn probe(language: &EmbeddedLanguage) -> Self {
        Python::with_gil(|py| {
            let mut capabilities = Self::default();

            let builtins = match py.import_bound("builtins") {
                Ok(builtins) => builtins,
                Err(e) => {
                    warn!(error = %e, "embedded interpreter has no builtins module");
                    capabilities.missing.extend(language.builtins.iter().cloned());
                    return capabilities;
                }
            };

            for name in &language.builtins {
                match builtins.getattr(name.as_str()) {
                    Ok(object) => capabilities.builtins.push((name.clone(), object.unbind())),
                    Err(_) => {
                        warn!(name = %name, "builtin not available");
                        capabilities.missing.push(name.clone());
                    }
                }
            }

            for name in &language.modules {
                match py.import_bound(name.as_str()) {
                    Ok(module) => capabilities
                        .modules
                        .push((name.clone(), module.into_any().unbind())),
                    Err(e) => {
                        warn!(name = %name, error = %e, "module not available");
                        capabilities.missing.push(name.clone());
                    }
                }
            }

            for optional in &language.optional_modules {
                match py.import_bound(optional.module.as_str()) {
                    Ok(module) => {
                        let module = module.into_any().unbind();
                        for alias in &optional.aliases {
                            capabilities
                                .modules
                                .push((alias.clone(), module.clone_ref(py)));
                        }
                    }
                    Err(_) => {
                        debug!(module = %optional.module, "optional module not installed");
                        capabilities.missing.push(optional.module.clone());
                    }
                }
            }

            debug!(
                builtins = capabilities.builtins.len(),
                modules = capabilities.modules.len(),
                missing = capabilities.missing.len(),
                "capability probe complete"
            );
            capabilities
        })
    }

    /// Names of the builtins exposed to programs
    pub fn builtin_names(&self) -> impl Iterator<Item = &str> {
        self.builtins.iter().map(|(name, _)| name.as_str())
    }

    /// Names modules are bound to in the program namespace
    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(|(name, _)| name.as_str())
    }

    /// Configured builtins and modules the host could not provide
    pub fn missing(&self) -> &[String] {
        &self.missing
    }

    /// Check if a builtin made it into the table
    pub fn has_builtin(&self, name: &str) -> bool {
        self.builtin_names().any(|builtin| builtin == name)
    }

    /// Check if a module binding made it into the table
    pub fn has_module(&self, name: &str) -> bool {
        self.module_names().any(|module| module == name)
    }

    /// Build the global namespace for one run
    ///
    /// `__builtins__` is a dict holding only the allow-listed names, with
    /// the per-run overrides in place of the real ones. A bound `sys` is the
    /// run's proxy.
    pub(crate) fn namespace<'py>(
        &self,
        py: Python<'py>,
        overrides: &Overrides<'py>,
        entry: &Path,
    ) -> PyResult<Bound<'py, PyDict>> {
        let builtins = PyDict::new_bound(py);
        for (name, object) in &self.builtins {
            match overrides.builtin(name) {
                Some(replacement) => builtins.set_item(name, replacement)?,
                None => builtins.set_item(name, object.bind(py))?,
            }
        }

        let globals = PyDict::new_bound(py);
        globals.set_item("__builtins__", builtins)?;
        globals.set_item("__name__", "__main__")?;
        globals.set_item("__file__", entry.to_string_lossy().as_ref())?;
        for (name, module) in &self.modules {
            match overrides.module(name) {
                Some(replacement) => globals.set_item(name, replacement)?,
                None => globals.set_item(name, module.bind(py))?,
            }
        }
        Ok(globals)
    }
}
