//! Program execution.
//!
//! A [`Sandbox`] runs a program twice per session: once untouched for the
//! user-visible output, and once instrumented to fill a trace buffer. The
//! traced run hands its buffer back as a JSON payload.

pub mod python;

use crate::error::TraceError;
use crate::instrument::InstrumentedProgram;
use serde::Serialize;
use std::time::Duration;

pub use python::PythonSandbox;

/// A user global visible after the primary run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalEntry {
    pub name: String,
    pub type_name: String,
    pub value: String,
}

/// Result of the primary, non-instrumented run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecOutcome {
    pub stdout: String,
    /// Last line of the error report, e.g. `ZeroDivisionError: division by zero`
    pub error: Option<String>,
    pub globals: Vec<GlobalEntry>,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl ExecOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Result of the instrumented run.
#[derive(Debug, Clone, Default)]
pub struct TracedRun {
    pub stdout: String,
    pub error: Option<String>,
    pub payload: Option<String>,
}

pub trait Sandbox: Send + Sync {
    fn name(&self) -> &'static str;

    fn execute(&self, source: &str, stdin: &str) -> ExecOutcome;

    fn execute_traced(
        &self,
        program: &InstrumentedProgram,
        stdin: &str,
    ) -> Result<TracedRun, TraceError>;
}

/// Names left out of the globals view.
pub fn is_hidden_global(name: &str) -> bool {
    name.starts_with('_')
}
