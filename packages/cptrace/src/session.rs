//! One editor session: the primary run, the best-effort trace pass, sample
//! cases, and the serialization of run requests.

use crate::config::TraceConfig;
use crate::error::TraceError;
use crate::instrument::instrument;
use crate::judge::{judge, random_input, StressFailure, StressReport, TestCase, TestResult};
use crate::models::TraceBuffer;
use crate::reconstruct::{reconstruct, Trace};
use crate::sandbox::{ExecOutcome, PythonSandbox, Sandbox};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::time::Duration;

/// Rough speed bucket for the primary run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Speed {
    Fast,
    Medium,
    Slow,
}

impl Speed {
    pub fn of(elapsed: Duration) -> Self {
        match elapsed.as_millis() {
            0..=99 => Speed::Fast,
            100..=499 => Speed::Medium,
            _ => Speed::Slow,
        }
    }
}

/// Everything one run produced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub backend: &'static str,
    pub outcome: ExecOutcome,
    pub elapsed_ms: u128,
    pub speed: Speed,
    pub trace: Option<Trace>,
    /// Why no trace was collected, when none was
    pub trace_skipped: Option<String>,
    /// Error raised by the instrumented program; the trace may be partial
    pub trace_error: Option<String>,
}

pub struct Session {
    config: TraceConfig,
    sandbox: Box<dyn Sandbox>,
}

impl Session {
    pub fn new(config: TraceConfig) -> Self {
        let sandbox = Box::new(PythonSandbox::new(config.clone()));
        Self { config, sandbox }
    }

    pub fn with_sandbox(config: TraceConfig, sandbox: Box<dyn Sandbox>) -> Self {
        Self { config, sandbox }
    }

    pub fn backend(&self) -> &'static str {
        self.sandbox.name()
    }

    /// Run `source` untouched, then collect a trace of it.
    ///
    /// Trace collection failures never change the primary outcome.
    pub fn run(&self, source: &str, stdin: &str) -> RunReport {
        let outcome = self.sandbox.execute(source, stdin);
        let elapsed = outcome.elapsed;
        let mut report = RunReport {
            backend: self.sandbox.name(),
            outcome,
            elapsed_ms: elapsed.as_millis(),
            speed: Speed::of(elapsed),
            trace: None,
            trace_skipped: None,
            trace_error: None,
        };

        match self.collect_trace(source, stdin) {
            Ok((trace, error)) => {
                report.trace = Some(trace);
                report.trace_error = error;
            }
            Err(e) => {
                log::warn!("trace skipped: {}", e);
                report.trace_skipped = Some(e.to_string());
            }
        }
        report
    }

    fn collect_trace(&self, source: &str, stdin: &str) -> Result<(Trace, Option<String>), TraceError> {
        let program = instrument(source)?;
        let run = self.sandbox.execute_traced(&program, stdin)?;
        let payload = run
            .payload
            .ok_or_else(|| TraceError::Sandbox("traced run returned no payload".to_string()))?;
        let buffer = TraceBuffer::from_payload(&payload)?;
        if let Some(error) = &run.error {
            log::debug!("instrumented program failed: {}", error);
        }
        Ok((reconstruct(&buffer), run.error))
    }

    pub fn config(&self) -> &TraceConfig {
        &self.config
    }

    /// Run `source` against each case without tracing.
    pub fn run_tests(&self, source: &str, cases: &[TestCase]) -> Vec<TestResult> {
        cases
            .iter()
            .enumerate()
            .map(|(index, case)| {
                let outcome = self.sandbox.execute(source, &case.input);
                let result = judge(
                    case,
                    index,
                    &outcome.stdout,
                    outcome.error.as_deref(),
                    outcome.elapsed.as_millis(),
                );
                log::debug!("{}: {:?} in {}ms", result.name, result.status, result.elapsed_ms);
                result
            })
            .collect()
    }

    /// Feed `source` random array inputs.
    ///
    /// A run fails when it raises, or when its trimmed output differs from
    /// `reference` on the same input.
    pub fn stress(&self, source: &str, reference: Option<&str>, iterations: usize, seed: Option<u64>) -> StressReport {
        let seed = seed.unwrap_or_else(rand::random);
        let mut rng = StdRng::seed_from_u64(seed);
        let mut report = StressReport {
            seed,
            iterations,
            passed: 0,
            failed: 0,
            first_failure: None,
        };

        for _ in 0..iterations {
            let input = random_input(&mut rng);
            let outcome = self.sandbox.execute(source, &input);
            let actual = match &outcome.error {
                Some(error) => Err(format!("Error: {}", error)),
                None => Ok(outcome.stdout.trim().to_string()),
            };
            let expected = reference.map(|reference| {
                let outcome = self.sandbox.execute(reference, &input);
                match outcome.error {
                    Some(error) => format!("Error: {}", error),
                    None => outcome.stdout.trim().to_string(),
                }
            });
            let ok = match (&actual, &expected) {
                (Err(_), _) => false,
                (Ok(actual), Some(expected)) => actual == expected,
                (Ok(_), None) => true,
            };

            if ok {
                report.passed += 1;
                continue;
            }
            report.failed += 1;
            if report.first_failure.is_none() {
                log::debug!("first stress failure on input {:?}", input);
                report.first_failure = Some(StressFailure {
                    input,
                    actual: actual.unwrap_or_else(|error| error),
                    expected,
                });
            }
        }
        report
    }
}

/// How a run request is presented to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Refreshes traces and live values only
    Silent,
    /// Also shows output and timing
    Visible,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest<T> {
    pub payload: T,
    pub visibility: Visibility,
}

/// Serializes run requests so that runs never overlap.
///
/// While a run is in flight, new requests go into a single pending slot. The
/// latest request replaces the pending one; a visible request, or a pending
/// visible one, makes the pending run visible.
#[derive(Debug)]
pub struct RunScheduler<T> {
    running: bool,
    pending: Option<RunRequest<T>>,
}

impl<T> Default for RunScheduler<T> {
    fn default() -> Self {
        Self {
            running: false,
            pending: None,
        }
    }
}

impl<T> RunScheduler<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn pending(&self) -> Option<&RunRequest<T>> {
        self.pending.as_ref()
    }

    /// Submit a request. Returns it back when it may start now.
    pub fn submit(&mut self, payload: T, visibility: Visibility) -> Option<RunRequest<T>> {
        if !self.running {
            self.running = true;
            return Some(RunRequest { payload, visibility });
        }
        let visibility = match &self.pending {
            Some(previous) if previous.visibility == Visibility::Visible => Visibility::Visible,
            _ => visibility,
        };
        self.pending = Some(RunRequest { payload, visibility });
        None
    }

    /// Mark the current run complete and hand out the pending one, if any.
    pub fn complete(&mut self) -> Option<RunRequest<T>> {
        let next = self.pending.take();
        self.running = next.is_some();
        next
    }
}
