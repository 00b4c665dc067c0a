//! Embedded CPython backend.
//!
//! Both runs execute in a fresh `__main__` namespace with `sys.stdout` and
//! `sys.stdin` swapped for `io.StringIO` objects. The traced run binds a
//! [`PyTracer`] under the tracer name, so recording happens in Rust while the
//! program runs.
//!
//! Rendering a value can run user code (`__repr__`, `__str__`) that is itself
//! instrumented. Those nested tracer calls find the tracer already borrowed and
//! pass their value through unrecorded.

use super::{is_hidden_global, ExecOutcome, GlobalEntry, Sandbox, TracedRun};
use crate::config::TraceConfig;
use crate::error::TraceError;
use crate::instrument::InstrumentedProgram;
use crate::tracer::{render_or_placeholder, Inspect, InspectError, TraceContext, ValueKind, TRACER_NAME};
use parking_lot::Mutex;
use pyo3::exceptions::{PyAttributeError, PyKeyError, PyRuntimeError};
use pyo3::prelude::*;
use pyo3::types::{PyBool, PyDict, PyFloat, PyFrozenSet, PyInt, PyList, PyModule, PySet, PyString, PyTuple, PyType};
use std::ffi::CStr;
use std::time::{Duration, Instant};

/// Runs swap the interpreter-wide `sys.stdout`, so only one may be in flight.
static RUN_LOCK: Mutex<()> = parking_lot::const_mutex(());

const HARNESS: &CStr = c"
import io, sys, traceback

def _cpt_run(source, stdin, namespace):
    out = io.StringIO()
    saved = sys.stdout, sys.stdin, sys.getrecursionlimit()
    sys.stdout, sys.stdin = out, io.StringIO(stdin)
    error = None
    try:
        exec(compile(source, '<main>', 'exec'), namespace)
    except SystemExit:
        pass
    except BaseException as exc:
        error = traceback.format_exception_only(type(exc), exc)[-1].strip()
    finally:
        sys.stdout, sys.stdin = saved[0], saved[1]
        sys.setrecursionlimit(saved[2])
    return out.getvalue(), error
";

fn inspect_error(e: PyErr) -> InspectError {
    InspectError::new(e.to_string())
}

fn sandbox_error(e: PyErr) -> TraceError {
    TraceError::Sandbox(e.to_string())
}

/// Recorder object the instrumented program calls into.
#[pyclass(name = "Tracer")]
pub struct PyTracer {
    context: TraceContext,
}

#[pymethods]
impl PyTracer {
    fn enter(slf: &Bound<'_, Self>, func: &str, args: Bound<'_, PyAny>) -> u64 {
        match slf.try_borrow_mut() {
            Ok(mut tracer) => tracer.context.record_call_enter(func, &args),
            Err(_) => 0,
        }
    }

    fn exit<'py>(slf: &Bound<'py, Self>, id: u64, value: Bound<'py, PyAny>) -> Bound<'py, PyAny> {
        match slf.try_borrow_mut() {
            Ok(mut tracer) => tracer.context.record_call_exit(id, value),
            Err(_) => value,
        }
    }

    #[pyo3(name = "loop", signature = (site, scope, tracked, loop_var, range, initial))]
    fn record_loop(
        slf: &Bound<'_, Self>,
        site: usize,
        scope: Bound<'_, PyAny>,
        tracked: Vec<String>,
        loop_var: Option<String>,
        range: &str,
        initial: bool,
    ) {
        if let Ok(mut tracer) = slf.try_borrow_mut() {
            tracer
                .context
                .record_loop(site, &scope, &tracked, loop_var.as_deref(), range, initial);
        }
    }

    /// Evaluates the condition once, outside the borrow, and hands the
    /// resulting bool back to the `if`.
    fn cond<'py>(
        slf: &Bound<'py, Self>,
        value: Bound<'py, PyAny>,
        site: usize,
        line: usize,
        source: &str,
    ) -> PyResult<Bound<'py, PyAny>> {
        let truth = PyBool::new(slf.py(), value.is_truthy()?).to_owned().into_any();
        Ok(match slf.try_borrow_mut() {
            Ok(mut tracer) => tracer.context.record_condition(truth, site, line, source),
            Err(_) => truth,
        })
    }

    fn assign<'py>(slf: &Bound<'py, Self>, name: &str, value: Bound<'py, PyAny>) -> Bound<'py, PyAny> {
        match slf.try_borrow_mut() {
            Ok(mut tracer) => tracer.context.record_assignment(name, value),
            Err(_) => value,
        }
    }

    fn capture(slf: &Bound<'_, Self>, scope: Bound<'_, PyAny>) {
        if let Ok(mut tracer) = slf.try_borrow_mut() {
            tracer.context.capture_trees(&scope);
        }
    }
}

impl<'py> Inspect for Bound<'py, PyAny> {
    fn kind(&self) -> ValueKind {
        if self.is_none() {
            ValueKind::None
        } else if self.is_instance_of::<PyBool>() {
            ValueKind::Bool(self.is_truthy().unwrap_or(false))
        } else if self.is_instance_of::<PyInt>() {
            self.extract::<i64>().map_or(ValueKind::OtherScalar, ValueKind::Int)
        } else if self.is_instance_of::<PyFloat>() {
            self.extract::<f64>().map_or(ValueKind::OtherScalar, ValueKind::Float)
        } else if self.is_instance_of::<PyString>() {
            self.extract::<String>().map_or(ValueKind::OtherScalar, ValueKind::Str)
        } else if self.is_instance_of::<PyList>() || self.is_instance_of::<PyTuple>() {
            ValueKind::Sequence
        } else if self.is_instance_of::<PyDict>() {
            ValueKind::Mapping
        } else if self.is_instance_of::<PySet>() || self.is_instance_of::<PyFrozenSet>() {
            ValueKind::Set
        } else if is_opaque(self) {
            ValueKind::Opaque
        } else if matches!(Inspect::type_name(self).as_str(), "deque" | "range") {
            ValueKind::Sequence
        } else if self.hasattr("__dict__").unwrap_or(false) {
            ValueKind::Object
        } else {
            ValueKind::Opaque
        }
    }

    fn type_name(&self) -> String {
        self.get_type()
            .name()
            .map(|name| name.to_string())
            .unwrap_or_else(|_| "object".to_string())
    }

    fn natural_str(&self) -> Result<String, InspectError> {
        self.str().map(|s| s.to_string()).map_err(inspect_error)
    }

    fn attribute(&self, name: &str) -> Result<Option<Self>, InspectError> {
        match self.getattr(name) {
            Ok(value) if value.is_callable() => Ok(None),
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_instance_of::<PyAttributeError>(self.py()) => Ok(None),
            Err(e) => Err(inspect_error(e)),
        }
    }

    fn items(&self) -> Result<Vec<Self>, InspectError> {
        self.try_iter()
            .map_err(inspect_error)?
            .collect::<PyResult<Vec<_>>>()
            .map_err(inspect_error)
    }

    fn lookup(&self, key: &str) -> Result<Option<Self>, InspectError> {
        match self.get_item(key) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_instance_of::<PyKeyError>(self.py()) => Ok(None),
            Err(e) => Err(inspect_error(e)),
        }
    }

    fn entries(&self) -> Result<Vec<(String, Self)>, InspectError> {
        let pairs = self.call_method0("items").map_err(inspect_error)?;
        let mut entries = Vec::new();
        for pair in pairs.try_iter().map_err(inspect_error)? {
            let pair = pair.map_err(inspect_error)?;
            if let Ok((key, value)) = pair.extract::<(String, Bound<'py, PyAny>)>() {
                entries.push((key, value));
            }
        }
        Ok(entries)
    }

    fn truthy(&self) -> Result<bool, InspectError> {
        self.is_truthy().map_err(inspect_error)
    }
}

fn is_opaque(value: &Bound<'_, PyAny>) -> bool {
    value.is_instance_of::<PyModule>() || value.is_instance_of::<PyType>() || value.is_callable()
}

fn fresh_namespace(py: Python<'_>) -> PyResult<Bound<'_, PyDict>> {
    let namespace = PyDict::new(py);
    namespace.set_item("__name__", "__main__")?;
    namespace.set_item("__builtins__", py.import("builtins")?)?;
    Ok(namespace)
}

/// Execute `source` in `namespace`, returning captured stdout and the
/// last line of the error report.
fn run_captured(
    py: Python<'_>,
    source: &str,
    stdin: &str,
    namespace: &Bound<'_, PyDict>,
) -> PyResult<(String, Option<String>)> {
    let scope = PyDict::new(py);
    py.run(HARNESS, Some(&scope), None)?;
    let run = scope
        .get_item("_cpt_run")?
        .ok_or_else(|| PyRuntimeError::new_err("run harness failed to load"))?;
    run.call1((source, stdin, namespace))?.extract()
}

fn globals_view(namespace: &Bound<'_, PyDict>, config: &TraceConfig) -> Vec<GlobalEntry> {
    let mut view = Vec::new();
    for (name, value) in namespace.iter() {
        let Ok(name) = name.extract::<String>() else {
            continue;
        };
        if is_hidden_global(&name) || is_opaque(&value) {
            continue;
        }
        view.push(GlobalEntry {
            name,
            type_name: Inspect::type_name(&value),
            value: render_or_placeholder(&value, config),
        });
    }
    view
}

pub struct PythonSandbox {
    config: TraceConfig,
}

impl PythonSandbox {
    pub fn new(config: TraceConfig) -> Self {
        Self { config }
    }
}

impl Sandbox for PythonSandbox {
    fn name(&self) -> &'static str {
        "python"
    }

    fn execute(&self, source: &str, stdin: &str) -> ExecOutcome {
        let started = Instant::now();
        let _running = RUN_LOCK.lock();
        let result = Python::attach(|py| -> PyResult<ExecOutcome> {
            let namespace = fresh_namespace(py)?;
            let (stdout, error) = run_captured(py, source, stdin, &namespace)?;
            Ok(ExecOutcome {
                stdout,
                error,
                globals: globals_view(&namespace, &self.config),
                elapsed: Duration::ZERO,
            })
        });
        let mut outcome = result.unwrap_or_else(|e| ExecOutcome::failed(sandbox_error(e).to_string()));
        outcome.elapsed = started.elapsed();
        outcome
    }

    fn execute_traced(&self, program: &InstrumentedProgram, stdin: &str) -> Result<TracedRun, TraceError> {
        let _running = RUN_LOCK.lock();
        Python::attach(|py| {
            let tracer = Bound::new(
                py,
                PyTracer {
                    context: TraceContext::new(self.config.clone()),
                },
            )
            .map_err(sandbox_error)?;
            let namespace = fresh_namespace(py).map_err(sandbox_error)?;
            namespace.set_item(TRACER_NAME, &tracer).map_err(sandbox_error)?;
            let (stdout, error) = run_captured(py, &program.source, stdin, &namespace).map_err(sandbox_error)?;
            let payload = tracer.borrow().context.buffer().to_payload()?;
            Ok(TracedRun {
                stdout,
                error,
                payload: Some(payload),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::instrument;
    use crate::models::TraceBuffer;

    fn sandbox() -> PythonSandbox {
        PythonSandbox::new(TraceConfig::default())
    }

    #[test]
    fn test_primary_run_captures_output_and_globals() {
        let outcome = sandbox().execute("import math\nn = int(input())\nprint(n * 2)\n", "21\n");
        assert_eq!(outcome.stdout, "42\n");
        assert!(outcome.error.is_none());
        let names: Vec<&str> = outcome.globals.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["n"]);
    }

    #[test]
    fn test_error_report_is_last_line() {
        let outcome = sandbox().execute("def f(:\n", "");
        assert!(outcome.error.unwrap().starts_with("SyntaxError"));
        let outcome = sandbox().execute("print(1)\n1 / 0\n", "");
        assert_eq!(outcome.stdout, "1\n");
        assert_eq!(outcome.error.as_deref(), Some("ZeroDivisionError: division by zero"));
    }

    fn traced(source: &str) -> (String, TraceBuffer) {
        let program = instrument(source).unwrap();
        let run = sandbox().execute_traced(&program, "").unwrap();
        assert!(run.error.is_none(), "{:?}", run.error);
        let buffer = TraceBuffer::from_payload(&run.payload.unwrap()).unwrap();
        (run.stdout, buffer)
    }

    #[test]
    fn test_traced_fib() {
        let (stdout, buffer) =
            traced("def fib(n):\n    if n < 2:\n        return n\n    return fib(n - 1) + fib(n - 2)\nprint(fib(4))\n");
        assert_eq!(stdout, "3\n");
        assert_eq!(buffer.recursion.len(), 9);
        assert!(buffer.call_stack.is_empty());
    }

    #[test]
    fn test_condition_on_user_bool_runs_it_once() {
        let source = "\
class Box:
    def __init__(self, v):
        self.v = v

    def __bool__(self):
        calls.append(self.v)
        return self.v > 0

calls = []
for v in [1, 0, 2]:
    b = Box(v)
    if b:
        print('yes')
    else:
        print('no')
print(len(calls))
";
        let (stdout, buffer) = traced(source);
        assert_eq!(stdout, "yes\nno\nyes\n3\n");
        assert_eq!(buffer.conditions[&0].values, vec!["True", "False", "True"]);
        let bools = buffer.recursion.iter().filter(|c| c.func == "__bool__").count();
        assert_eq!(bools, 3);
    }

    #[test]
    fn test_list_of_objects_renders_through_user_repr() {
        let source = "\
class P:
    def __init__(self, a):
        self.a = a

    def __repr__(self):
        return 'P' + str(self.a)

ps = [P(1), P(2)]
";
        let (_, buffer) = traced(source);
        assert_eq!(buffer.history["ps"], vec!["[P1, P2]"]);
        assert!(!buffer.recursion.iter().any(|c| c.func == "__repr__"));
    }

    #[test]
    fn test_caught_exception_unwinds_call_stack() {
        let source = "\
def boom(n):
    if n == 0:
        raise ValueError('boom')
    return boom(n - 1)

def safe():
    try:
        boom(2)
    except ValueError:
        return -1
    return 0

def leaf(x):
    return x + 1

print(safe())
print(leaf(1))
";
        let (stdout, buffer) = traced(source);
        assert_eq!(stdout, "-1\n2\n");
        assert!(buffer.call_stack.is_empty());
        let leaf = buffer.recursion.iter().find(|c| c.func == "leaf").unwrap();
        assert_eq!(leaf.parent, None);
        assert_eq!(buffer.recursion.iter().filter(|c| c.parent.is_none()).count(), 2);
    }
}
