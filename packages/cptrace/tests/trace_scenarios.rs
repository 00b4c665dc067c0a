use cptrace::config::TraceConfig;
use cptrace::instrument::instrument;
use cptrace::models::TraceBuffer;
use cptrace::reconstruct::{collapse_runs, EventKind, History};
use cptrace::sandbox::{PythonSandbox, Sandbox};
use cptrace::session::{RunReport, Session};

fn run(source: &str, stdin: &str) -> RunReport {
    Session::new(TraceConfig::default()).run(source, stdin)
}

fn traced_buffer(source: &str, stdin: &str) -> TraceBuffer {
    let program = instrument(source).expect("instrument");
    let traced = PythonSandbox::new(TraceConfig::default())
        .execute_traced(&program, stdin)
        .expect("traced run");
    assert!(traced.error.is_none(), "{:?}", traced.error);
    TraceBuffer::from_payload(&traced.payload.expect("payload")).expect("payload parses")
}

const PROGRAMS: &[(&str, &str)] = &[
    (
        "def fib(n):\n    if n < 2:\n        return n\n    return fib(n - 1) + fib(n - 2)\n\nprint(fib(10))\n",
        "",
    ),
    (
        "n = int(input())\nxs = list(map(int, input().split()))\nbest = 0\nfor i in range(n):\n    for j in range(i + 1, n):\n        if xs[i] + xs[j] > best:\n            best = xs[i] + xs[j]\nprint(best)\n",
        "4\n3 9 1 7\n",
    ),
    (
        "def gcd(a, b):\n    while b:\n        a, b = b, a % b\n    return a\n\nfor x in range(1, 6):\n    if x % 2:\n        continue\n    print(x, gcd(x * 6, 16))\n",
        "",
    ),
    (
        "from collections import deque\ngraph = {0: [1, 2], 1: [3], 2: [3], 3: []}\nseen = {0}\nq = deque([0])\norder = []\nwhile q:\n    node = q.popleft()\n    order.append(node)\n    for nxt in graph[node]:\n        if nxt not in seen:\n            seen.add(nxt)\n            q.append(nxt)\nprint(*order)\n",
        "",
    ),
];

#[test]
fn instrumented_programs_print_the_same_output() {
    let sandbox = PythonSandbox::new(TraceConfig::default());
    for (source, stdin) in PROGRAMS {
        let plain = sandbox.execute(source, stdin);
        assert!(plain.error.is_none(), "{source}: {:?}", plain.error);

        let program = instrument(source).expect("instrument");
        let traced = sandbox
            .execute_traced(&program, stdin)
            .expect("traced run");
        assert_eq!(plain.stdout, traced.stdout, "output differs for {source}");
        assert!(traced.error.is_none());
    }
}

#[test]
fn range_loop_has_one_snapshot_per_iteration_plus_initial() {
    for k in [0usize, 1, 5] {
        let source = format!("total = 0\nfor i in range({k}):\n    total += i\n");
        let trace = run(&source, "").trace.expect("trace");
        let table = trace.loops.values().next().expect("loop site");
        assert_eq!(table.rows.len(), k + 1);
        assert!(!table.rows[0].values.contains_key("i"));
        assert!(table.rows[0].exprs.is_none());
        assert_eq!(table.range, format!("0..{k}"));
    }
}

#[test]
fn loop_transitions_show_deltas() {
    let trace = run("total = 0\nfor i in range(3):\n    total += i\n", "")
        .trace
        .expect("trace");
    let table = &trace.loops[&0];
    assert_eq!(table.columns, vec!["i", "total"]);
    let transitions: Vec<Option<&String>> = table
        .rows
        .iter()
        .skip(1)
        .map(|row| row.exprs.as_ref().and_then(|e| e.get("total")))
        .collect();
    assert_eq!(transitions[0], None);
    assert_eq!(transitions[1].map(String::as_str), Some("0+1=1"));
    assert_eq!(transitions[2].map(String::as_str), Some("1+2=3"));
}

#[test]
fn fib_of_four_yields_nine_balanced_calls() {
    let report = run(PROGRAMS[0].0.replace("fib(10))", "fib(4))").as_str(), "");
    assert_eq!(report.outcome.stdout, "3\n");
    let trace = report.trace.expect("trace");
    assert_eq!(trace.recursion.len(), 9);
    assert!(trace.recursion.iter().all(|call| call.return_value.is_some()));

    assert_eq!(trace.call_tree.len(), 1);
    assert_eq!(trace.call_tree[0].size(), 9);
    assert_eq!(trace.call_tree[0].return_value.as_deref(), Some("3"));

    let enters = trace.events.iter().filter(|e| e.kind == EventKind::Enter).count();
    let exits = trace.events.iter().filter(|e| e.kind == EventKind::Exit).count();
    assert_eq!((enters, exits), (9, 9));
}

#[test]
fn call_stack_is_empty_after_recursion_completes() {
    let buffer = traced_buffer(PROGRAMS[0].0, "");
    assert!(buffer.call_stack.is_empty());
    assert_eq!(buffer.recursion.len(), 177);
    assert_eq!(buffer.recursion.iter().filter(|c| c.parent.is_none()).count(), 1);
}

const UNWINDING: &str = "\
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

#[test]
fn caught_exception_does_not_adopt_later_calls() {
    let plain = PythonSandbox::new(TraceConfig::default()).execute(UNWINDING, "");
    let buffer = traced_buffer(UNWINDING, "");
    let report = run(UNWINDING, "");
    assert_eq!(report.outcome.stdout, plain.stdout);
    assert_eq!(plain.stdout, "-1\n2\n");

    assert!(buffer.call_stack.is_empty());
    let funcs: Vec<&str> = buffer.recursion.iter().map(|c| c.func.as_str()).collect();
    assert_eq!(funcs, vec!["safe", "boom", "boom", "boom", "leaf"]);
    assert_eq!(buffer.recursion[4].parent, None);
    assert_eq!(buffer.recursion[1].parent, Some(1));
    assert!(buffer.recursion[1..4].iter().all(|c| c.return_value.is_none()));

    let trace = report.trace.expect("trace");
    assert_eq!(trace.call_tree.len(), 2);
    assert_eq!(trace.call_tree[0].size(), 4);
    assert_eq!(trace.call_tree[1].return_value.as_deref(), Some("2"));
}

#[test]
fn mutual_recursion_keeps_parent_links() {
    let source = "\
def is_even(n):
    if n == 0:
        return True
    return is_odd(n - 1)

def is_odd(n):
    if n == 0:
        return False
    return is_even(n - 1)

print(is_even(3))
";
    let report = run(source, "");
    assert_eq!(report.outcome.stdout, "False\n");
    let calls = report.trace.expect("trace").recursion;
    let funcs: Vec<&str> = calls.iter().map(|c| c.func.as_str()).collect();
    assert_eq!(funcs, vec!["is_even", "is_odd", "is_even", "is_odd"]);
    for window in calls.windows(2) {
        assert_eq!(window[1].parent, Some(window[0].id));
    }
    assert!(calls.iter().all(|c| c.return_value.as_deref() == Some("False")));
}

#[test]
fn condition_history_collapses_repeats() {
    let trace = run("for i in range(6):\n    if i < 3:\n        pass\n", "")
        .trace
        .expect("trace");
    let condition = trace.conditions.values().next().expect("condition site");
    assert_eq!(condition.line, 2);
    assert_eq!(condition.source, "i < 3");
    assert_eq!(condition.history.values, vec!["True", "False"]);
    assert_eq!(condition.history.summary(), "True → False");
}

#[test]
fn condition_on_user_object_records_its_truth() {
    let source = "\
class Box:
    def __init__(self, v):
        self.v = v

    def __bool__(self):
        hits.append(self.v)
        return self.v > 0

hits = []
for v in [1, 0, 0, 3]:
    b = Box(v)
    if b:
        pass
print(len(hits))
";
    let report = run(source, "");
    assert_eq!(report.outcome.stdout, "4\n");
    assert!(report.trace_error.is_none());
    let trace = report.trace.expect("trace");
    let condition = &trace.conditions[&0];
    assert_eq!(condition.source, "b");
    assert_eq!(condition.history.values, vec!["True", "False", "True"]);
    assert!(!condition.history.values.iter().any(|v| v == "?"));
}

#[test]
fn history_dedup_is_idempotent() {
    let raw: Vec<String> = ["1", "1", "2", "2", "2", "3", "1"].iter().map(|s| s.to_string()).collect();
    let once = collapse_runs(&raw);
    assert_eq!(collapse_runs(&once), once);
    assert_eq!(History::from_values(&once), History::from_values(&raw));
    assert_eq!(History::from_values(&raw).summary(), "1 → … → 1");
}

#[test]
fn binary_tree_is_reconstructed() {
    let source = "\
class TreeNode:
    def __init__(self, val):
        self.val = val
        self.left = None
        self.right = None

root = TreeNode(1)
root.left = TreeNode(2)
root.right = TreeNode(3)
root.left.left = TreeNode(4)
";
    let trace = run(source, "").trace.expect("trace");
    let tree = &trace.trees["root"];
    assert_eq!(tree.val, "1");
    assert_eq!(tree.node_count(), 4);
    let left = tree.left.as_ref().expect("left child");
    assert_eq!(left.val, "2");
    assert_eq!(left.left.as_ref().map(|n| n.val.as_str()), Some("4"));
}

#[test]
fn malformed_source_reports_syntax_error_without_trace() {
    let report = run("for i in range(3)\n    print(i)\n", "");
    assert!(report.outcome.error.expect("error").starts_with("SyntaxError"));
    assert!(report.trace.is_none());
    assert!(report.trace_skipped.is_some());
    assert!(instrument("for i in range(3)\n    print(i)\n")
        .expect_err("parse error")
        .is_source_error());
}

#[test]
fn report_serializes_with_renderer_field_names() {
    let report = run("def f(x):\n    return x * 2\nfor i in range(2):\n    f(i)\n", "");
    let json = serde_json::to_value(&report).expect("json");
    let trace = &json["trace"];
    assert!(trace["loops"]["0"]["loopVar"].is_string());
    assert!(trace["recursion"][0]["return"].is_string());
    assert!(trace["callTree"].is_array());
    assert!(json["traceSkipped"].is_null());
}
