//! Turns a raw [`TraceBuffer`] into the structure handed to the renderer.

use crate::models::{CallRecord, LoopSite, Snapshot, TraceBuffer, TreeNode};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    pub loops: BTreeMap<usize, LoopTable>,
    pub conditions: BTreeMap<usize, ConditionTrace>,
    pub recursion: Vec<CallRecord>,
    pub trees: BTreeMap<String, TreeNode>,
    pub call_tree: Vec<CallNode>,
    pub events: Vec<CallEvent>,
    pub history: BTreeMap<String, History>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopTable {
    /// Columns that carry a value in at least one row
    pub columns: Vec<String>,
    pub rows: Vec<Snapshot>,
    pub loop_var: Option<String>,
    pub range: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionTrace {
    pub line: usize,
    pub source: String,
    pub history: History,
}

/// Compact form of a value history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum HistoryDisplay {
    Empty,
    Single { value: String },
    Pair { first: String, second: String },
    /// More than two entries: `first → … → last`
    Span { first: String, last: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct History {
    pub display: HistoryDisplay,
    /// Full sequence with consecutive repeats collapsed
    pub values: Vec<String>,
}

impl History {
    pub fn from_values(raw: &[String]) -> Self {
        let values = collapse_runs(raw);
        let display = match values.as_slice() {
            [] => HistoryDisplay::Empty,
            [only] => HistoryDisplay::Single { value: only.clone() },
            [first, second] => HistoryDisplay::Pair {
                first: first.clone(),
                second: second.clone(),
            },
            [first, .., last] => HistoryDisplay::Span {
                first: first.clone(),
                last: last.clone(),
            },
        };
        Self { display, values }
    }

    /// Text shown inline, e.g. `1 → … → 9`.
    pub fn summary(&self) -> String {
        match &self.display {
            HistoryDisplay::Empty => String::new(),
            HistoryDisplay::Single { value } => value.clone(),
            HistoryDisplay::Pair { first, second } => format!("{first} → {second}"),
            HistoryDisplay::Span { first, last } => format!("{first} → … → {last}"),
        }
    }
}

/// Drop consecutive duplicates.
pub fn collapse_runs(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        if out.last() != Some(value) {
            out.push(value.clone());
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallNode {
    pub id: u64,
    pub func: String,
    pub args: IndexMap<String, String>,
    #[serde(rename = "return")]
    pub return_value: Option<String>,
    pub children: Vec<CallNode>,
}

impl CallNode {
    pub fn size(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Enter,
    Exit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallEvent {
    pub kind: EventKind,
    pub id: u64,
    pub func: String,
    pub depth: usize,
    /// Rendered arguments on enter, the return value on exit
    pub detail: String,
}

/// Build the call forest from parent links.
///
/// Records whose parent is missing become roots. Records only reachable
/// through a parent cycle are promoted to roots in input order, so malformed
/// input still yields every record exactly once.
pub fn build_call_forest(records: &[CallRecord]) -> Vec<CallNode> {
    let index: HashMap<u64, usize> = records.iter().enumerate().map(|(i, r)| (r.id, i)).collect();
    let mut linked_children: Vec<Vec<usize>> = vec![Vec::new(); records.len()];
    let mut roots = Vec::new();
    for (i, record) in records.iter().enumerate() {
        match record.parent.and_then(|p| index.get(&p).copied()) {
            Some(parent) if parent != i => linked_children[parent].push(i),
            _ => roots.push(i),
        }
    }

    let mut visited = vec![false; records.len()];
    let mut tree_children: Vec<Vec<usize>> = vec![Vec::new(); records.len()];
    let mut order = Vec::with_capacity(records.len());
    let mut top_level = Vec::new();

    let candidates = roots.into_iter().chain(0..records.len());
    for start in candidates {
        if visited[start] {
            continue;
        }
        let mut stack = vec![(start, None::<usize>)];
        while let Some((i, parent)) = stack.pop() {
            if visited[i] {
                continue;
            }
            visited[i] = true;
            order.push(i);
            match parent {
                Some(p) => tree_children[p].push(i),
                None => top_level.push(i),
            }
            for &child in linked_children[i].iter().rev() {
                if !visited[child] {
                    stack.push((child, Some(i)));
                }
            }
        }
    }

    let mut built: Vec<Option<CallNode>> = vec![None; records.len()];
    for &i in order.iter().rev() {
        let record = &records[i];
        let children = tree_children[i]
            .iter()
            .filter_map(|&c| built[c].take())
            .collect();
        built[i] = Some(CallNode {
            id: record.id,
            func: record.func.clone(),
            args: record.args.clone(),
            return_value: record.return_value.clone(),
            children,
        });
    }
    top_level.into_iter().filter_map(|i| built[i].take()).collect()
}

fn format_args(args: &IndexMap<String, String>) -> String {
    args.iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Enter/exit narrative in call order.
pub fn call_events(forest: &[CallNode]) -> Vec<CallEvent> {
    let mut events = Vec::new();
    let mut stack: Vec<(&CallNode, usize, bool)> = forest.iter().rev().map(|n| (n, 0, false)).collect();
    while let Some((node, depth, entered)) = stack.pop() {
        if entered {
            events.push(CallEvent {
                kind: EventKind::Exit,
                id: node.id,
                func: node.func.clone(),
                depth,
                detail: node.return_value.clone().unwrap_or_else(|| "None".to_string()),
            });
            continue;
        }
        events.push(CallEvent {
            kind: EventKind::Enter,
            id: node.id,
            func: node.func.clone(),
            depth,
            detail: format_args(&node.args),
        });
        stack.push((node, depth, true));
        for child in node.children.iter().rev() {
            stack.push((child, depth + 1, false));
        }
    }
    events
}

pub fn loop_table(site: &LoopSite) -> LoopTable {
    let columns = site
        .variables
        .iter()
        .filter(|column| site.iterations.iter().any(|row| row.values.contains_key(*column)))
        .cloned()
        .collect();
    LoopTable {
        columns,
        rows: site.iterations.clone(),
        loop_var: site.loop_var.clone(),
        range: site.range.clone(),
    }
}

pub fn reconstruct(buffer: &TraceBuffer) -> Trace {
    let call_tree = build_call_forest(&buffer.recursion);
    let events = call_events(&call_tree);
    Trace {
        loops: buffer.loops.iter().map(|(id, site)| (*id, loop_table(site))).collect(),
        conditions: buffer
            .conditions
            .iter()
            .map(|(id, site)| {
                (
                    *id,
                    ConditionTrace {
                        line: site.line,
                        source: site.source.clone(),
                        history: History::from_values(&site.values),
                    },
                )
            })
            .collect(),
        recursion: buffer.recursion.clone(),
        trees: buffer.trees.clone(),
        call_tree,
        events,
        history: buffer
            .history
            .iter()
            .map(|(name, values)| (name.clone(), History::from_values(values)))
            .collect(),
    }
}
