//! Heuristic complexity estimate and the per-line cost gutter.

use super::{callee_name, child_blocks, stmt_exprs, walk_block_exprs, walk_expr};
use crate::error::TraceError;
use crate::syntax::parse_raw;
use crate::syntax::source::LineIndex;
use once_cell::sync::Lazy;
use regex::Regex;
use rustpython_ast::{Expr, Ranged, Stmt};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingKind {
    Loop,
    Recursion,
    Sort,
    Bsearch,
    Graph,
    Dp,
}

/// One detected pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub line: usize,
    pub kind: FindingKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexityReport {
    pub time: String,
    pub space: String,
    pub loop_depth: usize,
    pub has_recursion: bool,
    pub has_sorting: bool,
    pub has_binary_search: bool,
    pub has_graph: bool,
    pub has_dp: bool,
    pub findings: Vec<Finding>,
}

const GRAPH_HINTS: &[&str] = &["deque", "graph", "visited", "dfs", "bfs"];
const MEMO_DECORATORS: &[&str] = &["lru_cache", "cache"];
const LOW_NAMES: &[&str] = &["left", "lo", "low", "l"];
const HIGH_NAMES: &[&str] = &["right", "hi", "high", "r"];

#[derive(Default)]
struct Scan {
    index: Option<LineIndex>,
    max_depth: usize,
    recursion: bool,
    sorting: bool,
    bsearch: bool,
    graph: bool,
    dp: bool,
    nested_list: bool,
    list: bool,
    findings: Vec<Finding>,
    seen: HashSet<(usize, FindingKind)>,
}

impl Scan {
    fn line_of<T: Ranged>(&self, node: &T) -> usize {
        self.index
            .as_ref()
            .map_or(0, |index| index.line_of(node.range().start().to_usize()))
    }

    fn note(&mut self, line: usize, kind: FindingKind, message: impl Into<String>) {
        if self.seen.insert((line, kind)) {
            self.findings.push(Finding {
                line,
                kind,
                message: message.into(),
            });
        }
    }

    fn block(&mut self, stmts: &[Stmt], depth: usize) {
        for stmt in stmts {
            self.stmt(stmt, depth);
        }
    }

    fn stmt(&mut self, stmt: &Stmt, depth: usize) {
        for expr in stmt_exprs(stmt) {
            walk_expr(expr, &mut |e| self.expr(e));
        }
        match stmt {
            Stmt::For(_) | Stmt::AsyncFor(_) | Stmt::While(_) => {
                let inner = depth + 1;
                self.max_depth = self.max_depth.max(inner);
                self.note(self.line_of(stmt), FindingKind::Loop, format!("Loop detected (depth {inner})"));
                let blocks = child_blocks(stmt);
                if let Some((body, orelse)) = blocks.split_first() {
                    self.block(body, inner);
                    for block in orelse {
                        self.block(block, depth);
                    }
                }
            }
            Stmt::FunctionDef(func) => {
                self.function(stmt, func.name.as_str(), &func.decorator_list, &func.body);
            }
            Stmt::AsyncFunctionDef(func) => {
                self.function(stmt, func.name.as_str(), &func.decorator_list, &func.body);
            }
            Stmt::Assign(assign) => {
                self.midpoint(stmt, &assign.targets, &assign.value);
                for block in child_blocks(stmt) {
                    self.block(block, depth);
                }
            }
            _ => {
                for block in child_blocks(stmt) {
                    self.block(block, depth);
                }
            }
        }
    }

    /// Function bodies run once per call, so their loops start from depth 0.
    fn function(&mut self, stmt: &Stmt, name: &str, decorators: &[Expr], body: &[Stmt]) {
        let line = self.line_of(stmt);
        let memoized = decorators.iter().any(|d| {
            let target = match d {
                Expr::Call(call) => &*call.func,
                other => other,
            };
            callee_name(target).is_some_and(|n| MEMO_DECORATORS.contains(&n))
        });
        if memoized {
            self.dp = true;
            self.note(line, FindingKind::Dp, "DP/Memoization pattern");
        }

        let mut calls_itself = false;
        walk_block_exprs(body, &mut |e| {
            if let Expr::Call(call) = e {
                if matches!(&*call.func, Expr::Name(n) if n.id.as_str() == name) {
                    calls_itself = true;
                }
            }
        });
        if calls_itself {
            self.recursion = true;
            self.note(line, FindingKind::Recursion, format!("Recursive function: {name}"));
        }
        self.block(body, 0);
    }

    /// `mid = (left + right) // 2` and friends.
    fn midpoint(&mut self, stmt: &Stmt, targets: &[Expr], value: &Expr) {
        let is_mid = targets
            .iter()
            .any(|t| matches!(t, Expr::Name(n) if n.id.as_str().contains("mid")));
        if !is_mid {
            return;
        }
        let mut names = Vec::new();
        walk_expr(value, &mut |e| {
            if let Expr::Name(n) = e {
                names.push(n.id.as_str().to_string());
            }
        });
        let low = names.iter().any(|n| LOW_NAMES.contains(&n.as_str()));
        let high = names.iter().any(|n| HIGH_NAMES.contains(&n.as_str()));
        if low && high {
            self.bsearch = true;
            self.note(self.line_of(stmt), FindingKind::Bsearch, "Binary search pattern");
        }
    }

    fn expr(&mut self, expr: &Expr) {
        let line = self.line_of(expr);
        match expr {
            Expr::Call(call) => match callee_name(&call.func) {
                Some("sorted") => self.sorting_at(line),
                Some("sort") if matches!(&*call.func, Expr::Attribute(_)) => self.sorting_at(line),
                Some("list") => self.list = true,
                Some(name) if name.contains("bisect") || name == "binary_search" => {
                    self.bsearch = true;
                    self.note(line, FindingKind::Bsearch, "Binary search pattern");
                }
                _ => {}
            },
            Expr::Name(name) => {
                let lowered = name.id.as_str().to_lowercase();
                if GRAPH_HINTS.iter().any(|hint| lowered.contains(hint)) {
                    self.graph = true;
                    self.note(line, FindingKind::Graph, "Graph traversal pattern");
                }
                if lowered.contains("memo") {
                    self.dp = true;
                    self.note(line, FindingKind::Dp, "DP/Memoization pattern");
                }
            }
            Expr::Subscript(sub) => {
                if matches!(&*sub.value, Expr::Name(n) if n.id.as_str() == "dp") {
                    self.dp = true;
                    self.note(line, FindingKind::Dp, "DP/Memoization pattern");
                }
            }
            Expr::List(list) => {
                self.list = true;
                if list.elts.iter().any(is_list_like) {
                    self.nested_list = true;
                }
            }
            Expr::ListComp(comp) => {
                self.list = true;
                if is_list_like(&comp.elt) {
                    self.nested_list = true;
                }
            }
            _ => {}
        }
    }

    fn sorting_at(&mut self, line: usize) {
        self.sorting = true;
        self.note(line, FindingKind::Sort, "Sorting operation");
    }

    fn time(&self) -> &'static str {
        if self.recursion && self.dp {
            "O(n) with memo"
        } else if self.recursion {
            "O(2^n) possible"
        } else if self.max_depth >= 3 {
            "O(n³)"
        } else if self.max_depth == 2 {
            if self.sorting {
                "O(n² log n)"
            } else {
                "O(n²)"
            }
        } else if self.max_depth == 1 {
            if self.sorting || self.bsearch {
                "O(n log n)"
            } else {
                "O(n)"
            }
        } else if self.sorting {
            "O(n log n)"
        } else if self.bsearch {
            "O(log n)"
        } else {
            "O(1)"
        }
    }

    fn space(&self) -> &'static str {
        if self.dp || self.nested_list {
            "O(n²)"
        } else if self.list || self.graph {
            "O(n)"
        } else {
            "O(1)"
        }
    }

    fn finish(mut self) -> ComplexityReport {
        self.findings.sort_by_key(|f| f.line);
        ComplexityReport {
            time: self.time().to_string(),
            space: self.space().to_string(),
            loop_depth: self.max_depth,
            has_recursion: self.recursion,
            has_sorting: self.sorting,
            has_binary_search: self.bsearch,
            has_graph: self.graph,
            has_dp: self.dp,
            findings: self.findings,
        }
    }
}

fn is_list_like(expr: &Expr) -> bool {
    match expr {
        Expr::List(_) | Expr::ListComp(_) => true,
        Expr::BinOp(op) => is_list_like(&op.left) || is_list_like(&op.right),
        _ => false,
    }
}

/// Estimate time and space complexity of a program.
pub fn estimate(source: &str) -> Result<ComplexityReport, TraceError> {
    let body = parse_raw(source, "<analysis>")?;
    let mut scan = Scan {
        index: Some(LineIndex::new(source)),
        ..Scan::default()
    };
    scan.block(&body, 0);
    Ok(scan.finish())
}

/// Cost class shown in the gutter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Cost {
    #[serde(rename = "0")]
    Zero,
    #[serde(rename = "1")]
    Constant,
    #[serde(rename = "logn")]
    Log,
    #[serde(rename = "n")]
    Linear,
    #[serde(rename = "nlogn")]
    NLogN,
    #[serde(rename = "n²")]
    Quadratic,
    #[serde(rename = "n³")]
    Cubic,
}

impl Cost {
    fn of_depth(depth: usize) -> Self {
        match depth {
            0 => Cost::Constant,
            1 => Cost::Linear,
            2 => Cost::Quadratic,
            _ => Cost::Cubic,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Cost::Zero => "0",
            Cost::Constant => "1",
            Cost::Log => "logn",
            Cost::Linear => "n",
            Cost::NLogN => "nlogn",
            Cost::Quadratic => "n²",
            Cost::Cubic => "n³",
        }
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Gutter entry for one source line: `time | space | line`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineCost {
    pub line: usize,
    pub time: Cost,
    pub space: Cost,
}

static INPUT_LIST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"list\s*\(.*input|input\(\)\.split|map\s*\(.*input").expect("valid regex"));
static SCALAR_INPUT: Lazy<Regex> = Lazy::new(|| Regex::new(r"=.*input\(\)").expect("valid regex"));
static LIST_WORDS: Lazy<Regex> = Lazy::new(|| Regex::new(r"list|split|map").expect("valid regex"));
static TWO_D: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\[|\[.*for.*for").expect("valid regex"));
static LIST_NEW: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\s*\]|list\(|=\s*\[").expect("valid regex"));
static MAP_NEW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\s*\}|dict\(|set\(|defaultdict|Counter").expect("valid regex"));
static LOOP: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(for|while)\s").expect("valid regex"));
static SORT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.sort\(|sorted\(").expect("valid regex"));

/// Per-line cost gutter, from indentation and line patterns.
pub fn line_costs(source: &str) -> Vec<LineCost> {
    let mut loop_indents: Vec<usize> = Vec::new();
    let mut costs = Vec::new();

    for (idx, line) in source.split('\n').enumerate() {
        let trimmed = line.trim();
        let number = idx + 1;
        if trimmed.is_empty() || trimmed.starts_with('#') {
            costs.push(LineCost {
                line: number,
                time: Cost::Zero,
                space: Cost::Zero,
            });
            continue;
        }

        let indent = line.len() - line.trim_start().len();
        while loop_indents.last().is_some_and(|&top| indent <= top) {
            loop_indents.pop();
        }

        let space = if INPUT_LIST.is_match(trimmed) {
            Cost::Linear
        } else if SCALAR_INPUT.is_match(trimmed) && !LIST_WORDS.is_match(trimmed) {
            Cost::Constant
        } else if TWO_D.is_match(trimmed) {
            Cost::Quadratic
        } else if LIST_NEW.is_match(trimmed) || MAP_NEW.is_match(trimmed) {
            Cost::Linear
        } else {
            Cost::Constant
        };

        let time = if LOOP.is_match(trimmed) {
            loop_indents.push(indent);
            Cost::of_depth(loop_indents.len())
        } else if SORT.is_match(trimmed) {
            Cost::NLogN
        } else if trimmed.contains("bisect") {
            Cost::Log
        } else {
            Cost::of_depth(loop_indents.len())
        };

        costs.push(LineCost {
            line: number,
            time,
            space,
        });
    }
    costs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(report: &ComplexityReport) -> Vec<FindingKind> {
        report.findings.iter().map(|f| f.kind).collect()
    }

    #[test]
    fn test_constant_program() {
        let report = estimate("a = 1\nb = a + 2\nprint(b)\n").unwrap();
        assert_eq!(report.time, "O(1)");
        assert_eq!(report.space, "O(1)");
        assert!(report.findings.is_empty());
    }

    #[test]
    fn test_nested_loops() {
        let source = "n = int(input())\nfor i in range(n):\n    for j in range(n):\n        print(i, j)\n";
        let report = estimate(source).unwrap();
        assert_eq!(report.loop_depth, 2);
        assert_eq!(report.time, "O(n²)");
        assert_eq!(report.findings[1].message, "Loop detected (depth 2)");
        assert_eq!(report.findings[1].line, 3);
    }

    #[test]
    fn test_sequential_loops_do_not_nest() {
        let source = "for i in range(3):\n    pass\nfor j in range(3):\n    pass\n";
        assert_eq!(estimate(source).unwrap().loop_depth, 1);
    }

    #[test]
    fn test_sort_inside_loop() {
        let source = "xs = [3, 1, 2]\nfor _ in range(2):\n    xs.sort()\n";
        let report = estimate(source).unwrap();
        assert_eq!(report.time, "O(n log n)");
        assert_eq!(report.space, "O(n)");
        assert!(report.has_sorting);
    }

    #[test]
    fn test_recursion_with_and_without_memo() {
        let plain = estimate("def f(n):\n    return f(n - 1) if n else 0\n").unwrap();
        assert_eq!(plain.time, "O(2^n) possible");
        assert_eq!(kinds(&plain), vec![FindingKind::Recursion]);

        let memo = estimate(
            "from functools import lru_cache\n@lru_cache(None)\ndef f(n):\n    return f(n - 1) if n else 0\n",
        )
        .unwrap();
        assert_eq!(memo.time, "O(n) with memo");
        assert_eq!(memo.space, "O(n²)");
    }

    #[test]
    fn test_binary_search_patterns() {
        let source = "left, right = 0, 10\nwhile left < right:\n    mid = (left + right) // 2\n    right = mid\n";
        let report = estimate(source).unwrap();
        assert!(report.has_binary_search);
        assert_eq!(report.time, "O(n log n)");

        let bisect = estimate("import bisect\ni = bisect.bisect_left([1, 2], 2)\n").unwrap();
        assert_eq!(bisect.time, "O(log n)");
    }

    #[test]
    fn test_graph_and_grid_space() {
        let graph = estimate("from collections import deque\nq = deque([0])\n").unwrap();
        assert!(graph.has_graph);
        assert_eq!(graph.space, "O(n)");

        let grid = estimate("grid = [[0] * 3 for _ in range(3)]\n").unwrap();
        assert_eq!(grid.space, "O(n²)");
    }

    #[test]
    fn test_line_costs_follow_indentation() {
        let source = "n = int(input())\nxs = list(map(int, input().split()))\nfor i in range(n):\n    for j in range(n):\n        xs.append(i)\n\n    print(i)\nxs.sort()\n";
        let costs = line_costs(source);
        let labels: Vec<(String, String)> = costs
            .iter()
            .map(|c| (c.time.to_string(), c.space.to_string()))
            .collect();
        assert_eq!(labels[0], ("1".to_string(), "1".to_string()));
        assert_eq!(labels[1], ("1".to_string(), "n".to_string()));
        assert_eq!(labels[2].0, "n");
        assert_eq!(labels[3].0, "n²");
        assert_eq!(labels[4].0, "n²");
        assert_eq!(labels[5], ("0".to_string(), "0".to_string()));
        assert_eq!(labels[6].0, "n");
        assert_eq!(labels[7].0, "nlogn");
    }

    #[test]
    fn test_line_costs_two_dimensional_space() {
        let costs = line_costs("grid = [[0] * m for _ in range(n)]");
        assert_eq!(costs[0].space, Cost::Quadratic);
    }
}
