//! Variable detection and data-structure recognition for the live values panel.

use super::{callee_name, walk_expr, walk_stmts};
use crate::error::TraceError;
use crate::syntax::parse_raw;
use crate::syntax::source::LineIndex;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use rustpython_ast::{Constant, Expr, Ranged, Stmt};
use serde::Serialize;
use std::collections::HashSet;

/// Loop counters and receivers that are never listed.
const SKIPPED_NAMES: &[&str] = &["t", "i", "j", "k", "_", "self"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VarType {
    List,
    Int,
    Str,
    Dict,
    Float,
    Set,
    Other,
}

impl VarType {
    pub fn icon(&self) -> &'static str {
        match self {
            VarType::List => "[]",
            VarType::Int => "#",
            VarType::Str => "Aa",
            VarType::Dict => "{:}",
            VarType::Set => "{}",
            VarType::Float => ".0",
            VarType::Other => "?",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedVariable {
    pub name: String,
    pub var_type: VarType,
    pub line: usize,
}

fn mentions_input(expr: &Expr) -> bool {
    let mut found = false;
    walk_expr(expr, &mut |e| {
        if let Expr::Call(call) = e {
            if matches!(&*call.func, Expr::Name(n) if n.id.as_str() == "input") {
                found = true;
            }
        }
    });
    found
}

fn guess_type(value: &Expr) -> VarType {
    match value {
        Expr::List(_) | Expr::ListComp(_) => VarType::List,
        Expr::Dict(_) | Expr::DictComp(_) => VarType::Dict,
        Expr::Set(_) | Expr::SetComp(_) => VarType::Set,
        Expr::JoinedStr(_) => VarType::Str,
        Expr::Constant(c) => match &c.value {
            Constant::Int(_) => VarType::Int,
            Constant::Float(_) => VarType::Float,
            Constant::Str(_) => VarType::Str,
            _ => VarType::Other,
        },
        Expr::Call(call) => match callee_name(&call.func) {
            Some("list" | "sorted" | "split") => VarType::List,
            Some("int" | "len") => VarType::Int,
            Some("float") => VarType::Float,
            Some("dict" | "defaultdict" | "Counter") => VarType::Dict,
            Some("set") => VarType::Set,
            Some("str" | "input") => VarType::Str,
            Some("map" | "zip" | "filter" | "range") => VarType::Other,
            _ if mentions_input(value) => VarType::Str,
            _ => VarType::Other,
        },
        _ => VarType::Other,
    }
}

/// Assigned names in source order with a guess at their type.
///
/// Only single-name targets count; the first assignment of a name wins.
pub fn detect(source: &str) -> Result<Vec<DetectedVariable>, TraceError> {
    let body = parse_raw(source, "<analysis>")?;
    let index = LineIndex::new(source);
    let mut seen = HashSet::new();
    let mut found = Vec::new();

    walk_stmts(&body, &mut |stmt| {
        let (target, value) = match stmt {
            Stmt::Assign(assign) if assign.targets.len() == 1 => (&assign.targets[0], &*assign.value),
            Stmt::AnnAssign(ann) => match ann.value.as_deref() {
                Some(value) => (&*ann.target, value),
                None => return,
            },
            _ => return,
        };
        let Expr::Name(name) = target else {
            return;
        };
        let name = name.id.as_str();
        if SKIPPED_NAMES.contains(&name) || !seen.insert(name.to_string()) {
            return;
        }
        found.push(DetectedVariable {
            name: name.to_string(),
            var_type: guess_type(value),
            line: index.line_of(stmt.range().start().to_usize()),
        });
    });
    Ok(found)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StructureKind {
    Graph,
    Tree,
    Heap,
    Matrix,
}

impl StructureKind {
    pub fn label(&self) -> &'static str {
        match self {
            StructureKind::Graph => "graph",
            StructureKind::Tree => "tree",
            StructureKind::Heap => "heap",
            StructureKind::Matrix => "matrix",
        }
    }
}

static MATRIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[\[[\d,\-\[\]]+\]\]$").expect("valid regex"));
static DEFAULTDICT_HEAD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^defaultdict\(<class '.*?'>,\s*").expect("valid regex"));
static ADJACENCY_ENTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|,)\s*([^:,\[\]{}]+?)\s*:\s*[\[{(]([^\]})]*)[\]})]").expect("valid regex")
});
static MATRIX_ROW: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\[\]]*)\]").expect("valid regex"));

/// Recognize a visualizable structure from a global's name and rendered value.
pub fn data_structure_kind(name: &str, value: &str) -> Option<StructureKind> {
    let lowered = name.to_lowercase();
    if (lowered.contains("graph") || lowered.contains("adj"))
        && (value.starts_with('{') || value.starts_with("defaultdict"))
    {
        return Some(StructureKind::Graph);
    }
    if ["tree", "parent", "child"].iter().any(|hint| lowered.contains(hint)) {
        return Some(StructureKind::Tree);
    }
    if ["heap", "pq", "priority"].iter().any(|hint| lowered.contains(hint)) {
        return Some(StructureKind::Heap);
    }
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    if MATRIX.is_match(&compact) {
        return Some(StructureKind::Matrix);
    }
    None
}

fn split_items(text: &str) -> Vec<String> {
    text.split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Parse a rendered adjacency mapping such as `{0: [1, 2], 1: [0]}`,
/// optionally wrapped in `defaultdict(<class 'list'>, ...)`.
pub fn parse_adjacency(value: &str) -> IndexMap<String, Vec<String>> {
    let trimmed = value.trim();
    let unwrapped = match DEFAULTDICT_HEAD.find(trimmed) {
        Some(head) => trimmed[head.end()..].strip_suffix(')').unwrap_or(&trimmed[head.end()..]),
        None => trimmed,
    };
    let mut adjacency = IndexMap::new();
    let (Some(open), Some(close)) = (unwrapped.find('{'), unwrapped.rfind('}')) else {
        return adjacency;
    };
    if close <= open {
        return adjacency;
    }
    for entry in ADJACENCY_ENTRY.captures_iter(&unwrapped[open + 1..close]) {
        adjacency.insert(entry[1].trim().to_string(), split_items(&entry[2]));
    }
    adjacency
}

/// Split a rendered heap list into binary-tree levels of 1, 2, 4, ... nodes.
pub fn heap_levels(value: &str) -> Option<Vec<Vec<String>>> {
    let inner = value.trim().strip_prefix('[')?.strip_suffix(']')?;
    let items = split_items(inner);
    let mut levels = Vec::new();
    let mut rest = items.as_slice();
    let mut width = 1;
    while !rest.is_empty() {
        let take = width.min(rest.len());
        levels.push(rest[..take].to_vec());
        rest = &rest[take..];
        width *= 2;
    }
    Some(levels)
}

/// Rows of a rendered numeric 2-D list.
pub fn parse_matrix(value: &str) -> Option<Vec<Vec<String>>> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    if !MATRIX.is_match(&compact) {
        return None;
    }
    let inner = &compact[1..compact.len() - 1];
    Some(
        MATRIX_ROW
            .captures_iter(inner)
            .map(|row| split_items(&row[1]))
            .collect(),
    )
}
