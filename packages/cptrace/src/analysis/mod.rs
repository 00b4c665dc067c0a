//! Static overlays computed from source alone: complexity estimate, per-line
//! cost gutter and variable detection.

pub mod complexity;
pub mod variables;

use crate::error::TraceError;
use rustpython_ast::{Comprehension, ExceptHandler, Expr, Stmt};
use serde::Serialize;
use std::iter::once;

pub use complexity::{estimate, line_costs, ComplexityReport, Cost, Finding, FindingKind, LineCost};
pub use variables::{
    data_structure_kind, detect, heap_levels, parse_adjacency, parse_matrix, DetectedVariable, StructureKind, VarType,
};

/// All overlays for one file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAnalysis {
    pub path: String,
    pub complexity: ComplexityReport,
    pub line_costs: Vec<LineCost>,
    pub variables: Vec<DetectedVariable>,
}

impl FileAnalysis {
    pub fn from_source(path: &str, source: &str) -> Result<Self, TraceError> {
        Ok(Self {
            path: path.to_string(),
            complexity: estimate(source)?,
            line_costs: line_costs(source),
            variables: detect(source)?,
        })
    }
}

fn comprehension_exprs<'a>(elts: Vec<&'a Expr>, generators: &'a [Comprehension]) -> Vec<&'a Expr> {
    let mut exprs = elts;
    for generator in generators {
        exprs.push(&generator.target);
        exprs.push(&generator.iter);
        exprs.extend(generator.ifs.iter());
    }
    exprs
}

/// Direct sub-expressions of `expr`.
fn sub_exprs(expr: &Expr) -> Vec<&Expr> {
    match expr {
        Expr::BoolOp(e) => e.values.iter().collect(),
        Expr::NamedExpr(e) => vec![&*e.target, &*e.value],
        Expr::BinOp(e) => vec![&*e.left, &*e.right],
        Expr::UnaryOp(e) => vec![&*e.operand],
        Expr::Lambda(e) => vec![&*e.body],
        Expr::IfExp(e) => vec![&*e.test, &*e.body, &*e.orelse],
        Expr::Dict(e) => e.keys.iter().flatten().chain(e.values.iter()).collect(),
        Expr::Set(e) => e.elts.iter().collect(),
        Expr::ListComp(e) => comprehension_exprs(vec![&*e.elt], &e.generators),
        Expr::SetComp(e) => comprehension_exprs(vec![&*e.elt], &e.generators),
        Expr::GeneratorExp(e) => comprehension_exprs(vec![&*e.elt], &e.generators),
        Expr::DictComp(e) => comprehension_exprs(vec![&*e.key, &*e.value], &e.generators),
        Expr::Await(e) => vec![&*e.value],
        Expr::Yield(e) => e.value.as_deref().into_iter().collect(),
        Expr::YieldFrom(e) => vec![&*e.value],
        Expr::Compare(e) => once(&*e.left).chain(e.comparators.iter()).collect(),
        Expr::Call(e) => once(&*e.func)
            .chain(e.args.iter())
            .chain(e.keywords.iter().map(|k| &k.value))
            .collect(),
        Expr::FormattedValue(e) => once(&*e.value).chain(e.format_spec.as_deref()).collect(),
        Expr::JoinedStr(e) => e.values.iter().collect(),
        Expr::Attribute(e) => vec![&*e.value],
        Expr::Subscript(e) => vec![&*e.value, &*e.slice],
        Expr::Starred(e) => vec![&*e.value],
        Expr::List(e) => e.elts.iter().collect(),
        Expr::Tuple(e) => e.elts.iter().collect(),
        Expr::Slice(e) => [&e.lower, &e.upper, &e.step]
            .into_iter()
            .flat_map(|part| part.as_deref())
            .collect(),
        _ => Vec::new(),
    }
}

/// Pre-order walk over `expr` and everything below it.
pub(crate) fn walk_expr<'a>(expr: &'a Expr, visit: &mut impl FnMut(&'a Expr)) {
    visit(expr);
    for child in sub_exprs(expr) {
        walk_expr(child, visit);
    }
}

/// Expressions held by `stmt` itself, not by its nested blocks.
pub(crate) fn stmt_exprs(stmt: &Stmt) -> Vec<&Expr> {
    match stmt {
        Stmt::FunctionDef(s) => s.decorator_list.iter().collect(),
        Stmt::AsyncFunctionDef(s) => s.decorator_list.iter().collect(),
        Stmt::ClassDef(s) => s.bases.iter().chain(s.decorator_list.iter()).collect(),
        Stmt::Return(s) => s.value.as_deref().into_iter().collect(),
        Stmt::Delete(s) => s.targets.iter().collect(),
        Stmt::Assign(s) => s.targets.iter().chain(once(&*s.value)).collect(),
        Stmt::AugAssign(s) => vec![&*s.target, &*s.value],
        Stmt::AnnAssign(s) => once(&*s.target).chain(s.value.as_deref()).collect(),
        Stmt::For(s) => vec![&*s.target, &*s.iter],
        Stmt::AsyncFor(s) => vec![&*s.target, &*s.iter],
        Stmt::While(s) => vec![&*s.test],
        Stmt::If(s) => vec![&*s.test],
        Stmt::With(s) => s
            .items
            .iter()
            .flat_map(|item| once(&item.context_expr).chain(item.optional_vars.as_deref()))
            .collect(),
        Stmt::Match(s) => once(&*s.subject)
            .chain(s.cases.iter().filter_map(|case| case.guard.as_deref()))
            .collect(),
        Stmt::Raise(s) => s.exc.as_deref().into_iter().chain(s.cause.as_deref()).collect(),
        Stmt::Try(s) => handler_types(&s.handlers),
        Stmt::TryStar(s) => handler_types(&s.handlers),
        Stmt::Assert(s) => once(&*s.test).chain(s.msg.as_deref()).collect(),
        Stmt::Expr(s) => vec![&*s.value],
        _ => Vec::new(),
    }
}

fn handler_types(handlers: &[ExceptHandler]) -> Vec<&Expr> {
    handlers
        .iter()
        .filter_map(|handler| {
            let ExceptHandler::ExceptHandler(h) = handler;
            h.type_.as_deref()
        })
        .collect()
}

fn handler_bodies(handlers: &[ExceptHandler]) -> impl Iterator<Item = &[Stmt]> {
    handlers.iter().map(|handler| {
        let ExceptHandler::ExceptHandler(h) = handler;
        h.body.as_slice()
    })
}

/// Nested statement blocks of `stmt`, in source order.
pub(crate) fn child_blocks(stmt: &Stmt) -> Vec<&[Stmt]> {
    match stmt {
        Stmt::FunctionDef(s) => vec![s.body.as_slice()],
        Stmt::AsyncFunctionDef(s) => vec![s.body.as_slice()],
        Stmt::ClassDef(s) => vec![s.body.as_slice()],
        Stmt::For(s) => vec![s.body.as_slice(), s.orelse.as_slice()],
        Stmt::AsyncFor(s) => vec![s.body.as_slice(), s.orelse.as_slice()],
        Stmt::While(s) => vec![s.body.as_slice(), s.orelse.as_slice()],
        Stmt::If(s) => vec![s.body.as_slice(), s.orelse.as_slice()],
        Stmt::With(s) => vec![s.body.as_slice()],
        Stmt::AsyncWith(s) => vec![s.body.as_slice()],
        Stmt::Match(s) => s.cases.iter().map(|case| case.body.as_slice()).collect(),
        Stmt::Try(s) => once(s.body.as_slice())
            .chain(handler_bodies(&s.handlers))
            .chain([s.orelse.as_slice(), s.finalbody.as_slice()])
            .collect(),
        Stmt::TryStar(s) => once(s.body.as_slice())
            .chain(handler_bodies(&s.handlers))
            .chain([s.orelse.as_slice(), s.finalbody.as_slice()])
            .collect(),
        _ => Vec::new(),
    }
}

/// Pre-order walk over every statement of `stmts`, nested blocks included.
pub(crate) fn walk_stmts<'a>(stmts: &'a [Stmt], visit: &mut impl FnMut(&'a Stmt)) {
    for stmt in stmts {
        visit(stmt);
        for block in child_blocks(stmt) {
            walk_stmts(block, visit);
        }
    }
}

/// Every expression anywhere under `stmts`.
pub(crate) fn walk_block_exprs<'a>(stmts: &'a [Stmt], visit: &mut impl FnMut(&'a Expr)) {
    walk_stmts(stmts, &mut |stmt| {
        for expr in stmt_exprs(stmt) {
            walk_expr(expr, visit);
        }
    });
}

/// Name of the called function: `f` for `f(...)`, `m` for `x.m(...)`.
pub(crate) fn callee_name(func: &Expr) -> Option<&str> {
    match func {
        Expr::Name(name) => Some(name.id.as_str()),
        Expr::Attribute(attr) => Some(attr.attr.as_str()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse_raw;

    #[test]
    fn test_walk_reaches_nested_expressions() {
        let body = parse_raw(
            "def f(xs):\n    for x in xs:\n        if x:\n            print(sorted([x]))\n",
            "<test>",
        )
        .unwrap();
        let mut callees = Vec::new();
        walk_block_exprs(&body, &mut |expr| {
            if let Expr::Call(call) = expr {
                callees.extend(callee_name(&call.func).map(str::to_string));
            }
        });
        assert_eq!(callees, vec!["print", "sorted"]);
    }

    #[test]
    fn test_file_analysis_combines_overlays() {
        let analysis = FileAnalysis::from_source("a.py", "n = int(input())\nfor i in range(n):\n    print(i)\n").unwrap();
        assert_eq!(analysis.complexity.time, "O(n)");
        assert_eq!(analysis.line_costs.len(), 4);
        assert_eq!(analysis.variables[0].name, "n");
    }
}
