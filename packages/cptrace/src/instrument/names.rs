//! Name collection and reserved-identifier checks over the syntax tree.

use crate::error::TraceError;
use crate::syntax::ast::*;
use crate::tracer::{is_reserved, RESERVED_PREFIX};

/// Plain names bound by an assignment target, including tuple and list
/// destructuring.
pub fn target_names(target: &Expr) -> Vec<String> {
    let mut names = Vec::new();
    collect_target_names(target, &mut names);
    names
}

fn collect_target_names(target: &Expr, names: &mut Vec<String>) {
    match target {
        Expr::Name(id) if !is_reserved(id) => names.push(id.clone()),
        Expr::Tuple(elts) | Expr::List(elts) => {
            for elt in elts {
                collect_target_names(elt, names);
            }
        }
        Expr::Starred(value) => collect_target_names(value, names),
        _ => {}
    }
}

/// Names assigned anywhere in a loop body, in order of first appearance.
/// Nested function and class bodies are not entered.
pub fn assigned_names(body: &[Stmt]) -> Vec<String> {
    let mut names = Vec::new();
    walk_assigned(body, &mut names);
    names
}

fn push(name: String, names: &mut Vec<String>) {
    if !names.contains(&name) {
        names.push(name);
    }
}

fn walk_assigned(body: &[Stmt], names: &mut Vec<String>) {
    for stmt in body {
        match stmt {
            Stmt::Assign { targets, .. } => {
                for target in targets {
                    for name in target_names(target) {
                        push(name, names);
                    }
                }
            }
            Stmt::AugAssign { target, .. } | Stmt::AnnAssign { target, .. } => {
                if let Some(name) = target.as_name() {
                    if !is_reserved(name) {
                        push(name.to_string(), names);
                    }
                }
            }
            Stmt::For { body, orelse, .. } | Stmt::While { body, orelse, .. } => {
                walk_assigned(body, names);
                walk_assigned(orelse, names);
            }
            Stmt::If { body, orelse, .. } => {
                walk_assigned(body, names);
                walk_assigned(orelse, names);
            }
            Stmt::With { body, .. } => walk_assigned(body, names),
            Stmt::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                walk_assigned(body, names);
                for handler in handlers {
                    walk_assigned(&handler.body, names);
                }
                walk_assigned(orelse, names);
                walk_assigned(finalbody, names);
            }
            _ => {}
        }
    }
}

/// Reject programs that already use identifiers from the tracer's namespace.
pub fn check_reserved(module: &Module) -> Result<(), TraceError> {
    let mut checker = ReservedChecker { line: 1 };
    checker.block(&module.body)
}

struct ReservedChecker {
    /// Most recent source line known during the walk.
    line: usize,
}

impl ReservedChecker {
    fn name(&self, name: &str) -> Result<(), TraceError> {
        if is_reserved(name) {
            return Err(TraceError::unsupported(format!("reserved identifier `{name}`"), self.line));
        }
        Ok(())
    }

    fn fragment(&self, fragment: &Fragment) -> Result<(), TraceError> {
        if fragment.text.contains(RESERVED_PREFIX) {
            return Err(TraceError::unsupported(
                format!("reserved prefix `{RESERVED_PREFIX}` in source"),
                fragment.line,
            ));
        }
        Ok(())
    }

    fn block(&mut self, body: &[Stmt]) -> Result<(), TraceError> {
        body.iter().try_for_each(|stmt| self.stmt(stmt))
    }

    fn params(&mut self, params: &Parameters) -> Result<(), TraceError> {
        let all = params
            .posonly
            .iter()
            .chain(&params.args)
            .chain(&params.vararg)
            .chain(&params.kwonly)
            .chain(&params.kwarg);
        for param in all {
            self.name(&param.name)?;
            if let Some(annotation) = &param.annotation {
                self.expr(annotation)?;
            }
            if let Some(default) = &param.default {
                self.expr(default)?;
            }
        }
        Ok(())
    }

    fn exprs(&mut self, exprs: &[Expr]) -> Result<(), TraceError> {
        exprs.iter().try_for_each(|e| self.expr(e))
    }

    fn keywords(&mut self, keywords: &[Keyword]) -> Result<(), TraceError> {
        for keyword in keywords {
            if let Some(arg) = &keyword.arg {
                self.name(arg)?;
            }
            self.expr(&keyword.value)?;
        }
        Ok(())
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<(), TraceError> {
        match stmt {
            Stmt::FunctionDef(func) => {
                self.line = func.line;
                self.name(&func.name)?;
                self.params(&func.params)?;
                self.exprs(&func.decorators)?;
                if let Some(returns) = &func.returns {
                    self.expr(returns)?;
                }
                self.block(&func.body)
            }
            Stmt::ClassDef(class) => {
                self.name(&class.name)?;
                self.exprs(&class.bases)?;
                self.keywords(&class.keywords)?;
                self.exprs(&class.decorators)?;
                self.block(&class.body)
            }
            Stmt::Return { value } | Stmt::Raise { exc: value } => match value {
                Some(value) => self.expr(value),
                None => Ok(()),
            },
            Stmt::Assign { targets, value } => {
                self.exprs(targets)?;
                self.expr(value)
            }
            Stmt::AugAssign { target, value, .. } => {
                self.expr(target)?;
                self.expr(value)
            }
            Stmt::AnnAssign {
                target,
                annotation,
                value,
                ..
            } => {
                self.expr(target)?;
                self.expr(annotation)?;
                match value {
                    Some(value) => self.expr(value),
                    None => Ok(()),
                }
            }
            Stmt::For {
                target,
                iter,
                body,
                orelse,
            } => {
                self.expr(target)?;
                self.expr(iter)?;
                self.block(body)?;
                self.block(orelse)
            }
            Stmt::While { test, body, orelse } => {
                self.expr(test)?;
                self.block(body)?;
                self.block(orelse)
            }
            Stmt::If {
                test,
                body,
                orelse,
                line,
                ..
            } => {
                self.line = *line;
                self.expr(test)?;
                self.block(body)?;
                self.block(orelse)
            }
            Stmt::With { items, body } => {
                for item in items {
                    self.expr(&item.context)?;
                    if let Some(vars) = &item.vars {
                        self.expr(vars)?;
                    }
                }
                self.block(body)
            }
            Stmt::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                self.block(body)?;
                for handler in handlers {
                    if let Some(kind) = &handler.kind {
                        self.expr(kind)?;
                    }
                    if let Some(name) = &handler.name {
                        self.name(name)?;
                    }
                    self.block(&handler.body)?;
                }
                self.block(orelse)?;
                self.block(finalbody)
            }
            Stmt::Assert { test, msg } => {
                self.expr(test)?;
                match msg {
                    Some(msg) => self.expr(msg),
                    None => Ok(()),
                }
            }
            Stmt::Delete(targets) => self.exprs(targets),
            Stmt::Import(names) | Stmt::ImportFrom { names, .. } => {
                names.iter().try_for_each(|alias| self.name(alias.binding()))
            }
            Stmt::Global(names) | Stmt::Nonlocal(names) => {
                names.iter().try_for_each(|name| self.name(name))
            }
            Stmt::Expr(expr) => self.expr(expr),
            Stmt::Pass | Stmt::Break | Stmt::Continue => Ok(()),
            Stmt::Opaque(fragment) => self.fragment(fragment),
        }
    }

    fn comprehensions(&mut self, generators: &[Comprehension]) -> Result<(), TraceError> {
        for generator in generators {
            self.expr(&generator.target)?;
            self.expr(&generator.iter)?;
            self.exprs(&generator.ifs)?;
        }
        Ok(())
    }

    fn fstring(&mut self, parts: &[FStringPart]) -> Result<(), TraceError> {
        for part in parts {
            if let FStringPart::Value { value, spec, .. } = part {
                self.expr(value)?;
                self.fstring(spec)?;
            }
        }
        Ok(())
    }

    fn expr(&mut self, expr: &Expr) -> Result<(), TraceError> {
        match expr {
            Expr::Constant(_) => Ok(()),
            Expr::Name(id) => self.name(id),
            Expr::Attribute { value, .. } => self.expr(value),
            Expr::Subscript { value, slice } => {
                self.expr(value)?;
                self.expr(slice)
            }
            Expr::Slice { lower, upper, step } => {
                for part in [lower, upper, step].into_iter().flatten() {
                    self.expr(part)?;
                }
                Ok(())
            }
            Expr::Call {
                func,
                args,
                keywords,
            } => {
                self.expr(func)?;
                self.exprs(args)?;
                self.keywords(keywords)
            }
            Expr::BinOp { left, right, .. } => {
                self.expr(left)?;
                self.expr(right)
            }
            Expr::UnaryOp { operand, .. } => self.expr(operand),
            Expr::BoolOp { values, .. } => self.exprs(values),
            Expr::Compare {
                left, comparators, ..
            } => {
                self.expr(left)?;
                self.exprs(comparators)
            }
            Expr::IfExp { test, body, orelse } => {
                self.expr(test)?;
                self.expr(body)?;
                self.expr(orelse)
            }
            Expr::List(elts) | Expr::Tuple(elts) | Expr::Set(elts) => self.exprs(elts),
            Expr::Dict { keys, values } => {
                for key in keys.iter().flatten() {
                    self.expr(key)?;
                }
                self.exprs(values)
            }
            Expr::Starred(value) => self.expr(value),
            Expr::Lambda { params, body } => {
                self.params(params)?;
                self.expr(body)
            }
            Expr::ListComp { elt, generators }
            | Expr::SetComp { elt, generators }
            | Expr::GeneratorExp { elt, generators } => {
                self.expr(elt)?;
                self.comprehensions(generators)
            }
            Expr::DictComp {
                key,
                value,
                generators,
            } => {
                self.expr(key)?;
                self.expr(value)?;
                self.comprehensions(generators)
            }
            Expr::FString { parts, .. } => self.fstring(parts),
            Expr::Opaque(fragment) => self.fragment(fragment),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse_module;

    #[test]
    fn test_assigned_names_stop_at_nested_definitions() {
        let module = parse_module(
            "a = 1\nb += 2\nx, (y, *z) = t\nif c:\n    d: int = 3\ndef f():\n    e = 4\nobj.attr = 5\n",
            "<test>",
        )
        .unwrap();
        assert_eq!(assigned_names(&module.body), vec!["a", "b", "x", "y", "z", "d"]);
    }

    #[test]
    fn test_reserved_identifiers_anywhere() {
        for source in [
            "def f(_cpt_x):\n    pass\n",
            "print(_cpt_tracer)\n",
            "import os as _cpt_os\n",
            "async def f():\n    _cpt = 1\n",
        ] {
            let module = parse_module(source, "<test>").unwrap();
            assert!(check_reserved(&module).is_err(), "accepted {source:?}");
        }
        let module = parse_module("cpt = 1\nobj._cpt = 2\n", "<test>").unwrap();
        assert!(check_reserved(&module).is_ok());
    }
}
