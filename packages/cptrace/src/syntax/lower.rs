//! Lowering from `rustpython-ast` into the crate's own syntax tree.

use super::ast::*;
use super::source::{dedent_fragment, slice_text, LineIndex};
use rustpython_ast as py;
use rustpython_ast::{ConversionFlag, Ranged};

pub struct Lowerer<'a> {
    source: &'a str,
    index: LineIndex,
}

impl<'a> Lowerer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            index: LineIndex::new(source),
        }
    }

    pub fn lower_module(&self, body: &[py::Stmt]) -> Module {
        Module {
            body: self.lower_block(body),
        }
    }

    fn line_of<T: Ranged>(&self, node: &T) -> usize {
        self.index.line_of(node.range().start().to_usize())
    }

    fn text_of<T: Ranged>(&self, node: &T) -> String {
        let range = node.range();
        slice_text(self.source, range.start().to_usize(), range.end().to_usize())
    }

    fn opaque_stmt(&self, stmt: &py::Stmt) -> Stmt {
        let start = stmt.range().start().to_usize();
        let column = self.index.column_of(start);
        Stmt::Opaque(Fragment {
            text: dedent_fragment(&self.text_of(stmt), column),
            line: self.line_of(stmt),
        })
    }

    fn opaque_expr(&self, expr: &py::Expr) -> Expr {
        Expr::Opaque(Fragment {
            text: self.text_of(expr),
            line: self.line_of(expr),
        })
    }

    fn lower_block(&self, stmts: &[py::Stmt]) -> Vec<Stmt> {
        stmts.iter().map(|stmt| self.lower_stmt(stmt)).collect()
    }

    fn lower_stmt(&self, stmt: &py::Stmt) -> Stmt {
        match stmt {
            py::Stmt::FunctionDef(func) if func.type_params.is_empty() => {
                Stmt::FunctionDef(FunctionDef {
                    name: func.name.as_str().to_string(),
                    params: self.lower_params(&func.args),
                    body: self.lower_block(&func.body),
                    decorators: self.lower_exprs(&func.decorator_list),
                    returns: func.returns.as_ref().map(|e| self.lower_expr(e)),
                    line: self.line_of(stmt),
                })
            }
            py::Stmt::ClassDef(class) if class.type_params.is_empty() => Stmt::ClassDef(ClassDef {
                name: class.name.as_str().to_string(),
                bases: self.lower_exprs(&class.bases),
                keywords: self.lower_keywords(&class.keywords),
                body: self.lower_block(&class.body),
                decorators: self.lower_exprs(&class.decorator_list),
            }),
            py::Stmt::Return(ret) => Stmt::Return {
                value: ret.value.as_ref().map(|e| self.lower_expr(e)),
            },
            py::Stmt::Assign(assign) => Stmt::Assign {
                targets: self.lower_exprs(&assign.targets),
                value: self.lower_expr(&assign.value),
            },
            py::Stmt::AugAssign(aug) => Stmt::AugAssign {
                target: self.lower_expr(&aug.target),
                op: lower_operator(&aug.op),
                value: self.lower_expr(&aug.value),
            },
            py::Stmt::AnnAssign(ann) => Stmt::AnnAssign {
                target: self.lower_expr(&ann.target),
                annotation: self.lower_expr(&ann.annotation),
                value: ann.value.as_ref().map(|e| self.lower_expr(e)),
                simple: ann.simple,
            },
            py::Stmt::For(for_stmt) => Stmt::For {
                target: self.lower_expr(&for_stmt.target),
                iter: self.lower_expr(&for_stmt.iter),
                body: self.lower_block(&for_stmt.body),
                orelse: self.lower_block(&for_stmt.orelse),
            },
            py::Stmt::While(while_stmt) => Stmt::While {
                test: self.lower_expr(&while_stmt.test),
                body: self.lower_block(&while_stmt.body),
                orelse: self.lower_block(&while_stmt.orelse),
            },
            py::Stmt::If(if_stmt) => Stmt::If {
                test: self.lower_expr(&if_stmt.test),
                body: self.lower_block(&if_stmt.body),
                orelse: self.lower_block(&if_stmt.orelse),
                line: self.line_of(if_stmt.test.as_ref()),
                test_source: self.text_of(if_stmt.test.as_ref()),
            },
            py::Stmt::With(with_stmt) => Stmt::With {
                items: with_stmt
                    .items
                    .iter()
                    .map(|item| WithItem {
                        context: self.lower_expr(&item.context_expr),
                        vars: item.optional_vars.as_ref().map(|e| self.lower_expr(e)),
                    })
                    .collect(),
                body: self.lower_block(&with_stmt.body),
            },
            py::Stmt::Try(try_stmt) => Stmt::Try {
                body: self.lower_block(&try_stmt.body),
                handlers: try_stmt
                    .handlers
                    .iter()
                    .map(|handler| {
                        let py::ExceptHandler::ExceptHandler(h) = handler;
                        Handler {
                            kind: h.type_.as_ref().map(|e| self.lower_expr(e)),
                            name: h.name.as_ref().map(|n| n.as_str().to_string()),
                            body: self.lower_block(&h.body),
                        }
                    })
                    .collect(),
                orelse: self.lower_block(&try_stmt.orelse),
                finalbody: self.lower_block(&try_stmt.finalbody),
            },
            py::Stmt::Raise(raise) if raise.cause.is_none() => Stmt::Raise {
                exc: raise.exc.as_ref().map(|e| self.lower_expr(e)),
            },
            py::Stmt::Assert(assert) => Stmt::Assert {
                test: self.lower_expr(&assert.test),
                msg: assert.msg.as_ref().map(|e| self.lower_expr(e)),
            },
            py::Stmt::Delete(delete) => Stmt::Delete(self.lower_exprs(&delete.targets)),
            py::Stmt::Import(import) => Stmt::Import(lower_aliases(&import.names)),
            py::Stmt::ImportFrom(import) => Stmt::ImportFrom {
                module: import.module.as_ref().map(|m| m.as_str().to_string()),
                names: lower_aliases(&import.names),
                level: import.level.map_or(0, |level| level.to_u32()),
            },
            py::Stmt::Global(global) => Stmt::Global(identifiers(&global.names)),
            py::Stmt::Nonlocal(nonlocal) => Stmt::Nonlocal(identifiers(&nonlocal.names)),
            py::Stmt::Expr(expr) => Stmt::Expr(self.lower_expr(&expr.value)),
            py::Stmt::Pass(_) => Stmt::Pass,
            py::Stmt::Break(_) => Stmt::Break,
            py::Stmt::Continue(_) => Stmt::Continue,
            _ => self.opaque_stmt(stmt),
        }
    }

    fn lower_params(&self, args: &py::Arguments) -> Parameters {
        let lower_with_default = |arg: &py::ArgWithDefault| Param {
            name: arg.def.arg.as_str().to_string(),
            annotation: arg.def.annotation.as_ref().map(|e| self.lower_expr(e)),
            default: arg.default.as_ref().map(|e| self.lower_expr(e)),
        };
        let lower_star = |arg: &py::Arg| Param {
            name: arg.arg.as_str().to_string(),
            annotation: arg.annotation.as_ref().map(|e| self.lower_expr(e)),
            default: None,
        };
        Parameters {
            posonly: args.posonlyargs.iter().map(lower_with_default).collect(),
            args: args.args.iter().map(lower_with_default).collect(),
            vararg: args.vararg.as_deref().map(lower_star),
            kwonly: args.kwonlyargs.iter().map(lower_with_default).collect(),
            kwarg: args.kwarg.as_deref().map(lower_star),
        }
    }

    fn lower_keywords(&self, keywords: &[py::Keyword]) -> Vec<Keyword> {
        keywords
            .iter()
            .map(|kw| Keyword {
                arg: kw.arg.as_ref().map(|a| a.as_str().to_string()),
                value: self.lower_expr(&kw.value),
            })
            .collect()
    }

    fn lower_exprs(&self, exprs: &[py::Expr]) -> Vec<Expr> {
        exprs.iter().map(|e| self.lower_expr(e)).collect()
    }

    fn lower_boxed(&self, expr: &py::Expr) -> Box<Expr> {
        Box::new(self.lower_expr(expr))
    }

    fn lower_comprehensions(&self, generators: &[py::Comprehension]) -> Option<Vec<Comprehension>> {
        if generators.iter().any(|g| g.is_async) {
            return None;
        }
        Some(
            generators
                .iter()
                .map(|g| Comprehension {
                    target: self.lower_expr(&g.target),
                    iter: self.lower_expr(&g.iter),
                    ifs: self.lower_exprs(&g.ifs),
                })
                .collect(),
        )
    }

    pub fn lower_expr(&self, expr: &py::Expr) -> Expr {
        match expr {
            py::Expr::Constant(c) => match self.lower_constant(&c.value) {
                Some(value) => Expr::Constant(Literal {
                    value,
                    text: Some(self.text_of(expr)),
                }),
                None => self.opaque_expr(expr),
            },
            py::Expr::Name(n) => Expr::Name(n.id.as_str().to_string()),
            py::Expr::Attribute(a) => Expr::Attribute {
                value: self.lower_boxed(&a.value),
                attr: a.attr.as_str().to_string(),
            },
            py::Expr::Subscript(s) => Expr::Subscript {
                value: self.lower_boxed(&s.value),
                slice: self.lower_boxed(&s.slice),
            },
            py::Expr::Slice(s) => Expr::Slice {
                lower: s.lower.as_ref().map(|e| self.lower_boxed(e)),
                upper: s.upper.as_ref().map(|e| self.lower_boxed(e)),
                step: s.step.as_ref().map(|e| self.lower_boxed(e)),
            },
            py::Expr::Call(call) => Expr::Call {
                func: self.lower_boxed(&call.func),
                args: self.lower_exprs(&call.args),
                keywords: self.lower_keywords(&call.keywords),
            },
            py::Expr::BinOp(b) => Expr::BinOp {
                left: self.lower_boxed(&b.left),
                op: lower_operator(&b.op),
                right: self.lower_boxed(&b.right),
            },
            py::Expr::UnaryOp(u) => Expr::UnaryOp {
                op: match u.op {
                    py::UnaryOp::Invert => UnaryOp::Invert,
                    py::UnaryOp::Not => UnaryOp::Not,
                    py::UnaryOp::UAdd => UnaryOp::UAdd,
                    py::UnaryOp::USub => UnaryOp::USub,
                },
                operand: self.lower_boxed(&u.operand),
            },
            py::Expr::BoolOp(b) => Expr::BoolOp {
                op: match b.op {
                    py::BoolOp::And => BoolOp::And,
                    py::BoolOp::Or => BoolOp::Or,
                },
                values: self.lower_exprs(&b.values),
            },
            py::Expr::Compare(c) => Expr::Compare {
                left: self.lower_boxed(&c.left),
                ops: c.ops.iter().map(lower_cmpop).collect(),
                comparators: self.lower_exprs(&c.comparators),
            },
            py::Expr::IfExp(i) => Expr::IfExp {
                test: self.lower_boxed(&i.test),
                body: self.lower_boxed(&i.body),
                orelse: self.lower_boxed(&i.orelse),
            },
            py::Expr::List(l) => Expr::List(self.lower_exprs(&l.elts)),
            py::Expr::Tuple(t) => Expr::Tuple(self.lower_exprs(&t.elts)),
            py::Expr::Set(s) => Expr::Set(self.lower_exprs(&s.elts)),
            py::Expr::Dict(d) => Expr::Dict {
                keys: d
                    .keys
                    .iter()
                    .map(|k| k.as_ref().map(|e| self.lower_expr(e)))
                    .collect(),
                values: self.lower_exprs(&d.values),
            },
            py::Expr::Starred(s) => Expr::Starred(self.lower_boxed(&s.value)),
            py::Expr::Lambda(l) => Expr::Lambda {
                params: Box::new(self.lower_params(&l.args)),
                body: self.lower_boxed(&l.body),
            },
            py::Expr::ListComp(c) => match self.lower_comprehensions(&c.generators) {
                Some(generators) => Expr::ListComp {
                    elt: self.lower_boxed(&c.elt),
                    generators,
                },
                None => self.opaque_expr(expr),
            },
            py::Expr::SetComp(c) => match self.lower_comprehensions(&c.generators) {
                Some(generators) => Expr::SetComp {
                    elt: self.lower_boxed(&c.elt),
                    generators,
                },
                None => self.opaque_expr(expr),
            },
            py::Expr::GeneratorExp(c) => match self.lower_comprehensions(&c.generators) {
                Some(generators) => Expr::GeneratorExp {
                    elt: self.lower_boxed(&c.elt),
                    generators,
                },
                None => self.opaque_expr(expr),
            },
            py::Expr::DictComp(c) => match self.lower_comprehensions(&c.generators) {
                Some(generators) => Expr::DictComp {
                    key: self.lower_boxed(&c.key),
                    value: self.lower_boxed(&c.value),
                    generators,
                },
                None => self.opaque_expr(expr),
            },
            py::Expr::JoinedStr(j) => match self.lower_fstring_parts(&j.values) {
                Some(parts) => Expr::FString {
                    parts,
                    text: self.text_of(expr),
                },
                None => self.opaque_expr(expr),
            },
            _ => self.opaque_expr(expr),
        }
    }

    fn lower_fstring_parts(&self, values: &[py::Expr]) -> Option<Vec<FStringPart>> {
        let mut parts = Vec::with_capacity(values.len());
        for value in values {
            match value {
                py::Expr::Constant(c) => match &c.value {
                    py::Constant::Str(s) => parts.push(FStringPart::Literal(s.clone())),
                    _ => return None,
                },
                py::Expr::FormattedValue(f) => {
                    let spec = match &f.format_spec {
                        Some(spec) => match spec.as_ref() {
                            py::Expr::JoinedStr(j) => self.lower_fstring_parts(&j.values)?,
                            _ => return None,
                        },
                        None => Vec::new(),
                    };
                    let conversion = match f.conversion {
                        ConversionFlag::Str => Some('s'),
                        ConversionFlag::Repr => Some('r'),
                        ConversionFlag::Ascii => Some('a'),
                        _ => None,
                    };
                    parts.push(FStringPart::Value {
                        value: self.lower_expr(&f.value),
                        conversion,
                        spec,
                    });
                }
                py::Expr::JoinedStr(j) => parts.extend(self.lower_fstring_parts(&j.values)?),
                _ => return None,
            }
        }
        Some(parts)
    }

    fn lower_constant(&self, constant: &py::Constant) -> Option<Constant> {
        match constant {
            py::Constant::None => Some(Constant::None),
            py::Constant::Bool(b) => Some(Constant::Bool(*b)),
            py::Constant::Str(s) => Some(Constant::Str(s.clone())),
            py::Constant::Int(i) => i.to_string().parse::<i64>().ok().map(Constant::Int),
            py::Constant::Float(f) => Some(Constant::Float(*f)),
            py::Constant::Ellipsis => Some(Constant::Ellipsis),
            _ => None,
        }
    }
}

fn identifiers(names: &[py::Identifier]) -> Vec<String> {
    names.iter().map(|n| n.as_str().to_string()).collect()
}

fn lower_aliases(names: &[py::Alias]) -> Vec<Alias> {
    names
        .iter()
        .map(|alias| Alias {
            name: alias.name.as_str().to_string(),
            asname: alias.asname.as_ref().map(|a| a.as_str().to_string()),
        })
        .collect()
}

fn lower_operator(op: &py::Operator) -> BinOp {
    match op {
        py::Operator::Add => BinOp::Add,
        py::Operator::Sub => BinOp::Sub,
        py::Operator::Mult => BinOp::Mult,
        py::Operator::MatMult => BinOp::MatMult,
        py::Operator::Div => BinOp::Div,
        py::Operator::Mod => BinOp::Mod,
        py::Operator::Pow => BinOp::Pow,
        py::Operator::LShift => BinOp::LShift,
        py::Operator::RShift => BinOp::RShift,
        py::Operator::BitOr => BinOp::BitOr,
        py::Operator::BitXor => BinOp::BitXor,
        py::Operator::BitAnd => BinOp::BitAnd,
        py::Operator::FloorDiv => BinOp::FloorDiv,
    }
}

fn lower_cmpop(op: &py::CmpOp) -> CmpOp {
    match op {
        py::CmpOp::Eq => CmpOp::Eq,
        py::CmpOp::NotEq => CmpOp::NotEq,
        py::CmpOp::Lt => CmpOp::Lt,
        py::CmpOp::LtE => CmpOp::LtE,
        py::CmpOp::Gt => CmpOp::Gt,
        py::CmpOp::GtE => CmpOp::GtE,
        py::CmpOp::Is => CmpOp::Is,
        py::CmpOp::IsNot => CmpOp::IsNot,
        py::CmpOp::In => CmpOp::In,
        py::CmpOp::NotIn => CmpOp::NotIn,
    }
}
