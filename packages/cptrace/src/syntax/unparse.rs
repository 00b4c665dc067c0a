//! Prints a [`Module`] back to executable Python source.

use super::ast::*;

const INDENT: &str = "    ";

pub fn unparse_module(module: &Module) -> String {
    let mut printer = Printer::default();
    printer.block(&module.body);
    printer.out
}

pub fn unparse_expr(expr: &Expr) -> String {
    expr_text(expr)
}

#[derive(Default)]
struct Printer {
    out: String,
    depth: usize,
}

impl Printer {
    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn block(&mut self, body: &[Stmt]) {
        if body.is_empty() {
            self.line("pass");
            return;
        }
        for stmt in body {
            self.stmt(stmt);
        }
    }

    fn suite(&mut self, header: &str, body: &[Stmt]) {
        self.line(header);
        self.depth += 1;
        self.block(body);
        self.depth -= 1;
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::FunctionDef(func) => {
                for decorator in &func.decorators {
                    self.line(&format!("@{}", expr_text(decorator)));
                }
                let returns = func
                    .returns
                    .as_ref()
                    .map(|r| format!(" -> {}", expr_text(r)))
                    .unwrap_or_default();
                let header = format!("def {}({}){}:", func.name, params_text(&func.params), returns);
                self.suite(&header, &func.body);
            }
            Stmt::ClassDef(class) => {
                for decorator in &class.decorators {
                    self.line(&format!("@{}", expr_text(decorator)));
                }
                let mut args: Vec<String> = class.bases.iter().map(expr_text).collect();
                args.extend(class.keywords.iter().map(keyword_text));
                let header = if args.is_empty() {
                    format!("class {}:", class.name)
                } else {
                    format!("class {}({}):", class.name, args.join(", "))
                };
                self.suite(&header, &class.body);
            }
            Stmt::Return { value } => match value {
                Some(value) => self.line(&format!("return {}", expr_text(value))),
                None => self.line("return"),
            },
            Stmt::Assign { targets, value } => {
                let mut parts: Vec<String> = targets.iter().map(expr_text).collect();
                parts.push(expr_text(value));
                self.line(&parts.join(" = "));
            }
            Stmt::AugAssign { target, op, value } => {
                self.line(&format!("{} {}= {}", expr_text(target), op.symbol(), expr_text(value)));
            }
            Stmt::AnnAssign {
                target,
                annotation,
                value,
                simple,
            } => {
                let target = match (simple, target) {
                    (false, Expr::Name(id)) => format!("({id})"),
                    _ => expr_text(target),
                };
                let mut text = format!("{}: {}", target, expr_text(annotation));
                if let Some(value) = value {
                    text.push_str(&format!(" = {}", expr_text(value)));
                }
                self.line(&text);
            }
            Stmt::For {
                target,
                iter,
                body,
                orelse,
            } => {
                self.suite(&format!("for {} in {}:", expr_text(target), expr_text(iter)), body);
                if !orelse.is_empty() {
                    self.suite("else:", orelse);
                }
            }
            Stmt::While { test, body, orelse } => {
                self.suite(&format!("while {}:", expr_text(test)), body);
                if !orelse.is_empty() {
                    self.suite("else:", orelse);
                }
            }
            Stmt::If {
                test, body, orelse, ..
            } => self.if_chain("if", test, body, orelse),
            Stmt::With { items, body } => {
                let items: Vec<String> = items
                    .iter()
                    .map(|item| match &item.vars {
                        Some(vars) => format!("{} as {}", expr_text(&item.context), expr_text(vars)),
                        None => expr_text(&item.context),
                    })
                    .collect();
                self.suite(&format!("with {}:", items.join(", ")), body);
            }
            Stmt::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                self.suite("try:", body);
                for handler in handlers {
                    let header = match (&handler.kind, &handler.name) {
                        (Some(kind), Some(name)) => format!("except {} as {}:", expr_text(kind), name),
                        (Some(kind), None) => format!("except {}:", expr_text(kind)),
                        _ => "except:".to_string(),
                    };
                    self.suite(&header, &handler.body);
                }
                if !orelse.is_empty() {
                    self.suite("else:", orelse);
                }
                if !finalbody.is_empty() {
                    self.suite("finally:", finalbody);
                }
            }
            Stmt::Raise { exc } => match exc {
                Some(exc) => self.line(&format!("raise {}", expr_text(exc))),
                None => self.line("raise"),
            },
            Stmt::Assert { test, msg } => match msg {
                Some(msg) => self.line(&format!("assert {}, {}", expr_text(test), expr_text(msg))),
                None => self.line(&format!("assert {}", expr_text(test))),
            },
            Stmt::Delete(targets) => {
                let targets: Vec<String> = targets.iter().map(expr_text).collect();
                self.line(&format!("del {}", targets.join(", ")));
            }
            Stmt::Import(names) => self.line(&format!("import {}", aliases_text(names))),
            Stmt::ImportFrom {
                module,
                names,
                level,
            } => {
                let dots = ".".repeat(*level as usize);
                let module = module.as_deref().unwrap_or("");
                self.line(&format!("from {}{} import {}", dots, module, aliases_text(names)));
            }
            Stmt::Global(names) => self.line(&format!("global {}", names.join(", "))),
            Stmt::Nonlocal(names) => self.line(&format!("nonlocal {}", names.join(", "))),
            Stmt::Expr(expr) => self.line(&expr_text(expr)),
            Stmt::Pass => self.line("pass"),
            Stmt::Break => self.line("break"),
            Stmt::Continue => self.line("continue"),
            Stmt::Opaque(fragment) => {
                for line in fragment.text.lines() {
                    if line.trim().is_empty() {
                        self.out.push('\n');
                    } else {
                        self.line(line);
                    }
                }
            }
        }
    }

    fn if_chain(&mut self, keyword: &str, test: &Expr, body: &[Stmt], orelse: &[Stmt]) {
        self.suite(&format!("{} {}:", keyword, expr_text(test)), body);
        match orelse {
            [] => {}
            [Stmt::If {
                test, body, orelse, ..
            }] => self.if_chain("elif", test, body, orelse),
            _ => self.suite("else:", orelse),
        }
    }
}

fn aliases_text(names: &[Alias]) -> String {
    names
        .iter()
        .map(|alias| match &alias.asname {
            Some(asname) => format!("{} as {}", alias.name, asname),
            None => alias.name.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn keyword_text(keyword: &Keyword) -> String {
    match &keyword.arg {
        Some(arg) => format!("{}={}", arg, expr_text(&keyword.value)),
        None => format!("**{}", operand(&keyword.value, PREC_BOR)),
    }
}

fn param_text(param: &Param) -> String {
    match (&param.annotation, &param.default) {
        (Some(ann), Some(default)) => {
            format!("{}: {} = {}", param.name, expr_text(ann), expr_text(default))
        }
        (Some(ann), None) => format!("{}: {}", param.name, expr_text(ann)),
        (None, Some(default)) => format!("{}={}", param.name, expr_text(default)),
        (None, None) => param.name.clone(),
    }
}

fn params_text(params: &Parameters) -> String {
    let mut parts: Vec<String> = params.posonly.iter().map(param_text).collect();
    if !params.posonly.is_empty() {
        parts.push("/".to_string());
    }
    parts.extend(params.args.iter().map(param_text));
    match &params.vararg {
        Some(vararg) => parts.push(format!("*{}", param_text(vararg))),
        None if !params.kwonly.is_empty() => parts.push("*".to_string()),
        None => {}
    }
    parts.extend(params.kwonly.iter().map(param_text));
    if let Some(kwarg) = &params.kwarg {
        parts.push(format!("**{}", param_text(kwarg)));
    }
    parts.join(", ")
}

/// Python string literal for a synthesized string.
pub fn quote_str(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c == '\u{7f}' => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn constant_text(literal: &Literal) -> String {
    if let Some(text) = &literal.text {
        return if text.contains('\n') {
            format!("({text})")
        } else {
            text.clone()
        };
    }
    match &literal.value {
        Constant::None => "None".to_string(),
        Constant::Bool(true) => "True".to_string(),
        Constant::Bool(false) => "False".to_string(),
        Constant::Int(i) => i.to_string(),
        Constant::Float(f) if f.is_finite() => format!("{f:?}"),
        Constant::Float(f) => format!("float({})", quote_str(&f.to_string())),
        Constant::Str(s) => quote_str(s),
        Constant::Ellipsis => "...".to_string(),
    }
}

fn comprehension_text(generators: &[Comprehension]) -> String {
    let mut out = String::new();
    for generator in generators {
        out.push_str(&format!(
            " for {} in {}",
            expr_text(&generator.target),
            operand(&generator.iter, PREC_OR)
        ));
        for cond in &generator.ifs {
            out.push_str(&format!(" if {}", operand(cond, PREC_OR)));
        }
    }
    out
}

/// Bare tuple elements, as used inside subscripts.
fn slice_text(expr: &Expr) -> String {
    match expr {
        Expr::Tuple(elts) if elts.len() == 1 => format!("{},", expr_text(&elts[0])),
        Expr::Tuple(elts) if !elts.is_empty() => {
            elts.iter().map(expr_text).collect::<Vec<_>>().join(", ")
        }
        _ => expr_text(expr),
    }
}

const PREC_TEST: u8 = 2;
const PREC_OR: u8 = 3;
const PREC_NOT: u8 = 5;
const PREC_CMP: u8 = 6;
const PREC_BOR: u8 = 7;
const PREC_UNARY: u8 = 13;
const PREC_POW: u8 = 14;
const PREC_ATOM: u8 = 16;

fn binop_precedence(op: BinOp) -> u8 {
    match op {
        BinOp::BitOr => 7,
        BinOp::BitXor => 8,
        BinOp::BitAnd => 9,
        BinOp::LShift | BinOp::RShift => 10,
        BinOp::Add | BinOp::Sub => 11,
        BinOp::Mult | BinOp::MatMult | BinOp::Div | BinOp::FloorDiv | BinOp::Mod => 12,
        BinOp::Pow => PREC_POW,
    }
}

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Lambda { .. } | Expr::Slice { .. } => 1,
        Expr::IfExp { .. } => PREC_TEST,
        Expr::BoolOp { op: BoolOp::Or, .. } => PREC_OR,
        Expr::BoolOp { op: BoolOp::And, .. } => 4,
        Expr::UnaryOp { op: UnaryOp::Not, .. } => PREC_NOT,
        Expr::Compare { .. } => PREC_CMP,
        Expr::Starred(_) => PREC_BOR,
        Expr::BinOp { op, .. } => binop_precedence(*op),
        Expr::UnaryOp { .. } => PREC_UNARY,
        _ => PREC_ATOM,
    }
}

/// Expression text, parenthesized when it binds looser than `min`.
fn operand(expr: &Expr, min: u8) -> String {
    if precedence(expr) < min {
        format!("({})", expr_text(expr))
    } else {
        expr_text(expr)
    }
}

fn atom(expr: &Expr) -> String {
    operand(expr, PREC_ATOM)
}

fn expr_text(expr: &Expr) -> String {
    match expr {
        Expr::Constant(literal) => constant_text(literal),
        Expr::Name(id) => id.clone(),
        Expr::Attribute { value, attr } => match value.as_ref() {
            Expr::Constant(_) => format!("({}).{}", expr_text(value), attr),
            _ => format!("{}.{}", atom(value), attr),
        },
        Expr::Subscript { value, slice } => format!("{}[{}]", atom(value), slice_text(slice)),
        Expr::Slice { lower, upper, step } => {
            let part = |e: &Option<Box<Expr>>| {
                e.as_deref()
                    .map(|e| operand(e, PREC_TEST))
                    .unwrap_or_default()
            };
            match step {
                Some(_) => format!("{}:{}:{}", part(lower), part(upper), part(step)),
                None => format!("{}:{}", part(lower), part(upper)),
            }
        }
        Expr::Call {
            func,
            args,
            keywords,
        } => {
            let mut parts: Vec<String> = args.iter().map(expr_text).collect();
            parts.extend(keywords.iter().map(keyword_text));
            format!("{}({})", atom(func), parts.join(", "))
        }
        Expr::BinOp { left, op, right } => {
            let prec = binop_precedence(*op);
            let (left_min, right_min) = match op {
                BinOp::Pow => (PREC_POW + 1, PREC_UNARY),
                _ => (prec, prec + 1),
            };
            format!("{} {} {}", operand(left, left_min), op.symbol(), operand(right, right_min))
        }
        Expr::UnaryOp { op, operand: value } => {
            let min = match op {
                UnaryOp::Not => PREC_NOT,
                _ => PREC_UNARY,
            };
            format!("{}{}", op.symbol(), operand(value, min))
        }
        Expr::BoolOp { op, values } => {
            let min = precedence(expr) + 1;
            values
                .iter()
                .map(|value| operand(value, min))
                .collect::<Vec<_>>()
                .join(&format!(" {} ", op.keyword()))
        }
        Expr::Compare {
            left,
            ops,
            comparators,
        } => {
            let mut out = operand(left, PREC_BOR);
            for (op, comparator) in ops.iter().zip(comparators) {
                out.push_str(&format!(" {} {}", op.symbol(), operand(comparator, PREC_BOR)));
            }
            out
        }
        Expr::IfExp { test, body, orelse } => {
            format!(
                "{} if {} else {}",
                operand(body, PREC_OR),
                operand(test, PREC_OR),
                operand(orelse, PREC_TEST)
            )
        }
        Expr::List(elts) => format!("[{}]", elts.iter().map(expr_text).collect::<Vec<_>>().join(", ")),
        Expr::Tuple(elts) => match elts.len() {
            1 => format!("({},)", expr_text(&elts[0])),
            _ => format!("({})", elts.iter().map(expr_text).collect::<Vec<_>>().join(", ")),
        },
        Expr::Set(elts) if elts.is_empty() => "set()".to_string(),
        Expr::Set(elts) => format!("{{{}}}", elts.iter().map(expr_text).collect::<Vec<_>>().join(", ")),
        Expr::Dict { keys, values } => {
            let entries: Vec<String> = keys
                .iter()
                .zip(values)
                .map(|(key, value)| match key {
                    Some(key) => format!("{}: {}", expr_text(key), expr_text(value)),
                    None => format!("**{}", operand(value, PREC_BOR)),
                })
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
        Expr::Starred(value) => format!("*{}", operand(value, PREC_BOR)),
        Expr::Lambda { params, body } => {
            let params = params_text(params);
            if params.is_empty() {
                format!("lambda: {}", expr_text(body))
            } else {
                format!("lambda {}: {}", params, expr_text(body))
            }
        }
        Expr::ListComp { elt, generators } => {
            format!("[{}{}]", expr_text(elt), comprehension_text(generators))
        }
        Expr::SetComp { elt, generators } => {
            format!("{{{}{}}}", expr_text(elt), comprehension_text(generators))
        }
        Expr::GeneratorExp { elt, generators } => {
            format!("({}{})", expr_text(elt), comprehension_text(generators))
        }
        Expr::DictComp {
            key,
            value,
            generators,
        } => format!(
            "{{{}: {}{}}}",
            expr_text(key),
            expr_text(value),
            comprehension_text(generators)
        ),
        Expr::FString { text, .. } => {
            if text.contains('\n') {
                format!("({text})")
            } else {
                text.clone()
            }
        }
        Expr::Opaque(fragment) => format!("({})", fragment.text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse_module;

    fn reprint(source: &str) -> String {
        let module = parse_module(source, "<test>").unwrap();
        unparse_module(&module)
    }

    #[test]
    fn test_simple_program_is_stable() {
        let source = "def f(a, b=2, *args, k, **kw):\n    return a + b * k\nx = f(1, k=3)\nprint(x)\n";
        assert_eq!(reprint(source), source);
    }

    #[test]
    fn test_elif_chain_is_kept() {
        let source = "if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n";
        assert_eq!(reprint(source), source);
    }

    #[test]
    fn test_nested_operands_are_parenthesized() {
        let source = "y = (a + b) * c\n";
        assert_eq!(reprint(source), "y = (a + b) * c\n");
    }

    #[test]
    fn test_subscript_tuple_and_slices() {
        let source = "v = grid[i, j]\nw = data[1:n:2]\n";
        assert_eq!(reprint(source), source);
    }

    #[test]
    fn test_opaque_statement_is_reindented() {
        let source = "def f(xs):\n  async def g():\n    await h()\n  return xs\n";
        let printed = reprint(source);
        assert_eq!(
            printed,
            "def f(xs):\n    async def g():\n      await h()\n    return xs\n"
        );
    }

    #[test]
    fn test_quote_str_escapes() {
        assert_eq!(quote_str("a\"b\\c\n"), "\"a\\\"b\\\\c\\n\"");
    }

    #[test]
    fn test_empty_body_prints_pass() {
        let module = Module {
            body: vec![Stmt::While {
                test: Expr::bool(false),
                body: Vec::new(),
                orelse: Vec::new(),
            }],
        };
        assert_eq!(unparse_module(&module), "while False:\n    pass\n");
    }
}
