//! Source transformer injecting tracer calls.
//!
//! The rewrite is pure: [`Instrumenter::transform_module`] builds a new tree and
//! leaves its input untouched. Loop and condition sites are numbered in
//! traversal order, starting at 0.

mod names;

use crate::error::TraceError;
use crate::syntax::ast::*;
use crate::syntax::source::one_line;
use crate::syntax::{parse_module, unparse_module};
use crate::tracer::{CALL_ID_NAME, TRACER_NAME};
pub use names::{assigned_names, check_reserved, target_names};

/// Result of instrumenting one program.
#[derive(Debug, Clone)]
pub struct InstrumentedProgram {
    pub module: Module,
    pub source: String,
    pub loop_sites: usize,
    pub condition_sites: usize,
}

/// Parse, validate and transform a program.
pub fn instrument(source: &str) -> Result<InstrumentedProgram, TraceError> {
    let module = parse_module(source, "<program>")?;
    check_reserved(&module)?;
    let mut instrumenter = Instrumenter::new();
    let transformed = instrumenter.transform_module(&module);
    log::debug!(
        "instrumented {} loop sites and {} condition sites",
        instrumenter.loop_sites,
        instrumenter.condition_sites
    );
    Ok(InstrumentedProgram {
        source: unparse_module(&transformed),
        module: transformed,
        loop_sites: instrumenter.loop_sites,
        condition_sites: instrumenter.condition_sites,
    })
}

#[derive(Debug, Clone, Default)]
struct Context {
    /// Returns are routed through the tracer's exit call.
    traced_call: bool,
    in_class_body: bool,
    /// Loop variables of the enclosing loops, outermost first.
    loop_vars: Vec<String>,
    /// Update call to run before a `continue` of the innermost loop.
    continue_hook: Option<Stmt>,
}

#[derive(Debug, Default)]
pub struct Instrumenter {
    loop_sites: usize,
    condition_sites: usize,
}

fn tracer_call(method: &str, args: Vec<Expr>) -> Expr {
    Expr::method_call(TRACER_NAME, method, args)
}

fn exit_call(value: Expr) -> Stmt {
    Stmt::Return {
        value: Some(tracer_call("exit", vec![Expr::name(CALL_ID_NAME), value])),
    }
}

fn locals_call() -> Expr {
    Expr::call(Expr::name("locals"), Vec::new())
}

/// Human-readable description of a loop's iteration space.
pub fn describe_range(iter: &Expr) -> String {
    let Expr::Call {
        func,
        args,
        keywords,
    } = iter
    else {
        return "iter".to_string();
    };
    if func.as_name() != Some("range") || !keywords.is_empty() {
        return "iter".to_string();
    }
    let lit = |e: &Expr| e.literal_int().map_or_else(|| "?".to_string(), |i| i.to_string());
    match args.as_slice() {
        [stop] => format!("0..{}", lit(stop)),
        [start, stop] => format!("{}..{}", lit(start), lit(stop)),
        [start, stop, step] => format!("{}..{} step {}", lit(start), lit(stop), lit(step)),
        _ => "iter".to_string(),
    }
}

impl Instrumenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loop_sites(&self) -> usize {
        self.loop_sites
    }

    pub fn condition_sites(&self) -> usize {
        self.condition_sites
    }

    pub fn transform_module(&mut self, module: &Module) -> Module {
        let mut body = self.transform_block(&module.body, &Context::default());
        body.push(Stmt::expr(tracer_call("capture", vec![locals_call()])));
        Module { body }
    }

    fn transform_block(&mut self, body: &[Stmt], ctx: &Context) -> Vec<Stmt> {
        let mut out = Vec::with_capacity(body.len());
        for stmt in body {
            self.transform_stmt(stmt, ctx, &mut out);
        }
        out
    }

    fn transform_stmt(&mut self, stmt: &Stmt, ctx: &Context, out: &mut Vec<Stmt>) {
        match stmt {
            Stmt::FunctionDef(func) => out.push(Stmt::FunctionDef(self.transform_function(func, ctx))),
            Stmt::ClassDef(class) => {
                let class_ctx = Context {
                    in_class_body: true,
                    ..Context::default()
                };
                out.push(Stmt::ClassDef(ClassDef {
                    body: self.transform_block(&class.body, &class_ctx),
                    ..class.clone()
                }));
            }
            Stmt::Return { value } if ctx.traced_call => {
                out.push(exit_call(value.clone().unwrap_or_else(Expr::none)));
            }
            Stmt::Assign { targets, .. } => {
                out.push(stmt.clone());
                for target in targets {
                    for name in target_names(target) {
                        out.push(assign_call(&name));
                    }
                }
            }
            Stmt::AugAssign { target, .. } => {
                out.push(stmt.clone());
                if let Some(name) = target.as_name() {
                    out.push(assign_call(name));
                }
            }
            Stmt::AnnAssign {
                target,
                value: Some(_),
                simple: true,
                ..
            } => {
                out.push(stmt.clone());
                if let Some(name) = target.as_name() {
                    out.push(assign_call(name));
                }
            }
            Stmt::For {
                target,
                iter,
                body,
                orelse,
            } => {
                let loop_var = target.as_name().map(str::to_string);
                let mut bound = target_names(target);
                bound.retain(|name| Some(name) != loop_var.as_ref());
                let range = describe_range(iter);
                let (initial, update, body_ctx) =
                    self.loop_calls(body, &bound, target_names(target), loop_var.as_deref(), &range, ctx);
                let mut new_body = self.transform_block(body, &body_ctx);
                new_body.push(update);
                out.push(initial);
                out.push(Stmt::For {
                    target: target.clone(),
                    iter: iter.clone(),
                    body: new_body,
                    orelse: self.transform_block(orelse, ctx),
                });
            }
            Stmt::While { test, body, orelse } => {
                let (initial, update, body_ctx) = self.loop_calls(body, &[], Vec::new(), None, "while", ctx);
                let mut new_body = self.transform_block(body, &body_ctx);
                new_body.push(update);
                out.push(initial);
                out.push(Stmt::While {
                    test: test.clone(),
                    body: new_body,
                    orelse: self.transform_block(orelse, ctx),
                });
            }
            Stmt::If {
                test,
                body,
                orelse,
                line,
                test_source,
            } => {
                let site = self.condition_sites;
                self.condition_sites += 1;
                let wrapped = tracer_call(
                    "cond",
                    vec![
                        test.clone(),
                        Expr::int(site as i64),
                        Expr::int(*line as i64),
                        Expr::str(&one_line(test_source)),
                    ],
                );
                out.push(Stmt::If {
                    test: wrapped,
                    body: self.transform_block(body, ctx),
                    orelse: self.transform_block(orelse, ctx),
                    line: *line,
                    test_source: test_source.clone(),
                });
            }
            Stmt::With { items, body } => out.push(Stmt::With {
                items: items.clone(),
                body: self.transform_block(body, ctx),
            }),
            Stmt::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => out.push(Stmt::Try {
                body: self.transform_block(body, ctx),
                handlers: handlers
                    .iter()
                    .map(|h| Handler {
                        kind: h.kind.clone(),
                        name: h.name.clone(),
                        body: self.transform_block(&h.body, ctx),
                    })
                    .collect(),
                orelse: self.transform_block(orelse, ctx),
                finalbody: self.transform_block(finalbody, ctx),
            }),
            Stmt::Continue => {
                if let Some(hook) = &ctx.continue_hook {
                    out.push(hook.clone());
                }
                out.push(Stmt::Continue);
            }
            _ => out.push(stmt.clone()),
        }
    }

    /// Build the pre-loop and update calls of a new loop site, and the
    /// context its body is transformed in.
    fn loop_calls(
        &mut self,
        body: &[Stmt],
        extra_bound: &[String],
        new_loop_vars: Vec<String>,
        loop_var: Option<&str>,
        range: &str,
        ctx: &Context,
    ) -> (Stmt, Stmt, Context) {
        let site = self.loop_sites;
        self.loop_sites += 1;

        let mut tracked: Vec<String> = Vec::new();
        let candidates = ctx
            .loop_vars
            .iter()
            .chain(extra_bound.iter())
            .cloned()
            .chain(assigned_names(body));
        for name in candidates {
            if Some(name.as_str()) != loop_var && !tracked.contains(&name) {
                tracked.push(name);
            }
        }

        let call = |initial: bool| {
            Stmt::expr(tracer_call(
                "loop",
                vec![
                    Expr::int(site as i64),
                    locals_call(),
                    Expr::List(tracked.iter().map(|n| Expr::str(n)).collect()),
                    loop_var.map_or_else(Expr::none, Expr::str),
                    Expr::str(range),
                    Expr::bool(initial),
                ],
            ))
        };
        let initial = call(true);
        let update = call(false);

        let mut body_ctx = ctx.clone();
        body_ctx.loop_vars.extend(new_loop_vars);
        body_ctx.continue_hook = Some(update.clone());
        (initial, update, body_ctx)
    }

    fn transform_function(&mut self, func: &FunctionDef, ctx: &Context) -> FunctionDef {
        let traced = !(ctx.in_class_body && func.name == "__init__");
        let body_ctx = Context {
            traced_call: traced,
            ..Context::default()
        };
        let mut body = self.transform_block(&func.body, &body_ctx);

        if traced {
            let (keys, values): (Vec<Option<Expr>>, Vec<Expr>) = func
                .params
                .positional()
                .map(|p| (Some(Expr::str(&p.name)), Expr::name(&p.name)))
                .unzip();
            let entry = Stmt::assign(
                CALL_ID_NAME,
                tracer_call(
                    "enter",
                    vec![
                        Expr::str(&func.name),
                        Expr::Dict { keys, values },
                    ],
                ),
            );
            let at = usize::from(body.first().map_or(false, Stmt::is_docstring));
            body.insert(at, entry);
            if !body.last().map_or(false, Stmt::is_return) {
                body.push(exit_call(Expr::none()));
            }
        }

        FunctionDef {
            body,
            ..func.clone()
        }
    }
}

fn assign_call(name: &str) -> Stmt {
    Stmt::expr(tracer_call("assign", vec![Expr::str(name), Expr::name(name)]))
}
