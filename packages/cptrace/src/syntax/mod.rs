//! Parsing, lowering and printing of Python source.

pub mod ast;
pub mod lower;
pub mod source;
pub mod unparse;

use crate::error::TraceError;
use rustpython_ast::Mod;
use rustpython_parser::{parse, Mode};

pub use lower::Lowerer;
pub use unparse::{quote_str, unparse_expr, unparse_module};

/// Parse Python source into the crate's syntax tree.
pub fn parse_module(source: &str, path: &str) -> Result<ast::Module, TraceError> {
    let parsed = parse(source, Mode::Module, path).map_err(|e| TraceError::Parse {
        path: path.to_string(),
        message: e.to_string(),
    })?;
    match parsed {
        Mod::Module(module) => Ok(Lowerer::new(source).lower_module(&module.body)),
        _ => Err(TraceError::Parse {
            path: path.to_string(),
            message: "expected a module".to_string(),
        }),
    }
}

/// Parse into the raw `rustpython-ast` statements, for the static overlays.
pub fn parse_raw(source: &str, path: &str) -> Result<Vec<rustpython_ast::Stmt>, TraceError> {
    match parse(source, Mode::Module, path) {
        Ok(Mod::Module(module)) => Ok(module.body),
        Ok(_) => Ok(Vec::new()),
        Err(e) => Err(TraceError::Parse {
            path: path.to_string(),
            message: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ast::{Expr, Stmt};

    #[test]
    fn test_parse_error_is_reported() {
        let err = parse_module("def f(:\n", "bad.py").unwrap_err();
        assert!(matches!(err, TraceError::Parse { .. }));
        assert!(err.is_source_error());
    }

    #[test]
    fn test_lowering_keeps_if_line_and_source() {
        let module = parse_module("x = 1\nif x  >  0:\n    pass\n", "<test>").unwrap();
        match &module.body[1] {
            Stmt::If {
                line, test_source, ..
            } => {
                assert_eq!(*line, 2);
                assert_eq!(test_source, "x  >  0");
            }
            other => panic!("unexpected statement {other:?}"),
        }
    }

    #[test]
    fn test_unmodelled_expressions_become_opaque() {
        let module = parse_module("y = (z := 3)\n", "<test>").unwrap();
        match &module.body[0] {
            Stmt::Assign { value, .. } => assert!(matches!(value, Expr::Opaque(_))),
            other => panic!("unexpected statement {other:?}"),
        }
    }

    #[test]
    fn test_big_integers_become_opaque() {
        let module = parse_module("n = 123456789012345678901234567890\n", "<test>").unwrap();
        match &module.body[0] {
            Stmt::Assign { value, .. } => assert!(matches!(value, Expr::Opaque(_))),
            other => panic!("unexpected statement {other:?}"),
        }
    }
}
