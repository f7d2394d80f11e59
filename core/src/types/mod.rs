//! Type definitions shared by the parser and the step extractor
//!
//! - AST nodes (Stmt, Expr, Program)
//! - Literal values bound to variables (Val)

pub mod ast;
pub mod values;

pub use ast::{Expr, Pattern, Program, Span, Stmt};
pub use values::Val;
