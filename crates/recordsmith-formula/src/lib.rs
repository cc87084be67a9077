//! Local evaluator for the record store's validation-formula language.
//!
//! Formulas are tokenized, parsed with a Pratt parser into an [`Expr`] tree
//! and evaluated against a candidate record. A rule's formula describes the
//! error condition, so a truthy result means the record would be rejected.

pub mod ast;
pub mod errors;
pub mod eval;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod support;
pub mod value;

pub use ast::{
    BinaryOp, Expr, UnaryOp, blank_checked_fields, called_functions, referenced_fields,
};
pub use errors::{FormulaError, Result};
pub use eval::{EvalContext, Formula, evaluate, try_evaluate};
pub use functions::{SUPPORTED_FUNCTIONS, is_supported};
pub use parser::parse;
pub use support::{can_evaluate, unsupported_functions};
pub use value::{FormulaValue, is_truthy};
