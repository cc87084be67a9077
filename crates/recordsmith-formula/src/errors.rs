use thiserror::Error;

/// Errors raised while tokenizing, parsing or evaluating a formula.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    #[error("lex error at {position}: {message}")]
    Lex { position: usize, message: String },
    #[error("parse error at {position}: {message}")]
    Parse { position: usize, message: String },
    #[error("unsupported function: {0}")]
    UnsupportedFunction(String),
    #[error("{function} expects {expected} argument(s), got {found}")]
    Arity {
        function: String,
        expected: String,
        found: usize,
    },
    #[error("type error: {0}")]
    Type(String),
    #[error("invalid regex `{pattern}`: {message}")]
    InvalidRegex { pattern: String, message: String },
    #[error("division by zero")]
    DivisionByZero,
}

pub type Result<T> = std::result::Result<T, FormulaError>;
