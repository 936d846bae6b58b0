use fleet_error::Retryable;
use thiserror::Error;

/// Errors raised while parsing or evaluating a template or expression.
///
/// None of these are retryable: a syntax error or a missing binding will
/// still be a syntax error or a missing binding on the next attempt.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("unterminated expression starting at byte {0}")]
    UnterminatedExpression(usize),

    #[error("unexpected character '{ch}' at byte {offset}")]
    UnexpectedCharacter { ch: char, offset: usize },

    #[error("unexpected end of expression")]
    UnexpectedEof,

    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),

    #[error("unknown binding '{0}'")]
    UnknownBinding(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("{0} expects {1} argument(s)")]
    ArityMismatch(&'static str, usize),

    #[error("expression nesting exceeds the recursion limit")]
    RecursionLimitExceeded,

    #[error("cannot apply operator '{op}' to {lhs} and {rhs}")]
    TypeMismatch {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },

    #[error("JSON.parse failed: {0}")]
    JsonParse(String),

    #[error("'{0}' is not an array or string, cannot call includes()")]
    NotIterable(String),
}

impl Retryable for ExpressionError {
    fn is_retryable(&self) -> bool {
        false
    }
}
