use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AssertionError {
    #[error("empty assertion")]
    Empty,

    #[error("syntax error at offset {offset}: {reason}")]
    Syntax { offset: usize, reason: String },

    #[error("invalid key-value identity: {0}")]
    InvalidFactor(String),

    #[error("bad {service} value '{value}': {reason}")]
    BadValue {
        service: String,
        value: String,
        reason: String,
    },

    #[error("OR expressions are not allowed in identify assertions: {0}")]
    OrNotAllowed(String),
}
