use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the CRDT core (spec §7).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unexpected internal state: {0}")]
    Unexpected(String),
    #[error("unimplemented: {0}")]
    Unimplemented(String),
    #[error("type error: {0}")]
    TypeError(String),
}

impl Error {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub fn unexpected(msg: impl Into<String>) -> Self {
        Error::Unexpected(msg.into())
    }

    pub fn unimplemented(msg: impl Into<String>) -> Self {
        Error::Unimplemented(msg.into())
    }

    pub fn type_error(msg: impl Into<String>) -> Self {
        Error::TypeError(msg.into())
    }
}
