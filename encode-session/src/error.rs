use thiserror::Error;

use crate::session::SessionState;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of [`Error`], handy for matching in callers and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidState,
    InvalidArgument,
    ResourceExhaustion,
    Stalled,
    Config,
}

#[derive(Debug, Error)]
pub enum Error {
    /// Operation is not valid in the session's current state.
    #[error("{op} is not valid while the session is {state}")]
    InvalidState {
        op: &'static str,
        state: SessionState,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A bounded queue was asked to hold more than its configured capacity.
    #[error("{queue} queue is full (capacity {capacity})")]
    ResourceExhaustion {
        queue: &'static str,
        capacity: usize,
    },

    /// The engine finalized nothing during a draining step.
    #[error("engine made no progress while draining ({pending} frames pending)")]
    Stalled { pending: usize },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidState { .. } => ErrorKind::InvalidState,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::ResourceExhaustion { .. } => ErrorKind::ResourceExhaustion,
            Error::Stalled { .. } => ErrorKind::Stalled,
            Error::Config(_) => ErrorKind::Config,
        }
    }

    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }
}
