use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// A query that needed a definite answer timed out or was inconclusive.
    #[error("solver returned unknown: {0}")]
    SolverUnknown(String),

    /// The semi-linear set of a step relation could not be computed.
    #[error("semi-linear set undecidable: {0}")]
    SlsUndecidable(String),

    /// The surrounding verification was cancelled.
    #[error("interrupted")]
    Interrupted,
}

impl Error {
    /// Expected outcomes that callers answer with a fallback.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::Interrupted)
    }
}
