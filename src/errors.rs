//! Errors

use thiserror::Error;

/// Everything that can go wrong while configuring or running a sampler.
///
/// `Config` and `Storage` failures are fatal. An `Evaluation` failure aborts
/// the current step before any chain mutation is committed. A `RandomState`
/// failure only ever arises when deserialising a persisted generator snapshot
/// and is recoverable by reseeding from entropy.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid sampler configuration, detected before any sampling happens
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The posterior function produced an unusable value, or was handed one
    #[error("posterior evaluation failed: {0}")]
    Evaluation(String),

    /// A persisted random generator snapshot could not be restored
    #[error("invalid random state: {0}")]
    RandomState(String),

    /// The chain destination could not be written, grown or reinitialised
    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Storage(err.to_string())
    }
}

/// Result alias which wraps [`Error`](enum.Error.html)
pub type Result<T> = std::result::Result<T, Error>;
