use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
#[non_exhaustive]
pub enum Error {
    #[error("buffer too small")]
    ErrBufferTooSmall,
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wraps an arbitrary error into the shared error type, preserving its
    /// message.
    pub fn from_std<T>(error: T) -> Self
    where
        T: std::error::Error,
    {
        Error::Other(error.to_string())
    }
}
