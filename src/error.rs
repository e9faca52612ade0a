use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid hash parameter: {0}")]
    InvalidParameter(String),

    #[error("output unavailable: {0}")]
    ResourceUnavailable(#[from] std::io::Error),

    #[error("interrupted by user")]
    Interrupted,
}
