//! Error types for buildy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("build queue closed")]
    QueueClosed,

    #[error("build dropped before a result was delivered: {0}")]
    ResultDropped(String),

    #[error("timeout: {0}")]
    Timeout(String),
}

pub type Result<T> = std::result::Result<T, Error>;
