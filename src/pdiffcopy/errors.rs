use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransferError>;

/// Everything that can abort a transfer. Worker errors propagate to the
/// transfer driver, which cancels the remaining workers and returns the
/// first one; nothing is retried at the block level.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file sizes differ (source: {source_size} bytes, target: {target_size} bytes)")]
    SizeMismatch { source_size: u64, target_size: u64 },

    #[error("unknown hash method: {0}")]
    UnknownHash(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("no such file: {0}")]
    NotFound(String),

    #[error("transfer cancelled")]
    Cancelled,
}
