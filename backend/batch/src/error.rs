use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Batch size must be between 1 and {max}, got {count}")]
    InvalidCount { count: usize, max: usize },

    #[error("QR encoding failed: {0}")]
    Qr(String),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
