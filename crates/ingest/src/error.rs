//! Ingest Error Types

use datagate_core::CoreError;
use thiserror::Error;

/// Error type for the ledger and loading paths.
///
/// Admission decisions themselves never surface as errors: a dataset
/// failing a policy check is blocked and recorded, not raised. These
/// variants cover the genuinely exceptional paths (unreadable ledger,
/// broken spreadsheet, corrupt archive).
#[derive(Error, Debug)]
pub enum IngestError {
    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Ledger (YAML) serialization errors
    #[error("Ledger error: {0}")]
    Ledger(#[from] serde_yaml::Error),

    /// Spreadsheet parsing errors
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::XlsxError),

    /// Archive errors
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Unsupported or malformed external file contents
    #[error("Unsupported file: {0}")]
    UnsupportedFile(String),

    /// Core errors (table operations, config)
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type alias for ingest errors
pub type IngestResult<T> = Result<T, IngestError>;

impl IngestError {
    /// Create an unsupported-file error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedFile(msg.into())
    }
}
