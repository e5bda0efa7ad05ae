use thiserror::Error;

/// Input errors surfaced to callers. Never coerced, never swallowed.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid ISBN: {0:?}")]
    InvalidIsbn(String),

    #[error("unknown condition grade: {0:?}")]
    UnknownCondition(String),

    #[error("unsupported item record schema version {found} (supported: {supported})")]
    UnsupportedRecordVersion { found: u32, supported: u32 },

    #[error("unknown feature schema {0:?}")]
    UnknownSchema(String),

    #[error("feature schema mismatch: expected {expected:?}, got {found:?}")]
    SchemaMismatch { expected: String, found: String },

    #[error("feature vector for {schema:?} has {found} entries, expected {expected}")]
    VectorLength {
        schema: String,
        expected: usize,
        found: usize,
    },

    #[error("invalid item record: {0}")]
    InvalidRecord(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

pub type Result<T> = std::result::Result<T, CoreError>;
