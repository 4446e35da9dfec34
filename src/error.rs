use thiserror::Error;

/// Main library error type covering every failure mode of the
/// import/export pipelines.
#[derive(Error, Debug)]
pub enum ScheduleXmlError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status error: {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("request timeout: {url} after {timeout_seconds} seconds")]
    Timeout { url: String, timeout_seconds: u64 },

    #[error("failed to parse XML: {details}")]
    Parse { details: String },

    #[error("failed to serialize XML: {details}")]
    Serialize { details: String },

    #[error("schema compilation failed: {source_name} - {details}")]
    SchemaCompile { source_name: String, details: String },

    #[error("validation failed: {detail}")]
    Validation { detail: String },

    #[error("malformed document: {details}")]
    MalformedDocument { details: String },

    #[error("inconsistent store: {details}")]
    InconsistentStore { details: String },
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ScheduleXmlError>;
