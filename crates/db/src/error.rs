use std::path::PathBuf;

/// Errors from reading or writing the status document.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem failure on the document or its temp file.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document on disk is not valid JSON of the expected shape.
    #[error("Invalid status document {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Extra fields could not be merged into a record.
    #[error("Cannot merge fields into record '{base}': {reason}")]
    InvalidMerge { base: String, reason: String },

    #[error("Unknown base '{0}'")]
    UnknownBase(String),
}
