use thiserror::Error;

/// Errors that can be returned by civit-catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Rendering a Markdown or HTML report failed.
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    /// The file extension or format name is not one we read or write.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The input parsed but does not have the expected shape.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
