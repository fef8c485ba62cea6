//! Error types shared across the planner.
//!
//! Fatal errors (bad request, broken catalog) surface to the caller. External
//! call failures use the same enum but are recovered inside the selector.

#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    /// The selection request is missing a field or carries an invalid value.
    #[error("{0}")]
    InvalidInput(String),

    /// The event catalog could not be read or lacks required columns.
    #[error("catalog error: {0}")]
    Catalog(String),

    /// The event/description generator failed or is not configured.
    #[error("generator error: {0}")]
    Generator(String),

    /// The sentiment classifier failed.
    #[error("classifier error: {0}")]
    Classifier(String),

    /// An external call did not answer within the configured bound.
    #[error("timeout: {0} exceeded {1}s")]
    Timeout(&'static str, u64),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PlannerError>;
