// Error taxonomy of the chart pipeline
//
// None of these escape the pipeline: points degrade to gaps, markup is
// dropped and fetch failures are reported next to the series that succeeded.
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PointError {
    #[error("datapoint is not a [value, timestamp] pair: {0}")]
    Shape(String),
    #[error("datapoint timestamp is not numeric: {0}")]
    Timestamp(String),
    #[error("datapoint value is not numeric: {0}")]
    Value(String),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum MarkupError {
    #[error("time range entry is missing `{0}`")]
    MissingField(&'static str),
    #[error("markup payload has an unexpected shape: {0}")]
    Shape(String),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("target {target} failed: {message}")]
    Upstream { target: String, message: String },
    #[error("target {target} task aborted: {message}")]
    Task { target: String, message: String },
}

impl FetchError {
    /// Message surfaced to the chart as a non-blocking error indicator.
    pub fn message(&self) -> &str {
        match self {
            FetchError::Upstream { message, .. } | FetchError::Task { message, .. } => message,
        }
    }
}
