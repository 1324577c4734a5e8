//! Library error type.
use thiserror::Error;

/// Every fatal condition the pipeline can raise.
///
/// Insufficient data (an undefined K value at some radius) is deliberately
/// absent: it is an expected outcome and is pruned by the assembler.
#[derive(Debug, Error)]
pub enum SeedfallError {
    #[error("unknown site key `{site}`")]
    UnknownSite { site: String },

    #[error("invalid window: {reason}")]
    InvalidWindow { reason: String },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("point ({x}, {y}) lies outside window {window}")]
    PointOutsideWindow { x: f64, y: f64, window: String },

    #[error("cannot combine curves over different supports: {left} vs {right}")]
    IncompatibleCurves { left: String, right: String },

    #[error("no covariates for site `{site}`")]
    MissingCovariates { site: String },

    #[error("no analysis rows survived filtering in either track")]
    EmptyTable,

    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SeedfallError>;
