use thiserror::Error;

/// Outcomes of the engine that are not a computed value.
///
/// None of these are transient: retrying the same input yields the same
/// outcome, so callers translate them (e.g. to a 404) rather than retry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("insufficient data: need at least {required} points, got {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("no data available")]
    NoData,

    #[error("invalid weights: {0}")]
    InvalidWeights(String),

    #[error("invalid thresholds: {0}")]
    InvalidThresholds(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}
