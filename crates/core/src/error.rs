use std::time::Duration;

/// Result alias that carries the custom [`WorkcellError`] type.
pub type Result<T> = std::result::Result<T, WorkcellError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum WorkcellError {
    /// The static configuration cannot drive an engine, e.g. the phase list
    /// does not tile the cycle. Raised at construction only.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Ownership or latch bookkeeping disagrees with itself. Always a bug in
    /// the choreography, never a transient condition.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    /// No phase covers the requested loop time.
    #[error("no active phase at loop time {loop_time:?}")]
    NoActivePhase { loop_time: Duration },
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Malformed JSON configuration or snapshot output failure.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl WorkcellError {
    /// Creates a configuration error from the provided message.
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates an invariant violation from the provided message.
    pub fn invariant<T: Into<String>>(msg: T) -> Self {
        Self::InvariantViolation(msg.into())
    }

    /// Returns `true` for errors that must stop the engine from starting.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}
