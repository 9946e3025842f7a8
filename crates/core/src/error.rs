/// Result alias that carries the custom [`MetronomeError`] type.
pub type Result<T> = std::result::Result<T, MetronomeError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum MetronomeError {
    /// The audio capability could not be constructed or acquired. Callers
    /// treat scheduling as a no-op while this persists.
    #[error("audio capability unavailable: {0}")]
    CapabilityUnavailable(String),
    /// A configuration value was rejected at the boundary.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// The requested sound preset does not exist in the catalog.
    #[error("unknown sound preset `{0}`")]
    UnknownPreset(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Free-form error used for rare conditions such as lock poisoning.
    #[error("{0}")]
    Message(String),
}

impl MetronomeError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}
