// Error taxonomy for the assembly pipeline

/// Errors surfaced by channels, sources, assemblers and the pool
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FactoryError {
    #[error("channel closed")]
    Closed,

    #[error("operation cancelled by shutdown")]
    Cancelled,

    #[error("worker pool queue saturated")]
    PoolSaturated,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to load configuration: {0}")]
    ConfigSource(String),
}

impl FactoryError {
    /// `Closed` and `Cancelled` are expected during shutdown and end a loop quietly
    pub fn is_shutdown_signal(&self) -> bool {
        matches!(self, FactoryError::Closed | FactoryError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, FactoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_signal_classification() {
        assert!(FactoryError::Closed.is_shutdown_signal());
        assert!(FactoryError::Cancelled.is_shutdown_signal());
        assert!(!FactoryError::PoolSaturated.is_shutdown_signal());
        assert!(!FactoryError::InvalidConfig("x".into()).is_shutdown_signal());
    }

    #[test]
    fn test_error_messages() {
        let err = FactoryError::InvalidConfig("channel_capacity must be positive".into());
        assert_eq!(
            err.to_string(),
            "invalid configuration: channel_capacity must be positive"
        );
    }
}
