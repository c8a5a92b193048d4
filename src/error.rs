
use thiserror::Error;

/// Error type for the queue mover.
#[derive(Debug, Error)]
pub enum MoverError {
    /// Error originating from the underlying `lapin` library.
    #[error("RabbitMQ communication error: {0}")]
    Lapin(#[from] lapin::Error),

    /// Missing or inconsistent configuration, detected before any message is touched.
    #[error("Configuration error: {message}")]
    Config {
        message: String,
    },

    /// The broker negatively confirmed a publish.
    #[error("Broker rejected publish to queue '{queue}'")]
    PublishRejected {
        queue: String,
    },

    /// Error while serializing the run report.
    #[error("Failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A fault reported by a non-AMQP session implementation.
    #[error("Broker session error: {0}")]
    Session(String),
}

// Allow converting from a string-like type into a Config error
impl From<&str> for MoverError {
    fn from(s: &str) -> Self {
        MoverError::Config { message: s.to_string() }
    }
}

impl From<String> for MoverError {
    fn from(s: String) -> Self {
        MoverError::Config { message: s }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_converts_into_config_error() {
        let err = MoverError::from("RABBITMQ_URL is not set");
        assert!(matches!(err, MoverError::Config { .. }));
        assert_eq!(err.to_string(), "Configuration error: RABBITMQ_URL is not set");
    }

    #[test]
    fn test_publish_rejected_names_queue() {
        let err = MoverError::PublishRejected { queue: "orders".to_string() };
        assert_eq!(err.to_string(), "Broker rejected publish to queue 'orders'");
    }
}
