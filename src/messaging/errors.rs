//! # Messaging Error Types
//!
//! Structured errors for broker connections, subscriptions and settlement.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessagingError {
    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Configuration error: {component}: {message}")]
    Configuration { component: String, message: String },

    #[error("Topology declaration failed: {name}: {message}")]
    TopologyDeclaration { name: String, message: String },

    #[error("Subscribe failed for queue {queue_name}: {message}")]
    Subscribe { queue_name: String, message: String },

    #[error("Receive failed for queue {queue_name}: {message}")]
    Receive { queue_name: String, message: String },

    #[error("Settlement failed for delivery {delivery_id} ({decision}): {message}")]
    Settlement {
        delivery_id: String,
        decision: String,
        message: String,
    },

    #[error("Delivery {delivery_id} was already settled")]
    AlreadySettled { delivery_id: String },

    #[error("Message source is closed")]
    Closed,

    #[error("Health check failed: {message}")]
    HealthCheck { message: String },
}

impl MessagingError {
    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a topology declaration error
    pub fn topology(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TopologyDeclaration {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a subscribe error
    pub fn subscribe(queue_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Subscribe {
            queue_name: queue_name.into(),
            message: message.into(),
        }
    }

    /// Create a receive error
    pub fn receive(queue_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Receive {
            queue_name: queue_name.into(),
            message: message.into(),
        }
    }

    /// Create a settlement error
    pub fn settlement(
        delivery_id: impl Into<String>,
        decision: impl ToString,
        message: impl Into<String>,
    ) -> Self {
        Self::Settlement {
            delivery_id: delivery_id.into(),
            decision: decision.to_string(),
            message: message.into(),
        }
    }

    /// Create an already-settled error
    pub fn already_settled(delivery_id: impl Into<String>) -> Self {
        Self::AlreadySettled {
            delivery_id: delivery_id.into(),
        }
    }

    /// Create a health check error
    pub fn health_check(message: impl Into<String>) -> Self {
        Self::HealthCheck {
            message: message.into(),
        }
    }

    /// Whether reconnecting could make the same operation succeed
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Receive { .. } | Self::Closed | Self::HealthCheck { .. }
        )
    }
}

impl From<lapin::Error> for MessagingError {
    fn from(err: lapin::Error) -> Self {
        Self::connection(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = MessagingError::settlement("42", "requeue", "channel closed");
        assert_eq!(
            err.to_string(),
            "Settlement failed for delivery 42 (requeue): channel closed"
        );

        let err = MessagingError::subscribe("bucket.transfer-notifier", "ACCESS_REFUSED");
        assert_eq!(
            err.to_string(),
            "Subscribe failed for queue bucket.transfer-notifier: ACCESS_REFUSED"
        );
    }

    #[test]
    fn test_connection_level_classification() {
        assert!(MessagingError::connection("refused").is_connection_level());
        assert!(MessagingError::Closed.is_connection_level());
        assert!(!MessagingError::already_settled("7").is_connection_level());
        assert!(!MessagingError::configuration("broker", "bad url").is_connection_level());
    }
}
