// Error handling framework

use thiserror::Error;

/// Ticker configuration errors.
///
/// Only creation-time problems surface as errors; malformed fields on a
/// reconfiguration are dropped field-by-field so a partial update can never
/// destroy a healthy ticker.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Ticker id must not be empty")]
    EmptyId,

    #[error("Configuration for ticker '{id}' rejected: {reason}")]
    Rejected { id: String, reason: String },
}

/// Message bus errors
#[derive(Error, Debug)]
pub enum BusError {
    #[error("Failed to connect to NATS: {0}")]
    Connection(String),

    #[error("Failed to subscribe to '{subject}': {reason}")]
    Subscribe { subject: String, reason: String },

    #[error("Failed to publish to '{subject}': {reason}")]
    PublishFailed { subject: String, reason: String },

    #[error("Payload serialization failed: {0}")]
    SerializationFailed(String),
}

impl From<serde_json::Error> for BusError {
    fn from(err: serde_json::Error) -> Self {
        BusError::SerializationFailed(err.to_string())
    }
}
