// Bus module for the NATS-facing side of the gateway

pub mod service;
pub mod sink;
pub mod subjects;

pub use service::{CancelCommand, GatewayService};
pub use sink::NatsTickerSink;
pub use subjects::ServiceSubjects;

use crate::errors::BusError;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// NATS connection settings for the gateway bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// NATS server URL (e.g., "nats://localhost:4222")
    pub url: String,
    /// First token of every subject this gateway uses.
    pub subject_prefix: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            subject_prefix: "tickway".to_string(),
        }
    }
}

/// Thin wrapper over the NATS client for JSON publish/subscribe.
///
/// Intents are fire-and-forget commands and statuses are best-effort
/// announcements, so plain core NATS is enough; no stream management.
#[derive(Clone)]
pub struct BusClient {
    client: async_nats::Client,
}

impl BusClient {
    /// Connect to the NATS server.
    #[instrument(skip(config), fields(url = %config.url))]
    pub async fn connect(config: &BusConfig) -> Result<Self, BusError> {
        info!("Connecting to NATS server");
        let client = async_nats::connect(&config.url)
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        info!("Connected to NATS server");
        Ok(Self { client })
    }

    /// Wrap an already-connected client (used by tests and embedders).
    pub fn from_client(client: async_nats::Client) -> Self {
        Self { client }
    }

    pub async fn subscribe(&self, subject: String) -> Result<async_nats::Subscriber, BusError> {
        self.client
            .subscribe(subject.clone())
            .await
            .map_err(|e| BusError::Subscribe {
                subject,
                reason: e.to_string(),
            })
    }

    pub async fn publish_json<T: Serialize>(
        &self,
        subject: String,
        payload: &T,
    ) -> Result<(), BusError> {
        let bytes = serde_json::to_vec(payload)?;
        self.client
            .publish(subject.clone(), bytes.into())
            .await
            .map_err(|e| BusError::PublishFailed {
                subject,
                reason: e.to_string(),
            })
    }

    /// Publish an empty payload; the removal announcement for a ticker id.
    pub async fn publish_empty(&self, subject: String) -> Result<(), BusError> {
        self.client
            .publish(subject.clone(), Vec::new().into())
            .await
            .map_err(|e| BusError::PublishFailed {
                subject,
                reason: e.to_string(),
            })
    }
}
