// Gateway service: consumes intent subjects and drives the ticker registry

use crate::bus::subjects::ServiceSubjects;
use crate::bus::BusClient;
use crate::config::GatewayConfig;
use crate::errors::{BusError, ConfigurationError};
use crate::ticker::configuration::TickerUpdate;
use crate::ticker::registry::TickerRegistry;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{info, instrument, warn};

/// Inbound cancellation command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelCommand {
    pub id: String,
}

/// Runs the inbound side of the gateway: subscribes to the intent subjects,
/// decodes commands, and forwards them to the registry. Wire validation ends
/// here; malformed payloads are logged and dropped, they never reach the
/// scheduling core.
pub struct GatewayService {
    registry: Arc<TickerRegistry>,
    bus: BusClient,
    subjects: ServiceSubjects,
    gateway: GatewayConfig,
    shutdown: Notify,
}

impl GatewayService {
    pub fn new(
        registry: Arc<TickerRegistry>,
        bus: BusClient,
        subjects: ServiceSubjects,
        gateway: GatewayConfig,
    ) -> Self {
        Self {
            registry,
            bus,
            subjects,
            gateway,
            shutdown: Notify::new(),
        }
    }

    /// Register the gateway's own heartbeat ticker; its ticks surface as the
    /// unix-epoch status on the bus.
    pub async fn register_heartbeat(&self) -> Result<(), ConfigurationError> {
        let mut update = TickerUpdate::new(self.gateway.instance.clone());
        update.interval = Some(self.gateway.heartbeat_interval_ms);
        self.registry.configure(update).await
    }

    /// Consume intents until shutdown is requested or the bus closes.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), BusError> {
        let mut configuration_sub = self
            .bus
            .subscribe(self.subjects.intent_configuration())
            .await?;
        let mut cancel_sub = self.bus.subscribe(self.subjects.intent_cancel()).await?;
        info!(
            configuration_subject = %self.subjects.intent_configuration(),
            cancel_subject = %self.subjects.intent_cancel(),
            "Gateway service listening"
        );

        loop {
            tokio::select! {
                message = configuration_sub.next() => match message {
                    Some(message) => self.handle_configuration(&message.payload).await,
                    None => break,
                },
                message = cancel_sub.next() => match message {
                    Some(message) => self.handle_cancel(&message.payload).await,
                    None => break,
                },
                _ = self.shutdown.notified() => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        self.registry.shutdown().await;
        info!("Gateway service stopped");
        Ok(())
    }

    /// Request graceful shutdown of the `run` loop.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    async fn handle_configuration(&self, payload: &[u8]) {
        let update: TickerUpdate = match serde_json::from_slice(payload) {
            Ok(update) => update,
            Err(e) => {
                warn!(error = %e, "Dropping malformed configuration intent");
                return;
            }
        };
        match self.registry.configure(update).await {
            Ok(()) => {}
            Err(e @ ConfigurationError::Rejected { .. }) => {
                // Stale by definition; drop without retry.
                info!(error = %e, "Stale configuration dropped");
            }
            Err(e) => warn!(error = %e, "Configuration intent refused"),
        }
    }

    async fn handle_cancel(&self, payload: &[u8]) {
        let command: CancelCommand = match serde_json::from_slice(payload) {
            Ok(command) => command,
            Err(e) => {
                warn!(error = %e, "Dropping malformed cancel intent");
                return;
            }
        };
        self.registry.cancel(&command.id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_command_decodes() {
        let command: CancelCommand = serde_json::from_str(r#"{"id":"boiler"}"#).unwrap();
        assert_eq!(command.id, "boiler");
    }

    #[test]
    fn test_ticker_update_decodes_with_partial_fields() {
        let update: TickerUpdate =
            serde_json::from_str(r#"{"id":"boiler","interval":1000}"#).unwrap();
        assert_eq!(update.id, "boiler");
        assert_eq!(update.interval, Some(1000));
        assert_eq!(update.first, None);
        assert_eq!(update.last, None);
        assert_eq!(update.epoch, None);
    }
}
