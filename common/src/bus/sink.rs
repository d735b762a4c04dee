// Publishes registry callbacks as gateway status and event messages

use crate::bus::subjects::ServiceSubjects;
use crate::bus::BusClient;
use crate::ticker::configuration::TickerConfiguration;
use crate::ticker::registry::TickerSink;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Payload of a tick event: publish instant plus elapsed-since-epoch value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickPayload {
    pub timestamp: i64,
    pub value: i64,
}

/// Payload of the gateway heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnixEpochPayload {
    pub milliseconds: i64,
}

/// Maps the registry's callbacks onto bus subjects.
///
/// The gateway's own heartbeat ticker (id equal to the instance name) is
/// special-cased: its ticks become the unix-epoch status and its
/// configuration lifecycle is kept off the bus. Publish failures are logged
/// and dropped; the scheduling core must never stall on the transport.
pub struct NatsTickerSink {
    bus: BusClient,
    subjects: ServiceSubjects,
    instance: String,
}

impl NatsTickerSink {
    pub fn new(bus: BusClient, subjects: ServiceSubjects, instance: String) -> Self {
        Self {
            bus,
            subjects,
            instance,
        }
    }
}

#[async_trait::async_trait]
impl TickerSink for NatsTickerSink {
    async fn on_configuration_updated(&self, configuration: TickerConfiguration) {
        if configuration.id == self.instance {
            return;
        }
        let subject = self.subjects.status_configuration(&configuration.id);
        if let Err(e) = self.bus.publish_json(subject, &configuration).await {
            warn!(id = %configuration.id, error = %e, "Failed to publish configuration status");
        }
    }

    async fn on_tick(&self, id: String, elapsed_ms: i64) {
        let now = chrono::Utc::now().timestamp_millis();
        if id == self.instance {
            let payload = UnixEpochPayload { milliseconds: now };
            if let Err(e) = self
                .bus
                .publish_json(self.subjects.status_unix_epoch(), &payload)
                .await
            {
                warn!(error = %e, "Failed to publish heartbeat");
            }
            return;
        }
        let payload = TickPayload {
            timestamp: now,
            value: elapsed_ms,
        };
        if let Err(e) = self
            .bus
            .publish_json(self.subjects.event_tick(&id), &payload)
            .await
        {
            warn!(id = %id, error = %e, "Failed to publish tick event");
        }
    }

    async fn on_configuration_removed(&self, id: String) {
        if id == self.instance {
            return;
        }
        let subject = self.subjects.status_configuration(&id);
        if let Err(e) = self.bus.publish_empty(subject).await {
            warn!(id = %id, error = %e, "Failed to publish removal status");
        }
    }
}
