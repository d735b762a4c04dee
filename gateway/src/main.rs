// Gateway binary entry point

use anyhow::Context;
use common::bus::{BusClient, GatewayService, NatsTickerSink, ServiceSubjects};
use common::config::Settings;
use common::telemetry;
use common::ticker::{Clock, TickerRegistry};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("Failed to load configuration")?;
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    telemetry::init_logging(&settings.observability.log_level)?;
    telemetry::init_metrics(settings.observability.metrics_port)?;

    info!(
        instance = %settings.gateway.instance,
        nats_url = %settings.nats.url,
        "Starting tickway gateway"
    );

    let bus = BusClient::connect(&settings.nats).await?;
    let subjects = ServiceSubjects::new(&settings.nats.subject_prefix, &settings.gateway.instance);
    let sink = Arc::new(NatsTickerSink::new(
        bus.clone(),
        subjects.clone(),
        settings.gateway.instance.clone(),
    ));
    let registry = Arc::new(TickerRegistry::new(sink, Clock::system()));
    let service = Arc::new(GatewayService::new(
        Arc::clone(&registry),
        bus,
        subjects,
        settings.gateway.clone(),
    ));

    service.register_heartbeat().await.map_err(|e| {
        error!(error = %e, "Failed to register heartbeat ticker");
        anyhow::anyhow!(e)
    })?;
    info!("Heartbeat ticker registered");

    let service_for_shutdown = Arc::clone(&service);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C signal, initiating graceful shutdown");
            service_for_shutdown.shutdown();
        }
    });

    service.run().await?;

    info!("Gateway stopped");
    Ok(())
}
