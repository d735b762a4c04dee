// Telemetry: structured logging and Prometheus metrics

use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize structured logging with JSON formatting.
///
/// Log levels come from `RUST_LOG` when set, falling back to the configured
/// level. Safe to call once per process.
pub fn init_logging(log_level: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let json_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(json_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;

    tracing::info!(log_level, "Structured logging initialized");
    Ok(())
}

/// Initialize the Prometheus metrics exporter and describe all metrics:
/// - ticker_ticks_total: counter of ticks delivered per ticker id
/// - ticker_removed_total: counter of tickers retired
/// - active_tickers: gauge of currently registered tickers
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_counter!("ticker_ticks_total", "Total number of ticks delivered");
    describe_counter!("ticker_removed_total", "Total number of tickers retired");
    describe_gauge!("active_tickers", "Current number of registered tickers");

    tracing::info!(metrics_port, "Prometheus metrics exporter initialized");
    Ok(())
}

#[inline]
pub fn record_tick(id: &str) {
    counter!("ticker_ticks_total", "ticker_id" => id.to_string()).increment(1);
}

#[inline]
pub fn record_ticker_removed() {
    counter!("ticker_removed_total").increment(1);
}

#[inline]
pub fn update_active_tickers(count: usize) {
    gauge!("active_tickers").set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording_without_exporter() {
        // With no recorder installed these must be silent no-ops.
        record_tick("test-ticker");
        record_ticker_removed();
        update_active_tickers(3);
    }
}
