//! Speedtest Telemetry - one-shot capture entry point
//! Runs a single capture pass (meant to be fired by a systemd timer or cron)

mod config;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::LogFormat;
use speedtest_telemetry_core::application::CapturePipeline;
use speedtest_telemetry_core::port::time_provider::SystemTimeProvider;
use speedtest_telemetry_core::VERSION;
use speedtest_telemetry_infra_fs::{CsvMeasurementStore, JsonlDiagnosticsSink};
use speedtest_telemetry_infra_system::SubprocessRunner;

const DEFAULT_FILTER: &str = "speedtest_telemetry=info,speedtest_logger=info";

/// Tracing goes to stderr; stdout is reserved for diagnostic event lines
fn init_logging(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .init();
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Load configuration (logging still needs a format if this fails)
    let config = match config::load() {
        Ok(config) => config,
        Err(e) => {
            init_logging(LogFormat::Pretty);
            error!(error = ?e, "Configuration rejected");
            return Err(e);
        }
    };

    // 2. Initialize logging
    init_logging(config.log_format);
    info!("speedtest-logger v{} starting", VERSION);
    for warning in &config.warnings {
        warn!("{}", warning);
    }

    let capture = &config.capture;
    info!(
        csv_path = %capture.csv_path.display(),
        diag_log_path = %capture.diag_log_path.display(),
        iface = %capture.iface,
        gateway_ip = capture.gateway_ip.as_deref().unwrap_or("<default route>"),
        cmd_timeout_secs = capture.cmd_timeout.as_secs(),
        "Configuration loaded"
    );

    // 3. Setup dependencies (DI wiring)
    let time_provider = Arc::new(SystemTimeProvider);
    let runner = Arc::new(SubprocessRunner::new());
    let store = Arc::new(CsvMeasurementStore::new(&capture.csv_path));
    let sink = Arc::new(
        JsonlDiagnosticsSink::new(&capture.diag_log_path).with_time_provider(time_provider.clone()),
    );

    let pipeline = CapturePipeline::new(capture, runner, store, sink, time_provider);

    // 4. Run one capture pass
    let outcome = pipeline
        .run_once()
        .await
        .context("Diagnostics stream unavailable")?;

    info!(
        reason = %outcome.reason,
        appended = outcome.appended,
        "Capture run finished"
    );

    Ok(())
}
