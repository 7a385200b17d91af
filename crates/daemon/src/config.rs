//! Environment configuration
//!
//! Every setting is read from a `SPEEDTEST_`-prefixed variable and falls back
//! to the built-in default. Loaded once at startup.
//!
//! Timeouts and the log format are tuning knobs: an unparseable value is
//! replaced by its default and reported in [`DaemonConfig::warnings`] instead
//! of failing the run.

use anyhow::{Context, Result};
use config::{Config, Environment};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use speedtest_telemetry_core::domain::config::{
    DEFAULT_CMD_TIMEOUT_SECS, DEFAULT_CSV_PATH, DEFAULT_DIAG_LOG_PATH, DEFAULT_IFACE,
    DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_SPEEDTEST_CMD,
};
use speedtest_telemetry_core::domain::CaptureConfig;

const ENV_PREFIX: &str = "SPEEDTEST";

/// Tracing output style
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format {:?}", other)),
        }
    }
}

/// Raw settings as they appear in the environment
#[derive(Debug, Deserialize)]
struct Settings {
    csv_path: String,
    diag_log_path: String,
    iface: String,
    cmd: String,
    gateway_ip: String,
    cmd_timeout_secs: String,
    query_timeout_secs: String,
    log_format: String,
}

/// Loaded configuration for one process
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub capture: CaptureConfig,
    pub log_format: LogFormat,
    /// Rejected values that were replaced by their defaults
    pub warnings: Vec<String>,
}

/// Load from the process environment
pub fn load() -> Result<DaemonConfig> {
    load_from(None)
}

/// Load from an explicit variable map instead of the process environment
pub fn load_from(vars: Option<HashMap<String, String>>) -> Result<DaemonConfig> {
    let settings: Settings = Config::builder()
        .set_default("csv_path", DEFAULT_CSV_PATH)?
        .set_default("diag_log_path", DEFAULT_DIAG_LOG_PATH)?
        .set_default("iface", DEFAULT_IFACE)?
        .set_default("cmd", DEFAULT_SPEEDTEST_CMD)?
        .set_default("gateway_ip", "")?
        .set_default("cmd_timeout_secs", DEFAULT_CMD_TIMEOUT_SECS.to_string())?
        .set_default("query_timeout_secs", DEFAULT_QUERY_TIMEOUT_SECS.to_string())?
        .set_default("log_format", "pretty")?
        .add_source(Environment::with_prefix(ENV_PREFIX).source(vars))
        .build()
        .context("Failed to read SPEEDTEST_* environment")?
        .try_deserialize()
        .context("Invalid SPEEDTEST_* configuration")?;

    Ok(settings.into())
}

/// Parse a tuning value, keeping the default (and a warning) when it is invalid
fn parse_or_default<T: FromStr>(
    key: &str,
    raw: &str,
    default: T,
    warnings: &mut Vec<String>,
) -> T {
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            warnings.push(format!(
                "{}_{} = {:?} is invalid, using the default",
                ENV_PREFIX,
                key.to_ascii_uppercase(),
                raw
            ));
            default
        }
    }
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

impl From<Settings> for DaemonConfig {
    fn from(s: Settings) -> Self {
        let gateway_ip = Some(s.gateway_ip.trim().to_string()).filter(|ip| !ip.is_empty());

        let mut warnings = Vec::new();
        let cmd_timeout_secs = parse_or_default(
            "cmd_timeout_secs",
            &s.cmd_timeout_secs,
            DEFAULT_CMD_TIMEOUT_SECS,
            &mut warnings,
        );
        let query_timeout_secs = parse_or_default(
            "query_timeout_secs",
            &s.query_timeout_secs,
            DEFAULT_QUERY_TIMEOUT_SECS,
            &mut warnings,
        );
        let log_format =
            parse_or_default("log_format", &s.log_format, LogFormat::Pretty, &mut warnings);

        Self {
            capture: CaptureConfig {
                csv_path: expand_path(&s.csv_path),
                diag_log_path: expand_path(&s.diag_log_path),
                iface: s.iface,
                speedtest_cmd: s.cmd,
                gateway_ip,
                cmd_timeout: Duration::from_secs(cmd_timeout_secs),
                query_timeout: Duration::from_secs(query_timeout_secs),
            },
            log_format,
            warnings,
        }
    }
}
