// Capture configuration (loaded once at startup, passed explicitly)

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CSV_PATH: &str = "/var/lib/speedtest-telemetry/speedtest.csv";
pub const DEFAULT_DIAG_LOG_PATH: &str = "/var/log/speedtest-diag.log";
pub const DEFAULT_IFACE: &str = "wlp2s0";
pub const DEFAULT_SPEEDTEST_CMD: &str = "/usr/local/bin/speedtest-telemetry --format=csv";
pub const DEFAULT_CMD_TIMEOUT_SECS: u64 = 180;
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 10;

/// Everything a capture run needs to know about its environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    pub csv_path: PathBuf,
    pub diag_log_path: PathBuf,
    pub iface: String,
    /// Measurement command line, split with shell-word rules (never a shell)
    pub speedtest_cmd: String,
    /// Overrides default-route discovery when set
    pub gateway_ip: Option<String>,
    pub cmd_timeout: Duration,
    /// Bound for link/address/route/ping queries
    pub query_timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::from(DEFAULT_CSV_PATH),
            diag_log_path: PathBuf::from(DEFAULT_DIAG_LOG_PATH),
            iface: DEFAULT_IFACE.to_string(),
            speedtest_cmd: DEFAULT_SPEEDTEST_CMD.to_string(),
            gateway_ip: None,
            cmd_timeout: Duration::from_secs(DEFAULT_CMD_TIMEOUT_SECS),
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
        }
    }
}
