// Measurement record (one CSV row produced by the measurement command)

use super::error::{DomainError, Result};
use std::fmt;

/// Canonical header of the durable CSV log (exact column order)
pub const CSV_HEADER: &str = "timestamp,download_mbps,upload_mbps,ping_ms,jitter_ms,packet_loss,\
server_name,server_id,isp,gw_ping_ms,gw_loss_pct,cf_ping_ms,cf_loss_pct,\
g_ping_ms,g_loss_pct,dns_ms,http_ms,wifi_iface,wifi_ssid,wifi_band,status,error";

/// Number of columns in [`CSV_HEADER`]
pub const CSV_FIELD_COUNT: usize = 22;

/// Leading token that marks a line as a (possibly stale) header
pub const HEADER_MARKER: &str = "timestamp";

/// Count comma-separated fields the same way the validator does
pub fn field_count(line: &str) -> usize {
    line.split(',').map(str::trim).count()
}

/// Shape check for a measurement line
///
/// Only the field count is checked; empty fields are fine and types or
/// ranges are never inspected.
pub fn validate(line: &str) -> bool {
    field_count(line) == CSV_FIELD_COUNT
}

/// Whether a line looks like a header row
pub fn is_header_like(line: &str) -> bool {
    line.trim_start_matches('\u{feff}')
        .trim()
        .starts_with(HEADER_MARKER)
}

/// Validated measurement row
///
/// Holds the command's stdout line verbatim. The only way to build one is
/// [`MeasurementRecord::parse`], so every instance has passed [`validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementRecord(String);

impl MeasurementRecord {
    /// Validate a raw output line and wrap it
    ///
    /// # Errors
    /// - `DomainError::EmptyRecord` if the line is blank
    /// - `DomainError::MultiLine` if the output holds more than one line
    /// - `DomainError::BadCsvFormat` if the field count is not [`CSV_FIELD_COUNT`]
    pub fn parse(line: &str) -> Result<Self> {
        if line.trim().is_empty() {
            return Err(DomainError::EmptyRecord);
        }
        let lines = line.lines().count();
        if lines > 1 {
            return Err(DomainError::MultiLine(lines));
        }
        let actual = field_count(line);
        if actual != CSV_FIELD_COUNT {
            return Err(DomainError::BadCsvFormat {
                expected: CSV_FIELD_COUNT,
                actual,
            });
        }
        Ok(Self(line.to_string()))
    }

    pub fn as_line(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MeasurementRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
