// Diagnostic events (one per decision point of a capture run)

use super::error::DomainError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Severity of a diagnostic event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

/// Pipeline phase that produced the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Durable log preparation
    Init,
    /// Network precondition chain
    Precheck,
    /// Measurement command, validation and append
    Speedtest,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::Precheck => "precheck",
            Phase::Speedtest => "speedtest",
        }
    }
}

/// Fixed reason-code vocabulary of the diagnostics stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    IfaceNotFound,
    IfaceDown,
    AddrCmdError,
    NoIpAddr,
    NoDefaultRoute,
    GatewayUnreach,
    SpeedtestIfaceNotFound,
    SpeedtestNetUnreach,
    SpeedtestTimeout,
    SpeedtestPermission,
    SpeedtestUnknown,
    SpeedtestError,
    EmptyOutput,
    BadCsvFormat,
    CsvReadError,
    CsvWriteError,
    CsvHeaderFixed,
    Ok,
}

impl ReasonCode {
    pub const ALL: [ReasonCode; 18] = [
        ReasonCode::IfaceNotFound,
        ReasonCode::IfaceDown,
        ReasonCode::AddrCmdError,
        ReasonCode::NoIpAddr,
        ReasonCode::NoDefaultRoute,
        ReasonCode::GatewayUnreach,
        ReasonCode::SpeedtestIfaceNotFound,
        ReasonCode::SpeedtestNetUnreach,
        ReasonCode::SpeedtestTimeout,
        ReasonCode::SpeedtestPermission,
        ReasonCode::SpeedtestUnknown,
        ReasonCode::SpeedtestError,
        ReasonCode::EmptyOutput,
        ReasonCode::BadCsvFormat,
        ReasonCode::CsvReadError,
        ReasonCode::CsvWriteError,
        ReasonCode::CsvHeaderFixed,
        ReasonCode::Ok,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::IfaceNotFound => "IFACE_NOT_FOUND",
            ReasonCode::IfaceDown => "IFACE_DOWN",
            ReasonCode::AddrCmdError => "ADDR_CMD_ERROR",
            ReasonCode::NoIpAddr => "NO_IP_ADDR",
            ReasonCode::NoDefaultRoute => "NO_DEFAULT_ROUTE",
            ReasonCode::GatewayUnreach => "GATEWAY_UNREACH",
            ReasonCode::SpeedtestIfaceNotFound => "SPEEDTEST_IFACE_NOT_FOUND",
            ReasonCode::SpeedtestNetUnreach => "SPEEDTEST_NET_UNREACH",
            ReasonCode::SpeedtestTimeout => "SPEEDTEST_TIMEOUT",
            ReasonCode::SpeedtestPermission => "SPEEDTEST_PERMISSION",
            ReasonCode::SpeedtestUnknown => "SPEEDTEST_UNKNOWN",
            ReasonCode::SpeedtestError => "SPEEDTEST_ERROR",
            ReasonCode::EmptyOutput => "EMPTY_OUTPUT",
            ReasonCode::BadCsvFormat => "BAD_CSV_FORMAT",
            ReasonCode::CsvReadError => "CSV_READ_ERROR",
            ReasonCode::CsvWriteError => "CSV_WRITE_ERROR",
            ReasonCode::CsvHeaderFixed => "CSV_HEADER_FIXED",
            ReasonCode::Ok => "OK",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReasonCode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReasonCode::ALL
            .iter()
            .copied()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| DomainError::UnknownReason(s.to_string()))
    }
}

/// Structured diagnostic event
///
/// Mandatory keys are `ts`, `level`, `phase` and `reason`; everything else
/// lives in `context`. Serialized once and dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticEvent {
    pub ts: Option<String>,
    pub level: Level,
    pub phase: Phase,
    pub reason: ReasonCode,
    pub context: Map<String, Value>,
}

impl DiagnosticEvent {
    pub fn new(level: Level, phase: Phase, reason: ReasonCode) -> Self {
        Self {
            ts: None,
            level,
            phase,
            reason,
            context: Map::new(),
        }
    }

    pub fn info(phase: Phase, reason: ReasonCode) -> Self {
        Self::new(Level::Info, phase, reason)
    }

    pub fn warn(phase: Phase, reason: ReasonCode) -> Self {
        Self::new(Level::Warn, phase, reason)
    }

    pub fn error(phase: Phase, reason: ReasonCode) -> Self {
        Self::new(Level::Error, phase, reason)
    }

    /// Set the timestamp (ISO-8601 UTC, e.g. `2024-01-01T00:00:00Z`)
    pub fn at(mut self, ts: impl Into<String>) -> Self {
        self.ts = Some(ts.into());
        self
    }

    /// Add one context key
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Merge a context map (existing keys are overwritten)
    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context.extend(context);
        self
    }

    /// Stamp the event unless the caller already did
    pub fn stamp_if_missing(&mut self, ts: impl FnOnce() -> String) {
        if self.ts.is_none() {
            self.ts = Some(ts());
        }
    }

    /// Serialize to a single JSON line with sorted keys
    ///
    /// Mandatory keys are written last so context can never shadow them.
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        // BTreeMap keeps the order independent of serde_json's preserve_order feature
        let mut record: BTreeMap<&str, Value> = self
            .context
            .iter()
            .map(|(k, v)| (k.as_str(), v.clone()))
            .collect();
        if let Some(ts) = &self.ts {
            record.insert("ts", Value::from(ts.as_str()));
        }
        record.insert("level", serde_json::to_value(self.level)?);
        record.insert("phase", serde_json::to_value(self.phase)?);
        record.insert("reason", serde_json::to_value(self.reason)?);
        serde_json::to_string(&record)
    }
}

/// Truncate to at most `max_chars` characters without splitting a code point
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
