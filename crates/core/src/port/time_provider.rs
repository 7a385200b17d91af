// Time Provider Port (for testability)

use chrono::{DateTime, SecondsFormat, Utc};

/// Time provider interface (allows mocking in tests)
pub trait TimeProvider: Send + Sync {
    /// Current UTC time
    fn now(&self) -> DateTime<Utc>;

    /// Current time as ISO-8601 with second precision and a `Z` suffix
    fn now_iso(&self) -> String {
        format_iso(self.now())
    }
}

/// Format a timestamp the way the diagnostics stream expects (`2024-01-01T00:00:00Z`)
pub fn format_iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// System time provider (production)
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;

    /// Frozen clock
    pub struct FixedTimeProvider(pub DateTime<Utc>);

    impl FixedTimeProvider {
        /// Clock frozen at the given RFC 3339 instant
        pub fn at(rfc3339: &str) -> Self {
            let ts = DateTime::parse_from_rfc3339(rfc3339)
                .expect("valid RFC 3339 timestamp")
                .with_timezone(&Utc);
            Self(ts)
        }
    }

    impl TimeProvider for FixedTimeProvider {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mocks::FixedTimeProvider;
    use super::*;

    #[test]
    fn test_iso_format_has_second_precision_and_z() {
        let clock = FixedTimeProvider::at("2024-01-01T12:34:56.789+00:00");
        assert_eq!(clock.now_iso(), "2024-01-01T12:34:56Z");
    }

    #[test]
    fn test_system_time_is_utc_iso() {
        let ts = SystemTimeProvider.now_iso();
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), "2024-01-01T00:00:00Z".len());
    }
}
