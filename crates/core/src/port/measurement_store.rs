// Measurement Store Port (the durable, append-only CSV log)
use crate::domain::MeasurementRecord;
use crate::error::Result;
use async_trait::async_trait;

/// What `ensure_header` had to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderOutcome {
    /// File was missing and has been created with only the header
    Created,
    /// First line already was the canonical header, nothing written
    AlreadyValid,
    /// Header rewritten, prior data rows kept in order
    Repaired {
        preserved_rows: usize,
        dropped_headers: usize,
    },
    /// File was unreadable and has been recreated with only the header
    Recreated { detail: String },
}

/// Durable measurement log
///
/// Exclusively owns its file. No locking: a single writer per run is assumed.
#[async_trait]
pub trait MeasurementStore: Send + Sync {
    /// Location of the log (used in diagnostics)
    fn location(&self) -> String;

    /// Make sure the log exists and starts with the canonical header
    ///
    /// Idempotent. Read failures are healed by recreating the file and
    /// reported as `HeaderOutcome::Recreated`.
    ///
    /// # Errors
    /// - AppError::Storage if the file cannot be created or rewritten
    async fn ensure_header(&self) -> Result<HeaderOutcome>;

    /// Append one validated record followed by a single newline
    ///
    /// # Errors
    /// - AppError::Storage if the file cannot be opened or written
    async fn append(&self, record: &MeasurementRecord) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::sync::{Arc, Mutex};

    /// In-memory store
    pub struct InMemoryStore {
        header_outcome: HeaderOutcome,
        fail_append: bool,
        rows: Arc<Mutex<Vec<String>>>,
    }

    impl InMemoryStore {
        pub fn new() -> Self {
            Self::with_header_outcome(HeaderOutcome::AlreadyValid)
        }

        pub fn with_header_outcome(header_outcome: HeaderOutcome) -> Self {
            Self {
                header_outcome,
                fail_append: false,
                rows: Arc::new(Mutex::new(Vec::new())),
            }
        }

        /// Make every append fail
        pub fn failing_appends(mut self) -> Self {
            self.fail_append = true;
            self
        }

        pub fn rows(&self) -> Vec<String> {
            self.rows.lock().unwrap().clone()
        }
    }

    impl Default for InMemoryStore {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl MeasurementStore for InMemoryStore {
        fn location(&self) -> String {
            "memory://speedtest.csv".to_string()
        }

        async fn ensure_header(&self) -> Result<HeaderOutcome> {
            Ok(self.header_outcome.clone())
        }

        async fn append(&self, record: &MeasurementRecord) -> Result<()> {
            if self.fail_append {
                return Err(AppError::Storage {
                    path: self.location(),
                    message: "disk full".to_string(),
                });
            }
            self.rows.lock().unwrap().push(record.as_line().to_string());
            Ok(())
        }
    }
}
