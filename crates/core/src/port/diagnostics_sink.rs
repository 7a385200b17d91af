// Diagnostics Sink Port (the structured event stream)
use crate::domain::DiagnosticEvent;
use crate::error::Result;
use async_trait::async_trait;

/// Diagnostics sink
///
/// Serializes each event to one key-sorted line and appends it to the
/// diagnostics stream. Events without a timestamp get one stamped.
#[async_trait]
pub trait DiagnosticsSink: Send + Sync {
    /// # Errors
    /// - AppError::Sink if the stream cannot be written (fatal for the run)
    async fn emit(&self, event: DiagnosticEvent) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::ReasonCode;
    use crate::error::AppError;
    use std::sync::{Arc, Mutex};

    /// Sink that keeps events in memory
    #[derive(Default)]
    pub struct RecordingSink {
        events: Arc<Mutex<Vec<DiagnosticEvent>>>,
        broken: bool,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        /// Sink whose stream can never be opened
        pub fn broken() -> Self {
            Self {
                broken: true,
                ..Self::default()
            }
        }

        pub fn events(&self) -> Vec<DiagnosticEvent> {
            self.events.lock().unwrap().clone()
        }

        pub fn reasons(&self) -> Vec<ReasonCode> {
            self.events().iter().map(|e| e.reason).collect()
        }
    }

    #[async_trait]
    impl DiagnosticsSink for RecordingSink {
        async fn emit(&self, event: DiagnosticEvent) -> Result<()> {
            if self.broken {
                return Err(AppError::Sink("diagnostics stream unavailable".to_string()));
            }
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }
}
