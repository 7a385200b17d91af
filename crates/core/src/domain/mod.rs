// Domain Layer - Pure business logic and entities

pub mod config;
pub mod diagnostic;
pub mod error;
pub mod precondition;
pub mod record;

// Re-exports
pub use config::CaptureConfig;
pub use diagnostic::{DiagnosticEvent, Level, Phase, ReasonCode};
pub use error::DomainError;
pub use precondition::{Gateway, GatewaySource, PreconditionResult};
pub use record::{MeasurementRecord, CSV_FIELD_COUNT, CSV_HEADER};
