// Port Layer - Interfaces for external dependencies

pub mod command_runner;
pub mod diagnostics_sink;
pub mod measurement_store;
pub mod time_provider; // For deterministic testing

// Re-exports
pub use command_runner::{CommandOutput, CommandRunner};
pub use diagnostics_sink::DiagnosticsSink;
pub use measurement_store::{HeaderOutcome, MeasurementStore};
pub use time_provider::TimeProvider;
