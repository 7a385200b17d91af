// Application Layer - Use Cases and Business Logic

pub mod capture;
pub mod constants;
pub mod measurement;
pub mod precheck;

// Re-exports
pub use capture::{CapturePipeline, RunOutcome};
pub use measurement::{classify_stderr, MeasurementExecutor, MeasurementOutcome, STDERR_RULES};
pub use precheck::{ChainOutcome, PreconditionChain};
