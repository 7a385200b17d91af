// Speedtest Telemetry Infrastructure - File Adapters
// Implements: MeasurementStore (CSV), DiagnosticsSink (JSON lines)

pub mod csv_store;
pub mod jsonl_sink;

pub use csv_store::CsvMeasurementStore;
pub use jsonl_sink::JsonlDiagnosticsSink;
