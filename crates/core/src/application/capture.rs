// Capture pipeline (one run, end to end)
// ensure header -> preconditions -> measurement -> validation -> append
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::constants::MAX_EXCERPT_CHARS;
use super::measurement::{MeasurementExecutor, MeasurementOutcome};
use super::precheck::{ChainOutcome, PreconditionChain};
use crate::domain::diagnostic::truncate_chars;
use crate::domain::record::field_count;
use crate::domain::{
    CaptureConfig, DiagnosticEvent, Gateway, Level, MeasurementRecord, Phase, ReasonCode,
};
use crate::error::Result;
use crate::port::{CommandRunner, DiagnosticsSink, HeaderOutcome, MeasurementStore, TimeProvider};

/// Summary of a finished run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    /// Reason code of the run's terminal diagnostic event
    pub reason: ReasonCode,
    /// Whether a measurement row reached the durable log
    pub appended: bool,
}

impl RunOutcome {
    fn skipped(reason: ReasonCode) -> Self {
        Self {
            reason,
            appended: false,
        }
    }
}

/// Capture pipeline
///
/// Single linear pass. Every exit point emits exactly one terminal event;
/// header repair may add one `init` event before it. Network, measurement
/// and storage problems are reported, not returned: the only `Err` is a
/// diagnostics sink failure.
pub struct CapturePipeline {
    iface: String,
    chain: PreconditionChain,
    executor: MeasurementExecutor,
    store: Arc<dyn MeasurementStore>,
    sink: Arc<dyn DiagnosticsSink>,
    time_provider: Arc<dyn TimeProvider>,
}

impl CapturePipeline {
    pub fn new(
        config: &CaptureConfig,
        runner: Arc<dyn CommandRunner>,
        store: Arc<dyn MeasurementStore>,
        sink: Arc<dyn DiagnosticsSink>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            iface: config.iface.clone(),
            chain: PreconditionChain::from_config(runner.clone(), config),
            executor: MeasurementExecutor::from_config(runner, config),
            store,
            sink,
            time_provider,
        }
    }

    /// Execute one capture run
    ///
    /// # Errors
    /// - AppError::Sink / AppError::Serialization if a diagnostic event cannot be written
    pub async fn run_once(&self) -> Result<RunOutcome> {
        let ts = self.time_provider.now_iso();

        if let Some(outcome) = self.prepare_log(&ts).await? {
            return Ok(outcome);
        }

        let gateway = match self.chain.run().await {
            ChainOutcome::Passed(gateway) => gateway,
            ChainOutcome::Failed { result, gateway } => {
                let event = self
                    .event(Level::Error, Phase::Precheck, result.reason, &ts, gateway.as_ref())
                    .with_context(result.context);
                self.emit(event).await?;
                return Ok(RunOutcome::skipped(result.reason));
            }
        };

        let line = match self.executor.execute().await {
            MeasurementOutcome::Failed {
                reason,
                exit_code,
                stderr,
            } => {
                let event = self
                    .event(Level::Error, Phase::Speedtest, reason, &ts, Some(&gateway))
                    .with("exit_code", exit_code)
                    .with("stderr", truncate_chars(&stderr, MAX_EXCERPT_CHARS));
                self.emit(event).await?;
                return Ok(RunOutcome::skipped(reason));
            }
            MeasurementOutcome::Empty => {
                let reason = ReasonCode::EmptyOutput;
                let event = self.event(Level::Warn, Phase::Speedtest, reason, &ts, Some(&gateway));
                self.emit(event).await?;
                return Ok(RunOutcome::skipped(reason));
            }
            MeasurementOutcome::Output(line) => line,
        };

        let record = match MeasurementRecord::parse(&line) {
            Ok(record) => record,
            Err(e) => {
                let reason = ReasonCode::BadCsvFormat;
                let event = self
                    .event(Level::Error, Phase::Speedtest, reason, &ts, Some(&gateway))
                    .with("detail", e.to_string())
                    .with("field_count", field_count(&line))
                    .with("line_sample", truncate_chars(&line, MAX_EXCERPT_CHARS));
                self.emit(event).await?;
                return Ok(RunOutcome::skipped(reason));
            }
        };

        if let Err(e) = self.store.append(&record).await {
            let reason = ReasonCode::CsvWriteError;
            let event = self
                .event(Level::Error, Phase::Speedtest, reason, &ts, Some(&gateway))
                .with("csv_path", self.store.location())
                .with("detail", e.to_string());
            self.emit(event).await?;
            return Ok(RunOutcome::skipped(reason));
        }

        let event = self.event(Level::Info, Phase::Speedtest, ReasonCode::Ok, &ts, Some(&gateway));
        self.emit(event).await?;
        Ok(RunOutcome {
            reason: ReasonCode::Ok,
            appended: true,
        })
    }

    /// Ensure the durable log header; `Some` ends the run early
    async fn prepare_log(&self, ts: &str) -> Result<Option<RunOutcome>> {
        let csv_path = self.store.location();

        match self.store.ensure_header().await {
            Ok(HeaderOutcome::Created) | Ok(HeaderOutcome::AlreadyValid) => Ok(None),
            Ok(HeaderOutcome::Repaired {
                preserved_rows,
                dropped_headers,
            }) => {
                let event = DiagnosticEvent::info(Phase::Init, ReasonCode::CsvHeaderFixed)
                    .at(ts)
                    .with("csv_path", csv_path)
                    .with("preserved_rows", preserved_rows)
                    .with("dropped_headers", dropped_headers);
                self.emit(event).await?;
                Ok(None)
            }
            Ok(HeaderOutcome::Recreated { detail }) => {
                let event = DiagnosticEvent::error(Phase::Init, ReasonCode::CsvReadError)
                    .at(ts)
                    .with("csv_path", csv_path)
                    .with("detail", detail);
                self.emit(event).await?;
                Ok(None)
            }
            Err(e) => {
                // The log cannot be created: a measurement would have nowhere to go
                let reason = ReasonCode::CsvWriteError;
                let event = DiagnosticEvent::error(Phase::Init, reason)
                    .at(ts)
                    .with("csv_path", csv_path)
                    .with("detail", e.to_string());
                self.emit(event).await?;
                Ok(Some(RunOutcome::skipped(reason)))
            }
        }
    }

    fn event(
        &self,
        level: Level,
        phase: Phase,
        reason: ReasonCode,
        ts: &str,
        gateway: Option<&Gateway>,
    ) -> DiagnosticEvent {
        let context = gateway.map(Gateway::context).unwrap_or_else(Map::new);
        DiagnosticEvent::new(level, phase, reason)
            .at(ts)
            .with("iface", Value::from(self.iface.as_str()))
            .with_context(context)
    }

    async fn emit(&self, event: DiagnosticEvent) -> Result<()> {
        match event.level {
            Level::Info => {
                info!(phase = event.phase.as_str(), reason = %event.reason, "Diagnostic")
            }
            Level::Warn => {
                warn!(phase = event.phase.as_str(), reason = %event.reason, "Diagnostic")
            }
            Level::Error => {
                error!(phase = event.phase.as_str(), reason = %event.reason, "Diagnostic")
            }
        }
        self.sink.emit(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CSV_FIELD_COUNT;
    use crate::port::command_runner::mocks::FakeCommandRunner;
    use crate::port::diagnostics_sink::mocks::RecordingSink;
    use crate::port::measurement_store::mocks::InMemoryStore;
    use crate::port::time_provider::mocks::FixedTimeProvider;
    use crate::port::CommandOutput;

    const TS: &str = "2024-01-01T00:00:00Z";
    const GOOD_LINE: &str = "2024-01-01T00:00:00Z,100,20,10,1,0,srv,1,ISP,,,,,,,,,,,,ok,";

    struct Harness {
        runner: Arc<FakeCommandRunner>,
        store: Arc<InMemoryStore>,
        sink: Arc<RecordingSink>,
        pipeline: CapturePipeline,
    }

    fn network_ok() -> FakeCommandRunner {
        FakeCommandRunner::new()
            .on("ip link show", CommandOutput::ok("2: wlp2s0: <UP> state UP"))
            .on("ip -4 addr", CommandOutput::ok("inet 10.0.0.2/24 scope global"))
            .on("ip route show default", CommandOutput::ok("default via 10.0.0.1 dev wlp2s0"))
            .on("ping", CommandOutput::ok("1 received"))
    }

    fn harness(runner: FakeCommandRunner, store: InMemoryStore, sink: RecordingSink) -> Harness {
        let runner = Arc::new(runner);
        let store = Arc::new(store);
        let sink = Arc::new(sink);
        let config = CaptureConfig {
            speedtest_cmd: "speedtest --format=csv".to_string(),
            ..CaptureConfig::default()
        };
        let pipeline = CapturePipeline::new(
            &config,
            runner.clone(),
            store.clone(),
            sink.clone(),
            Arc::new(FixedTimeProvider::at(TS)),
        );
        Harness {
            runner,
            store,
            sink,
            pipeline,
        }
    }

    #[tokio::test]
    async fn test_success_appends_and_reports_ok() {
        let h = harness(
            network_ok().on("speedtest", CommandOutput::ok(GOOD_LINE)),
            InMemoryStore::new(),
            RecordingSink::new(),
        );

        let outcome = h.pipeline.run_once().await.unwrap();

        assert_eq!(outcome, RunOutcome { reason: ReasonCode::Ok, appended: true });
        assert_eq!(h.store.rows(), vec![GOOD_LINE]);
        let events = h.sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, Level::Info);
        assert_eq!(events[0].ts.as_deref(), Some(TS));
        assert_eq!(events[0].context["gateway_ip"], "10.0.0.1");
        assert_eq!(events[0].context["iface"], "wlp2s0");
    }

    #[tokio::test]
    async fn test_precheck_failure_skips_measurement() {
        let h = harness(
            FakeCommandRunner::new()
                .on("ip link show", CommandOutput::ok("2: wlp2s0: <> state DOWN"))
                .on("speedtest", CommandOutput::ok(GOOD_LINE)),
            InMemoryStore::new(),
            RecordingSink::new(),
        );

        let outcome = h.pipeline.run_once().await.unwrap();

        assert_eq!(outcome.reason, ReasonCode::IfaceDown);
        assert!(!outcome.appended);
        assert!(!h.runner.was_called("speedtest"));
        assert!(h.store.rows().is_empty());
        let events = h.sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].phase, Phase::Precheck);
        assert_eq!(events[0].level, Level::Error);
        assert!(events[0].context.contains_key("ip_link"));
    }

    #[tokio::test]
    async fn test_measurement_failure_truncates_stderr() {
        let long_stderr = format!("timeout {}", "x".repeat(800));
        let h = harness(
            network_ok().on("speedtest", CommandOutput::failed(3, long_stderr)),
            InMemoryStore::new(),
            RecordingSink::new(),
        );

        let outcome = h.pipeline.run_once().await.unwrap();

        assert_eq!(outcome.reason, ReasonCode::SpeedtestTimeout);
        let event = &h.sink.events()[0];
        assert_eq!(event.phase, Phase::Speedtest);
        assert_eq!(event.context["exit_code"], 3);
        assert_eq!(
            event.context["stderr"].as_str().unwrap().chars().count(),
            MAX_EXCERPT_CHARS
        );
    }

    #[tokio::test]
    async fn test_empty_output_is_a_warning() {
        let h = harness(
            network_ok().on("speedtest", CommandOutput::ok("")),
            InMemoryStore::new(),
            RecordingSink::new(),
        );

        let outcome = h.pipeline.run_once().await.unwrap();

        assert_eq!(outcome.reason, ReasonCode::EmptyOutput);
        assert_eq!(h.sink.events()[0].level, Level::Warn);
        assert!(h.store.rows().is_empty());
    }

    #[tokio::test]
    async fn test_bad_format_not_appended() {
        let short = vec!["1"; CSV_FIELD_COUNT - 4].join(",");
        let h = harness(
            network_ok().on("speedtest", CommandOutput::ok(short.clone())),
            InMemoryStore::new(),
            RecordingSink::new(),
        );

        let outcome = h.pipeline.run_once().await.unwrap();

        assert_eq!(outcome.reason, ReasonCode::BadCsvFormat);
        assert!(h.store.rows().is_empty());
        let event = &h.sink.events()[0];
        assert_eq!(event.context["line_sample"], short.as_str());
        assert_eq!(event.context["field_count"], 18);
    }

    #[tokio::test]
    async fn test_repaired_header_adds_init_event() {
        let h = harness(
            network_ok().on("speedtest", CommandOutput::ok(GOOD_LINE)),
            InMemoryStore::with_header_outcome(HeaderOutcome::Repaired {
                preserved_rows: 4,
                dropped_headers: 1,
            }),
            RecordingSink::new(),
        );

        h.pipeline.run_once().await.unwrap();

        assert_eq!(
            h.sink.reasons(),
            vec![ReasonCode::CsvHeaderFixed, ReasonCode::Ok]
        );
        let init = &h.sink.events()[0];
        assert_eq!(init.phase, Phase::Init);
        assert_eq!(init.context["preserved_rows"], 4);
    }

    #[tokio::test]
    async fn test_unreadable_log_is_diagnosed_and_run_continues() {
        let h = harness(
            network_ok().on("speedtest", CommandOutput::ok(GOOD_LINE)),
            InMemoryStore::with_header_outcome(HeaderOutcome::Recreated {
                detail: "stream did not contain valid UTF-8".to_string(),
            }),
            RecordingSink::new(),
        );

        let outcome = h.pipeline.run_once().await.unwrap();

        assert!(outcome.appended);
        assert_eq!(h.sink.reasons(), vec![ReasonCode::CsvReadError, ReasonCode::Ok]);
        assert_eq!(h.sink.events()[0].level, Level::Error);
    }

    #[tokio::test]
    async fn test_append_failure_is_reported_not_raised() {
        let h = harness(
            network_ok().on("speedtest", CommandOutput::ok(GOOD_LINE)),
            InMemoryStore::new().failing_appends(),
            RecordingSink::new(),
        );

        let outcome = h.pipeline.run_once().await.unwrap();

        assert_eq!(outcome.reason, ReasonCode::CsvWriteError);
        assert!(!outcome.appended);
        assert_eq!(h.sink.reasons(), vec![ReasonCode::CsvWriteError]);
    }

    #[tokio::test]
    async fn test_sink_failure_is_fatal() {
        let h = harness(
            FakeCommandRunner::new(),
            InMemoryStore::new(),
            RecordingSink::broken(),
        );

        assert!(h.pipeline.run_once().await.is_err());
    }
}
