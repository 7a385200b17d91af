// CSV implementation of MeasurementStore (the durable log)

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use speedtest_telemetry_core::domain::record::is_header_like;
use speedtest_telemetry_core::domain::{MeasurementRecord, CSV_HEADER};
use speedtest_telemetry_core::error::{AppError, Result};
use speedtest_telemetry_core::port::{HeaderOutcome, MeasurementStore};

/// Append-only CSV log
pub struct CsvMeasurementStore {
    path: PathBuf,
}

/// Rebuilt file body after a header repair
#[derive(Debug, PartialEq, Eq)]
pub struct RepairedContents {
    pub body: String,
    pub preserved_rows: usize,
    pub dropped_headers: usize,
}

/// Canonical header followed by every non-blank, non-header line in order
pub fn repair_contents(contents: &str) -> RepairedContents {
    let mut body = String::with_capacity(contents.len() + CSV_HEADER.len() + 1);
    body.push_str(CSV_HEADER);
    body.push('\n');

    let mut preserved_rows = 0;
    let mut dropped_headers = 0;
    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if is_header_like(line) {
            dropped_headers += 1;
            continue;
        }
        body.push_str(line);
        body.push('\n');
        preserved_rows += 1;
    }

    RepairedContents {
        body,
        preserved_rows,
        dropped_headers,
    }
}

impl CsvMeasurementStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn storage_error(&self, e: std::io::Error) -> AppError {
        AppError::Storage {
            path: self.path.display().to_string(),
            message: e.to_string(),
        }
    }

    async fn create_parent_dirs(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| self.storage_error(e))?;
        }
        Ok(())
    }

    async fn write_header_only(&self) -> Result<()> {
        fs::write(&self.path, format!("{}\n", CSV_HEADER))
            .await
            .map_err(|e| self.storage_error(e))
    }

    async fn terminate_last_line(&self) -> Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.storage_error(e))?;
        file.write_all(b"\n")
            .await
            .map_err(|e| self.storage_error(e))?;
        file.flush().await.map_err(|e| self.storage_error(e))
    }

    /// Replace the file through a sibling temp file so a crash mid-write
    /// never leaves a truncated log behind
    async fn replace_contents(&self, body: &str) -> Result<()> {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "speedtest.csv".to_string());
        let tmp_path = self.path.with_file_name(format!(".{}.tmp", file_name));

        fs::write(&tmp_path, body)
            .await
            .map_err(|e| self.storage_error(e))?;
        fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| self.storage_error(e))
    }
}

#[async_trait]
impl MeasurementStore for CsvMeasurementStore {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    async fn ensure_header(&self) -> Result<HeaderOutcome> {
        self.create_parent_dirs().await?;

        if !fs::try_exists(&self.path).await.unwrap_or(true) {
            self.write_header_only().await?;
            info!(csv_path = %self.path.display(), "Created measurement log");
            return Ok(HeaderOutcome::Created);
        }

        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) => {
                warn!(
                    csv_path = %self.path.display(),
                    error = %e,
                    "Measurement log unreadable, recreating with header only"
                );
                self.write_header_only().await?;
                return Ok(HeaderOutcome::Recreated {
                    detail: e.to_string(),
                });
            }
        };

        if contents.lines().next() == Some(CSV_HEADER) {
            // A missing final newline would glue the next row onto the last line
            if !contents.ends_with('\n') {
                self.terminate_last_line().await?;
                info!(csv_path = %self.path.display(), "Terminated unfinished last line");
            }
            debug!(csv_path = %self.path.display(), "Measurement log header ok");
            return Ok(HeaderOutcome::AlreadyValid);
        }

        let repaired = repair_contents(&contents);
        self.replace_contents(&repaired.body).await?;

        info!(
            csv_path = %self.path.display(),
            preserved_rows = repaired.preserved_rows,
            dropped_headers = repaired.dropped_headers,
            "Measurement log header repaired"
        );

        Ok(HeaderOutcome::Repaired {
            preserved_rows: repaired.preserved_rows,
            dropped_headers: repaired.dropped_headers,
        })
    }

    async fn append(&self, record: &MeasurementRecord) -> Result<()> {
        self.create_parent_dirs().await?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.storage_error(e))?;

        // One write per row: header and row bytes never interleave within a run
        let line = format!("{}\n", record.as_line().trim_end_matches(&['\r', '\n'][..]));
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| self.storage_error(e))?;
        file.flush().await.map_err(|e| self.storage_error(e))?;

        debug!(csv_path = %self.path.display(), "Measurement row appended");
        Ok(())
    }
}
