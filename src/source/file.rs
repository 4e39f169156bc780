//! CSV replay feed.
//!
//! Reads a comma-delimited file of probe readings, one row per sample:
//!
//! ```text
//! Time (UTC),Channel1,Channel2,Channel3
//! 03/07/23 14:06:00,35.5,,
//! ```
//!
//! and sends one `[<timestamp>, <value>]` message per configured channel per
//! row, waiting one cadence between rows.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::SourceError;
use crate::reading::format_message;
use crate::watch::stop_requested;

/// Default delay between replayed rows.
pub const DEFAULT_CADENCE: Duration = Duration::from_secs(30);

/// Column names of a replay file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvHeader {
    columns: Vec<String>,
}

impl CsvHeader {
    /// Parse a header line.
    pub fn parse(line: &str) -> Self {
        let line = line.trim_start_matches('\u{feff}');
        Self {
            columns: split_row(line).into_iter().map(str::to_string).collect(),
        }
    }

    /// Position of `column`.
    pub fn index_of(&self, column: &str) -> Result<usize, SourceError> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| SourceError::MissingColumn(column.to_string()))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

fn split_row(line: &str) -> Vec<&str> {
    line.split(',').map(str::trim).collect()
}

/// Where the values of one CSV column are sent.
#[derive(Debug, Clone)]
pub struct ReplayTarget {
    pub column: String,
    pub sender: mpsc::Sender<String>,
}

impl ReplayTarget {
    pub fn new(column: impl Into<String>, sender: mpsc::Sender<String>) -> Self {
        Self {
            column: column.into(),
            sender,
        }
    }
}

/// Outcome of a replay run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Rows sent to every target.
    pub rows: u64,
    /// Rows dropped because they could not be framed.
    pub skipped: u64,
}

/// Replays a CSV file as per-channel reading messages.
#[derive(Debug, Clone)]
pub struct CsvReplay {
    path: PathBuf,
    timestamp_column: Option<String>,
    cadence: Duration,
}

impl CsvReplay {
    /// Create a replay for the given path.
    ///
    /// The timestamp is taken from the first column unless
    /// [`timestamp_column`](Self::timestamp_column) names another one.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            timestamp_column: None,
            cadence: DEFAULT_CADENCE,
        }
    }

    pub fn timestamp_column(mut self, column: impl Into<String>) -> Self {
        self.timestamp_column = Some(column.into());
        self
    }

    /// Set the delay between rows (default: 30 seconds).
    pub fn cadence(mut self, cadence: Duration) -> Self {
        self.cadence = cadence;
        self
    }

    /// Returns the path being replayed.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the file and replay it into `targets`.
    ///
    /// Stops early when `stop` is raised or every consumer has gone away.
    pub async fn run(
        self,
        targets: Vec<ReplayTarget>,
        stop: watch::Receiver<bool>,
    ) -> Result<ReplayStats, SourceError> {
        let file = tokio::fs::File::open(&self.path).await?;
        info!("Replaying {}", self.path.display());
        self.replay(BufReader::new(file), &targets, stop).await
    }

    /// Replay from any buffered reader.
    pub async fn replay<R>(
        &self,
        reader: R,
        targets: &[ReplayTarget],
        mut stop: watch::Receiver<bool>,
    ) -> Result<ReplayStats, SourceError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();

        let header = loop {
            match lines.next_line().await? {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => break CsvHeader::parse(&line),
                None => return Err(SourceError::EmptyInput),
            }
        };

        let timestamp_index = match &self.timestamp_column {
            Some(column) => header.index_of(column)?,
            None => 0,
        };
        let columns = targets
            .iter()
            .map(|target| header.index_of(&target.column))
            .collect::<Result<Vec<_>, _>>()?;

        let mut stats = ReplayStats::default();
        let mut first_row = true;

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let fields = split_row(&line);
            if fields.len() != header.len() {
                warn!(
                    "Skipping row with {} fields (expected {}): {}",
                    fields.len(),
                    header.len(),
                    line
                );
                stats.skipped += 1;
                continue;
            }

            let timestamp = fields[timestamp_index];
            let messages = match columns
                .iter()
                .map(|&index| format_message(timestamp, fields[index]))
                .collect::<Result<Vec<_>, _>>()
            {
                Ok(messages) => messages,
                Err(e) => {
                    warn!("Skipping row: {}", e);
                    stats.skipped += 1;
                    continue;
                }
            };

            if !first_row && !self.cadence.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.cadence) => {}
                    _ = stop_requested(&mut stop) => {
                        info!("Replay stopped after {} rows", stats.rows);
                        return Ok(stats);
                    }
                }
            }
            first_row = false;

            if *stop.borrow() {
                info!("Replay stopped after {} rows", stats.rows);
                return Ok(stats);
            }

            for (target, message) in targets.iter().zip(messages) {
                if target.sender.send(message).await.is_err() {
                    info!("Consumer for '{}' has gone away, stopping replay", target.column);
                    return Ok(stats);
                }
            }
            stats.rows += 1;
            debug!("Sent temps for time {}", timestamp);
        }

        info!(
            "Replay finished: {} rows sent, {} skipped",
            stats.rows, stats.skipped
        );
        Ok(stats)
    }
}
