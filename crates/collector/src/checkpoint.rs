//! Periodic checkpoints of harvested records.
//!
//! Each flush appends one NDJSON line to the collector's checkpoint file:
//! a timestamped envelope with running totals, loop counters, and the batch
//! of records emitted since the previous flush. A crash loses at most one
//! unflushed batch.

use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use {
    chrono::{DateTime, Utc},
    serde::Serialize,
    tracing::debug,
};

use gleaner_common::{ParsingStats, Record};

/// One appended checkpoint line.
#[derive(Debug, Serialize)]
struct CheckpointBatch<'a> {
    timestamp: DateTime<Utc>,
    total_records: u64,
    parsing_stats: ParsingStats,
    latest_batch: &'a [Record],
}

/// Appends record batches to a per-collector checkpoint file.
pub struct CheckpointWriter {
    path: PathBuf,
    interval: usize,
    pending: Vec<Record>,
    total_written: u64,
}

impl CheckpointWriter {
    /// Create a writer for `session_id`, flushing every `interval` records.
    ///
    /// The checkpoint directory is created if missing.
    pub fn create(
        dir: &Path,
        session_id: &str,
        interval: usize,
    ) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join(format!("{session_id}.ndjson")),
            interval: interval.max(1),
            pending: Vec::new(),
            total_written: 0,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Buffer a record; flush when the interval is reached.
    pub fn push(&mut self, record: Record, stats: &ParsingStats) -> std::io::Result<()> {
        self.pending.push(record);
        if self.pending.len() >= self.interval {
            self.flush(stats)?;
        }
        Ok(())
    }

    /// Write any buffered records as one batch line.
    pub fn flush(&mut self, stats: &ParsingStats) -> std::io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.total_written += self.pending.len() as u64;

        let batch = CheckpointBatch {
            timestamp: Utc::now(),
            total_records: self.total_written,
            parsing_stats: *stats,
            latest_batch: &self.pending,
        };
        let line = serde_json::to_string(&batch)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;

        debug!(
            path = %self.path.display(),
            batch = self.pending.len(),
            total = self.total_written,
            "checkpoint flushed"
        );
        self.pending.clear();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, gleaner_common::Target, std::collections::BTreeMap};

    fn record(id: &str) -> Record {
        Record {
            stable_id: Some(id.into()),
            content_hash: format!("hash-{id}"),
            fields: BTreeMap::new(),
            collected_at: Utc::now(),
            source_target: Target::user("alice"),
        }
    }

    #[test]
    fn test_flushes_at_interval() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CheckpointWriter::create(dir.path(), "s1", 2).unwrap();
        let stats = ParsingStats::default();

        writer.push(record("1"), &stats).unwrap();
        assert!(!writer.path().exists());
        writer.push(record("2"), &stats).unwrap();
        assert!(writer.path().exists());
        assert_eq!(writer.total_written(), 2);

        let raw = std::fs::read_to_string(writer.path()).unwrap();
        assert_eq!(raw.lines().count(), 1);
        let line: serde_json::Value = serde_json::from_str(raw.lines().next().unwrap()).unwrap();
        assert_eq!(line["total_records"], 2);
        assert_eq!(line["latest_batch"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_final_flush_writes_partial_batch() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CheckpointWriter::create(dir.path(), "s1", 10).unwrap();
        let stats = ParsingStats::default();

        writer.push(record("1"), &stats).unwrap();
        writer.flush(&stats).unwrap();
        assert_eq!(writer.total_written(), 1);

        // Nothing pending: flush is a no-op, not an empty line.
        writer.flush(&stats).unwrap();
        let raw = std::fs::read_to_string(writer.path()).unwrap();
        assert_eq!(raw.lines().count(), 1);
    }

    #[test]
    fn test_batches_accumulate_totals() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CheckpointWriter::create(dir.path(), "s1", 1).unwrap();
        let stats = ParsingStats::default();

        writer.push(record("1"), &stats).unwrap();
        writer.push(record("2"), &stats).unwrap();

        let raw = std::fs::read_to_string(writer.path()).unwrap();
        let totals: Vec<u64> = raw
            .lines()
            .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["total_records"]
                .as_u64()
                .unwrap())
            .collect();
        assert_eq!(totals, vec![1, 2]);
    }
}
