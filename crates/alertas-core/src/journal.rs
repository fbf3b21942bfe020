use crate::reconcile::CycleSummary;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// One journal line per reconciliation cycle, successful or not.
#[derive(Debug, Clone, Serialize)]
pub struct CycleRecord {
    pub ts: DateTime<Utc>,
    pub ok: bool,
    pub error: Option<String>,
    pub fetched: usize,
    pub active: usize,
    pub recovered: usize,
    pub carried: usize,
    pub closed: usize,
    pub lookup_failures: usize,
}

impl CycleRecord {
    pub fn success(ts: DateTime<Utc>, summary: &CycleSummary) -> Self {
        Self {
            ts,
            ok: true,
            error: None,
            fetched: summary.fetched,
            active: summary.active,
            recovered: summary.recovered,
            carried: summary.carried,
            closed: summary.closed,
            lookup_failures: summary.lookup_failures,
        }
    }

    pub fn failure(ts: DateTime<Utc>, error: &str) -> Self {
        Self {
            ts,
            ok: false,
            error: Some(error.to_string()),
            fetched: 0,
            active: 0,
            recovered: 0,
            carried: 0,
            closed: 0,
            lookup_failures: 0,
        }
    }
}

/// Append-only NDJSON log of cycle outcomes, flushed per line so a crash
/// loses at most the cycle in flight.
pub struct CycleJournal {
    writer: Option<BufWriter<File>>,
    path: PathBuf,
}

impl CycleJournal {
    pub fn new(path: PathBuf) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = File::create(&path)?;
        let writer = BufWriter::new(file);

        Ok(Self {
            writer: Some(writer),
            path,
        })
    }

    pub fn record(&mut self, record: &CycleRecord) -> anyhow::Result<()> {
        if let Some(writer) = &mut self.writer {
            let json = serde_json::to_string(record)?;
            writeln!(writer, "{}", json)?;
            writer.flush()?;
        }

        Ok(())
    }

    pub fn close(&mut self) -> anyhow::Result<()> {
        if let Some(writer) = &mut self.writer {
            writer.flush()?;
        }
        self.writer = None;
        Ok(())
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl Drop for CycleJournal {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
