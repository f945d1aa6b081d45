//! Published-score persistence
//!
//! The document store lives outside this crate; hosts implement [`RiskSink`]
//! for their store. Writes are fire-and-forget from the engine's point of
//! view: a failing sink is logged and never touches smoother state.

use std::io::Write;

use crate::error::{ScoringError, ScoringResult};
use crate::types::RiskRecord;

/// Destination for published risk records
pub trait RiskSink {
    fn persist(&mut self, record: &RiskRecord) -> ScoringResult<()>;
}

/// Writes one JSON record per line
pub struct NdjsonSink<W: Write> {
    writer: W,
    flush: bool,
}

impl<W: Write> NdjsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            flush: false,
        }
    }

    /// Flush the writer after every record
    pub fn flushing(mut self) -> Self {
        self.flush = true;
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> RiskSink for NdjsonSink<W> {
    fn persist(&mut self, record: &RiskRecord) -> ScoringResult<()> {
        let line = serde_json::to_string(record)?;
        writeln!(self.writer, "{}", line)
            .map_err(|e| ScoringError::persistence(e.to_string()))?;
        if self.flush {
            self.writer
                .flush()
                .map_err(|e| ScoringError::persistence(e.to_string()))?;
        }
        Ok(())
    }
}

/// Collects records in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<RiskRecord>,
}

impl RiskSink for MemorySink {
    fn persist(&mut self, record: &RiskRecord) -> ScoringResult<()> {
        self.records.push(record.clone());
        Ok(())
    }
}
