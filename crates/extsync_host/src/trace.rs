use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use extsync_core::contract::ExecutionRecord;

/// Destination of completed execution records.
pub trait TraceSink: Send + Sync {
    fn record(&self, record: ExecutionRecord);
}

#[derive(Debug, Default)]
pub struct MemoryTraceSink {
    records: Mutex<Vec<ExecutionRecord>>,
}

impl MemoryTraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("poisoned mutex").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<ExecutionRecord> {
        self.records.lock().expect("poisoned mutex").clone()
    }

    /// Takes every record collected so far, ordered by launch time.
    pub fn drain(&self) -> Vec<ExecutionRecord> {
        let mut records = std::mem::take(&mut *self.records.lock().expect("poisoned mutex"));
        records.sort_by_key(|record| (record.launched, record.completed));
        records
    }
}

impl TraceSink for MemoryTraceSink {
    fn record(&self, record: ExecutionRecord) {
        self.records.lock().expect("poisoned mutex").push(record);
    }
}

/// Writes one trial's records: a single JSON object when there is exactly one
/// record, newline-delimited JSON otherwise.
pub fn write_trace_file(
    path: &Path,
    records: &[ExecutionRecord],
) -> Result<(), Box<dyn std::error::Error>> {
    if records.is_empty() {
        return Err("No records to write".into());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(File::create(path)?);
    if let [record] = records {
        serde_json::to_writer_pretty(&mut writer, record)?;
        writeln!(writer)?;
    } else {
        for record in records {
            serde_json::to_writer(&mut writer, record)?;
            writeln!(writer)?;
        }
    }
    writer.flush()?;
    Ok(())
}
