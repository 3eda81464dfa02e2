//! Per-request log file

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Append-only log of every submission, shared by all worker threads
pub struct RequestLog {
    writer: Mutex<BufWriter<fs::File>>,
}

impl RequestLog {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = fs::File::create(path)
            .with_context(|| format!("Failed to create request log {}", path.display()))?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Record one submission; `elapsed` is `Some` for passed requests
    pub fn record(&self, request: &str, elapsed: Option<Duration>) {
        let entry = format_entry(request, elapsed);
        let mut writer = self.writer.lock();
        if let Err(e) = writer.write_all(entry.as_bytes()) {
            warn!(error = %e, "Failed to write request log");
        }
    }

    pub fn flush(&self) {
        if let Err(e) = self.writer.lock().flush() {
            warn!(error = %e, "Failed to flush request log");
        }
    }
}

impl Drop for RequestLog {
    fn drop(&mut self) {
        self.flush();
    }
}

fn format_entry(request: &str, elapsed: Option<Duration>) -> String {
    let request = request.trim();
    match elapsed {
        Some(elapsed) => format!(
            "======== Request: {}\n======== Status: Passed\n======== Processed time: {}seconds\n\n",
            request,
            elapsed.as_secs_f64()
        ),
        None => format!("======== Request: {}\n======== Status: Failed\n\n", request),
    }
}
