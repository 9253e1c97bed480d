use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use tracing_subscriber::fmt::MakeWriter;

// ── DeferredFileWriter ───────────────────────────────────

/// A `MakeWriter` that initially discards writes, then logs to a file
/// once activated via `handle.set_file(path)`.
///
/// This lets the tracing subscriber be installed at program start
/// (before the config file, and therefore the log path, is known) and
/// activated once `load_config` has run.
#[derive(Clone)]
pub struct DeferredFileWriter {
    inner: Arc<Mutex<Option<File>>>,
}

/// Handle returned by `DeferredFileWriter::new()` — call `set_file` to activate.
#[derive(Clone)]
pub struct DeferredFileHandle {
    inner: Arc<Mutex<Option<File>>>,
}

impl DeferredFileWriter {
    pub fn new() -> (Self, DeferredFileHandle) {
        let inner = Arc::new(Mutex::new(None));
        (
            Self {
                inner: inner.clone(),
            },
            DeferredFileHandle { inner },
        )
    }
}

impl DeferredFileHandle {
    /// Activate the file writer — opens `path` in append mode.
    pub fn set_file(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        *self.inner.lock().unwrap() = Some(file);
        Ok(())
    }
}

/// Writer returned by `MakeWriter::make_writer` — either writes to the
/// file or discards (when not yet activated).
pub struct DeferredWriter {
    inner: Arc<Mutex<Option<File>>>,
}

impl std::io::Write for DeferredWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self.inner.lock().unwrap();
        if let Some(ref mut f) = *guard {
            f.write(buf)
        } else {
            Ok(buf.len()) // discard
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut guard = self.inner.lock().unwrap();
        if let Some(ref mut f) = *guard {
            f.flush()
        } else {
            Ok(())
        }
    }
}

impl<'a> MakeWriter<'a> for DeferredFileWriter {
    type Writer = DeferredWriter;

    fn make_writer(&'a self) -> Self::Writer {
        DeferredWriter {
            inner: self.inner.clone(),
        }
    }
}

// ── Transcript logger ─────────────────────────────────────

/// Logs one connection's raw packet traffic to a file, for debugging a
/// misbehaving device without attaching a protocol analyzer.
///
/// Creates `<timestamp>_conn<id>.log` on construction; every logged
/// line is one decoded packet's debug representation.
pub struct TranscriptLogger {
    file: File,
}

impl TranscriptLogger {
    pub fn new(logs_dir: &Path, connection_id: u64) -> std::io::Result<Self> {
        fs::create_dir_all(logs_dir)?;
        let ts = utc_timestamp();
        let path = logs_dir.join(format!("{ts}_conn{connection_id}.log"));
        let file = File::create(path)?;
        Ok(Self { file })
    }

    pub fn log_packet(&mut self, direction: &str, packet: &crate::packet::Packet) {
        let _ = writeln!(
            self.file,
            "{direction} cmd={} chan={} len={}",
            packet.cmd,
            packet.chan,
            packet.data.len()
        );
    }
}

/// Delete oldest transcript files for a connection id pattern, keeping
/// at most `keep`.
pub fn rotate_transcripts(logs_dir: &Path, keep: usize) {
    let Ok(entries) = fs::read_dir(logs_dir) else {
        return;
    };

    let mut matching: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|f| f.to_str())
                .is_some_and(|f| f.ends_with(".log"))
        })
        .collect();

    matching.sort();

    if matching.len() > keep {
        for old in &matching[..matching.len() - keep] {
            let _ = fs::remove_file(old);
        }
    }
}

// ── Timestamp helper ─────────────────────────────────────

/// Format the current UTC time as `YYYY-MM-DDTHH-MM-SS` without any
/// external datetime dependency.
pub fn utc_timestamp() -> String {
    let dur = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = dur.as_secs();

    // Civil date from unix timestamp
    let days = (secs / 86400) as i64;
    let time_of_day = secs % 86400;
    let hours = time_of_day / 3600;
    let minutes = (time_of_day % 3600) / 60;
    let seconds = time_of_day % 60;

    // Algorithm from Howard Hinnant's civil_from_days
    let z = days + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };

    format!("{y:04}-{m:02}-{d:02}T{hours:02}-{minutes:02}-{seconds:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotate_transcripts_keeps_only_newest() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.log", "b.log", "c.log"] {
            File::create(dir.path().join(name)).unwrap();
        }
        rotate_transcripts(dir.path(), 1);
        let remaining: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(remaining.len(), 1);
    }
}
