//! Raw response capture for offline replay

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

/// Appends every raw backend line to a file
///
/// The file is truncated when the sink is created. Clones share the same
/// file; writes from concurrent streams are serialized per line.
#[derive(Debug, Clone)]
pub struct CaptureSink {
    path: Arc<PathBuf>,
    file: Arc<Mutex<BufWriter<File>>>,
}

impl CaptureSink {
    /// Create or truncate the capture file
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;

        tracing::info!(path = %path.display(), "Capturing backend responses");

        Ok(Self {
            path: Arc::new(path),
            file: Arc::new(Mutex::new(BufWriter::new(file))),
        })
    }

    /// Capture file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one raw line; buffered until [`CaptureSink::flush`]
    pub fn record(&self, raw: &str) {
        let mut file = self.file.lock();
        let result = file
            .write_all(raw.as_bytes())
            .and_then(|_| file.write_all(b"\n"));

        if let Err(e) = result {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to write capture");
        }
    }

    /// Write buffered lines through to the file
    pub fn flush(&self) {
        if let Err(e) = self.file.lock().flush() {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to flush capture");
        }
    }

    /// Get a guard that flushes the sink when dropped
    pub fn flush_on_drop(&self) -> FlushGuard {
        FlushGuard(self.clone())
    }
}

/// Flushes a [`CaptureSink`] when one backend response ends
#[derive(Debug)]
pub struct FlushGuard(CaptureSink);

impl Drop for FlushGuard {
    fn drop(&mut self) {
        self.0.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_appends_lines() {
        let path = std::env::temp_dir().join(format!("alertcast-capture-{}.txt", std::process::id()));

        let sink = CaptureSink::create(&path).unwrap();
        let guard = sink.flush_on_drop();
        sink.record("data: {\"content\":\"A\"}");
        sink.clone().record("data: [DONE]");

        // Lines stay buffered until the response ends
        assert_eq!(std::fs::read_to_string(sink.path()).unwrap(), "");
        drop(guard);

        let written = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(written, "data: {\"content\":\"A\"}\ndata: [DONE]\n");

        // Re-creating truncates
        let sink = CaptureSink::create(&path).unwrap();
        assert_eq!(std::fs::read_to_string(sink.path()).unwrap(), "");

        std::fs::remove_file(&path).ok();
    }
}
