//! File layer writer for the diagnostic log.
//!
//! The terminal layer writes to stderr directly; this module covers the
//! optional append-only file configured under `[logging]`. The layer
//! should be built with `.with_ansi(false)`.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

/// [`MakeWriter`](tracing_subscriber::fmt::MakeWriter) appending to a
/// shared log file.
#[derive(Clone)]
pub struct FileMakeWriter {
    file: Arc<Mutex<File>>,
}

impl FileMakeWriter {
    /// Opens `path` for appending, creating it and its directory.
    ///
    /// # Errors
    ///
    /// Any I/O error from creating the directory or opening the file.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FileMakeWriter {
    type Writer = FileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        FileWriter {
            file: Arc::clone(&self.file),
            buf: Vec::with_capacity(256),
        }
    }
}

/// Per-event writer.
///
/// Collects one formatted event and appends it on [`Drop`], so lines
/// from concurrent events never interleave.
pub struct FileWriter {
    file: Arc<Mutex<File>>,
    buf: Vec<u8>,
}

impl Write for FileWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for FileWriter {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let mut file = self.file.lock();
        let _ = file.write_all(&self.buf);
        let _ = file.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::fmt::MakeWriter;

    #[test]
    fn appends_whole_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("elevate.log");
        let make = FileMakeWriter::open(&path).unwrap();

        {
            let mut w = make.make_writer();
            w.write_all(b"first ").unwrap();
            w.write_all(b"event\n").unwrap();
            assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
        }
        make.make_writer().write_all(b"second event\n").unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "first event\nsecond event\n"
        );
    }
}
