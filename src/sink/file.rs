use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use flate2::Compression as GzLevel;
use flate2::write::GzEncoder;
use log::debug;
use zip::CompressionMethod;
use zip::write::{SimpleFileOptions, ZipWriter};

use crate::error::{Error, Result};

/// Size of the staging side buffer, and the slack reserved on top of
/// the soft buffer limit.
const RESERVED: usize = 1024 * 1024;
/// Physical flushes trigger once this much headroom under the soft
/// limit is used up.
const FLUSH_SLACK: usize = 1024;

/// Compression container selected from the output path extension.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Compression {
    None,
    Gzip,
    Zip,
}

/// Tracks the byte offset reaching the underlying file, including
/// through a compressor that owns the writer.
struct CountingWriter {
    inner: File,
    offset: u64,
    written: Arc<AtomicU64>,
}

impl CountingWriter {
    fn new(inner: File, written: Arc<AtomicU64>) -> Self {
        Self {
            inner,
            offset: 0,
            written,
        }
    }
}

impl Write for CountingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.offset += n as u64;
        // Seeks rewind to patch headers; the high-water mark is what
        // actually reached the file.
        self.written.fetch_max(self.offset, Ordering::Relaxed);
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl Seek for CountingWriter {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let new = self.inner.seek(pos)?;
        self.offset = new;
        Ok(new)
    }
}

enum Container {
    Plain { file: File, buffer: Vec<u8> },
    Gzip(Box<GzEncoder<CountingWriter>>),
    Zip(Box<ZipWriter<CountingWriter>>),
}

/// Buffered writer over a file, optionally through a gzip or
/// single-entry zip container.
///
/// Bytes stage into a fixed side buffer; once it fills (or on
/// [`flush`](FileSink::flush)) they drain into the direct buffer or the
/// compressor. A physical flush happens when the accumulated bytes
/// reach the soft limit or when forced. On any I/O failure the sink
/// transitions to the closed state before re-throwing.
pub struct FileSink {
    path: PathBuf,
    entry_name: String,
    compression: Compression,
    soft_limit: usize,
    side: Vec<u8>,
    staged: usize,
    written: Arc<AtomicU64>,
    position: u64,
    container: Option<Container>,
}

impl FileSink {
    /// Opens a sink at `path`. A trailing `.gz` or `.zip` extension
    /// selects the container; `default_ext` names the inner zip entry
    /// (`base.default_ext`) and is stripped from the base when already
    /// present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when the file cannot be created.
    pub fn create(path: impl AsRef<Path>, soft_limit: usize, default_ext: &str) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (compression, entry_name) = analyze_path(&path, default_ext);
        debug!(
            "opening sink {} ({compression:?}, entry {entry_name})",
            path.display()
        );
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        let written = Arc::new(AtomicU64::new(0));
        let container = match compression {
            Compression::None => Container::Plain {
                file,
                buffer: Vec::with_capacity(soft_limit + RESERVED),
            },
            Compression::Gzip => Container::Gzip(Box::new(GzEncoder::new(
                CountingWriter::new(file, Arc::clone(&written)),
                GzLevel::default(),
            ))),
            Compression::Zip => {
                let mut writer = ZipWriter::new(CountingWriter::new(file, Arc::clone(&written)));
                writer
                    .start_file(
                        entry_name.clone(),
                        SimpleFileOptions::default().compression_method(CompressionMethod::Deflated),
                    )
                    .map_err(|e| Error::sink(format!("cannot start zip entry: {e}")))?;
                Container::Zip(Box::new(writer))
            }
        };
        Ok(Self {
            path,
            entry_name,
            compression,
            soft_limit,
            side: Vec::with_capacity(RESERVED),
            staged: 0,
            written,
            position: 0,
            container: Some(container),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Inner entry name (`base.default_ext`), also the logical output
    /// name for sidecar files.
    #[must_use]
    pub fn entry_name(&self) -> &str {
        &self.entry_name
    }

    #[must_use]
    pub const fn compression(&self) -> Compression {
        self.compression
    }

    /// Bytes written to the channel as of the last physical flush.
    #[must_use]
    pub const fn position(&self) -> u64 {
        self.position
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.container.is_none()
    }

    /// Stages bytes for writing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sink`] after the sink has been closed, or the
    /// underlying I/O error (sink then closed).
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if self.container.is_none() {
            return Err(Error::sink("write after close"));
        }
        if self.side.len() + bytes.len() >= RESERVED {
            self.drain_side()?;
            if bytes.len() >= RESERVED {
                return self.drain(bytes);
            }
        }
        self.side.extend_from_slice(bytes);
        Ok(())
    }

    /// Stages a string.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`write`](FileSink::write).
    pub fn write_str(&mut self, text: &str) -> Result<()> {
        self.write(text.as_bytes())
    }

    fn drain_side(&mut self) -> Result<()> {
        if self.side.is_empty() {
            return Ok(());
        }
        let side = std::mem::take(&mut self.side);
        let result = self.drain(&side);
        self.side = side;
        self.side.clear();
        result
    }

    fn drain(&mut self, bytes: &[u8]) -> Result<()> {
        let outcome = match self.container.as_mut() {
            None => return Err(Error::sink("write after close")),
            Some(Container::Plain { buffer, .. }) => {
                buffer.extend_from_slice(bytes);
                Ok(())
            }
            Some(Container::Gzip(enc)) => enc.write_all(bytes),
            Some(Container::Zip(writer)) => writer.write_all(bytes),
        };
        if let Err(e) = outcome {
            self.container = None;
            return Err(Error::sink(format!("write failed: {e}")));
        }
        self.staged += bytes.len();
        Ok(())
    }

    /// Drains the side buffer and performs a physical flush when the
    /// soft limit is reached or `force` is set. Returns whether a
    /// physical flush occurred.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sink`] on I/O failure; the sink is closed first.
    pub fn flush(&mut self, force: bool) -> Result<bool> {
        self.drain_side()?;
        if !force && self.staged < self.soft_limit.saturating_sub(FLUSH_SLACK) {
            return Ok(false);
        }
        let outcome = match self.container.as_mut() {
            None => return Err(Error::sink("flush after close")),
            Some(Container::Plain { file, buffer }) => {
                let r = file.write_all(buffer);
                if r.is_ok() {
                    self.position += buffer.len() as u64;
                    buffer.clear();
                }
                r
            }
            Some(Container::Gzip(enc)) => {
                // Sync-flush so readers see a consistent stream.
                let r = enc.flush();
                if r.is_ok() {
                    self.position = self.written.load(Ordering::Relaxed);
                }
                r
            }
            Some(Container::Zip(writer)) => {
                let r = writer.flush();
                if r.is_ok() {
                    self.position = self.written.load(Ordering::Relaxed);
                }
                r
            }
        };
        if let Err(e) = outcome {
            self.container = None;
            return Err(Error::sink(format!("flush failed: {e}")));
        }
        self.staged = 0;
        Ok(true)
    }

    /// Flushes remaining bytes, finalises the container, and closes the
    /// file. Idempotent: later calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sink`] when finalisation fails.
    pub fn close(&mut self) -> Result<()> {
        if self.container.is_none() {
            return Ok(());
        }
        self.flush(true)?;
        let container = self.container.take();
        match container {
            None => Ok(()),
            Some(Container::Plain { file, buffer }) => {
                drop(buffer);
                file.sync_all()
                    .map_err(|e| Error::sink(format!("close failed: {e}")))
            }
            Some(Container::Gzip(enc)) => {
                let counting = enc
                    .finish()
                    .map_err(|e| Error::sink(format!("gzip finish failed: {e}")))?;
                self.position = self.written.load(Ordering::Relaxed).max(counting.offset);
                counting
                    .inner
                    .sync_all()
                    .map_err(|e| Error::sink(format!("close failed: {e}")))
            }
            Some(Container::Zip(mut writer)) => {
                let counting = writer
                    .finish()
                    .map_err(|e| Error::sink(format!("zip finish failed: {e}")))?;
                self.position = self.written.load(Ordering::Relaxed);
                counting
                    .inner
                    .sync_all()
                    .map_err(|e| Error::sink(format!("close failed: {e}")))
            }
        }
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl Write for FileSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        Self::write(self, buf).map_err(std::io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Self::flush(self, false)
            .map(|_| ())
            .map_err(std::io::Error::other)
    }
}

/// Splits the output path into compression mode and inner entry name.
fn analyze_path(path: &Path, default_ext: &str) -> (Compression, String) {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let lower = file_name.to_ascii_lowercase();
    let (compression, stem) = if let Some(stem) = lower.strip_suffix(".gz") {
        (Compression::Gzip, &file_name[..stem.len()])
    } else if let Some(stem) = lower.strip_suffix(".zip") {
        (Compression::Zip, &file_name[..stem.len()])
    } else {
        (Compression::None, file_name.as_str())
    };
    let base = stem
        .strip_suffix(&format!(".{default_ext}"))
        .unwrap_or(stem);
    (compression, format!("{base}.{default_ext}"))
}
