use std::io::{Result as IoResult, Write};
use std::sync::{Arc, Mutex};

/// Destination for progress and summary lines.
///
/// Defaults to stdout; callers may supply any `Write + Send` sink
/// instead. Writes go out line-by-line and are flushed immediately so
/// progress is visible while a load runs. A failing sink surfaces the
/// I/O error to the caller; it is treated as misconfiguration, not as a
/// pipeline failure.
#[derive(Clone)]
pub struct Logger {
    sink: Option<Arc<Mutex<Box<dyn Write + Send>>>>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::stdout()
    }
}

impl Logger {
    /// Logger writing to standard output.
    #[must_use]
    pub const fn stdout() -> Self {
        Self { sink: None }
    }

    /// Logger writing to the supplied sink.
    pub fn to_sink<W: Write + Send + 'static>(sink: W) -> Self {
        Self {
            sink: Some(Arc::new(Mutex::new(Box::new(sink)))),
        }
    }

    /// Writes one line followed by a newline and flushes.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the sink rejects the write.
    pub fn line(&self, message: &str) -> IoResult<()> {
        match &self.sink {
            None => {
                let mut out = std::io::stdout().lock();
                writeln!(out, "{message}")?;
                out.flush()
            }
            Some(sink) => {
                let mut guard = sink.lock().map_err(|_| {
                    std::io::Error::other("logger sink poisoned by an earlier panic")
                })?;
                writeln!(guard, "{message}")?;
                guard.flush()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> IoResult<()> {
            Ok(())
        }
    }

    #[test]
    fn sink_receives_lines() {
        let shared = Shared::default();
        let logger = Logger::to_sink(shared.clone());
        logger.line("first").unwrap();
        logger.line("second").unwrap();
        let captured = shared.0.lock().unwrap();
        assert_eq!(String::from_utf8_lossy(&captured), "first\nsecond\n");
    }
}
