use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam::channel::{Receiver, Sender, bounded};
use log::debug;

use crate::codec::Encoder;
use crate::codec::encode::encode_row;
use crate::error::{Error, Result};
use crate::value::{EncodedCell, Value};

use super::RowSource;

/// Caller-owned cancellation token checked by the producer before each
/// cursor advance.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Tuning knobs for prefetch mode.
#[derive(Debug, Clone, Copy)]
pub struct PrefetchOptions {
    /// Preferred cursor fetch batch size; also sizes the queue.
    pub fetch_hint: usize,
    /// Overall row cap; `0` means unlimited.
    pub fetch_limit: u64,
}

impl Default for PrefetchOptions {
    fn default() -> Self {
        Self {
            fetch_hint: 1000,
            fetch_limit: 0,
        }
    }
}

impl PrefetchOptions {
    /// Bounded queue capacity:
    /// `min(fetch_limit * 2 + 10, 2 * fetch_hint + 10)`.
    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        let by_hint = self.fetch_hint.saturating_mul(2).saturating_add(10);
        if self.fetch_limit == 0 {
            return by_hint;
        }
        let by_limit = self.fetch_limit.saturating_mul(2).saturating_add(10);
        usize::try_from(by_limit.min(by_hint as u64)).unwrap_or(by_hint)
    }
}

enum Message {
    Row(Vec<Value>),
    Eof,
}

/// Streams the source through a bounded queue: one background producer
/// fetches raw rows, the calling thread encodes them and hands each
/// encoded row to `callback`, in cursor order.
///
/// The producer checks `token` before every advance; on cancellation it
/// closes the cursor and latches [`Error::Aborted`]. Any producer error
/// is latched, an EOF sentinel is queued, and the error is re-thrown
/// here once the queue has drained. Returns the number of rows
/// delivered to the callback.
///
/// # Errors
///
/// Returns the first producer, encoding, or callback error.
pub fn run_prefetch<F>(
    mut source: RowSource,
    encoder: &Encoder,
    token: &CancelToken,
    options: &PrefetchOptions,
    mut callback: F,
) -> Result<u64>
where
    F: FnMut(&[EncodedCell]) -> Result<()>,
{
    let columns = source.columns_shared();
    let capacity = options.queue_capacity();
    let fetch_limit = options.fetch_limit;
    let (tx, rx): (Sender<Message>, Receiver<Message>) = bounded(capacity);
    let producer_token = token.clone();
    debug!("prefetch queue capacity {capacity}");

    let handle = thread::spawn(move || -> (RowSource, Option<Error>) {
        let mut latched = None;
        let mut produced: u64 = 0;
        loop {
            if producer_token.is_cancelled() {
                source.close();
                latched = Some(Error::Aborted);
                break;
            }
            if fetch_limit > 0 && produced >= fetch_limit {
                source.close();
                break;
            }
            match source.next_raw() {
                Ok(Some(row)) => {
                    produced += 1;
                    if tx.send(Message::Row(row)).is_err() {
                        // Consumer hung up; nothing left to report to.
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    source.close();
                    latched = Some(e);
                    break;
                }
            }
        }
        let _ = tx.send(Message::Eof);
        (source, latched)
    });

    let mut delivered: u64 = 0;
    let mut consumer_error: Option<Error> = None;
    for message in &rx {
        match message {
            Message::Eof => break,
            Message::Row(row) => {
                if consumer_error.is_some() {
                    // Keep draining so the producer can reach the
                    // sentinel and exit.
                    continue;
                }
                let outcome = encode_row(encoder, &row, &columns)
                    .and_then(|encoded| callback(&encoded));
                match outcome {
                    Ok(()) => delivered += 1,
                    Err(e) => {
                        consumer_error = Some(e);
                        token.cancel();
                    }
                }
            }
        }
    }
    drop(rx);

    let (mut source, latched) = handle
        .join()
        .map_err(|_| Error::source("prefetch producer panicked"))?;
    source.close();

    if let Some(e) = consumer_error {
        return Err(e);
    }
    if let Some(e) = latched {
        return Err(e);
    }
    Ok(delivered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecConfig;
    use crate::db::ColumnMeta;
    use crate::db::memory::MemoryCursor;
    use crate::schema::type_code;

    fn int_cursor(rows: usize) -> MemoryCursor {
        MemoryCursor::new(
            vec![ColumnMeta {
                name: "N".into(),
                vendor_type: type_code::INTEGER,
                size: 0,
            }],
            (0..rows).map(|i| vec![Value::Int(i as i32)]).collect(),
        )
    }

    fn encoder() -> Encoder {
        Encoder::new(&CodecConfig::default()).unwrap()
    }

    #[test]
    fn preserves_cursor_order() {
        let source = RowSource::open(Box::new(int_cursor(5000)), 64).unwrap();
        let encoder = encoder();
        let mut seen = Vec::new();
        let delivered = run_prefetch(
            source,
            &encoder,
            &CancelToken::new(),
            &PrefetchOptions::default(),
            |row| {
                seen.push(row[0].as_text().into_owned());
                Ok(())
            },
        )
        .unwrap();
        assert_eq!(delivered, 5000);
        let expected: Vec<String> = (0..5000).map(|i| i.to_string()).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn fetch_limit_caps_rows() {
        let source = RowSource::open(Box::new(int_cursor(100)), 64).unwrap();
        let encoder = encoder();
        let mut count = 0u64;
        let delivered = run_prefetch(
            source,
            &encoder,
            &CancelToken::new(),
            &PrefetchOptions {
                fetch_hint: 16,
                fetch_limit: 7,
            },
            |_| {
                count += 1;
                Ok(())
            },
        )
        .unwrap();
        assert_eq!(delivered, 7);
        assert_eq!(count, 7);
    }

    #[test]
    fn abort_surfaces_within_queue_window() {
        let options = PrefetchOptions {
            fetch_hint: 8,
            fetch_limit: 0,
        };
        let capacity = options.queue_capacity() as u64;
        let token = CancelToken::new();
        let source = RowSource::open(Box::new(int_cursor(10_000)), 8).unwrap();
        let encoder = encoder();
        let mut written = 0u64;
        let trigger = token.clone();
        let err = run_prefetch(source, &encoder, &token, &options, |_| {
            written += 1;
            if written == 500 {
                trigger.cancel();
            }
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, Error::Aborted), "unexpected error: {err}");
        assert!(written >= 500, "written {written}");
        assert!(
            written <= 500 + capacity + 1,
            "written {written}, capacity {capacity}"
        );
    }

    #[test]
    fn producer_error_rethrown_after_drain() {
        let cursor = int_cursor(50).with_error_after(10);
        let source = RowSource::open(Box::new(cursor), 8).unwrap();
        let encoder = encoder();
        let mut written = 0u64;
        let err = run_prefetch(
            source,
            &encoder,
            &CancelToken::new(),
            &PrefetchOptions::default(),
            |_| {
                written += 1;
                Ok(())
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::Source { .. }));
        assert_eq!(written, 10);
    }

    #[test]
    fn queue_capacity_rule() {
        let o = PrefetchOptions {
            fetch_hint: 1000,
            fetch_limit: 0,
        };
        assert_eq!(o.queue_capacity(), 2010);
        let o = PrefetchOptions {
            fetch_hint: 1000,
            fetch_limit: 5,
        };
        assert_eq!(o.queue_capacity(), 20);
    }
}
