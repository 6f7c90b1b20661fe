//! Bounded, counting wrapper around request bodies

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf, Take};

/// Counters shared between a [`BodyReader`] and its observers
#[derive(Debug, Default)]
pub(crate) struct BodyStats {
    bytes_read: AtomicU64,
    error: Mutex<Option<io::Error>>,
}

impl BodyStats {
    pub(crate) fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Acquire)
    }

    /// First read error seen by the reader, if any
    pub(crate) fn take_error(&self) -> Option<io::Error> {
        self.error.lock().ok().and_then(|mut slot| slot.take())
    }

    fn record_error(&self, err: io::Error) {
        if let Ok(mut slot) = self.error.lock() {
            if slot.is_none() {
                *slot = Some(err);
            }
        }
    }
}

/// Reads at most `limit` bytes from the body.
///
/// A failed read is recorded and reported to the store as end of input, so
/// that whatever arrived before the failure is still persisted.
pub(crate) struct BodyReader<R> {
    inner: Take<R>,
    stats: Arc<BodyStats>,
    failed: bool,
}

impl<R: AsyncRead + Unpin> BodyReader<R> {
    pub(crate) fn new(inner: R, limit: u64) -> Self {
        BodyReader {
            inner: inner.take(limit),
            stats: Arc::new(BodyStats::default()),
            failed: false,
        }
    }

    pub(crate) fn stats(&self) -> Arc<BodyStats> {
        self.stats.clone()
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for BodyReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.failed {
            return Poll::Ready(Ok(()));
        }

        let before = buf.filled().len();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let n = (buf.filled().len() - before) as u64;
                this.stats.bytes_read.fetch_add(n, Ordering::AcqRel);
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(e)) => {
                this.failed = true;
                this.stats.record_error(e);
                Poll::Ready(Ok(()))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
