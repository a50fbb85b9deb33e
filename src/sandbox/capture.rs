//! Invocation-local output capture.
//!
//! Each execution owns one [`Capture`] per stream. The handle is shared only
//! between the draining task and the execution that created it, so partial
//! output survives even when draining is abandoned after a kill.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::io::{AsyncRead, AsyncReadExt};

const TRUNCATION_MARKER: &str = "\n... [output truncated]";

#[derive(Debug)]
struct Buffer {
    bytes: Vec<u8>,
    limit: usize,
    truncated: bool,
}

/// Append-only byte buffer with a size ceiling.
#[derive(Debug, Clone)]
pub(crate) struct Capture {
    inner: Arc<Mutex<Buffer>>,
}

impl Capture {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Buffer {
                bytes: Vec::new(),
                limit,
                truncated: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Buffer> {
        // A panic while holding the lock cannot leave the Vec inconsistent.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a chunk; bytes past the limit are dropped.
    pub(crate) fn push(&self, chunk: &[u8]) {
        let mut buffer = self.lock();
        let room = buffer.limit.saturating_sub(buffer.bytes.len());
        if chunk.len() > room {
            buffer.bytes.extend_from_slice(&chunk[..room]);
            buffer.truncated = true;
        } else {
            buffer.bytes.extend_from_slice(chunk);
        }
    }

    /// Decode everything captured so far (lossy UTF-8).
    pub(crate) fn contents(&self) -> String {
        let buffer = self.lock();
        let mut text = String::from_utf8_lossy(&buffer.bytes).into_owned();
        if buffer.truncated {
            text.push_str(TRUNCATION_MARKER);
        }
        text
    }
}

/// Read `reader` to EOF into `capture`. Keeps reading after the limit is hit
/// so the child never blocks on a full pipe.
pub(crate) async fn drain<R>(mut reader: R, capture: Capture)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => capture.push(&chunk[..n]),
            Err(e) => {
                tracing::debug!(error = %e, "Output pipe read failed");
                break;
            }
        }
    }
}
