//! Streaming content fingerprints for conditional uploads
//!
//! The build adapter computes an object's fingerprint while the body streams
//! into the local stage, so the later background upload can use a
//! conditional PUT without re-reading the file. The fingerprint algorithm is
//! whatever the bound store compares in `put_cond`; the bundled store uses
//! lower-hex SHA-256.

use sha2::{Digest, Sha256};
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

use crate::remote::ByteStream;

/// Compute the content fingerprint of a complete byte slice
pub fn fingerprint(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Handle onto the digest accumulated by an [`EtagReader`]
///
/// Remains valid after the reader has been consumed, which is the point:
/// the reader is handed to the stage while the sink stays with the caller.
#[derive(Clone)]
pub struct EtagSink {
    hasher: Arc<Mutex<Sha256>>,
}

impl EtagSink {
    /// Fingerprint of all bytes that have passed through the reader so far
    pub fn etag(&self) -> String {
        let hasher = self
            .hasher
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        hex::encode(hasher.clone().finalize())
    }
}

/// An `AsyncRead` wrapper that hashes bytes as they pass through
pub struct EtagReader {
    inner: ByteStream,
    hasher: Arc<Mutex<Sha256>>,
}

impl EtagReader {
    /// Wrap `inner`, returning the reader and a sink for the digest
    pub fn new(inner: ByteStream) -> (Self, EtagSink) {
        let hasher = Arc::new(Mutex::new(Sha256::new()));
        let sink = EtagSink {
            hasher: Arc::clone(&hasher),
        };
        (Self { inner, hasher }, sink)
    }
}

impl AsyncRead for EtagReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let me = self.get_mut();
        let before = buf.filled().len();
        match Pin::new(&mut me.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let filled = buf.filled();
                if filled.len() > before {
                    let mut hasher = me
                        .hasher
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                    hasher.update(&filled[before..]);
                }
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}
