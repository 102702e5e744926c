//! Remote object store capability
//!
//! The cache engine depends only on the narrow [`ObjectStore`] contract;
//! the S3- and GCS-backed clients live with the host and plug in behind it.
//! Implementations must surface the canonical not-found sentinel
//! (`StratusError::NotFound`) for absent keys so callers can distinguish a
//! miss from a transport failure.

pub mod etag;
pub mod memory;

pub use etag::{fingerprint, EtagReader, EtagSink};
pub use memory::MemoryStore;

use crate::error::StratusResult;
use async_trait::async_trait;
use tokio::io::AsyncRead;

/// Boxed byte stream used for object bodies
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// Typed operations against a remote object bucket
///
/// Implementations must be safe for concurrent use; the engine shares one
/// client across all foreground requests and background uploads.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Retrieve the object stored at `key`, returning a reader and its size
    async fn get(&self, key: &str) -> StratusResult<(ByteStream, u64)>;

    /// Retrieve the complete content of the object stored at `key`
    async fn get_data(&self, key: &str) -> StratusResult<Vec<u8>>;

    /// Write `data` to `key`, replacing any existing object
    async fn put(&self, key: &str, data: ByteStream) -> StratusResult<()>;

    /// Write `data` to `key` only if the key is absent or its stored
    /// content fingerprint differs from `content_hash`
    ///
    /// Returns `true` when the object was written, `false` when an
    /// identical object already existed.
    async fn put_cond(
        &self,
        key: &str,
        content_hash: &str,
        data: ByteStream,
    ) -> StratusResult<bool>;

    /// Release any resources held by the client
    async fn close(&self) -> StratusResult<()>;
}

/// Join key segments with `/`, skipping empty segments
///
/// Used to assemble `[<prefix>/]<kind>/<hh>/<id>` remote keys without a
/// leading slash when no prefix is configured.
pub fn join_key(parts: &[&str]) -> String {
    let segments: Vec<&str> = parts.iter().copied().filter(|p| !p.is_empty()).collect();
    segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_key_with_prefix() {
        assert_eq!(
            join_key(&["team-a", "action", "aa", "aabb"]),
            "team-a/action/aa/aabb"
        );
    }

    #[test]
    fn join_key_without_prefix() {
        assert_eq!(join_key(&["", "output", "cc", "ccdd"]), "output/cc/ccdd");
    }
}
