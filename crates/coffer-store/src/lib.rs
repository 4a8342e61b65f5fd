//! coffer-store: pluggable object storage for encrypted chunks
//!
//! The engine sees a two-method [`ChunkStore`]: opaque blobs keyed by
//! 64-hex-character content addresses plus the single reserved key
//! `"meta"` for the bootstrap pointer. Backends are built from a
//! chunkspec string:
//!
//! ```text
//! local:/path/to/directory
//! gcs:path-to-json-keyfile:bucket-name
//! ```

pub mod memory;
pub mod opendal_store;
pub mod spec;

pub use memory::MemoryStore;
pub use opendal_store::OpendalStore;
pub use spec::open_chunkspec;

use async_trait::async_trait;
use coffer_core::CofferResult;

/// Reserved key for the bootstrap pointer blob. Every other key is a
/// hex-encoded chunk tag.
pub const META_KEY: &str = "meta";

/// A flat, append-only blob store keyed by content address.
///
/// Saves are idempotent under content addressing: the same key always
/// carries the same bytes, so a backend may skip writes to keys that
/// already exist. The engine never relies on that for correctness.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Fetch the blob stored under `key`; NotFound if absent.
    async fn read(&self, key: &str) -> CofferResult<Vec<u8>>;

    /// Store `contents` under `key`, overwriting any previous blob.
    async fn save(&self, key: &str, contents: Vec<u8>) -> CofferResult<()>;
}
