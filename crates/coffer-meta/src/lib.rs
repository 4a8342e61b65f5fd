//! coffer-meta: the metadata index over backed-up paths
//!
//! One [`Entry`] per filesystem node records how to reconstruct it:
//! the ordered chunk list (IV + content address per chunk), the original
//! byte length, and mode/owner. Entries live in a redb database shaped
//! like the backed-up tree: one table per directory, keyed by basename,
//! with a directory's own entry under the reserved key `"."`.
//!
//! The database file is itself backed up through the ordinary chunk
//! pipeline at the end of an encryption run, so the encoding only has to
//! stay stable within one backup's lifetime.

pub mod entry;
pub mod index;

pub use entry::{decode_entry, encode_entry, ChunkRef, Entry};
pub use index::MetaDb;
