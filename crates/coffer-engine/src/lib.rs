//! coffer-engine: backup and restore orchestration
//!
//! Encryption walks a file tree, pipes each regular file through the
//! chunker and the chunk cipher, stores ciphertext under its tag, and
//! records an entry per node in the metadata index. Restore resolves a
//! path through the index, decrypts chunks in order, and rebuilds files
//! and directories with their recorded mode and owner.
//!
//! The metadata database is self-hosting: at the end of an encryption
//! run it is gzip-compressed, chunk-encrypted like any file, and a
//! pointer to it is stored under the reserved key `"meta"`, which is the
//! run's single atomic commit point.

pub mod backup;
pub mod bootstrap;
pub mod owner;
pub mod restore;

pub use backup::{encrypt_reader, encrypt_tree, BackupStats, ReuploadPolicy};
pub use bootstrap::{fetch_metadata_db, upload_metadata_db, META_IV};
pub use restore::{decrypt_chunks, decrypt_tree, RestoreStats};
