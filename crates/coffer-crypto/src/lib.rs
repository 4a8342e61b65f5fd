//! coffer-crypto: chunk encryption for coffer
//!
//! Architecture: encrypt-then-MAC over fixed-size chunks
//!
//! Pipeline: plaintext chunk → zero-pad to chunk size → AES-256-CBC →
//! HMAC-SHA256 over ciphertext → the tag IS the chunk's storage key.
//!
//! Key material comes from an armored key file with two 256-bit keys:
//! ```text
//! -----BEGIN Encryption-----      AES-256-CBC key
//! -----BEGIN Authentication-----  HMAC-SHA256 key
//! ```
//! CBC with a per-chunk random IV is deterministic under a fixed (key, IV)
//! pair; the backup engine exploits that to recognize unchanged chunks by
//! re-encrypting under the previously recorded IV.

pub mod cipher;
pub mod iv;
pub mod keys;

pub use cipher::{decrypt, encrypt};
pub use iv::{FixedIv, IvSource, RandomIv};
pub use keys::{generate_key_file, parse_armored, KeyBundle};

pub use coffer_core::{BLOCK_SIZE, IV_SIZE, KEY_SIZE, TAG_SIZE};
