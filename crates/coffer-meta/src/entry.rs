//! Entry records and their binary codec.

use serde::{Deserialize, Serialize};

use coffer_core::{CofferError, CofferResult, IV_SIZE, TAG_SIZE};

/// One stored chunk of a file: the IV it was encrypted under and the
/// HMAC tag of its ciphertext. The tag, hex-encoded, is the chunk's key
/// in the chunk store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRef {
    pub iv: [u8; IV_SIZE],
    pub tag: [u8; TAG_SIZE],
}

impl ChunkRef {
    /// The chunk store key for this chunk.
    pub fn address(&self) -> String {
        hex::encode(self.tag)
    }
}

/// Metadata for one filesystem node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Original plaintext length in bytes; 0 for directories. The sole
    /// authority on where the final chunk's zero padding begins.
    pub bytes: u64,
    /// Ordered chunk list; empty for directories.
    pub chunks: Vec<ChunkRef>,
    /// Platform st_mode, including the file-type bits.
    pub mode: u32,
    /// Owning user name; empty when unknown.
    pub user: String,
    /// Owning group name; empty when unknown.
    pub group: String,
}

// st_mode file-type mask and directory bit; fixed across unix platforms.
const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;

impl Entry {
    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    /// Permission bits only, for chmod after restore.
    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }
}

/// Encode an entry to its canonical binary form: fields in declaration
/// order, length-prefixed strings and chunk list, fixed-width IV and tag.
pub fn encode_entry(entry: &Entry) -> CofferResult<Vec<u8>> {
    bincode::serialize(entry).map_err(|e| CofferError::index(format!("encoding entry: {e}")))
}

/// Decode an entry from its binary form. Trailing bytes are ignored,
/// which lets the bootstrap pointer carry a zero-padded encoding.
pub fn decode_entry(bytes: &[u8]) -> CofferResult<Entry> {
    bincode::deserialize(bytes).map_err(|e| CofferError::index(format!("decoding entry: {e}")))
}
