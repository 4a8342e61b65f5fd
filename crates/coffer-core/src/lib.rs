pub mod error;
pub mod paths;

pub use error::{CofferError, CofferResult};
pub use paths::path_key;

/// Size of the Encryption and Authentication keys in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an AES-CBC initialization vector (one AES block)
pub const IV_SIZE: usize = 16;

/// Size of an HMAC-SHA256 tag; doubles as a chunk's content address
pub const TAG_SIZE: usize = 32;

/// AES block size; every chunk ciphertext is a multiple of this
pub const BLOCK_SIZE: usize = 16;
