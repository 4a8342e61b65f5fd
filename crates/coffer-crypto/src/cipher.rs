//! Per-chunk AES-256-CBC encryption with an HMAC-SHA256 tag
//!
//! The tag authenticates the ciphertext and doubles as the chunk's
//! content address in the chunk store. Plaintext is zero-padded on the
//! right to exactly `chunk_size` bytes, so the ciphertext length reveals
//! the chunk size but not the plaintext length; the metadata entry's
//! recorded byte count is the sole authority on where padding begins.

use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use coffer_core::{CofferError, CofferResult, BLOCK_SIZE, IV_SIZE, TAG_SIZE};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Encrypt one chunk.
///
/// - `enc_key`: AES-256 key (32 bytes)
/// - `auth_key`: HMAC-SHA256 key
/// - `iv`: 16-byte CBC initialization vector
/// - `plaintext`: at most `chunk_size` bytes
/// - `chunk_size`: the padded chunk length; must be a positive multiple of 16
///
/// Returns `(ciphertext, tag)` where `ciphertext` is exactly `chunk_size`
/// bytes and `tag = HMAC-SHA256(auth_key, ciphertext)`.
pub fn encrypt(
    enc_key: &[u8],
    auth_key: &[u8],
    iv: &[u8; IV_SIZE],
    plaintext: &[u8],
    chunk_size: usize,
) -> CofferResult<(Vec<u8>, [u8; TAG_SIZE])> {
    if chunk_size == 0 || chunk_size % BLOCK_SIZE != 0 {
        return Err(CofferError::BadChunkSize(chunk_size));
    }
    if plaintext.len() > chunk_size {
        return Err(CofferError::InputTooLarge {
            have: plaintext.len(),
            limit: chunk_size,
        });
    }

    let cipher = Aes256CbcEnc::new_from_slices(enc_key, iv)
        .map_err(|_| CofferError::BadKey(format!("AES key must be 32 bytes, got {}", enc_key.len())))?;

    let padded = pad(plaintext, chunk_size);
    let ciphertext = cipher.encrypt_padded_vec_mut::<NoPadding>(&padded);
    let tag = compute_tag(auth_key, &ciphertext)?;

    Ok((ciphertext, tag))
}

/// Decrypt one chunk.
///
/// The tag is verified in constant time before decryption; a mismatch is
/// `BadMac`. Verification is skipped entirely when `auth_key` or
/// `expected_tag` is empty — the bootstrap pointer blob relies on this,
/// since the chunks it points at are themselves authenticated.
///
/// Returns the full padded plaintext; the caller truncates to the entry's
/// recorded length. A wrong IV does not fail: it garbles the first block
/// only, which is why callers must use the IV recorded alongside the tag.
pub fn decrypt(
    enc_key: &[u8],
    auth_key: &[u8],
    iv: &[u8; IV_SIZE],
    ciphertext: &[u8],
    expected_tag: &[u8],
) -> CofferResult<Vec<u8>> {
    if !auth_key.is_empty() && !expected_tag.is_empty() {
        verify_tag(auth_key, ciphertext, expected_tag)?;
    }

    let cipher = Aes256CbcDec::new_from_slices(enc_key, iv)
        .map_err(|_| CofferError::BadKey(format!("AES key must be 32 bytes, got {}", enc_key.len())))?;

    cipher
        .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
        .map_err(|_| CofferError::Index(format!(
            "ciphertext length {} is not a multiple of the AES block size",
            ciphertext.len()
        )))
}

/// HMAC-SHA256 over a chunk's ciphertext; the chunk's content address.
pub fn compute_tag(auth_key: &[u8], ciphertext: &[u8]) -> CofferResult<[u8; TAG_SIZE]> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(auth_key)
        .map_err(|e| CofferError::BadKey(format!("HMAC key rejected: {e}")))?;
    mac.update(ciphertext);
    Ok(mac.finalize().into_bytes().into())
}

fn verify_tag(auth_key: &[u8], ciphertext: &[u8], expected: &[u8]) -> CofferResult<()> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(auth_key)
        .map_err(|e| CofferError::BadKey(format!("HMAC key rejected: {e}")))?;
    mac.update(ciphertext);
    mac.verify_slice(expected).map_err(|_| CofferError::BadMac)
}

/// Zero-pad on the right to `chunk_size`; returns the input unchanged in
/// length when it is already exactly `chunk_size` bytes.
fn pad(unpadded: &[u8], chunk_size: usize) -> Vec<u8> {
    let mut padded = Vec::with_capacity(chunk_size);
    padded.extend_from_slice(unpadded);
    padded.resize(chunk_size, 0x00);
    padded
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALL_ZEROS: [u8; 32] = [0x00; 32];
    const ALL_ONES: [u8; 32] = [0xFF; 32];
    const ZERO_IV: [u8; IV_SIZE] = [0x00; IV_SIZE];

    const FOO: &[u8] = b"foo";

    const FOO_CIPHERTEXT: [u8; 16] = [
        0x2C, 0x7C, 0xD1, 0x94, 0x82, 0x25, 0x56, 0x6F,
        0xB5, 0x65, 0x4E, 0x54, 0x59, 0xB7, 0x46, 0x74,
    ];

    const FOO_TAG: [u8; 32] = [
        0x95, 0x91, 0x31, 0xF4, 0x6B, 0x50, 0x53, 0xA2,
        0x03, 0xB7, 0xD0, 0x6B, 0x42, 0x8A, 0x86, 0x1E,
        0x51, 0xD1, 0x9C, 0x90, 0x88, 0x84, 0x17, 0xBB,
        0xF1, 0xD3, 0x57, 0x35, 0x8E, 0x42, 0x90, 0xF8,
    ];

    const BLOCK: &[u8] = b"0123456789012345";

    const BLOCK_CIPHERTEXT: [u8; 16] = [
        0x61, 0xA6, 0x4C, 0xAA, 0x23, 0x5B, 0x6D, 0x6B,
        0xD4, 0xC7, 0x5B, 0xFF, 0x09, 0x15, 0x0B, 0x34,
    ];

    const BLOCK_TAG: [u8; 32] = [
        0x4A, 0x3B, 0xB8, 0x32, 0xCB, 0x80, 0x95, 0x0B,
        0xC4, 0xDB, 0x05, 0x45, 0x5F, 0x3B, 0x54, 0x39,
        0x95, 0x67, 0x6C, 0x8B, 0xC6, 0x94, 0xB6, 0x88,
        0x63, 0x5F, 0xBF, 0xCB, 0x4D, 0x3F, 0x53, 0xCA,
    ];

    const BLOCK_PADDED_CIPHERTEXT: [u8; 32] = [
        0x61, 0xA6, 0x4C, 0xAA, 0x23, 0x5B, 0x6D, 0x6B,
        0xD4, 0xC7, 0x5B, 0xFF, 0x09, 0x15, 0x0B, 0x34,
        0xBE, 0xF2, 0xAB, 0x7F, 0xA4, 0x7F, 0xE7, 0x7B,
        0x95, 0x6F, 0xC8, 0xAD, 0x59, 0xAB, 0xBB, 0xCC,
    ];

    const BLOCK_PADDED_TAG: [u8; 32] = [
        0xF6, 0x4E, 0xC2, 0xF9, 0xE3, 0x42, 0x32, 0x6C,
        0xA6, 0x86, 0x45, 0x8C, 0x65, 0xF4, 0x88, 0x31,
        0xB1, 0x86, 0x7B, 0xBE, 0x91, 0x56, 0x3D, 0x18,
        0x7B, 0x1B, 0xE0, 0xED, 0x05, 0x08, 0xB3, 0x56,
    ];

    #[test]
    fn encrypt_short_plaintext() {
        let (ct, tag) = encrypt(&ALL_ZEROS, &ALL_ONES, &ZERO_IV, FOO, 16).unwrap();
        assert_eq!(ct, FOO_CIPHERTEXT);
        assert_eq!(tag, FOO_TAG);
    }

    #[test]
    fn encrypt_exact_block() {
        let (ct, tag) = encrypt(&ALL_ZEROS, &ALL_ONES, &ZERO_IV, BLOCK, 16).unwrap();
        assert_eq!(ct, BLOCK_CIPHERTEXT);
        assert_eq!(tag, BLOCK_TAG);
    }

    #[test]
    fn encrypt_exact_block_with_padding() {
        let (ct, tag) = encrypt(&ALL_ZEROS, &ALL_ONES, &ZERO_IV, BLOCK, 32).unwrap();
        assert_eq!(ct, BLOCK_PADDED_CIPHERTEXT);
        assert_eq!(tag, BLOCK_PADDED_TAG);
    }

    #[test]
    fn encrypt_rejects_oversized_plaintext() {
        let err = encrypt(&ALL_ZEROS, &ALL_ONES, &ZERO_IV, &[0u8; 17], 16).unwrap_err();
        assert!(matches!(err, CofferError::InputTooLarge { have: 17, limit: 16 }));
    }

    #[test]
    fn encrypt_rejects_bad_aes_key() {
        let err = encrypt(&[0x00], &ALL_ONES, &ZERO_IV, FOO, 16).unwrap_err();
        assert!(matches!(err, CofferError::BadKey(_)));
    }

    #[test]
    fn encrypt_rejects_unaligned_chunk_size() {
        let err = encrypt(&ALL_ZEROS, &ALL_ONES, &ZERO_IV, FOO, 20).unwrap_err();
        assert!(matches!(err, CofferError::BadChunkSize(20)));
        let err = encrypt(&ALL_ZEROS, &ALL_ONES, &ZERO_IV, b"", 0).unwrap_err();
        assert!(matches!(err, CofferError::BadChunkSize(0)));
    }

    #[test]
    fn decrypt_short_plaintext() {
        let pt = decrypt(&ALL_ZEROS, &ALL_ONES, &ZERO_IV, &FOO_CIPHERTEXT, &FOO_TAG).unwrap();
        assert_eq!(&pt[..FOO.len()], FOO);
        assert!(pt[FOO.len()..].iter().all(|&b| b == 0x00));
    }

    #[test]
    fn decrypt_exact_block() {
        let pt = decrypt(&ALL_ZEROS, &ALL_ONES, &ZERO_IV, &BLOCK_CIPHERTEXT, &BLOCK_TAG).unwrap();
        assert_eq!(pt, BLOCK);
    }

    #[test]
    fn decrypt_padded_block() {
        let pt = decrypt(
            &ALL_ZEROS,
            &ALL_ONES,
            &ZERO_IV,
            &BLOCK_PADDED_CIPHERTEXT,
            &BLOCK_PADDED_TAG,
        )
        .unwrap();
        assert_eq!(&pt[..BLOCK.len()], BLOCK);
    }

    #[test]
    fn decrypt_wrong_tag_fails() {
        let err = decrypt(&ALL_ZEROS, &ALL_ONES, &ZERO_IV, &FOO_CIPHERTEXT, &ALL_ZEROS).unwrap_err();
        assert!(matches!(err, CofferError::BadMac));
    }

    #[test]
    fn decrypt_tampered_ciphertext_fails() {
        let mut ct = FOO_CIPHERTEXT;
        ct[3] ^= 0x01;
        let err = decrypt(&ALL_ZEROS, &ALL_ONES, &ZERO_IV, &ct, &FOO_TAG).unwrap_err();
        assert!(matches!(err, CofferError::BadMac));
    }

    #[test]
    fn decrypt_wrong_iv_garbles_first_block_only() {
        let wrong_iv = [0xFF; IV_SIZE];
        let pt = decrypt(&ALL_ZEROS, &ALL_ONES, &wrong_iv, &FOO_CIPHERTEXT, &FOO_TAG).unwrap();
        assert_ne!(&pt[..3], FOO);
    }

    #[test]
    fn decrypt_skips_mac_when_key_or_tag_empty() {
        // The bootstrap pointer passes empty values for both.
        let pt = decrypt(&ALL_ZEROS, &[], &ZERO_IV, &FOO_CIPHERTEXT, &FOO_TAG).unwrap();
        assert_eq!(&pt[..3], FOO);
        let pt = decrypt(&ALL_ZEROS, &ALL_ONES, &ZERO_IV, &FOO_CIPHERTEXT, &[]).unwrap();
        assert_eq!(&pt[..3], FOO);
    }

    #[test]
    fn decrypt_rejects_bad_aes_key() {
        let err = decrypt(&[0x00], &[], &ZERO_IV, &FOO_CIPHERTEXT, &[]).unwrap_err();
        assert!(matches!(err, CofferError::BadKey(_)));
    }

    #[test]
    fn tag_depends_only_on_auth_key_and_ciphertext() {
        let a = compute_tag(&ALL_ONES, &FOO_CIPHERTEXT).unwrap();
        let b = compute_tag(&ALL_ONES, &FOO_CIPHERTEXT).unwrap();
        assert_eq!(a, b);
        let c = compute_tag(&ALL_ZEROS, &FOO_CIPHERTEXT).unwrap();
        assert_ne!(a, c);
    }

    proptest! {
        /// Decrypting an encrypted chunk and truncating to the original
        /// length recovers the plaintext, for any plaintext that fits.
        #[test]
        fn roundtrip(pt in proptest::collection::vec(any::<u8>(), 0..=64)) {
            let chunk_size = 64;
            let iv = [0x42u8; IV_SIZE];
            let (ct, tag) = encrypt(&ALL_ZEROS, &ALL_ONES, &iv, &pt, chunk_size).unwrap();
            prop_assert_eq!(ct.len(), chunk_size);
            let out = decrypt(&ALL_ZEROS, &ALL_ONES, &iv, &ct, &tag).unwrap();
            prop_assert_eq!(&out[..pt.len()], &pt[..]);
            prop_assert!(out[pt.len()..].iter().all(|&b| b == 0x00));
        }

        /// Same inputs produce the same address; CBC is deterministic
        /// under a fixed (key, IV).
        #[test]
        fn address_is_deterministic(pt in proptest::collection::vec(any::<u8>(), 0..=32)) {
            let iv = [0x07u8; IV_SIZE];
            let (_, tag_a) = encrypt(&ALL_ZEROS, &ALL_ONES, &iv, &pt, 32).unwrap();
            let (_, tag_b) = encrypt(&ALL_ZEROS, &ALL_ONES, &iv, &pt, 32).unwrap();
            prop_assert_eq!(tag_a, tag_b);
        }
    }
}
