//! Armored key file parsing, validation, and generation.
//!
//! A key file is a sequence of text-armored blocks:
//! ```text
//! -----BEGIN Encryption-----
//! <base64>
//! -----END Encryption-----
//! -----BEGIN Authentication-----
//! <base64>
//! -----END Authentication-----
//! ```
//! `Encryption` and `Authentication` are required and must decode to
//! exactly 32 bytes each. Unknown labels are retained but unused, so a
//! key file carrying extra material still parses.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use zeroize::Zeroize;

use coffer_core::{CofferError, CofferResult, KEY_SIZE};

const ENCRYPTION_LABEL: &str = "Encryption";
const AUTHENTICATION_LABEL: &str = "Authentication";

/// The parsed and validated contents of a key file. Held immutably for
/// the whole run; key material is zeroized on drop.
pub struct KeyBundle {
    encryption: [u8; KEY_SIZE],
    authentication: [u8; KEY_SIZE],
    extra: BTreeMap<String, Vec<u8>>,
}

impl KeyBundle {
    /// Parse an armored key file body into a bundle.
    pub fn from_armor(input: &[u8]) -> CofferResult<Self> {
        let mut blocks = parse_armored(input);
        let encryption = take_key(&mut blocks, ENCRYPTION_LABEL)?;
        let authentication = take_key(&mut blocks, AUTHENTICATION_LABEL)?;
        Ok(KeyBundle {
            encryption,
            authentication,
            extra: blocks,
        })
    }

    /// Read and parse the key file at `path`.
    pub fn load(path: &Path) -> CofferResult<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_armor(&bytes)
    }

    /// Build a bundle directly from raw key material (programmatic use
    /// and tests; the CLI always goes through a key file).
    pub fn from_keys(encryption: [u8; KEY_SIZE], authentication: [u8; KEY_SIZE]) -> Self {
        KeyBundle {
            encryption,
            authentication,
            extra: BTreeMap::new(),
        }
    }

    /// The AES-256-CBC key.
    pub fn encryption(&self) -> &[u8; KEY_SIZE] {
        &self.encryption
    }

    /// The HMAC-SHA256 key.
    pub fn authentication(&self) -> &[u8; KEY_SIZE] {
        &self.authentication
    }

    /// Labels present in the file beyond the two required ones.
    pub fn extra_labels(&self) -> impl Iterator<Item = &str> {
        self.extra.keys().map(String::as_str)
    }
}

impl Drop for KeyBundle {
    fn drop(&mut self) {
        self.encryption.zeroize();
        self.authentication.zeroize();
        for value in self.extra.values_mut() {
            value.zeroize();
        }
    }
}

impl std::fmt::Debug for KeyBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyBundle")
            .field("encryption", &"[REDACTED]")
            .field("authentication", &"[REDACTED]")
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn take_key(blocks: &mut BTreeMap<String, Vec<u8>>, label: &str) -> CofferResult<[u8; KEY_SIZE]> {
    let mut bytes = blocks
        .remove(label)
        .ok_or_else(|| CofferError::BadKey(format!("key file is missing a {label} block")))?;
    if bytes.len() != KEY_SIZE {
        bytes.zeroize();
        return Err(CofferError::BadKey(format!(
            "{label} key must be {KEY_SIZE} bytes (256 bits)"
        )));
    }
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&bytes);
    bytes.zeroize();
    Ok(key)
}

/// Scan armored blocks out of `input`, mapping each label to its decoded
/// bytes. Text outside blocks is skipped; a block whose body fails base64
/// decoding is dropped; empty or unrecognizable input yields an empty
/// map. A repeated label keeps the last occurrence.
pub fn parse_armored(input: &[u8]) -> BTreeMap<String, Vec<u8>> {
    let text = String::from_utf8_lossy(input);
    let mut blocks = BTreeMap::new();
    let mut current: Option<(String, String)> = None;

    for line in text.lines() {
        let line = line.trim();
        if let Some(label) = frame_label(line, "-----BEGIN ") {
            current = Some((label.to_string(), String::new()));
        } else if let Some(label) = frame_label(line, "-----END ") {
            if let Some((open_label, body)) = current.take() {
                if open_label == label {
                    if let Ok(bytes) = STANDARD.decode(&body) {
                        blocks.insert(open_label, bytes);
                    }
                }
            }
        } else if let Some((_, body)) = current.as_mut() {
            body.push_str(line);
        }
    }
    blocks
}

fn frame_label<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    line.strip_prefix(prefix)?.strip_suffix("-----")
}

/// Generate a fresh key file at `path` with one 32-random-byte block per
/// required label, mode 0600.
pub fn generate_key_file(path: &Path) -> CofferResult<()> {
    let mut armored = String::new();
    for label in [AUTHENTICATION_LABEL, ENCRYPTION_LABEL] {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        armored.push_str(&encode_block(label, &key));
        key.zeroize();
    }

    let mut open_options = std::fs::OpenOptions::new();
    open_options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        open_options.mode(0o600);
    }
    let mut file = open_options.open(path)?;
    file.write_all(armored.as_bytes())?;
    Ok(())
}

fn encode_block(label: &str, bytes: &[u8]) -> String {
    let body = STANDARD.encode(bytes);
    let mut block = format!("-----BEGIN {label}-----\n");
    let mut rest = body.as_str();
    while !rest.is_empty() {
        let (line, tail) = rest.split_at(rest.len().min(64));
        block.push_str(line);
        block.push('\n');
        rest = tail;
    }
    block.push_str(&format!("-----END {label}-----\n"));
    block
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_ZEROS: [u8; 32] = [0x00; 32];
    const ALL_ONES: [u8; 32] = [0xFF; 32];

    const ENC_BLOCK: &str = "-----BEGIN Encryption-----\n\
AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=\n\
-----END Encryption-----\n";
    const AUTH_BLOCK: &str = "-----BEGIN Authentication-----\n\
//////////////////////////////////////////8=\n\
-----END Authentication-----\n";

    #[test]
    fn parses_enc_then_auth() {
        let blocks = parse_armored(format!("{ENC_BLOCK}{AUTH_BLOCK}").as_bytes());
        assert_eq!(blocks["Encryption"], ALL_ZEROS);
        assert_eq!(blocks["Authentication"], ALL_ONES);
        assert_eq!(blocks.len(), 2);
    }

    #[test]
    fn parses_auth_then_enc() {
        let blocks = parse_armored(format!("{AUTH_BLOCK}{ENC_BLOCK}").as_bytes());
        assert_eq!(blocks["Encryption"], ALL_ZEROS);
        assert_eq!(blocks["Authentication"], ALL_ONES);
    }

    #[test]
    fn retains_unknown_labels() {
        let input = "-----BEGIN Meep-----\n//////////////////////////////////////////8=\n-----END Meep-----\n";
        let blocks = parse_armored(input.as_bytes());
        assert_eq!(blocks["Meep"], ALL_ONES);
    }

    #[test]
    fn gibberish_yields_empty_map() {
        assert!(parse_armored(b"oh no!").is_empty());
        assert!(parse_armored(b"").is_empty());
    }

    #[test]
    fn bundle_order_does_not_matter() {
        let a = KeyBundle::from_armor(format!("{ENC_BLOCK}{AUTH_BLOCK}").as_bytes()).unwrap();
        let b = KeyBundle::from_armor(format!("{AUTH_BLOCK}{ENC_BLOCK}").as_bytes()).unwrap();
        assert_eq!(a.encryption(), b.encryption());
        assert_eq!(a.authentication(), b.authentication());
    }

    #[test]
    fn bundle_requires_both_labels() {
        let err = KeyBundle::from_armor(ENC_BLOCK.as_bytes()).unwrap_err();
        assert!(matches!(err, CofferError::BadKey(_)));
        let err = KeyBundle::from_armor(AUTH_BLOCK.as_bytes()).unwrap_err();
        assert!(matches!(err, CofferError::BadKey(_)));
    }

    #[test]
    fn bundle_rejects_short_key() {
        let short = format!(
            "-----BEGIN Encryption-----\n{}\n-----END Encryption-----\n{AUTH_BLOCK}",
            STANDARD.encode([0u8; 16])
        );
        let err = KeyBundle::from_armor(short.as_bytes()).unwrap_err();
        assert!(matches!(err, CofferError::BadKey(_)));
    }

    #[test]
    fn bundle_keeps_extra_labels() {
        let input = format!(
            "{ENC_BLOCK}{AUTH_BLOCK}-----BEGIN IV-----\n{}\n-----END IV-----\n",
            STANDARD.encode(ALL_ONES)
        );
        let bundle = KeyBundle::from_armor(input.as_bytes()).unwrap();
        assert_eq!(bundle.extra_labels().collect::<Vec<_>>(), vec!["IV"]);
    }

    #[test]
    fn debug_is_redacted() {
        let bundle = KeyBundle::from_armor(format!("{ENC_BLOCK}{AUTH_BLOCK}").as_bytes()).unwrap();
        let rendered = format!("{bundle:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("255"));
    }

    #[test]
    fn generated_file_parses_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coffer.keys");
        generate_key_file(&path).unwrap();

        let bundle = KeyBundle::load(&path).unwrap();
        assert_ne!(bundle.encryption(), bundle.authentication());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn encode_block_wraps_at_64_columns() {
        let block = encode_block("Test", &[0xAA; 64]);
        for line in block.lines() {
            assert!(line.len() <= 64 || line.starts_with("-----"));
        }
        let decoded = parse_armored(block.as_bytes());
        assert_eq!(decoded["Test"], vec![0xAA; 64]);
    }
}
