//! Metadata self-hosting: the `"meta"` pointer blob.
//!
//! After a run, the metadata database file is gzip-compressed and
//! chunk-encrypted like any other file. A short entry describing those
//! chunks is encoded, encrypted under a fixed IV, and stored under the
//! reserved key `"meta"`. A client holding only the key file and store
//! credentials can then locate and rebuild the database.
//!
//! The pointer is encrypted for confidentiality but carries no MAC: the
//! chunks it names are themselves authenticated, and its plaintext
//! varies every run (fresh chunk tags), which is what makes the fixed
//! IV tolerable.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{debug, info};

use coffer_core::{CofferResult, IV_SIZE};
use coffer_crypto::{cipher, IvSource, KeyBundle};
use coffer_store::{ChunkStore, META_KEY};

use crate::backup::{encrypt_reader, BackupStats};
use crate::restore::decrypt_chunks;
use coffer_meta::{decode_entry, encode_entry, Entry};

/// Fixed IV for the pointer blob.
pub const META_IV: [u8; IV_SIZE] = *b"metametametameta";

/// Fetch and rebuild the metadata database into `temp_dir`, returning
/// the database file path. A missing pointer means no prior backup: the
/// path is returned without creating a file, and opening it starts a
/// fresh database.
pub async fn fetch_metadata_db(
    store: &dyn ChunkStore,
    keys: &KeyBundle,
    temp_dir: &Path,
) -> CofferResult<PathBuf> {
    let db_path = temp_dir.join("metadb");

    let pointer_ciphertext = match store.read(META_KEY).await {
        Ok(ciphertext) => ciphertext,
        Err(e) if e.is_not_found() => {
            debug!("no bootstrap pointer in chunk store; starting a fresh metadata database");
            return Ok(db_path);
        }
        Err(e) => return Err(e),
    };

    // The pointer carries no MAC; empty key and tag skip verification.
    let pointer_plaintext = cipher::decrypt(
        keys.encryption(),
        &[],
        &META_IV,
        &pointer_ciphertext,
        &[],
    )?;
    let entry = decode_entry(&pointer_plaintext)?;

    let mut zipped = Vec::with_capacity(entry.bytes as usize);
    decrypt_chunks(store, keys, &entry, &mut zipped).await?;

    let mut db_bytes = Vec::new();
    GzDecoder::new(zipped.as_slice()).read_to_end(&mut db_bytes)?;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(&db_path)?;
    file.write_all(&db_bytes)?;

    info!(bytes = db_bytes.len(), chunks = entry.chunks.len(), "fetched metadata database");
    Ok(db_path)
}

/// Gzip, chunk-encrypt, and store the metadata database file, then
/// commit the run by writing the pointer blob. Must only be called
/// after the database has been closed.
pub async fn upload_metadata_db(
    store: &dyn ChunkStore,
    keys: &KeyBundle,
    ivs: &mut dyn IvSource,
    db_path: &Path,
    chunk_size: usize,
) -> CofferResult<()> {
    let db_bytes = std::fs::read(db_path)?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&db_bytes)?;
    let zipped = encoder.finish()?;
    let zipped_len = zipped.len() as u64;

    let mut stats = BackupStats::default();
    let chunks = encrypt_reader(
        store,
        keys,
        ivs,
        chunk_size,
        zipped.as_slice(),
        zipped_len,
        None,
        &mut stats,
    )
    .await?;

    let entry = Entry {
        bytes: zipped_len,
        chunks,
        mode: 0o600,
        user: String::new(),
        group: String::new(),
    };
    let encoded = encode_entry(&entry)?;
    let (pointer_ciphertext, _) = cipher::encrypt(
        keys.encryption(),
        keys.authentication(),
        &META_IV,
        &encoded,
        chunk_size,
    )?;
    store.save(META_KEY, pointer_ciphertext).await?;

    info!(
        db_bytes = db_bytes.len(),
        zipped_bytes = zipped_len,
        chunks = entry.chunks.len(),
        "uploaded metadata database"
    );
    Ok(())
}
