//! The decryption pipeline: index lookup → fetch → decrypt → rebuild.

use std::io::Write;
use std::path::Path;

use tracing::{debug, info};

use coffer_core::{CofferError, CofferResult};
use coffer_crypto::{cipher, KeyBundle};
use coffer_meta::{Entry, MetaDb};
use coffer_store::ChunkStore;

use crate::owner;

#[derive(Debug, Default)]
pub struct RestoreStats {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
}

/// Restore `target` (a file, a directory subtree, or `"."`) from the
/// metadata index into the current working directory.
///
/// Entry paths sort lexicographically, which puts every directory before
/// its contents; directories are created with their recorded mode if
/// absent, files are written atomically via a temp file in `scratch`
/// renamed into place. Mode application is required; ownership is
/// best-effort.
pub async fn decrypt_tree(
    store: &dyn ChunkStore,
    db: &MetaDb,
    keys: &KeyBundle,
    target: &str,
    scratch: &Path,
) -> CofferResult<RestoreStats> {
    let entries = db.get(target)?;
    let mut stats = RestoreStats::default();

    // BTreeMap iteration is already in lexicographic path order.
    for (path, entry) in &entries {
        if entry.is_dir() {
            let dir = Path::new(path);
            if !owner::path_exists(dir) {
                std::fs::create_dir(dir)?;
                set_permissions(dir, entry)?;
                owner::apply_owner(dir, path, entry);
                stats.directories += 1;
            }
        } else {
            restore_file(store, keys, entry, scratch, path).await?;
            stats.files += 1;
            stats.bytes += entry.bytes;
        }
    }

    info!(
        path = target,
        files = stats.files,
        directories = stats.directories,
        bytes = stats.bytes,
        "restore complete"
    );
    Ok(stats)
}

async fn restore_file(
    store: &dyn ChunkStore,
    keys: &KeyBundle,
    entry: &Entry,
    scratch: &Path,
    target: &str,
) -> CofferResult<()> {
    let mut tmp = tempfile::Builder::new()
        .prefix(&base_name(target))
        .tempfile_in(scratch)?;

    decrypt_chunks(store, keys, entry, tmp.as_file_mut()).await?;

    set_permissions(tmp.path(), entry)?;
    owner::apply_owner(tmp.path(), target, entry);
    tmp.persist(target).map_err(|e| CofferError::Io(e.error))?;

    debug!(path = target, bytes = entry.bytes, "restored");
    Ok(())
}

/// Decrypt `entry`'s chunks in order into `out`, truncating the final
/// chunk's zero padding using the entry's recorded byte length.
pub async fn decrypt_chunks(
    store: &dyn ChunkStore,
    keys: &KeyBundle,
    entry: &Entry,
    out: &mut (impl Write + Send),
) -> CofferResult<()> {
    let mut written: u64 = 0;

    for chunk in &entry.chunks {
        let ciphertext = store.read(&chunk.address()).await?;
        let mut plaintext = cipher::decrypt(
            keys.encryption(),
            keys.authentication(),
            &chunk.iv,
            &ciphertext,
            &chunk.tag,
        )?;
        if written + plaintext.len() as u64 > entry.bytes {
            plaintext.truncate((entry.bytes - written) as usize);
        }
        out.write_all(&plaintext)?;
        written += plaintext.len() as u64;
    }
    Ok(())
}

fn set_permissions(path: &Path, entry: &Entry) -> CofferResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(entry.permissions()))?;
    Ok(())
}

fn base_name(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}
