//! The encryption pipeline: tree walk → chunk → encrypt → store → index.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

use coffer_core::{path_key, CofferResult};
use coffer_crypto::{cipher, IvSource, KeyBundle};
use coffer_chunks::Chunker;
use coffer_meta::{ChunkRef, Entry, MetaDb};
use coffer_store::ChunkStore;

use crate::owner;

/// Whether unchanged chunks may be recognized and left un-uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReuploadPolicy {
    /// Re-encrypt each chunk under the prior entry's IV first; when the
    /// tag matches the prior tag the chunk is reused without a store
    /// write. CBC is deterministic under a fixed (key, IV), so a tag
    /// match proves the plaintext is unchanged.
    ReuseUnchanged,
    /// Always draw a fresh IV and store every chunk (`--reupload`).
    AlwaysUpload,
}

#[derive(Debug, Default)]
pub struct BackupStats {
    pub files: usize,
    pub chunks_stored: usize,
    pub chunks_reused: usize,
    pub bytes: u64,
}

/// Encrypt every regular file reachable under `root` and record the
/// results in the metadata index.
///
/// `root` is a relative path; entries are keyed by the walk path. A
/// basename listed in `excludes` skips that file, or the whole subtree
/// when it names a directory (including `root` itself).
pub async fn encrypt_tree(
    store: &dyn ChunkStore,
    db: &MetaDb,
    keys: &KeyBundle,
    ivs: &mut dyn IvSource,
    root: &Path,
    chunk_size: usize,
    excludes: &HashSet<String>,
    policy: ReuploadPolicy,
) -> CofferResult<BackupStats> {
    let mut stats = BackupStats::default();

    if excludes.contains(&base_name(root)) {
        debug!(root = %root.display(), "root is excluded; nothing to do");
        return Ok(stats);
    }

    let meta = std::fs::metadata(root)?;
    let mut files = Vec::new();
    if meta.is_dir() {
        collect_files(root, excludes, &mut files)?;
        files.sort();
    } else {
        files.push(root.to_path_buf());
    }

    for path in &files {
        encrypt_path(store, db, keys, ivs, chunk_size, policy, path, &mut stats).await?;
    }

    info!(
        files = stats.files,
        chunks_stored = stats.chunks_stored,
        chunks_reused = stats.chunks_reused,
        bytes = stats.bytes,
        "encryption run complete"
    );
    Ok(stats)
}

/// Recursively collect regular files under `dir`, skipping excluded
/// basenames (directories prune their whole subtree).
fn collect_files(
    dir: &Path,
    excludes: &HashSet<String>,
    out: &mut Vec<PathBuf>,
) -> CofferResult<()> {
    for dirent in std::fs::read_dir(dir)? {
        let dirent = dirent?;
        let name = dirent.file_name().to_string_lossy().into_owned();
        if excludes.contains(&name) {
            continue;
        }
        let file_type = dirent.file_type()?;
        if file_type.is_dir() {
            collect_files(&dirent.path(), excludes, out)?;
        } else if file_type.is_file() {
            out.push(dirent.path());
        } else {
            warn!(path = %dirent.path().display(), "skipping non-regular file");
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn encrypt_path(
    store: &dyn ChunkStore,
    db: &MetaDb,
    keys: &KeyBundle,
    ivs: &mut dyn IvSource,
    chunk_size: usize,
    policy: ReuploadPolicy,
    path: &Path,
    stats: &mut BackupStats,
) -> CofferResult<()> {
    let key = path_key(path);
    let meta = std::fs::metadata(path)?;

    let prior = match policy {
        ReuploadPolicy::ReuseUnchanged => db.get_entry(&key)?,
        ReuploadPolicy::AlwaysUpload => None,
    };

    let file = File::open(path)?;
    let before_stored = stats.chunks_stored;
    let before_reused = stats.chunks_reused;
    let chunks = encrypt_reader(
        store,
        keys,
        ivs,
        chunk_size,
        file,
        meta.len(),
        prior.as_ref().map(|e| e.chunks.as_slice()),
        stats,
    )
    .await?;

    let entry = make_entry(&meta, chunks);
    let created = db.put(&key, &entry)?;
    for dir in created {
        let dir_meta = std::fs::metadata(&dir)?;
        let dir_entry = make_entry(&dir_meta, Vec::new());
        db.put(&format!("{dir}/."), &dir_entry)?;
    }

    stats.files += 1;
    stats.bytes += entry.bytes;
    info!(
        path = %path.display(),
        bytes = entry.bytes,
        stored = stats.chunks_stored - before_stored,
        reused = stats.chunks_reused - before_reused,
        "encrypted"
    );
    Ok(())
}

/// Chunk-encrypt `total` bytes from `reader` and store each ciphertext
/// under its tag. With `prior` chunks available, an i-th chunk that
/// re-encrypts under the prior IV to the prior tag is reused verbatim
/// and not stored again.
#[allow(clippy::too_many_arguments)]
pub async fn encrypt_reader<R: Read + Send>(
    store: &dyn ChunkStore,
    keys: &KeyBundle,
    ivs: &mut dyn IvSource,
    chunk_size: usize,
    reader: R,
    total: u64,
    prior: Option<&[ChunkRef]>,
    stats: &mut BackupStats,
) -> CofferResult<Vec<ChunkRef>> {
    let mut chunks = Vec::new();

    for (index, step) in Chunker::new(reader, chunk_size, total).enumerate() {
        let chunk = step?;

        if let Some(prev) = prior.and_then(|p| p.get(index)) {
            let (_, tag_try) = cipher::encrypt(
                keys.encryption(),
                keys.authentication(),
                &prev.iv,
                &chunk.data,
                chunk_size,
            )?;
            if bool::from(tag_try.ct_eq(&prev.tag)) {
                debug!(index, address = %prev.address(), "chunk unchanged; reusing");
                chunks.push(prev.clone());
                stats.chunks_reused += 1;
                continue;
            }
        }

        let iv = ivs.next_iv()?;
        let (ciphertext, tag) = cipher::encrypt(
            keys.encryption(),
            keys.authentication(),
            &iv,
            &chunk.data,
            chunk_size,
        )?;
        store.save(&hex::encode(tag), ciphertext).await?;
        chunks.push(ChunkRef { iv, tag });
        stats.chunks_stored += 1;
    }

    Ok(chunks)
}

/// Build an entry from filesystem attributes. Owner names that cannot
/// be resolved are recorded as empty rather than failing the run.
fn make_entry(meta: &std::fs::Metadata, chunks: Vec<ChunkRef>) -> Entry {
    use std::os::unix::fs::MetadataExt;

    let user = owner::user_name(meta.uid()).unwrap_or_else(|e| {
        warn!(uid = meta.uid(), "could not resolve owning user: {e}");
        String::new()
    });
    let group = owner::group_name(meta.gid()).unwrap_or_else(|e| {
        warn!(gid = meta.gid(), "could not resolve owning group: {e}");
        String::new()
    });

    Entry {
        bytes: if meta.is_dir() { 0 } else { meta.len() },
        chunks,
        mode: meta.mode(),
        user,
        group,
    }
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
