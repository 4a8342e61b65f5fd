//! The persistent path → entry index.
//!
//! Layout: one redb table per directory bucket. The root bucket is the
//! table named `"."`; the bucket for path `a/b` is the table named
//! `a/b`. Within a bucket, file entries are keyed by basename and the
//! directory's own entry sits under the reserved key `"."`. A bucket
//! exists for every directory referenced on some stored file's path,
//! whether or not its self-entry was recorded.
//!
//! `put` runs in a single write transaction; the commit is the atomic
//! unit the engine relies on. `get` resolves a path to itself, to a
//! whole subtree, or to NotFound, and always folds in the self-entries
//! of any ancestors it walked through.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};

use redb::{Database, ReadTransaction, ReadableTable, TableDefinition, TableHandle};

use coffer_core::{CofferError, CofferResult};

use crate::entry::{decode_entry, encode_entry, Entry};

/// Name of the root bucket and of every self-entry key.
const ROOT: &str = ".";

fn bucket(name: &str) -> TableDefinition<'_, &'static str, &'static [u8]> {
    TableDefinition::new(name)
}

pub struct MetaDb {
    db: Database,
    path: PathBuf,
}

impl MetaDb {
    /// Open or create the index database at `path`.
    pub fn open(path: &Path) -> CofferResult<Self> {
        let db = Database::create(path).map_err(CofferError::index)?;
        Ok(MetaDb {
            db,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store `entry` under `path`, creating intermediate buckets as
    /// needed. Returns the bucket paths created by this call, in
    /// creation order, excluding the final path segment.
    pub fn put(&self, path: &str, entry: &Entry) -> CofferResult<Vec<String>> {
        let encoded = encode_entry(entry)
            .map_err(|e| CofferError::Index(format!("entry for path {path:?}: {e}")))?;

        let txn = self.db.begin_write().map_err(CofferError::index)?;
        let mut existing: BTreeSet<String> = txn
            .list_tables()
            .map_err(CofferError::index)?
            .map(|t| t.name().to_string())
            .collect();

        let mut created = Vec::new();
        {
            // Opening a table creates it; the handle is dropped at once
            // so the final open below never sees it borrowed.
            txn.open_table(bucket(ROOT)).map_err(CofferError::index)?;

            let parts: Vec<&str> = path.split('/').collect();
            let (last, dirs) = parts.split_last().expect("split always yields a segment");

            let mut bucket_path = String::new();
            for part in dirs {
                if !bucket_path.is_empty() {
                    bucket_path.push('/');
                }
                bucket_path.push_str(part);
                if existing.insert(bucket_path.clone()) {
                    created.push(bucket_path.clone());
                }
                txn.open_table(bucket(&bucket_path))
                    .map_err(CofferError::index)?;
            }

            let parent = if dirs.is_empty() { ROOT } else { bucket_path.as_str() };
            let mut table = txn.open_table(bucket(parent)).map_err(CofferError::index)?;
            table
                .insert(*last, encoded.as_slice())
                .map_err(CofferError::index)?;
        }
        txn.commit().map_err(CofferError::index)?;

        Ok(created)
    }

    /// Fetch the entry stored exactly at `path`, if any. Cheap lookup
    /// used by the engine's reuse check; subtree queries go via [`get`].
    ///
    /// [`get`]: MetaDb::get
    pub fn get_entry(&self, path: &str) -> CofferResult<Option<Entry>> {
        let txn = self.db.begin_read().map_err(CofferError::index)?;
        let names = table_names(&txn)?;

        let parts: Vec<&str> = path.split('/').collect();
        let (last, dirs) = parts.split_last().expect("split always yields a segment");
        let parent = if dirs.is_empty() {
            ROOT.to_string()
        } else {
            dirs.join("/")
        };
        if !names.contains(&parent) {
            return Ok(None);
        }

        let table = txn.open_table(bucket(&parent)).map_err(CofferError::index)?;
        match table.get(*last).map_err(CofferError::index)? {
            Some(guard) => Ok(Some(decode_entry(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Resolve `path` to a map of index paths to entries.
    ///
    /// - an exact file: that entry alone (plus ancestor self-entries);
    /// - a directory: its self-entry (if recorded) and every descendant;
    /// - `"."`: everything reachable from the root;
    /// - otherwise: NotFound.
    pub fn get(&self, path: &str) -> CofferResult<BTreeMap<String, Entry>> {
        let txn = self.db.begin_read().map_err(CofferError::index)?;
        let names = table_names(&txn)?;
        if !names.contains(ROOT) {
            return Err(CofferError::Index("no root bucket".to_string()));
        }

        let mut out = BTreeMap::new();

        if path == ROOT {
            self.walk(&txn, ROOT, &names, &mut out)?;
            return Ok(out);
        }

        let parts: Vec<&str> = path.split('/').collect();
        let (last, dirs) = parts.split_last().expect("split always yields a segment");

        // Walk the ancestor buckets, collecting their self-entries.
        let mut bucket_path = String::new();
        for part in dirs {
            if !bucket_path.is_empty() {
                bucket_path.push('/');
            }
            bucket_path.push_str(part);
            if !names.contains(&bucket_path) {
                return Err(CofferError::NotFound(format!("no bucket {bucket_path}")));
            }
            let table = txn
                .open_table(bucket(&bucket_path))
                .map_err(CofferError::index)?;
            if let Some(guard) = table.get(ROOT).map_err(CofferError::index)? {
                out.insert(bucket_path.clone(), decode_entry(guard.value())?);
            }
        }

        let parent = if dirs.is_empty() { ROOT } else { bucket_path.as_str() };
        let table = txn.open_table(bucket(parent)).map_err(CofferError::index)?;
        if let Some(guard) = table.get(*last).map_err(CofferError::index)? {
            out.insert(path.to_string(), decode_entry(guard.value())?);
            return Ok(out);
        }
        drop(table);

        // Not a stored entry; maybe a directory bucket.
        if names.contains(path) {
            self.walk(&txn, path, &names, &mut out)?;
            Ok(out)
        } else {
            Err(CofferError::NotFound(format!("could not find {path:?}")))
        }
    }

    /// Breadth-first enumeration of a bucket subtree into `out`. Within
    /// each bucket, entries come out in the index's natural key order;
    /// a bucket's self-entry is reported under the bucket path itself.
    fn walk(
        &self,
        txn: &ReadTransaction,
        start: &str,
        names: &BTreeSet<String>,
        out: &mut BTreeMap<String, Entry>,
    ) -> CofferResult<()> {
        let mut to_visit = VecDeque::new();
        to_visit.push_back(start.to_string());

        while let Some(bucket_path) = to_visit.pop_front() {
            let table = txn
                .open_table(bucket(&bucket_path))
                .map_err(CofferError::index)?;
            for item in table.iter().map_err(CofferError::index)? {
                let (key, value) = item.map_err(CofferError::index)?;
                let key = key.value();
                let result_path = if key == ROOT {
                    bucket_path.clone()
                } else if bucket_path == ROOT {
                    key.to_string()
                } else {
                    format!("{bucket_path}/{key}")
                };
                out.insert(result_path, decode_entry(value.value())?);
            }
            for child in child_buckets(&bucket_path, names) {
                to_visit.push_back(child);
            }
        }
        Ok(())
    }
}

fn table_names(txn: &ReadTransaction) -> CofferResult<BTreeSet<String>> {
    Ok(txn
        .list_tables()
        .map_err(CofferError::index)?
        .map(|t| t.name().to_string())
        .collect())
}

/// Direct child buckets of `parent`: table names one path segment below.
fn child_buckets(parent: &str, names: &BTreeSet<String>) -> Vec<String> {
    names
        .iter()
        .filter(|name| {
            let name = name.as_str();
            if parent == ROOT {
                name != ROOT && !name.contains('/')
            } else {
                name.strip_prefix(parent)
                    .and_then(|rest| rest.strip_prefix('/'))
                    .is_some_and(|rest| !rest.contains('/'))
            }
        })
        .cloned()
        .collect()
}
