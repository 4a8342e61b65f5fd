//! Chunkspec parsing: `local:DIR` or `gcs:JSON:BUCKET`.

use std::path::Path;

use coffer_core::{CofferError, CofferResult};

use crate::OpendalStore;

/// Build a chunk store from a chunkspec string.
pub fn open_chunkspec(spec: &str) -> CofferResult<OpendalStore> {
    if let Some(dir) = spec.strip_prefix("local:") {
        if dir.is_empty() {
            return Err(CofferError::Usage(
                "local chunk spec must be of form local:/path/to/directory".to_string(),
            ));
        }
        OpendalStore::local(Path::new(dir))
    } else if let Some(rest) = spec.strip_prefix("gcs:") {
        let (credential_path, bucket) = rest.split_once(':').ok_or_else(|| {
            CofferError::Usage("gcs chunk spec must be of form gcs:json-keyfile:bucket".to_string())
        })?;
        if credential_path.is_empty() || bucket.is_empty() {
            return Err(CofferError::Usage(
                "gcs chunk spec must be of form gcs:json-keyfile:bucket".to_string(),
            ));
        }
        OpendalStore::gcs(credential_path, bucket)
    } else {
        Err(CofferError::Usage(format!(
            "chunk spec {spec:?} must be of form local:DIR or gcs:JSON:BUCKET"
        )))
    }
}
