use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::RwLock,
};

use {tokio::sync::Mutex, tracing::warn};

use crate::error::{Context, Result};

/// Write-through, JSON file-backed map of opaque user id → canonical phone id.
///
/// Entries never expire. The file is rewritten only when a mapping changes,
/// and writes are serialized so the file always reflects the latest map.
pub struct IdentityCache {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
    writer: Mutex<()>,
}

impl IdentityCache {
    /// Load the cache from disk. A missing file yields an empty cache; a
    /// corrupt one is logged and replaced on the next write.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "identity cache unreadable, starting empty");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            entries: RwLock::new(entries),
            writer: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, opaque: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(opaque)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record a mapping and persist it. Returns `false` when the mapping was
    /// already present with the same value (no write happens).
    ///
    /// On a persistence error the mapping stays in memory.
    pub async fn set(&self, opaque: &str, canonical: &str) -> Result<bool> {
        let _guard = self.writer.lock().await;
        let snapshot = {
            let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
            if entries.get(opaque).is_some_and(|v| v == canonical) {
                return Ok(false);
            }
            entries.insert(opaque.to_string(), canonical.to_string());
            serde_json::to_string_pretty(&*entries)?
        };
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &snapshot))
            .await
            .context("identity cache writer panicked")??;
        Ok(true)
    }
}

fn write_atomic(path: &Path, data: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
