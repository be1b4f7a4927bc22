use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{KeyValueStore, StoreError};

/// JSON file holding every key, rewritten in full on each write.
///
/// Writes go to a sibling temp file that is renamed over the original, so a
/// crash mid-write leaves the previous contents intact. The in-memory copy
/// only takes a new value once the file write succeeded.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let values = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                StoreError::Unavailable(format!("{} is not a valid store: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        StoreError::Unavailable(format!("cannot create {}: {e}", parent.display()))
                    })?;
                }
                info!(path = %path.display(), "creating new store");
                BTreeMap::new()
            }
            Err(e) => {
                return Err(StoreError::Unavailable(format!(
                    "cannot read {}: {e}",
                    path.display()
                )))
            }
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_file(&self, values: &BTreeMap<String, String>) -> std::io::Result<()> {
        let json = serde_json::to_vec_pretty(values)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.set_many(&[(key.to_string(), value.to_string())]).await
    }

    async fn set_many(&self, entries: &[(String, String)]) -> Result<(), StoreError> {
        let mut values = self.values.lock().await;
        let mut next = values.clone();
        next.extend(entries.iter().cloned());
        self.write_file(&next).await.map_err(|e| StoreError::Write {
            key: entries
                .iter()
                .map(|(key, _)| key.as_str())
                .collect::<Vec<_>>()
                .join(","),
            reason: e.to_string(),
        })?;
        *values = next;
        debug!(?entries, "store updated");
        Ok(())
    }
}
