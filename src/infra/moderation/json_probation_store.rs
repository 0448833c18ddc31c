use crate::core::moderation::{Member, PersistenceError, ProbationStore};
use async_trait::async_trait;
use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// JSON file store for the probation registry. The file is a flat list:
/// [ { id, joined_at, state, clean_message_count }, ... ]
///
/// Saves go to a sibling `.tmp` file that is synced and then renamed over
/// the real one, so a crash mid-write leaves the previous file intact.
/// An unreadable file is quarantined as `<name>.corrupt-<timestamp>`.
pub struct JsonProbationStore {
    path: PathBuf,
}

impl JsonProbationStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn temp_path(&self) -> PathBuf {
        self.sibling(".tmp")
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "probation.json".into());
        name.push(suffix);
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl ProbationStore for JsonProbationStore {
    async fn load(&self) -> Result<Vec<Member>, PersistenceError> {
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PersistenceError::StorageError(e.to_string())),
        };

        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&text).map_err(|e| PersistenceError::Corrupt(e.to_string()))
    }

    async fn save(&self, members: &[Member]) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| PersistenceError::StorageError(e.to_string()))?;
            }
        }

        let text = serde_json::to_vec_pretty(members)
            .map_err(|e| PersistenceError::StorageError(e.to_string()))?;

        let tmp = self.temp_path();
        let mut file = fs::File::create(&tmp)
            .await
            .map_err(|e| PersistenceError::StorageError(e.to_string()))?;
        file.write_all(&text)
            .await
            .map_err(|e| PersistenceError::StorageError(e.to_string()))?;
        file.sync_all()
            .await
            .map_err(|e| PersistenceError::StorageError(e.to_string()))?;
        drop(file);

        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| PersistenceError::StorageError(e.to_string()))
    }

    async fn quarantine(&self) -> Result<(), PersistenceError> {
        let aside = self.sibling(&format!(".corrupt-{}", Utc::now().format("%Y%m%dT%H%M%S%.3f")));

        match fs::rename(&self.path, &aside).await {
            Ok(()) => {
                tracing::warn!(
                    "Moved unreadable probation file to {}",
                    aside.display()
                );
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PersistenceError::StorageError(e.to_string())),
        }
    }
}
