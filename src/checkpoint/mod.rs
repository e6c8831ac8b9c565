//! Checkpoint persistence
//!
//! A checkpoint is written after every fully completed attempt via a
//! temp-file-plus-rename, so the file on disk is always internally
//! consistent: `attempts.len() == iteration`, no partial attempts.
//! Unknown fields are ignored on read and optional fields default, so
//! older binaries can resume newer files.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

use crate::controller::{Attempt, TerminalState};
use crate::error::{Error, Result};

/// Serializable snapshot of a run after a completed attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run_id: String,
    pub goal: String,
    pub attempts: Vec<Attempt>,
    pub iteration: u32,
    #[serde(default)]
    pub terminal: TerminalState,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// Storage backend for checkpoints.
#[async_trait]
pub trait CheckpointStorage: Send + Sync {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()>;
    async fn load(&self, run_id: &str) -> Result<Option<Checkpoint>>;
    async fn list(&self) -> Result<Vec<String>>;
}

/// File-based checkpoint storage, one JSON file per run.
pub struct FileCheckpointStorage {
    base_path: PathBuf,
}

impl FileCheckpointStorage {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn checkpoint_path(&self, run_id: &str) -> PathBuf {
        self.base_path.join(format!("{run_id}.json"))
    }
}

#[async_trait]
impl CheckpointStorage for FileCheckpointStorage {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        fs::create_dir_all(&self.base_path).await?;

        let json = serde_json::to_string_pretty(checkpoint)?;
        let path = self.checkpoint_path(&checkpoint.run_id);

        // Write-then-rename keeps the visible file consistent even if the
        // process dies mid-write.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &path).await?;

        debug!(
            "checkpoint written: iteration {} of run {}",
            checkpoint.iteration, checkpoint.run_id
        );
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<Option<Checkpoint>> {
        let path = self.checkpoint_path(run_id);
        if !path.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(&path).await?;
        let checkpoint = serde_json::from_str(&json).map_err(|e| {
            Error::Checkpoint(format!("unreadable checkpoint {}: {e}", path.display()))
        })?;
        Ok(Some(checkpoint))
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut runs = Vec::new();
        if !self.base_path.exists() {
            return Ok(runs);
        }

        let mut entries = fs::read_dir(&self.base_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    runs.push(stem.to_string());
                }
            }
        }
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::RunState;
    use tempfile::TempDir;

    fn checkpoint_fixture() -> Checkpoint {
        let mut state = RunState::new("find the first 5 primes");
        state.record(Attempt::unexecuted(1, None, "proposal-failed"));
        state.to_checkpoint(TerminalState::InProgress)
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let storage = FileCheckpointStorage::new(dir.path().to_path_buf());
        let checkpoint = checkpoint_fixture();

        storage.save(&checkpoint).await.unwrap();
        let loaded = storage.load(&checkpoint.run_id).await.unwrap().unwrap();

        assert_eq!(loaded.run_id, checkpoint.run_id);
        assert_eq!(loaded.iteration, 1);
        assert_eq!(loaded.attempts.len(), 1);
        assert_eq!(loaded.terminal, TerminalState::InProgress);
    }

    #[tokio::test]
    async fn test_load_missing_returns_none() {
        let dir = TempDir::new().unwrap();
        let storage = FileCheckpointStorage::new(dir.path().to_path_buf());
        assert!(storage.load("run-nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreadable_checkpoint_is_an_error() {
        let dir = TempDir::new().unwrap();
        let storage = FileCheckpointStorage::new(dir.path().to_path_buf());
        tokio::fs::create_dir_all(dir.path()).await.unwrap();
        tokio::fs::write(dir.path().join("run-bad.json"), "{ not json")
            .await
            .unwrap();

        let result = storage.load("run-bad").await;
        assert!(matches!(result, Err(Error::Checkpoint(_))));
    }

    #[tokio::test]
    async fn test_forward_compatibility_ignores_unknown_fields() {
        let dir = TempDir::new().unwrap();
        let storage = FileCheckpointStorage::new(dir.path().to_path_buf());

        let mut value = serde_json::to_value(checkpoint_fixture()).unwrap();
        value["future_field"] = serde_json::json!({"nested": true});
        let run_id = value["run_id"].as_str().unwrap().to_string();
        tokio::fs::write(
            dir.path().join(format!("{run_id}.json")),
            serde_json::to_string(&value).unwrap(),
        )
        .await
        .unwrap();

        let loaded = storage.load(&run_id).await.unwrap().unwrap();
        assert_eq!(loaded.iteration, 1);
    }

    #[tokio::test]
    async fn test_list_returns_saved_runs() {
        let dir = TempDir::new().unwrap();
        let storage = FileCheckpointStorage::new(dir.path().to_path_buf());
        let checkpoint = checkpoint_fixture();
        storage.save(&checkpoint).await.unwrap();

        let runs = storage.list().await.unwrap();
        assert_eq!(runs, vec![checkpoint.run_id]);
    }
}
