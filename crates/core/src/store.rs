use crate::result::SessionRecord;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Where finished interviews go. Returns an identifier for the saved record.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save(&self, record: &SessionRecord) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub id: String,
    #[serde(flatten)]
    pub record: SessionRecord,
}

/// Keeps one pretty-printed JSON file per session in a directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    pub async fn load(&self, id: &str) -> Result<StoredSession> {
        let path = self.path_for(id);
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read session file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse session file: {}", path.display()))
    }

    /// All stored sessions, newest first. Unreadable files are skipped with a warning.
    pub async fn list(&self) -> Result<Vec<StoredSession>> {
        let mut sessions = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(sessions),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read sessions directory: {}", self.dir.display())
                });
            }
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match self.load(id).await {
                Ok(session) => sessions.push(session),
                Err(e) => tracing::warn!("Skipping unreadable session file: {:?}", e),
            }
        }

        sessions.sort_by(|a, b| b.record.completed_at.cmp(&a.record.completed_at));
        Ok(sessions)
    }

    /// Highest overall score first; ties go to the more recent session.
    pub async fn leaderboard(&self, limit: usize) -> Result<Vec<StoredSession>> {
        let mut sessions = self.list().await?;
        sessions.sort_by(|a, b| {
            b.record
                .overall_score
                .cmp(&a.record.overall_score)
                .then_with(|| b.record.completed_at.cmp(&a.record.completed_at))
        });
        sessions.truncate(limit);
        Ok(sessions)
    }
}

#[async_trait]
impl SessionStore for JsonFileStore {
    async fn save(&self, record: &SessionRecord) -> Result<String> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create sessions directory: {}", self.dir.display()))?;

        let stored = StoredSession {
            id: Uuid::new_v4().to_string(),
            record: record.clone(),
        };
        let path = self.path_for(&stored.id);
        let json = serde_json::to_string_pretty(&stored)?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write session file: {}", path.display()))?;

        tracing::info!("Saved interview session {} to {}", stored.id, path.display());
        Ok(stored.id)
    }
}
