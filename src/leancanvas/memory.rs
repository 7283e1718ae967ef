//! Conversation history per thread (one thread per canvas id).
//!
//! History lives in memory and, when a directory is configured, is mirrored to one JSON file
//! per thread so conversations survive a restart.

use crate::leancanvas::client_wrapper::{Message, Role};
use crate::leancanvas::stream_event::{UiMessage, UiRole};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

#[derive(Debug)]
pub enum StorageError {
    Io(std::io::Error),
    Serde(serde_json::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io(e) => write!(f, "storage I/O error: {}", e),
            StorageError::Serde(e) => write!(f, "storage encoding error: {}", e),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(e) => Some(e),
            StorageError::Serde(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serde(e)
    }
}

/// Write `bytes` to `path` through a sibling temp file so readers never see a partial file.
pub(crate) async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let tmp = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4()));
    let written = match tokio::fs::write(&tmp, bytes).await {
        Ok(()) => tokio::fs::rename(&tmp, path).await,
        Err(e) => Err(e),
    };
    if written.is_err() {
        let _ = tokio::fs::remove_file(&tmp).await;
    }
    Ok(written?)
}

/// One stored conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ThreadMessage {
    pub fn new(id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn to_message(&self) -> Message {
        Message::new(self.role, self.content.clone())
    }

    pub fn to_ui_message(&self) -> UiMessage {
        let role = match self.role {
            Role::System => UiRole::System,
            Role::User => UiRole::User,
            Role::Assistant => UiRole::Assistant,
        };
        UiMessage::text(self.id.clone(), role, self.content.clone())
    }
}

/// Thread id → ordered messages.
#[derive(Debug, Default)]
pub struct ThreadStore {
    threads: RwLock<HashMap<String, Vec<ThreadMessage>>>,
    dir: Option<PathBuf>,
}

impl ThreadStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Mirror threads to `<dir>/<thread>.json`, with the thread id percent-encoded.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            threads: RwLock::new(HashMap::new()),
            dir: Some(dir.into()),
        }
    }

    fn thread_path(&self, thread_id: &str) -> Option<PathBuf> {
        let file = urlencoding::encode(thread_id);
        self.dir.as_ref().map(|dir| dir.join(format!("{}.json", file)))
    }

    async fn load_from_disk(&self, thread_id: &str) -> Vec<ThreadMessage> {
        let Some(path) = self.thread_path(thread_id) else {
            return Vec::new();
        };
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                log::warn!("memory: ignoring unreadable thread file {}: {}", path.display(), e);
                Vec::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                log::warn!("memory: could not read {}: {}", path.display(), e);
                Vec::new()
            }
        }
    }

    /// Messages of `thread_id` in order; empty when the thread does not exist.
    pub async fn history(&self, thread_id: &str) -> Vec<ThreadMessage> {
        if let Some(messages) = self.threads.read().await.get(thread_id) {
            return messages.clone();
        }
        let mut threads = self.threads.write().await;
        if let Some(messages) = threads.get(thread_id) {
            return messages.clone();
        }
        let loaded = self.load_from_disk(thread_id).await;
        if !loaded.is_empty() {
            threads.insert(thread_id.to_string(), loaded.clone());
        }
        loaded
    }

    pub async fn append(
        &self,
        thread_id: &str,
        messages: Vec<ThreadMessage>,
    ) -> Result<(), StorageError> {
        // The write lock is held until the file is replaced so concurrent turns serialize.
        let mut threads = self.threads.write().await;
        let mut thread = match threads.get(thread_id) {
            Some(existing) => existing.clone(),
            None => self.load_from_disk(thread_id).await,
        };
        thread.extend(messages);

        if let Some(path) = self.thread_path(thread_id) {
            let bytes = serde_json::to_vec_pretty(&thread)?;
            write_atomically(&path, &bytes).await?;
        }
        threads.insert(thread_id.to_string(), thread);
        Ok(())
    }

    pub async fn clear(&self, thread_id: &str) -> Result<(), StorageError> {
        let mut threads = self.threads.write().await;
        if let Some(path) = self.thread_path(thread_id) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        threads.remove(thread_id);
        Ok(())
    }
}
