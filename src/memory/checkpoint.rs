//! Durability hook for conversation threads.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::ParleyError;
use crate::types::Message;

/// Persists a thread's full history after each committed turn.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    async fn save(&self, thread_id: &str, messages: &[Message]) -> Result<(), ParleyError>;

    async fn load(&self, thread_id: &str) -> Result<Option<Vec<Message>>, ParleyError>;
}

/// Keeps nothing; threads live only in memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCheckpointer;

#[async_trait]
impl Checkpointer for NoopCheckpointer {
    async fn save(&self, _thread_id: &str, _messages: &[Message]) -> Result<(), ParleyError> {
        Ok(())
    }

    async fn load(&self, _thread_id: &str) -> Result<Option<Vec<Message>>, ParleyError> {
        Ok(None)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ThreadFile {
    thread_id: String,
    saved_at: DateTime<Utc>,
    messages: Vec<Message>,
}

/// One JSON file per thread under a directory.
#[derive(Debug, Clone)]
pub struct JsonFileCheckpointer {
    base_path: PathBuf,
}

impl JsonFileCheckpointer {
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self, ParleyError> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn thread_path(&self, thread_id: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", file_stem(thread_id)))
    }
}

/// Filesystem-safe, collision-free stem for a thread id.
fn file_stem(thread_id: &str) -> String {
    let mut out = String::with_capacity(thread_id.len());
    for byte in thread_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

#[async_trait]
impl Checkpointer for JsonFileCheckpointer {
    async fn save(&self, thread_id: &str, messages: &[Message]) -> Result<(), ParleyError> {
        let path = self.thread_path(thread_id);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(&ThreadFile {
            thread_id: thread_id.to_string(),
            saved_at: Utc::now(),
            messages: messages.to_vec(),
        })?;

        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<Option<Vec<Message>>, ParleyError> {
        let path = self.thread_path(thread_id);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let file: ThreadFile = serde_json::from_str(&content)?;
        Ok(Some(file.messages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn file_stem_escapes_separators() {
        assert_eq!(file_stem("t1"), "t1");
        assert_eq!(file_stem("a/b c"), "a%2Fb%20c");
        assert_ne!(file_stem("a/b"), file_stem("a_b"));
    }

    #[tokio::test]
    async fn json_checkpoint_round_trips_thread_history() {
        let dir = tempfile::tempdir().expect("tempdir");
        let checkpointer = JsonFileCheckpointer::new(dir.path()).expect("create");

        assert_eq!(checkpointer.load("t1").await.expect("load"), None);

        let history = vec![Message::user("hi"), Message::assistant("hello")];
        checkpointer.save("t1", &history).await.expect("save");
        let loaded = checkpointer.load("t1").await.expect("load").expect("present");
        assert_eq!(loaded, history);
        assert!(dir.path().join("t1.json").exists());
    }
}
