//! In-process conversation memory keyed by thread id.
//!
//! Each thread has its own async mutex. A run holds the thread's
//! [`ThreadGuard`] from load to commit, so runs on one thread are linearized
//! while different threads never wait on each other. The map lock is held
//! only long enough to find or create a thread's mutex.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use super::checkpoint::{Checkpointer, NoopCheckpointer};
use crate::error::ParleyError;
use crate::types::Message;

type ThreadSlot = Arc<Mutex<Vec<Message>>>;

/// Thread id → ordered message history.
pub struct ConversationStore {
    threads: Mutex<HashMap<String, ThreadSlot>>,
    checkpointer: Arc<dyn Checkpointer>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(Arc::new(NoopCheckpointer))
    }
}

impl ConversationStore {
    pub fn new(checkpointer: Arc<dyn Checkpointer>) -> Self {
        Self {
            threads: Mutex::new(HashMap::new()),
            checkpointer,
        }
    }

    async fn slot(&self, thread_id: &str) -> ThreadSlot {
        let mut threads = self.threads.lock().await;
        threads
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone()
    }

    async fn is_current(&self, thread_id: &str, slot: &ThreadSlot) -> bool {
        self.threads
            .lock()
            .await
            .get(thread_id)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
    }

    /// Exclusive access to one thread until the guard drops.
    ///
    /// A slot evicted while this call waited on it is skipped and a fresh
    /// one is taken.
    pub async fn lock(&self, thread_id: &str) -> ThreadGuard {
        loop {
            let slot = self.slot(thread_id).await;
            let messages = slot.clone().lock_owned().await;
            if self.is_current(thread_id, &slot).await {
                return ThreadGuard {
                    thread_id: thread_id.to_string(),
                    messages,
                    checkpointer: self.checkpointer.clone(),
                };
            }
        }
    }

    /// History of a thread; empty if never seen.
    pub async fn load(&self, thread_id: &str) -> Vec<Message> {
        self.lock(thread_id).await.history().to_vec()
    }

    pub async fn append(&self, thread_id: &str, messages: Vec<Message>) {
        self.lock(thread_id).await.append(messages);
    }

    pub async fn checkpoint(&self, thread_id: &str) -> Result<(), ParleyError> {
        self.lock(thread_id).await.checkpoint().await
    }

    /// Seed a thread from the checkpointer if it is not yet in memory.
    ///
    /// Returns whether anything was restored.
    pub async fn restore(&self, thread_id: &str) -> Result<bool, ParleyError> {
        let mut guard = self.lock(thread_id).await;
        if !guard.history().is_empty() {
            return Ok(false);
        }
        match self.checkpointer.load(thread_id).await? {
            Some(messages) if !messages.is_empty() => {
                debug!(thread_id, count = messages.len(), "restored thread from checkpoint");
                guard.append(messages);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub async fn thread_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.threads.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Drop a thread from memory. Waits for any run on it to finish.
    ///
    /// The slot leaves the map only while its lock is held, so no run ever
    /// writes to a detached history or overlaps a run on a fresh slot.
    pub async fn evict(&self, thread_id: &str) -> bool {
        let Some(slot) = self.threads.lock().await.get(thread_id).cloned() else {
            return false;
        };
        let _held = slot.lock().await;
        let mut threads = self.threads.lock().await;
        if threads
            .get(thread_id)
            .is_some_and(|current| Arc::ptr_eq(current, &slot))
        {
            threads.remove(thread_id);
            debug!(thread_id, "thread evicted");
            true
        } else {
            false
        }
    }
}

/// Exclusive handle on one thread's history.
pub struct ThreadGuard {
    thread_id: String,
    messages: OwnedMutexGuard<Vec<Message>>,
    checkpointer: Arc<dyn Checkpointer>,
}

impl ThreadGuard {
    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn history(&self) -> &[Message] {
        &self.messages
    }

    /// Append in order; earlier messages are never touched.
    pub fn append(&mut self, messages: Vec<Message>) {
        self.messages.extend(messages);
    }

    pub async fn checkpoint(&self) -> Result<(), ParleyError> {
        self.checkpointer
            .save(&self.thread_id, &self.messages)
            .await
            .inspect_err(|err| warn!(thread_id = %self.thread_id, error = %err, "checkpoint failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use std::time::Duration;

    #[tokio::test]
    async fn unseen_thread_loads_empty() {
        let store = ConversationStore::default();
        assert!(store.load("nobody").await.is_empty());
    }

    #[tokio::test]
    async fn append_preserves_order_across_turns() {
        let store = ConversationStore::default();
        store
            .append("t1", vec![Message::user("a"), Message::assistant("b")])
            .await;
        store.append("t1", vec![Message::user("c")]).await;

        let contents: Vec<_> = store
            .load("t1")
            .await
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn guard_blocks_same_thread_but_not_others() {
        let store = Arc::new(ConversationStore::default());
        let guard = store.lock("t1").await;

        let other = tokio::time::timeout(Duration::from_millis(200), store.load("t2")).await;
        assert!(other.is_ok(), "a different thread must not wait");

        let same = tokio::time::timeout(Duration::from_millis(50), store.load("t1")).await;
        assert!(same.is_err(), "same thread waits for the guard");

        drop(guard);
        assert!(store.load("t1").await.is_empty());
    }

    #[tokio::test]
    async fn interleaved_threads_keep_their_own_messages() {
        let store = Arc::new(ConversationStore::default());
        let mut tasks = Vec::new();
        for t in 0..8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                let thread = format!("thread-{t}");
                for i in 0..25 {
                    let mut guard = store.lock(&thread).await;
                    guard.append(vec![
                        Message::user(format!("{t}:{i}")),
                        Message::assistant(format!("{t}:{i}")),
                    ]);
                    tokio::task::yield_now().await;
                }
            }));
        }
        for task in tasks {
            task.await.expect("task should finish");
        }

        for t in 0..8 {
            let history = store.load(&format!("thread-{t}")).await;
            assert_eq!(history.len(), 50);
            for (i, pair) in history.chunks(2).enumerate() {
                assert_eq!(pair[0].role, Role::User);
                assert_eq!(pair[0].content, format!("{t}:{i}"));
                assert_eq!(pair[1].content, format!("{t}:{i}"));
            }
        }
        assert_eq!(store.thread_ids().await.len(), 8);
    }

    #[tokio::test]
    async fn restore_seeds_from_checkpoint_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let checkpointer = Arc::new(
            crate::memory::checkpoint::JsonFileCheckpointer::new(dir.path()).expect("create"),
        );
        checkpointer
            .save("t1", &[Message::user("earlier")])
            .await
            .expect("save");

        let store = ConversationStore::new(checkpointer);
        assert!(store.restore("t1").await.expect("restore"));
        assert!(!store.restore("t1").await.expect("second restore is a no-op"));
        assert_eq!(store.load("t1").await[0].content, "earlier");
    }

    #[tokio::test]
    async fn evict_forgets_thread() {
        let store = ConversationStore::default();
        store.append("t1", vec![Message::user("x")]).await;
        assert!(store.evict("t1").await);
        assert!(!store.evict("t1").await);
        assert!(store.load("t1").await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn evict_waits_for_running_turn_and_queued_turns_start_fresh() {
        let store = Arc::new(ConversationStore::default());
        let mut guard = store.lock("t1").await;
        guard.append(vec![Message::user("old")]);

        let evicting = tokio::spawn({
            let store = store.clone();
            async move { store.evict("t1").await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let late = tokio::spawn({
            let store = store.clone();
            async move { store.append("t1", vec![Message::user("late")]).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!evicting.is_finished(), "evict waits for the running turn");
        assert!(!late.is_finished(), "no turn overlaps the running one");

        drop(guard);
        assert!(evicting.await.expect("evict task"));
        late.await.expect("append task");

        let contents: Vec<_> = store
            .load("t1")
            .await
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["late"]);
    }
}
