//! Conversation memory and checkpointing.

pub mod checkpoint;
pub mod store;

pub use checkpoint::{Checkpointer, JsonFileCheckpointer, NoopCheckpointer};
pub use store::{ConversationStore, ThreadGuard};
