//! Memory backends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Result;

/// One remembered interaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    /// Messages of the interaction, typically `{role, content}` objects
    #[serde(default)]
    pub conversation: Vec<Value>,
    /// User the memory belongs to
    pub user_id: String,
    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Backend specific metadata
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Condensed memory text, when the backend produces one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

impl MemoryItem {
    /// Create an item for `user_id`.
    pub fn new(user_id: impl Into<String>, conversation: Vec<Value>) -> Self {
        Self {
            conversation,
            user_id: user_id.into(),
            ..Self::default()
        }
    }
}

/// A memory backend yielded by memory builds.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use plexus_core::Result;
/// use plexus_core::traits::{MemoryEditor, MemoryItem};
/// use std::sync::Mutex;
///
/// #[derive(Debug, Default)]
/// struct VecMemory(Mutex<Vec<MemoryItem>>);
///
/// #[async_trait]
/// impl MemoryEditor for VecMemory {
///     async fn add_items(&self, items: Vec<MemoryItem>) -> Result<()> {
///         self.0.lock().unwrap().extend(items);
///         Ok(())
///     }
///
///     async fn search(&self, _query: &str, top_k: usize, user_id: &str) -> Result<Vec<MemoryItem>> {
///         let items = self.0.lock().unwrap();
///         Ok(items.iter().filter(|i| i.user_id == user_id).take(top_k).cloned().collect())
///     }
///
///     async fn remove_items(&self, user_id: &str) -> Result<()> {
///         self.0.lock().unwrap().retain(|i| i.user_id != user_id);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait MemoryEditor: Send + Sync + std::fmt::Debug {
    /// Store items.
    async fn add_items(&self, items: Vec<MemoryItem>) -> Result<()>;

    /// Retrieve up to `top_k` items of `user_id` relevant to `query`.
    async fn search(&self, query: &str, top_k: usize, user_id: &str) -> Result<Vec<MemoryItem>>;

    /// Forget every item of `user_id`.
    async fn remove_items(&self, user_id: &str) -> Result<()>;
}
