//! User memories exposed alongside sessions

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::Result;

/// A fact the system remembers about a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMemory {
    pub memory: String,
    #[serde(default)]
    pub topics: Vec<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl UserMemory {
    pub fn new(memory: impl Into<String>, topics: Vec<String>) -> Self {
        Self {
            memory: memory.into(),
            topics,
            last_updated: Some(Utc::now()),
        }
    }
}

#[async_trait]
pub trait UserMemoryStore: Send + Sync {
    async fn get_user_memories(&self, user_id: &str) -> Result<Vec<UserMemory>>;
}

/// Memory store kept in process
#[derive(Default)]
pub struct InMemoryUserMemory {
    memories: RwLock<HashMap<String, Vec<UserMemory>>>,
}

impl InMemoryUserMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, user_id: &str, memory: UserMemory) {
        self.memories
            .write()
            .await
            .entry(user_id.to_string())
            .or_default()
            .push(memory);
    }
}

#[async_trait]
impl UserMemoryStore for InMemoryUserMemory {
    async fn get_user_memories(&self, user_id: &str) -> Result<Vec<UserMemory>> {
        Ok(self
            .memories
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memories_are_per_user() {
        let store = InMemoryUserMemory::new();
        store
            .add("alice", UserMemory::new("Likes haiku", vec!["poetry".into()]))
            .await;

        let alice = store.get_user_memories("alice").await.unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].topics, vec!["poetry".to_string()]);
        assert!(store.get_user_memories("bob").await.unwrap().is_empty());
    }
}
