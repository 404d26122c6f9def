//! Conversation storage
//!
//! The context engine only talks to storage through [`ConversationStore`]:
//! - conversations are created implicitly per user
//! - messages are append-only
//! - specifications are stored as [`SpecificationRecord`] rows
//!
//! [`InMemoryConversationStore`] backs tests and single-process deployments.

pub mod memory;
pub mod models;

pub use memory::InMemoryConversationStore;
pub use models::{Conversation, SpecificationRecord, StoredMessage};

use crate::config::StorageConfig;
use crate::context::Role;
use crate::specification::WindowSpecification;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Narrow CRUD contract the context engine depends on
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Fetch the user's conversation, creating an empty one for unknown or
    /// expired users
    async fn get_or_create_conversation(
        &self,
        user_id: &str,
        display_name: &str,
    ) -> Result<Conversation, StorageError>;

    async fn append_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> Result<StoredMessage, StorageError>;

    /// Most recent messages, newest first
    async fn list_recent_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, StorageError>;

    async fn list_specifications(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<WindowSpecification>, StorageError>;

    async fn save_specification(
        &self,
        conversation_id: &str,
        spec: &WindowSpecification,
    ) -> Result<WindowSpecification, StorageError>;

    /// Remove conversations idle for longer than `ttl`; returns how many
    async fn purge_expired(&self, ttl: Duration) -> Result<usize, StorageError>;
}

/// Periodically purge idle conversations until the handle is aborted
pub fn spawn_expiry_task(
    store: Arc<dyn ConversationStore>,
    interval: Duration,
    ttl: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match store.purge_expired(ttl).await {
                Ok(0) => {}
                Ok(purged) => info!("Purged {} expired conversations", purged),
                Err(e) => warn!("Conversation purge failed: {}", e),
            }
        }
    })
}

/// [`spawn_expiry_task`] on the interval and TTL from `config`
pub fn spawn_configured_expiry_task(
    store: Arc<dyn ConversationStore>,
    config: &StorageConfig,
) -> JoinHandle<()> {
    info!(
        "Purging conversations idle for {}s every {}s",
        config.conversation_ttl_secs, config.purge_interval_secs
    );
    spawn_expiry_task(store, config.purge_interval(), config.conversation_ttl())
}
