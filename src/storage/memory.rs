//! In-process conversation store

use super::models::{Conversation, SpecificationRecord, StoredMessage};
use super::{ConversationStore, StorageError};
use crate::context::Role;
use crate::specification::WindowSpecification;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;
use tracing::debug;

/// Conversation store backed by concurrent maps
#[derive(Debug, Default)]
pub struct InMemoryConversationStore {
    /// conversation id -> conversation
    conversations: DashMap<String, Conversation>,
    /// user id -> conversation id
    user_index: DashMap<String, String>,
    /// conversation id -> messages, oldest first
    messages: DashMap<String, Vec<StoredMessage>>,
    /// conversation id -> specification rows
    specifications: DashMap<String, Vec<SpecificationRecord>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }

    /// Insert a fresh conversation and its empty collections
    fn create_conversation(&self, user_id: &str, display_name: &str) -> Conversation {
        let conversation = Conversation::new(user_id, display_name);
        debug!(
            "Creating conversation {} for user {}",
            conversation.id, user_id
        );
        self.messages.insert(conversation.id.clone(), Vec::new());
        self.specifications.insert(conversation.id.clone(), Vec::new());
        self.conversations
            .insert(conversation.id.clone(), conversation.clone());
        conversation
    }

    fn touch(&self, conversation_id: &str) -> Result<(), StorageError> {
        let mut conversation = self
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| StorageError::ConversationNotFound(conversation_id.to_string()))?;
        conversation.last_activity = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn get_or_create_conversation(
        &self,
        user_id: &str,
        display_name: &str,
    ) -> Result<Conversation, StorageError> {
        // The index entry stays locked until the conversation exists, so
        // concurrent callers for one user agree on a single conversation
        match self.user_index.entry(user_id.to_string()) {
            Entry::Occupied(mut entry) => {
                if let Some(conversation) = self.conversations.get(entry.get()) {
                    return Ok(conversation.clone());
                }
                let conversation = self.create_conversation(user_id, display_name);
                entry.insert(conversation.id.clone());
                Ok(conversation)
            }
            Entry::Vacant(entry) => {
                let conversation = self.create_conversation(user_id, display_name);
                entry.insert(conversation.id.clone());
                Ok(conversation)
            }
        }
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> Result<StoredMessage, StorageError> {
        let message = StoredMessage::new(conversation_id, role, content);
        self.messages
            .get_mut(conversation_id)
            .ok_or_else(|| StorageError::ConversationNotFound(conversation_id.to_string()))?
            .push(message.clone());
        self.touch(conversation_id)?;
        Ok(message)
    }

    async fn list_recent_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, StorageError> {
        let messages = self
            .messages
            .get(conversation_id)
            .ok_or_else(|| StorageError::ConversationNotFound(conversation_id.to_string()))?;
        Ok(messages.iter().rev().take(limit).cloned().collect())
    }

    async fn list_specifications(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<WindowSpecification>, StorageError> {
        let records = self
            .specifications
            .get(conversation_id)
            .ok_or_else(|| StorageError::ConversationNotFound(conversation_id.to_string()))?;
        records
            .iter()
            .map(|record| record.to_specification().map_err(StorageError::from))
            .collect()
    }

    async fn save_specification(
        &self,
        conversation_id: &str,
        spec: &WindowSpecification,
    ) -> Result<WindowSpecification, StorageError> {
        let record = SpecificationRecord::from_specification(conversation_id, spec)?;
        let saved = record.to_specification()?;
        self.specifications
            .get_mut(conversation_id)
            .ok_or_else(|| StorageError::ConversationNotFound(conversation_id.to_string()))?
            .push(record);
        Ok(saved)
    }

    async fn purge_expired(&self, ttl: Duration) -> Result<usize, StorageError> {
        let ttl = chrono::Duration::from_std(ttl).map_err(|e| StorageError::Backend(e.to_string()))?;
        let cutoff = Utc::now() - ttl;

        let expired: Vec<(String, String)> = self
            .conversations
            .iter()
            .filter(|entry| entry.last_activity <= cutoff)
            .map(|entry| (entry.id.clone(), entry.user_id.clone()))
            .collect();

        for (conversation_id, user_id) in &expired {
            self.conversations.remove(conversation_id);
            self.messages.remove(conversation_id);
            self.specifications.remove(conversation_id);
            self.user_index
                .remove_if(user_id, |_, mapped| mapped == conversation_id);
        }
        Ok(expired.len())
    }
}
