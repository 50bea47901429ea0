//! In-memory store, used by tests and the `memory` storage backend.

use super::{object_reference, BudgetStore, ContentStore, ProfileStore};
use crate::budget::UsageBudget;
use crate::error::StorageError;
use crate::profile::{ProcessingStatus, UserMetadata, UserProfile};
use crate::types::{BatchRecord, ContentItem, TopicScope};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
    items: RwLock<Vec<ContentItem>>,
    batches: RwLock<Vec<BatchRecord>>,
    topic_counts: RwLock<HashMap<String, usize>>,
    profiles: RwLock<HashMap<String, UserProfile>>,
    budgets: RwLock<HashMap<String, UsageBudget>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> Vec<ContentItem> {
        self.items.read().clone()
    }

    pub fn batches(&self) -> Vec<BatchRecord> {
        self.batches.read().clone()
    }

    pub fn object(&self, reference: &str) -> Option<Vec<u8>> {
        self.objects.read().get(reference).cloned()
    }

    pub fn object_count(&self) -> usize {
        self.objects.read().len()
    }

    /// Seed a topic count, as if earlier runs had persisted batches for `scope`.
    pub fn seed_topic_count(&self, scope: &TopicScope, count: usize) {
        self.topic_counts.write().insert(scope.storage_key(), count);
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        category: &str,
        extension: &str,
    ) -> Result<String, StorageError> {
        let reference = object_reference(&bytes, category, extension);
        self.objects.write().insert(reference.clone(), bytes);
        Ok(reference)
    }

    async fn persist_item(&self, item: &ContentItem) -> Result<(), StorageError> {
        self.items.write().push(item.clone());
        Ok(())
    }

    async fn persist_batch(&self, record: &BatchRecord) -> Result<(), StorageError> {
        *self
            .topic_counts
            .write()
            .entry(record.scope().storage_key())
            .or_insert(0) += record.topics.len();
        self.batches.write().push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn upsert(
        &self,
        metadata: &UserMetadata,
        status: ProcessingStatus,
    ) -> Result<(), StorageError> {
        self.profiles.write().insert(
            metadata.email.clone(),
            UserProfile::new(metadata.clone(), status),
        );
        Ok(())
    }

    async fn get(&self, email: &str) -> Result<Option<UserProfile>, StorageError> {
        Ok(self.profiles.read().get(email).cloned())
    }

    async fn set_status(&self, email: &str, status: ProcessingStatus) -> Result<(), StorageError> {
        let mut profiles = self.profiles.write();
        let profile = profiles
            .get_mut(email)
            .ok_or_else(|| StorageError::NotFound(format!("profile {}", email)))?;
        profile.status = status;
        profile.updated_at = Utc::now();
        Ok(())
    }

    async fn existing_topic_count(&self, scope: &TopicScope) -> Result<usize, StorageError> {
        Ok(self
            .topic_counts
            .read()
            .get(&scope.storage_key())
            .copied()
            .unwrap_or(0))
    }
}

#[async_trait]
impl BudgetStore for MemoryStore {
    async fn read(&self, provider: &str) -> Result<Option<UsageBudget>, StorageError> {
        Ok(self.budgets.read().get(provider).cloned())
    }

    async fn write(&self, provider: &str, budget: &UsageBudget) -> Result<(), StorageError> {
        self.budgets
            .write()
            .insert(provider.to_string(), budget.clone());
        Ok(())
    }
}
