//! Storage Collaborators
//!
//! Object, document, profile and budget storage as consumed by the engine. Every call is
//! a suspension point for the calling task only. Two backends ship with the crate: an
//! in-memory store and a sled-backed store; both implement all three traits so topic
//! counts stay consistent with persisted batches.

pub mod memory;
pub mod persistence;

pub use memory::MemoryStore;
pub use persistence::SledStore;

use crate::budget::UsageBudget;
use crate::error::StorageError;
use crate::profile::{ProcessingStatus, UserMetadata, UserProfile};
use crate::types::{BatchRecord, ContentItem, TopicScope};
use async_trait::async_trait;
use std::sync::Arc;

/// Object and document storage for generated content.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store an asset and return a reference to it.
    async fn upload(
        &self,
        bytes: Vec<u8>,
        category: &str,
        extension: &str,
    ) -> Result<String, StorageError>;

    async fn persist_item(&self, item: &ContentItem) -> Result<(), StorageError>;

    /// Persist one key's batch; also counts its topics toward the key's scope.
    async fn persist_batch(&self, record: &BatchRecord) -> Result<(), StorageError>;
}

/// User profile storage.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Create the profile if absent, otherwise replace its metadata and status.
    async fn upsert(
        &self,
        metadata: &UserMetadata,
        status: ProcessingStatus,
    ) -> Result<(), StorageError>;

    async fn get(&self, email: &str) -> Result<Option<UserProfile>, StorageError>;

    /// Fails with [`StorageError::NotFound`] for an unknown email.
    async fn set_status(&self, email: &str, status: ProcessingStatus) -> Result<(), StorageError>;

    /// Topics already persisted for a category/key scope.
    async fn existing_topic_count(&self, scope: &TopicScope) -> Result<usize, StorageError>;
}

/// Per-provider usage budget storage.
#[async_trait]
pub trait BudgetStore: Send + Sync {
    async fn read(&self, provider: &str) -> Result<Option<UsageBudget>, StorageError>;
    async fn write(&self, provider: &str, budget: &UsageBudget) -> Result<(), StorageError>;
}

/// The three store handles the engine needs, usually backed by one store.
#[derive(Clone)]
pub struct StoreSet {
    pub content: Arc<dyn ContentStore>,
    pub profiles: Arc<dyn ProfileStore>,
    pub budgets: Arc<dyn BudgetStore>,
}

impl StoreSet {
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: ContentStore + ProfileStore + BudgetStore + 'static,
    {
        Self {
            content: Arc::clone(&store) as Arc<dyn ContentStore>,
            profiles: Arc::clone(&store) as Arc<dyn ProfileStore>,
            budgets: store,
        }
    }
}

/// Content-addressed reference for an uploaded object.
pub fn object_reference(bytes: &[u8], category: &str, extension: &str) -> String {
    let digest = blake3::hash(bytes);
    format!(
        "{}/{}.{}",
        category.trim_matches('/'),
        hex::encode(digest.as_bytes()),
        extension.trim_start_matches('.')
    )
}
