//! Sled-backed store
//!
//! One sled database with a tree per record family. Values are bincode-encoded; topic
//! counts are big-endian `u64`s updated with sled's atomic `update_and_fetch`.

use super::{object_reference, BudgetStore, ContentStore, ProfileStore};
use crate::budget::UsageBudget;
use crate::error::StorageError;
use crate::profile::{ProcessingStatus, UserMetadata, UserProfile};
use crate::types::{BatchRecord, ContentItem, TopicScope};
use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

const OBJECTS_TREE: &str = "objects";
const ITEMS_TREE: &str = "items";
const BATCHES_TREE: &str = "batches";
const TOPIC_COUNTS_TREE: &str = "topic_counts";
const PROFILES_TREE: &str = "profiles";
const BUDGETS_TREE: &str = "budgets";

pub struct SledStore {
    db: sled::Db,
    objects: sled::Tree,
    items: sled::Tree,
    batches: sled::Tree,
    topic_counts: sled::Tree,
    profiles: sled::Tree,
    budgets: sled::Tree,
}

impl SledStore {
    /// Open (or create) a store at the given directory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path.as_ref()).map_err(|e| {
            StorageError::Backend(format!(
                "Failed to open sled database at {:?}: {}",
                path.as_ref(),
                e
            ))
        })?;
        Ok(Self {
            objects: db.open_tree(OBJECTS_TREE)?,
            items: db.open_tree(ITEMS_TREE)?,
            batches: db.open_tree(BATCHES_TREE)?,
            topic_counts: db.open_tree(TOPIC_COUNTS_TREE)?,
            profiles: db.open_tree(PROFILES_TREE)?,
            budgets: db.open_tree(BUDGETS_TREE)?,
            db,
        })
    }

    pub fn object(&self, reference: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.objects.get(reference.as_bytes())?.map(|v| v.to_vec()))
    }

    pub fn batches(&self) -> Result<Vec<BatchRecord>, StorageError> {
        self.batches
            .iter()
            .map(|entry| {
                let (_, value) = entry?;
                decode(&value)
            })
            .collect()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    Ok(bincode::serialize(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    Ok(bincode::deserialize(bytes)?)
}

fn decode_count(bytes: Option<&[u8]>) -> u64 {
    bytes
        .and_then(|b| <[u8; 8]>::try_from(b).ok())
        .map(u64::from_be_bytes)
        .unwrap_or(0)
}

#[async_trait]
impl ContentStore for SledStore {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        category: &str,
        extension: &str,
    ) -> Result<String, StorageError> {
        let reference = object_reference(&bytes, category, extension);
        self.objects.insert(reference.as_bytes(), bytes)?;
        Ok(reference)
    }

    async fn persist_item(&self, item: &ContentItem) -> Result<(), StorageError> {
        self.items
            .insert(item.id.to_string().as_bytes(), encode(item)?)?;
        Ok(())
    }

    async fn persist_batch(&self, record: &BatchRecord) -> Result<(), StorageError> {
        self.batches.insert(
            record.theme_group_id.to_string().as_bytes(),
            encode(record)?,
        )?;

        let added = record.topics.len() as u64;
        self.topic_counts
            .update_and_fetch(record.scope().storage_key().as_bytes(), |old| {
                Some((decode_count(old) + added).to_be_bytes().to_vec())
            })?;
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for SledStore {
    async fn upsert(
        &self,
        metadata: &UserMetadata,
        status: ProcessingStatus,
    ) -> Result<(), StorageError> {
        let profile = UserProfile::new(metadata.clone(), status);
        self.profiles
            .insert(metadata.email.as_bytes(), encode(&profile)?)?;
        Ok(())
    }

    async fn get(&self, email: &str) -> Result<Option<UserProfile>, StorageError> {
        self.profiles
            .get(email.as_bytes())?
            .map(|value| decode(&value))
            .transpose()
    }

    async fn set_status(&self, email: &str, status: ProcessingStatus) -> Result<(), StorageError> {
        let mut profile = self
            .get(email)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("profile {}", email)))?;
        profile.status = status;
        profile.updated_at = Utc::now();
        self.profiles.insert(email.as_bytes(), encode(&profile)?)?;
        Ok(())
    }

    async fn existing_topic_count(&self, scope: &TopicScope) -> Result<usize, StorageError> {
        let stored = self.topic_counts.get(scope.storage_key().as_bytes())?;
        Ok(decode_count(stored.as_deref()) as usize)
    }
}

#[async_trait]
impl BudgetStore for SledStore {
    async fn read(&self, provider: &str) -> Result<Option<UsageBudget>, StorageError> {
        self.budgets
            .get(provider.as_bytes())?
            .map(|value| decode(&value))
            .transpose()
    }

    async fn write(&self, provider: &str, budget: &UsageBudget) -> Result<(), StorageError> {
        self.budgets.insert(provider.as_bytes(), encode(budget)?)?;
        Ok(())
    }
}
