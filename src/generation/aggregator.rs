//! Per-category fan-in of stage reports.
//!
//! The aggregator runs as its own task for the lifetime of a category pipeline. It keeps
//! every report in memory and only writes once the stream has closed, so a key's batch
//! always contains every topic that succeeded for it.

use crate::concurrency::spawn_isolated;
use crate::error::ApiError;
use crate::store::ContentStore;
use crate::types::{BatchRecord, Category, LocaleContext, StageReport, ThemeGroupId};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Successful topics of one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyGroup {
    pub key: String,
    pub theme_group_id: ThemeGroupId,
    pub topics: Vec<String>,
}

/// Group reports by key, keeping arrival order within a key. Groups come out sorted by key.
pub fn group_reports<I>(reports: I) -> Vec<KeyGroup>
where
    I: IntoIterator<Item = StageReport>,
{
    let mut groups: BTreeMap<String, KeyGroup> = BTreeMap::new();
    for report in reports {
        groups
            .entry(report.key.clone())
            .or_insert_with(|| KeyGroup {
                key: report.key,
                theme_group_id: report.theme_group_id,
                topics: Vec::new(),
            })
            .topics
            .push(report.topic);
    }
    groups.into_values().collect()
}

pub struct Aggregator {
    category: Category,
    language: String,
    locales: HashMap<String, LocaleContext>,
    content: Arc<dyn ContentStore>,
}

impl Aggregator {
    pub fn new(
        category: Category,
        language: String,
        locales: HashMap<String, LocaleContext>,
        content: Arc<dyn ContentStore>,
    ) -> Self {
        Self {
            category,
            language,
            locales,
            content,
        }
    }

    /// Start consuming `reports`. The task resolves to the number of batches persisted,
    /// once every sender has been dropped.
    pub fn spawn(self, reports: UnboundedReceiver<StageReport>) -> JoinHandle<Result<usize, ApiError>> {
        let task = format!("aggregator:{}", self.category);
        spawn_isolated(task, self.consume(reports))
    }

    async fn consume(self, mut reports: UnboundedReceiver<StageReport>) -> Result<usize, ApiError> {
        let mut received = Vec::new();
        while let Some(report) = reports.recv().await {
            debug!(
                category = %self.category,
                key = %report.key,
                topic = %report.topic,
                "Stage report received"
            );
            received.push(report);
        }
        Ok(self.flush(group_reports(received)).await)
    }

    async fn flush(&self, groups: Vec<KeyGroup>) -> usize {
        let mut persisted = 0;
        for group in groups {
            let Some(locale) = self.locales.get(&group.key) else {
                warn!(
                    category = %self.category,
                    key = %group.key,
                    "Dropping reports for a key outside the category plan"
                );
                continue;
            };
            let record = BatchRecord {
                theme_group_id: group.theme_group_id,
                category: self.category,
                key: group.key,
                topics: group.topics,
                locale: locale.clone(),
                language: self.language.clone(),
                created_at: Utc::now(),
            };
            match self.content.persist_batch(&record).await {
                Ok(()) => {
                    persisted += 1;
                    info!(
                        category = %self.category,
                        key = %record.key,
                        theme_group_id = %record.theme_group_id,
                        topic_count = record.topics.len(),
                        "Batch persisted"
                    );
                }
                Err(err) => warn!(
                    category = %self.category,
                    key = %record.key,
                    error = %err,
                    "Failed to persist batch"
                ),
            }
        }
        persisted
    }
}
