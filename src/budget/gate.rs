//! Budget gate: decides per call whether a provider must be swapped for its fallback.
//!
//! Usage updates are read-modify-write against the budget store with no cross-process
//! locking. Concurrent stages calling the same provider can lose increments, so the
//! counter is approximate and not a billing ledger.

use super::{BudgetPolicy, UsageBudget};
use crate::error::ApiError;
use crate::store::BudgetStore;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

type Clock = dyn Fn() -> DateTime<Utc> + Send + Sync;

/// Outcome of a gate query.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackDecision {
    pub fallback: bool,
    pub tag: String,
    pub ratio: f64,
}

pub struct BudgetGate {
    store: Arc<dyn BudgetStore>,
    policies: HashMap<String, BudgetPolicy>,
    clock: Arc<Clock>,
}

impl BudgetGate {
    pub fn new(store: Arc<dyn BudgetStore>, policies: HashMap<String, BudgetPolicy>) -> Self {
        Self::with_clock(store, policies, Utc::now)
    }

    /// Gate with an injected clock.
    pub fn with_clock<F>(
        store: Arc<dyn BudgetStore>,
        policies: HashMap<String, BudgetPolicy>,
        clock: F,
    ) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        Self {
            store,
            policies,
            clock: Arc::new(clock),
        }
    }

    pub fn policy(&self, provider: &str) -> Result<&BudgetPolicy, ApiError> {
        self.policies
            .get(provider)
            .ok_or_else(|| ApiError::BudgetNotConfigured(provider.to_string()))
    }

    /// Whether `provider` must be replaced by its fallback right now.
    ///
    /// An expired period is reset (usage zeroed, `reset_at` rolled forward) as a side
    /// effect of the read, and reports no fallback.
    pub async fn should_fallback(&self, provider: &str) -> Result<FallbackDecision, ApiError> {
        let policy = self.policy(provider)?;
        let now = (self.clock)();
        let mut budget = self.load(provider, policy, now).await?;

        if budget.is_expired(now) {
            budget.roll_period(policy, now);
            self.store.write(provider, &budget).await?;
            info!(
                provider,
                reset_at = %budget.reset_at,
                "Budget period elapsed, usage reset"
            );
            return Ok(FallbackDecision {
                fallback: false,
                tag: budget.fallback_tag,
                ratio: 0.0,
            });
        }

        let ratio = budget.ratio(policy.kind);
        let fallback = budget.is_suspended(policy, now);
        if fallback {
            warn!(
                provider,
                ratio,
                cutoff = policy.cutoff,
                fallback_tag = %budget.fallback_tag,
                "Provider over budget threshold, fallback required"
            );
        } else {
            debug!(provider, ratio, cutoff = policy.cutoff, "Provider within budget");
        }

        Ok(FallbackDecision {
            fallback,
            tag: budget.fallback_tag,
            ratio,
        })
    }

    /// Add `units` of usage to `provider`'s current period.
    pub async fn record_usage(&self, provider: &str, units: u64) -> Result<UsageBudget, ApiError> {
        let policy = self.policy(provider)?;
        let now = (self.clock)();
        let mut budget = self.load(provider, policy, now).await?;
        if budget.is_expired(now) {
            budget.roll_period(policy, now);
        }
        budget.add_usage(policy, units);
        self.store.write(provider, &budget).await?;
        debug!(
            provider,
            units,
            cost_amount = budget.cost_amount,
            threshold_ratio = budget.threshold_ratio,
            "Recorded provider usage"
        );
        Ok(budget)
    }

    /// Current record for every configured provider, sorted by provider name.
    pub async fn snapshot(&self) -> Result<Vec<UsageBudget>, ApiError> {
        let now = (self.clock)();
        let mut budgets = Vec::with_capacity(self.policies.len());
        for (provider, policy) in &self.policies {
            budgets.push(self.load(provider, policy, now).await?);
        }
        budgets.sort_by(|a, b| a.provider.cmp(&b.provider));
        Ok(budgets)
    }

    async fn load(
        &self,
        provider: &str,
        policy: &BudgetPolicy,
        now: DateTime<Utc>,
    ) -> Result<UsageBudget, ApiError> {
        Ok(self
            .store
            .read(provider)
            .await?
            .unwrap_or_else(|| UsageBudget::fresh(provider, policy, now)))
    }
}
