//! Provider Usage Budgets
//!
//! Periodic cost/quota accounting per provider. A provider whose usage ratio crosses its
//! cutoff inside the current period is suspended, and callers switch to its fallback.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub mod gate;

pub use gate::{BudgetGate, FallbackDecision};

/// Which usage field a cutoff is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CutoffKind {
    /// `cost_amount / budget_amount`
    CostRatio,
    /// `usage_units / usage_quota`
    UsageRatio,
}

/// Configured budget policy for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetPolicy {
    pub kind: CutoffKind,
    /// Ratio at or above which the provider is suspended (0.0-1.0)
    pub cutoff: f64,
    /// Spend allowed per period (cost ratio policies)
    #[serde(default)]
    pub budget_amount: f64,
    /// Units allowed per period (usage ratio policies)
    #[serde(default)]
    pub usage_quota: u64,
    /// Cost added per recorded unit
    #[serde(default)]
    pub unit_cost: f64,
    /// Period length in days
    #[serde(default = "default_period_days")]
    pub period_days: u32,
    /// Tag naming the provider that takes over while suspended
    #[serde(default)]
    pub fallback_tag: String,
}

fn default_period_days() -> u32 {
    30
}

impl BudgetPolicy {
    /// Cost-ratio policy used for the primary text provider.
    pub fn text_default() -> Self {
        Self {
            kind: CutoffKind::CostRatio,
            cutoff: 0.60,
            budget_amount: 100.0,
            usage_quota: 0,
            unit_cost: 0.000_002,
            period_days: default_period_days(),
            fallback_tag: "text-fallback".to_string(),
        }
    }

    /// Usage-ratio policy used for the primary audio provider.
    pub fn audio_default() -> Self {
        Self {
            kind: CutoffKind::UsageRatio,
            cutoff: 0.88,
            budget_amount: 0.0,
            usage_quota: 1_000_000,
            unit_cost: 0.0,
            period_days: default_period_days(),
            fallback_tag: "audio-fallback".to_string(),
        }
    }

    pub fn period(&self) -> Duration {
        Duration::days(i64::from(self.period_days.max(1)))
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.cutoff) {
            return Err(format!("cutoff must be within 0.0-1.0, got {}", self.cutoff));
        }
        if self.period_days == 0 {
            return Err("period_days must be at least 1".to_string());
        }
        if self.budget_amount < 0.0 || self.unit_cost < 0.0 {
            return Err("budget_amount and unit_cost cannot be negative".to_string());
        }
        Ok(())
    }
}

/// Persisted usage record for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageBudget {
    pub provider: String,
    pub cost_amount: f64,
    pub budget_amount: f64,
    pub usage_units: u64,
    pub usage_quota: u64,
    pub threshold_ratio: f64,
    pub reset_at: DateTime<Utc>,
    pub fallback_tag: String,
}

impl UsageBudget {
    /// A zeroed record whose period starts at `now`.
    pub fn fresh(provider: &str, policy: &BudgetPolicy, now: DateTime<Utc>) -> Self {
        Self {
            provider: provider.to_string(),
            cost_amount: 0.0,
            budget_amount: policy.budget_amount,
            usage_units: 0,
            usage_quota: policy.usage_quota,
            threshold_ratio: 0.0,
            reset_at: now + policy.period(),
            fallback_tag: policy.fallback_tag.clone(),
        }
    }

    pub fn ratio(&self, kind: CutoffKind) -> f64 {
        match kind {
            CutoffKind::CostRatio => {
                if self.budget_amount > 0.0 {
                    self.cost_amount / self.budget_amount
                } else {
                    0.0
                }
            }
            CutoffKind::UsageRatio => {
                if self.usage_quota > 0 {
                    self.usage_units as f64 / self.usage_quota as f64
                } else {
                    0.0
                }
            }
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.reset_at
    }

    /// Suspended: over cutoff and still inside the current period.
    pub fn is_suspended(&self, policy: &BudgetPolicy, now: DateTime<Utc>) -> bool {
        !self.is_expired(now) && self.ratio(policy.kind) >= policy.cutoff
    }

    /// Zero usage and move `reset_at` forward by whole periods past `now`.
    pub fn roll_period(&mut self, policy: &BudgetPolicy, now: DateTime<Utc>) {
        let period_secs = policy.period().num_seconds();
        let overdue_secs = (now - self.reset_at).num_seconds().max(0);
        let periods = overdue_secs / period_secs + 1;
        self.reset_at += Duration::seconds(period_secs * periods);

        self.cost_amount = 0.0;
        self.usage_units = 0;
        self.threshold_ratio = 0.0;
        self.budget_amount = policy.budget_amount;
        self.usage_quota = policy.usage_quota;
        self.fallback_tag = policy.fallback_tag.clone();
    }

    pub fn add_usage(&mut self, policy: &BudgetPolicy, units: u64) {
        self.usage_units = self.usage_units.saturating_add(units);
        self.cost_amount += units as f64 * policy.unit_cost;
        self.threshold_ratio = self.ratio(policy.kind);
    }
}
