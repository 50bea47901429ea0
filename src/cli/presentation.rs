//! CLI presentation: text tables and JSON for command results.

use crate::budget::{BudgetPolicy, CutoffKind, UsageBudget};
use crate::error::ApiError;
use crate::orchestrator::RunSummary;
use crate::profile::UserProfile;
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use serde_json::json;
use std::collections::HashMap;

fn to_json(value: &serde_json::Value) -> Result<String, ApiError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ApiError::GenerationFailed(format!("Failed to render JSON: {}", e)))
}

pub fn format_run_summary(summary: &RunSummary, format: &str) -> Result<String, ApiError> {
    if format == "json" {
        let categories: Vec<serde_json::Value> = summary
            .categories
            .iter()
            .map(|report| {
                json!({
                    "category": report.category.slug(),
                    "ok": report.is_ok(),
                    "outcome": report.outcome,
                    "error": report.error.as_ref().map(|err| err.to_string()),
                })
            })
            .collect();
        return to_json(&json!({
            "email": summary.email,
            "status": summary.status.to_string(),
            "items_generated": summary.items_generated(),
            "peak_concurrency": summary.peak_concurrency,
            "elapsed_ms": summary.elapsed_ms,
            "categories": categories,
        }));
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Category", "Result", "Items", "Failed", "Skipped keys", "Batches"]);
    for report in &summary.categories {
        let outcome = &report.outcome;
        let result = match &report.error {
            Some(err) => err.to_string(),
            None => "ok".to_string(),
        };
        table.add_row(vec![
            report.category.slug().to_string(),
            result,
            outcome.stages_succeeded.to_string(),
            outcome.stages_failed.to_string(),
            outcome.keys_skipped.to_string(),
            outcome.batches.to_string(),
        ]);
    }

    Ok(format!(
        "Run for {}: {} ({} items, peak concurrency {}, {} ms)\n{}",
        summary.email,
        summary.status,
        summary.items_generated(),
        summary.peak_concurrency,
        summary.elapsed_ms,
        table
    ))
}

pub fn format_budget_table(
    budgets: &[UsageBudget],
    policies: &HashMap<String, BudgetPolicy>,
    format: &str,
) -> Result<String, ApiError> {
    if format == "json" {
        let value = serde_json::to_value(budgets)
            .map_err(|e| ApiError::GenerationFailed(format!("Failed to render JSON: {}", e)))?;
        return to_json(&value);
    }

    if budgets.is_empty() {
        return Ok("No budget policies configured.".to_string());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Provider", "Policy", "Usage", "Ratio", "Cutoff", "Resets", "Fallback"]);
    for budget in budgets {
        let (policy, usage, cutoff) = match policies.get(&budget.provider) {
            Some(policy) if policy.kind == CutoffKind::CostRatio => (
                "cost",
                format!("{:.2} / {:.2}", budget.cost_amount, budget.budget_amount),
                format!("{:.2}", policy.cutoff),
            ),
            Some(policy) => (
                "usage",
                format!("{} / {}", budget.usage_units, budget.usage_quota),
                format!("{:.2}", policy.cutoff),
            ),
            None => ("-", "-".to_string(), "-".to_string()),
        };
        table.add_row(vec![
            budget.provider.clone(),
            policy.to_string(),
            usage,
            format!("{:.3}", budget.threshold_ratio),
            cutoff,
            budget.reset_at.format("%Y-%m-%d %H:%M UTC").to_string(),
            budget.fallback_tag.clone(),
        ]);
    }
    Ok(table.to_string())
}

pub fn format_profile(profile: &UserProfile, format: &str) -> Result<String, ApiError> {
    if format == "json" {
        let value = serde_json::to_value(profile)
            .map_err(|e| ApiError::GenerationFailed(format!("Failed to render JSON: {}", e)))?;
        return to_json(&value);
    }
    let metadata = &profile.metadata;
    Ok(format!(
        "{}\n  status:      {}\n  updated:     {}\n  language:    {}\n  location:    {}\n  preferences: {}\n  religions:   {}",
        profile.email,
        profile.status,
        profile.updated_at.to_rfc3339(),
        metadata.language,
        [metadata.city.as_str(), metadata.country.as_str()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(", "),
        metadata.preferences.join(", "),
        metadata.religions.join(", "),
    ))
}
