//! Cost & budget accounting (C9): per-model pricing lookup, monotonic
//! session totals, and a budget gate the agent loop checks after every
//! round.
//!
//! Grounded in the teacher's `cost.rs::ModelPricing::calculate` shape
//! (per-million-token pricing, optional cached-token rate); generalised to
//! exact-then-prefix model id lookup and a `BudgetStatus` the loop can act
//! on directly rather than a CLI-facing usage report.

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct ModelPricing {
    pub per_million_input: f64,
    pub per_million_output: f64,
    pub per_million_cached_input: Option<f64>,
}

impl ModelPricing {
    pub fn new(per_million_input: f64, per_million_output: f64) -> Self {
        Self {
            per_million_input,
            per_million_output,
            per_million_cached_input: None,
        }
    }

    pub fn with_cached(mut self, per_million_cached_input: f64) -> Self {
        self.per_million_cached_input = Some(per_million_cached_input);
        self
    }

    pub fn calculate(&self, in_tokens: u64, out_tokens: u64, cached_tokens: u64) -> f64 {
        let input_cost = (in_tokens as f64 / 1_000_000.0) * self.per_million_input;
        let output_cost = (out_tokens as f64 / 1_000_000.0) * self.per_million_output;
        let cached_cost = self
            .per_million_cached_input
            .map(|p| (cached_tokens as f64 / 1_000_000.0) * p)
            .unwrap_or(0.0);
        input_cost + output_cost + cached_cost
    }
}

pub fn default_pricing_table() -> HashMap<String, ModelPricing> {
    let mut table = HashMap::new();
    table.insert("claude-opus-4".to_string(), ModelPricing::new(15.0, 75.0).with_cached(1.5));
    table.insert("claude-sonnet-4".to_string(), ModelPricing::new(3.0, 15.0).with_cached(0.3));
    table.insert("claude-3.5-sonnet".to_string(), ModelPricing::new(3.0, 15.0).with_cached(0.3));
    table.insert("claude-3-haiku".to_string(), ModelPricing::new(0.25, 1.25).with_cached(0.03));
    table.insert("gpt-4o".to_string(), ModelPricing::new(2.5, 10.0).with_cached(1.25));
    table.insert("gpt-4o-mini".to_string(), ModelPricing::new(0.15, 0.6).with_cached(0.075));
    table.insert("gemini-2.0-flash".to_string(), ModelPricing::new(0.10, 0.40));
    table.insert("llama".to_string(), ModelPricing::new(0.0, 0.0));
    table.insert("ollama".to_string(), ModelPricing::new(0.0, 0.0));
    table
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BudgetStatus {
    pub used: f64,
    pub limit: Option<f64>,
    pub remaining: Option<f64>,
    pub percentage: Option<f64>,
    pub warning: bool,
    pub blocked: bool,
}

struct Inner {
    used: f64,
}

/// Tracks cumulative session cost against an optional hard limit.
pub struct CostTracker {
    pricing: HashMap<String, ModelPricing>,
    limit: Option<f64>,
    warn_at_fraction: f64,
    inner: Mutex<Inner>,
}

impl CostTracker {
    pub fn new(pricing: HashMap<String, ModelPricing>, limit: Option<f64>) -> Self {
        Self {
            pricing,
            limit,
            warn_at_fraction: 0.8,
            inner: Mutex::new(Inner { used: 0.0 }),
        }
    }

    pub fn with_warn_fraction(mut self, fraction: f64) -> Self {
        self.warn_at_fraction = fraction;
        self
    }

    /// Exact model id match, else longest registered id that is a prefix of
    /// `model`, else a zero-cost fallback (never panics on an unknown model).
    fn lookup(&self, model: &str) -> ModelPricing {
        if let Some(p) = self.pricing.get(model) {
            return p.clone();
        }
        self.pricing
            .iter()
            .filter(|(id, _)| model.starts_with(id.as_str()))
            .max_by_key(|(id, _)| id.len())
            .map(|(_, p)| p.clone())
            .unwrap_or_else(|| ModelPricing::new(0.0, 0.0))
    }

    /// Records one LM request's usage against `model`, returning the cost
    /// delta it added.
    #[tracing::instrument(skip(self))]
    pub fn record_request(
        &self,
        model: &str,
        in_prompt_tokens: u64,
        out_completion_tokens: u64,
        cached_tokens: Option<u64>,
    ) -> f64 {
        let pricing = self.lookup(model);
        let delta = pricing.calculate(in_prompt_tokens, out_completion_tokens, cached_tokens.unwrap_or(0));
        let mut inner = self.inner.lock().unwrap();
        inner.used += delta;
        delta
    }

    pub fn budget_status(&self) -> BudgetStatus {
        let used = self.inner.lock().unwrap().used;
        match self.limit {
            None => BudgetStatus {
                used,
                limit: None,
                remaining: None,
                percentage: None,
                warning: false,
                blocked: false,
            },
            Some(limit) => {
                let remaining = (limit - used).max(0.0);
                let percentage = if limit > 0.0 { used / limit } else { 1.0 };
                BudgetStatus {
                    used,
                    limit: Some(limit),
                    remaining: Some(remaining),
                    percentage: Some(percentage),
                    warning: percentage >= self.warn_at_fraction,
                    blocked: used >= limit,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_model_id_takes_priority_over_prefix() {
        let mut table = HashMap::new();
        table.insert("claude".to_string(), ModelPricing::new(1.0, 2.0));
        table.insert("claude-opus-4".to_string(), ModelPricing::new(15.0, 75.0));
        let tracker = CostTracker::new(table, None);
        let delta = tracker.record_request("claude-opus-4", 1_000_000, 0, None);
        assert_eq!(delta, 15.0);
    }

    #[test]
    fn prefix_match_used_when_exact_missing() {
        let mut table = HashMap::new();
        table.insert("claude-opus-4".to_string(), ModelPricing::new(15.0, 75.0));
        let tracker = CostTracker::new(table, None);
        let delta = tracker.record_request("claude-opus-4-20250101", 1_000_000, 0, None);
        assert_eq!(delta, 15.0);
    }

    #[test]
    fn unknown_model_costs_nothing() {
        let tracker = CostTracker::new(HashMap::new(), None);
        let delta = tracker.record_request("mystery-model", 1_000_000, 1_000_000, None);
        assert_eq!(delta, 0.0);
    }

    #[test]
    fn budget_used_equals_sum_of_deltas() {
        let tracker = CostTracker::new(default_pricing_table(), Some(10.0));
        let d1 = tracker.record_request("claude-sonnet-4", 1_000_000, 0, None);
        let d2 = tracker.record_request("claude-sonnet-4", 0, 1_000_000, None);
        let status = tracker.budget_status();
        assert!((status.used - (d1 + d2)).abs() < 1e-9);
    }

    #[test]
    fn budget_status_blocks_once_limit_reached() {
        let tracker = CostTracker::new(default_pricing_table(), Some(1.0));
        tracker.record_request("claude-sonnet-4", 1_000_000, 0, None); // $3
        let status = tracker.budget_status();
        assert!(status.blocked);
    }

    #[test]
    fn budget_status_warns_before_blocking() {
        let tracker = CostTracker::new(default_pricing_table(), Some(10.0)).with_warn_fraction(0.5);
        tracker.record_request("claude-sonnet-4", 2_000_000, 0, None); // $6 of $10
        let status = tracker.budget_status();
        assert!(status.warning);
        assert!(!status.blocked);
    }

    #[test]
    fn no_limit_means_never_blocked() {
        let tracker = CostTracker::new(default_pricing_table(), None);
        tracker.record_request("claude-opus-4", 10_000_000, 10_000_000, None);
        assert!(!tracker.budget_status().blocked);
    }
}
