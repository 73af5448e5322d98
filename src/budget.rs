//! Dollar-denominated budget ledger.
//!
//! Three counters gate every spend-generating step:
//! - per-project cumulative spend, reset explicitly at project start
//! - rolling daily spend, reset automatically 24h after the window began
//!   (monotonic clock, so wall-clock skew cannot shrink or stretch the window)
//! - per-phase spend, capped optionally as a fraction of the total budget
//!
//! Cap breaches are reported as a `false` return, never an error - callers
//! must treat it as "stop spending in this run," not a retryable condition.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::warn;

const SECONDS_PER_DAY: u64 = 86_400;

/// Per-model pricing: (input $/Mtok, output $/Mtok). Owned by whoever needs
/// it - one instance per tracker, never a process-wide global, so tests can
/// construct isolated tables.
#[derive(Debug, Clone)]
pub struct PricingTable {
    prices: BTreeMap<String, (f64, f64)>,
}

impl Default for PricingTable {
    fn default() -> Self {
        let mut prices = BTreeMap::new();
        for (model, input, output) in [
            ("claude-haiku-4-5-20251001", 0.80, 4.00),
            ("claude-sonnet-4-5-20250929", 3.00, 15.00),
            ("gpt-4o", 2.50, 10.00),
            ("gpt-4o-mini", 0.15, 0.60),
            ("o3-mini", 1.10, 4.40),
            ("gemini-2.5-pro", 1.25, 10.00),
            ("gemini-2.5-flash", 0.15, 0.60),
            ("gemini-2.5-flash-lite", 0.075, 0.30),
        ] {
            prices.insert(model.to_string(), (input, output));
        }
        Self { prices }
    }
}

impl PricingTable {
    /// Merge user-configured overrides into the table.
    pub fn with_overrides(mut self, overrides: BTreeMap<String, (f64, f64)>) -> Self {
        self.prices.extend(overrides);
        self
    }

    /// Look up pricing for a model. Exact match first, then prefix match in
    /// either direction (model ids carry date suffixes that configs often
    /// omit). Unknown models fall back to the cheapest known tier with a
    /// warning - never a hard failure.
    pub fn pricing_for(&self, model: &str) -> (f64, f64) {
        if let Some(&pricing) = self.prices.get(model) {
            return pricing;
        }
        for (key, &pricing) in &self.prices {
            if key.starts_with(model) || model.starts_with(key.as_str()) {
                return pricing;
            }
        }
        let cheapest = self
            .prices
            .values()
            .copied()
            .min_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
            .unwrap_or((0.0, 0.0));
        warn!(
            "Unknown model {:?} - defaulting to cheapest known tier (${}/Mtok in)",
            model, cheapest.0
        );
        cheapest
    }
}

/// Tracks per-project and daily spend in dollars.
#[derive(Debug)]
pub struct BudgetTracker {
    pub per_project_cap: f64,
    pub daily_cap: f64,
    pricing: PricingTable,
    input_cost_per_million: f64,
    output_cost_per_million: f64,
    project_spend: f64,
    project_tokens_in: u64,
    project_tokens_out: u64,
    daily_spend: f64,
    day_start: Instant,
    #[cfg(test)]
    test_skew: std::time::Duration,
}

impl BudgetTracker {
    pub fn new(per_project_cap: f64, daily_cap: f64, pricing: PricingTable) -> Self {
        Self {
            per_project_cap,
            daily_cap,
            pricing,
            input_cost_per_million: 0.0,
            output_cost_per_million: 0.0,
            project_spend: 0.0,
            project_tokens_in: 0,
            project_tokens_out: 0,
            daily_spend: 0.0,
            day_start: Instant::now(),
            #[cfg(test)]
            test_skew: std::time::Duration::ZERO,
        }
    }

    /// Adopt a model's pricing for subsequent token recording.
    pub fn set_model_pricing(&mut self, model: &str) {
        let (input, output) = self.pricing.pricing_for(model);
        self.input_cost_per_million = input;
        self.output_cost_per_million = output;
    }

    pub fn tokens_to_dollars(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        input_tokens as f64 * self.input_cost_per_million / 1_000_000.0
            + output_tokens as f64 * self.output_cost_per_million / 1_000_000.0
    }

    fn day_elapsed_secs(&self) -> u64 {
        let elapsed = self.day_start.elapsed();
        #[cfg(test)]
        let elapsed = elapsed + self.test_skew;
        elapsed.as_secs()
    }

    fn maybe_reset_day(&mut self) {
        if self.day_elapsed_secs() >= SECONDS_PER_DAY {
            self.daily_spend = 0.0;
            self.day_start = Instant::now();
            #[cfg(test)]
            {
                self.test_skew = std::time::Duration::ZERO;
            }
        }
    }

    /// Reset per-project tracking for a new run. Daily spend is untouched.
    pub fn start_project(&mut self) {
        self.project_spend = 0.0;
        self.project_tokens_in = 0;
        self.project_tokens_out = 0;
    }

    /// Record token usage at the current model pricing.
    ///
    /// Returns false the instant either the per-project or the daily cap is
    /// exceeded. The spend is still recorded - the ledger never lies about
    /// what was spent, it only refuses to authorize more.
    pub fn record_tokens(&mut self, input_tokens: u64, output_tokens: u64) -> bool {
        let cost = self.tokens_to_dollars(input_tokens, output_tokens);
        self.record_spend_internal(cost, input_tokens, output_tokens)
    }

    /// Record a pre-computed dollar amount.
    pub fn record_spend(&mut self, cost: f64) -> bool {
        self.record_spend_internal(cost, 0, 0)
    }

    fn record_spend_internal(&mut self, cost: f64, input_tokens: u64, output_tokens: u64) -> bool {
        self.maybe_reset_day();
        self.project_spend += cost;
        self.project_tokens_in += input_tokens;
        self.project_tokens_out += output_tokens;
        self.daily_spend += cost;

        if self.project_spend > self.per_project_cap {
            warn!(
                "Per-project budget exceeded: ${:.4} > ${:.2}",
                self.project_spend, self.per_project_cap
            );
            return false;
        }
        if self.daily_spend > self.daily_cap {
            warn!(
                "Daily budget exceeded: ${:.4} > ${:.2}",
                self.daily_spend, self.daily_cap
            );
            return false;
        }
        true
    }

    /// Check whether the project cap is blown without recording anything.
    pub fn is_exceeded(&self) -> bool {
        self.project_spend > self.per_project_cap
    }

    pub fn project_spend(&self) -> f64 {
        self.project_spend
    }

    pub fn project_tokens(&self) -> (u64, u64) {
        (self.project_tokens_in, self.project_tokens_out)
    }

    pub fn budget_remaining(&self) -> f64 {
        (self.per_project_cap - self.project_spend).max(0.0)
    }

    pub fn spend_percentage(&self) -> f64 {
        if self.per_project_cap <= 0.0 {
            return 100.0;
        }
        self.project_spend / self.per_project_cap * 100.0
    }

    pub fn daily_spend(&mut self) -> f64 {
        self.maybe_reset_day();
        self.daily_spend
    }

    #[cfg(test)]
    fn backdate_day_start(&mut self, secs: u64) {
        self.test_skew += std::time::Duration::from_secs(secs);
    }
}

/// Budget tracking broken down by pipeline phase.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseBudget {
    /// Spend per phase, e.g. {"interview": 0.50, "decompose": 1.20}.
    #[serde(default)]
    pub phase_spend: BTreeMap<String, f64>,
    /// Max spend per phase as a fraction of total budget, e.g. {"shape": 0.15}.
    #[serde(default)]
    pub phase_caps: BTreeMap<String, f64>,
}

impl PhaseBudget {
    /// Standard construction: cap only the shape phase, by a fraction of the
    /// total budget. Zero disables the cap.
    pub fn with_shape_cap(shape_budget_pct: f64) -> Self {
        let mut phase_caps = BTreeMap::new();
        if shape_budget_pct > 0.0 {
            phase_caps.insert("shape".to_string(), shape_budget_pct);
        }
        Self {
            phase_spend: BTreeMap::new(),
            phase_caps,
        }
    }

    /// Record spending against a named phase.
    pub fn record_spend(&mut self, phase: &str, amount: f64) {
        *self.phase_spend.entry(phase.to_string()).or_insert(0.0) += amount;
    }

    /// Whether a phase still has budget under its cap.
    ///
    /// Phases without a configured cap always pass.
    pub fn check_phase_budget(&self, phase: &str, total_budget: f64) -> bool {
        let Some(cap_fraction) = self.phase_caps.get(phase) else {
            return true;
        };
        let spent = self.phase_spend.get(phase).copied().unwrap_or(0.0);
        spent < cap_fraction * total_budget
    }

    /// Tracked phases with their spend and cap fraction, for status output.
    pub fn phase_summary(&self) -> BTreeMap<String, (f64, Option<f64>)> {
        let mut result = BTreeMap::new();
        for phase in self.phase_spend.keys().chain(self.phase_caps.keys()) {
            let spent = self.phase_spend.get(phase).copied().unwrap_or(0.0);
            let cap = self.phase_caps.get(phase).copied();
            result.insert(phase.clone(), (spent, cap));
        }
        result
    }
}
