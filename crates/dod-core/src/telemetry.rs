//! In-process counters and histograms.
//!
//! Every update is also emitted as a `tracing` event, so a subscriber can
//! forward them; nothing here blocks or fails.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const COMPILE_RULES: &str = "compile.rules";
pub const COMPILE_SPECS: &str = "compile.specifications";
pub const PARSE_ERRORS: &str = "condition.parse_errors";
pub const EVAL_ERRORS: &str = "rule.evaluation_errors";
pub const RULES_PASSED: &str = "rule.passed";
pub const RULES_FAILED: &str = "rule.failed";
pub const FIX_ATTEMPTS: &str = "fix.attempts";
pub const FIX_APPLIED: &str = "fix.applied";
pub const FIX_FAILED: &str = "fix.failed";
pub const EVOLUTION_TIGHTENED: &str = "evolution.tightened";
pub const EVOLUTION_RELAXED: &str = "evolution.relaxed";
pub const EVOLUTION_OPTIMIZED: &str = "evolution.optimized";
pub const RULE_DURATION_MS: &str = "rule.duration_ms";
pub const FIX_DURATION_MS: &str = "fix.duration_ms";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub count: u64,
    pub sum: f64,
    pub max: f64,
}

impl Histogram {
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    #[serde(default)]
    counters: BTreeMap<String, u64>,
    #[serde(default)]
    histograms: BTreeMap<String, Histogram>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(&mut self, name: &str) {
        self.add(name, 1);
    }

    pub fn add(&mut self, name: &str, n: u64) {
        let value = self.counters.entry(name.to_string()).or_insert(0);
        *value += n;
        tracing::debug!(counter = name, value = *value, "telemetry counter");
    }

    pub fn observe(&mut self, name: &str, sample: f64) {
        let h = self.histograms.entry(name.to_string()).or_default();
        h.count += 1;
        h.sum += sample;
        if sample > h.max {
            h.max = sample;
        }
        tracing::trace!(histogram = name, sample, "telemetry sample");
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn histogram(&self, name: &str) -> Option<&Histogram> {
        self.histograms.get(name)
    }

    pub fn counters(&self) -> &BTreeMap<String, u64> {
        &self.counters
    }

    /// Owned copy of the counters, for reports.
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counters.clone()
    }

    /// Fold another registry's counts into this one.
    pub fn absorb(&mut self, other: &Telemetry) {
        for (name, n) in &other.counters {
            *self.counters.entry(name.clone()).or_insert(0) += n;
        }
        for (name, h) in &other.histograms {
            let mine = self.histograms.entry(name.clone()).or_default();
            mine.count += h.count;
            mine.sum += h.sum;
            mine.max = mine.max.max(h.max);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let mut t = Telemetry::new();
        t.incr(RULES_PASSED);
        t.add(RULES_PASSED, 2);
        assert_eq!(t.get(RULES_PASSED), 3);
        assert_eq!(t.get(RULES_FAILED), 0);
    }

    #[test]
    fn histogram_tracks_mean_and_max() {
        let mut t = Telemetry::new();
        t.observe(RULE_DURATION_MS, 2.0);
        t.observe(RULE_DURATION_MS, 4.0);
        let h = t.histogram(RULE_DURATION_MS).unwrap();
        assert_eq!(h.count, 2);
        assert_eq!(h.mean(), 3.0);
        assert_eq!(h.max, 4.0);
    }

    #[test]
    fn absorb_merges() {
        let mut a = Telemetry::new();
        a.incr(FIX_ATTEMPTS);
        let mut b = Telemetry::new();
        b.add(FIX_ATTEMPTS, 4);
        b.observe(FIX_DURATION_MS, 10.0);
        a.absorb(&b);
        assert_eq!(a.get(FIX_ATTEMPTS), 5);
        assert_eq!(a.histogram(FIX_DURATION_MS).unwrap().count, 1);
    }
}
