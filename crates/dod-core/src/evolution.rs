//! Per-rule performance tracking and tighten / relax / optimize signals.
//!
//! Signals are advisory. A tighten or relax signal carries a rewritten
//! condition when the rule is a simple numeric comparison; the compiled rule
//! itself is never touched.

use crate::condition::Condition;
use crate::error::Result;
use crate::runner::ValidationResult;
use crate::telemetry::{self, Telemetry};
use crate::value::{CmpOp, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

// ---------------------------------------------------------------------------
// RulePerformance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RulePerformance {
    /// Condition text as of the most recent run.
    #[serde(default)]
    pub condition: String,
    pub pass_rate: f64,
    pub avg_duration_ms: f64,
    pub total_runs: u64,
    #[serde(default)]
    pub fix_attempts: u64,
    #[serde(default)]
    pub fix_success_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
}

impl RulePerformance {
    /// Fold one result into the running averages.
    pub fn record(&mut self, result: &ValidationResult, at: DateTime<Utc>) {
        let n = self.total_runs as f64;
        let passed = if result.passed { 1.0 } else { 0.0 };
        self.pass_rate = (self.pass_rate * n + passed) / (n + 1.0);
        self.avg_duration_ms = (self.avg_duration_ms * n + result.duration_ms) / (n + 1.0);
        self.total_runs += 1;

        if result.fix_attempted() {
            let f = self.fix_attempts as f64;
            let applied = if result.fix_applied { 1.0 } else { 0.0 };
            self.fix_success_rate = (self.fix_success_rate * f + applied) / (f + 1.0);
            self.fix_attempts += 1;
        }

        self.condition = result.condition.clone();
        self.last_run = Some(at);
    }
}

// ---------------------------------------------------------------------------
// EvolutionConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionConfig {
    #[serde(default = "default_tighten_pass_rate")]
    pub tighten_pass_rate: f64,
    #[serde(default = "default_tighten_min_runs")]
    pub tighten_min_runs: u64,
    #[serde(default = "default_relax_pass_rate")]
    pub relax_pass_rate: f64,
    #[serde(default = "default_relax_min_runs")]
    pub relax_min_runs: u64,
    #[serde(default = "default_optimize_duration_ms")]
    pub optimize_duration_ms: f64,
}

fn default_tighten_pass_rate() -> f64 {
    0.99
}

fn default_tighten_min_runs() -> u64 {
    100
}

fn default_relax_pass_rate() -> f64 {
    0.10
}

fn default_relax_min_runs() -> u64 {
    50
}

fn default_optimize_duration_ms() -> f64 {
    5000.0
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            tighten_pass_rate: default_tighten_pass_rate(),
            tighten_min_runs: default_tighten_min_runs(),
            relax_pass_rate: default_relax_pass_rate(),
            relax_min_runs: default_relax_min_runs(),
            optimize_duration_ms: default_optimize_duration_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Tighten,
    Relax,
    Optimize,
}

impl SignalKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SignalKind::Tighten => "tighten",
            SignalKind::Relax => "relax",
            SignalKind::Optimize => "optimize",
        }
    }

    fn counter(self) -> &'static str {
        match self {
            SignalKind::Tighten => telemetry::EVOLUTION_TIGHTENED,
            SignalKind::Relax => telemetry::EVOLUTION_RELAXED,
            SignalKind::Optimize => telemetry::EVOLUTION_OPTIMIZED,
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionSignal {
    pub rule: String,
    pub kind: SignalKind,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposed_condition: Option<String>,
}

// ---------------------------------------------------------------------------
// EvolutionEngine
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct EvolutionEngine {
    config: EvolutionConfig,
    performance: BTreeMap<String, RulePerformance>,
    telemetry: Telemetry,
}

impl EvolutionEngine {
    pub fn new(config: EvolutionConfig) -> Self {
        Self {
            config,
            performance: BTreeMap::new(),
            telemetry: Telemetry::new(),
        }
    }

    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub fn performance(&self, rule: &str) -> Option<&RulePerformance> {
        self.performance.get(rule)
    }

    /// Update performance from a batch and return the signals the updated
    /// numbers trigger for the rules in that batch.
    pub fn learn_from_validation(&mut self, results: &[ValidationResult]) -> Vec<EvolutionSignal> {
        let now = Utc::now();
        let mut seen: Vec<&str> = Vec::new();
        for result in results {
            self.performance
                .entry(result.rule.clone())
                .or_default()
                .record(result, now);
            if !seen.contains(&result.rule.as_str()) {
                seen.push(&result.rule);
            }
        }

        let mut signals = Vec::new();
        for name in seen {
            let Some(perf) = self.performance.get(name) else {
                continue;
            };
            for signal in self.check(name, perf) {
                self.telemetry.incr(signal.kind.counter());
                tracing::info!(
                    rule = %signal.rule,
                    kind = %signal.kind,
                    reason = %signal.reason,
                    "evolution signal"
                );
                signals.push(signal);
            }
        }
        signals
    }

    /// Signals for every tracked rule, without recording anything.
    pub fn signals(&self) -> Vec<EvolutionSignal> {
        self.performance
            .iter()
            .flat_map(|(name, perf)| self.check(name, perf))
            .collect()
    }

    fn check(&self, name: &str, perf: &RulePerformance) -> Vec<EvolutionSignal> {
        let cfg = &self.config;
        let mut out = Vec::new();

        if perf.pass_rate > cfg.tighten_pass_rate && perf.total_runs > cfg.tighten_min_runs {
            out.push(EvolutionSignal {
                rule: name.to_string(),
                kind: SignalKind::Tighten,
                reason: format!(
                    "pass rate {:.1}% over {} runs",
                    perf.pass_rate * 100.0,
                    perf.total_runs
                ),
                proposed_condition: propose(&perf.condition, SignalKind::Tighten),
            });
        }
        if perf.pass_rate < cfg.relax_pass_rate && perf.total_runs > cfg.relax_min_runs {
            out.push(EvolutionSignal {
                rule: name.to_string(),
                kind: SignalKind::Relax,
                reason: format!(
                    "pass rate {:.1}% over {} runs",
                    perf.pass_rate * 100.0,
                    perf.total_runs
                ),
                proposed_condition: propose(&perf.condition, SignalKind::Relax),
            });
        }
        if perf.avg_duration_ms > cfg.optimize_duration_ms {
            out.push(EvolutionSignal {
                rule: name.to_string(),
                kind: SignalKind::Optimize,
                reason: format!("average duration {:.0}ms", perf.avg_duration_ms),
                proposed_condition: None,
            });
        }
        out
    }

    pub fn snapshot(&self) -> BTreeMap<String, RulePerformance> {
        self.performance.clone()
    }

    pub fn restore(&mut self, performance: BTreeMap<String, RulePerformance>) {
        self.performance = performance;
    }

    pub fn reset(&mut self) {
        self.performance.clear();
    }

    /// Load persisted performance; a missing file is an empty history.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }
        let data = std::fs::read_to_string(path)?;
        if data.trim().is_empty() {
            return Ok(());
        }
        self.performance = serde_yaml::from_str(&data)?;
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        crate::io::write_yaml(path, &self.performance)
    }
}

/// Tighten moves a numeric threshold 5% of its magnitude towards the strict
/// side, relax 10% towards the loose side. Floats keep the precision of the
/// literal (at least two decimals). Equality checks, non-numeric literals,
/// and changes that round away or land on the wrong side get no proposal.
fn propose(condition: &str, kind: SignalKind) -> Option<String> {
    let Condition::Compare { field, op, value } = Condition::parse(condition) else {
        return None;
    };
    // +1 when a larger threshold is stricter.
    let strict_dir = match op {
        CmpOp::Ge | CmpOp::Gt => 1.0,
        CmpOp::Le | CmpOp::Lt => -1.0,
        _ => return None,
    };
    let (rate, dir) = match kind {
        SignalKind::Tighten => (0.05, strict_dir),
        SignalKind::Relax => (0.10, -strict_dir),
        SignalKind::Optimize => return None,
    };
    let next = match value {
        Value::Int(n) => {
            let x = n as f64;
            let v = (x + dir * rate * x.abs()).round();
            if (v - x) * dir <= 0.0 || !v.is_finite() {
                return None;
            }
            Value::Int(v as i64)
        }
        Value::Float(x) => {
            let scale = 10f64.powi(decimals(x).clamp(2, 6) as i32);
            let v = ((x + dir * rate * x.abs()) * scale).round() / scale;
            if (v - x) * dir <= 0.0 || !v.is_finite() {
                return None;
            }
            Value::Float(v)
        }
        Value::Bool(_) | Value::Str(_) => return None,
    };
    Some(format!("{field} {op} {next}"))
}

fn decimals(x: f64) -> usize {
    let repr = x.to_string();
    repr.split_once('.').map(|(_, frac)| frac.len()).unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, Severity};
    use tempfile::TempDir;

    fn result(rule: &str, condition: &str, passed: bool, duration_ms: f64) -> ValidationResult {
        ValidationResult {
            rule: rule.to_string(),
            category: Category::Testing,
            severity: Severity::Standard,
            condition: condition.to_string(),
            passed,
            actual_value: None,
            expected_value: None,
            message: String::new(),
            fix_applied: false,
            fix_output: None,
            duration_ms,
        }
    }

    fn feed(engine: &mut EvolutionEngine, r: &ValidationResult, times: usize) -> Vec<EvolutionSignal> {
        let mut last = Vec::new();
        for _ in 0..times {
            last = engine.learn_from_validation(std::slice::from_ref(r));
        }
        last
    }

    #[test]
    fn running_averages() {
        let mut engine = EvolutionEngine::default();
        engine.learn_from_validation(&[result("cov", "coverage >= 80", true, 10.0)]);
        engine.learn_from_validation(&[result("cov", "coverage >= 80", false, 30.0)]);
        let perf = engine.performance("cov").unwrap();
        assert_eq!(perf.total_runs, 2);
        assert_eq!(perf.pass_rate, 0.5);
        assert_eq!(perf.avg_duration_ms, 20.0);
        assert!(perf.last_run.is_some());
    }

    #[test]
    fn fix_success_rate_counts_only_attempts() {
        let mut engine = EvolutionEngine::default();
        let mut r = result("fmt", "format_errors == 0", false, 1.0);
        engine.learn_from_validation(std::slice::from_ref(&r));
        r.fix_output = Some(String::new());
        r.fix_applied = true;
        engine.learn_from_validation(std::slice::from_ref(&r));
        let perf = engine.performance("fmt").unwrap();
        assert_eq!(perf.fix_attempts, 1);
        assert_eq!(perf.fix_success_rate, 1.0);
    }

    #[test]
    fn always_passing_rule_tightens_after_enough_runs() {
        let mut engine = EvolutionEngine::default();
        let r = result("cov", "coverage >= 80", true, 1.0);
        assert!(feed(&mut engine, &r, 100).is_empty(), "needs more than 100 runs");
        let signals = feed(&mut engine, &r, 1);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].kind, SignalKind::Tighten);
        assert_eq!(signals[0].proposed_condition.as_deref(), Some("coverage >= 84"));
        assert_eq!(engine.telemetry().get(telemetry::EVOLUTION_TIGHTENED), 1);
    }

    #[test]
    fn always_failing_rule_relaxes() {
        let mut engine = EvolutionEngine::default();
        let r = result("lat", "p99_latency_ms <= 200", false, 1.0);
        let signals = feed(&mut engine, &r, 51);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].kind, SignalKind::Relax);
        assert_eq!(
            signals[0].proposed_condition.as_deref(),
            Some("p99_latency_ms <= 220")
        );
    }

    #[test]
    fn slow_rule_signals_optimize_immediately() {
        let mut engine = EvolutionEngine::default();
        let signals = engine.learn_from_validation(&[result("scan", "vulns == 0", true, 6000.0)]);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].kind, SignalKind::Optimize);
        assert!(signals[0].proposed_condition.is_none());
    }

    #[test]
    fn thresholds_are_configurable() {
        let mut engine = EvolutionEngine::new(EvolutionConfig {
            tighten_min_runs: 2,
            ..EvolutionConfig::default()
        });
        let signals = feed(&mut engine, &result("cov", "coverage >= 90.0", true, 1.0), 3);
        assert_eq!(signals[0].proposed_condition.as_deref(), Some("coverage >= 94.5"));
    }

    #[test]
    fn equality_and_expressions_get_no_proposal() {
        assert_eq!(propose("errors == 0", SignalKind::Tighten), None);
        assert_eq!(propose("a + b >= 10", SignalKind::Relax), None);
        assert_eq!(propose("errors <= 0", SignalKind::Tighten), None);
    }

    #[test]
    fn negative_thresholds_move_the_right_way() {
        assert_eq!(
            propose("balance >= -100", SignalKind::Tighten).as_deref(),
            Some("balance >= -95")
        );
        assert_eq!(
            propose("balance >= -100", SignalKind::Relax).as_deref(),
            Some("balance >= -110")
        );
        assert_eq!(
            propose("delta <= -100", SignalKind::Tighten).as_deref(),
            Some("delta <= -105")
        );
        assert_eq!(propose("balance >= -10", SignalKind::Tighten), None);
    }

    #[test]
    fn small_floats_keep_their_precision() {
        assert_eq!(propose("error_rate <= 0.001", SignalKind::Relax), None);
        assert_eq!(propose("error_rate <= 0.001", SignalKind::Tighten), None);
        assert_eq!(
            propose("error_rate <= 0.125", SignalKind::Tighten).as_deref(),
            Some("error_rate <= 0.119")
        );
    }

    #[test]
    fn persistence_round_trips_through_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".dod/performance.yaml");
        let mut engine = EvolutionEngine::default();
        engine.learn_from_validation(&[result("cov", "coverage >= 80", true, 2.0)]);
        engine.save(&path).unwrap();

        let mut loaded = EvolutionEngine::default();
        loaded.load(&path).unwrap();
        assert_eq!(loaded.snapshot(), engine.snapshot());

        loaded.reset();
        assert!(loaded.performance("cov").is_none());
    }

    #[test]
    fn load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let mut engine = EvolutionEngine::default();
        engine.load(&dir.path().join("nope.yaml")).unwrap();
        assert!(engine.snapshot().is_empty());
    }
}
