use crate::autofix::AutoFixApplier;
use crate::condition::display_operands;
use crate::context::ContextProvider;
use crate::rule::Rule;
use crate::spec::Specification;
use crate::telemetry::{self, Telemetry};
use crate::types::{Category, Severity};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;

// ---------------------------------------------------------------------------
// ValidationResult
// ---------------------------------------------------------------------------

/// Outcome of evaluating one rule against one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub rule: String,
    pub category: Category,
    pub severity: Severity,
    pub condition: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_value: Option<Value>,
    pub message: String,
    #[serde(default)]
    pub fix_applied: bool,
    /// Present only when a fix was attempted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_output: Option<String>,
    pub duration_ms: f64,
}

impl ValidationResult {
    pub fn fix_attempted(&self) -> bool {
        self.fix_output.is_some()
    }
}

// ---------------------------------------------------------------------------
// ValidationRunner
// ---------------------------------------------------------------------------

/// Evaluates every rule of a specification in declaration order.
///
/// A rule that fails, errors, or whose fix fails never stops the batch.
/// Fixes are only attempted for failed rules with `auto_fix` set, and only
/// when the caller asks for them; a successful fix does not flip `passed`.
pub struct ValidationRunner {
    provider: Box<dyn ContextProvider>,
    fixer: AutoFixApplier,
    telemetry: Telemetry,
}

impl ValidationRunner {
    pub fn new(provider: impl ContextProvider + 'static) -> Self {
        Self {
            provider: Box::new(provider),
            fixer: AutoFixApplier::default(),
            telemetry: Telemetry::new(),
        }
    }

    pub fn with_fixer(mut self, fixer: AutoFixApplier) -> Self {
        self.fixer = fixer;
        self
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub fn validate_project(
        &mut self,
        project: &Path,
        spec: &Specification,
        fix_issues: bool,
    ) -> Vec<ValidationResult> {
        let _span = tracing::info_span!(
            "validate_project",
            project = %project.display(),
            spec = %spec.name,
            rules = spec.len(),
        )
        .entered();

        let results: Vec<ValidationResult> = spec
            .rules()
            .iter()
            .map(|rule| self.validate_rule(project, rule, fix_issues))
            .collect();

        let failed = results.iter().filter(|r| !r.passed).count();
        tracing::info!(
            total = results.len(),
            failed,
            "validation finished"
        );
        results
    }

    fn validate_rule(&mut self, project: &Path, rule: &Rule, fix_issues: bool) -> ValidationResult {
        let start = Instant::now();
        let ctx = self.provider.gather(project, rule);
        let outcome = rule.evaluate(&ctx);
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        let operands = display_operands(&rule.condition);
        let expected_value = operands.expected.map(Value::Str);

        let (passed, actual_value, message) = match outcome {
            Ok(passed) => {
                let actual = operands.actual_key.and_then(|k| ctx.get(&k).cloned());
                let message = if passed {
                    format!("{} passed", rule.name)
                } else {
                    format!("{} failed: {}", rule.name, rule.condition)
                };
                (passed, actual, message)
            }
            Err(e) => {
                if rule.telemetry {
                    self.telemetry.incr(telemetry::EVAL_ERRORS);
                }
                tracing::warn!(rule = %rule.name, error = %e, "rule evaluation failed");
                let text = e.to_string();
                (
                    false,
                    Some(Value::Str(text.clone())),
                    format!("{} errored: {text}", rule.name),
                )
            }
        };

        if rule.telemetry {
            self.telemetry.incr(if passed {
                telemetry::RULES_PASSED
            } else {
                telemetry::RULES_FAILED
            });
            self.telemetry.observe(telemetry::RULE_DURATION_MS, duration_ms);
        }

        let mut result = ValidationResult {
            rule: rule.name.clone(),
            category: rule.category,
            severity: rule.severity,
            condition: rule.condition.clone(),
            passed,
            actual_value,
            expected_value,
            message,
            fix_applied: false,
            fix_output: None,
            duration_ms,
        };

        if !passed && fix_issues && rule.fix().is_some() {
            let fix = self.fixer.run(project, rule);
            if rule.telemetry {
                self.telemetry.incr(telemetry::FIX_ATTEMPTS);
                self.telemetry.incr(if fix.applied {
                    telemetry::FIX_APPLIED
                } else {
                    telemetry::FIX_FAILED
                });
                self.telemetry.observe(telemetry::FIX_DURATION_MS, fix.duration_ms);
            }
            result.fix_applied = fix.applied;
            result.fix_output = Some(fix.output);
        }

        tracing::debug!(
            rule = %result.rule,
            passed = result.passed,
            fix_applied = result.fix_applied,
            duration_ms,
            "rule evaluated"
        );
        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
