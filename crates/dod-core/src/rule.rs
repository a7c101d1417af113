use crate::condition::Condition;
use crate::error::{DodError, Result};
use crate::types::{Category, Severity};
use crate::value::{Context, EvalError};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RuleDefinition
// ---------------------------------------------------------------------------

/// A rule as written in a specification file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDefinition {
    pub name: String,
    pub condition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub auto_fix: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_command: Option<String>,
    #[serde(default = "default_telemetry")]
    pub telemetry: bool,
}

fn default_telemetry() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct Rule {
    pub name: String,
    pub category: Category,
    /// Source text, kept for display.
    pub condition: String,
    #[serde(skip)]
    pub predicate: Condition,
    pub severity: Severity,
    pub auto_fix: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix_command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub telemetry: bool,
}

impl Rule {
    pub fn evaluate(&self, ctx: &Context) -> std::result::Result<bool, EvalError> {
        self.predicate.evaluate(ctx)
    }

    pub fn holds(&self, ctx: &Context) -> bool {
        self.predicate.holds(ctx)
    }

    /// The fix command, if auto-fix is enabled and the command is non-blank.
    pub fn fix(&self) -> Option<&str> {
        if !self.auto_fix {
            return None;
        }
        self.fix_command
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

// ---------------------------------------------------------------------------
// RuleCompiler
// ---------------------------------------------------------------------------

/// Turns rule definitions into [`Rule`]s. Referenced context fields are not
/// checked here; a field that never shows up simply reads as `0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleCompiler {
    enforcement: Severity,
}

impl RuleCompiler {
    pub fn new(enforcement: Severity) -> Self {
        Self { enforcement }
    }

    pub fn compile(&self, category: Category, def: &RuleDefinition) -> Result<Rule> {
        let name = def.name.trim();
        if name.is_empty() {
            return Err(DodError::InvalidRule {
                rule: format!("<unnamed {category} rule>"),
                reason: "name must not be empty".to_string(),
            });
        }
        let fix_command = def
            .fix_command
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        if def.auto_fix && fix_command.is_none() {
            return Err(DodError::InvalidRule {
                rule: name.to_string(),
                reason: "auto_fix requires a non-empty fix_command".to_string(),
            });
        }

        Ok(Rule {
            name: name.to_string(),
            category,
            condition: def.condition.clone(),
            predicate: Condition::parse(&def.condition),
            severity: def.severity.unwrap_or(self.enforcement),
            auto_fix: def.auto_fix,
            fix_command,
            description: def.description.clone(),
            telemetry: def.telemetry,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
