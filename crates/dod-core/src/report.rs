use crate::error::Result;
use crate::evolution::EvolutionSignal;
use crate::runner::ValidationResult;
use crate::spec::Specification;
use crate::types::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub fixes_attempted: usize,
    pub fixes_applied: usize,
}

impl ValidationSummary {
    pub fn from_results(results: &[ValidationResult]) -> Self {
        let passed = results.iter().filter(|r| r.passed).count();
        Self {
            total: results.len(),
            passed,
            failed: results.len() - passed,
            fixes_attempted: results.iter().filter(|r| r.fix_attempted()).count(),
            fixes_applied: results.iter().filter(|r| r.fix_applied).count(),
        }
    }
}

/// Everything one validation run produced, in a form that can be written to
/// disk as JSON or Markdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub spec: String,
    pub spec_version: String,
    pub project: PathBuf,
    pub generated_at: DateTime<Utc>,
    pub summary: ValidationSummary,
    pub results: Vec<ValidationResult>,
    #[serde(default)]
    pub signals: Vec<EvolutionSignal>,
    #[serde(default)]
    pub counters: BTreeMap<String, u64>,
}

impl ValidationReport {
    pub fn new(
        spec: &Specification,
        project: &Path,
        results: Vec<ValidationResult>,
        signals: Vec<EvolutionSignal>,
        counters: BTreeMap<String, u64>,
    ) -> Self {
        Self {
            spec: spec.name.clone(),
            spec_version: spec.version.clone(),
            project: project.to_path_buf(),
            generated_at: Utc::now(),
            summary: ValidationSummary::from_results(&results),
            results,
            signals,
            counters,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(|r| !r.passed)
    }

    /// Failed rules at or above `threshold`.
    pub fn blocking_failures(&self, threshold: Severity) -> impl Iterator<Item = &ValidationResult> {
        self.failures().filter(move |r| r.severity >= threshold)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let s = &self.summary;
        let _ = writeln!(out, "# Definition of Done: {} v{}", self.spec, self.spec_version);
        let _ = writeln!(out);
        let _ = writeln!(out, "- Project: `{}`", self.project.display());
        let _ = writeln!(out, "- Generated: {}", self.generated_at.to_rfc3339());
        let _ = writeln!(
            out,
            "- Result: {}/{} passed, {} failed, {} fixes applied",
            s.passed, s.total, s.failed, s.fixes_applied
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "| Status | Rule | Category | Severity | Condition | Actual |");
        let _ = writeln!(out, "|---|---|---|---|---|---|");
        for r in &self.results {
            let status = match (r.passed, r.fix_applied) {
                (true, _) => "PASS",
                (false, true) => "FIXED",
                (false, false) => "FAIL",
            };
            let actual = r
                .actual_value
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "-".to_string());
            let _ = writeln!(
                out,
                "| {status} | {} | {} | {} | `{}` | {} |",
                r.rule,
                r.category,
                r.severity,
                r.condition.replace('|', "\\|"),
                actual.replace('|', "\\|"),
            );
        }

        if !self.signals.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "## Evolution");
            let _ = writeln!(out);
            for sig in &self.signals {
                let _ = write!(out, "- **{}** `{}`: {}", sig.kind, sig.rule, sig.reason);
                if let Some(p) = &sig.proposed_condition {
                    let _ = write!(out, " (proposed: `{p}`)");
                }
                let _ = writeln!(out);
            }
        }
        out
    }

    /// Write as Markdown for `.md` paths, JSON otherwise.
    pub fn write(&self, path: &Path) -> Result<()> {
        let is_md = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("md"));
        let body = if is_md {
            self.to_markdown()
        } else {
            self.to_json()?
        };
        crate::io::atomic_write(path, body.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Category;
    use crate::value::Value;
    use tempfile::TempDir;

    fn result(rule: &str, severity: Severity, passed: bool) -> ValidationResult {
        ValidationResult {
            rule: rule.to_string(),
            category: Category::Security,
            severity,
            condition: "vulns == 0".to_string(),
            passed,
            actual_value: Some(Value::Int(if passed { 0 } else { 2 })),
            expected_value: Some(Value::Str("0".to_string())),
            message: String::new(),
            fix_applied: false,
            fix_output: None,
            duration_ms: 0.5,
        }
    }

    fn report() -> ValidationReport {
        let spec = Specification::new("web", "2.0", Severity::Standard);
        ValidationReport::new(
            &spec,
            Path::new("/tmp/project"),
            vec![
                result("ok", Severity::Paranoid, true),
                result("soft", Severity::Advisory, false),
                result("hard", Severity::Strict, false),
            ],
            Vec::new(),
            BTreeMap::new(),
        )
    }

    #[test]
    fn summary_counts() {
        let r = report();
        assert_eq!(r.summary.total, 3);
        assert_eq!(r.summary.passed, 1);
        assert_eq!(r.summary.failed, 2);
        assert_eq!(r.summary.fixes_applied, 0);
    }

    #[test]
    fn blocking_failures_respect_threshold() {
        let r = report();
        let names: Vec<&str> = r
            .blocking_failures(Severity::Standard)
            .map(|x| x.rule.as_str())
            .collect();
        assert_eq!(names, ["hard"]);
        assert_eq!(r.blocking_failures(Severity::Advisory).count(), 2);
        assert_eq!(r.blocking_failures(Severity::Paranoid).count(), 0);
    }

    #[test]
    fn markdown_has_table_rows() {
        let md = report().to_markdown();
        assert!(md.starts_with("# Definition of Done: web v2.0"));
        assert!(md.contains("| FAIL | hard | security | strict |"));
        assert!(md.contains("1/3 passed"));
    }

    #[test]
    fn write_picks_format_from_extension() {
        let dir = TempDir::new().unwrap();
        let r = report();
        let json = dir.path().join("out/report.json");
        let md = dir.path().join("out/report.md");
        r.write(&json).unwrap();
        r.write(&md).unwrap();

        let parsed: ValidationReport =
            serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
        assert_eq!(parsed.results.len(), 3);
        assert!(std::fs::read_to_string(&md).unwrap().contains("| Status |"));
    }
}
