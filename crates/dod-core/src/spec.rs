use crate::error::{DodError, Result};
use crate::rule::{Rule, RuleCompiler, RuleDefinition};
use crate::telemetry::{self, Telemetry};
use crate::types::{Category, Severity};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// SpecificationDocument (on-disk shape)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecificationDocument {
    pub name: String,
    #[serde(default = "default_version", deserialize_with = "version_string")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub enforcement: Severity,
    /// Category name → rule list. Kept as a raw mapping so document order
    /// survives deserialization.
    #[serde(default)]
    pub categories: serde_yaml::Mapping,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

/// `version: 1.0` parses as a YAML float; accept it as the string it was.
fn version_string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    use serde::de::Error;
    match serde_yaml::Value::deserialize(d)? {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!("invalid version: {other:?}"))),
    }
}

// ---------------------------------------------------------------------------
// Specification
// ---------------------------------------------------------------------------

/// A compiled specification. Owns its rules and the name index used to look
/// them up; nothing is shared between specifications.
#[derive(Debug, Clone, Serialize)]
pub struct Specification {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub enforcement: Severity,
    rules: Vec<Rule>,
    #[serde(skip)]
    registry: HashMap<String, usize>,
    #[serde(skip)]
    source: Option<PathBuf>,
}

impl Specification {
    pub fn new(name: impl Into<String>, version: impl Into<String>, enforcement: Severity) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            extends: None,
            description: None,
            enforcement,
            rules: Vec::new(),
            registry: HashMap::new(),
            source: None,
        }
    }

    /// Rules in declaration order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.registry.get(name).map(|&i| &self.rules[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.registry.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules_in(&self, category: Category) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(move |r| r.category == category)
    }

    /// Registered rule names, in declaration order.
    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.name.as_str())
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Replace a rule of the same name in place, or append it.
    fn upsert(&mut self, rule: Rule) {
        match self.registry.get(&rule.name) {
            Some(&i) => self.rules[i] = rule,
            None => {
                self.registry.insert(rule.name.clone(), self.rules.len());
                self.rules.push(rule);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SpecificationCompiler
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct SpecificationCompiler {
    telemetry: Telemetry,
}

impl SpecificationCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Load and compile the YAML specification at `path`, resolving
    /// `extends` against sibling files.
    pub fn compile_specification(&mut self, path: &Path) -> Result<Specification> {
        let _span = tracing::info_span!("compile_specification", path = %path.display()).entered();
        let mut chain = Vec::new();
        let spec = self.compile_path(path, &mut chain)?;
        tracing::info!(
            spec = %spec.name,
            version = %spec.version,
            rules = spec.len(),
            "specification compiled"
        );
        Ok(spec)
    }

    /// Compile a specification held in memory. `extends` cannot be resolved
    /// without a directory and is reported as a missing parent.
    pub fn compile_str(&mut self, yaml: &str) -> Result<Specification> {
        let doc: SpecificationDocument = serde_yaml::from_str(yaml)?;
        self.compile_document(doc, None, &mut Vec::new())
    }

    fn compile_path(&mut self, path: &Path, chain: &mut Vec<PathBuf>) -> Result<Specification> {
        let data = std::fs::read_to_string(path).map_err(|e| DodError::SpecLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if chain.contains(&key) {
            chain.push(key);
            let cycle: Vec<String> = chain.iter().map(|p| p.display().to_string()).collect();
            return Err(DodError::ExtendsCycle(cycle.join(" -> ")));
        }
        chain.push(key);
        let doc: SpecificationDocument =
            serde_yaml::from_str(&data).map_err(|e| DodError::SpecLoad {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        let mut spec = self.compile_document(doc, path.parent(), chain)?;
        chain.pop();
        spec.source = Some(path.to_path_buf());
        Ok(spec)
    }

    fn compile_document(
        &mut self,
        doc: SpecificationDocument,
        dir: Option<&Path>,
        chain: &mut Vec<PathBuf>,
    ) -> Result<Specification> {
        let mut spec = match &doc.extends {
            Some(parent) => {
                let parent_path = dir
                    .and_then(|d| find_parent(d, parent))
                    .ok_or_else(|| DodError::ParentNotFound(parent.clone()))?;
                tracing::debug!(parent = %parent, path = %parent_path.display(), "resolving parent specification");
                self.compile_path(&parent_path, chain)?
            }
            None => Specification::new(doc.name.clone(), doc.version.clone(), doc.enforcement),
        };
        spec.name = doc.name.clone();
        spec.version = doc.version.clone();
        spec.extends = doc.extends.clone();
        spec.description = doc.description.clone();
        spec.enforcement = doc.enforcement;
        spec.source = None;

        let compiler = RuleCompiler::new(doc.enforcement);
        let mut declared: HashSet<String> = HashSet::new();

        for (key, value) in &doc.categories {
            let key = key
                .as_str()
                .ok_or_else(|| DodError::UnknownCategory(format!("{key:?}")))?;
            let category: Category = key.parse()?;
            if value.is_null() {
                continue;
            }
            let defs: Vec<RuleDefinition> = serde_yaml::from_value(value.clone())?;
            for def in &defs {
                let rule = compiler.compile(category, def)?;
                if !declared.insert(rule.name.clone()) {
                    return Err(DodError::DuplicateRule(rule.name));
                }
                if !rule.predicate.is_valid() {
                    self.telemetry.incr(telemetry::PARSE_ERRORS);
                    tracing::warn!(
                        rule = %rule.name,
                        condition = %rule.condition,
                        "condition could not be parsed; the rule will always fail"
                    );
                }
                self.telemetry.incr(telemetry::COMPILE_RULES);
                spec.upsert(rule);
            }
        }

        self.telemetry.incr(telemetry::COMPILE_SPECS);
        Ok(spec)
    }
}

fn find_parent(dir: &Path, name: &str) -> Option<PathBuf> {
    ["yaml", "yml"]
        .iter()
        .map(|ext| dir.join(format!("{name}.{ext}")))
        .find(|p| p.is_file())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
name: sample
version: 2.1.0
enforcement: strict
categories:
  testing:
    - name: cov
      condition: coverage >= 80
    - name: tests_pass
      condition: test_failures == 0
      severity: paranoid
  code_quality:
    - name: lint
      condition: lint_errors == 0
      auto_fix: true
      fix_command: ruff check --fix .
  documentation:
"#;

    #[test]
    fn compiles_every_rule_in_document_order() {
        let mut compiler = SpecificationCompiler::new();
        let spec = compiler.compile_str(SAMPLE).unwrap();
        assert_eq!(spec.name, "sample");
        assert_eq!(spec.version, "2.1.0");
        assert_eq!(spec.enforcement, Severity::Strict);
        assert_eq!(spec.len(), 3);
        let names: Vec<_> = spec.rule_names().collect();
        assert_eq!(names, vec!["cov", "tests_pass", "lint"]);
        for name in names {
            assert_eq!(spec.rule_names().filter(|n| *n == name).count(), 1);
            assert!(spec.contains(name));
        }
        assert_eq!(compiler.telemetry().get(telemetry::COMPILE_RULES), 3);
    }

    #[test]
    fn enforcement_applies_to_rules_without_severity() {
        let spec = SpecificationCompiler::new().compile_str(SAMPLE).unwrap();
        assert_eq!(spec.rule("cov").unwrap().severity, Severity::Strict);
        assert_eq!(spec.rule("tests_pass").unwrap().severity, Severity::Paranoid);
        assert_eq!(spec.rules_in(Category::Testing).count(), 2);
    }

    #[test]
    fn numeric_version_accepted() {
        let spec = SpecificationCompiler::new()
            .compile_str("name: v\nversion: 1.5\n")
            .unwrap();
        assert_eq!(spec.version, "1.5");
        assert!(spec.is_empty());
    }

    #[test]
    fn duplicate_rule_names_rejected() {
        let yaml = "name: d\ncategories:\n  testing:\n    - {name: a, condition: x > 1}\n  security:\n    - {name: a, condition: y > 1}\n";
        let err = SpecificationCompiler::new().compile_str(yaml).unwrap_err();
        assert!(matches!(err, DodError::DuplicateRule(ref n) if n == "a"));
    }

    #[test]
    fn unknown_category_rejected() {
        let yaml = "name: d\ncategories:\n  vibes:\n    - {name: a, condition: x > 1}\n";
        let err = SpecificationCompiler::new().compile_str(yaml).unwrap_err();
        assert!(matches!(err, DodError::UnknownCategory(_)));
    }

    #[test]
    fn malformed_conditions_are_counted_not_fatal() {
        let yaml = "name: d\ncategories:\n  testing:\n    - {name: a, condition: 'coverage >=>= 80'}\n";
        let mut compiler = SpecificationCompiler::new();
        let spec = compiler.compile_str(yaml).unwrap();
        assert_eq!(spec.len(), 1);
        assert_eq!(compiler.telemetry().get(telemetry::PARSE_ERRORS), 1);
    }

    #[test]
    fn missing_file_is_load_error() {
        let dir = TempDir::new().unwrap();
        let err = SpecificationCompiler::new()
            .compile_specification(&dir.path().join("nope.yaml"))
            .unwrap_err();
        assert!(matches!(err, DodError::SpecLoad { .. }));
    }

    #[test]
    fn malformed_yaml_is_load_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "name: [unclosed\n").unwrap();
        let err = SpecificationCompiler::new()
            .compile_specification(&path)
            .unwrap_err();
        assert!(matches!(err, DodError::SpecLoad { .. }));
    }

    #[test]
    fn extends_merges_parent_rules() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("base.yaml"),
            "name: base\nenforcement: advisory\ncategories:\n  testing:\n    - {name: cov, condition: coverage >= 60}\n    - {name: tests, condition: test_failures == 0}\n",
        )
        .unwrap();
        let child = dir.path().join("child.yaml");
        std::fs::write(
            &child,
            "name: child\nextends: base\nenforcement: strict\ncategories:\n  testing:\n    - {name: cov, condition: coverage >= 90}\n  security:\n    - {name: vulns, condition: vulnerabilities == 0}\n",
        )
        .unwrap();

        let spec = SpecificationCompiler::new()
            .compile_specification(&child)
            .unwrap();
        assert_eq!(spec.name, "child");
        assert_eq!(spec.extends.as_deref(), Some("base"));
        let names: Vec<_> = spec.rule_names().collect();
        assert_eq!(names, vec!["cov", "tests", "vulns"]);
        let cov = spec.rule("cov").unwrap();
        assert_eq!(cov.condition, "coverage >= 90");
        assert_eq!(cov.severity, Severity::Strict);
        assert_eq!(spec.rule("tests").unwrap().severity, Severity::Advisory);
        assert_eq!(spec.source(), Some(child.as_path()));
    }

    #[test]
    fn extends_cycle_detected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.yaml"), "name: a\nextends: b\n").unwrap();
        std::fs::write(dir.path().join("b.yaml"), "name: b\nextends: a\n").unwrap();
        let err = SpecificationCompiler::new()
            .compile_specification(&dir.path().join("a.yaml"))
            .unwrap_err();
        assert!(matches!(err, DodError::ExtendsCycle(_)));
    }

    #[test]
    fn parent_sharing_the_child_name_is_not_a_cycle() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("base.yaml"),
            "name: web\ncategories:\n  testing:\n    - name: cov\n      condition: coverage >= 70\n",
        )
        .unwrap();
        let child = dir.path().join("web.yaml");
        std::fs::write(
            &child,
            "name: web\nextends: base\ncategories:\n  testing:\n    - name: cov\n      condition: coverage >= 85\n",
        )
        .unwrap();
        let spec = SpecificationCompiler::new()
            .compile_specification(&child)
            .unwrap();
        assert_eq!(spec.name, "web");
        assert_eq!(spec.rule("cov").unwrap().condition, "coverage >= 85");
    }

    #[test]
    fn self_extension_is_a_cycle() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("loop.yaml");
        std::fs::write(&path, "name: other\nextends: loop\n").unwrap();
        let err = SpecificationCompiler::new()
            .compile_specification(&path)
            .unwrap_err();
        assert!(matches!(err, DodError::ExtendsCycle(_)));
    }

    #[test]
    fn extends_missing_parent() {
        let err = SpecificationCompiler::new()
            .compile_str("name: orphan\nextends: nowhere\n")
            .unwrap_err();
        assert!(matches!(err, DodError::ParentNotFound(ref p) if p == "nowhere"));
    }
}
