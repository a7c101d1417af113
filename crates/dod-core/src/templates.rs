use crate::error::{DodError, Result};
use std::fmt;

/// Starter specifications written by `dod init`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Template {
    Minimal,
    #[default]
    Standard,
    Enterprise,
}

impl Template {
    pub fn all() -> &'static [Template] {
        &[Template::Minimal, Template::Standard, Template::Enterprise]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Template::Minimal => "minimal",
            Template::Standard => "standard",
            Template::Enterprise => "enterprise",
        }
    }

    pub fn body(self) -> &'static str {
        match self {
            Template::Minimal => MINIMAL_SPEC,
            Template::Standard => STANDARD_SPEC,
            Template::Enterprise => ENTERPRISE_SPEC,
        }
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Template {
    type Err = DodError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "minimal" => Ok(Template::Minimal),
            "standard" => Ok(Template::Standard),
            "enterprise" => Ok(Template::Enterprise),
            _ => Err(DodError::InvalidTemplate(s.to_string())),
        }
    }
}

const MINIMAL_SPEC: &str = r#"name: minimal
version: "1.0.0"
enforcement: advisory
categories:
  documentation:
    - name: readme_present
      condition: has_readme == true
      description: Project has a README
  testing:
    - name: tests_present
      condition: has_tests == true
      description: Project has at least one test file
"#;

const STANDARD_SPEC: &str = r#"name: standard
version: "1.0.0"
enforcement: standard
categories:
  documentation:
    - name: readme_present
      condition: has_readme == true
    - name: license_present
      condition: has_license == true
      severity: advisory
  testing:
    - name: tests_present
      condition: has_tests == true
    - name: coverage
      condition: coverage >= 80
      description: Line coverage reported in .dod/metrics.yaml
  code_quality:
    - name: lint_clean
      condition: lint_errors == 0
    - name: todo_budget
      condition: todo_count <= 20
      severity: advisory
  security:
    - name: no_known_vulnerabilities
      condition: vulnerabilities == 0
      severity: strict
"#;

const ENTERPRISE_SPEC: &str = r#"name: enterprise
version: "1.0.0"
enforcement: strict
categories:
  documentation:
    - name: readme_present
      condition: has_readme == true
    - name: license_present
      condition: has_license == true
    - name: changelog_present
      condition: has_changelog == true
  testing:
    - name: tests_present
      condition: has_tests == true
    - name: coverage
      condition: coverage >= 90
    - name: test_ratio
      condition: source_files == 0 or test_files * 4 >= source_files
      description: At least one test file per four source files
      severity: standard
  code_quality:
    - name: lint_clean
      condition: lint_errors == 0
    - name: todo_budget
      condition: todo_count <= 5
      severity: standard
  security:
    - name: no_known_vulnerabilities
      condition: vulnerabilities == 0
      severity: paranoid
    - name: no_secrets
      condition: secrets_found == 0
      severity: paranoid
  operations:
    - name: ci_configured
      condition: has_ci == true
    - name: containerized
      condition: has_dockerfile == true
      severity: advisory
  performance:
    - name: p95_latency
      condition: p95_latency_ms <= 300
      severity: standard
  compliance:
    - name: gitignore_present
      condition: has_gitignore == true
      severity: standard
"#;
