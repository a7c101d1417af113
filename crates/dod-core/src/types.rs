use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    CodeQuality,
    Testing,
    Security,
    Documentation,
    Performance,
    Operations,
    Compliance,
    Accessibility,
}

impl Category {
    pub fn all() -> &'static [Category] {
        &[
            Category::CodeQuality,
            Category::Testing,
            Category::Security,
            Category::Documentation,
            Category::Performance,
            Category::Operations,
            Category::Compliance,
            Category::Accessibility,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::CodeQuality => "code_quality",
            Category::Testing => "testing",
            Category::Security => "security",
            Category::Documentation => "documentation",
            Category::Performance => "performance",
            Category::Operations => "operations",
            Category::Compliance => "compliance",
            Category::Accessibility => "accessibility",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = crate::error::DodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::all()
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| crate::error::DodError::UnknownCategory(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// How strictly a rule is enforced. Variants are declared weakest first so
/// the derived ordering reads `Advisory < Standard < Strict < Paranoid`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Advisory,
    #[default]
    Standard,
    Strict,
    Paranoid,
}

impl Severity {
    pub fn all() -> &'static [Severity] {
        &[
            Severity::Advisory,
            Severity::Standard,
            Severity::Strict,
            Severity::Paranoid,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Advisory => "advisory",
            Severity::Standard => "standard",
            Severity::Strict => "strict",
            Severity::Paranoid => "paranoid",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = crate::error::DodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "advisory" => Ok(Severity::Advisory),
            "standard" => Ok(Severity::Standard),
            "strict" => Ok(Severity::Strict),
            "paranoid" => Ok(Severity::Paranoid),
            _ => Err(crate::error::DodError::InvalidSeverity(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
