use crate::autofix::DEFAULT_FIX_TIMEOUT_SECS;
use crate::error::{DodError, Result};
use crate::evolution::EvolutionConfig;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// FixConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixConfig {
    /// Run fix commands on `dod validate` without `--fix`.
    #[serde(default)]
    pub enabled: bool,
    /// `0` disables the timeout.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_FIX_TIMEOUT_SECS
}

impl Default for FixConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

// ---------------------------------------------------------------------------
// EvolutionSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionSettings {
    /// Keep rule performance in `.dod/performance.yaml` between runs.
    #[serde(default = "default_persist")]
    pub persist: bool,
    #[serde(flatten)]
    pub thresholds: EvolutionConfig,
}

fn default_persist() -> bool {
    true
}

impl Default for EvolutionSettings {
    fn default() -> Self {
        Self {
            persist: default_persist(),
            thresholds: EvolutionConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// DodConfig (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DodConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_spec")]
    pub spec: String,
    #[serde(default = "default_metrics_file")]
    pub metrics_file: String,
    #[serde(default)]
    pub fix: FixConfig,
    #[serde(default)]
    pub evolution: EvolutionSettings,
}

fn default_version() -> u32 {
    1
}

fn default_spec() -> String {
    paths::SPEC_FILE.to_string()
}

fn default_metrics_file() -> String {
    paths::METRICS_FILE.to_string()
}

impl Default for DodConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            spec: default_spec(),
            metrics_file: default_metrics_file(),
            fix: FixConfig::default(),
            evolution: EvolutionSettings::default(),
        }
    }
}

impl DodConfig {
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(DodError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: DodConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Like [`DodConfig::load`], but an uninitialized project gets defaults.
    pub fn load_or_default(root: &Path) -> Result<Self> {
        match Self::load(root) {
            Err(DodError::NotInitialized) => Ok(Self::default()),
            other => other,
        }
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        crate::io::write_yaml(&paths::config_path(root), self)
    }

    pub fn spec_path(&self, root: &Path) -> PathBuf {
        paths::resolve(root, &self.spec)
    }

    pub fn metrics_path(&self, root: &Path) -> PathBuf {
        paths::resolve(root, &self.metrics_file)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut push = |level: WarnLevel, message: String| {
            warnings.push(ConfigWarning { level, message })
        };

        if self.version != 1 {
            push(
                WarnLevel::Warning,
                format!("unknown config version {} (expected 1)", self.version),
            );
        }
        if self.spec.trim().is_empty() {
            push(WarnLevel::Error, "spec path is empty".to_string());
        }
        if self.metrics_file.trim().is_empty() {
            push(WarnLevel::Error, "metrics_file path is empty".to_string());
        }
        if self.fix.timeout_seconds == 0 {
            push(
                WarnLevel::Warning,
                "fix.timeout_seconds is 0: fix commands may run forever".to_string(),
            );
        }

        let t = &self.evolution.thresholds;
        for (name, rate) in [
            ("tighten_pass_rate", t.tighten_pass_rate),
            ("relax_pass_rate", t.relax_pass_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                push(
                    WarnLevel::Error,
                    format!("evolution.{name} = {rate} is outside 0..=1"),
                );
            }
        }
        if t.relax_pass_rate >= t.tighten_pass_rate {
            push(
                WarnLevel::Error,
                format!(
                    "evolution.relax_pass_rate ({}) must be below tighten_pass_rate ({})",
                    t.relax_pass_rate, t.tighten_pass_rate
                ),
            );
        }
        if t.optimize_duration_ms <= 0.0 {
            push(
                WarnLevel::Error,
                "evolution.optimize_duration_ms must be positive".to_string(),
            );
        }
        if t.tighten_min_runs == 0 || t.relax_min_runs == 0 {
            push(
                WarnLevel::Warning,
                "evolution min_runs of 0 lets a single run trigger a signal".to_string(),
            );
        }

        warnings
    }
}
