use crate::error::{DodError, Result};
use crate::evolution::{EvolutionEngine, EvolutionSignal, RulePerformance};
use crate::report::ValidationReport;
use crate::runner::{ValidationResult, ValidationRunner};
use crate::spec::{Specification, SpecificationCompiler};
use crate::telemetry::Telemetry;
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// An active specification as listed by [`Exoskeleton::status`].
#[derive(Debug, Clone, Serialize)]
pub struct ActiveSpec {
    pub project: PathBuf,
    pub spec: String,
    pub version: String,
    pub rules: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExoskeletonStatus {
    pub active: Vec<ActiveSpec>,
    pub performance: BTreeMap<String, RulePerformance>,
    pub counters: BTreeMap<String, u64>,
}

/// Ties compilation, validation, auto-fix and evolution together for any
/// number of projects. Holds one active specification per
/// (project, specification name) pair.
pub struct Exoskeleton {
    compiler: SpecificationCompiler,
    runner: ValidationRunner,
    evolution: EvolutionEngine,
    active: HashMap<(PathBuf, String), Specification>,
    last_signals: Vec<EvolutionSignal>,
}

impl Exoskeleton {
    pub fn new(runner: ValidationRunner, evolution: EvolutionEngine) -> Self {
        Self {
            compiler: SpecificationCompiler::new(),
            runner,
            evolution,
            active: HashMap::new(),
            last_signals: Vec::new(),
        }
    }

    /// Compile `spec_path` and make it the active specification of that
    /// name for `project`, replacing any previous one.
    pub fn wrap_project(&mut self, project: &Path, spec_path: &Path) -> Result<&Specification> {
        let spec = self.compiler.compile_specification(spec_path)?;
        Ok(self.activate(project, spec))
    }

    /// Activate an already compiled specification.
    pub fn activate(&mut self, project: &Path, spec: Specification) -> &Specification {
        let key = (project_key(project), spec.name.clone());
        tracing::info!(
            project = %key.0.display(),
            spec = %key.1,
            rules = spec.len(),
            "specification activated"
        );
        match self.active.entry(key) {
            Entry::Occupied(mut o) => {
                o.insert(spec);
                o.into_mut()
            }
            Entry::Vacant(v) => v.insert(spec),
        }
    }

    pub fn active(&self, project: &Path, spec_name: &str) -> Option<&Specification> {
        self.active
            .get(&(project_key(project), spec_name.to_string()))
    }

    /// Run the active specification, then feed the results to evolution.
    /// The signals of the run are available from [`Exoskeleton::last_signals`].
    pub fn validate_project(
        &mut self,
        project: &Path,
        spec_name: &str,
        fix_issues: bool,
    ) -> Result<Vec<ValidationResult>> {
        let key = (project_key(project), spec_name.to_string());
        let spec = self.active.get(&key).ok_or_else(|| DodError::SpecNotActive {
            project: project.to_path_buf(),
            spec: spec_name.to_string(),
        })?;
        let results = self.runner.validate_project(project, spec, fix_issues);
        self.last_signals = self.evolution.learn_from_validation(&results);
        Ok(results)
    }

    pub fn last_signals(&self) -> &[EvolutionSignal] {
        &self.last_signals
    }

    pub fn report(
        &self,
        project: &Path,
        spec_name: &str,
        results: Vec<ValidationResult>,
    ) -> Result<ValidationReport> {
        let spec = self
            .active(project, spec_name)
            .ok_or_else(|| DodError::SpecNotActive {
                project: project.to_path_buf(),
                spec: spec_name.to_string(),
            })?;
        Ok(ValidationReport::new(
            spec,
            project,
            results,
            self.last_signals.clone(),
            self.telemetry().snapshot(),
        ))
    }

    /// Counters from every component, merged.
    pub fn telemetry(&self) -> Telemetry {
        let mut t = Telemetry::new();
        t.absorb(self.compiler.telemetry());
        t.absorb(self.runner.telemetry());
        t.absorb(self.evolution.telemetry());
        t
    }

    pub fn evolution(&self) -> &EvolutionEngine {
        &self.evolution
    }

    pub fn status(&self) -> ExoskeletonStatus {
        let mut active: Vec<ActiveSpec> = self
            .active
            .iter()
            .map(|((project, name), spec)| ActiveSpec {
                project: project.clone(),
                spec: name.clone(),
                version: spec.version.clone(),
                rules: spec.len(),
            })
            .collect();
        active.sort_by(|a, b| (&a.project, &a.spec).cmp(&(&b.project, &b.spec)));
        ExoskeletonStatus {
            active,
            performance: self.evolution.snapshot(),
            counters: self.telemetry().snapshot(),
        }
    }
}

fn project_key(project: &Path) -> PathBuf {
    project
        .canonicalize()
        .unwrap_or_else(|_| project.to_path_buf())
}
