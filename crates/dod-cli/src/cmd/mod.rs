pub mod check;
pub mod compile;
pub mod config;
pub mod context;
pub mod evolution;
pub mod init;
pub mod validate;

use anyhow::Context as _;
use dod_core::config::DodConfig;
use dod_core::context::{
    parse_assignment, LayeredContextProvider, ProjectContextProvider, StaticContextProvider,
};
use dod_core::rule::{Rule, RuleCompiler, RuleDefinition};
use dod_core::types::Category;
use dod_core::value::Context;
use std::path::{Path, PathBuf};

/// Project scan plus metrics file, with `--set` overrides on top.
pub(crate) fn build_provider(
    root: &Path,
    config: &DodConfig,
    metrics: Option<&Path>,
    set: &[String],
) -> anyhow::Result<LayeredContextProvider> {
    let metrics_path = metrics
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.metrics_path(root));
    let overrides = parse_overrides(set)?;
    Ok(LayeredContextProvider::new()
        .layer(ProjectContextProvider::new().with_metrics_file(metrics_path))
        .layer(StaticContextProvider::new(overrides)))
}

pub(crate) fn parse_overrides(set: &[String]) -> anyhow::Result<Context> {
    let mut ctx = Context::new();
    for raw in set {
        let (key, value) = parse_assignment(raw)
            .with_context(|| format!("invalid --set '{raw}': expected KEY=VALUE"))?;
        ctx.insert(key, value);
    }
    Ok(ctx)
}

pub(crate) fn spec_path(root: &Path, config: &DodConfig, explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.spec_path(root))
}

/// A throwaway rule for evaluating or gathering outside a specification.
pub(crate) fn adhoc_rule(condition: &str) -> anyhow::Result<Rule> {
    let def = RuleDefinition {
        name: "adhoc".to_string(),
        condition: condition.to_string(),
        description: None,
        severity: None,
        auto_fix: false,
        fix_command: None,
        telemetry: false,
    };
    Ok(RuleCompiler::default().compile(Category::CodeQuality, &def)?)
}
