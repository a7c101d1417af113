use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Args;
use dod_core::autofix::AutoFixApplier;
use dod_core::config::DodConfig;
use dod_core::evolution::EvolutionEngine;
use dod_core::exoskeleton::Exoskeleton;
use dod_core::paths;
use dod_core::runner::ValidationRunner;
use dod_core::types::Severity;
use std::path::{Path, PathBuf};

#[derive(Args)]
pub struct ValidateArgs {
    /// Specification file (default: `spec` from .dod/config.yaml)
    #[arg(long)]
    spec: Option<PathBuf>,

    /// Run fix commands for failed rules that have auto_fix enabled
    #[arg(long)]
    fix: bool,

    /// Metrics file (default: `metrics_file` from .dod/config.yaml)
    #[arg(long)]
    metrics: Option<PathBuf>,

    /// Override a context value (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    set: Vec<String>,

    /// Exit non-zero when a rule at or above this severity fails
    #[arg(long, default_value = "standard", value_name = "SEVERITY")]
    fail_on: String,

    /// Also write the report to this file (.md for Markdown, JSON otherwise)
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,

    /// Fix command timeout in seconds, 0 for none (default: fix.timeout_seconds)
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,
}

pub fn run(root: &Path, args: ValidateArgs, json: bool) -> anyhow::Result<()> {
    let config = DodConfig::load_or_default(root).context("failed to load config")?;
    let fail_on: Severity = args.fail_on.parse()?;
    let spec_path = super::spec_path(root, &config, args.spec.as_deref());

    let provider = super::build_provider(root, &config, args.metrics.as_deref(), &args.set)?;
    let fixer =
        AutoFixApplier::with_timeout_secs(args.timeout.unwrap_or(config.fix.timeout_seconds));
    let runner = ValidationRunner::new(provider).with_fixer(fixer);

    let persist = config.evolution.persist && paths::dod_dir(root).is_dir();
    let performance_path = paths::performance_path(root);
    let mut evolution = EvolutionEngine::new(config.evolution.thresholds.clone());
    if persist {
        evolution
            .load(&performance_path)
            .context("failed to load rule performance history")?;
    }

    let mut exo = Exoskeleton::new(runner, evolution);
    let spec_name = exo
        .wrap_project(root, &spec_path)
        .with_context(|| format!("failed to compile {}", spec_path.display()))?
        .name
        .clone();

    let results = exo.validate_project(root, &spec_name, args.fix || config.fix.enabled)?;

    if persist {
        exo.evolution()
            .save(&performance_path)
            .context("failed to save rule performance history")?;
    }

    let report = exo.report(root, &spec_name, results)?;
    if let Some(path) = &args.report {
        report
            .write(path)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
    }

    if json {
        print_json(&report)?;
    } else {
        let rows = report
            .results
            .iter()
            .map(|r| {
                let status = match (r.passed, r.fix_applied) {
                    (true, _) => "PASS",
                    (false, true) => "FIXED",
                    (false, false) => "FAIL",
                };
                vec![
                    status.to_string(),
                    r.rule.clone(),
                    r.category.to_string(),
                    r.severity.to_string(),
                    r.actual_value
                        .as_ref()
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    r.condition.clone(),
                ]
            })
            .collect();
        print_table(
            &["STATUS", "RULE", "CATEGORY", "SEVERITY", "ACTUAL", "CONDITION"],
            rows,
        );

        let s = &report.summary;
        println!(
            "\n{}/{} passed, {} failed, {} fixes applied",
            s.passed, s.total, s.failed, s.fixes_applied
        );
        for sig in &report.signals {
            match &sig.proposed_condition {
                Some(p) => println!("  {} {}: {} (proposed: {p})", sig.kind, sig.rule, sig.reason),
                None => println!("  {} {}: {}", sig.kind, sig.rule, sig.reason),
            }
        }
        if let Some(path) = &args.report {
            println!("Report written to {}", path.display());
        }
    }

    let blocking = report.blocking_failures(fail_on).count();
    if blocking > 0 {
        anyhow::bail!("{blocking} rule(s) at or above '{fail_on}' failed");
    }
    Ok(())
}
