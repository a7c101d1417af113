use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use dod_core::config::DodConfig;
use dod_core::evolution::EvolutionEngine;
use dod_core::paths;
use std::path::Path;

#[derive(Subcommand)]
pub enum EvolutionSubcommand {
    /// Show recorded rule performance and the signals it triggers
    Show,
    /// Forget all recorded rule performance
    Reset,
}

pub fn run(root: &Path, subcmd: EvolutionSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        EvolutionSubcommand::Show => show(root, json),
        EvolutionSubcommand::Reset => reset(root, json),
    }
}

fn load(root: &Path) -> anyhow::Result<EvolutionEngine> {
    let config = DodConfig::load_or_default(root).context("failed to load config")?;
    let mut engine = EvolutionEngine::new(config.evolution.thresholds);
    engine
        .load(&paths::performance_path(root))
        .context("failed to load rule performance history")?;
    Ok(engine)
}

fn show(root: &Path, json: bool) -> anyhow::Result<()> {
    let engine = load(root)?;
    let performance = engine.snapshot();
    let signals = engine.signals();

    if json {
        return print_json(&serde_json::json!({
            "performance": performance,
            "signals": signals,
        }));
    }

    if performance.is_empty() {
        println!("No rule performance recorded yet. Run 'dod validate' first.");
        return Ok(());
    }

    let rows = performance
        .iter()
        .map(|(name, p)| {
            vec![
                name.clone(),
                p.total_runs.to_string(),
                format!("{:.1}%", p.pass_rate * 100.0),
                format!("{:.1}", p.avg_duration_ms),
                if p.fix_attempts == 0 {
                    "-".to_string()
                } else {
                    format!("{:.0}% of {}", p.fix_success_rate * 100.0, p.fix_attempts)
                },
                p.last_run
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();
    print_table(
        &["RULE", "RUNS", "PASS RATE", "AVG MS", "FIXES", "LAST RUN"],
        rows,
    );

    if !signals.is_empty() {
        println!("\nSignals:");
        for sig in &signals {
            match &sig.proposed_condition {
                Some(p) => println!("  {} {}: {} (proposed: {p})", sig.kind, sig.rule, sig.reason),
                None => println!("  {} {}: {}", sig.kind, sig.rule, sig.reason),
            }
        }
    }
    Ok(())
}

fn reset(root: &Path, json: bool) -> anyhow::Result<()> {
    let path = paths::performance_path(root);
    let existed = path.exists();
    if existed {
        std::fs::remove_file(&path)
            .with_context(|| format!("failed to remove {}", path.display()))?;
    }
    if json {
        print_json(&serde_json::json!({ "reset": existed }))?;
    } else if existed {
        println!("Rule performance history cleared.");
    } else {
        println!("No rule performance history to clear.");
    }
    Ok(())
}
