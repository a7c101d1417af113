use crate::output::{print_json, print_table};
use anyhow::Context;
use dod_core::config::DodConfig;
use dod_core::spec::SpecificationCompiler;
use dod_core::telemetry;
use std::path::Path;

pub fn run(root: &Path, spec: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let config = DodConfig::load_or_default(root).context("failed to load config")?;
    let path = super::spec_path(root, &config, spec);

    let mut compiler = SpecificationCompiler::new();
    let spec = compiler
        .compile_specification(&path)
        .with_context(|| format!("failed to compile {}", path.display()))?;
    let parse_errors = compiler.telemetry().get(telemetry::PARSE_ERRORS);

    if json {
        print_json(&serde_json::json!({
            "specification": spec,
            "parse_errors": parse_errors,
        }))?;
        return Ok(());
    }

    println!(
        "{} v{} ({} rules, enforcement: {})",
        spec.name,
        spec.version,
        spec.len(),
        spec.enforcement
    );
    let rows = spec
        .rules()
        .iter()
        .map(|r| {
            vec![
                r.name.clone(),
                r.category.to_string(),
                r.severity.to_string(),
                if r.predicate.is_valid() {
                    r.condition.clone()
                } else {
                    format!("{} (invalid)", r.condition)
                },
                if r.fix().is_some() { "yes" } else { "" }.to_string(),
            ]
        })
        .collect();
    print_table(&["RULE", "CATEGORY", "SEVERITY", "CONDITION", "AUTO-FIX"], rows);
    if parse_errors > 0 {
        println!("\n{parse_errors} condition(s) could not be parsed and will always fail.");
    }
    Ok(())
}
