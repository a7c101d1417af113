use anyhow::Context;
use dod_core::config::DodConfig;
use dod_core::templates::Template;
use dod_core::{io, paths};
use std::path::Path;

const METRICS_STUB: &str = "\
# Metric values for rule conditions, usually written by CI.
# Keys here override what `dod` finds by scanning the project.
# coverage: 85.0
# lint_errors: 0
# vulnerabilities: 0
";

pub fn run(root: &Path, template: &str, force: bool, json: bool) -> anyhow::Result<()> {
    let template: Template = template.parse()?;

    io::ensure_dir(&paths::dod_dir(root))
        .with_context(|| format!("failed to create {}", paths::dod_dir(root).display()))?;

    let mut created = Vec::new();

    let config_path = paths::config_path(root);
    let config = if config_path.exists() {
        DodConfig::load(root).context("failed to load existing config.yaml")?
    } else {
        let cfg = DodConfig::default();
        cfg.save(root).context("failed to write config.yaml")?;
        created.push(paths::CONFIG_FILE.to_string());
        cfg
    };

    let spec_path = config.spec_path(root);
    let wrote_spec = if force {
        io::atomic_write(&spec_path, template.body().as_bytes())?;
        true
    } else {
        io::write_if_missing(&spec_path, template.body().as_bytes())?
    };
    if wrote_spec {
        created.push(config.spec.clone());
    }

    if io::write_if_missing(&config.metrics_path(root), METRICS_STUB.as_bytes())? {
        created.push(config.metrics_file.clone());
    }

    if json {
        crate::output::print_json(&serde_json::json!({
            "root": root,
            "template": template.as_str(),
            "created": created,
        }))?;
        return Ok(());
    }

    println!("Initializing dod in: {}", root.display());
    for file in [paths::CONFIG_FILE, config.spec.as_str(), config.metrics_file.as_str()] {
        let state = if created.iter().any(|c| c == file) {
            "created:"
        } else {
            "exists: "
        };
        println!("  {state} {file}");
    }
    if !wrote_spec {
        println!("Specification left untouched; pass --force to replace it with the {template} template.");
    }
    Ok(())
}
