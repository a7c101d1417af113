use crate::output::{print_json, print_table};
use anyhow::Context as _;
use dod_core::config::DodConfig;
use dod_core::context::ContextProvider;
use std::path::Path;

pub fn run(root: &Path, metrics: Option<&Path>, set: &[String], json: bool) -> anyhow::Result<()> {
    let config = DodConfig::load_or_default(root).context("failed to load config")?;
    let provider = super::build_provider(root, &config, metrics, set)?;
    let ctx = provider.gather(root, &super::adhoc_rule("true")?);

    if json {
        return print_json(&ctx);
    }
    let rows = ctx
        .iter()
        .map(|(k, v)| vec![k.clone(), v.kind().to_string(), v.to_string()])
        .collect();
    print_table(&["KEY", "TYPE", "VALUE"], rows);
    Ok(())
}
