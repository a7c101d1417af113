use crate::output::print_json;
use anyhow::Context;
use dod_core::condition::Condition;
use dod_core::config::DodConfig;
use dod_core::context::ContextProvider;
use std::path::Path;

/// Exits non-zero unless the condition holds, so it can gate shell scripts.
pub fn run(
    root: &Path,
    condition: &str,
    metrics: Option<&Path>,
    set: &[String],
    json: bool,
) -> anyhow::Result<()> {
    let config = DodConfig::load_or_default(root).context("failed to load config")?;
    let rule = super::adhoc_rule(condition)?;
    if let Condition::Invalid { reason } = &rule.predicate {
        anyhow::bail!("cannot parse condition '{condition}': {reason}");
    }

    let provider = super::build_provider(root, &config, metrics, set)?;
    let ctx = provider.gather(root, &rule);
    let outcome = rule.evaluate(&ctx);

    let fields: Vec<String> = match &rule.predicate {
        Condition::Compare { field, .. } => vec![field.clone()],
        Condition::Expr(e) => e.fields().into_iter().map(str::to_string).collect(),
        Condition::Invalid { .. } => Vec::new(),
    };

    if json {
        let values: serde_json::Map<String, serde_json::Value> = fields
            .iter()
            .map(|f| (f.clone(), serde_json::json!(ctx.get(f))))
            .collect();
        print_json(&serde_json::json!({
            "condition": condition,
            "holds": outcome.as_ref().is_ok_and(|b| *b),
            "error": outcome.as_ref().err().map(|e| e.to_string()),
            "values": values,
        }))?;
    } else {
        for f in &fields {
            match ctx.get(f) {
                Some(v) => println!("  {f} = {v}"),
                None => println!("  {f} = (unset, reads as 0)"),
            }
        }
    }

    match outcome {
        Ok(true) => {
            if !json {
                println!("holds: {condition}");
            }
            Ok(())
        }
        Ok(false) => anyhow::bail!("condition does not hold: {condition}"),
        Err(e) => anyhow::bail!("condition could not be evaluated: {e}"),
    }
}
