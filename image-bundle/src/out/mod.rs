use crate::error::BundleError;
use crate::types::BundleResult;
use anyhow::Result;
use clap::ValueEnum;
use serde_json::json;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, ValueEnum)]
pub enum OutMode {
    #[default]
    Text,
    Json,
}

pub fn render_result(mode: OutMode, result: &BundleResult) -> Result<String> {
    Ok(match mode {
        OutMode::Json => serde_json::to_string_pretty(result)?,
        OutMode::Text if result.dry_run => format!("{} (dry run)", result.image_id),
        OutMode::Text => result.image_id.clone(),
    })
}

/// Failure report naming anything left behind for manual cleanup.
pub fn render_failure(mode: OutMode, err: &BundleError) -> String {
    let leftover = err.leftover();
    match mode {
        OutMode::Json => json!({
            "error": err.to_string(),
            "snapshotId": leftover.snapshot_id,
            "imageId": leftover.image_id,
        })
        .to_string(),
        OutMode::Text => {
            let mut out = format!("FATAL: {err}");
            if let Some(id) = &leftover.snapshot_id {
                out.push_str(&format!("\n  snapshot left in place: {id}"));
            }
            if let Some(id) = &leftover.image_id {
                out.push_str(&format!("\n  image left in place: {id}"));
            }
            out
        }
    }
}

pub fn emit_result(mode: OutMode, result: &BundleResult) -> Result<()> {
    println!("{}", render_result(mode, result)?);
    Ok(())
}

pub fn emit_failure(mode: OutMode, err: &BundleError) {
    eprintln!("{}", render_failure(mode, err));
}
