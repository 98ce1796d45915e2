use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use carwise_core::config::AppConfig;
use carwise_core::dataset::ListingTable;
use carwise_core::similarity::clean_similarity_map;
use clap::Args;
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Debug, Clone, Args)]
pub struct SimilarCleanArgs {
    #[arg(long, help = "Raw similarity JSON: {\"make_model\": [\"make_model\", ...]}")]
    pub raw: PathBuf,
    #[arg(long, help = "Cleaned listings CSV (defaults to data.listings_path)")]
    pub listings: Option<PathBuf>,
    #[arg(long, help = "Where to write the cleaned map (defaults to data.similarity_path)")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct CleanReport {
    raw_entries: usize,
    kept_entries: usize,
    output: PathBuf,
}

pub fn run(config: &AppConfig, args: &SimilarCleanArgs) -> CommandResult {
    match execute(config, args) {
        Ok(report) => CommandResult::success_with_data(
            "similar-clean",
            format!(
                "kept {} of {} similarity entries, wrote `{}`",
                report.kept_entries,
                report.raw_entries,
                report.output.display()
            ),
            Some(report),
        ),
        Err(error) => CommandResult::failure("similar-clean", "dataset", format!("{error:#}"), 3),
    }
}

fn execute(config: &AppConfig, args: &SimilarCleanArgs) -> anyhow::Result<CleanReport> {
    let listings = args
        .listings
        .clone()
        .or_else(|| config.data.listings_path.clone())
        .context("no listings file given (pass --listings or set data.listings_path)")?;
    let output = args
        .output
        .clone()
        .or_else(|| config.data.similarity_path.clone())
        .context("no output file given (pass --output or set data.similarity_path)")?;

    let raw_text = fs::read_to_string(&args.raw)
        .with_context(|| format!("reading `{}`", args.raw.display()))?;
    let raw: BTreeMap<String, Vec<String>> = serde_json::from_str(&raw_text)
        .with_context(|| format!("parsing `{}`", args.raw.display()))?;

    let vocabulary = ListingTable::load_csv(&listings)?.vocabulary();
    let map = clean_similarity_map(&raw, &vocabulary.manufacturers, &vocabulary.models);
    fs::write(&output, map.to_json_string()?)
        .with_context(|| format!("writing `{}`", output.display()))?;

    Ok(CleanReport { raw_entries: raw.len(), kept_entries: map.len(), output })
}
