use std::path::PathBuf;

use carwise_core::config::AppConfig;
use carwise_core::dataset::ListingTable;
use carwise_core::domain::cohort::Cohort;
use carwise_core::errors::ApplicationError;
use carwise_core::store::{FitOutcome, FsArtifactStore, RegressionStore};
use clap::Args;

use crate::commands::CommandResult;

#[derive(Debug, Clone, Args)]
pub struct FitArgs {
    #[arg(long, help = "Cleaned listings CSV (defaults to data.listings_path)")]
    pub listings: Option<PathBuf>,
    #[arg(long, requires_all = ["model", "year"], help = "Fit only this manufacturer's cohort")]
    pub manufacturer: Option<String>,
    #[arg(long, requires_all = ["manufacturer", "year"])]
    pub model: Option<String>,
    #[arg(long, requires_all = ["manufacturer", "model"])]
    pub year: Option<i32>,
}

pub fn run(config: &AppConfig, args: &FitArgs) -> CommandResult {
    let Some(path) = args.listings.clone().or_else(|| config.data.listings_path.clone()) else {
        return CommandResult::failure(
            "fit",
            "missing_input",
            "no listings file given (pass --listings or set data.listings_path)",
            3,
        );
    };
    let table = match ListingTable::load_csv(&path) {
        Ok(table) => table,
        Err(error) => return CommandResult::failure("fit", "dataset", error.to_string(), 3),
    };

    let store = RegressionStore::new(
        FsArtifactStore::new(config.store.artifact_dir.clone()),
        config.fit_settings(),
    )
    .with_normalizer(config.normalizer());

    match (&args.manufacturer, &args.model, args.year) {
        (Some(manufacturer), Some(model), Some(year)) => {
            let cohort = Cohort::new(manufacturer, model, year);
            match store.fit(table.listings(), &cohort) {
                Ok(outcome) => render_outcome(outcome),
                Err(error) => persistence_failure(error),
            }
        }
        _ => match store.fit_all(&table) {
            Ok(report) => CommandResult::success_with_data(
                "fit",
                format!(
                    "fitted {} cohorts ({} already fitted, {} with insufficient data, {} rejected)",
                    report.fitted.len(),
                    report.already_fitted,
                    report.insufficient_data,
                    report.rejected.len()
                ),
                Some(report),
            ),
            Err(error) => persistence_failure(error),
        },
    }
}

fn render_outcome(outcome: FitOutcome) -> CommandResult {
    let message = match &outcome {
        FitOutcome::Fitted(summary) => format!(
            "fitted `{}` on {} listings (mean absolute residual {:.2})",
            summary.key, summary.sample_count, summary.mean_absolute_residual
        ),
        FitOutcome::AlreadyFitted { key } => format!("`{key}` is already fitted"),
        FitOutcome::InsufficientData { key, found, required } => {
            format!("`{key}` has {found} usable listings, {required} required")
        }
        FitOutcome::Rejected { key, reason } => {
            let message = format!("`{key}` cannot be fitted: {reason}");
            return CommandResult::failure_with_data("fit", "bad_request", message, 1, Some(&outcome));
        }
    };
    CommandResult::success_with_data("fit", message, Some(outcome))
}

fn persistence_failure(error: ApplicationError) -> CommandResult {
    CommandResult::failure("fit", "persistence", error.to_string(), 4)
}
