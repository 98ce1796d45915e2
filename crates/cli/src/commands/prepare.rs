use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::Context;
use carwise_core::config::AppConfig;
use carwise_core::dataset::{
    load_raw_csv, prepare, remove_outliers, split_by_description, write_listings, NumericColumn,
};
use clap::{Args, ValueEnum};
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Debug, Clone, Args)]
pub struct PrepareArgs {
    #[arg(long, help = "Raw listings CSV as scraped")]
    pub input: PathBuf,
    #[arg(long, help = "Where to write the cleaned listings CSV")]
    pub output: PathBuf,
    #[arg(long, value_name = "MODE", help = "Drop outliers with IQR or SD before writing")]
    pub outliers: Option<String>,
    #[arg(long, value_enum, default_value_t = OutlierColumn::Price)]
    pub outlier_column: OutlierColumn,
    #[arg(long, help = "Also write train.csv and test.csv split by description into this directory")]
    pub split_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutlierColumn {
    Year,
    Odometer,
    Price,
}

impl From<OutlierColumn> for NumericColumn {
    fn from(value: OutlierColumn) -> Self {
        match value {
            OutlierColumn::Year => Self::Year,
            OutlierColumn::Odometer => Self::Odometer,
            OutlierColumn::Price => Self::Price,
        }
    }
}

#[derive(Debug, Serialize)]
struct PrepareReport {
    raw_rows: usize,
    missing_price: usize,
    out_of_bounds: usize,
    outliers_removed: usize,
    kept_rows: usize,
    train_rows: Option<usize>,
    test_rows: Option<usize>,
}

pub fn run(config: &AppConfig, args: &PrepareArgs) -> CommandResult {
    match execute(config, args) {
        Ok(report) => CommandResult::success_with_data(
            "prepare",
            format!(
                "kept {} of {} listings, wrote `{}`",
                report.kept_rows,
                report.raw_rows,
                args.output.display()
            ),
            Some(report),
        ),
        Err(error) => CommandResult::failure("prepare", "dataset", format!("{error:#}"), 3),
    }
}

fn execute(config: &AppConfig, args: &PrepareArgs) -> anyhow::Result<PrepareReport> {
    let raw = load_raw_csv(&args.input)?;
    let (table, summary) = prepare(raw, &config.dataset.bounds);

    let mut listings = table.into_listings();
    let before_outliers = listings.len();
    if let Some(mode) = &args.outliers {
        listings = remove_outliers(listings, args.outlier_column.into(), mode)?;
    }
    let outliers_removed = before_outliers - listings.len();
    write_csv(&args.output, |file| write_listings(&listings, file))?;

    let (train_rows, test_rows) = match &args.split_dir {
        Some(dir) => {
            let split = split_by_description(
                &listings,
                config.dataset.test_proportion,
                config.dataset.random_state,
            )?;
            fs::create_dir_all(dir)
                .with_context(|| format!("creating split directory `{}`", dir.display()))?;
            write_csv(&dir.join("train.csv"), |file| write_listings(&split.train, file))?;
            write_csv(&dir.join("test.csv"), |file| write_listings(&split.test, file))?;
            (Some(split.train.len()), Some(split.test.len()))
        }
        None => (None, None),
    };

    Ok(PrepareReport {
        raw_rows: summary.raw_rows,
        missing_price: summary.missing_price,
        out_of_bounds: summary.out_of_bounds,
        outliers_removed,
        kept_rows: listings.len(),
        train_rows,
        test_rows,
    })
}

fn write_csv<E>(path: &Path, write: impl FnOnce(File) -> Result<(), E>) -> anyhow::Result<()>
where
    E: std::error::Error + Send + Sync + 'static,
{
    let file =
        File::create(path).with_context(|| format!("creating `{}`", path.display()))?;
    write(file).with_context(|| format!("writing `{}`", path.display()))
}
