use std::path::PathBuf;

use carwise_core::advice::{AdviceCache, AdviceService};
use carwise_core::appraisal::PriceEstimator;
use carwise_core::config::AppConfig;
use carwise_core::similarity::SimilarityMap;
use carwise_core::store::{FsArtifactStore, RegressionStore};
use clap::Args;

use crate::commands::CommandResult;

#[derive(Debug, Clone, Args)]
pub struct AdviseArgs {
    #[arg(help = "Vehicle as `manufacturer, model, year, mileage, listed price`")]
    pub input: String,
    #[arg(long, default_value = "price", help = "price, mileage or similar")]
    pub kind: String,
    #[arg(long, help = "Similarity map JSON (defaults to data.similarity_path)")]
    pub similarity: Option<PathBuf>,
}

pub fn run(config: &AppConfig, args: &AdviseArgs) -> CommandResult {
    let similarity = match args.similarity.as_ref().or(config.data.similarity_path.as_ref()) {
        Some(path) => match SimilarityMap::load(path) {
            Ok(map) => map,
            Err(error) => return CommandResult::failure("advise", "similarity", error.to_string(), 3),
        },
        None => SimilarityMap::empty(),
    };
    let cache = match AdviceCache::new(config.cache.capacity) {
        Ok(cache) => cache,
        Err(error) => return CommandResult::failure("advise", "config_validation", error.to_string(), 2),
    };

    let store = RegressionStore::new(
        FsArtifactStore::new(config.store.artifact_dir.clone()),
        config.fit_settings(),
    );
    let estimator = PriceEstimator::new(config.normalizer(), store)
        .with_mileage_increment(config.model.mileage_increment);
    let mut service = AdviceService::new(estimator, config.classifier(), similarity, cache);

    let result = service.get_advice_str(&args.input, &args.kind);
    match &result.error {
        None => CommandResult::success_with_data("advise", result.advice_text(), Some(&result)),
        Some(failure) => CommandResult::failure_with_data(
            "advise",
            &failure.class,
            format!("{} ({})", failure.user_message, failure.message),
            1,
            Some(&result),
        ),
    }
}
