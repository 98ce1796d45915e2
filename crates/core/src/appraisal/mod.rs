//! Pricing a vehicle against its cohort regression.

pub mod deal;
pub mod estimator;
pub mod mileage;

pub use deal::{DealClassifier, DealVerdict};
pub use estimator::{PriceEstimate, PriceEstimator};
pub use mileage::{MileageCost, DEFAULT_MILEAGE_INCREMENT};

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::Utc;

    use crate::domain::cohort::Cohort;
    use crate::regression::{FittedRegression, LinearModel};
    use crate::store::{ArtifactStore, MemoryArtifactStore};

    /// Persists a hand-built regression so tests can pin exact predictions.
    pub fn seed_regression(
        artifacts: &MemoryArtifactStore,
        cohort: &Cohort,
        intercept: f64,
        slope: f64,
        mean_absolute_residual: f64,
    ) {
        let odometer = vec![10_000.0, 50_000.0, 90_000.0];
        let model = LinearModel { slope, intercept };
        let fit = FittedRegression {
            cohort: cohort.clone(),
            model,
            training_price: odometer.iter().map(|x| model.predict(*x)).collect(),
            predictions: odometer.iter().map(|x| model.predict(*x)).collect(),
            training_odometer: odometer,
            mean_absolute_residual,
            fitted_at: Utc::now(),
        };
        let encoded = serde_json::to_vec(&fit).expect("regression encodes");
        artifacts.write(&cohort.key(), &encoded).expect("fresh key");
    }
}
