use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use crate::appraisal::mileage::{MileageCost, DEFAULT_MILEAGE_INCREMENT};
use crate::domain::cohort::Cohort;
use crate::domain::money::to_cents;
use crate::errors::{ApplicationError, DomainError};
use crate::normalize::{Normalizer, VehicleQuery};
use crate::store::{ArtifactStore, RegressionStore};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PriceEstimate {
    pub cohort: Cohort,
    pub odometer: i64,
    /// Regression value at `odometer`, never below zero.
    pub price: f64,
    pub mean_absolute_residual: f64,
}

impl PriceEstimate {
    pub fn price_in_cents(&self) -> Decimal {
        to_cents(self.price)
    }
}

/// Read side of the regression store: predictions and mileage cost for
/// cohorts that already have a fitted artifact.
pub struct PriceEstimator<S> {
    normalizer: Normalizer,
    store: RegressionStore<S>,
    mileage_increment: i64,
}

impl<S: ArtifactStore> PriceEstimator<S> {
    pub fn new(normalizer: Normalizer, store: RegressionStore<S>) -> Self {
        Self { normalizer, store, mileage_increment: DEFAULT_MILEAGE_INCREMENT }
    }

    pub fn with_mileage_increment(mut self, mileage_increment: i64) -> Self {
        self.mileage_increment = mileage_increment;
        self
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn store(&self) -> &RegressionStore<S> {
        &self.store
    }

    pub fn mileage_increment(&self) -> i64 {
        self.mileage_increment
    }

    pub fn predict(&self, query: &VehicleQuery) -> Result<PriceEstimate, ApplicationError> {
        let fit = self.store.require(&query.cohort)?;
        let raw = fit.predict(query.odometer as f64);
        if raw < 0.0 {
            debug!(
                event_name = "carwise.estimate.clamped",
                cohort = %query.cohort.key(),
                odometer = query.odometer,
                raw,
                "negative prediction clamped to zero"
            );
        }

        Ok(PriceEstimate {
            cohort: query.cohort.clone(),
            odometer: query.odometer,
            price: raw.max(0.0),
            mean_absolute_residual: fit.mean_absolute_residual,
        })
    }

    /// Normalises raw vehicle details before predicting.
    pub fn predict_raw(
        &self,
        manufacturer: &str,
        model: &str,
        year: &str,
        odometer: &str,
    ) -> Result<PriceEstimate, ApplicationError> {
        let query = self.normalizer.normalize(manufacturer, model, year, odometer)?;
        self.predict(&query)
    }

    /// Value lost over one mileage increment. A regression whose price does
    /// not fall with mileage is rejected as [`DomainError::NonMonotonicModel`].
    pub fn mileage_cost(&self, cohort: &Cohort) -> Result<MileageCost, ApplicationError> {
        let fit = self.store.require(cohort)?;
        let initial = fit.predict(0.0);
        let end = fit.predict(self.mileage_increment as f64);
        let decrease = initial - end;
        if decrease.is_nan() || decrease <= 0.0 {
            return Err(DomainError::NonMonotonicModel { cohort: cohort.key().0, decrease }.into());
        }

        Ok(MileageCost {
            cohort: cohort.clone(),
            increment: self.mileage_increment,
            decrease: to_cents(decrease),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use crate::appraisal::estimator::PriceEstimator;
    use crate::appraisal::fixtures::seed_regression;
    use crate::domain::cohort::Cohort;
    use crate::errors::{ApplicationError, DomainError};
    use crate::normalize::Normalizer;
    use crate::store::{FitSettings, MemoryArtifactStore, RegressionStore};

    fn estimator() -> (Arc<MemoryArtifactStore>, PriceEstimator<Arc<MemoryArtifactStore>>) {
        let artifacts = Arc::new(MemoryArtifactStore::new());
        let store = RegressionStore::new(artifacts.clone(), FitSettings::default());
        (artifacts, PriceEstimator::new(Normalizer::default(), store))
    }

    #[test]
    fn predict_evaluates_the_cohort_line() {
        let (artifacts, estimator) = estimator();
        let civic = Cohort::new("honda", "civic", 2015);
        seed_regression(&artifacts, &civic, 10_700.0, -0.02, 500.0);

        let estimate = estimator
            .predict_raw(" Honda", "CIVIC", "2015", "45000")
            .expect("civic 2015 is fitted");
        assert!((estimate.price - 9_800.0).abs() < 1e-6);
        assert_eq!(estimate.mean_absolute_residual, 500.0);
        assert_eq!(estimate.price_in_cents(), Decimal::new(980_000, 2));
    }

    #[test]
    fn negative_predictions_are_clamped() {
        let (artifacts, estimator) = estimator();
        let pinto = Cohort::new("ford", "pinto", 1981);
        seed_regression(&artifacts, &pinto, 2_000.0, -0.05, 150.0);

        let estimate =
            estimator.predict_raw("ford", "pinto", "1981", "250000").expect("pinto is fitted");
        assert_eq!(estimate.price, 0.0);
        assert_eq!(estimate.mean_absolute_residual, 150.0);
    }

    #[test]
    fn missing_cohort_has_no_model() {
        let (_, estimator) = estimator();
        let error = estimator
            .predict_raw("honda", "civic", "2015", "45000")
            .expect_err("nothing is fitted");
        assert_eq!(
            error,
            ApplicationError::Domain(DomainError::NoModelForCohort("honda_civic_2015".to_owned()))
        );
    }

    #[test]
    fn invalid_input_fails_before_loading() {
        let (_, estimator) = estimator();
        assert!(matches!(
            estimator.predict_raw("honda", "civic", "2030", "45000"),
            Err(ApplicationError::Domain(DomainError::InvalidYear { .. }))
        ));
    }

    #[test]
    fn mileage_cost_over_ten_thousand_miles() {
        let (artifacts, estimator) = estimator();
        let civic = Cohort::new("honda", "civic", 2015);
        seed_regression(&artifacts, &civic, 10_700.0, -0.02, 500.0);

        let cost = estimator.mileage_cost(&civic).expect("civic 2015 is fitted");
        assert_eq!(cost.decrease, Decimal::new(20_000, 2));
        assert_eq!(
            cost.to_string(),
            "For every 10,000 additional miles this car is driven, its value will decrease by \
             approximately $200.00."
        );
    }

    #[test]
    fn appreciating_cohort_is_non_monotonic() {
        let (artifacts, estimator) = estimator();
        let classic = Cohort::new("ford", "mustang", 1981);
        seed_regression(&artifacts, &classic, 8_000.0, 0.01, 900.0);

        assert!(matches!(
            estimator.mileage_cost(&classic),
            Err(ApplicationError::Domain(DomainError::NonMonotonicModel { .. }))
        ));
    }

    #[test]
    fn custom_increment_scales_the_decrease() {
        let (artifacts, estimator) = estimator();
        let estimator = estimator.with_mileage_increment(5_000);
        let civic = Cohort::new("honda", "civic", 2015);
        seed_regression(&artifacts, &civic, 10_700.0, -0.02, 500.0);

        let cost = estimator.mileage_cost(&civic).expect("civic 2015 is fitted");
        assert_eq!(cost.decrease, Decimal::new(10_000, 2));
        assert!(cost.to_string().starts_with("For every 5,000 additional miles"));
    }
}
