//! Data handed to the diagnostic plot collaborator.
//!
//! Rendering lives outside this crate. The store computes the series a
//! scatter + regression + deal band chart needs and passes them to a
//! [`RegressionPlotter`]; a failed render never fails a fit.

use serde::Serialize;

use crate::domain::cohort::Cohort;
use crate::regression::FittedRegression;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConfidenceBands {
    pub cohort: Cohort,
    /// Observed `(odometer, price)` points in training order.
    pub observed: Vec<(f64, f64)>,
    /// Ascending odometer axis shared by every line below.
    pub odometer: Vec<f64>,
    pub regression: Vec<f64>,
    pub very_good_deal: Vec<f64>,
    pub good_deal: Vec<f64>,
    pub bad_deal: Vec<f64>,
    pub very_bad_deal: Vec<f64>,
}

impl ConfidenceBands {
    /// Dashed boundaries sit at `±1×` and `±2×` `residual_factor` times the
    /// mean absolute residual around the regression line.
    pub fn from_regression(fit: &FittedRegression, residual_factor: f64) -> Self {
        let band = residual_factor * fit.mean_absolute_residual;
        let shifted = |offset: f64| -> Vec<f64> {
            fit.predictions.iter().map(|prediction| prediction + offset).collect()
        };

        Self {
            cohort: fit.cohort.clone(),
            observed: fit
                .training_odometer
                .iter()
                .copied()
                .zip(fit.training_price.iter().copied())
                .collect(),
            odometer: fit.sorted_odometer(),
            regression: fit.predictions.clone(),
            very_good_deal: shifted(-2.0 * band),
            good_deal: shifted(-band),
            bad_deal: shifted(band),
            very_bad_deal: shifted(2.0 * band),
        }
    }
}

pub trait RegressionPlotter: Send + Sync {
    fn render(&self, bands: &ConfidenceBands) -> Result<(), String>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopPlotter;

impl RegressionPlotter for NoopPlotter {
    fn render(&self, _bands: &ConfidenceBands) -> Result<(), String> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::dataset::fixtures::linear_cohort;
    use crate::domain::cohort::Cohort;
    use crate::plot::ConfidenceBands;
    use crate::regression::FittedRegression;

    #[test]
    fn bands_bracket_the_regression_line() {
        let rows = linear_cohort(("honda", "civic", 2015), 30, 12_000.0, -0.04, 200.0, 1);
        let fit = FittedRegression::fit(Cohort::new("honda", "civic", 2015), &rows)
            .expect("rows are present");
        let bands = ConfidenceBands::from_regression(&fit, 0.75);

        assert_eq!(bands.odometer.len(), 30);
        assert_eq!(bands.observed.len(), 30);
        for index in 0..bands.regression.len() {
            let line = bands.regression[index];
            assert!((line - bands.good_deal[index] - 150.0).abs() < 1e-6);
            assert!((bands.very_bad_deal[index] - line - 300.0).abs() < 1e-6);
            assert!(bands.very_good_deal[index] < bands.good_deal[index]);
            assert!(bands.bad_deal[index] < bands.very_bad_deal[index]);
        }
    }
}
