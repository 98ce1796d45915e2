//! Single-predictor least squares regression of price on odometer.
//!
//! A [`FittedRegression`] keeps the data it was trained on together with its
//! in-sample predictions and mean absolute residual, so advice can be given
//! from the persisted artifact alone without reloading listings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::cohort::Cohort;
use crate::domain::listing::Listing;

/// Ordinary least squares line `price = intercept + slope * odometer`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearModel {
    /// Fits the line through `(x, y)` pairs. A sample with no spread in `x`
    /// fits a flat line through the mean of `y`.
    pub fn fit(x: &[f64], y: &[f64]) -> Option<Self> {
        if x.is_empty() || x.len() != y.len() {
            return None;
        }
        let n = x.len() as f64;
        let mean_x = x.iter().sum::<f64>() / n;
        let mean_y = y.iter().sum::<f64>() / n;

        let (covariance, variance) =
            x.iter().zip(y).fold((0.0, 0.0), |(covariance, variance), (xi, yi)| {
                let dx = xi - mean_x;
                (covariance + dx * (yi - mean_y), variance + dx * dx)
            });

        let slope = if variance > 0.0 { covariance / variance } else { 0.0 };
        Some(Self { slope, intercept: mean_y - slope * mean_x })
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FittedRegression {
    pub cohort: Cohort,
    pub model: LinearModel,
    /// Training odometer readings, in listing order.
    pub training_odometer: Vec<f64>,
    /// Training prices, aligned with `training_odometer`.
    pub training_price: Vec<f64>,
    /// Predictions at the training odometer readings sorted ascending.
    pub predictions: Vec<f64>,
    pub mean_absolute_residual: f64,
    pub fitted_at: DateTime<Utc>,
}

impl FittedRegression {
    pub fn fit(cohort: Cohort, rows: &[Listing]) -> Option<Self> {
        let training_odometer: Vec<f64> = rows.iter().map(|row| row.odometer as f64).collect();
        let training_price: Vec<f64> = rows.iter().map(|row| row.price).collect();
        let model = LinearModel::fit(&training_odometer, &training_price)?;

        let mut pairs: Vec<(f64, f64)> =
            training_odometer.iter().copied().zip(training_price.iter().copied()).collect();
        pairs.sort_by(|left, right| left.0.total_cmp(&right.0));

        let predictions: Vec<f64> = pairs.iter().map(|(x, _)| model.predict(*x)).collect();
        let mean_absolute_residual = pairs
            .iter()
            .zip(&predictions)
            .map(|((_, actual), predicted)| (predicted - actual).abs())
            .sum::<f64>()
            / pairs.len() as f64;

        Some(Self {
            cohort,
            model,
            training_odometer,
            training_price,
            predictions,
            mean_absolute_residual,
            fitted_at: Utc::now(),
        })
    }

    /// Raw regression value at `odometer`; may be negative far out on the line.
    pub fn predict(&self, odometer: f64) -> f64 {
        self.model.predict(odometer)
    }

    pub fn sample_count(&self) -> usize {
        self.training_odometer.len()
    }

    pub fn sorted_odometer(&self) -> Vec<f64> {
        let mut sorted = self.training_odometer.clone();
        sorted.sort_by(f64::total_cmp);
        sorted
    }
}
