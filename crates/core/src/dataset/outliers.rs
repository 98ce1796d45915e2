use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::listing::Listing;
use crate::errors::DomainError;

const IQR_FENCE: f64 = 1.5;
const MAX_STANDARD_SCORE: f64 = 3.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutlierMode {
    /// Keep rows inside `[Q1 - 1.5 IQR, Q3 + 1.5 IQR]`.
    Iqr,
    /// Keep rows within three sample standard deviations of the mean.
    StandardDeviation,
}

impl FromStr for OutlierMode {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "IQR" => Ok(Self::Iqr),
            "SD" => Ok(Self::StandardDeviation),
            _ => Err(DomainError::InvalidMode(value.to_owned())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericColumn {
    Year,
    Odometer,
    Price,
}

impl NumericColumn {
    pub fn value(self, listing: &Listing) -> f64 {
        match self {
            Self::Year => f64::from(listing.year),
            Self::Odometer => listing.odometer as f64,
            Self::Price => listing.price,
        }
    }
}

impl OutlierMode {
    pub fn retain(self, listings: Vec<Listing>, column: NumericColumn) -> Vec<Listing> {
        let values: Vec<f64> = listings.iter().map(|listing| column.value(listing)).collect();
        let Some((low, high)) = self.fences(&values) else {
            return listings;
        };
        listings
            .into_iter()
            .filter(|listing| {
                let value = column.value(listing);
                value >= low && value <= high
            })
            .collect()
    }

    /// Inclusive keep-range for the given column values, or `None` when the
    /// sample is too small to describe a spread.
    pub fn fences(self, values: &[f64]) -> Option<(f64, f64)> {
        match self {
            Self::Iqr => {
                let mut sorted = values.to_vec();
                sorted.sort_by(f64::total_cmp);
                let q1 = quantile(&sorted, 0.25)?;
                let q3 = quantile(&sorted, 0.75)?;
                let iqr = q3 - q1;
                Some((q1 - IQR_FENCE * iqr, q3 + IQR_FENCE * iqr))
            }
            Self::StandardDeviation => {
                if values.len() < 2 {
                    return None;
                }
                let n = values.len() as f64;
                let mean = values.iter().sum::<f64>() / n;
                let variance =
                    values.iter().map(|value| (value - mean).powi(2)).sum::<f64>() / (n - 1.0);
                let spread = MAX_STANDARD_SCORE * variance.sqrt();
                Some((mean - spread, mean + spread))
            }
        }
    }
}

/// Drops rows whose `column` value is an outlier under `mode` (`"IQR"` or
/// `"SD"`, case-insensitive).
pub fn remove_outliers(
    listings: Vec<Listing>,
    column: NumericColumn,
    mode: &str,
) -> Result<Vec<Listing>, DomainError> {
    let mode = mode.parse::<OutlierMode>()?;
    Ok(mode.retain(listings, column))
}

/// Linearly interpolated quantile of an ascending slice.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let position = q.clamp(0.0, 1.0) * last as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}
