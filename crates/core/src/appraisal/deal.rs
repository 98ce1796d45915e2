use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealVerdict {
    VeryGoodDeal,
    GoodDeal,
    FairPrice,
    BadDeal,
    VeryBadDeal,
}

impl DealVerdict {
    pub fn sentence(self) -> &'static str {
        match self {
            Self::VeryGoodDeal => "This appears to be a very good deal.",
            Self::GoodDeal => "This appears to be a good deal.",
            Self::FairPrice => "This appears to be a fair price for the car.",
            Self::BadDeal => "This appears to be a bad deal.",
            Self::VeryBadDeal => "This appears to be a very bad deal.",
        }
    }
}

impl fmt::Display for DealVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sentence())
    }
}

/// Grades a listed price by how many residual multiples it sits from the
/// regression's prediction.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DealClassifier {
    residual_multiplier: f64,
}

impl Default for DealClassifier {
    fn default() -> Self {
        Self { residual_multiplier: 1.0 }
    }
}

impl DealClassifier {
    pub fn new(residual_multiplier: f64) -> Self {
        Self { residual_multiplier }
    }

    pub fn residual_multiplier(&self) -> f64 {
        self.residual_multiplier
    }

    /// `factor = (predicted - listed) / mean_absolute_residual`, then with
    /// `r` the residual multiplier:
    ///
    /// | factor            | verdict      |
    /// |-------------------|--------------|
    /// | `> 2r`            | very good    |
    /// | `(r, 2r]`         | good         |
    /// | `[-r, r]`         | fair         |
    /// | `[-2r, -r)`       | bad          |
    /// | `< -2r`           | very bad     |
    pub fn classify(
        &self,
        predicted_price: f64,
        listed_price: f64,
        mean_absolute_residual: f64,
    ) -> Result<DealVerdict, DomainError> {
        if !(mean_absolute_residual.is_finite() && mean_absolute_residual > 0.0) {
            return Err(DomainError::DegenerateResidual(mean_absolute_residual));
        }
        let factor = (predicted_price - listed_price) / mean_absolute_residual;
        Ok(self.verdict_for(factor))
    }

    pub fn verdict_for(&self, factor: f64) -> DealVerdict {
        let r = self.residual_multiplier;
        if factor > 2.0 * r {
            DealVerdict::VeryGoodDeal
        } else if factor > r {
            DealVerdict::GoodDeal
        } else if factor >= -r {
            DealVerdict::FairPrice
        } else if factor >= -2.0 * r {
            DealVerdict::BadDeal
        } else {
            DealVerdict::VeryBadDeal
        }
    }
}
