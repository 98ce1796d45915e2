use serde::{Deserialize, Serialize};

use crate::domain::cohort::Cohort;

/// A listings row as it arrives from the scraped source. Every field may be
/// missing; columns not named here are ignored on read.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct RawListing {
    pub id: Option<f64>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub year: Option<f64>,
    pub odometer: Option<f64>,
    pub price: Option<f64>,
    pub description: Option<String>,
    pub lat: Option<f64>,
    pub long: Option<f64>,
    pub county: Option<String>,
}

/// A cleaned listing with every field populated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: i64,
    pub manufacturer: String,
    pub model: String,
    pub year: i32,
    pub odometer: i64,
    pub price: f64,
    pub description: String,
    pub lat: f64,
    pub long: f64,
}

impl Listing {
    pub fn belongs_to(&self, cohort: &Cohort) -> bool {
        self.year == cohort.year
            && self.manufacturer == cohort.manufacturer
            && self.model == cohort.model
    }

    pub fn cohort(&self) -> Cohort {
        Cohort {
            manufacturer: self.manufacturer.clone(),
            model: self.model.clone(),
            year: self.year,
        }
    }
}
