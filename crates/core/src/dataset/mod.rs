//! Listing ingestion and cleaning.
//!
//! Raw scraped listings are coerced into typed rows, bounded to plausible
//! year/odometer/price ranges and indexed by listing id. The cleaned table is
//! the only input the regression fit path accepts.

pub mod outliers;
pub mod split;

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::domain::cohort::{fold_name, Cohort};
use crate::domain::listing::{Listing, RawListing};
use crate::errors::ApplicationError;

pub use outliers::{remove_outliers, NumericColumn, OutlierMode};
pub use split::{split_by_description, DescriptionSplit};

/// Columns present in the scraped source that are too sparse to be useful.
pub const SPARSE_COLUMNS: &[&str] = &["county"];

/// Sentinel stored for numeric fields that were missing in the raw source.
pub const MISSING_NUMERIC: i64 = -1;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("could not open listings file `{path}`: {source}")]
    Open { path: PathBuf, source: std::io::Error },
    #[error("could not decode listings csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("test fraction must be strictly between 0 and 1, got {0}")]
    InvalidFraction(f64),
}

impl From<DatasetError> for ApplicationError {
    fn from(value: DatasetError) -> Self {
        Self::Dataset(value.to_string())
    }
}

/// Row filters applied by [`prepare`]. Year and odometer bounds are exclusive
/// on both ends; the price floor is inclusive and the optional ceiling exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ListingBounds {
    pub min_year_exclusive: i32,
    pub max_year_exclusive: i32,
    pub min_odometer_exclusive: i64,
    pub max_odometer_exclusive: i64,
    pub min_price: f64,
    pub max_price: Option<f64>,
}

impl Default for ListingBounds {
    fn default() -> Self {
        Self {
            min_year_exclusive: 1980,
            max_year_exclusive: 2020,
            min_odometer_exclusive: 1_000,
            max_odometer_exclusive: 300_000,
            min_price: 500.0,
            max_price: None,
        }
    }
}

impl ListingBounds {
    pub fn admits(&self, listing: &Listing) -> bool {
        let year_ok =
            listing.year > self.min_year_exclusive && listing.year < self.max_year_exclusive;
        let odometer_ok = listing.odometer > self.min_odometer_exclusive
            && listing.odometer < self.max_odometer_exclusive;
        let price_ok = listing.price >= self.min_price
            && self.max_price.map_or(true, |ceiling| listing.price < ceiling);
        year_ok && odometer_ok && price_ok
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PrepareSummary {
    pub raw_rows: usize,
    pub missing_price: usize,
    pub out_of_bounds: usize,
    pub kept_rows: usize,
}

/// Cleaned listings, ordered by listing id.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListingTable {
    listings: Vec<Listing>,
}

impl ListingTable {
    pub fn from_listings(mut listings: Vec<Listing>) -> Self {
        listings.sort_by_key(|listing| listing.id);
        Self { listings }
    }

    pub fn listings(&self) -> &[Listing] {
        &self.listings
    }

    pub fn into_listings(self) -> Vec<Listing> {
        self.listings
    }

    pub fn len(&self) -> usize {
        self.listings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&Listing> {
        self.listings
            .binary_search_by_key(&id, |listing| listing.id)
            .ok()
            .map(|index| &self.listings[index])
    }

    pub fn cohort_rows(&self, cohort: &Cohort) -> Vec<Listing> {
        self.listings.iter().filter(|listing| listing.belongs_to(cohort)).cloned().collect()
    }

    /// Distinct cohorts in the table, in sorted order.
    pub fn cohorts(&self) -> BTreeSet<Cohort> {
        self.listings
            .iter()
            .filter(|listing| !listing.manufacturer.is_empty() && !listing.model.is_empty())
            .map(Listing::cohort)
            .collect()
    }

    pub fn vocabulary(&self) -> Vocabulary {
        let mut vocabulary = Vocabulary::default();
        for listing in &self.listings {
            if !listing.manufacturer.is_empty() {
                vocabulary.manufacturers.insert(listing.manufacturer.clone());
            }
            if !listing.model.is_empty() {
                vocabulary.models.insert(listing.model.clone());
            }
        }
        vocabulary
    }

    pub fn read_csv<R: Read>(reader: R) -> Result<Self, DatasetError> {
        let mut reader = csv::Reader::from_reader(reader);
        let mut listings = Vec::new();
        for record in reader.deserialize() {
            let listing: Listing = record?;
            listings.push(listing);
        }
        Ok(Self::from_listings(listings))
    }

    pub fn load_csv(path: &Path) -> Result<Self, DatasetError> {
        let file = File::open(path)
            .map_err(|source| DatasetError::Open { path: path.to_path_buf(), source })?;
        Self::read_csv(file)
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), DatasetError> {
        write_listings(&self.listings, writer)
    }
}

/// Manufacturers and models that actually occur in a cleaned table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Vocabulary {
    pub manufacturers: BTreeSet<String>,
    pub models: BTreeSet<String>,
}

pub fn write_listings<W: Write>(listings: &[Listing], writer: W) -> Result<(), DatasetError> {
    let mut writer = csv::Writer::from_writer(writer);
    for listing in listings {
        writer.serialize(listing)?;
    }
    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

pub fn read_raw_csv<R: Read>(reader: R) -> Result<Vec<RawListing>, DatasetError> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        let row: RawListing = record?;
        rows.push(row);
    }
    Ok(rows)
}

pub fn load_raw_csv(path: &Path) -> Result<Vec<RawListing>, DatasetError> {
    let file =
        File::open(path).map_err(|source| DatasetError::Open { path: path.to_path_buf(), source })?;
    read_raw_csv(file)
}

/// Cleans raw rows into a [`ListingTable`].
///
/// Missing numeric fields take the `-1` sentinel before integer coercion and
/// missing text becomes empty, so rows without a year or odometer fall out
/// through the bounds filter. Rows without a price are dropped outright.
pub fn prepare(raw: Vec<RawListing>, bounds: &ListingBounds) -> (ListingTable, PrepareSummary) {
    let mut summary = PrepareSummary { raw_rows: raw.len(), ..PrepareSummary::default() };
    let mut kept = Vec::with_capacity(raw.len());

    for row in raw {
        let Some(listing) = coerce(row) else {
            summary.missing_price += 1;
            continue;
        };
        if bounds.admits(&listing) {
            kept.push(listing);
        } else {
            summary.out_of_bounds += 1;
        }
    }

    summary.kept_rows = kept.len();
    info!(
        event_name = "carwise.dataset.prepared",
        raw_rows = summary.raw_rows,
        kept_rows = summary.kept_rows,
        out_of_bounds = summary.out_of_bounds,
        missing_price = summary.missing_price,
        dropped_columns = ?SPARSE_COLUMNS,
        "listings cleaned"
    );

    (ListingTable::from_listings(kept), summary)
}

fn coerce(row: RawListing) -> Option<Listing> {
    let price = row.price.filter(|price| price.is_finite())?;
    Some(Listing {
        id: integer_or_sentinel(row.id),
        manufacturer: fold_name(row.manufacturer.as_deref().unwrap_or_default()),
        model: fold_name(row.model.as_deref().unwrap_or_default()),
        year: i32::try_from(integer_or_sentinel(row.year)).unwrap_or(MISSING_NUMERIC as i32),
        odometer: integer_or_sentinel(row.odometer),
        price,
        description: row.description.unwrap_or_default(),
        lat: row.lat.unwrap_or(MISSING_NUMERIC as f64),
        long: row.long.unwrap_or(MISSING_NUMERIC as f64),
    })
}

fn integer_or_sentinel(value: Option<f64>) -> i64 {
    match value {
        Some(value) if value.is_finite() => value.trunc() as i64,
        _ => MISSING_NUMERIC,
    }
}
