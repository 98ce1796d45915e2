use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::cohort::{fold_name, Cohort};
use crate::errors::DomainError;

/// Manufacturers the scraped listings cover, in the spelling the data uses.
pub const KNOWN_MANUFACTURERS: &[&str] = &[
    "acura",
    "alfa-romeo",
    "aston-martin",
    "audi",
    "bmw",
    "buick",
    "cadillac",
    "chevrolet",
    "chrysler",
    "datsun",
    "dodge",
    "ferrari",
    "fiat",
    "ford",
    "gmc",
    "harley-davidson",
    "hennessey",
    "honda",
    "hyundai",
    "infiniti",
    "jaguar",
    "jeep",
    "kia",
    "land rover",
    "lexus",
    "lincoln",
    "mazda",
    "mercedes-benz",
    "mercury",
    "mini",
    "mitsubishi",
    "nissan",
    "pontiac",
    "porche",
    "ram",
    "rover",
    "saturn",
    "subaru",
    "tesla",
    "toyota",
    "volkswagen",
    "volvo",
];

pub const FREE_TEXT_FIELDS: usize = 5;

/// A validated vehicle: its cohort plus the odometer reading to price at.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VehicleQuery {
    pub cohort: Cohort,
    pub odometer: i64,
}

/// The five trimmed fields of `manufacturer, model, year, mileage, listed price`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawQuery {
    pub manufacturer: String,
    pub model: String,
    pub year: String,
    pub odometer: String,
    pub listed_price: String,
}

impl RawQuery {
    pub fn listed_price(&self) -> Result<f64, DomainError> {
        parse_number(&self.listed_price).filter(|price| *price >= 0.0).ok_or_else(|| {
            DomainError::MalformedInput(format!(
                "listed price `{}` is not a non-negative number",
                self.listed_price
            ))
        })
    }
}

/// Splits `manufacturer, model, year, mileage, listed price` into its fields.
pub fn parse_free_text(text: &str) -> Result<RawQuery, DomainError> {
    let fields: Vec<&str> = text.split(',').map(str::trim).collect();
    if fields.len() != FREE_TEXT_FIELDS {
        return Err(DomainError::MalformedInput(format!(
            "expected {FREE_TEXT_FIELDS} comma separated fields (manufacturer, model, year, \
             mileage, listed price), got {}",
            fields.len()
        )));
    }
    if fields.iter().any(|field| field.is_empty()) {
        return Err(DomainError::MalformedInput("one of the fields is blank".to_owned()));
    }

    Ok(RawQuery {
        manufacturer: fields[0].to_owned(),
        model: fields[1].to_owned(),
        year: fields[2].to_owned(),
        odometer: fields[3].to_owned(),
        listed_price: fields[4].to_owned(),
    })
}

#[derive(Clone, Debug, PartialEq)]
pub struct Normalizer {
    manufacturers: BTreeSet<String>,
    min_year: i32,
    max_year: i32,
    max_odometer: i64,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(1981, 2018, 300_000)
    }
}

impl Normalizer {
    pub fn new(min_year: i32, max_year: i32, max_odometer: i64) -> Self {
        Self {
            manufacturers: KNOWN_MANUFACTURERS.iter().map(|name| (*name).to_owned()).collect(),
            min_year,
            max_year,
            max_odometer,
        }
    }

    pub fn with_manufacturers<I, T>(mut self, manufacturers: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        self.manufacturers = manufacturers.into_iter().map(|name| fold_name(name.as_ref())).collect();
        self
    }

    pub fn manufacturers(&self) -> &BTreeSet<String> {
        &self.manufacturers
    }

    pub fn min_year(&self) -> i32 {
        self.min_year
    }

    pub fn max_year(&self) -> i32 {
        self.max_year
    }

    pub fn max_odometer(&self) -> i64 {
        self.max_odometer
    }

    pub fn is_known_manufacturer(&self, manufacturer: &str) -> bool {
        self.manufacturers.contains(manufacturer)
    }

    /// Checks an already folded cohort against the manufacturer list and
    /// the supported year range.
    pub fn validate_cohort(&self, cohort: &Cohort) -> Result<(), DomainError> {
        if !self.is_known_manufacturer(&cohort.manufacturer) {
            return Err(DomainError::InvalidManufacturer(cohort.manufacturer.clone()));
        }
        if cohort.model.is_empty() {
            return Err(DomainError::MalformedInput("model is blank".to_owned()));
        }
        if cohort.year < self.min_year || cohort.year > self.max_year {
            return Err(DomainError::InvalidYear {
                value: cohort.year.to_string(),
                min: self.min_year,
                max: self.max_year,
            });
        }
        Ok(())
    }

    /// Canonicalises and validates raw vehicle details.
    pub fn normalize(
        &self,
        manufacturer: &str,
        model: &str,
        year: &str,
        odometer: &str,
    ) -> Result<VehicleQuery, DomainError> {
        let manufacturer = fold_name(manufacturer);
        let model = fold_name(model);
        if !self.is_known_manufacturer(&manufacturer) {
            return Err(DomainError::InvalidManufacturer(manufacturer));
        }
        if model.is_empty() {
            return Err(DomainError::MalformedInput("model is blank".to_owned()));
        }

        let invalid_year = || DomainError::InvalidYear {
            value: year.trim().to_owned(),
            min: self.min_year,
            max: self.max_year,
        };
        let year = coerce_integer(year).ok_or_else(invalid_year)?;
        if year < i64::from(self.min_year) || year > i64::from(self.max_year) {
            return Err(invalid_year());
        }

        let invalid_odometer =
            || DomainError::InvalidOdometer { value: odometer.trim().to_owned(), max: self.max_odometer };
        let odometer = coerce_integer(odometer).ok_or_else(invalid_odometer)?;
        if odometer <= 0 || odometer >= self.max_odometer {
            return Err(invalid_odometer());
        }

        Ok(VehicleQuery { cohort: Cohort { manufacturer, model, year: year as i32 }, odometer })
    }

    pub fn normalize_raw(&self, raw: &RawQuery) -> Result<VehicleQuery, DomainError> {
        self.normalize(&raw.manufacturer, &raw.model, &raw.year, &raw.odometer)
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().replace(['$', '_'], "").parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Integer coercion that accepts `2015` as well as `2015.0`, truncating
/// fractional values.
fn coerce_integer(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    raw.parse::<i64>().ok().or_else(|| parse_number(raw).map(|value| value.trunc() as i64))
}

#[cfg(test)]
mod tests {
    use crate::domain::cohort::Cohort;
    use crate::errors::DomainError;
    use crate::normalize::{parse_free_text, Normalizer};

    #[test]
    fn normalize_folds_names_and_coerces_numbers() {
        let query = Normalizer::default()
            .normalize("  Honda ", "Civic/", "2015.0", " 45000 ")
            .expect("valid vehicle");
        assert_eq!(query.cohort, Cohort::new("honda", "civic", 2015));
        assert_eq!(query.odometer, 45_000);
    }

    #[test]
    fn hyphenated_manufacturers_are_recognised() {
        let query = Normalizer::default()
            .normalize("Mercedes-Benz", "C-Class", "2012", "80000")
            .expect("valid vehicle");
        assert_eq!(query.cohort.manufacturer, "mercedes-benz");
        assert_eq!(query.cohort.model, "c-class");
    }

    #[test]
    fn unknown_manufacturer_is_rejected() {
        let error = Normalizer::default()
            .normalize("Zastava", "Yugo", "1988", "50000")
            .expect_err("zastava is not in the vocabulary");
        assert_eq!(error, DomainError::InvalidManufacturer("zastava".to_owned()));
    }

    #[test]
    fn year_range_is_inclusive() {
        let normalizer = Normalizer::default();
        assert!(normalizer.normalize("honda", "civic", "1981", "1").is_ok());
        assert!(normalizer.normalize("honda", "civic", "2018", "1").is_ok());
        assert!(matches!(
            normalizer.normalize("honda", "civic", "1980", "1"),
            Err(DomainError::InvalidYear { .. })
        ));
        assert!(matches!(
            normalizer.normalize("honda", "civic", "2019", "1"),
            Err(DomainError::InvalidYear { .. })
        ));
        assert!(matches!(
            normalizer.normalize("honda", "civic", "new", "1"),
            Err(DomainError::InvalidYear { .. })
        ));
    }

    #[test]
    fn cohort_validation_matches_query_validation() {
        let normalizer = Normalizer::default();
        assert_eq!(normalizer.validate_cohort(&Cohort::new("honda", "civic", 2018)), Ok(()));
        assert_eq!(
            normalizer.validate_cohort(&Cohort::new("honda", "civic", 2019)),
            Err(DomainError::InvalidYear { value: "2019".to_owned(), min: 1981, max: 2018 })
        );
        assert_eq!(
            normalizer.validate_cohort(&Cohort::new("zastava", "yugo", 2015)),
            Err(DomainError::InvalidManufacturer("zastava".to_owned()))
        );
    }

    #[test]
    fn odometer_range_is_exclusive() {
        let normalizer = Normalizer::default();
        assert!(normalizer.normalize("honda", "civic", "2015", "299999").is_ok());
        for raw in ["0", "300000", "-5", "lots"] {
            assert!(
                matches!(
                    normalizer.normalize("honda", "civic", "2015", raw),
                    Err(DomainError::InvalidOdometer { .. })
                ),
                "odometer `{raw}` should be rejected"
            );
        }
    }

    #[test]
    fn custom_vocabulary_replaces_the_default() {
        let normalizer = Normalizer::default().with_manufacturers(["Zastava"]);
        assert!(normalizer.normalize("zastava", "yugo", "1988", "50000").is_ok());
        assert!(normalizer.normalize("honda", "civic", "2015", "50000").is_err());
    }

    #[test]
    fn free_text_splits_into_five_trimmed_fields() {
        let raw = parse_free_text("honda, civic, 2015, 45000, 9000").expect("five fields");
        assert_eq!(raw.manufacturer, "honda");
        assert_eq!(raw.model, "civic");
        assert_eq!(raw.year, "2015");
        assert_eq!(raw.odometer, "45000");
        assert_eq!(raw.listed_price().expect("numeric price"), 9_000.0);
    }

    #[test]
    fn free_text_rejects_wrong_field_count_and_blanks() {
        assert!(matches!(
            parse_free_text("honda, civic, 2015, 45000"),
            Err(DomainError::MalformedInput(_))
        ));
        assert!(matches!(
            parse_free_text("honda, civic, 2015, 45000, 9000, extra"),
            Err(DomainError::MalformedInput(_))
        ));
        assert!(matches!(
            parse_free_text("honda, , 2015, 45000, 9000"),
            Err(DomainError::MalformedInput(_))
        ));
    }

    #[test]
    fn listed_price_must_be_numeric() {
        let raw = parse_free_text("honda, civic, 2015, 45000, cheap").expect("five fields");
        assert!(matches!(raw.listed_price(), Err(DomainError::MalformedInput(_))));
        let raw = parse_free_text("honda, civic, 2015, 45000, $9000").expect("five fields");
        assert_eq!(raw.listed_price().expect("dollar sign is tolerated"), 9_000.0);
    }
}
