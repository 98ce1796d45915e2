use std::fmt;

use serde::{Deserialize, Serialize};

/// Storage-safe identifier of a fitted cohort, `manufacturer_model_year`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CohortKey(pub String);

impl CohortKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CohortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A (manufacturer, model) pair, the unit the similarity map is keyed by.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelKey {
    pub manufacturer: String,
    pub model: String,
}

impl ModelKey {
    pub fn new(manufacturer: impl AsRef<str>, model: impl AsRef<str>) -> Self {
        Self { manufacturer: fold_name(manufacturer.as_ref()), model: fold_name(model.as_ref()) }
    }

    /// Parses the `manufacturer_model` token used by similarity files.
    pub fn parse_token(token: &str) -> Option<Self> {
        let (manufacturer, model) = token.split_once('_')?;
        let key = Self::new(manufacturer, model);
        (!key.manufacturer.is_empty() && !key.model.is_empty()).then_some(key)
    }

    pub fn token(&self) -> String {
        format!("{}_{}", self.manufacturer, self.model)
    }

    pub fn in_year(&self, year: i32) -> Cohort {
        Cohort { manufacturer: self.manufacturer.clone(), model: self.model.clone(), year }
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", title_case(&self.manufacturer), title_case(&self.model))
    }
}

/// The (manufacturer, model, year) population a single regression is fit on.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cohort {
    pub manufacturer: String,
    pub model: String,
    pub year: i32,
}

impl Cohort {
    pub fn new(manufacturer: impl AsRef<str>, model: impl AsRef<str>, year: i32) -> Self {
        Self {
            manufacturer: fold_name(manufacturer.as_ref()),
            model: fold_name(model.as_ref()),
            year,
        }
    }

    pub fn key(&self) -> CohortKey {
        let raw = format!("{}_{}_{}", self.manufacturer, self.model, self.year);
        CohortKey(raw.replace(['/', '\\'], ""))
    }

    pub fn model_key(&self) -> ModelKey {
        ModelKey { manufacturer: self.manufacturer.clone(), model: self.model.clone() }
    }
}

impl fmt::Display for Cohort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.model_key(), self.year)
    }
}

/// Canonical form of a manufacturer or model name.
///
/// Lower-cases, drops punctuation other than `-` (hyphens are part of names
/// such as `mercedes-benz` and `f-150`), and collapses whitespace runs.
pub fn fold_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|ch| !(ch.is_ascii_punctuation() && *ch != '-'))
        .flat_map(char::to_lowercase)
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn title_case(value: &str) -> String {
    value
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::{fold_name, title_case, Cohort, ModelKey};

    #[test]
    fn fold_name_strips_punctuation_but_keeps_hyphens() {
        assert_eq!(fold_name("  Mercedes-Benz "), "mercedes-benz");
        assert_eq!(fold_name("F-150 / Lariat"), "f-150 lariat");
        assert_eq!(fold_name("C.R.V\\"), "crv");
        assert_eq!(fold_name("Grand   Cherokee"), "grand cherokee");
    }

    #[test]
    fn cohort_key_is_storage_safe() {
        let cohort = Cohort::new("Honda", "Civic", 2015);
        assert_eq!(cohort.key().as_str(), "honda_civic_2015");

        let raw = Cohort { manufacturer: "ram".into(), model: "1500/2500".into(), year: 2012 };
        assert_eq!(raw.key().as_str(), "ram_15002500_2012");
    }

    #[test]
    fn model_key_tokens_round_trip_through_parse() {
        let key = ModelKey::parse_token("toyota_corolla").expect("token should parse");
        assert_eq!(key, ModelKey::new("toyota", "corolla"));
        assert_eq!(key.token(), "toyota_corolla");
        assert!(ModelKey::parse_token("toyota").is_none());
        assert!(ModelKey::parse_token("_corolla").is_none());
    }

    #[test]
    fn display_uses_title_case() {
        assert_eq!(title_case("land rover"), "Land Rover");
        assert_eq!(Cohort::new("land rover", "range rover", 2014).to_string(), "Land Rover, Range Rover 2014");
    }
}
