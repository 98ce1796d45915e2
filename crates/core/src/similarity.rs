//! Similar-vehicle advice.
//!
//! A [`SimilarityMap`] is built offline (see [`clean_similarity_map`]) and
//! loaded once per process. At advice time every mapped candidate is priced
//! for the caller's year and mileage; candidates without a usable regression
//! are reported as skipped instead of failing the whole request.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::appraisal::{MileageCost, PriceEstimate, PriceEstimator};
use crate::domain::cohort::{fold_name, Cohort, ModelKey};
use crate::domain::money::format_usd;
use crate::errors::ApplicationError;
use crate::normalize::VehicleQuery;
use crate::store::ArtifactStore;

pub const SIMILAR_VEHICLES_HEADER: &str =
    "Here is the same information but for similar vehicles for the same year and mileage";
pub const NO_SIMILAR_VEHICLES: &str = "Sorry, no similar vehicles were available.";

#[derive(Debug, Error)]
pub enum SimilarityError {
    #[error("could not read similarity map `{path}`: {source}")]
    Open { path: PathBuf, source: std::io::Error },
    #[error("similarity map is not valid json: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("similarity token `{0}` is not of the form manufacturer_model")]
    InvalidToken(String),
}

impl From<SimilarityError> for ApplicationError {
    fn from(value: SimilarityError) -> Self {
        Self::Dataset(value.to_string())
    }
}

/// Read-only `(manufacturer, model) -> comparable (manufacturer, model)s`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SimilarityMap {
    entries: BTreeMap<ModelKey, BTreeSet<ModelKey>>,
}

impl SimilarityMap {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: BTreeMap<ModelKey, BTreeSet<ModelKey>>) -> Self {
        Self { entries }
    }

    /// Parses `{"make_model": ["make_model", ...]}`.
    pub fn from_json_str(raw: &str) -> Result<Self, SimilarityError> {
        let decoded: BTreeMap<String, Vec<String>> = serde_json::from_str(raw)?;
        let parse = |token: &str| {
            ModelKey::parse_token(token)
                .ok_or_else(|| SimilarityError::InvalidToken(token.to_owned()))
        };

        let mut entries = BTreeMap::new();
        for (key, candidates) in &decoded {
            let key = parse(key)?;
            let candidates =
                candidates.iter().map(|token| parse(token)).collect::<Result<BTreeSet<_>, _>>()?;
            entries.insert(key, candidates);
        }
        Ok(Self { entries })
    }

    pub fn load(path: &Path) -> Result<Self, SimilarityError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| SimilarityError::Open { path: path.to_path_buf(), source })?;
        let map = Self::from_json_str(&raw)?;
        info!(
            event_name = "carwise.similarity.loaded",
            path = %path.display(),
            entries = map.len(),
            "similarity map loaded"
        );
        Ok(map)
    }

    pub fn to_json_string(&self) -> Result<String, SimilarityError> {
        let tokens: BTreeMap<String, Vec<String>> = self
            .entries
            .iter()
            .map(|(key, candidates)| {
                (key.token(), candidates.iter().map(ModelKey::token).collect())
            })
            .collect();
        Ok(serde_json::to_string_pretty(&tokens)?)
    }

    pub fn get(&self, key: &ModelKey) -> Option<&BTreeSet<ModelKey>> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CandidateEstimate {
    pub estimate: PriceEstimate,
    pub mileage: MileageCost,
}

impl CandidateEstimate {
    pub fn line(&self, candidate: &ModelKey) -> String {
        format!(
            "{candidate}: would cost approximately {}. {}",
            format_usd(self.estimate.price_in_cents()),
            self.mileage
        )
    }
}

/// What happened to one mapped candidate. Failures are kept so callers can
/// see which candidates were dropped and why.
#[derive(Clone, Debug, PartialEq)]
pub struct CandidateOutcome {
    pub candidate: ModelKey,
    pub result: Result<CandidateEstimate, ApplicationError>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SimilarAdvice {
    NoSimilarVehicles,
    Candidates(Vec<CandidateOutcome>),
}

impl SimilarAdvice {
    pub fn priced(&self) -> impl Iterator<Item = (&ModelKey, &CandidateEstimate)> {
        self.outcomes()
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().ok().map(|est| (&outcome.candidate, est)))
    }

    pub fn skipped(&self) -> impl Iterator<Item = (&ModelKey, &ApplicationError)> {
        self.outcomes()
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().err().map(|err| (&outcome.candidate, err)))
    }

    fn outcomes(&self) -> &[CandidateOutcome] {
        match self {
            Self::NoSimilarVehicles => &[],
            Self::Candidates(outcomes) => outcomes,
        }
    }

    pub fn render(&self) -> String {
        match self {
            Self::NoSimilarVehicles => NO_SIMILAR_VEHICLES.to_owned(),
            Self::Candidates(_) => {
                let mut text = SIMILAR_VEHICLES_HEADER.to_owned();
                for (candidate, estimate) in self.priced() {
                    text.push('\n');
                    text.push_str(&estimate.line(candidate));
                }
                text
            }
        }
    }
}

pub struct SimilarityAdvisor<'a, S> {
    estimator: &'a PriceEstimator<S>,
    map: &'a SimilarityMap,
}

impl<'a, S: ArtifactStore> SimilarityAdvisor<'a, S> {
    pub fn new(estimator: &'a PriceEstimator<S>, map: &'a SimilarityMap) -> Self {
        Self { estimator, map }
    }

    pub fn similar_advice(&self, cohort: &Cohort, odometer: i64) -> SimilarAdvice {
        let Some(candidates) = self.map.get(&cohort.model_key()) else {
            debug!(
                event_name = "carwise.similarity.no_entry",
                cohort = %cohort.key(),
                "no similar vehicles mapped"
            );
            return SimilarAdvice::NoSimilarVehicles;
        };

        let outcomes = candidates
            .iter()
            .map(|candidate| {
                let result = self.price_candidate(candidate, cohort.year, odometer);
                if let Err(error) = &result {
                    debug!(
                        event_name = "carwise.similarity.candidate_skipped",
                        cohort = %cohort.key(),
                        candidate = %candidate.token(),
                        %error,
                        "similar vehicle skipped"
                    );
                }
                CandidateOutcome { candidate: candidate.clone(), result }
            })
            .collect();
        SimilarAdvice::Candidates(outcomes)
    }

    fn price_candidate(
        &self,
        candidate: &ModelKey,
        year: i32,
        odometer: i64,
    ) -> Result<CandidateEstimate, ApplicationError> {
        let query = VehicleQuery { cohort: candidate.in_year(year), odometer };
        let estimate = self.estimator.predict(&query)?;
        let mileage = self.estimator.mileage_cost(&query.cohort)?;
        Ok(CandidateEstimate { estimate, mileage })
    }
}

/// Restricts a raw similarity map to vehicles that occur in the data.
///
/// Raw names are loose (`Land-Rover Range-Rover`, `mercedes benz_c-class`),
/// so each is split into hyphen/space separated words and resolved greedily:
/// the longest leading run of words that names a known manufacturer, then
/// the longest following run that names a known model. Words may be joined
/// with either `-` or a space. Entries whose key does not resolve are
/// dropped, as are candidates that do not resolve or that repeat the key.
pub fn clean_similarity_map(
    raw: &BTreeMap<String, Vec<String>>,
    known_manufacturers: &BTreeSet<String>,
    known_models: &BTreeSet<String>,
) -> SimilarityMap {
    let resolve = |name: &str| resolve_model_key(name, known_manufacturers, known_models);

    let mut entries: BTreeMap<ModelKey, BTreeSet<ModelKey>> = BTreeMap::new();
    for (key, candidates) in raw {
        let Some(key) = resolve(key) else {
            debug!(event_name = "carwise.similarity.key_dropped", key = %key, "unknown vehicle");
            continue;
        };
        let cleaned: BTreeSet<ModelKey> = candidates
            .iter()
            .filter_map(|candidate| resolve(candidate))
            .filter(|candidate| *candidate != key)
            .collect();
        if !cleaned.is_empty() {
            entries.entry(key).or_default().extend(cleaned);
        }
    }

    info!(
        event_name = "carwise.similarity.cleaned",
        raw_entries = raw.len(),
        kept_entries = entries.len(),
        "similarity map cleaned"
    );
    SimilarityMap::from_entries(entries)
}

fn resolve_model_key(
    name: &str,
    known_manufacturers: &BTreeSet<String>,
    known_models: &BTreeSet<String>,
) -> Option<ModelKey> {
    let folded = fold_name(&name.replace('_', " "));
    let words: Vec<&str> =
        folded.split([' ', '-']).filter(|word| !word.is_empty()).collect();

    let (manufacturer, used) = longest_prefix_match(&words, known_manufacturers)?;
    let (model, _) = longest_prefix_match(&words[used..], known_models)?;
    Some(ModelKey { manufacturer, model })
}

/// Longest run of leading `words` that, joined by `-` or a space, is in
/// `vocabulary`. Returns the matched name and the number of words consumed.
fn longest_prefix_match(words: &[&str], vocabulary: &BTreeSet<String>) -> Option<(String, usize)> {
    (1..=words.len()).rev().find_map(|length| {
        let run = &words[..length];
        ["-", " "]
            .iter()
            .map(|separator| run.join(separator))
            .find(|candidate| vocabulary.contains(candidate))
            .map(|name| (name, length))
    })
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::Arc;

    use tempfile::TempDir;

    use crate::appraisal::fixtures::seed_regression;
    use crate::appraisal::PriceEstimator;
    use crate::domain::cohort::{Cohort, ModelKey};
    use crate::errors::{ApplicationError, DomainError};
    use crate::normalize::Normalizer;
    use crate::similarity::{
        clean_similarity_map, SimilarAdvice, SimilarityAdvisor, SimilarityError, SimilarityMap,
        NO_SIMILAR_VEHICLES, SIMILAR_VEHICLES_HEADER,
    };
    use crate::store::{FitSettings, MemoryArtifactStore, RegressionStore};

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|name| (*name).to_owned()).collect()
    }

    fn estimator() -> (Arc<MemoryArtifactStore>, PriceEstimator<Arc<MemoryArtifactStore>>) {
        let artifacts = Arc::new(MemoryArtifactStore::new());
        let store = RegressionStore::new(artifacts.clone(), FitSettings::default());
        (artifacts, PriceEstimator::new(Normalizer::default(), store))
    }

    #[test]
    fn map_parses_tokens_into_model_keys() {
        let map = SimilarityMap::from_json_str(
            r#"{"honda_civic": ["toyota_corolla", "mazda_3"], "ford_f-150": ["ram_1500"]}"#,
        )
        .expect("valid map");

        assert_eq!(map.len(), 2);
        let civic = map.get(&ModelKey::new("honda", "civic")).expect("civic entry");
        assert!(civic.contains(&ModelKey::new("toyota", "corolla")));
        assert!(civic.contains(&ModelKey::new("mazda", "3")));
        assert!(map.get(&ModelKey::new("honda", "accord")).is_none());
    }

    #[test]
    fn map_rejects_tokens_without_separator() {
        let error = SimilarityMap::from_json_str(r#"{"honda": ["toyota_corolla"]}"#)
            .expect_err("key has no model");
        assert!(matches!(error, SimilarityError::InvalidToken(token) if token == "honda"));
    }

    #[test]
    fn map_loads_from_disk_and_round_trips() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("similar.json");
        std::fs::write(&path, r#"{"honda_civic": ["toyota_corolla"]}"#).expect("write map");

        let map = SimilarityMap::load(&path).expect("map loads");
        let rewritten = map.to_json_string().expect("map encodes");
        assert_eq!(SimilarityMap::from_json_str(&rewritten).expect("re-parses"), map);
        assert!(matches!(
            SimilarityMap::load(&dir.path().join("missing.json")),
            Err(SimilarityError::Open { .. })
        ));
    }

    #[test]
    fn absent_entry_returns_fallback_text_verbatim() {
        let (_, estimator) = estimator();
        let map = SimilarityMap::empty();
        let advice = SimilarityAdvisor::new(&estimator, &map)
            .similar_advice(&Cohort::new("honda", "civic", 2015), 45_000);

        assert_eq!(advice, SimilarAdvice::NoSimilarVehicles);
        assert_eq!(advice.render(), NO_SIMILAR_VEHICLES);
    }

    #[test]
    fn failed_candidates_are_skipped_with_reasons() {
        let (artifacts, estimator) = estimator();
        seed_regression(&artifacts, &Cohort::new("toyota", "corolla", 2015), 11_000.0, -0.03, 400.0);
        seed_regression(&artifacts, &Cohort::new("mazda", "3", 2015), 9_000.0, 0.01, 400.0);
        let map = SimilarityMap::from_json_str(
            r#"{"honda_civic": ["toyota_corolla", "mazda_3", "nissan_sentra"]}"#,
        )
        .expect("valid map");

        let advice = SimilarityAdvisor::new(&estimator, &map)
            .similar_advice(&Cohort::new("honda", "civic", 2015), 40_000);

        let priced: Vec<String> = advice.priced().map(|(key, _)| key.token()).collect();
        assert_eq!(priced, vec!["toyota_corolla".to_owned()]);

        let skipped: BTreeMap<String, &ApplicationError> =
            advice.skipped().map(|(key, error)| (key.token(), error)).collect();
        assert!(matches!(
            skipped["mazda_3"],
            ApplicationError::Domain(DomainError::NonMonotonicModel { .. })
        ));
        assert!(matches!(
            skipped["nissan_sentra"],
            ApplicationError::Domain(DomainError::NoModelForCohort(_))
        ));

        assert_eq!(
            advice.render(),
            format!(
                "{SIMILAR_VEHICLES_HEADER}\nToyota, Corolla: would cost approximately $9,800.00. \
                 For every 10,000 additional miles this car is driven, its value will decrease \
                 by approximately $300.00."
            )
        );
    }

    #[test]
    fn cleaning_resolves_compound_names_greedily() {
        let manufacturers = set(&["land rover", "rover", "mercedes-benz", "ford", "honda"]);
        let models = set(&["range rover", "range", "c-class", "f-150", "civic"]);
        let mut raw = BTreeMap::new();
        raw.insert(
            "Land-Rover_Range-Rover".to_owned(),
            vec![
                "mercedes benz_c class".to_owned(),
                "ford_f-150".to_owned(),
                "zastava_yugo".to_owned(),
                "land rover range rover".to_owned(),
            ],
        );
        raw.insert("Zastava_Yugo".to_owned(), vec!["honda_civic".to_owned()]);
        raw.insert("honda_civic".to_owned(), vec!["pagani_zonda".to_owned()]);

        let map = clean_similarity_map(&raw, &manufacturers, &models);

        assert_eq!(map.len(), 1);
        let range_rover = map
            .get(&ModelKey::new("land rover", "range rover"))
            .expect("longest manufacturer and model win");
        let tokens: Vec<String> = range_rover.iter().map(ModelKey::token).collect();
        assert_eq!(tokens, vec!["ford_f-150".to_owned(), "mercedes-benz_c-class".to_owned()]);
    }
}
