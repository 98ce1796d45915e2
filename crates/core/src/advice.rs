//! The advice boundary: free text in, [`AdviceResult`] out.
//!
//! Every failure is folded into the result's error slot. Successful results
//! are memoised in a bounded [`AdviceCache`] owned by the service.

use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;

use lru::LruCache;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::appraisal::{DealClassifier, DealVerdict, PriceEstimator};
use crate::domain::money::to_cents;
use crate::errors::{ApplicationError, DomainError, InterfaceError};
use crate::normalize::{parse_free_text, VehicleQuery};
use crate::similarity::{SimilarityAdvisor, SimilarityMap};
use crate::store::ArtifactStore;

pub const DEFAULT_CACHE_CAPACITY: usize = 128;

/// How much advice a request asks for. Each kind includes the previous one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdviceKind {
    /// Deal verdict only.
    Price,
    /// Verdict plus value lost per mileage increment.
    Mileage,
    /// Verdict, mileage cost and similar vehicles.
    Similar,
}

impl AdviceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::Mileage => "mileage",
            Self::Similar => "similar",
        }
    }

    fn includes_mileage(self) -> bool {
        matches!(self, Self::Mileage | Self::Similar)
    }
}

impl fmt::Display for AdviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdviceKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "price" => Ok(Self::Price),
            "mileage" => Ok(Self::Mileage),
            "similar" => Ok(Self::Similar),
            _ => Err(DomainError::MalformedInput(format!(
                "advice kind `{value}` is not one of price, mileage, similar"
            ))),
        }
    }
}

/// Caller-visible failure. `user_message` is safe to show as is.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AdviceFailure {
    pub class: String,
    pub message: String,
    pub user_message: String,
    pub correlation_id: String,
}

impl From<InterfaceError> for AdviceFailure {
    fn from(error: InterfaceError) -> Self {
        let (class, correlation_id) = match &error {
            InterfaceError::BadRequest { correlation_id, .. } => ("bad_request", correlation_id),
            InterfaceError::NotFound { correlation_id, .. } => ("not_found", correlation_id),
            InterfaceError::Internal { correlation_id, .. } => ("internal", correlation_id),
        };
        Self {
            class: class.to_owned(),
            correlation_id: correlation_id.clone(),
            message: error.message().to_owned(),
            user_message: error.user_message().to_owned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AdviceResult {
    pub input: String,
    pub kind: AdviceKind,
    pub predicted_price: Option<Decimal>,
    pub mean_absolute_residual: Option<Decimal>,
    pub verdict: Option<DealVerdict>,
    pub verdict_text: Option<String>,
    pub mileage_cost_text: Option<String>,
    pub similar_text: Option<String>,
    pub error: Option<AdviceFailure>,
}

impl AdviceResult {
    fn new(input: &str, kind: AdviceKind) -> Self {
        Self {
            input: input.to_owned(),
            kind,
            predicted_price: None,
            mean_absolute_residual: None,
            verdict: None,
            verdict_text: None,
            mileage_cost_text: None,
            similar_text: None,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Verdict and mileage text on one line, similar vehicles below.
    pub fn advice_text(&self) -> String {
        let headline = [self.verdict_text.as_deref(), self.mileage_cost_text.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        match &self.similar_text {
            Some(similar) if headline.is_empty() => similar.clone(),
            Some(similar) => format!("{headline}\n{similar}"),
            None => headline,
        }
    }
}

type CacheKey = (String, AdviceKind);

/// Bounded LRU memo of successful advice. Entries are never refreshed when
/// artifacts change; call [`AdviceCache::clear`] after refitting.
pub struct AdviceCache {
    entries: LruCache<CacheKey, AdviceResult>,
}

impl AdviceCache {
    pub fn new(capacity: usize) -> Result<Self, ApplicationError> {
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
            ApplicationError::Configuration("advice cache capacity must be > 0".to_owned())
        })?;
        Ok(Self { entries: LruCache::new(capacity) })
    }

    pub fn get(&mut self, input: &str, kind: AdviceKind) -> Option<&AdviceResult> {
        self.entries.get(&(input.to_owned(), kind))
    }

    pub fn insert(&mut self, result: AdviceResult) {
        self.entries.put((result.input.clone(), result.kind), result);
    }

    pub fn invalidate(&mut self, input: &str, kind: AdviceKind) -> Option<AdviceResult> {
        self.entries.pop(&(input.to_owned(), kind))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }
}

impl Default for AdviceCache {
    fn default() -> Self {
        let capacity = NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self { entries: LruCache::new(capacity) }
    }
}

pub struct AdviceService<S> {
    estimator: PriceEstimator<S>,
    classifier: DealClassifier,
    similarity: SimilarityMap,
    cache: AdviceCache,
    requests: u64,
}

impl<S: ArtifactStore> AdviceService<S> {
    pub fn new(
        estimator: PriceEstimator<S>,
        classifier: DealClassifier,
        similarity: SimilarityMap,
        cache: AdviceCache,
    ) -> Self {
        Self { estimator, classifier, similarity, cache, requests: 0 }
    }

    pub fn estimator(&self) -> &PriceEstimator<S> {
        &self.estimator
    }

    pub fn cache(&self) -> &AdviceCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut AdviceCache {
        &mut self.cache
    }

    /// Like [`AdviceService::get_advice`] with the kind given as text.
    pub fn get_advice_str(&mut self, raw_text: &str, kind: &str) -> AdviceResult {
        match kind.parse::<AdviceKind>() {
            Ok(kind) => self.get_advice(raw_text, kind),
            Err(error) => {
                let mut result = AdviceResult::new(raw_text, AdviceKind::Price);
                result.error = Some(self.failure(error.into()));
                result
            }
        }
    }

    pub fn get_advice(&mut self, raw_text: &str, kind: AdviceKind) -> AdviceResult {
        if let Some(cached) = self.cache.get(raw_text, kind) {
            debug!(event_name = "carwise.advice.cache_hit", kind = %kind, "advice served from cache");
            return cached.clone();
        }

        let mut result = AdviceResult::new(raw_text, kind);
        let mut query = None;
        let outcome = self.compute(raw_text, kind, &mut result, &mut query);

        match outcome {
            Ok(()) => {
                info!(
                    event_name = "carwise.advice.completed",
                    kind = %kind,
                    verdict = ?result.verdict,
                    "advice computed"
                );
                self.cache.insert(result.clone());
            }
            Err(error) => {
                // Similar vehicles are still worth showing when the exact
                // cohort cannot be priced.
                if let (AdviceKind::Similar, Some(query)) = (kind, query.as_ref()) {
                    if result.similar_text.is_none() {
                        result.similar_text = Some(self.similar_text(query));
                    }
                }
                let failure = self.failure(error);
                warn!(
                    event_name = "carwise.advice.failed",
                    kind = %kind,
                    class = %failure.class,
                    correlation_id = %failure.correlation_id,
                    error = %failure.message,
                    "advice request failed"
                );
                result.error = Some(failure);
            }
        }
        result
    }

    fn compute(
        &self,
        raw_text: &str,
        kind: AdviceKind,
        result: &mut AdviceResult,
        query_slot: &mut Option<VehicleQuery>,
    ) -> Result<(), ApplicationError> {
        let raw = parse_free_text(raw_text)?;
        let query = self.estimator.normalizer().normalize_raw(&raw)?;
        let listed_price = raw.listed_price()?;
        let query = query_slot.insert(query);

        let estimate = self.estimator.predict(query)?;
        result.predicted_price = Some(estimate.price_in_cents());
        result.mean_absolute_residual = Some(to_cents(estimate.mean_absolute_residual));

        let verdict =
            self.classifier.classify(estimate.price, listed_price, estimate.mean_absolute_residual)?;
        result.verdict = Some(verdict);
        result.verdict_text = Some(verdict.sentence().to_owned());

        if kind.includes_mileage() {
            let cost = self.estimator.mileage_cost(&query.cohort)?;
            result.mileage_cost_text = Some(cost.to_string());
        }
        if kind == AdviceKind::Similar {
            result.similar_text = Some(self.similar_text(query));
        }
        Ok(())
    }

    fn similar_text(&self, query: &VehicleQuery) -> String {
        SimilarityAdvisor::new(&self.estimator, &self.similarity)
            .similar_advice(&query.cohort, query.odometer)
            .render()
    }

    fn failure(&mut self, error: ApplicationError) -> AdviceFailure {
        self.requests += 1;
        AdviceFailure::from(error.into_interface(format!("advice-{}", self.requests)))
    }
}
