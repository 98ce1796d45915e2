//! Persistence of fitted regressions.
//!
//! Artifacts are append-only: once a cohort has a stored regression a later
//! fit is a no-op that reports [`FitOutcome::AlreadyFitted`].

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Serialize, Serializer};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::dataset::{ListingTable, NumericColumn, OutlierMode};
use crate::domain::cohort::{Cohort, CohortKey};
use crate::domain::listing::Listing;
use crate::errors::{ApplicationError, DomainError};
use crate::normalize::Normalizer;
use crate::plot::{ConfidenceBands, NoopPlotter, RegressionPlotter};
use crate::regression::FittedRegression;

pub const ARTIFACT_EXTENSION: &str = "json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("artifact io failed for `{path}`: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("artifact `{0}` already exists")]
    AlreadyExists(CohortKey),
    #[error("artifact `{key}` is corrupted: {source}")]
    Corrupt { key: CohortKey, source: serde_json::Error },
    #[error("artifact `{key}` could not be encoded: {source}")]
    Encode { key: CohortKey, source: serde_json::Error },
    #[error("artifact store lock was poisoned")]
    Poisoned,
}

/// Key-value boundary the fitted regressions are persisted through.
pub trait ArtifactStore: Send + Sync {
    fn exists(&self, key: &CohortKey) -> Result<bool, StoreError>;
    /// Writes a new artifact. Implementations must refuse to replace an
    /// existing key with [`StoreError::AlreadyExists`].
    fn write(&self, key: &CohortKey, value: &[u8]) -> Result<(), StoreError>;
    fn read(&self, key: &CohortKey) -> Result<Option<Vec<u8>>, StoreError>;
}

impl<S: ArtifactStore + ?Sized> ArtifactStore for Arc<S> {
    fn exists(&self, key: &CohortKey) -> Result<bool, StoreError> {
        (**self).exists(key)
    }

    fn write(&self, key: &CohortKey, value: &[u8]) -> Result<(), StoreError> {
        (**self).write(key, value)
    }

    fn read(&self, key: &CohortKey) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).read(key)
    }
}

/// One `<key>.json` file per cohort under a root directory.
#[derive(Clone, Debug)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &CohortKey) -> PathBuf {
        self.root.join(format!("{}.{ARTIFACT_EXTENSION}", key.as_str()))
    }
}

impl ArtifactStore for FsArtifactStore {
    fn exists(&self, key: &CohortKey) -> Result<bool, StoreError> {
        Ok(self.path_for(key).is_file())
    }

    fn write(&self, key: &CohortKey, value: &[u8]) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root).map_err(io_error(&self.root))?;
        let target = self.path_for(key);
        if target.exists() {
            return Err(StoreError::AlreadyExists(key.clone()));
        }

        // Readers only ever see a complete file.
        let staging = self.root.join(format!(".{}.{ARTIFACT_EXTENSION}.tmp", key.as_str()));
        fs::write(&staging, value).map_err(io_error(&staging))?;
        fs::rename(&staging, &target).map_err(io_error(&target))
    }

    fn read(&self, key: &CohortKey) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError {
    let path = path.to_path_buf();
    move |source| StoreError::Io { path, source }
}

#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    artifacts: Mutex<HashMap<CohortKey, Vec<u8>>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.artifacts.lock().map(|artifacts| artifacts.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn exists(&self, key: &CohortKey) -> Result<bool, StoreError> {
        let artifacts = self.artifacts.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(artifacts.contains_key(key))
    }

    fn write(&self, key: &CohortKey, value: &[u8]) -> Result<(), StoreError> {
        let mut artifacts = self.artifacts.lock().map_err(|_| StoreError::Poisoned)?;
        if artifacts.contains_key(key) {
            return Err(StoreError::AlreadyExists(key.clone()));
        }
        artifacts.insert(key.clone(), value.to_vec());
        Ok(())
    }

    fn read(&self, key: &CohortKey) -> Result<Option<Vec<u8>>, StoreError> {
        let artifacts = self.artifacts.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(artifacts.get(key).cloned())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct FitSettings {
    pub min_points_to_fit: usize,
    pub residual_factor: f64,
    pub save_plots: bool,
}

impl Default for FitSettings {
    fn default() -> Self {
        Self { min_points_to_fit: 30, residual_factor: 1.0, save_plots: false }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FitSummary {
    pub key: CohortKey,
    pub sample_count: usize,
    pub slope: f64,
    pub intercept: f64,
    pub mean_absolute_residual: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FitOutcome {
    Fitted(FitSummary),
    AlreadyFitted { key: CohortKey },
    InsufficientData { key: CohortKey, found: usize, required: usize },
    /// The cohort can never be priced, so no artifact is written.
    Rejected {
        key: CohortKey,
        #[serde(serialize_with = "serialize_display")]
        reason: DomainError,
    },
}

fn serialize_display<S>(value: &DomainError, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(value)
}

impl FitOutcome {
    pub fn into_result(self) -> Result<FitSummary, DomainError> {
        match self {
            Self::Fitted(summary) => Ok(summary),
            Self::AlreadyFitted { key } => Err(DomainError::AlreadyFitted(key.0)),
            Self::InsufficientData { key, found, required } => {
                Err(DomainError::InsufficientData { cohort: key.0, found, required })
            }
            Self::Rejected { reason, .. } => Err(reason),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FitReport {
    pub fitted: Vec<CohortKey>,
    pub already_fitted: usize,
    pub insufficient_data: usize,
    pub rejected: Vec<CohortKey>,
}

/// Owns the lifecycle of fitted regression artifacts.
pub struct RegressionStore<S> {
    artifacts: S,
    settings: FitSettings,
    normalizer: Normalizer,
    plotter: Box<dyn RegressionPlotter>,
}

impl<S: ArtifactStore> RegressionStore<S> {
    pub fn new(artifacts: S, settings: FitSettings) -> Self {
        Self {
            artifacts,
            settings,
            normalizer: Normalizer::default(),
            plotter: Box::new(NoopPlotter),
        }
    }

    /// Cohorts this normalizer rejects are never fitted.
    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_plotter(mut self, plotter: Box<dyn RegressionPlotter>) -> Self {
        self.plotter = plotter;
        self
    }

    pub fn artifacts(&self) -> &S {
        &self.artifacts
    }

    pub fn settings(&self) -> &FitSettings {
        &self.settings
    }

    /// Fits and persists the regression for `cohort` from `listings`.
    ///
    /// Cohorts the normalizer would reject at advice time are refused. Rows
    /// outside the cohort are ignored and price outliers (IQR) are removed
    /// before the sample-size check.
    pub fn fit(&self, listings: &[Listing], cohort: &Cohort) -> Result<FitOutcome, ApplicationError> {
        let key = cohort.key();
        if let Err(reason) = self.normalizer.validate_cohort(cohort) {
            debug!(event_name = "carwise.fit.rejected", cohort = %key, %reason, "cohort not fittable");
            return Ok(FitOutcome::Rejected { key, reason });
        }
        if self.artifacts.exists(&key)? {
            debug!(event_name = "carwise.fit.skipped", cohort = %key, "artifact already exists");
            return Ok(FitOutcome::AlreadyFitted { key });
        }

        let rows: Vec<Listing> =
            listings.iter().filter(|listing| listing.belongs_to(cohort)).cloned().collect();
        let rows = OutlierMode::Iqr.retain(rows, NumericColumn::Price);

        let required = self.settings.min_points_to_fit;
        let fit = if rows.len() >= required {
            FittedRegression::fit(cohort.clone(), &rows)
        } else {
            None
        };
        let Some(fit) = fit else {
            debug!(
                event_name = "carwise.fit.insufficient_data",
                cohort = %key,
                found = rows.len(),
                required,
                "not enough listings to fit"
            );
            return Ok(FitOutcome::InsufficientData { key, found: rows.len(), required });
        };

        if self.settings.save_plots {
            let bands = ConfidenceBands::from_regression(&fit, self.settings.residual_factor);
            if let Err(error) = self.plotter.render(&bands) {
                warn!(event_name = "carwise.fit.plot_failed", cohort = %key, %error, "plot skipped");
            }
        }

        let encoded = serde_json::to_vec(&fit)
            .map_err(|source| StoreError::Encode { key: key.clone(), source })?;
        self.artifacts.write(&key, &encoded)?;

        info!(
            event_name = "carwise.fit.completed",
            cohort = %key,
            samples = fit.sample_count(),
            slope = fit.model.slope,
            mean_absolute_residual = fit.mean_absolute_residual,
            "regression fit and saved"
        );

        Ok(FitOutcome::Fitted(FitSummary {
            key,
            sample_count: fit.sample_count(),
            slope: fit.model.slope,
            intercept: fit.model.intercept,
            mean_absolute_residual: fit.mean_absolute_residual,
        }))
    }

    /// Fits every distinct cohort present in `table`.
    pub fn fit_all(&self, table: &ListingTable) -> Result<FitReport, ApplicationError> {
        let mut report = FitReport::default();
        for cohort in table.cohorts() {
            match self.fit(table.listings(), &cohort)? {
                FitOutcome::Fitted(summary) => report.fitted.push(summary.key),
                FitOutcome::AlreadyFitted { .. } => report.already_fitted += 1,
                FitOutcome::InsufficientData { .. } => report.insufficient_data += 1,
                FitOutcome::Rejected { key, .. } => report.rejected.push(key),
            }
        }
        info!(
            event_name = "carwise.fit.batch_completed",
            fitted = report.fitted.len(),
            already_fitted = report.already_fitted,
            insufficient_data = report.insufficient_data,
            rejected = report.rejected.len(),
            "cohort batch fit finished"
        );
        Ok(report)
    }

    pub fn load(&self, cohort: &Cohort) -> Result<Option<FittedRegression>, StoreError> {
        let key = cohort.key();
        let Some(bytes) = self.artifacts.read(&key)? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes).map(Some).map_err(|source| StoreError::Corrupt { key, source })
    }

    /// Like [`RegressionStore::load`] but a missing artifact is an error.
    pub fn require(&self, cohort: &Cohort) -> Result<FittedRegression, ApplicationError> {
        self.load(cohort)?
            .ok_or_else(|| DomainError::NoModelForCohort(cohort.key().0).into())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tempfile::TempDir;

    use crate::dataset::fixtures::{linear_cohort, listing};
    use crate::dataset::ListingTable;
    use crate::domain::cohort::{Cohort, CohortKey};
    use crate::errors::{ApplicationError, DomainError};
    use crate::normalize::Normalizer;
    use crate::plot::{ConfidenceBands, RegressionPlotter};
    use crate::store::{
        ArtifactStore, FitOutcome, FitSettings, FsArtifactStore, MemoryArtifactStore,
        RegressionStore, StoreError,
    };

    const CIVIC: (&str, &str, i32) = ("honda", "civic", 2015);

    fn civic() -> Cohort {
        Cohort::new(CIVIC.0, CIVIC.1, CIVIC.2)
    }

    #[test]
    fn fit_persists_once_and_second_fit_is_a_no_op() {
        let dir = TempDir::new().expect("temp dir");
        let store = RegressionStore::new(FsArtifactStore::new(dir.path()), FitSettings::default());
        let rows = linear_cohort(CIVIC, 40, 15_000.0, -0.05, 250.0, 1);

        let first = store.fit(&rows, &civic()).expect("fit should succeed");
        let summary = first.clone().into_result().expect("first fit writes an artifact");
        assert_eq!(summary.key.as_str(), "honda_civic_2015");
        assert_eq!(summary.sample_count, 40);

        let path = store.artifacts().path_for(&summary.key);
        let before = std::fs::read(&path).expect("artifact file exists");

        let other_rows = linear_cohort(CIVIC, 40, 99_000.0, -0.9, 10.0, 100);
        let second = store.fit(&other_rows, &civic()).expect("refit should not error");
        assert_eq!(second, FitOutcome::AlreadyFitted { key: summary.key.clone() });
        assert_eq!(std::fs::read(&path).expect("artifact file exists"), before);

        let loaded = store.load(&civic()).expect("load succeeds").expect("artifact present");
        assert!((loaded.model.slope + 0.05).abs() < 1e-9);
        assert!((loaded.mean_absolute_residual - 250.0).abs() < 1e-6);
    }

    #[test]
    fn too_few_rows_write_nothing() {
        let store = RegressionStore::new(MemoryArtifactStore::new(), FitSettings::default());
        let rows = linear_cohort(CIVIC, 29, 15_000.0, -0.05, 250.0, 1);

        let outcome = store.fit(&rows, &civic()).expect("fit should not error");
        assert_eq!(
            outcome,
            FitOutcome::InsufficientData {
                key: CohortKey("honda_civic_2015".to_owned()),
                found: 29,
                required: 30
            }
        );
        assert!(store.artifacts().is_empty());
        assert!(matches!(
            outcome.into_result(),
            Err(DomainError::InsufficientData { found: 29, required: 30, .. })
        ));
    }

    #[test]
    fn fit_ignores_other_cohorts_and_price_outliers() {
        let store = RegressionStore::new(MemoryArtifactStore::new(), FitSettings::default());
        let mut rows = linear_cohort(CIVIC, 30, 15_000.0, -0.05, 250.0, 1);
        rows.extend(linear_cohort(("honda", "civic", 2014), 30, 14_000.0, -0.05, 250.0, 100));
        rows.push(listing(500, CIVIC, 50_000, 95_000.0));

        let summary = store
            .fit(&rows, &civic())
            .expect("fit should succeed")
            .into_result()
            .expect("cohort has enough rows");
        assert_eq!(summary.sample_count, 30);
        assert!((summary.slope + 0.05).abs() < 1e-9);
    }

    #[test]
    fn missing_artifact_is_reported_as_no_model() {
        let store = RegressionStore::new(MemoryArtifactStore::new(), FitSettings::default());
        assert!(store.load(&civic()).expect("load succeeds").is_none());
        assert_eq!(
            store.require(&civic()).expect_err("nothing stored"),
            ApplicationError::Domain(DomainError::NoModelForCohort("honda_civic_2015".to_owned()))
        );
    }

    #[test]
    fn corrupted_artifact_surfaces_as_store_error() {
        let artifacts = MemoryArtifactStore::new();
        artifacts.write(&civic().key(), b"{not json").expect("write succeeds");
        let store = RegressionStore::new(artifacts, FitSettings::default());
        assert!(matches!(store.load(&civic()), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn fs_store_refuses_to_overwrite() {
        let dir = TempDir::new().expect("temp dir");
        let artifacts = FsArtifactStore::new(dir.path().join("models"));
        let key = civic().key();

        assert!(!artifacts.exists(&key).expect("exists check"));
        assert!(artifacts.read(&key).expect("read succeeds").is_none());
        artifacts.write(&key, b"first").expect("first write");
        assert!(artifacts.exists(&key).expect("exists check"));
        assert!(matches!(artifacts.write(&key, b"second"), Err(StoreError::AlreadyExists(_))));
        assert_eq!(artifacts.read(&key).expect("read").as_deref(), Some(&b"first"[..]));
    }

    #[test]
    fn fit_all_tallies_every_cohort() {
        let mut rows = linear_cohort(CIVIC, 35, 15_000.0, -0.05, 250.0, 1);
        rows.extend(linear_cohort(("toyota", "corolla", 2015), 31, 14_000.0, -0.04, 200.0, 100));
        rows.extend(linear_cohort(("kia", "rio", 2015), 5, 6_000.0, -0.02, 100.0, 200));
        let table = ListingTable::from_listings(rows);

        let store = RegressionStore::new(MemoryArtifactStore::new(), FitSettings::default());
        let report = store.fit_all(&table).expect("batch fit succeeds");
        assert_eq!(report.fitted.len(), 2);
        assert_eq!(report.insufficient_data, 1);
        assert_eq!(report.already_fitted, 0);

        let again = store.fit_all(&table).expect("batch fit succeeds");
        assert!(again.fitted.is_empty());
        assert_eq!(again.already_fitted, 2);
    }

    #[test]
    fn fit_all_skips_cohorts_that_cannot_be_priced() {
        let mut rows = linear_cohort(CIVIC, 30, 15_000.0, -0.05, 250.0, 1);
        rows.extend(linear_cohort(("honda", "civic", 2019), 30, 16_000.0, -0.05, 250.0, 100));
        rows.extend(linear_cohort(("zastava", "yugo", 2015), 30, 3_000.0, -0.01, 50.0, 200));
        let table = ListingTable::from_listings(rows);

        let store = RegressionStore::new(MemoryArtifactStore::new(), FitSettings::default());
        let report = store.fit_all(&table).expect("batch fit succeeds");
        assert_eq!(report.fitted, vec![CohortKey("honda_civic_2015".to_owned())]);
        assert_eq!(
            report.rejected,
            vec![
                CohortKey("honda_civic_2019".to_owned()),
                CohortKey("zastava_yugo_2015".to_owned())
            ]
        );
        assert_eq!(store.artifacts().len(), 1);
    }

    #[test]
    fn single_fit_reports_the_rejection_reason() {
        let store = RegressionStore::new(MemoryArtifactStore::new(), FitSettings::default())
            .with_normalizer(Normalizer::new(1981, 2014, 300_000));
        let rows = linear_cohort(CIVIC, 30, 15_000.0, -0.05, 250.0, 1);

        let outcome = store.fit(&rows, &civic()).expect("fit should not error");
        assert!(store.artifacts().is_empty());
        assert_eq!(
            outcome.into_result(),
            Err(DomainError::InvalidYear { value: "2015".to_owned(), min: 1981, max: 2014 })
        );
    }

    #[derive(Default)]
    struct RecordingPlotter {
        rendered: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl RegressionPlotter for RecordingPlotter {
        fn render(&self, bands: &ConfidenceBands) -> Result<(), String> {
            if let Ok(mut rendered) = self.rendered.lock() {
                rendered.push(bands.cohort.key().0);
            }
            if self.fail {
                Err("no display".to_owned())
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn plots_are_rendered_on_request_and_failures_do_not_block_the_fit() {
        let rendered = Arc::new(Mutex::new(Vec::new()));
        let plotter = RecordingPlotter { rendered: Arc::clone(&rendered), fail: true };
        let settings = FitSettings { save_plots: true, ..FitSettings::default() };
        let store =
            RegressionStore::new(MemoryArtifactStore::new(), settings).with_plotter(Box::new(plotter));

        let rows = linear_cohort(CIVIC, 30, 15_000.0, -0.05, 250.0, 1);
        let outcome = store.fit(&rows, &civic()).expect("fit should succeed");
        assert!(matches!(outcome, FitOutcome::Fitted(_)));
        assert_eq!(*rendered.lock().expect("lock"), vec!["honda_civic_2015".to_owned()]);
    }
}
