pub mod advice;
pub mod appraisal;
pub mod config;
pub mod dataset;
pub mod domain;
pub mod errors;
pub mod normalize;
pub mod plot;
pub mod regression;
pub mod similarity;
pub mod store;

pub use advice::{AdviceCache, AdviceFailure, AdviceKind, AdviceResult, AdviceService};
pub use appraisal::{
    DealClassifier, DealVerdict, MileageCost, PriceEstimate, PriceEstimator,
    DEFAULT_MILEAGE_INCREMENT,
};
pub use dataset::{
    prepare, remove_outliers, split_by_description, DescriptionSplit, ListingBounds,
    ListingTable, NumericColumn, OutlierMode, PrepareSummary, Vocabulary,
};
pub use domain::cohort::{Cohort, CohortKey, ModelKey};
pub use domain::listing::{Listing, RawListing};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use normalize::{parse_free_text, Normalizer, RawQuery, VehicleQuery};
pub use plot::{ConfidenceBands, NoopPlotter, RegressionPlotter};
pub use regression::{FittedRegression, LinearModel};
pub use similarity::{clean_similarity_map, SimilarAdvice, SimilarityAdvisor, SimilarityMap};
pub use store::{
    ArtifactStore, FitOutcome, FitReport, FitSettings, FsArtifactStore, MemoryArtifactStore,
    RegressionStore, StoreError,
};
