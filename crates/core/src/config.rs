use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::advice::DEFAULT_CACHE_CAPACITY;
use crate::appraisal::{DealClassifier, DEFAULT_MILEAGE_INCREMENT};
use crate::dataset::ListingBounds;
use crate::normalize::Normalizer;
use crate::store::FitSettings;

pub const DEFAULT_CONFIG_FILE: &str = "carwise.toml";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AppConfig {
    pub data: DataConfig,
    pub store: StoreConfig,
    pub dataset: DatasetConfig,
    pub model: ModelConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DataConfig {
    pub listings_path: Option<PathBuf>,
    pub similarity_path: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StoreConfig {
    pub artifact_dir: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DatasetConfig {
    pub bounds: ListingBounds,
    pub test_proportion: f64,
    pub random_state: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModelConfig {
    pub min_points_to_fit: usize,
    pub residual_multiplier: f64,
    pub mileage_increment: i64,
    pub max_odometer: i64,
    pub min_year: i32,
    pub max_year: i32,
    pub save_plots: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CacheConfig {
    pub capacity: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub listings_path: Option<PathBuf>,
    pub similarity_path: Option<PathBuf>,
    pub artifact_dir: Option<PathBuf>,
    pub residual_multiplier: Option<f64>,
    pub cache_capacity: Option<usize>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        let normalizer = Normalizer::default();
        Self {
            data: DataConfig::default(),
            store: StoreConfig { artifact_dir: PathBuf::from("models") },
            dataset: DatasetConfig {
                bounds: ListingBounds::default(),
                test_proportion: 0.2,
                random_state: 3142,
            },
            model: ModelConfig {
                min_points_to_fit: FitSettings::default().min_points_to_fit,
                residual_multiplier: DealClassifier::default().residual_multiplier(),
                mileage_increment: DEFAULT_MILEAGE_INCREMENT,
                max_odometer: normalizer.max_odometer(),
                min_year: normalizer.min_year(),
                max_year: normalizer.max_year(),
                save_plots: false,
            },
            cache: CacheConfig { capacity: DEFAULT_CACHE_CAPACITY },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn fit_settings(&self) -> FitSettings {
        FitSettings {
            min_points_to_fit: self.model.min_points_to_fit,
            residual_factor: self.model.residual_multiplier,
            save_plots: self.model.save_plots,
        }
    }

    pub fn normalizer(&self) -> Normalizer {
        Normalizer::new(self.model.min_year, self.model.max_year, self.model.max_odometer)
    }

    pub fn classifier(&self) -> DealClassifier {
        DealClassifier::new(self.model.residual_multiplier)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(data) = patch.data {
            if let Some(listings_path) = data.listings_path {
                self.data.listings_path = Some(listings_path);
            }
            if let Some(similarity_path) = data.similarity_path {
                self.data.similarity_path = Some(similarity_path);
            }
        }

        if let Some(store) = patch.store {
            if let Some(artifact_dir) = store.artifact_dir {
                self.store.artifact_dir = artifact_dir;
            }
        }

        if let Some(dataset) = patch.dataset {
            let bounds = &mut self.dataset.bounds;
            if let Some(value) = dataset.min_year_exclusive {
                bounds.min_year_exclusive = value;
            }
            if let Some(value) = dataset.max_year_exclusive {
                bounds.max_year_exclusive = value;
            }
            if let Some(value) = dataset.min_odometer_exclusive {
                bounds.min_odometer_exclusive = value;
            }
            if let Some(value) = dataset.max_odometer_exclusive {
                bounds.max_odometer_exclusive = value;
            }
            if let Some(value) = dataset.min_price {
                bounds.min_price = value;
            }
            if let Some(value) = dataset.max_price {
                bounds.max_price = Some(value);
            }
            if let Some(test_proportion) = dataset.test_proportion {
                self.dataset.test_proportion = test_proportion;
            }
            if let Some(random_state) = dataset.random_state {
                self.dataset.random_state = random_state;
            }
        }

        if let Some(model) = patch.model {
            if let Some(min_points_to_fit) = model.min_points_to_fit {
                self.model.min_points_to_fit = min_points_to_fit;
            }
            if let Some(residual_multiplier) = model.residual_multiplier {
                self.model.residual_multiplier = residual_multiplier;
            }
            if let Some(mileage_increment) = model.mileage_increment {
                self.model.mileage_increment = mileage_increment;
            }
            if let Some(max_odometer) = model.max_odometer {
                self.model.max_odometer = max_odometer;
            }
            if let Some(min_year) = model.min_year {
                self.model.min_year = min_year;
            }
            if let Some(max_year) = model.max_year {
                self.model.max_year = max_year;
            }
            if let Some(save_plots) = model.save_plots {
                self.model.save_plots = save_plots;
            }
        }

        if let Some(cache) = patch.cache {
            if let Some(capacity) = cache.capacity {
                self.cache.capacity = capacity;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CARWISE_DATA_LISTINGS_PATH") {
            self.data.listings_path = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("CARWISE_DATA_SIMILARITY_PATH") {
            self.data.similarity_path = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("CARWISE_STORE_ARTIFACT_DIR") {
            self.store.artifact_dir = PathBuf::from(value);
        }

        if let Some(value) = read_env("CARWISE_DATASET_MIN_YEAR_EXCLUSIVE") {
            self.dataset.bounds.min_year_exclusive =
                parse_env("CARWISE_DATASET_MIN_YEAR_EXCLUSIVE", &value)?;
        }
        if let Some(value) = read_env("CARWISE_DATASET_MAX_YEAR_EXCLUSIVE") {
            self.dataset.bounds.max_year_exclusive =
                parse_env("CARWISE_DATASET_MAX_YEAR_EXCLUSIVE", &value)?;
        }
        if let Some(value) = read_env("CARWISE_DATASET_MIN_ODOMETER_EXCLUSIVE") {
            self.dataset.bounds.min_odometer_exclusive =
                parse_env("CARWISE_DATASET_MIN_ODOMETER_EXCLUSIVE", &value)?;
        }
        if let Some(value) = read_env("CARWISE_DATASET_MAX_ODOMETER_EXCLUSIVE") {
            self.dataset.bounds.max_odometer_exclusive =
                parse_env("CARWISE_DATASET_MAX_ODOMETER_EXCLUSIVE", &value)?;
        }
        if let Some(value) = read_env("CARWISE_DATASET_MIN_PRICE") {
            self.dataset.bounds.min_price = parse_env("CARWISE_DATASET_MIN_PRICE", &value)?;
        }
        if let Some(value) = read_env("CARWISE_DATASET_MAX_PRICE") {
            self.dataset.bounds.max_price = Some(parse_env("CARWISE_DATASET_MAX_PRICE", &value)?);
        }
        if let Some(value) = read_env("CARWISE_DATASET_TEST_PROPORTION") {
            self.dataset.test_proportion = parse_env("CARWISE_DATASET_TEST_PROPORTION", &value)?;
        }
        if let Some(value) = read_env("CARWISE_DATASET_RANDOM_STATE") {
            self.dataset.random_state = parse_env("CARWISE_DATASET_RANDOM_STATE", &value)?;
        }

        if let Some(value) = read_env("CARWISE_MODEL_MIN_POINTS_TO_FIT") {
            self.model.min_points_to_fit = parse_env("CARWISE_MODEL_MIN_POINTS_TO_FIT", &value)?;
        }
        if let Some(value) = read_env("CARWISE_MODEL_RESIDUAL_MULTIPLIER") {
            self.model.residual_multiplier =
                parse_env("CARWISE_MODEL_RESIDUAL_MULTIPLIER", &value)?;
        }
        if let Some(value) = read_env("CARWISE_MODEL_MILEAGE_INCREMENT") {
            self.model.mileage_increment = parse_env("CARWISE_MODEL_MILEAGE_INCREMENT", &value)?;
        }
        if let Some(value) = read_env("CARWISE_MODEL_MAX_ODOMETER") {
            self.model.max_odometer = parse_env("CARWISE_MODEL_MAX_ODOMETER", &value)?;
        }
        if let Some(value) = read_env("CARWISE_MODEL_MIN_YEAR") {
            self.model.min_year = parse_env("CARWISE_MODEL_MIN_YEAR", &value)?;
        }
        if let Some(value) = read_env("CARWISE_MODEL_MAX_YEAR") {
            self.model.max_year = parse_env("CARWISE_MODEL_MAX_YEAR", &value)?;
        }
        if let Some(value) = read_env("CARWISE_MODEL_SAVE_PLOTS") {
            self.model.save_plots = parse_env("CARWISE_MODEL_SAVE_PLOTS", &value)?;
        }

        if let Some(value) = read_env("CARWISE_CACHE_CAPACITY") {
            self.cache.capacity = parse_env("CARWISE_CACHE_CAPACITY", &value)?;
        }

        let log_level =
            read_env("CARWISE_LOGGING_LEVEL").or_else(|| read_env("CARWISE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CARWISE_LOGGING_FORMAT").or_else(|| read_env("CARWISE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(listings_path) = overrides.listings_path {
            self.data.listings_path = Some(listings_path);
        }
        if let Some(similarity_path) = overrides.similarity_path {
            self.data.similarity_path = Some(similarity_path);
        }
        if let Some(artifact_dir) = overrides.artifact_dir {
            self.store.artifact_dir = artifact_dir;
        }
        if let Some(residual_multiplier) = overrides.residual_multiplier {
            self.model.residual_multiplier = residual_multiplier;
        }
        if let Some(capacity) = overrides.cache_capacity {
            self.cache.capacity = capacity;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_store(&self.store)?;
        validate_dataset(&self.dataset)?;
        validate_model(&self.model)?;
        validate_cache(&self.cache)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), Path::new("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_store(store: &StoreConfig) -> Result<(), ConfigError> {
    if store.artifact_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation("store.artifact_dir must not be empty".to_string()));
    }
    Ok(())
}

fn validate_dataset(dataset: &DatasetConfig) -> Result<(), ConfigError> {
    let bounds = &dataset.bounds;
    if bounds.min_year_exclusive >= bounds.max_year_exclusive {
        return Err(ConfigError::Validation(
            "dataset.min_year_exclusive must be below dataset.max_year_exclusive".to_string(),
        ));
    }
    if bounds.min_odometer_exclusive >= bounds.max_odometer_exclusive {
        return Err(ConfigError::Validation(
            "dataset.min_odometer_exclusive must be below dataset.max_odometer_exclusive"
                .to_string(),
        ));
    }
    if !(bounds.min_price.is_finite() && bounds.min_price >= 0.0) {
        return Err(ConfigError::Validation(
            "dataset.min_price must be a non-negative number".to_string(),
        ));
    }
    if let Some(max_price) = bounds.max_price {
        if max_price.is_nan() || max_price <= bounds.min_price {
            return Err(ConfigError::Validation(
                "dataset.max_price must be greater than dataset.min_price".to_string(),
            ));
        }
    }
    if !(dataset.test_proportion > 0.0 && dataset.test_proportion < 1.0) {
        return Err(ConfigError::Validation(
            "dataset.test_proportion must be strictly between 0 and 1".to_string(),
        ));
    }
    Ok(())
}

fn validate_model(model: &ModelConfig) -> Result<(), ConfigError> {
    if model.min_points_to_fit < 2 {
        return Err(ConfigError::Validation(
            "model.min_points_to_fit must be at least 2".to_string(),
        ));
    }
    if !(model.residual_multiplier.is_finite() && model.residual_multiplier > 0.0) {
        return Err(ConfigError::Validation(
            "model.residual_multiplier must be a positive number".to_string(),
        ));
    }
    if model.mileage_increment <= 0 {
        return Err(ConfigError::Validation(
            "model.mileage_increment must be greater than zero".to_string(),
        ));
    }
    if model.max_odometer <= 1 {
        return Err(ConfigError::Validation(
            "model.max_odometer must be greater than one".to_string(),
        ));
    }
    if model.min_year > model.max_year {
        return Err(ConfigError::Validation(
            "model.min_year must not be after model.max_year".to_string(),
        ));
    }
    Ok(())
}

fn validate_cache(cache: &CacheConfig) -> Result<(), ConfigError> {
    if cache.capacity == 0 {
        return Err(ConfigError::Validation(
            "cache.capacity must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    data: Option<DataPatch>,
    store: Option<StorePatch>,
    dataset: Option<DatasetPatch>,
    model: Option<ModelPatch>,
    cache: Option<CachePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DataPatch {
    listings_path: Option<PathBuf>,
    similarity_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct StorePatch {
    artifact_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct DatasetPatch {
    min_year_exclusive: Option<i32>,
    max_year_exclusive: Option<i32>,
    min_odometer_exclusive: Option<i64>,
    max_odometer_exclusive: Option<i64>,
    min_price: Option<f64>,
    max_price: Option<f64>,
    test_proportion: Option<f64>,
    random_state: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ModelPatch {
    min_points_to_fit: Option<usize>,
    residual_multiplier: Option<f64>,
    mileage_increment: Option<i64>,
    max_odometer: Option<i64>,
    min_year: Option<i32>,
    max_year: Option<i32>,
    save_plots: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct CachePatch {
    capacity: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
