use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use carwise_core::config::{AppConfig, DEFAULT_CONFIG_FILE};
use toml::Value;

pub fn run(config: &AppConfig, explicit_path: Option<&Path>) -> String {
    let config_file_path = detect_config_path(explicit_path);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let bounds = &config.dataset.bounds;
    let entries: Vec<(&str, &str, String)> = vec![
        ("data.listings_path", "CARWISE_DATA_LISTINGS_PATH", display_path(&config.data.listings_path)),
        (
            "data.similarity_path",
            "CARWISE_DATA_SIMILARITY_PATH",
            display_path(&config.data.similarity_path),
        ),
        (
            "store.artifact_dir",
            "CARWISE_STORE_ARTIFACT_DIR",
            config.store.artifact_dir.display().to_string(),
        ),
        (
            "dataset.min_year_exclusive",
            "CARWISE_DATASET_MIN_YEAR_EXCLUSIVE",
            bounds.min_year_exclusive.to_string(),
        ),
        (
            "dataset.max_year_exclusive",
            "CARWISE_DATASET_MAX_YEAR_EXCLUSIVE",
            bounds.max_year_exclusive.to_string(),
        ),
        (
            "dataset.min_odometer_exclusive",
            "CARWISE_DATASET_MIN_ODOMETER_EXCLUSIVE",
            bounds.min_odometer_exclusive.to_string(),
        ),
        (
            "dataset.max_odometer_exclusive",
            "CARWISE_DATASET_MAX_ODOMETER_EXCLUSIVE",
            bounds.max_odometer_exclusive.to_string(),
        ),
        ("dataset.min_price", "CARWISE_DATASET_MIN_PRICE", bounds.min_price.to_string()),
        (
            "dataset.max_price",
            "CARWISE_DATASET_MAX_PRICE",
            bounds.max_price.map_or_else(|| "<unset>".to_string(), |price| price.to_string()),
        ),
        (
            "dataset.test_proportion",
            "CARWISE_DATASET_TEST_PROPORTION",
            config.dataset.test_proportion.to_string(),
        ),
        (
            "dataset.random_state",
            "CARWISE_DATASET_RANDOM_STATE",
            config.dataset.random_state.to_string(),
        ),
        (
            "model.min_points_to_fit",
            "CARWISE_MODEL_MIN_POINTS_TO_FIT",
            config.model.min_points_to_fit.to_string(),
        ),
        (
            "model.residual_multiplier",
            "CARWISE_MODEL_RESIDUAL_MULTIPLIER",
            config.model.residual_multiplier.to_string(),
        ),
        (
            "model.mileage_increment",
            "CARWISE_MODEL_MILEAGE_INCREMENT",
            config.model.mileage_increment.to_string(),
        ),
        ("model.max_odometer", "CARWISE_MODEL_MAX_ODOMETER", config.model.max_odometer.to_string()),
        ("model.min_year", "CARWISE_MODEL_MIN_YEAR", config.model.min_year.to_string()),
        ("model.max_year", "CARWISE_MODEL_MAX_YEAR", config.model.max_year.to_string()),
        ("model.save_plots", "CARWISE_MODEL_SAVE_PLOTS", config.model.save_plots.to_string()),
        ("cache.capacity", "CARWISE_CACHE_CAPACITY", config.cache.capacity.to_string()),
        ("logging.level", "CARWISE_LOGGING_LEVEL", config.logging.level.clone()),
        ("logging.format", "CARWISE_LOGGING_FORMAT", format!("{:?}", config.logging.format)),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key_path, env_key, value) in entries {
        lines.push(render_line(key_path, &value, source(key_path, env_key)));
    }
    lines.join("\n")
}

fn detect_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then(|| path.to_path_buf());
    }

    let root = PathBuf::from(DEFAULT_CONFIG_FILE);
    if root.exists() {
        return Some(root);
    }

    let nested = Path::new("config").join(DEFAULT_CONFIG_FILE);
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn display_path(path: &Option<PathBuf>) -> String {
    path.as_ref().map_or_else(|| "<unset>".to_string(), |path| path.display().to_string())
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
