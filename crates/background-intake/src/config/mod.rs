use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::intake::gateway::{DEFAULT_BUCKET, DEFAULT_SUBMISSIONS_TABLE};
use crate::intake::progress::DEFAULT_SAVE_DEBOUNCE;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the intake tooling.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub telemetry: TelemetryConfig,
    pub storage: StorageConfig,
    pub wizard: WizardConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let storage = StorageConfig {
            progress_dir: PathBuf::from(
                env::var("APP_PROGRESS_DIR").unwrap_or_else(|_| "./data/progress".to_string()),
            ),
            object_store_dir: PathBuf::from(
                env::var("APP_OBJECT_STORE_DIR").unwrap_or_else(|_| "./data/objects".to_string()),
            ),
            bucket: env::var("APP_STORAGE_BUCKET").unwrap_or_else(|_| DEFAULT_BUCKET.to_string()),
            database_url: env::var("APP_DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://./data/intake.db".to_string()),
            submissions_table: env::var("APP_SUBMISSIONS_TABLE")
                .unwrap_or_else(|_| DEFAULT_SUBMISSIONS_TABLE.to_string()),
        };

        let save_debounce = match env::var("APP_SAVE_DEBOUNCE_MS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| ConfigError::InvalidDebounce { value: raw })?,
            Err(_) => DEFAULT_SAVE_DEBOUNCE,
        };

        if storage.bucket.trim().is_empty() {
            return Err(ConfigError::EmptyBucket);
        }

        Ok(Self {
            environment,
            telemetry: TelemetryConfig { log_level },
            storage,
            wizard: WizardConfig { save_debounce },
        })
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Locations of the local collaborators backing the wizard.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub progress_dir: PathBuf,
    pub object_store_dir: PathBuf,
    pub bucket: String,
    pub database_url: String,
    pub submissions_table: String,
}

#[derive(Debug, Clone)]
pub struct WizardConfig {
    pub save_debounce: Duration,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidDebounce { value: String },
    EmptyBucket,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidDebounce { value } => write!(
                f,
                "APP_SAVE_DEBOUNCE_MS must be a whole number of milliseconds (found '{value}')"
            ),
            ConfigError::EmptyBucket => write!(f, "APP_STORAGE_BUCKET must not be empty"),
        }
    }
}

impl std::error::Error for ConfigError {}
