use crate::config::ConfigError;
use crate::intake::controller::WizardError;
use crate::intake::progress::ProgressStoreError;
use crate::intake::storage::StoreError;
use crate::telemetry::TelemetryError;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Progress(ProgressStoreError),
    Store(StoreError),
    Wizard(WizardError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Progress(err) => write!(f, "progress error: {}", err),
            AppError::Store(err) => write!(f, "submission store error: {}", err),
            AppError::Wizard(err) => write!(f, "wizard error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Progress(err) => Some(err),
            AppError::Store(err) => Some(err),
            AppError::Wizard(err) => Some(err),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<ProgressStoreError> for AppError {
    fn from(value: ProgressStoreError) -> Self {
        Self::Progress(value)
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<WizardError> for AppError {
    fn from(value: WizardError) -> Self {
        Self::Wizard(value)
    }
}
