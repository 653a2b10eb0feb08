use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Window(#[from] WindowError),

    #[error(transparent)]
    Fetch(#[from] FetchFailure),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Sql(#[from] rusqlite::Error),

    #[error(transparent)]
    Keyring(#[from] keyring::Error),

    #[error(transparent)]
    Settings(#[from] config::ConfigError),

    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    #[error("invalid range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("no preset available to derive a default window")]
    NoDefaultPreset,

    #[error("subscription is not loaded yet")]
    SubscriptionNotLoaded,

    #[error("unknown preset '{0}'")]
    UnknownPreset(String),

    #[error("preset '{0}' needs explicit --start and --end dates")]
    CustomNeedsDates(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct FetchFailure {
    pub message: String,
}

impl FetchFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn display_message(&self) -> String {
        let trimmed = self.message.trim();
        if trimmed.is_empty() {
            "unknown".to_string()
        } else {
            trimmed.to_string()
        }
    }
}

impl From<&AppError> for FetchFailure {
    fn from(err: &AppError) -> Self {
        match err {
            AppError::Fetch(f) => f.clone(),
            other => FetchFailure::new(other.to_string()),
        }
    }
}
