use crate::controller::FlagSource;
use crate::error::AppError;
use crate::models::PAYG_TIER_ID;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const SERVICE_NAME: &str = "billing-usage";
const TOKEN_ENTRY: &str = "platform:token";
const TOKEN_ENV: &str = "BILLING_USAGE_TOKEN";
const ENV_PREFIX: &str = "BILLING_USAGE";

pub fn normalize_project_ref(project_ref: &str) -> String {
    project_ref.trim().to_ascii_lowercase()
}

fn app_home_dir() -> Result<PathBuf, AppError> {
    if let Ok(custom) = std::env::var("BILLING_USAGE_HOME") {
        return Ok(PathBuf::from(custom));
    }

    if let Some(dirs) = ProjectDirs::from("com", "platform", SERVICE_NAME) {
        let candidate = dirs.data_local_dir().to_path_buf();
        if fs::create_dir_all(&candidate).is_ok() {
            return Ok(candidate);
        }
    }

    let cwd = std::env::current_dir()?;
    Ok(cwd.join(".billing-usage"))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_url: String,
    pub refresh_seconds: u64,
    pub payg_tier_id: String,
    pub default_project: Option<String>,
    pub flags: HashMap<String, bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.supabase.com".into(),
            refresh_seconds: 60,
            payg_tier_id: PAYG_TIER_ID.into(),
            default_project: None,
            flags: HashMap::new(),
        }
    }
}

impl FlagSource for AppConfig {
    fn is_enabled(&self, flag: &str) -> bool {
        self.flags
            .iter()
            .any(|(name, enabled)| *enabled && name.eq_ignore_ascii_case(flag))
    }
}

impl AppConfig {
    pub fn project_ref(&self, explicit: Option<&str>) -> Result<String, AppError> {
        explicit
            .or(self.default_project.as_deref())
            .map(normalize_project_ref)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| {
                AppError::Config(
                    "No project given. Pass --project or set default_project in config.".into(),
                )
            })
    }
}

pub fn config_dir() -> Result<PathBuf, AppError> {
    Ok(app_home_dir()?.join("config"))
}

pub fn data_dir() -> Result<PathBuf, AppError> {
    Ok(app_home_dir()?.join("data"))
}

pub fn config_path() -> Result<PathBuf, AppError> {
    Ok(config_dir()?.join("config.toml"))
}

pub fn db_path() -> Result<PathBuf, AppError> {
    Ok(data_dir()?.join("usage.sqlite"))
}

pub fn log_path() -> Result<PathBuf, AppError> {
    Ok(data_dir()?.join("billing-usage.log"))
}

pub fn ensure_dirs() -> Result<(), AppError> {
    fs::create_dir_all(config_dir()?)?;
    fs::create_dir_all(data_dir()?)?;
    Ok(())
}

fn validate_config(config: &mut AppConfig) -> Result<(), AppError> {
    url::Url::parse(config.api_url.trim())
        .map_err(|e| AppError::Config(format!("api_url '{}' is not valid: {e}", config.api_url)))?;
    config.api_url = config.api_url.trim().trim_end_matches('/').to_string();
    config.default_project = config
        .default_project
        .as_deref()
        .map(normalize_project_ref)
        .filter(|r| !r.is_empty());
    config.flags = std::mem::take(&mut config.flags)
        .into_iter()
        .map(|(name, enabled)| (name.trim().to_ascii_lowercase(), enabled))
        .collect();
    Ok(())
}

pub fn load_config() -> Result<AppConfig, AppError> {
    let path = config_path()?;
    load_config_from(&path)
}

fn load_config_from(path: &Path) -> Result<AppConfig, AppError> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path.to_path_buf()).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    let mut parsed: AppConfig = settings.try_deserialize()?;
    validate_config(&mut parsed)?;
    Ok(parsed)
}

pub fn save_config(config: &AppConfig) -> Result<(), AppError> {
    ensure_dirs()?;
    let path = config_path()?;
    let raw = toml::to_string_pretty(config)?;
    fs::write(path, raw)?;
    Ok(())
}

pub fn set_token(token: &str) -> Result<(), AppError> {
    let entry = keyring::Entry::new(SERVICE_NAME, TOKEN_ENTRY)?;
    entry.set_password(token.trim())?;
    Ok(())
}

pub fn delete_token() -> Result<(), AppError> {
    let entry = keyring::Entry::new(SERVICE_NAME, TOKEN_ENTRY)?;
    match entry.delete_credential() {
        Ok(()) => Ok(()),
        Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(AppError::Keyring(e)),
    }
}

pub fn get_token() -> Result<String, AppError> {
    if let Ok(value) = std::env::var(TOKEN_ENV) {
        if !value.trim().is_empty() {
            return Ok(value.trim().to_string());
        }
    }

    let entry = keyring::Entry::new(SERVICE_NAME, TOKEN_ENTRY)?;
    if let Ok(value) = entry.get_password() {
        if !value.is_empty() {
            return Ok(value);
        }
    }

    Err(AppError::Config(format!(
        "No access token found. Run `billing-usage set-token` or set {TOKEN_ENV}."
    )))
}

pub fn ensure_initialized() -> Result<(), AppError> {
    ensure_dirs()?;
    let cfg_path = config_path()?;
    if !Path::new(&cfg_path).exists() {
        save_config(&AppConfig::default())?;
    }
    Ok(())
}
