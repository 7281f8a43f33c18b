use directories::{BaseDirs, ProjectDirs};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const API_BASE_URL_ENV: &str = "CARDWISE_API_BASE_URL";
pub const PUBLIC_BASE_URL_ENV: &str = "CARDWISE_PUBLIC_BASE_URL";

#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Origin (and base path) of the authenticated API.
    pub api_base_url: Url,
    /// Separate origin for unauthenticated calls; defaults to `api_base_url`.
    pub public_base_url: Option<Url>,
    pub request_timeout: Duration,
    /// Where durable client storage lives; defaults to the platform data dir.
    pub data_dir: Option<PathBuf>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("client configuration invalid: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Invalid(detail) => {
                format!("Cardwise is misconfigured: {detail}. Update cardwise.yaml.")
            }
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            public_base_url: None,
            request_timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            data_dir: None,
        }
    }
}

impl ClientSettings {
    pub const DEFAULT_API_BASE_URL: &'static str = "http://localhost:8000/api";
    pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

    /// Reads `cardwise.yaml` (when present), then applies `.env` and process
    /// environment overrides. A missing file yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let app = match locate_config_file() {
            Some(path) => {
                let contents = fs::read_to_string(&path).map_err(|err| {
                    ConfigError::Invalid(format!("failed to read {}: {err}", path.display()))
                })?;
                parse_app_section(&contents)?
            }
            None => AppSection::default(),
        };
        resolve_app_settings(app, |key| std::env::var(key).ok())
    }

    pub fn with_base_url(base_url: Url) -> Self {
        Self {
            api_base_url: base_url,
            ..Self::default()
        }
    }

    pub fn public_base_url(&self) -> Url {
        self.public_base_url
            .clone()
            .unwrap_or_else(|| self.api_base_url.clone())
    }

    pub fn storage_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        ProjectDirs::from("", "", "cardwise")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".cardwise"))
    }
}

fn default_api_base_url() -> Url {
    Url::parse(ClientSettings::DEFAULT_API_BASE_URL)
        .unwrap_or_else(|_| unreachable!("default base url is valid"))
}

fn parse_app_section(contents: &str) -> Result<AppSection, ConfigError> {
    if contents.trim().is_empty() {
        return Ok(AppSection::default());
    }
    let config: CardwiseConfig = serde_yaml::from_str(contents)
        .map_err(|err| ConfigError::Invalid(format!("invalid cardwise.yaml: {err}")))?;
    Ok(config.app.unwrap_or_default())
}

fn resolve_app_settings<F>(app: AppSection, env: F) -> Result<ClientSettings, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let api_base = env(API_BASE_URL_ENV).or(app.api_base_url);
    let public_base = env(PUBLIC_BASE_URL_ENV).or(app.public_base_url);

    let api_base_url = match api_base {
        Some(raw) => parse_http_url("api_base_url", &raw)?,
        None => default_api_base_url(),
    };
    let public_base_url = public_base
        .map(|raw| parse_http_url("public_base_url", &raw))
        .transpose()?;

    let timeout_secs = app
        .request_timeout_secs
        .unwrap_or(ClientSettings::DEFAULT_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(ConfigError::Invalid(
            "request_timeout_secs must be greater than zero".to_string(),
        ));
    }

    Ok(ClientSettings {
        api_base_url,
        public_base_url,
        request_timeout: Duration::from_secs(timeout_secs),
        data_dir: app.data_dir,
    })
}

fn parse_http_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim())
        .map_err(|err| ConfigError::Invalid(format!("{field} `{raw}` is not a URL: {err}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::Invalid(format!(
            "{field} must use http or https, got `{other}`"
        ))),
    }
}

fn locate_config_file() -> Option<PathBuf> {
    cardwise_yaml_candidates()
        .into_iter()
        .find(|path| path.exists())
}

fn cardwise_yaml_candidates() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("cardwise.yaml")];
    if let Some(base) = BaseDirs::new() {
        let config_dir = base.config_dir().join("cardwise");
        paths.push(config_dir.join("cardwise.yaml"));
        paths.push(config_dir.join("cardwise.yml"));
        let home_dir = base.home_dir();
        paths.push(home_dir.join(".cardwise").join("cardwise.yaml"));
        paths.push(home_dir.join(".cardwise").join("cardwise.yml"));
    }
    paths
}

#[derive(Debug, Deserialize)]
struct CardwiseConfig {
    app: Option<AppSection>,
}

#[derive(Debug, Default, Deserialize)]
struct AppSection {
    #[serde(default)]
    api_base_url: Option<String>,
    #[serde(default)]
    public_base_url: Option<String>,
    #[serde(default)]
    request_timeout_secs: Option<u64>,
    #[serde(default)]
    data_dir: Option<PathBuf>,
}
