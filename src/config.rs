use std::path::PathBuf;
use std::time::Duration;

use crate::api::{ApiClientConfig, Device, DEFAULT_API_BASE_URL, DEFAULT_REQUEST_TIMEOUT};
use crate::channel::transport::DEFAULT_CONNECT_TIMEOUT;
use crate::channel::{
    ReconnectPolicy, TransportConfig, DEFAULT_MAX_RECONNECT_ATTEMPTS,
    DEFAULT_RECONNECT_BASE_DELAY,
};

pub const ENV_API_URL: &str = "KRONOS_API_URL";
pub const ENV_WS_URL: &str = "KRONOS_WS_URL";
pub const ENV_API_TOKEN: &str = "KRONOS_API_TOKEN";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "KRONOS_REQUEST_TIMEOUT_MS";
pub const ENV_CONNECT_TIMEOUT_MS: &str = "KRONOS_CONNECT_TIMEOUT_MS";
pub const ENV_RECONNECT_MAX_ATTEMPTS: &str = "KRONOS_RECONNECT_MAX_ATTEMPTS";
pub const ENV_RECONNECT_BASE_DELAY_MS: &str = "KRONOS_RECONNECT_BASE_DELAY_MS";
pub const ENV_DEVICE: &str = "KRONOS_DEVICE";
pub const ENV_DATA_DIR: &str = "KRONOS_DATA_DIR";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Everything the dashboard client needs to talk to the service.
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub api_base_url: String,
    pub ws_url: String,
    pub api_token: Option<String>,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    pub default_device: Device,
    pub data_dir: PathBuf,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            ws_url: ws_url_from_api(DEFAULT_API_BASE_URL),
            api_token: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
            default_device: Device::Cpu,
            data_dir: default_data_dir(&|key: &str| std::env::var(key).ok()),
        }
    }
}

impl DashboardConfig {
    /// Load `.env` (if present) and read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(error) = dotenvy::dotenv() {
            if !error.not_found() {
                tracing::warn!("failed to read .env file: {error}");
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Blank values count as
    /// unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let api_base_url = get(ENV_API_URL)
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let ws_url = get(ENV_WS_URL).unwrap_or_else(|| ws_url_from_api(&api_base_url));

        let request_timeout = match get(ENV_REQUEST_TIMEOUT_MS) {
            Some(raw) => Duration::from_millis(parse_positive(ENV_REQUEST_TIMEOUT_MS, &raw)?),
            None => DEFAULT_REQUEST_TIMEOUT,
        };
        let connect_timeout = match get(ENV_CONNECT_TIMEOUT_MS) {
            Some(raw) => Duration::from_millis(parse_positive(ENV_CONNECT_TIMEOUT_MS, &raw)?),
            None => DEFAULT_CONNECT_TIMEOUT,
        };
        let max_attempts = match get(ENV_RECONNECT_MAX_ATTEMPTS) {
            Some(raw) => raw.parse::<u32>().map_err(|e| ConfigError::Invalid {
                key: ENV_RECONNECT_MAX_ATTEMPTS,
                reason: e.to_string(),
            })?,
            None => DEFAULT_MAX_RECONNECT_ATTEMPTS,
        };
        let base_delay = match get(ENV_RECONNECT_BASE_DELAY_MS) {
            Some(raw) => Duration::from_millis(parse_positive(ENV_RECONNECT_BASE_DELAY_MS, &raw)?),
            None => DEFAULT_RECONNECT_BASE_DELAY,
        };

        let default_device = get(ENV_DEVICE)
            .map(|raw| raw.parse().unwrap_or_default())
            .unwrap_or_default();

        Ok(Self {
            api_base_url,
            ws_url,
            api_token: get(ENV_API_TOKEN),
            request_timeout,
            connect_timeout,
            reconnect: ReconnectPolicy::new(base_delay, max_attempts),
            default_device,
            data_dir: default_data_dir(&get),
        })
    }

    pub fn api_client_config(&self) -> ApiClientConfig {
        ApiClientConfig {
            base_url: self.api_base_url.clone(),
            token: self.api_token.clone(),
            timeout: self.request_timeout,
        }
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig::with_connect_timeout(self.connect_timeout)
    }

    pub fn preferences_path(&self) -> PathBuf {
        self.data_dir.join("preferences.json")
    }
}

fn parse_positive(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    match raw.parse::<u64>() {
        Ok(0) => Err(ConfigError::Invalid {
            key,
            reason: "must be greater than 0".to_string(),
        }),
        Ok(value) => Ok(value),
        Err(e) => Err(ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
    }
}

/// Derive the push endpoint from the REST base: `http(s)` becomes `ws(s)`
/// and a trailing `/api` becomes `/ws`.
pub fn ws_url_from_api(api_base_url: &str) -> String {
    let trimmed = api_base_url.trim_end_matches('/');
    let swapped = if let Some(rest) = trimmed.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        trimmed.to_string()
    };
    match swapped.strip_suffix("/api") {
        Some(root) => format!("{root}/ws"),
        None => format!("{swapped}/ws"),
    }
}

fn default_data_dir(get: &dyn Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(path) = get(ENV_DATA_DIR) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    if let Some(home) = get("HOME").or_else(|| get("USERPROFILE")) {
        return PathBuf::from(home).join(".kronos-dashboard");
    }
    PathBuf::from(".kronos-dashboard")
}
