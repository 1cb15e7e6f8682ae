use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::identity::UserConfig;
use super::model_filter::ModelFilterConfig;
use super::registry::{OPENAI_BASE_URL, align_api_keys, normalize_base_urls};

#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_base_urls")]
    pub base_urls: Vec<String>,
    #[serde(default = "default_api_keys")]
    pub api_keys: Vec<String>,
    /// Non-empty switches the proxy into assistants mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_id: Option<String>,
    #[serde(default)]
    pub model_filter: ModelFilterConfig,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Base URL treated as the public backend for speech synthesis.
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_catalog_timeout_seconds")]
    pub catalog_timeout_seconds: u64,
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("base_urls", &self.base_urls)
            .field("api_keys", &"<redacted>")
            .field("assistant_id", &self.assistant_id)
            .field("model_filter", &self.model_filter)
            .field("cache_dir", &self.cache_dir)
            .field("openai_base_url", &self.openai_base_url)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("catalog_timeout_seconds", &self.catalog_timeout_seconds)
            .field("users", &self.users)
            .finish()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_urls: default_base_urls(),
            api_keys: default_api_keys(),
            assistant_id: None,
            model_filter: ModelFilterConfig::default(),
            cache_dir: default_cache_dir(),
            openai_base_url: default_openai_base_url(),
            request_timeout_seconds: default_request_timeout_seconds(),
            catalog_timeout_seconds: default_catalog_timeout_seconds(),
            users: Vec::new(),
        }
    }
}

fn default_base_urls() -> Vec<String> {
    vec![OPENAI_BASE_URL.to_string()]
}

fn default_api_keys() -> Vec<String> {
    vec![String::new()]
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data/cache")
}

fn default_openai_base_url() -> String {
    OPENAI_BASE_URL.to_string()
}

fn default_request_timeout_seconds() -> u64 {
    300
}

fn default_catalog_timeout_seconds() -> u64 {
    10
}

#[derive(Debug, Error)]
pub enum GatewayConfigError {
    #[error("read config failed: {0}")]
    Read(#[from] std::io::Error),
    #[error("parse json config failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("parse toml config failed: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
}

impl GatewayConfig {
    /// Loads a `.toml` file as TOML and anything else as JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GatewayConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let config: Self = if is_toml {
            toml::from_str(&raw)?
        } else {
            serde_json::from_str(&raw)?
        };
        Ok(config.normalized())
    }

    /// Overlays the process environment using `lookup`.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), GatewayConfigError> {
        if let Some(raw) = lookup("OPENAI_API_BASE_URLS") {
            // Blank entries stay in place; `normalized` maps them to the public backend.
            self.base_urls = raw.split(';').map(str::to_string).collect();
        }
        if let Some(raw) = lookup("OPENAI_API_KEYS") {
            self.api_keys = raw.split(';').map(|key| key.trim().to_string()).collect();
        }
        if let Some(raw) = lookup("OPENAI_ASSISTANT_ID") {
            let raw = raw.trim();
            self.assistant_id = (!raw.is_empty()).then(|| raw.to_string());
        }
        if let Some(raw) = lookup("CACHE_DIR") {
            self.cache_dir = PathBuf::from(raw.trim());
        }
        if let Some(raw) = lookup("ENABLE_MODEL_FILTER") {
            self.model_filter.enabled = parse_bool(&raw).ok_or(GatewayConfigError::InvalidEnv {
                name: "ENABLE_MODEL_FILTER",
                value: raw.clone(),
            })?;
        }
        if let Some(raw) = lookup("MODEL_FILTER_LIST") {
            self.model_filter.models = split_list(&raw);
        }
        *self = std::mem::take(self).normalized();
        Ok(())
    }

    /// Aligns `api_keys` with `base_urls` so every base URL has exactly one
    /// credential slot at its own position.
    pub fn normalized(mut self) -> Self {
        self.base_urls = normalize_base_urls(self.base_urls);
        self.api_keys = align_api_keys(self.api_keys, self.base_urls.len());
        self
    }

    pub fn assistant_mode(&self) -> bool {
        self.assistant_id
            .as_deref()
            .is_some_and(|id| !id.trim().is_empty())
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
