//! Multi-backend routing core.

pub mod catalog;
pub mod config;
pub mod identity;
pub mod model_filter;
pub mod proxy_backend;
pub mod registry;
pub mod rewrite;
pub mod speech_cache;
pub mod upstream;

#[cfg(feature = "gateway")]
pub mod http;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::utils::http::read_body_bounded;
use proxy_backend::{ProxyBackend, build_http_client};
use rewrite::{RewrittenBody, rewrite_assistants_body, rewrite_chat_body};
use upstream::{error_from_response, malformed_body_error};

pub use catalog::{Catalog, CatalogEntry, CatalogKind};
pub use config::{GatewayConfig, GatewayConfigError};
pub use identity::{Caller, Capability, IdentityResolver, Role, StaticIdentities, UserConfig};
pub use model_filter::ModelFilterConfig;
pub use registry::{Backend, BackendRegistry};
pub use speech_cache::SpeechCache;

const MAX_BACKEND_CATALOG_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("model not found: {model}")]
    ModelNotFound { model: String },
    #[error("backend not found: {index}")]
    BackendNotFound { index: usize },
    #[error("API key not found")]
    ApiKeyNotFound,
    #[error("OpenAI API was not found")]
    OpenAiNotFound,
    #[error("not authenticated")]
    Unauthorized,
    #[error("access prohibited")]
    Forbidden,
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },
    #[error("{detail}")]
    Upstream { status: Option<u16>, detail: String },
    #[error("backend http client error: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("speech cache error: {0}")]
    Cache(#[source] std::io::Error),
}

impl GatewayError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ModelNotFound { .. } | Self::BackendNotFound { .. } => 404,
            Self::ApiKeyNotFound | Self::OpenAiNotFound | Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::InvalidRequest { .. } => 400,
            Self::Upstream { status, .. } => status.unwrap_or(500),
            Self::HttpClient(_) | Self::Cache(_) => 500,
        }
    }
}

/// Registry and catalogs observed together.
#[derive(Clone, Debug, Default)]
pub struct Generation {
    pub registry: Arc<BackendRegistry>,
    pub models: Arc<Catalog>,
    pub assistants: Arc<Catalog>,
}

#[derive(Clone, Debug)]
struct GatewaySettings {
    assistant_mode: bool,
    model_filter: ModelFilterConfig,
    openai_base_url: String,
    request_timeout: Duration,
    catalog_timeout: Duration,
}

pub struct Gateway {
    settings: GatewaySettings,
    client: reqwest::Client,
    speech_cache: SpeechCache,
    state: RwLock<Generation>,
    update_lock: Mutex<()>,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let config = config.normalized();
        let settings = GatewaySettings {
            assistant_mode: config.assistant_mode(),
            model_filter: config.model_filter.clone(),
            openai_base_url: config.openai_base_url.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_seconds),
            catalog_timeout: Duration::from_secs(config.catalog_timeout_seconds.max(1)),
        };
        let registry = BackendRegistry::new(config.base_urls, config.api_keys);
        Ok(Self {
            settings,
            client: build_http_client()?,
            speech_cache: SpeechCache::new(&config.cache_dir),
            state: RwLock::new(Generation {
                registry: Arc::new(registry),
                ..Generation::default()
            }),
            update_lock: Mutex::new(()),
        })
    }

    pub fn assistant_mode(&self) -> bool {
        self.settings.assistant_mode
    }

    pub async fn snapshot(&self) -> Generation {
        self.state.read().await.clone()
    }

    pub async fn registry(&self) -> Arc<BackendRegistry> {
        self.state.read().await.registry.clone()
    }

    pub async fn models(&self) -> Arc<Catalog> {
        self.state.read().await.models.clone()
    }

    pub async fn assistants(&self) -> Arc<Catalog> {
        self.state.read().await.assistants.clone()
    }

    /// Startup population of the model catalog.
    pub async fn init(&self) -> Arc<Catalog> {
        let catalog = self.refresh_models().await;
        tracing::info!(models = catalog.len(), "model catalog initialized");
        catalog
    }

    /// Refreshes the model catalog only while it is still empty.
    pub async fn ensure_models(&self) -> Arc<Catalog> {
        let current = self.models().await;
        if !current.is_empty() {
            return current;
        }
        self.refresh_models().await
    }

    pub async fn refresh_models(&self) -> Arc<Catalog> {
        self.refresh(CatalogKind::Models).await
    }

    pub async fn refresh_assistants(&self) -> Arc<Catalog> {
        self.refresh(CatalogKind::Assistants).await
    }

    /// Raw per-backend model lists, `None` where a backend failed.
    pub async fn fetch_all_models(&self) -> Vec<Option<Vec<Value>>> {
        let registry = self.registry().await;
        self.fetch_responses(&registry, CatalogKind::Models).await
    }

    /// Raw per-backend assistant lists, `None` where a backend failed.
    pub async fn fetch_all_assistants(&self) -> Vec<Option<Vec<Value>>> {
        let registry = self.registry().await;
        self.fetch_responses(&registry, CatalogKind::Assistants)
            .await
    }

    async fn fetch_responses(
        &self,
        registry: &BackendRegistry,
        kind: CatalogKind,
    ) -> Vec<Option<Vec<Value>>> {
        catalog::fetch_catalog_responses(
            &self.client,
            registry,
            kind,
            self.settings.assistant_mode,
            self.settings.catalog_timeout,
        )
        .await
    }

    async fn build_catalog(&self, registry: &BackendRegistry, kind: CatalogKind) -> Catalog {
        let responses = self.fetch_responses(registry, kind).await;
        catalog::merge_catalogs(kind, registry, responses)
    }

    /// Rebuilds one catalog from scratch and installs it, unless the registry
    /// was replaced while the fetch was in flight.
    async fn refresh(&self, kind: CatalogKind) -> Arc<Catalog> {
        let registry = self.registry().await;
        let catalog = Arc::new(self.build_catalog(&registry, kind).await);

        let mut generation = self.state.write().await;
        if generation.registry.generation() == catalog.generation() {
            match kind {
                CatalogKind::Models => generation.models = catalog.clone(),
                CatalogKind::Assistants => generation.assistants = catalog.clone(),
            }
            tracing::info!(%kind, entries = catalog.len(), "catalog refreshed");
        } else {
            tracing::debug!(%kind, "registry changed during refresh; not installing catalog");
        }
        catalog
    }

    /// Swaps the base URL list, then rebuilds the model catalog against the new
    /// URLs and current keys before either becomes visible.
    pub async fn replace_base_urls(&self, base_urls: Vec<String>) -> Arc<BackendRegistry> {
        let _update = self.update_lock.lock().await;
        let next = Arc::new(self.registry().await.with_base_urls(base_urls));
        let models = Arc::new(self.build_catalog(&next, CatalogKind::Models).await);

        let mut generation = self.state.write().await;
        generation.registry = next.clone();
        generation.models = models;
        generation.assistants = Arc::new(Catalog::default());
        tracing::info!(backends = next.len(), "backend urls replaced");
        next
    }

    /// Swaps the API key list. Catalog ownership is unaffected, so nothing is refetched.
    pub async fn replace_api_keys(&self, api_keys: Vec<String>) -> Arc<BackendRegistry> {
        let _update = self.update_lock.lock().await;
        let mut generation = self.state.write().await;
        let next = Arc::new(generation.registry.with_api_keys(api_keys));
        // Ownership is unchanged by a key swap; carry both catalogs into the new generation.
        generation.models = retag(&generation.models, next.generation());
        generation.assistants = retag(&generation.assistants, next.generation());
        generation.registry = next.clone();
        tracing::info!(keys = next.api_keys().len(), "backend keys replaced");
        next
    }

    /// Freshly merged model listing, filtered for the caller's role.
    pub async fn list_models(&self, role: Role) -> Vec<CatalogEntry> {
        let catalog = self.refresh_models().await;
        self.settings
            .model_filter
            .apply(role, catalog.entries())
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn list_assistants(&self) -> Vec<CatalogEntry> {
        self.refresh_assistants().await.entries().to_vec()
    }

    /// Catalog of a single backend, bypassing the merged catalog.
    pub async fn fetch_backend_catalog(
        &self,
        index: usize,
        kind: CatalogKind,
    ) -> Result<Value, GatewayError> {
        let backend = self
            .registry()
            .await
            .get(index)
            .ok_or(GatewayError::BackendNotFound { index })?;
        let response = self
            .proxy_backend(&backend)
            .with_request_timeout(Some(self.settings.catalog_timeout))
            .get(kind.path())
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        let bytes = read_body_bounded(response, MAX_BACKEND_CATALOG_BYTES)
            .await
            .map_err(malformed_body_error)?;
        let value: Value = serde_json::from_slice(&bytes).map_err(malformed_body_error)?;
        Ok(catalog::filter_backend_listing(kind, &backend.base_url, value))
    }

    /// Resolves the owning backend for `body` and applies the body fixups.
    pub async fn plan_proxy(&self, body: Bytes) -> Result<ProxyPlan, GatewayError> {
        if !self.settings.assistant_mode {
            self.ensure_models().await;
        }
        let Generation {
            registry, models, ..
        } = self.snapshot().await;

        let (backend_id, rewritten) = if self.settings.assistant_mode {
            (0, rewrite_assistants_body(body))
        } else {
            let rewritten = rewrite_chat_body(body);
            let backend_id = match &rewritten {
                RewrittenBody::Json { model, .. } => {
                    let model = model.clone().unwrap_or_default();
                    models
                        .backend_for(&model)
                        .ok_or(GatewayError::ModelNotFound { model })?
                }
                RewrittenBody::Raw(_) => 0,
            };
            (backend_id, rewritten)
        };

        let backend = registry
            .get(backend_id)
            .ok_or(GatewayError::BackendNotFound { index: backend_id })?;
        if !backend.has_api_key() {
            return Err(GatewayError::ApiKeyNotFound);
        }
        Ok(ProxyPlan {
            backend,
            body: rewritten.into_body(),
        })
    }

    /// Forwards a planned request; non-2xx answers become errors.
    pub async fn forward(
        &self,
        plan: ProxyPlan,
        method: reqwest::Method,
        path_and_query: &str,
    ) -> Result<reqwest::Response, GatewayError> {
        tracing::debug!(
            backend_id = plan.backend.id,
            %method,
            path = path_and_query,
            "proxying request"
        );
        let body = (!plan.body.is_empty()).then_some(plan.body);
        let response = self
            .proxy_backend(&plan.backend)
            .with_request_timeout(Some(self.settings.request_timeout))
            .request(method, path_and_query, body)
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(response)
    }

    pub async fn proxy(
        &self,
        method: reqwest::Method,
        path_and_query: &str,
        body: Bytes,
    ) -> Result<reqwest::Response, GatewayError> {
        let plan = self.plan_proxy(body).await?;
        self.forward(plan, method, path_and_query).await
    }

    /// Returns the cached audio for `body`, synthesizing it on a miss.
    pub async fn synthesize_speech(&self, body: Bytes) -> Result<PathBuf, GatewayError> {
        let registry = self.registry().await;
        let index = registry
            .position_of(&self.settings.openai_base_url)
            .ok_or(GatewayError::OpenAiNotFound)?;
        let backend = registry
            .get(index)
            .ok_or(GatewayError::OpenAiNotFound)?;

        let key = SpeechCache::key(&body);
        if let Some(path) = self.speech_cache.lookup(&key).await {
            tracing::debug!(key, "speech cache hit");
            return Ok(path);
        }

        let response = self
            .proxy_backend(&backend)
            .with_request_timeout(Some(self.settings.request_timeout))
            .request(reqwest::Method::POST, "audio/speech", Some(body.clone()))
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        let path = self.speech_cache.store(&key, response, &body).await?;
        tracing::info!(key, "speech cached");
        Ok(path)
    }

    fn proxy_backend(&self, backend: &Backend) -> ProxyBackend {
        ProxyBackend::new(self.client.clone(), backend)
            .with_assistants_beta(self.settings.assistant_mode)
    }
}

fn retag(catalog: &Catalog, generation: u64) -> Arc<Catalog> {
    Arc::new(Catalog::from_entries(catalog.entries().to_vec(), generation))
}

/// Resolved target and rewritten body of one proxied request.
#[derive(Clone, Debug)]
pub struct ProxyPlan {
    pub backend: Backend,
    pub body: Bytes,
}
