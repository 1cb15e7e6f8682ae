//! Model and assistant catalogs merged across every registered backend.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{Map, Value};

use super::proxy_backend::ProxyBackend;
use super::registry::{BackendRegistry, is_openai_url};
use crate::utils::http::read_body_bounded;

const PER_BACKEND_MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Key under which every merged entry records its owning backend id.
pub const BACKEND_ID_FIELD: &str = "urlIdx";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CatalogKind {
    Models,
    Assistants,
}

impl CatalogKind {
    pub fn path(self) -> &'static str {
        match self {
            Self::Models => "models",
            Self::Assistants => "assistants",
        }
    }
}

impl std::fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CatalogEntry {
    pub id: String,
    pub backend_id: usize,
    pub attributes: Map<String, Value>,
}

impl CatalogEntry {
    pub fn to_json(&self) -> Value {
        let mut object = self.attributes.clone();
        object.insert(BACKEND_ID_FIELD.to_string(), Value::from(self.backend_id));
        Value::Object(object)
    }
}

/// Entries in merge order plus an id index where the last occurrence wins.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    by_id: HashMap<String, usize>,
    generation: u64,
}

impl Catalog {
    pub fn from_entries(entries: Vec<CatalogEntry>, generation: u64) -> Self {
        let mut by_id = HashMap::with_capacity(entries.len());
        for (position, entry) in entries.iter().enumerate() {
            by_id.insert(entry.id.clone(), position);
        }
        Self {
            entries,
            by_id,
            generation,
        }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&CatalogEntry> {
        self.by_id.get(id).map(|position| &self.entries[*position])
    }

    pub fn backend_for(&self, id: &str) -> Option<usize> {
        self.get(id).map(|entry| entry.backend_id)
    }

    /// Registry generation the catalog was fetched against.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of distinct ids.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn to_listing(&self) -> Value {
        listing(self.entries.iter())
    }
}

pub fn listing<'a>(entries: impl IntoIterator<Item = &'a CatalogEntry>) -> Value {
    let data: Vec<Value> = entries.into_iter().map(CatalogEntry::to_json).collect();
    serde_json::json!({ "data": data })
}

/// Extracts the entry list from one backend's catalog response.
///
/// Accepts `{"data": [...]}` or a bare array. A body carrying an `error` field,
/// or any other shape, counts as a failed backend.
pub fn normalize_catalog_response(value: Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(mut object) => {
            if object.contains_key("error") {
                return None;
            }
            match object.remove("data") {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Models from the public backend are kept only when their id mentions `gpt`.
pub fn keep_model(base_url: &str, id: &str) -> bool {
    !is_openai_url(base_url) || id.contains("gpt")
}

/// Applies the public-backend model rule to one backend's raw listing.
///
/// Only `data` arrays are touched; any other shape is returned as received.
pub fn filter_backend_listing(kind: CatalogKind, base_url: &str, mut value: Value) -> Value {
    if kind != CatalogKind::Models {
        return value;
    }
    if let Some(Value::Array(models)) = value.get_mut("data") {
        models.retain(|model| {
            model
                .get("id")
                .and_then(Value::as_str)
                .is_some_and(|id| keep_model(base_url, id))
        });
    }
    value
}

/// Merges per-backend lists, index `i` of `responses` belonging to backend `i`.
pub fn merge_catalogs(
    kind: CatalogKind,
    registry: &BackendRegistry,
    responses: Vec<Option<Vec<Value>>>,
) -> Catalog {
    let mut entries = Vec::new();
    for (backend_id, response) in responses.into_iter().enumerate() {
        let Some(items) = response else {
            continue;
        };
        let base_url = registry
            .base_urls()
            .get(backend_id)
            .map(String::as_str)
            .unwrap_or_default();
        for item in items {
            let Value::Object(attributes) = item else {
                continue;
            };
            let Some(id) = attributes.get("id").and_then(Value::as_str) else {
                tracing::warn!(backend_id, %kind, "skipping catalog entry without id");
                continue;
            };
            if kind == CatalogKind::Models && !keep_model(base_url, id) {
                continue;
            }
            entries.push(CatalogEntry {
                id: id.to_string(),
                backend_id,
                attributes,
            });
        }
    }
    Catalog::from_entries(entries, registry.generation())
}

/// Queries every backend concurrently and waits for all of them.
///
/// A backend that fails, times out, or answers with something other than a
/// catalog contributes `None` at its position.
pub async fn fetch_catalog_responses(
    client: &reqwest::Client,
    registry: &BackendRegistry,
    kind: CatalogKind,
    assistants_beta: bool,
    timeout: Duration,
) -> Vec<Option<Vec<Value>>> {
    if registry.has_only_empty_key() {
        tracing::debug!(%kind, "no credentials configured; skipping catalog fetch");
        return Vec::new();
    }

    let requests = registry.backends().into_iter().map(|backend| {
        let proxy = ProxyBackend::new(client.clone(), &backend)
            .with_assistants_beta(assistants_beta)
            .with_request_timeout(Some(timeout));
        async move {
            let response = match proxy.get(kind.path()).await {
                Ok(response) => response,
                Err(err) => {
                    tracing::warn!(backend_id = backend.id, %kind, error = %err, "catalog fetch failed");
                    return None;
                }
            };
            if !response.status().is_success() {
                tracing::warn!(
                    backend_id = backend.id,
                    %kind,
                    status = response.status().as_u16(),
                    "catalog fetch rejected"
                );
                return None;
            }
            let bytes = match read_body_bounded(response, PER_BACKEND_MAX_BODY_BYTES).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    tracing::warn!(backend_id = backend.id, %kind, error = %err, "catalog body unreadable");
                    return None;
                }
            };
            match serde_json::from_slice::<Value>(&bytes) {
                Ok(value) => normalize_catalog_response(value),
                Err(err) => {
                    tracing::warn!(backend_id = backend.id, %kind, error = %err, "catalog body is not json");
                    None
                }
            }
        }
    });

    futures_util::future::join_all(requests).await
}
