//! Ordered list of upstream backends.
//!
//! A backend's id is its position in the registry. Base URLs and API keys are
//! stored as two parallel lists so each can be replaced wholesale by an admin.

/// Substring that marks the well-known public backend.
pub const OPENAI_HOST_MARKER: &str = "api.openai.com";

/// Base URL of the well-known public backend.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Clone, PartialEq, Eq)]
pub struct Backend {
    pub id: usize,
    pub base_url: String,
    pub api_key: String,
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("id", &self.id)
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl Backend {
    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

pub fn is_openai_url(base_url: &str) -> bool {
    base_url.contains(OPENAI_HOST_MARKER)
}

/// Trims every entry and turns a blank one into the public backend URL.
///
/// Entries are never dropped: position `i` must keep pairing with key `i`.
pub fn normalize_base_urls(base_urls: Vec<String>) -> Vec<String> {
    base_urls
        .into_iter()
        .map(|url| {
            let url = url.trim();
            if url.is_empty() {
                OPENAI_BASE_URL.to_string()
            } else {
                url.to_string()
            }
        })
        .collect()
}

/// Pads with empty credentials, or drops trailing keys, so there is exactly
/// one key slot per base URL.
pub fn align_api_keys(mut api_keys: Vec<String>, len: usize) -> Vec<String> {
    api_keys.resize(len, String::new());
    api_keys
}

#[derive(Clone, Default, PartialEq, Eq)]
pub struct BackendRegistry {
    base_urls: Vec<String>,
    api_keys: Vec<String>,
    generation: u64,
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("base_urls", &self.base_urls)
            .field("api_keys", &format_args!("<{} redacted>", self.api_keys.len()))
            .field("generation", &self.generation)
            .finish()
    }
}

impl BackendRegistry {
    pub fn new(base_urls: Vec<String>, api_keys: Vec<String>) -> Self {
        let base_urls = normalize_base_urls(base_urls);
        let api_keys = align_api_keys(api_keys, base_urls.len());
        Self {
            base_urls,
            api_keys,
            generation: 0,
        }
    }

    pub fn base_urls(&self) -> &[String] {
        &self.base_urls
    }

    pub fn api_keys(&self) -> &[String] {
        &self.api_keys
    }

    /// Bumped on every replacement; catalogs remember the generation they were built from.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.base_urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.base_urls.is_empty()
    }

    /// Backend at `id`. A URL without a matching key slot gets an empty credential.
    pub fn get(&self, id: usize) -> Option<Backend> {
        let base_url = self.base_urls.get(id)?;
        Some(Backend {
            id,
            base_url: base_url.clone(),
            api_key: self.api_keys.get(id).cloned().unwrap_or_default(),
        })
    }

    pub fn backends(&self) -> Vec<Backend> {
        (0..self.base_urls.len())
            .filter_map(|id| self.get(id))
            .collect()
    }

    pub fn with_base_urls(&self, base_urls: Vec<String>) -> Self {
        let base_urls = normalize_base_urls(base_urls);
        Self {
            api_keys: align_api_keys(self.api_keys.clone(), base_urls.len()),
            base_urls,
            generation: self.generation.wrapping_add(1),
        }
    }

    pub fn with_api_keys(&self, api_keys: Vec<String>) -> Self {
        Self {
            base_urls: self.base_urls.clone(),
            api_keys: align_api_keys(api_keys, self.base_urls.len()),
            generation: self.generation.wrapping_add(1),
        }
    }

    /// The "nothing configured" state: a single, empty credential.
    pub fn has_only_empty_key(&self) -> bool {
        matches!(self.api_keys.as_slice(), [only] if only.is_empty())
    }

    /// Index of the backend whose base URL equals `base_url`, ignoring trailing slashes.
    pub fn position_of(&self, base_url: &str) -> Option<usize> {
        let wanted = base_url.trim_end_matches('/');
        self.base_urls
            .iter()
            .position(|candidate| candidate.trim_end_matches('/') == wanted)
    }
}
