use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};

use super::GatewayError;
use super::registry::Backend;
use super::upstream::connectivity_error;

pub const OPENAI_BETA_HEADER: &str = "openai-beta";
pub const ASSISTANTS_BETA_VALUE: &str = "assistants=v2";

pub fn build_http_client() -> Result<reqwest::Client, GatewayError> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .build()
        .map_err(GatewayError::HttpClient)
}

/// One outbound call target: a registry backend plus the headers every call to it carries.
#[derive(Clone)]
pub struct ProxyBackend {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    assistants_beta: bool,
    request_timeout: Option<Duration>,
}

impl ProxyBackend {
    pub fn new(client: reqwest::Client, backend: &Backend) -> Self {
        Self {
            base_url: backend.base_url.clone(),
            api_key: backend.api_key.clone(),
            client,
            assistants_beta: false,
            request_timeout: None,
        }
    }

    pub fn with_assistants_beta(mut self, enabled: bool) -> Self {
        self.assistants_beta = enabled;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout.filter(|timeout| !timeout.is_zero());
        self
    }

    pub fn url(&self, path: &str) -> String {
        join_base_url(&self.base_url, path)
    }

    pub fn headers(&self, json_body: bool) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let key = self.api_key.trim();
        if !key.is_empty() {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {key}")) {
                headers.insert(AUTHORIZATION, value);
            }
        }
        if json_body {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        if self.assistants_beta {
            headers.insert(
                OPENAI_BETA_HEADER,
                HeaderValue::from_static(ASSISTANTS_BETA_VALUE),
            );
        }
        headers
    }

    pub async fn get(&self, path: &str) -> Result<reqwest::Response, GatewayError> {
        self.request(reqwest::Method::GET, path, None).await
    }

    pub async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Bytes>,
    ) -> Result<reqwest::Response, GatewayError> {
        let url = self.url(path);
        let mut req = self
            .client
            .request(method, url)
            .headers(self.headers(body.is_some()));
        if let Some(timeout) = self.request_timeout {
            req = req.timeout(timeout);
        }
        if let Some(body) = body {
            req = req.body(body);
        }
        req.send().await.map_err(connectivity_error)
    }
}

/// Joins a backend base URL and a relative path, keeping any query string on `path`.
fn join_base_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        return base.to_string();
    }
    let mut out = String::with_capacity(base.len() + 1 + path.len());
    out.push_str(base);
    out.push('/');
    out.push_str(path);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(api_key: &str) -> ProxyBackend {
        let client = reqwest::Client::new();
        ProxyBackend::new(
            client,
            &Backend {
                id: 0,
                base_url: "http://localhost:8080/v1/".to_string(),
                api_key: api_key.to_string(),
            },
        )
    }

    #[test]
    fn join_base_url_normalizes_slashes() {
        assert_eq!(
            join_base_url("http://localhost:8080/v1", "chat/completions"),
            "http://localhost:8080/v1/chat/completions"
        );
        assert_eq!(
            join_base_url("http://localhost:8080/v1/", "/models"),
            "http://localhost:8080/v1/models"
        );
        assert_eq!(
            join_base_url("http://localhost:8080/v1", "threads/t1/runs?limit=2"),
            "http://localhost:8080/v1/threads/t1/runs?limit=2"
        );
        assert_eq!(join_base_url("http://localhost:8080/v1", ""), "http://localhost:8080/v1");
    }

    #[test]
    fn headers_carry_bearer_and_beta_flag() {
        let headers = backend("sk-test").with_assistants_beta(true).headers(true);
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer sk-test");
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(headers.get(OPENAI_BETA_HEADER).unwrap(), ASSISTANTS_BETA_VALUE);
    }

    #[test]
    fn empty_key_sends_no_authorization() {
        let headers = backend("").headers(false);
        assert!(headers.get(AUTHORIZATION).is_none());
        assert!(headers.get(CONTENT_TYPE).is_none());
        assert!(headers.get(OPENAI_BETA_HEADER).is_none());
    }

    #[test]
    fn url_uses_backend_base() {
        assert_eq!(backend("k").url("models"), "http://localhost:8080/v1/models");
    }
}
