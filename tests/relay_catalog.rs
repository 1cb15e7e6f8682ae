#![cfg(feature = "gateway")]

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use ditto_relay::gateway::http::{GatewayHttpState, router};
use ditto_relay::{Gateway, GatewayConfig, ModelFilterConfig, Role, StaticIdentities};
use httpmock::Method::GET;
use httpmock::MockServer;
use serde_json::{Value, json};
use tower::util::ServiceExt;

fn identities() -> StaticIdentities {
    StaticIdentities::default()
        .with_user("root", "admin-token", Role::Admin)
        .with_user("alice", "user-token", Role::User)
        .with_user("bob", "pending-token", Role::Pending)
}

fn app(config: GatewayConfig) -> axum::Router {
    let gateway = Gateway::new(config).expect("gateway");
    router(GatewayHttpState::new(gateway).with_identity_resolver(identities()))
}

async fn get_json(app: &axum::Router, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
    let mut request = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        request = request.header("authorization", format!("Bearer {token}"));
    }
    let response = app
        .clone()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn ids(listing: &Value) -> Vec<(String, u64)> {
    listing["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| {
            (
                entry["id"].as_str().unwrap().to_string(),
                entry["urlIdx"].as_u64().unwrap(),
            )
        })
        .collect()
}

#[tokio::test]
async fn merged_listing_tags_each_model_with_its_backend() {
    if ditto_relay::utils::test_support::should_skip_httpmock() {
        return;
    }
    let first = MockServer::start();
    let second = MockServer::start();
    let first_models = first.mock(|when, then| {
        when.method(GET)
            .path("/v1/models")
            .header("authorization", "Bearer ka");
        then.status(200)
            .json_body(json!({"object": "list", "data": [{"id": "alpha"}, {"id": "beta"}]}));
    });
    let second_models = second.mock(|when, then| {
        when.method(GET)
            .path("/v1/models")
            .header("authorization", "Bearer kb");
        then.status(200).json_body(json!([{"id": "llama-3", "owned_by": "local"}]));
    });

    let app = app(GatewayConfig {
        base_urls: vec![
            format!("{}/v1", first.base_url()),
            format!("{}/v1", second.base_url()),
        ],
        api_keys: vec!["ka".to_string(), "kb".to_string()],
        ..GatewayConfig::default()
    });

    let (status, listing) = get_json(&app, "/models", Some("user-token")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        ids(&listing),
        vec![
            ("alpha".to_string(), 0),
            ("beta".to_string(), 0),
            ("llama-3".to_string(), 1)
        ]
    );
    assert_eq!(listing["data"][2]["owned_by"], "local");
    first_models.assert();
    second_models.assert();
}

#[tokio::test]
async fn unreachable_backend_contributes_nothing() {
    if ditto_relay::utils::test_support::should_skip_httpmock() {
        return;
    }
    let upstream = MockServer::start();
    upstream.mock(|when, then| {
        when.method(GET).path("/v1/models");
        then.status(200).json_body(json!({"data": [{"id": "llama-3"}]}));
    });

    let app = app(GatewayConfig {
        base_urls: vec![
            "http://127.0.0.1:1/v1".to_string(),
            format!("{}/v1", upstream.base_url()),
        ],
        api_keys: vec!["ka".to_string(), "kb".to_string()],
        catalog_timeout_seconds: 2,
        ..GatewayConfig::default()
    });

    let (status, listing) = get_json(&app, "/models", Some("user-token")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&listing), vec![("llama-3".to_string(), 1)]);
}

#[tokio::test]
async fn raw_fetch_keeps_a_slot_for_each_backend() {
    if ditto_relay::utils::test_support::should_skip_httpmock() {
        return;
    }
    let upstream = MockServer::start();
    upstream.mock(|when, then| {
        when.method(GET).path("/v1/models");
        then.status(200)
            .json_body(json!({"data": [{"id": "llama-3"}, {"id": "phi-3"}]}));
    });
    upstream.mock(|when, then| {
        when.method(GET).path("/v1/assistants");
        then.status(200).json_body(json!({"data": [{"id": "asst_1"}]}));
    });

    let gateway = Gateway::new(GatewayConfig {
        base_urls: vec![
            "http://127.0.0.1:1/v1".to_string(),
            format!("{}/v1", upstream.base_url()),
        ],
        api_keys: vec!["ka".to_string(), "kb".to_string()],
        catalog_timeout_seconds: 2,
        ..GatewayConfig::default()
    })
    .expect("gateway");

    let models = gateway.fetch_all_models().await;
    assert_eq!(models.len(), 2);
    assert!(models[0].is_none());
    let ids: Vec<&str> = models[1]
        .as_ref()
        .unwrap()
        .iter()
        .map(|model| model["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["llama-3", "phi-3"]);

    let assistants = gateway.fetch_all_assistants().await;
    assert_eq!(assistants.len(), 2);
    assert!(assistants[0].is_none());
    assert_eq!(assistants[1].as_ref().unwrap()[0]["id"], json!("asst_1"));
}

#[tokio::test]
async fn backend_error_payload_counts_as_failed_backend() {
    if ditto_relay::utils::test_support::should_skip_httpmock() {
        return;
    }
    let broken = MockServer::start();
    let healthy = MockServer::start();
    broken.mock(|when, then| {
        when.method(GET).path("/v1/models");
        then.status(200)
            .json_body(json!({"error": {"message": "quota exceeded"}}));
    });
    healthy.mock(|when, then| {
        when.method(GET).path("/v1/models");
        then.status(200).json_body(json!({"data": [{"id": "mistral"}]}));
    });

    let app = app(GatewayConfig {
        base_urls: vec![
            format!("{}/v1", broken.base_url()),
            format!("{}/v1", healthy.base_url()),
        ],
        api_keys: vec!["ka".to_string(), "kb".to_string()],
        ..GatewayConfig::default()
    });

    let (_, listing) = get_json(&app, "/models", Some("admin-token")).await;
    assert_eq!(ids(&listing), vec![("mistral".to_string(), 1)]);
}

#[tokio::test]
async fn model_filter_hides_models_from_non_admins_only() {
    if ditto_relay::utils::test_support::should_skip_httpmock() {
        return;
    }
    let upstream = MockServer::start();
    upstream.mock(|when, then| {
        when.method(GET).path("/v1/models");
        then.status(200)
            .json_body(json!({"data": [{"id": "llama-3"}, {"id": "mixtral"}]}));
    });

    let app = app(GatewayConfig {
        base_urls: vec![format!("{}/v1", upstream.base_url())],
        api_keys: vec!["k".to_string()],
        model_filter: ModelFilterConfig {
            enabled: true,
            models: vec!["mixtral".to_string()],
        },
        ..GatewayConfig::default()
    });

    let (_, user_view) = get_json(&app, "/models", Some("user-token")).await;
    assert_eq!(ids(&user_view), vec![("mixtral".to_string(), 0)]);

    let (_, pending_view) = get_json(&app, "/models", Some("pending-token")).await;
    assert_eq!(ids(&pending_view), vec![("mixtral".to_string(), 0)]);

    let (_, admin_view) = get_json(&app, "/models", Some("admin-token")).await;
    assert_eq!(admin_view["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn indexed_listing_returns_single_backend_response() {
    if ditto_relay::utils::test_support::should_skip_httpmock() {
        return;
    }
    let first = MockServer::start();
    let second = MockServer::start();
    first.mock(|when, then| {
        when.method(GET).path("/v1/models");
        then.status(200).json_body(json!({"data": [{"id": "alpha"}]}));
    });
    let direct = second.mock(|when, then| {
        when.method(GET)
            .path("/v1/models")
            .header("authorization", "Bearer kb");
        then.status(200)
            .json_body(json!({"object": "list", "data": [{"id": "whisper-1"}]}));
    });

    let app = app(GatewayConfig {
        base_urls: vec![
            format!("{}/v1", first.base_url()),
            format!("{}/v1", second.base_url()),
        ],
        api_keys: vec!["ka".to_string(), "kb".to_string()],
        model_filter: ModelFilterConfig {
            enabled: true,
            models: vec!["alpha".to_string()],
        },
        ..GatewayConfig::default()
    });

    let (status, body) = get_json(&app, "/models/1", Some("user-token")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"object": "list", "data": [{"id": "whisper-1"}]})
    );
    direct.assert();

    let (status, body) = get_json(&app, "/models/7", Some("user-token")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["detail"].as_str().unwrap().contains('7'));
}

#[tokio::test]
async fn indexed_listing_surfaces_upstream_error_detail() {
    if ditto_relay::utils::test_support::should_skip_httpmock() {
        return;
    }
    let upstream = MockServer::start();
    upstream.mock(|when, then| {
        when.method(GET).path("/v1/assistants");
        then.status(403)
            .json_body(json!({"error": {"message": "no assistants access"}}));
    });

    let app = app(GatewayConfig {
        base_urls: vec![format!("{}/v1", upstream.base_url())],
        api_keys: vec!["k".to_string()],
        ..GatewayConfig::default()
    });

    let (status, body) = get_json(&app, "/assistants/0", Some("user-token")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({"detail": "External: no assistants access"}));
}

#[tokio::test]
async fn assistant_mode_sends_beta_header_on_catalog_fetches() {
    if ditto_relay::utils::test_support::should_skip_httpmock() {
        return;
    }
    let upstream = MockServer::start();
    let assistants = upstream.mock(|when, then| {
        when.method(GET)
            .path("/v1/assistants")
            .header("openai-beta", "assistants=v2")
            .header("authorization", "Bearer k");
        then.status(200)
            .json_body(json!({"data": [{"id": "asst_1", "name": "helper"}]}));
    });

    let app = app(GatewayConfig {
        base_urls: vec![format!("{}/v1", upstream.base_url())],
        api_keys: vec!["k".to_string()],
        assistant_id: Some("asst_1".to_string()),
        ..GatewayConfig::default()
    });

    let (status, listing) = get_json(&app, "/assistants", Some("pending-token")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        listing,
        json!({"data": [{"id": "asst_1", "name": "helper", "urlIdx": 0}]})
    );
    assistants.assert();
}

#[tokio::test]
async fn unconfigured_relay_skips_network_and_lists_nothing() {
    let app = app(GatewayConfig::default());
    let (status, listing) = get_json(&app, "/models", Some("user-token")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing, json!({"data": []}));
}

#[tokio::test]
async fn listings_require_a_known_caller() {
    let app = app(GatewayConfig::default());

    let (status, body) = get_json(&app, "/models", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["detail"].is_string());

    let (status, _) = get_json(&app, "/assistants", Some("stranger")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = get_json(&app, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}
