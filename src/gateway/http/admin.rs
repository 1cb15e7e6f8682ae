#[derive(Debug, Serialize)]
struct BaseUrlsResponse {
    #[serde(rename = "OPENAI_API_BASE_URLS")]
    base_urls: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ApiKeysResponse {
    #[serde(rename = "OPENAI_API_KEYS")]
    api_keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct UrlsUpdateForm {
    urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct KeysUpdateForm {
    keys: Vec<String>,
}

async fn handle_get_urls(
    State(state): State<GatewayHttpState>,
    headers: HeaderMap,
) -> Result<Json<BaseUrlsResponse>, (StatusCode, Json<ErrorResponse>)> {
    authorize(&state, &headers, Capability::Admin).await?;
    let registry = state.gateway.registry().await;
    Ok(Json(BaseUrlsResponse {
        base_urls: registry.base_urls().to_vec(),
    }))
}

async fn handle_update_urls(
    State(state): State<GatewayHttpState>,
    headers: HeaderMap,
    Json(form): Json<UrlsUpdateForm>,
) -> Result<Json<BaseUrlsResponse>, (StatusCode, Json<ErrorResponse>)> {
    let caller = authorize(&state, &headers, Capability::Admin).await?;
    // Dropping a blank entry would shift every later backend onto its neighbour's key.
    if let Some(position) = form.urls.iter().position(|url| url.trim().is_empty()) {
        return Err(map_gateway_error(GatewayError::InvalidRequest {
            reason: format!("base url at position {position} is empty"),
        }));
    }
    tracing::info!(caller = %caller.id, backends = form.urls.len(), "updating backend urls");
    let registry = state.gateway.replace_base_urls(form.urls).await;
    Ok(Json(BaseUrlsResponse {
        base_urls: registry.base_urls().to_vec(),
    }))
}

async fn handle_get_keys(
    State(state): State<GatewayHttpState>,
    headers: HeaderMap,
) -> Result<Json<ApiKeysResponse>, (StatusCode, Json<ErrorResponse>)> {
    authorize(&state, &headers, Capability::Admin).await?;
    let registry = state.gateway.registry().await;
    Ok(Json(ApiKeysResponse {
        api_keys: registry.api_keys().to_vec(),
    }))
}

async fn handle_update_keys(
    State(state): State<GatewayHttpState>,
    headers: HeaderMap,
    Json(form): Json<KeysUpdateForm>,
) -> Result<Json<ApiKeysResponse>, (StatusCode, Json<ErrorResponse>)> {
    let caller = authorize(&state, &headers, Capability::Admin).await?;
    let api_keys: Vec<String> = form.keys.into_iter().map(|key| key.trim().to_string()).collect();
    tracing::info!(caller = %caller.id, keys = api_keys.len(), "updating backend keys");
    let registry = state.gateway.replace_api_keys(api_keys).await;
    Ok(Json(ApiKeysResponse {
        api_keys: registry.api_keys().to_vec(),
    }))
}
