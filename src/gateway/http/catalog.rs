async fn handle_list_models(
    State(state): State<GatewayHttpState>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<ErrorResponse>)> {
    let caller = authorize(&state, &headers, Capability::CurrentUser).await?;
    let entries = state.gateway.list_models(caller.role).await;
    Ok(Json(listing(entries.iter())))
}

async fn handle_list_assistants(
    State(state): State<GatewayHttpState>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<ErrorResponse>)> {
    authorize(&state, &headers, Capability::CurrentUser).await?;
    let entries = state.gateway.list_assistants().await;
    Ok(Json(listing(entries.iter())))
}

async fn handle_list_backend_models(
    State(state): State<GatewayHttpState>,
    Path(url_idx): Path<String>,
    request: Request,
) -> Response {
    list_backend_catalog(state, url_idx, CatalogKind::Models, request).await
}

async fn handle_list_backend_assistants(
    State(state): State<GatewayHttpState>,
    Path(url_idx): Path<String>,
    request: Request,
) -> Response {
    list_backend_catalog(state, url_idx, CatalogKind::Assistants, request).await
}

/// `GET /models/{n}` lists backend `n`; any other segment is an upstream path.
async fn list_backend_catalog(
    state: GatewayHttpState,
    url_idx: String,
    kind: CatalogKind,
    request: Request,
) -> Response {
    let Ok(index) = url_idx.parse::<usize>() else {
        return proxy_request(state, request).await;
    };
    let headers = request.headers().clone();
    if let Err(err) = authorize(&state, &headers, Capability::CurrentUser).await {
        return err.into_response();
    }
    match state.gateway.fetch_backend_catalog(index, kind).await {
        Ok(value) => Json(value).into_response(),
        Err(err) => map_gateway_error(err).into_response(),
    }
}
