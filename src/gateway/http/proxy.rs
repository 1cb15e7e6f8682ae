async fn handle_proxy(State(state): State<GatewayHttpState>, request: Request) -> Response {
    proxy_request(state, request).await
}

async fn proxy_request(state: GatewayHttpState, request: Request) -> Response {
    match proxy_request_inner(&state, request).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn proxy_request_inner(
    state: &GatewayHttpState,
    request: Request,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let (parts, body) = request.into_parts();
    if !matches!(
        parts.method,
        Method::GET | Method::POST | Method::PUT | Method::DELETE
    ) {
        return Err(error_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "Method Not Allowed",
        ));
    }
    authorize(state, &parts.headers, Capability::VerifiedUser).await?;

    let path_and_query = upstream_path(&parts.uri);
    let body = read_request_body(state, body).await?;
    let upstream = state
        .gateway
        .proxy(parts.method, &path_and_query, body)
        .await
        .map_err(map_gateway_error)?;
    proxy_response(state, upstream).await
}

/// Inbound path without its leading slash, query string preserved.
fn upstream_path(uri: &axum::http::Uri) -> String {
    let path = uri.path().trim_start_matches('/');
    match uri.query() {
        Some(query) if !query.is_empty() => format!("{path}?{query}"),
        _ => path.to_string(),
    }
}

async fn read_request_body(
    state: &GatewayHttpState,
    body: Body,
) -> Result<Bytes, (StatusCode, Json<ErrorResponse>)> {
    to_bytes(body, state.max_body_bytes).await.map_err(|err| {
        error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("request body too large: {err}"),
        )
    })
}

async fn proxy_response(
    state: &GatewayHttpState,
    upstream: reqwest::Response,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let status = upstream.status();
    let content_type = upstream
        .headers()
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.contains("text/event-stream") {
        let mut headers = upstream.headers().clone();
        headers.remove("content-length");
        headers.remove("transfer-encoding");
        headers.remove("connection");
        let stream = upstream
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other));
        let mut response = Response::new(Body::from_stream(stream));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        return Ok(response);
    }

    let bytes = read_body_bounded(upstream, state.max_body_bytes)
        .await
        .map_err(|err| map_gateway_error(super::upstream::malformed_body_error(err)))?;
    let value: Value = serde_json::from_slice(&bytes)
        .map_err(|err| map_gateway_error(super::upstream::malformed_body_error(err)))?;
    Ok((status, Json(value)).into_response())
}
