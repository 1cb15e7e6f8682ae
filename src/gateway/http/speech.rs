async fn handle_speech(
    State(state): State<GatewayHttpState>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    authorize(&state, &headers, Capability::VerifiedUser).await?;
    let body = read_request_body(&state, body).await?;
    let path = state
        .gateway
        .synthesize_speech(body)
        .await
        .map_err(map_gateway_error)?;

    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|err| map_gateway_error(GatewayError::Cache(err)))?;
    let stream = tokio_util::io::ReaderStream::new(file);
    let mut response = Response::new(Body::from_stream(stream));
    response
        .headers_mut()
        .insert("content-type", HeaderValue::from_static("audio/mpeg"));
    Ok(response)
}
