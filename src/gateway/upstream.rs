//! Turns failed upstream calls into [`GatewayError::Upstream`].

use serde_json::Value;

use super::GatewayError;
use crate::utils::http::read_body_bounded;

pub const SERVER_CONNECTION_ERROR: &str = "Server Connection Error";

const MAX_ERROR_BODY_BYTES: usize = 64 * 1024;

/// No response arrived at all.
pub fn connectivity_error(err: impl std::fmt::Display) -> GatewayError {
    GatewayError::Upstream {
        status: None,
        detail: format!("{SERVER_CONNECTION_ERROR}: {err}"),
    }
}

/// A response arrived with a non-2xx status.
pub async fn error_from_response(response: reqwest::Response) -> GatewayError {
    let status = response.status().as_u16();
    let detail = match read_body_bounded(response, MAX_ERROR_BODY_BYTES).await {
        Ok(bytes) => upstream_error_detail(&bytes),
        Err(err) => format!("External: {err}"),
    };
    GatewayError::Upstream {
        status: Some(status),
        detail,
    }
}

/// A 2xx response whose body could not be decoded.
///
/// Reported as 502 Bad Gateway rather than with the upstream status: relaying
/// the 2xx would tell the caller the request succeeded when no usable result
/// came back.
pub fn malformed_body_error(err: impl std::fmt::Display) -> GatewayError {
    GatewayError::Upstream {
        status: Some(502),
        detail: format!("External: {err}"),
    }
}

/// Detail string for an upstream error body, preferring `error.message`.
pub fn upstream_error_detail(body: &[u8]) -> String {
    let value = match serde_json::from_slice::<Value>(body) {
        Ok(value) => value,
        Err(err) => return format!("External: {err}"),
    };
    match value.get("error") {
        Some(Value::Object(error)) => match error.get("message") {
            Some(Value::String(message)) => format!("External: {message}"),
            Some(message) => format!("External: {message}"),
            None => format!("External: {}", Value::Object(error.clone())),
        },
        Some(Value::String(message)) => format!("External: {message}"),
        Some(other) => format!("External: {other}"),
        None => SERVER_CONNECTION_ERROR.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_prefers_error_message() {
        let body = br#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        assert_eq!(
            upstream_error_detail(body),
            "External: Incorrect API key provided"
        );
    }

    #[test]
    fn detail_falls_back_to_whole_error_value() {
        assert_eq!(
            upstream_error_detail(br#"{"error":"model overloaded"}"#),
            "External: model overloaded"
        );
        assert_eq!(
            upstream_error_detail(br#"{"error":{"code":42}}"#),
            r#"External: {"code":42}"#
        );
    }

    #[test]
    fn detail_without_error_field_is_generic() {
        assert_eq!(upstream_error_detail(br#"{"ok":false}"#), SERVER_CONNECTION_ERROR);
    }

    #[test]
    fn detail_for_non_json_body_carries_decode_error() {
        let detail = upstream_error_detail(b"<html>bad gateway</html>");
        assert!(detail.starts_with("External: "), "{detail}");
    }

    #[test]
    fn malformed_success_body_is_bad_gateway() {
        let decode = serde_json::from_slice::<Value>(b"{not json").unwrap_err();
        let err = malformed_body_error(&decode);
        assert_eq!(err.status_code(), 502);
        match err {
            GatewayError::Upstream { status, detail } => {
                assert_eq!(status, Some(502));
                assert_eq!(detail, format!("External: {decode}"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn connectivity_error_has_no_status() {
        let err = connectivity_error("connection refused");
        match err {
            GatewayError::Upstream { status, detail } => {
                assert_eq!(status, None);
                assert_eq!(detail, "Server Connection Error: connection refused");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
