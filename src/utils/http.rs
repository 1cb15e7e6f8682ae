use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;

/// Reads a whole upstream body, failing once it grows past `max_bytes`.
pub async fn read_body_bounded(
    response: reqwest::Response,
    max_bytes: usize,
) -> Result<Bytes, std::io::Error> {
    let max_bytes = max_bytes.max(1);
    let content_length = response.content_length();
    if content_length.is_some_and(|len| len > max_bytes as u64) {
        return Err(std::io::Error::other(format!(
            "content-length={content_length:?} exceeds max bytes ({max_bytes})"
        )));
    }

    let mut stream = response.bytes_stream();
    let mut buffered = BytesMut::new();
    while let Some(next) = stream.next().await {
        let chunk = next.map_err(std::io::Error::other)?;
        if buffered.len().saturating_add(chunk.len()) > max_bytes {
            return Err(std::io::Error::other(format!(
                "response exceeded max bytes ({max_bytes})"
            )));
        }
        buffered.extend_from_slice(chunk.as_ref());
    }

    Ok(buffered.freeze())
}

/// Lowercase hex encoding of a digest.
pub fn hex_lower(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len().saturating_mul(2));
    for &byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}
