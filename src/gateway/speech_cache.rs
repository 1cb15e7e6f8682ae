//! Content-addressed on-disk cache for synthesized speech.
//!
//! Artifacts live under `<cache_root>/audio/speech/` as `<sha256>.mp3` plus the
//! request that produced them as `<sha256>.json`. Nothing is ever evicted.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use super::GatewayError;
use crate::utils::http::hex_lower;

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Clone, Debug)]
pub struct SpeechCache {
    dir: PathBuf,
}

impl SpeechCache {
    pub fn new(cache_root: impl AsRef<Path>) -> Self {
        Self {
            dir: cache_root.as_ref().join("audio").join("speech"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cache key: sha256 of the exact request bytes.
    pub fn key(body: &[u8]) -> String {
        hex_lower(&Sha256::digest(body))
    }

    pub fn audio_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.mp3"))
    }

    pub fn request_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    pub async fn lookup(&self, key: &str) -> Option<PathBuf> {
        let path = self.audio_path(key);
        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => Some(path),
            _ => None,
        }
    }

    /// Streams `upstream` into the audio artifact and records `request` beside it.
    ///
    /// The audio is written to a temporary file first, so a failed download never
    /// leaves a truncated artifact under the final name.
    pub async fn store(
        &self,
        key: &str,
        upstream: reqwest::Response,
        request: &[u8],
    ) -> Result<PathBuf, GatewayError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(GatewayError::Cache)?;

        let final_path = self.audio_path(key);
        let tmp_path = self.dir.join(format!(
            "{key}.mp3.{}-{}.tmp",
            std::process::id(),
            TMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));

        if let Err(err) = write_stream(&tmp_path, upstream).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(err);
        }
        if let Err(err) = tokio::fs::rename(&tmp_path, &final_path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(GatewayError::Cache(err));
        }

        match serde_json::from_slice::<serde_json::Value>(request) {
            Ok(value) => {
                let payload = serde_json::to_vec(&value).unwrap_or_else(|_| request.to_vec());
                tokio::fs::write(self.request_path(key), payload)
                    .await
                    .map_err(GatewayError::Cache)?;
            }
            Err(err) => {
                tracing::warn!(key, error = %err, "speech request is not json; skipping request record");
            }
        }

        Ok(final_path)
    }
}

async fn write_stream(path: &Path, upstream: reqwest::Response) -> Result<(), GatewayError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(GatewayError::Cache)?;
    let mut stream = upstream.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(super::upstream::connectivity_error)?;
        file.write_all(&chunk).await.map_err(GatewayError::Cache)?;
    }
    file.flush().await.map_err(GatewayError::Cache)?;
    Ok(())
}
