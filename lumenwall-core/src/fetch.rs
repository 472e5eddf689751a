//! Streams an asset from the catalog origin into the vault's `.tmp` file,
//! under the bus lock, with a size check as the only integrity check (TLS
//! covers transport corruption; per-asset hashing is out of budget here).

use std::path::PathBuf;
use std::time::Duration;

use futures::StreamExt;
use lumenwall_model::{ContainerTag, StorageKey};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tracing::{trace, warn};
use uuid::Uuid;

use crate::bus::BusCoordinator;
use crate::error::{FrameError, Result};
use crate::vault::Vault;

/// Default chunk size read from the network and written to disk per
/// iteration of the fetch loop.
pub const CHUNK_SIZE: usize = 32 * 1024;

/// Yield between chunks so the renderer is never starved of CPU.
const CHUNK_YIELD: Duration = Duration::from_millis(10);

/// Minimum plausible body size; anything smaller is treated as corrupt.
const MIN_BODY_BYTES: u64 = 12;

/// Optional per-chunk progress callback: `(received, total)`. `total` is
/// `None` when the origin didn't advertise a Content-Length.
pub type ProgressFn<'a> = dyn FnMut(u64, Option<u64>) + Send + 'a;

#[derive(Clone, Debug)]
pub struct Fetcher {
    client: reqwest::Client,
    bus_ceiling: Duration,
}

impl Fetcher {
    pub fn new(bus_ceiling: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| FrameError::InvalidState(err.to_string()))?;
        Ok(Self { client, bus_ceiling })
    }

    /// Fetch `url` into the vault's path for `(key, container)`. Holds the
    /// bus for the entire transfer, per the spec's "acquisition spans an
    /// entire multi-megabyte fetch" rule.
    pub async fn fetch(
        &self,
        bus: &BusCoordinator,
        vault: &Vault,
        url: &str,
        key: &StorageKey,
        container: ContainerTag,
        mut progress: Option<&mut ProgressFn<'_>>,
    ) -> Result<PathBuf> {
        let _guard = bus.acquire(self.bus_ceiling, "fetch").await?;

        let final_path = vault.path_for(key, container);
        if let Some(parent) = final_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(FrameError::IoFailure)?;
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| FrameError::InvalidResponse(err.to_string()))?;

        match response.status() {
            status if status.as_u16() == 404 => {
                return Err(FrameError::NotFound(url.to_string()));
            }
            status if !status.is_success() => {
                return Err(FrameError::InvalidResponse(format!(
                    "unexpected status {status} from {url}"
                )));
            }
            _ => {}
        }

        let content_length = response.content_length();
        let tmp_path = final_path.with_extension(format!(
            "{}.tmp-{}",
            container.extension(),
            Uuid::new_v4().simple()
        ));

        let result = self
            .stream_to_tmp(response, &tmp_path, content_length, &mut progress)
            .await;

        let received = match result {
            Ok(received) => received,
            Err(err) => {
                let _ = tokio::fs::remove_file(&tmp_path).await;
                return Err(err);
            }
        };

        if received <= MIN_BODY_BYTES
            || content_length.is_some_and(|expected| expected != received)
        {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(FrameError::InvalidSize(format!(
                "received {received} bytes, expected {content_length:?}"
            )));
        }

        tokio::fs::rename(&tmp_path, &final_path)
            .await
            .map_err(FrameError::IoFailure)?;
        Ok(final_path)
    }

    async fn stream_to_tmp(
        &self,
        response: reqwest::Response,
        tmp_path: &std::path::Path,
        content_length: Option<u64>,
        progress: &mut Option<&mut ProgressFn<'_>>,
    ) -> Result<u64> {
        let mut file = tokio::fs::File::create(tmp_path)
            .await
            .map_err(FrameError::IoFailure)?;

        let byte_stream = response
            .bytes_stream()
            .map(|result| result.map_err(|err| std::io::Error::other(err.to_string())));
        let mut reader = StreamReader::new(byte_stream);
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut received = 0u64;

        loop {
            let n = reader
                .read(&mut buf)
                .await
                .map_err(FrameError::IoFailure)?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n]).await.map_err(FrameError::IoFailure)?;
            received += n as u64;
            trace!(received, content_length, "fetch chunk written");
            if let Some(cb) = progress.as_deref_mut() {
                cb(received, content_length);
            }
            tokio::time::sleep(CHUNK_YIELD).await;
        }

        file.flush().await.map_err(FrameError::IoFailure)?;
        file.sync_all().await.map_err(FrameError::IoFailure)?;
        if received == 0 {
            warn!("fetch produced an empty body");
        }
        Ok(received)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_size_matches_spec_default() {
        assert_eq!(CHUNK_SIZE, 32 * 1024);
    }
}
