//! HTTP firmware download with SHA-256 verification

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::filesys::dir::Dir;
use crate::firmware::{artifact_name, expected_digest, local_path, FetchError, FirmwareFetcher};
use crate::models::firmware::Firmware;
use crate::utils::hex;

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    async fn download(
        &self,
        ctx: &CancellationToken,
        url: &str,
        dest: &Path,
    ) -> Result<String, FetchError> {
        let mut response = tokio::select! {
            res = self.client.get(url).send() => res?,
            _ = ctx.cancelled() => return Err(FetchError::Cancelled),
        };

        if !response.status().is_success() {
            return Err(FetchError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let temp = dest.with_extension("part");
        let mut file = fs::File::create(&temp).await?;
        let mut hasher = Sha256::new();
        let mut written = 0u64;

        loop {
            let chunk = tokio::select! {
                chunk = response.chunk() => chunk?,
                _ = ctx.cancelled() => {
                    drop(file);
                    let _ = fs::remove_file(&temp).await;
                    return Err(FetchError::Cancelled);
                }
            };

            let Some(chunk) = chunk else { break };
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.sync_all().await?;
        drop(file);
        fs::rename(&temp, dest).await?;

        debug!(bytes = written, "Downloaded {}", url);
        Ok(hex::encode(hasher.finalize()))
    }
}

#[async_trait]
impl FirmwareFetcher for HttpFetcher {
    async fn fetch(
        &self,
        ctx: &CancellationToken,
        firmware: &Firmware,
        dest: &Dir,
    ) -> Result<PathBuf, FetchError> {
        let expected = expected_digest(firmware)?;

        if let Some(path) = local_path(&firmware.url) {
            let actual = file_digest(path).await?;
            verify(path, expected.as_deref(), &actual)?;
            debug!("Using local firmware file {}", path.display());
            return Ok(path.to_path_buf());
        }

        fs::create_dir_all(dest.path()).await?;
        let path = dest.path().join(artifact_name(firmware));

        // A previous attempt may have completed the download
        if let Some(expected) = expected.as_deref() {
            if fs::metadata(&path).await.is_ok() && file_digest(&path).await? == expected {
                info!("Reusing downloaded firmware {}", path.display());
                return Ok(path);
            }
        }

        info!(
            component = %firmware.component,
            version = %firmware.version,
            "Downloading firmware from {}", firmware.url
        );
        let actual = self.download(ctx, &firmware.url, &path).await?;

        if let Err(e) = verify(&path, expected.as_deref(), &actual) {
            let _ = fs::remove_file(&path).await;
            return Err(e);
        }

        Ok(path)
    }
}

fn verify(path: &Path, expected: Option<&str>, actual: &str) -> Result<(), FetchError> {
    match expected {
        Some(expected) if expected != actual => Err(FetchError::ChecksumMismatch {
            file: path.display().to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }),
        Some(_) => Ok(()),
        None => {
            warn!("No checksum published for {}, skipping verification", path.display());
            Ok(())
        }
    }
}

async fn file_digest(path: &Path) -> Result<String, FetchError> {
    let mut file = fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}
