//! Firmware artifact fetching

pub mod http;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::filesys::dir::Dir;
use crate::models::firmware::Firmware;
use crate::utils::sha256_checksum;

pub use http::HttpFetcher;

/// Fetch errors
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("download failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("download returned status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("unsupported checksum: {0}")]
    UnsupportedChecksum(String),

    #[error("download cancelled")]
    Cancelled,
}

/// Makes a firmware artifact available on local disk
#[async_trait]
pub trait FirmwareFetcher: Send + Sync {
    /// Fetch `firmware` into `dest`, returning the local file path
    async fn fetch(
        &self,
        ctx: &CancellationToken,
        firmware: &Firmware,
        dest: &Dir,
    ) -> Result<PathBuf, FetchError>;
}

/// Local file name of a firmware artifact
pub fn artifact_name(firmware: &Firmware) -> String {
    let name = if firmware.filename.is_empty() {
        firmware
            .url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("firmware.bin")
    } else {
        firmware.filename.as_str()
    };

    format!("{}-{}", firmware.id, name)
}

/// Expected SHA-256 digest of a firmware, `None` when no checksum is published
pub fn expected_digest(firmware: &Firmware) -> Result<Option<String>, FetchError> {
    if firmware.checksum.trim().is_empty() {
        return Ok(None);
    }

    sha256_checksum(&firmware.checksum)
        .map(Some)
        .ok_or_else(|| FetchError::UnsupportedChecksum(firmware.checksum.clone()))
}

/// Hands out artifact paths without touching the network or disk
#[derive(Debug, Default, Clone)]
pub struct NoopFetcher;

#[async_trait]
impl FirmwareFetcher for NoopFetcher {
    async fn fetch(
        &self,
        _ctx: &CancellationToken,
        firmware: &Firmware,
        dest: &Dir,
    ) -> Result<PathBuf, FetchError> {
        Ok(dest.path().join(artifact_name(firmware)))
    }
}

/// Local path of a pre-supplied artifact, for `file://` urls and bare paths
pub fn local_path(url: &str) -> Option<&Path> {
    if let Some(path) = url.strip_prefix("file://") {
        return Some(Path::new(path));
    }

    let path = Path::new(url);
    path.is_absolute().then_some(path)
}
