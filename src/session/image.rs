use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use image::ImageFormat;
use tracing::{debug, warn};

use crate::session::SessionError;

/// Destination for re-encoded paintings.
#[async_trait]
pub trait ImageSink: Send + Sync {
    /// Stores a fully encoded PNG and returns where it landed.
    async fn write_image(&self, png: &[u8]) -> std::io::Result<PathBuf>;
}

/// Writes every painting to one canonical file, replacing its previous
/// contents. The bytes go to a sibling temp file first and are renamed into
/// place, so a failed write never leaves a truncated image behind.
#[derive(Debug, Clone)]
pub struct FsImageSink {
    path: PathBuf,
}

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

impl FsImageSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> std::io::Result<PathBuf> {
        let name = self.path.file_name().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("image path {} has no file name", self.path.display()),
            )
        })?;
        let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
        Ok(self.path.with_file_name(format!(
            ".{}.{}.{}.tmp",
            name.to_string_lossy(),
            std::process::id(),
            seq
        )))
    }
}

#[async_trait]
impl ImageSink for FsImageSink {
    async fn write_image(&self, png: &[u8]) -> std::io::Result<PathBuf> {
        let tmp = self.temp_path()?;
        tokio::fs::write(&tmp, png).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            warn!("Failed to move {} into place: {}", tmp.display(), e);
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
        debug!("Wrote {} bytes to {}", png.len(), self.path.display());
        Ok(self.path.clone())
    }
}

/// Decodes a base64 PNG payload and re-encodes it as a canonical PNG in memory.
pub fn reencode_png(b64: &str) -> Result<Vec<u8>, SessionError> {
    let raw = BASE64_STANDARD.decode(b64.trim())?;
    let decoded = image::load_from_memory_with_format(&raw, ImageFormat::Png)?;

    let mut out = Cursor::new(Vec::new());
    decoded.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}
