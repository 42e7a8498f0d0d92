use std::io::Write;
use std::path::{Path, PathBuf};

use candle_core::{Device, Tensor};
use image::DynamicImage;

use crate::config::DatasetConfig;
use crate::error::OcrError;
use crate::pipeline::traits::{ImagePreprocessor, WeightFetcher};
use crate::preprocess::{resize_line, to_chw_tensor};

const DRIVE_URL_TEMPLATE: &str = "https://drive.google.com/uc?id=";
const CACHE_SUBDIR: &str = "textline-ocr";

pub struct ResizePreprocessor;

impl ImagePreprocessor for ResizePreprocessor {
    fn process(
        &self,
        image: &DynamicImage,
        dataset: &DatasetConfig,
        device: &Device,
    ) -> Result<Tensor, OcrError> {
        let resized = resize_line(image, dataset)?;
        to_chw_tensor(&resized, device)
    }
}

/// Downloads weights over HTTP into a local cache, reusing earlier downloads.
pub struct CachedHttpFetcher {
    cache_dir: PathBuf,
}

impl CachedHttpFetcher {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub(crate) fn cache_path(&self, url: &str) -> PathBuf {
        self.cache_dir.join(cache_file_name(url))
    }
}

impl Default for CachedHttpFetcher {
    fn default() -> Self {
        let base = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
        Self::new(base.join(CACHE_SUBDIR))
    }
}

impl WeightFetcher for CachedHttpFetcher {
    fn resolve(&self, identifier: &str) -> Result<PathBuf, OcrError> {
        let url = download_url(identifier);
        let target = self.cache_path(&url);
        if target.is_file() {
            tracing::debug!(%url, path = %target.display(), "using cached weights");
            return Ok(target);
        }

        std::fs::create_dir_all(&self.cache_dir)
            .map_err(|e| OcrError::io("create weight cache directory", e))?;
        tracing::info!(%url, path = %target.display(), "downloading weights");

        let bytes = reqwest::blocking::get(url.as_str())
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.bytes())
            .map_err(|e| OcrError::fetch(url.as_str(), e))?;

        persist_download(&bytes, &target)?;
        Ok(target)
    }
}

/// Writes to `<target>.part` and renames it into place, so an interrupted
/// download is never reused. The side file is removed when either step fails.
fn persist_download(bytes: &[u8], target: &Path) -> Result<(), OcrError> {
    let mut partial = target.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);
    write_then_rename(bytes, &partial, target).inspect_err(|_| {
        let _ = std::fs::remove_file(&partial);
    })
}

fn write_then_rename(bytes: &[u8], partial: &Path, target: &Path) -> Result<(), OcrError> {
    let mut file =
        std::fs::File::create(partial).map_err(|e| OcrError::io("create weight file", e))?;
    file.write_all(bytes)
        .map_err(|e| OcrError::io("write weight file", e))?;
    drop(file);
    std::fs::rename(partial, target).map_err(|e| OcrError::io("finalise weight file", e))
}

/// `http…` identifiers are used as-is; anything else is treated as a
/// shared-drive file id.
pub(crate) fn download_url(identifier: &str) -> String {
    if identifier.starts_with("http") {
        identifier.to_string()
    } else {
        format!("{DRIVE_URL_TEMPLATE}{identifier}")
    }
}

/// Readable, filesystem-safe name suffixed with a hash of the full URL, so
/// URLs that sanitize to the same text still get distinct files.
fn cache_file_name(url: &str) -> String {
    let readable: String = url
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
        .collect();
    format!("{readable}-{:08x}", fnv1a(url.as_bytes()) as u32)
}

/// 64-bit FNV-1a; stable across builds and platforms.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}
