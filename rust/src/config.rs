use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::images::{disk, ImageCacheSettings};

pub const CONFIG_FILE: &str = "annotext_config.json";

const DEFAULT_MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 15;
const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 4;
const DEFAULT_MAX_IMAGE_DIMENSION: u32 = 400;
const DEFAULT_SUGGESTION_LIMIT: usize = 25;

/// Optional overrides read from `<data_dir>/annotext_config.json`. Every key
/// may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotatorConfig {
    pub emoji_scale: Option<f32>,
    pub max_image_bytes: Option<usize>,
    pub download_timeout_secs: Option<u64>,
    pub max_concurrent_downloads: Option<usize>,
    pub max_image_dimension: Option<u32>,
    pub asset_dir: Option<PathBuf>,
    pub disk_cache: Option<bool>,
    pub suggestion_limit: Option<usize>,
    pub mention_symbol: Option<String>,
    pub command_symbol: Option<String>,
}

impl AnnotatorConfig {
    pub fn emoji_scale(&self) -> f32 {
        self.emoji_scale
            .filter(|scale| scale.is_finite() && *scale > 0.0)
            .unwrap_or(1.0)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(
            self.download_timeout_secs
                .unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
        )
    }

    pub fn suggestion_limit(&self) -> usize {
        self.suggestion_limit.unwrap_or(DEFAULT_SUGGESTION_LIMIT)
    }

    pub fn mention_symbol(&self) -> &str {
        non_empty(self.mention_symbol.as_deref()).unwrap_or("@")
    }

    pub fn command_symbol(&self) -> &str {
        non_empty(self.command_symbol.as_deref()).unwrap_or("/")
    }

    pub fn image_cache_settings(&self, data_dir: &Path) -> ImageCacheSettings {
        ImageCacheSettings {
            max_image_bytes: self.max_image_bytes.unwrap_or(DEFAULT_MAX_IMAGE_BYTES),
            max_dimension: self
                .max_image_dimension
                .unwrap_or(DEFAULT_MAX_IMAGE_DIMENSION),
            max_concurrent_fetches: self
                .max_concurrent_downloads
                .unwrap_or(DEFAULT_MAX_CONCURRENT_DOWNLOADS)
                .max(1),
            disk_dir: self
                .disk_cache
                .unwrap_or(true)
                .then(|| disk::ensure_dir(data_dir)),
        }
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}

/// Missing or unreadable config means defaults.
pub fn load_config(data_dir: &Path) -> AnnotatorConfig {
    let path = data_dir.join(CONFIG_FILE);
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(_) => return AnnotatorConfig::default(),
    };
    match serde_json::from_str(&raw) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(%e, path = %path.display(), "ignoring malformed config");
            AnnotatorConfig::default()
        }
    }
}
