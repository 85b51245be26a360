use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::emoji::ImageKey;

const CACHE_DIR: &str = "emoji_images";

/// Create the cache directory under `data_dir` and drop partial writes left by
/// a previous crash.
pub fn ensure_dir(data_dir: &Path) -> PathBuf {
    let dir = data_dir.join(CACHE_DIR);
    if let Err(e) = std::fs::create_dir_all(&dir) {
        tracing::warn!(%e, dir = %dir.display(), "failed to create emoji image cache dir");
    }
    if let Ok(entries) = std::fs::read_dir(&dir) {
        for entry in entries.flatten() {
            if entry.path().extension().and_then(|e| e.to_str()) == Some("tmp") {
                let _ = std::fs::remove_file(entry.path());
            }
        }
    }
    dir
}

/// One file per key, named by the SHA-256 of the key.
pub fn cached_path(dir: &Path, key: &ImageKey) -> PathBuf {
    let digest = Sha256::digest(key.to_string().as_bytes());
    dir.join(hex::encode(digest))
}

pub fn read(dir: &Path, key: &ImageKey) -> Option<Vec<u8>> {
    std::fs::read(cached_path(dir, key)).ok()
}

pub fn save(dir: &Path, key: &ImageKey, bytes: &[u8]) -> std::io::Result<PathBuf> {
    let dest = cached_path(dir, key);
    let tmp = dest.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, &dest)?;
    Ok(dest)
}

pub fn remove(dir: &Path, key: &ImageKey) {
    let _ = std::fs::remove_file(cached_path(dir, key));
}

pub fn clear(dir: &Path) {
    if dir.exists() {
        let _ = std::fs::remove_dir_all(dir);
    }
}
