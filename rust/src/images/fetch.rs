use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use futures::future::{BoxFuture, FutureExt};

use crate::emoji::ImageKey;

const ASSET_EXTENSIONS: &[&str] = &["png", "gif", "webp", "jpg", "jpeg"];

/// Produces the raw bytes behind an image key.
pub trait ImageFetcher: Send + Sync + 'static {
    fn fetch(&self, key: &ImageKey) -> BoxFuture<'static, anyhow::Result<Vec<u8>>>;
}

/// Remote images over HTTP, local assets from a directory.
#[derive(Debug, Clone)]
pub struct DefaultFetcher {
    client: reqwest::Client,
    asset_dir: Option<PathBuf>,
    timeout: Duration,
}

impl DefaultFetcher {
    pub fn new(client: reqwest::Client, asset_dir: Option<PathBuf>, timeout: Duration) -> Self {
        Self {
            client,
            asset_dir,
            timeout,
        }
    }
}

impl ImageFetcher for DefaultFetcher {
    fn fetch(&self, key: &ImageKey) -> BoxFuture<'static, anyhow::Result<Vec<u8>>> {
        match key {
            ImageKey::Remote(url) => {
                let client = self.client.clone();
                let url = url.clone();
                let timeout = self.timeout;
                async move {
                    let resp = client
                        .get(&url)
                        .timeout(timeout)
                        .send()
                        .await?
                        .error_for_status()?;
                    Ok::<_, anyhow::Error>(resp.bytes().await?.to_vec())
                }
                .boxed()
            }
            ImageKey::Asset(name) => {
                let asset_dir = self.asset_dir.clone();
                let name = name.clone();
                async move {
                    let Some(dir) = asset_dir else {
                        anyhow::bail!("no asset directory configured for asset {name}");
                    };
                    let path = find_asset(&dir, &name).await?;
                    tokio::fs::read(&path)
                        .await
                        .with_context(|| format!("failed to read asset {}", path.display()))
                }
                .boxed()
            }
        }
    }
}

async fn find_asset(dir: &Path, name: &str) -> anyhow::Result<PathBuf> {
    if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
        anyhow::bail!("invalid asset name {name:?}");
    }
    let exact = dir.join(name);
    if tokio::fs::metadata(&exact).await.is_ok_and(|m| m.is_file()) {
        return Ok(exact);
    }
    for ext in ASSET_EXTENSIONS {
        let candidate = dir.join(format!("{name}.{ext}"));
        if tokio::fs::metadata(&candidate).await.is_ok_and(|m| m.is_file()) {
            return Ok(candidate);
        }
    }
    anyhow::bail!("asset {name} not found in {}", dir.display())
}
