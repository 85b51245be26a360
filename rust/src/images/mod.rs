//! Emoji image loading shared by every view that shows a given image.
//!
//! Each key moves through `NotRequested -> Loading -> {Ready, Failed}`. One
//! fetch runs per key no matter how many views ask for it, and every
//! subscriber sees the same decoded image. Subscriptions are scoped to the
//! view showing them: when the last one for a loading key is dropped, the
//! fetch is aborted.

pub mod decode;
pub mod disk;
pub mod fetch;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::runtime::Handle;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;

use crate::emoji::ImageKey;

pub use decode::{AssetExtra, DecodedImage};
pub use fetch::{DefaultFetcher, ImageFetcher};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("image too large ({0} bytes)")]
    TooLarge(usize),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("fetch cancelled")]
    Cancelled,
    #[error("image cache is shut down")]
    ShutDown,
}

#[derive(Debug, Clone)]
pub enum FetchState {
    NotRequested,
    Loading,
    Ready(Arc<DecodedImage>),
    Failed(FetchError),
}

impl FetchState {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn image(&self) -> Option<&Arc<DecodedImage>> {
        match self {
            Self::Ready(image) => Some(image),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCacheSettings {
    pub max_image_bytes: usize,
    pub max_dimension: u32,
    pub max_concurrent_fetches: usize,
    /// Raw bytes are kept here across launches when set.
    pub disk_dir: Option<PathBuf>,
}

impl Default for ImageCacheSettings {
    fn default() -> Self {
        Self {
            max_image_bytes: 5 * 1024 * 1024,
            max_dimension: 400,
            max_concurrent_fetches: 4,
            disk_dir: None,
        }
    }
}

// Entries for the same key are told apart by generation, so subscriptions and
// tasks left over from an evicted entry never touch its replacement.
struct Entry {
    generation: u64,
    tx: watch::Sender<FetchState>,
    observers: usize,
    task: Option<JoinHandle<()>>,
}

struct Inner {
    fetcher: Arc<dyn ImageFetcher>,
    runtime: Handle,
    semaphore: Arc<Semaphore>,
    settings: ImageCacheSettings,
    entries: Mutex<HashMap<ImageKey, Entry>>,
    next_generation: AtomicU64,
    shut_down: AtomicBool,
}

impl Inner {
    fn entries(&self) -> MutexGuard<'_, HashMap<ImageKey, Entry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        }
    }

    fn release(&self, key: &ImageKey, generation: u64) {
        let mut entries = self.entries();
        let Some(entry) = entries
            .get_mut(key)
            .filter(|entry| entry.generation == generation)
        else {
            return;
        };
        entry.observers = entry.observers.saturating_sub(1);
        if entry.observers > 0 {
            return;
        }
        let state = entry.tx.borrow().clone();
        match state {
            FetchState::Ready(_) => {}
            FetchState::Loading => {
                if let Some(task) = entry.task.take() {
                    task.abort();
                }
                tracing::debug!(%key, "emoji image fetch cancelled, no views left");
                entries.remove(key);
            }
            FetchState::NotRequested | FetchState::Failed(_) => {
                entries.remove(key);
            }
        }
    }

    fn publish(
        &self,
        key: &ImageKey,
        generation: u64,
        result: Result<Arc<DecodedImage>, FetchError>,
    ) {
        let mut entries = self.entries();
        let Some(entry) = entries
            .get_mut(key)
            .filter(|entry| entry.generation == generation)
        else {
            tracing::debug!(%key, "dropping result for an evicted emoji image");
            return;
        };
        entry.task = None;
        let state = match result {
            Ok(image) => FetchState::Ready(image),
            Err(e) => {
                tracing::debug!(%key, %e, "emoji image fetch failed");
                FetchState::Failed(e)
            }
        };
        entry.tx.send_replace(state);
    }
}

/// Process-wide emoji image cache. Create one at startup, call
/// [`ImageCache::shutdown`] on logout. Clones share the same cache.
#[derive(Clone)]
pub struct ImageCache {
    inner: Arc<Inner>,
}

impl ImageCache {
    pub fn new(settings: ImageCacheSettings, fetcher: Arc<dyn ImageFetcher>, runtime: Handle) -> Self {
        let settings = ImageCacheSettings {
            disk_dir: settings.disk_dir.as_deref().map(|dir| {
                if let Err(e) = std::fs::create_dir_all(dir) {
                    tracing::warn!(%e, dir = %dir.display(), "emoji image disk cache unavailable");
                }
                dir.to_path_buf()
            }),
            ..settings
        };
        Self {
            inner: Arc::new(Inner {
                fetcher,
                runtime,
                semaphore: Arc::new(Semaphore::new(settings.max_concurrent_fetches.max(1))),
                settings,
                entries: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Start loading `key` unless it is already loading or loaded, and
    /// observe it. Failed keys are retried.
    pub fn request(&self, key: ImageKey) -> ImageSubscription {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            return ImageSubscription::detached(key, FetchState::Failed(FetchError::ShutDown));
        }

        let mut entries = self.inner.entries();
        let entry = entries.entry(key.clone()).or_insert_with(|| Entry {
            generation: self.inner.next_generation.fetch_add(1, Ordering::Relaxed),
            tx: watch::channel(FetchState::NotRequested).0,
            observers: 0,
            task: None,
        });
        entry.observers += 1;

        let needs_fetch = matches!(
            *entry.tx.borrow(),
            FetchState::NotRequested | FetchState::Failed(_)
        );
        if needs_fetch {
            entry.tx.send_replace(FetchState::Loading);
            entry.task = Some(self.spawn_fetch(key.clone(), entry.generation));
        }

        ImageSubscription {
            rx: entry.tx.subscribe(),
            generation: entry.generation,
            key,
            owner: Arc::downgrade(&self.inner),
        }
    }

    fn spawn_fetch(&self, key: ImageKey, generation: u64) -> JoinHandle<()> {
        let owner = Arc::downgrade(&self.inner);
        let fetcher = self.inner.fetcher.clone();
        let semaphore = self.inner.semaphore.clone();
        let settings = self.inner.settings.clone();
        self.inner.runtime.spawn(async move {
            let result = load(&key, fetcher, semaphore, settings).await;
            if let Some(inner) = owner.upgrade() {
                inner.publish(&key, generation, result);
            }
        })
    }

    /// Current state without subscribing.
    pub fn state(&self, key: &ImageKey) -> FetchState {
        self.inner
            .entries()
            .get(key)
            .map(|entry| entry.tx.borrow().clone())
            .unwrap_or(FetchState::NotRequested)
    }

    /// Number of keys currently loading.
    pub fn in_flight(&self) -> usize {
        self.inner
            .entries()
            .values()
            .filter(|entry| entry.tx.borrow().is_loading())
            .count()
    }

    /// Drop a settled key from memory (and disk). Loading keys are left alone.
    /// Views still holding the old image keep it; a new request fetches again.
    pub fn evict(&self, key: &ImageKey) -> bool {
        let mut entries = self.inner.entries();
        let loading = entries
            .get(key)
            .is_some_and(|entry| entry.tx.borrow().is_loading());
        if loading {
            return false;
        }
        if let Some(dir) = self.inner.settings.disk_dir.as_deref() {
            disk::remove(dir, key);
        }
        entries.remove(key).is_some()
    }

    /// Drop every settled image nobody is watching.
    pub fn clear_memory(&self) {
        self.inner
            .entries()
            .retain(|_, entry| entry.observers > 0 || entry.tx.borrow().is_loading());
    }

    pub fn clear_disk(&self) {
        if let Some(dir) = self.inner.settings.disk_dir.as_deref() {
            disk::clear(dir);
            if let Err(e) = std::fs::create_dir_all(dir) {
                tracing::warn!(%e, dir = %dir.display(), "emoji image disk cache unavailable");
            }
        }
    }

    /// Abort in-flight fetches and forget everything. Later requests fail with
    /// [`FetchError::ShutDown`].
    pub fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::SeqCst);
        let drained: Vec<(ImageKey, Entry)> = self.inner.entries().drain().collect();
        for (key, mut entry) in drained {
            if let Some(task) = entry.task.take() {
                task.abort();
                entry.tx.send_replace(FetchState::Failed(FetchError::Cancelled));
                tracing::debug!(%key, "emoji image fetch aborted by shutdown");
            }
        }
        tracing::info!("emoji image cache shut down");
    }
}

async fn load(
    key: &ImageKey,
    fetcher: Arc<dyn ImageFetcher>,
    semaphore: Arc<Semaphore>,
    settings: ImageCacheSettings,
) -> Result<Arc<DecodedImage>, FetchError> {
    let cached = settings
        .disk_dir
        .as_deref()
        .and_then(|dir| disk::read(dir, key));
    let from_disk = cached.is_some();
    let bytes = match cached {
        Some(bytes) => bytes,
        None => {
            let _permit = semaphore.acquire().await.map_err(|_| FetchError::ShutDown)?;
            let bytes = fetcher
                .fetch(key)
                .await
                .map_err(|e| FetchError::Fetch(format!("{e:#}")))?;
            if bytes.len() > settings.max_image_bytes {
                return Err(FetchError::TooLarge(bytes.len()));
            }
            bytes
        }
    };

    let key = key.clone();
    let max_dimension = settings.max_dimension;
    let disk_dir = settings.disk_dir.filter(|_| !from_disk);
    let decoded = tokio::task::spawn_blocking(move || {
        let decoded = decode::decode(&bytes, max_dimension)?;
        if let Some(dir) = disk_dir {
            if let Err(e) = disk::save(&dir, &key, &bytes) {
                tracing::warn!(%key, %e, "failed to write emoji image to disk cache");
            }
        }
        Ok::<_, FetchError>(decoded)
    })
    .await
    .map_err(|e| FetchError::Decode(e.to_string()))??;

    Ok(Arc::new(decoded))
}

/// A view's handle on one image key. Dropping it releases the view's interest.
pub struct ImageSubscription {
    key: ImageKey,
    generation: u64,
    rx: watch::Receiver<FetchState>,
    owner: Weak<Inner>,
}

impl ImageSubscription {
    fn detached(key: ImageKey, state: FetchState) -> Self {
        let (_tx, rx) = watch::channel(state);
        Self {
            key,
            generation: 0,
            rx,
            owner: Weak::new(),
        }
    }

    pub fn key(&self) -> &ImageKey {
        &self.key
    }

    pub fn state(&self) -> FetchState {
        self.rx.borrow().clone()
    }

    /// Wait for the next state change and return the new state. `None` once
    /// no further change can arrive (evicted, cancelled or shut down).
    pub async fn changed(&mut self) -> Option<FetchState> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Wait until the key settles.
    pub async fn wait(&mut self) -> Result<Arc<DecodedImage>, FetchError> {
        loop {
            let current = self.rx.borrow_and_update().clone();
            match current {
                FetchState::Ready(image) => return Ok(image),
                FetchState::Failed(e) => return Err(e),
                FetchState::NotRequested | FetchState::Loading => {}
            }
            if self.rx.changed().await.is_err() {
                return match self.state() {
                    FetchState::Ready(image) => Ok(image),
                    FetchState::Failed(e) => Err(e),
                    FetchState::NotRequested | FetchState::Loading => Err(FetchError::Cancelled),
                };
            }
        }
    }
}

impl Drop for ImageSubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.owner.upgrade() {
            inner.release(&self.key, self.generation);
        }
    }
}

impl std::fmt::Debug for ImageSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageSubscription")
            .field("key", &self.key)
            .field("state", &*self.rx.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use futures::future::{BoxFuture, FutureExt};
    use tokio::sync::Notify;

    use super::*;
    use crate::images::decode::tests::png_bytes;

    /// Counts fetches and holds each one until released. Bodies are served in
    /// order; the last one repeats.
    struct GatedFetcher {
        calls: AtomicUsize,
        gate: Arc<Notify>,
        bodies: Mutex<Vec<Result<Vec<u8>, String>>>,
    }

    impl GatedFetcher {
        fn new(body: Result<Vec<u8>, String>) -> Arc<Self> {
            Self::sequence(vec![body])
        }

        fn sequence(bodies: Vec<Result<Vec<u8>, String>>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                gate: Arc::new(Notify::new()),
                bodies: Mutex::new(bodies),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ImageFetcher for GatedFetcher {
        fn fetch(&self, _key: &ImageKey) -> BoxFuture<'static, anyhow::Result<Vec<u8>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let gate = self.gate.clone();
            let body = {
                let mut bodies = self.bodies.lock().unwrap();
                if bodies.len() > 1 {
                    bodies.remove(0)
                } else {
                    bodies[0].clone()
                }
            };
            async move {
                gate.notified().await;
                body.map_err(|e| anyhow::anyhow!(e))
            }
            .boxed()
        }
    }

    fn cache(fetcher: Arc<GatedFetcher>, settings: ImageCacheSettings) -> ImageCache {
        ImageCache::new(settings, fetcher, Handle::current())
    }

    fn key() -> ImageKey {
        ImageKey::Remote("https://cdn.example.com/party.png".into())
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_fetch_and_one_image() {
        let fetcher = GatedFetcher::new(Ok(png_bytes(8, 8)));
        let cache = cache(fetcher.clone(), ImageCacheSettings::default());

        let mut first = cache.request(key());
        let mut second = cache.request(key());
        assert!(first.state().is_loading());
        assert_eq!(cache.in_flight(), 1);

        tokio::task::yield_now().await;
        fetcher.gate.notify_one();

        let a = first.wait().await.unwrap();
        let b = second.wait().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(a.preview.dimensions(), (8, 8));

        // Already loaded: a new view gets the image without another fetch.
        let third = cache.request(key());
        assert!(third.state().image().is_some());
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn failure_is_reported_to_every_subscriber() {
        let fetcher = GatedFetcher::new(Err("404".into()));
        let cache = cache(fetcher.clone(), ImageCacheSettings::default());
        let mut first = cache.request(key());
        let mut second = cache.request(key());
        fetcher.gate.notify_one();

        assert!(matches!(first.wait().await, Err(FetchError::Fetch(msg)) if msg.contains("404")));
        assert!(matches!(second.wait().await, Err(FetchError::Fetch(_))));
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn oversized_images_fail() {
        let fetcher = GatedFetcher::new(Ok(vec![0u8; 64]));
        let settings = ImageCacheSettings {
            max_image_bytes: 16,
            ..ImageCacheSettings::default()
        };
        let cache = cache(fetcher.clone(), settings);
        let mut sub = cache.request(key());
        fetcher.gate.notify_one();
        assert_eq!(sub.wait().await.unwrap_err(), FetchError::TooLarge(64));
    }

    #[tokio::test]
    async fn dropping_last_subscriber_cancels_fetch() {
        let fetcher = GatedFetcher::new(Ok(png_bytes(2, 2)));
        let cache = cache(fetcher.clone(), ImageCacheSettings::default());

        let first = cache.request(key());
        let second = cache.request(key());
        drop(first);
        assert_eq!(cache.in_flight(), 1);
        drop(second);
        assert_eq!(cache.in_flight(), 0);
        assert!(matches!(cache.state(&key()), FetchState::NotRequested));

        // A later request starts a fresh fetch.
        let _again = cache.request(key());
        tokio::task::yield_now().await;
        assert_eq!(cache.in_flight(), 1);
    }

    #[tokio::test]
    async fn disk_cache_avoids_refetch_after_eviction_from_memory() {
        let data = tempfile::tempdir().unwrap();
        let fetcher = GatedFetcher::new(Ok(png_bytes(4, 4)));
        let settings = ImageCacheSettings {
            disk_dir: Some(disk::ensure_dir(data.path())),
            ..ImageCacheSettings::default()
        };
        let cache = cache(fetcher.clone(), settings);

        let mut sub = cache.request(key());
        fetcher.gate.notify_one();
        sub.wait().await.unwrap();
        drop(sub);

        cache.clear_memory();
        assert!(matches!(cache.state(&key()), FetchState::NotRequested));

        let mut again = cache.request(key());
        let image = tokio::time::timeout(Duration::from_secs(5), again.wait())
            .await
            .expect("disk hit should not wait on the network")
            .unwrap();
        assert_eq!(image.preview.dimensions(), (4, 4));
        assert_eq!(fetcher.calls(), 1);

        drop(again);
        assert!(cache.evict(&key()));
        assert!(disk::read(&disk::ensure_dir(data.path()), &key()).is_none());
    }

    #[tokio::test]
    async fn shutdown_aborts_and_rejects_new_requests() {
        let fetcher = GatedFetcher::new(Ok(png_bytes(2, 2)));
        let cache = cache(fetcher.clone(), ImageCacheSettings::default());
        let mut pending = cache.request(key());
        cache.shutdown();

        assert_eq!(pending.wait().await.unwrap_err(), FetchError::Cancelled);
        let mut late = cache.request(key());
        assert_eq!(late.wait().await.unwrap_err(), FetchError::ShutDown);
        assert_eq!(cache.in_flight(), 0);
    }

    #[tokio::test]
    async fn changed_reports_closure_after_shutdown() {
        let fetcher = GatedFetcher::new(Ok(png_bytes(2, 2)));
        let cache = cache(fetcher.clone(), ImageCacheSettings::default());
        let mut pending = cache.request(key());
        cache.shutdown();

        assert!(matches!(
            pending.changed().await,
            Some(FetchState::Failed(FetchError::Cancelled))
        ));
        assert!(pending.changed().await.is_none());

        let mut late = cache.request(key());
        assert!(late.changed().await.is_none());
        assert!(matches!(
            late.state(),
            FetchState::Failed(FetchError::ShutDown)
        ));
    }

    #[tokio::test]
    async fn failed_key_is_retried_on_next_request() {
        let fetcher = GatedFetcher::sequence(vec![Err("503".into()), Ok(png_bytes(3, 3))]);
        let cache = cache(fetcher.clone(), ImageCacheSettings::default());

        let mut first = cache.request(key());
        fetcher.gate.notify_one();
        assert!(matches!(first.wait().await, Err(FetchError::Fetch(_))));
        assert!(matches!(cache.state(&key()), FetchState::Failed(_)));

        let mut retry = cache.request(key());
        assert!(retry.state().is_loading());
        assert_eq!(cache.in_flight(), 1);
        fetcher.gate.notify_one();

        let image = retry.wait().await.unwrap();
        assert_eq!(image.preview.dimensions(), (3, 3));
        assert_eq!(fetcher.calls(), 2);
        // The earlier view is still subscribed and sees the retried image too.
        assert!(Arc::ptr_eq(&first.wait().await.unwrap(), &image));
    }

    #[tokio::test]
    async fn evict_leaves_loading_keys_alone() {
        let fetcher = GatedFetcher::new(Ok(png_bytes(2, 2)));
        let cache = cache(fetcher.clone(), ImageCacheSettings::default());

        let mut sub = cache.request(key());
        assert!(!cache.evict(&key()));
        assert_eq!(cache.in_flight(), 1);

        fetcher.gate.notify_one();
        sub.wait().await.unwrap();
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn stale_subscriber_does_not_cancel_refetch_after_evict() {
        let fetcher = GatedFetcher::new(Ok(png_bytes(2, 2)));
        let cache = cache(fetcher.clone(), ImageCacheSettings::default());

        let mut old = cache.request(key());
        fetcher.gate.notify_one();
        let first_image = old.wait().await.unwrap();
        assert!(cache.evict(&key()));
        // The evicted entry is gone; the old view keeps its image.
        assert!(old.changed().await.is_none());
        assert!(old.state().image().is_some());

        let mut fresh = cache.request(key());
        assert_eq!(cache.in_flight(), 1);
        drop(old);
        assert_eq!(cache.in_flight(), 1);

        fetcher.gate.notify_one();
        let second_image = fresh.wait().await.unwrap();
        assert!(!Arc::ptr_eq(&first_image, &second_image));
        assert_eq!(fetcher.calls(), 2);
    }
}
