//! Builds the labeled descriptor registry from the image store and caches it
//! behind a single-flight guard.

use crate::engine::{EngineError, EngineHandle, ImageSource};
use crate::store::{ImageStore, StoreError};
use facedesk_core::{Registry, WireEntry};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("image store: {0}")]
    Store(#[from] StoreError),
    #[error("engine: {0}")]
    Engine(#[from] EngineError),
}

/// Walks the image store and turns every photo into at most one descriptor.
#[derive(Clone)]
pub struct RegistryBuilder {
    store: ImageStore,
    engine: EngineHandle,
}

impl RegistryBuilder {
    pub fn new(store: ImageStore, engine: EngineHandle) -> Self {
        Self { store, engine }
    }

    /// Build a fresh registry.
    ///
    /// Photos without a face are skipped. Photos that cannot be read, decoded
    /// or run through the extractor are logged and skipped. Store listing
    /// failures and an unusable engine abort the build.
    pub async fn build(&self) -> Result<Registry, BuildError> {
        let start = Instant::now();
        let labels = self.store.labels().await?;
        tracing::info!(count = labels.len(), root = %self.store.root().display(), "labels found");

        let mut registry = Registry::new();
        let mut skipped = 0usize;

        for label in labels {
            let images = self.store.images(&label).await?;
            tracing::debug!(label = %label, count = images.len(), "images found");

            // Jobs run concurrently on the pool; join_all keeps submission order.
            let jobs = images.iter().map(|path| {
                let engine = self.engine.clone();
                let path = path.clone();
                async move { engine.extract(ImageSource::File(path)).await }
            });
            let results = join_all(jobs).await;

            let mut descriptors = Vec::new();
            for (path, result) in images.iter().zip(results) {
                match result {
                    Ok(Some(found)) => descriptors.push(found.embedding),
                    Ok(None) => {
                        tracing::debug!(label = %label, path = %path.display(), "no face detected");
                    }
                    Err(e) if e.is_per_image() => {
                        skipped += 1;
                        tracing::warn!(label = %label, path = %path.display(), error = %e, "skipping image");
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            if descriptors.is_empty() {
                tracing::debug!(label = %label, "no descriptors; label omitted");
            }
            registry.push(label, descriptors);
        }

        tracing::info!(
            labels = registry.len(),
            descriptors = registry.descriptor_count(),
            skipped,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "labeled face descriptors built"
        );
        Ok(registry)
    }
}

/// Process-wide registry cache.
///
/// Readers take the `RwLock`; builds are serialized by `build_guard`, so
/// concurrent first callers wait for one shared build instead of racing.
pub struct RegistryService {
    builder: RegistryBuilder,
    cache: RwLock<Option<Arc<Registry>>>,
    build_guard: Mutex<()>,
}

impl RegistryService {
    pub fn new(builder: RegistryBuilder) -> Self {
        Self {
            builder,
            cache: RwLock::new(None),
            build_guard: Mutex::new(()),
        }
    }

    /// The cached registry if it holds any labels; otherwise build it.
    ///
    /// An empty result is not kept as "built": later calls retry, so photos
    /// enrolled after an empty build become visible.
    pub async fn get_or_build(&self) -> Result<Arc<Registry>, BuildError> {
        if let Some(registry) = self.cached().await {
            tracing::debug!("labeled face descriptors already loaded");
            return Ok(registry);
        }

        let _guard = self.build_guard.lock().await;
        // Another caller may have finished a build while we waited.
        if let Some(registry) = self.cached().await {
            return Ok(registry);
        }

        tracing::info!("no labeled face descriptors cached; building from images");
        self.build_and_store().await
    }

    /// Build unconditionally and replace the cache.
    pub async fn rebuild(&self) -> Result<Arc<Registry>, BuildError> {
        let _guard = self.build_guard.lock().await;
        self.build_and_store().await
    }

    /// Drop the cached registry; the next `get_or_build` rebuilds.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
        tracing::info!("labeled face descriptor cache invalidated");
    }

    /// Current cache contents, empty if nothing has been built.
    pub async fn snapshot(&self) -> Arc<Registry> {
        self.cache.read().await.clone().unwrap_or_default()
    }

    /// `[{label, descriptors}]` for clients doing their own matching.
    pub async fn to_wire_format(&self) -> Vec<WireEntry> {
        self.snapshot().await.to_wire_format()
    }

    /// Whether a non-empty registry is cached.
    pub async fn is_cached(&self) -> bool {
        self.cached().await.is_some()
    }

    async fn cached(&self) -> Option<Arc<Registry>> {
        self.cache
            .read()
            .await
            .as_ref()
            .filter(|r| !r.is_empty())
            .cloned()
    }

    /// Caller must hold `build_guard`. A failed build leaves the cache as is.
    async fn build_and_store(&self) -> Result<Arc<Registry>, BuildError> {
        let registry = match self.builder.build().await {
            Ok(registry) => Arc::new(registry),
            Err(e) => {
                tracing::error!(error = %e, "error loading labeled images");
                return Err(e);
            }
        };
        *self.cache.write().await = Some(Arc::clone(&registry));
        Ok(registry)
    }
}
