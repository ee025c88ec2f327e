//! Extraction engine: a pool of dedicated OS threads, each owning its own
//! descriptor extractor. Async handlers submit jobs over a bounded channel and
//! await a oneshot reply, so decoding and inference never run on the runtime.

use facedesk_core::{DecodeError, DescriptorExtractor, ExtractError, FaceDescriptor};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Pending jobs allowed per worker before submitters wait.
const QUEUE_DEPTH_PER_WORKER: usize = 8;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("face models unavailable: {0}")]
    Unavailable(Arc<str>),
    #[error("image decode failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine threads exited")]
    ChannelClosed,
}

impl EngineError {
    /// Errors confined to a single image; the engine itself is still usable.
    pub fn is_per_image(&self) -> bool {
        matches!(self, EngineError::Decode(_) | EngineError::Extract(_))
    }
}

/// Where the worker reads the photo from.
#[derive(Debug)]
pub enum ImageSource {
    File(PathBuf),
    Bytes(Vec<u8>),
}

type ExtractReply = oneshot::Sender<Result<Option<FaceDescriptor>, EngineError>>;

/// Message sent from async callers to the worker threads.
struct EngineRequest {
    source: ImageSource,
    reply: ExtractReply,
}

#[derive(Clone)]
enum Backend {
    Running(mpsc::Sender<EngineRequest>),
    Unavailable(Arc<str>),
}

/// Clone-safe handle to the engine pool.
#[derive(Clone)]
pub struct EngineHandle {
    backend: Backend,
    workers: usize,
}

impl EngineHandle {
    /// A handle whose every request fails, used when models could not be loaded.
    pub fn unavailable(reason: impl Into<Arc<str>>) -> Self {
        Self {
            backend: Backend::Unavailable(reason.into()),
            workers: 0,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self.backend, Backend::Running(_))
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Decode the photo and extract at most one face descriptor.
    pub async fn extract(&self, source: ImageSource) -> Result<Option<FaceDescriptor>, EngineError> {
        let tx = match &self.backend {
            Backend::Running(tx) => tx,
            Backend::Unavailable(reason) => return Err(EngineError::Unavailable(reason.clone())),
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(EngineRequest {
            source,
            reply: reply_tx,
        })
        .await
        .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn `workers` engine threads, each with an extractor built by `make`.
///
/// All extractors are constructed before any thread starts, so a model load
/// failure surfaces here rather than on the first request.
pub fn spawn_engine<E, F>(workers: usize, make: F) -> Result<EngineHandle, EngineError>
where
    E: DescriptorExtractor + Send + 'static,
    F: Fn() -> Result<E, ExtractError>,
{
    let workers = workers.max(1);
    let extractors = (0..workers).map(|_| make()).collect::<Result<Vec<_>, ExtractError>>()?;

    let (tx, rx) = mpsc::channel::<EngineRequest>(workers * QUEUE_DEPTH_PER_WORKER);
    let rx = Arc::new(Mutex::new(rx));

    for (id, extractor) in extractors.into_iter().enumerate() {
        let rx = Arc::clone(&rx);
        std::thread::Builder::new()
            .name(format!("facedesk-engine-{id}"))
            .spawn(move || worker_loop(id, extractor, rx))
            .map_err(EngineError::Spawn)?;
    }

    tracing::info!(workers, "extraction engine started");

    Ok(EngineHandle {
        backend: Backend::Running(tx),
        workers,
    })
}

fn worker_loop<E: DescriptorExtractor>(
    id: usize,
    mut extractor: E,
    rx: Arc<Mutex<mpsc::Receiver<EngineRequest>>>,
) {
    tracing::debug!(worker = id, "engine thread started");
    loop {
        // Hold the lock only while waiting; release it before doing work.
        let request = {
            let mut guard = rx.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.blocking_recv()
        };
        let Some(EngineRequest { source, reply }) = request else {
            break;
        };

        let result = run_extract(&mut extractor, source);
        if let Err(e) = &result {
            tracing::debug!(worker = id, error = %e, "extraction job failed");
        }
        let _ = reply.send(result);
    }
    tracing::debug!(worker = id, "engine thread exiting");
}

fn run_extract<E: DescriptorExtractor>(
    extractor: &mut E,
    source: ImageSource,
) -> Result<Option<FaceDescriptor>, EngineError> {
    let image = match source {
        ImageSource::File(path) => facedesk_core::load_image(&path)?,
        ImageSource::Bytes(bytes) => facedesk_core::decode_image(&bytes)?,
    };
    Ok(extractor.extract(&image)?)
}
