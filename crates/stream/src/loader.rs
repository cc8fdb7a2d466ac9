//! Background worker pool for tile cache reads.
//!
//! Requests flow to worker threads over a channel; each worker runs the
//! optional pre-load hook, reads and decodes the cache file, and sends the
//! outcome back. The streamer applies completed results on its tick under
//! the store lock, budgeted per frame.

use crossbeam_channel::{Receiver, Sender, unbounded};
use scatterspace_common::{TileCoords, Transform};
use scatterspace_persist::{CodecError, read_tile_file};
use std::path::PathBuf;
use std::sync::Arc;

/// Given tile coordinates, may delay or veto a load (e.g. fetch the file
/// from a remote source first). Returning `false` marks the tile as
/// attempted-but-missing without touching the filesystem.
pub type PreLoadHook = dyn Fn(TileCoords) -> bool + Send + Sync;

#[derive(Debug)]
pub struct LoadRequest {
    pub coords: TileCoords,
    pub path: PathBuf,
    pub preset_count: usize,
}

/// How a single tile load ended.
#[derive(Debug)]
pub enum LoadOutcome {
    /// Decoded per-preset instance lists.
    Loaded(Vec<Vec<Transform>>),
    /// No cache file exists for this tile.
    Missing,
    /// The pre-load hook declined the load.
    Vetoed,
    /// I/O failed in a way worth retrying on a later pass.
    TransientFailure,
    /// The file is unreadable for this session (bad version, truncation).
    FormatFailure,
}

#[derive(Debug)]
pub struct LoadResult {
    pub coords: TileCoords,
    pub outcome: LoadOutcome,
}

/// Fixed-size pool of load workers for one stream.
pub struct LoadPool {
    tx_request: Sender<LoadRequest>,
    rx_result: Receiver<LoadResult>,
}

impl LoadPool {
    /// Spawn `worker_count` threads. A pool with zero workers accepts
    /// requests but never completes them, which the tests use to observe
    /// dispatch behavior.
    pub fn new(worker_count: usize, hook: Option<Arc<PreLoadHook>>) -> Self {
        let (tx_request, rx_request) = unbounded::<LoadRequest>();
        let (tx_result, rx_result) = unbounded::<LoadResult>();

        for index in 0..worker_count {
            let rx = rx_request.clone();
            let tx = tx_result.clone();
            let hook = hook.clone();
            let builder = std::thread::Builder::new().name(format!("scatter-load-{index}"));
            let spawned = builder.spawn(move || {
                while let Ok(request) = rx.recv() {
                    let result = run_load(&request, hook.as_deref());
                    if tx.send(result).is_err() {
                        break;
                    }
                }
            });
            if let Err(e) = spawned {
                tracing::error!(error = %e, "failed to spawn tile load worker");
            }
        }

        Self {
            tx_request,
            rx_result,
        }
    }

    pub fn request(&self, request: LoadRequest) {
        let _ = self.tx_request.send(request);
    }

    pub fn try_recv(&self) -> Option<LoadResult> {
        self.rx_result.try_recv().ok()
    }

    /// Requests dispatched but not yet picked up by a worker.
    pub fn queued_requests(&self) -> usize {
        self.tx_request.len()
    }
}

fn run_load(request: &LoadRequest, hook: Option<&PreLoadHook>) -> LoadResult {
    if let Some(hook) = hook {
        if !hook(request.coords) {
            return LoadResult {
                coords: request.coords,
                outcome: LoadOutcome::Vetoed,
            };
        }
    }

    let outcome = match read_tile_file(&request.path, request.preset_count) {
        Ok(lists) => LoadOutcome::Loaded(lists),
        Err(CodecError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => LoadOutcome::Missing,
        Err(e) if e.is_format_failure() => {
            tracing::warn!(coords = %request.coords, error = %e, "tile cache unreadable");
            LoadOutcome::FormatFailure
        }
        Err(e) => {
            tracing::warn!(coords = %request.coords, error = %e, "tile cache read failed");
            LoadOutcome::TransientFailure
        }
    };

    LoadResult {
        coords: request.coords,
        outcome,
    }
}
