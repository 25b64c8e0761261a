//! Frame driver
//!
//! The scene thread edits the bins under the write lock whenever it likes.
//! Each frame the render thread drains pending updates under the write
//! lock, then downgrades to a read lock and traverses. The downgrade is the
//! frame barrier: traversal never observes a half-applied edit.

use parking_lot::{RwLock, RwLockWriteGuard};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::backend::Pipeline;
use crate::bins::{FrameStats, RenderBins};
use crate::config::RendererConfig;
use crate::error::BinResult;
use crate::surface::SurfaceState;

/// Shared owner of the render bins
#[derive(Debug, Clone)]
pub struct BinEngine {
    bins: Arc<RwLock<RenderBins>>,
    frames: Arc<AtomicU64>,
}

impl BinEngine {
    pub fn new(config: RendererConfig) -> BinResult<Self> {
        Ok(Self {
            bins: Arc::new(RwLock::new(RenderBins::new(config)?)),
            frames: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Run producer work against the bins
    pub fn edit<R>(&self, f: impl FnOnce(&mut RenderBins) -> R) -> R {
        f(&mut *self.bins.write())
    }

    /// Read-only access, e.g. for statistics
    pub fn inspect<R>(&self, f: impl FnOnce(&RenderBins) -> R) -> R {
        f(&*self.bins.read())
    }

    pub fn register_surface(&self, surface: &SurfaceState) {
        self.bins.write().register_surface(surface);
    }

    /// Drain pending updates, then draw everything on `surface`.
    pub fn render_frame<P: Pipeline>(&self, surface: &SurfaceState, pipeline: &mut P) -> FrameStats {
        let mut bins = self.bins.write();
        let drained = bins.drain_pending_updates();
        let bins = RwLockWriteGuard::downgrade(bins);
        let stats = bins.render_on_surface(surface, pipeline);

        let frame = self.frames.fetch_add(1, Ordering::Relaxed) + 1;
        log::trace!(
            "Frame {}: committed {}, {} draws, {} state calls",
            frame,
            drained.committed,
            stats.draws,
            stats.state_calls
        );
        stats
    }

    /// Frames rendered so far
    pub fn frame_count(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}
