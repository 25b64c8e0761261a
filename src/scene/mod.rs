//! Resolved scene state consumed by the bins
//!
//! Scene compilation owns lights, fog, clip planes and appearances. The bins
//! only hold non-owning references to them and compare them by identity,
//! never by value (attribute bundles excepted, see [`RenderingAttributes`]).

mod appearance;
mod clip;
mod fog;
mod light;

pub use appearance::*;
pub use clip::*;
pub use fog::*;
pub use light::*;

use parking_lot::{RwLock, RwLockReadGuard};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::backend::GeometryId;

static NEXT_SHARED_ID: AtomicU64 = AtomicU64::new(1);

/// Identity-compared handle to a piece of scene state.
///
/// Cloning is cheap and yields the same identity. The value behind it may
/// change at any time from the scene thread; readers take a short read lock.
pub struct Shared<T> {
    inner: Arc<SharedInner<T>>,
}

struct SharedInner<T> {
    id: u64,
    value: RwLock<T>,
}

impl<T> Shared<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(SharedInner {
                id: NEXT_SHARED_ID.fetch_add(1, Ordering::Relaxed),
                value: RwLock::new(value),
            }),
        }
    }

    /// Process-unique identity of this reference
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.value.read()
    }

    /// Mutate the referenced value in place.
    ///
    /// The bins do not observe the change until the matching
    /// `notify_*` call has been drained.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut *self.inner.value.write())
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> PartialEq for Shared<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl<T> Eq for Shared<T> {}

impl<T> Hash for Shared<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl<T: fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.read())
            .finish()
    }
}

/// One compiled piece of renderable content.
///
/// This is the tuple scene compilation hands to
/// [`RenderBins::insert`](crate::RenderBins::insert): the geometry plus every
/// piece of resolved state that decides which bucket it lands in.
#[derive(Debug, Clone)]
pub struct RenderItem {
    pub geometry: GeometryId,
    pub appearance: Appearance,
    pub lights: Vec<LightRef>,
    pub fog: Option<FogRef>,
    pub clip: Option<ModelClipRef>,
}

impl RenderItem {
    pub fn new(geometry: GeometryId, appearance: Appearance) -> Self {
        Self {
            geometry,
            appearance,
            lights: Vec::new(),
            fog: None,
            clip: None,
        }
    }

    pub fn with_lights(mut self, lights: Vec<LightRef>) -> Self {
        self.lights = lights;
        self
    }

    pub fn with_fog(mut self, fog: FogRef) -> Self {
        self.fog = Some(fog);
        self
    }

    pub fn with_clip(mut self, clip: ModelClipRef) -> Self {
        self.clip = Some(clip);
        self
    }
}
