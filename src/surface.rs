//! Per-surface device state cache
//!
//! Each output surface remembers which buckets it last bound and the state
//! values it last pushed to the device. Traversal consults the cache at every
//! level and only issues a pipeline call when the bound identity or value
//! differs, or when a [`DirtyFlags`] bit forces the category to be reapplied.
//!
//! The cache is written by the render thread. Structural removals on the
//! scene thread reset the cached identities through the surface's own lock.

use bitflags::bitflags;
use glam::{Mat4, Vec3};
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::backend::{ShaderId, TextureId};
use crate::bins::{AttrHandle, BinHandle, EnvHandle, ShaderHandle, TextureHandle};

bitflags! {
    /// State categories that must be reapplied regardless of the cache
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DirtyFlags: u32 {
        const LIGHT_ENABLES = 1 << 0;
        const AMBIENT = 1 << 1;
        const FOG = 1 << 2;
        const MODEL_CLIP = 1 << 3;
        /// Reload every occupied light slot
        const LIGHTS = 1 << 4;
        /// World-to-eye transform changed, reload positional lights
        const VIEW = 1 << 5;
        const RENDERING_ATTRIBUTES = 1 << 6;
        const SHADER = 1 << 7;
        const TEXTURES = 1 << 8;

        /// Everything an environment bind diffs
        const ENVIRONMENT = Self::LIGHT_ENABLES.bits()
            | Self::AMBIENT.bits()
            | Self::FOG.bits()
            | Self::MODEL_CLIP.bits();
        const ALL = Self::ENVIRONMENT.bits()
            | Self::LIGHTS.bits()
            | Self::VIEW.bits()
            | Self::RENDERING_ATTRIBUTES.bits()
            | Self::SHADER.bits()
            | Self::TEXTURES.bits();
    }
}

/// What one surface's device currently has bound.
///
/// Values guarded by a dirty bit are meaningless while the bit is set.
#[derive(Debug)]
pub struct DeviceStateCache {
    pub(crate) bin: Option<BinHandle>,
    pub(crate) environment: Option<EnvHandle>,
    pub(crate) attribute_set: Option<AttrHandle>,
    pub(crate) attribute_version: u64,
    pub(crate) shader_set: Option<ShaderHandle>,
    pub(crate) texture_set: Option<TextureHandle>,
    pub(crate) enable_mask: u64,
    pub(crate) ambient: Vec3,
    pub(crate) fog: Option<u64>,
    pub(crate) clip: Option<u64>,
    pub(crate) shader: Option<ShaderId>,
    pub(crate) textures: Vec<TextureId>,
    /// Slots of the bound bin whose light changed since it was loaded
    pub(crate) slot_dirty: u64,
    pub(crate) view: Mat4,
    pub(crate) dirty: DirtyFlags,
}

impl Default for DeviceStateCache {
    fn default() -> Self {
        Self {
            bin: None,
            environment: None,
            attribute_set: None,
            attribute_version: 0,
            shader_set: None,
            texture_set: None,
            enable_mask: 0,
            ambient: Vec3::ZERO,
            fog: None,
            clip: None,
            shader: None,
            textures: Vec::new(),
            slot_dirty: 0,
            view: Mat4::IDENTITY,
            dirty: DirtyFlags::ALL,
        }
    }
}

impl DeviceStateCache {
    pub fn bound_bin(&self) -> Option<BinHandle> {
        self.bin
    }

    pub fn bound_environment(&self) -> Option<EnvHandle> {
        self.environment
    }

    pub fn bound_attribute_set(&self) -> Option<AttrHandle> {
        self.attribute_set
    }

    pub fn bound_shader_set(&self) -> Option<ShaderHandle> {
        self.shader_set
    }

    pub fn bound_texture_set(&self) -> Option<TextureHandle> {
        self.texture_set
    }

    /// Last light enable mask pushed to the device
    pub fn enable_mask(&self) -> u64 {
        self.enable_mask
    }

    pub fn ambient(&self) -> Vec3 {
        self.ambient
    }

    pub fn slot_dirty(&self) -> u64 {
        self.slot_dirty
    }

    pub fn view(&self) -> &Mat4 {
        &self.view
    }

    pub fn dirty(&self) -> DirtyFlags {
        self.dirty
    }

    /// Forget every bound identity and force all categories to be reapplied
    pub fn invalidate(&mut self) {
        let view = self.view;
        *self = Self {
            view,
            ..Self::default()
        };
    }
}

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

/// Cloneable handle to one output surface and its state cache.
#[derive(Debug, Clone)]
pub struct SurfaceState {
    id: u64,
    cache: Arc<Mutex<DeviceStateCache>>,
}

impl Default for SurfaceState {
    fn default() -> Self {
        Self::new()
    }
}

impl SurfaceState {
    pub fn new() -> Self {
        Self {
            id: NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed),
            cache: Arc::new(Mutex::new(DeviceStateCache::default())),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn lock(&self) -> MutexGuard<'_, DeviceStateCache> {
        self.cache.lock()
    }

    pub fn mark_dirty(&self, flags: DirtyFlags) {
        self.cache.lock().dirty |= flags;
    }

    /// The device context was lost or replaced
    pub fn invalidate(&self) {
        log::debug!("Invalidating surface {}", self.id);
        self.cache.lock().invalidate();
    }

    /// Set the world-to-eye transform used for positional lights
    pub fn set_view_transform(&self, view: Mat4) {
        let mut cache = self.cache.lock();
        if cache.view != view {
            cache.view = view;
            cache.dirty |= DirtyFlags::VIEW;
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<Mutex<DeviceStateCache>> {
        Arc::downgrade(&self.cache)
    }
}

/// Surfaces known to the bins, held weakly so dropping a surface is enough
/// to unregister it.
#[derive(Debug, Default)]
pub(crate) struct SurfaceRegistry {
    entries: Vec<Weak<Mutex<DeviceStateCache>>>,
}

impl SurfaceRegistry {
    pub fn register(&mut self, surface: &SurfaceState) {
        let weak = surface.downgrade();
        if !self.entries.iter().any(|e| e.ptr_eq(&weak)) {
            self.entries.push(weak);
        }
    }

    /// Run `f` on every live surface cache, pruning dropped surfaces
    pub fn for_each(&mut self, mut f: impl FnMut(&mut DeviceStateCache)) {
        self.entries.retain(|entry| match entry.upgrade() {
            Some(cache) => {
                f(&mut cache.lock());
                true
            }
            None => false,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.strong_count() > 0).count()
    }
}
