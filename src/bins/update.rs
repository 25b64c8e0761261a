//! Deferred update queue
//!
//! Structural inserts and change notifications accumulate here between
//! frames. [`RenderBins::drain_pending_updates`](crate::RenderBins::drain_pending_updates)
//! empties the queue once per frame, before traversal, parents first.

use std::collections::HashSet;

use super::arena::Handle;
use super::{
    AttrHandle, AttributeSet, BinHandle, EnvHandle, EnvironmentSet, LightBin, ShaderHandle,
    ShaderSet, TextureHandle, TextureSet,
};
use crate::scene::{Appearance, FogRef, LightRef, ModelClipRef};

/// A change to shared scene state the bins must react to
#[derive(Debug, Clone)]
pub enum Notification {
    /// A light was switched on or off
    LightOnOff(LightRef),
    /// An ambient light changed color
    AmbientColor(LightRef),
    /// Any other light parameter changed
    LightChanged(LightRef),
    FogChanged(FogRef),
    ClipChanged(ModelClipRef),
    /// The rendering attributes of an appearance were edited
    AppearanceChanged(Appearance),
}

/// Parents with pending children, in first-flagged order
#[derive(Debug)]
pub(crate) struct DirtyList<T> {
    order: Vec<Handle<T>>,
    seen: HashSet<Handle<T>>,
}

impl<T> Default for DirtyList<T> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            seen: HashSet::new(),
        }
    }
}

impl<T> DirtyList<T> {
    pub fn push(&mut self, handle: Handle<T>) {
        if self.seen.insert(handle) {
            self.order.push(handle);
        }
    }

    pub fn take(&mut self) -> Vec<Handle<T>> {
        self.seen.clear();
        std::mem::take(&mut self.order)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[derive(Debug, Default)]
pub(crate) struct UpdateQueue {
    /// New bins wait on the root
    pub root: bool,
    pub bins: DirtyList<LightBin>,
    pub environments: DirtyList<EnvironmentSet>,
    pub attribute_sets: DirtyList<AttributeSet>,
    pub shader_sets: DirtyList<ShaderSet>,
    pub texture_sets: DirtyList<TextureSet>,
    pub notifications: Vec<Notification>,
}

impl UpdateQueue {
    pub fn mark_root(&mut self) {
        self.root = true;
    }

    pub fn mark_bin(&mut self, bin: BinHandle) {
        self.bins.push(bin);
    }

    pub fn mark_environment(&mut self, env: EnvHandle) {
        self.environments.push(env);
    }

    pub fn mark_attribute_set(&mut self, attr: AttrHandle) {
        self.attribute_sets.push(attr);
    }

    pub fn mark_shader_set(&mut self, shader: ShaderHandle) {
        self.shader_sets.push(shader);
    }

    pub fn mark_texture_set(&mut self, texture: TextureHandle) {
        self.texture_sets.push(texture);
    }

    pub fn notify(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }

    /// Containers and notifications waiting for the next drain
    pub fn pending(&self) -> usize {
        usize::from(self.root)
            + self.bins.len()
            + self.environments.len()
            + self.attribute_sets.len()
            + self.shader_sets.len()
            + self.texture_sets.len()
            + self.notifications.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirty_list_dedups_in_order() {
        let mut list: DirtyList<u8> = DirtyList::default();
        let a = Handle::from_raw(3, 0);
        let b = Handle::from_raw(1, 0);
        list.push(a);
        list.push(b);
        list.push(a);
        assert_eq!(list.len(), 2);
        assert_eq!(list.take(), vec![a, b]);
        assert!(list.is_empty());

        list.push(a);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_pending_counts_everything() {
        let mut queue = UpdateQueue::default();
        assert_eq!(queue.pending(), 0);
        queue.mark_root();
        queue.mark_bin(BinHandle::from_raw(0, 0));
        queue.mark_bin(BinHandle::from_raw(0, 0));
        queue.notify(Notification::FogChanged(
            crate::scene::Fog::exponential(glam::Vec3::ONE, 0.5).into_ref(),
        ));
        assert_eq!(queue.pending(), 3);
    }
}
