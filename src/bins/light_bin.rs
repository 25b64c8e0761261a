//! Light bins, the root level of the bucket chain
//!
//! A bin owns one set of hardware light slots. Every environment inside it
//! has its lights resident in those slots, so switching between
//! environments of the same bin never reloads light data, only the enable
//! mask.

use super::list::{impl_linked, Bucket, Links, NodeState};
use super::slots::LightSlots;
use super::{BinHandle, EnvironmentSet};
use crate::backend::{mask_bits, Pipeline};
use crate::scene::LightRef;
use crate::surface::{DeviceStateCache, DirtyFlags};

#[derive(Debug)]
pub struct LightBin {
    links: Links<LightBin>,
    state: NodeState,
    slots: LightSlots,
    environments: Bucket<EnvironmentSet>,
}

impl_linked!(LightBin);

impl LightBin {
    pub(crate) fn new(max_lights: usize) -> Self {
        Self {
            links: Links::default(),
            state: NodeState::Pending,
            slots: LightSlots::new(max_lights),
            environments: Bucket::new(),
        }
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn slots(&self) -> &LightSlots {
        &self.slots
    }

    pub(crate) fn slots_mut(&mut self) -> &mut LightSlots {
        &mut self.slots
    }

    pub fn environments(&self) -> &Bucket<EnvironmentSet> {
        &self.environments
    }

    pub(crate) fn environments_mut(&mut self) -> &mut Bucket<EnvironmentSet> {
        &mut self.environments
    }

    pub fn num_empty_slots(&self) -> usize {
        self.slots.num_empty_slots()
    }

    /// Whether the non-ambient `lights` fit next to the lights already
    /// resident
    pub fn can_fit(&self, lights: &[LightRef]) -> bool {
        self.slots.try_reserve(lights)
    }

    /// Load light data into the device slots for this bin.
    ///
    /// A surface that last drew a different bin (or lost its light state)
    /// gets every occupied slot. Otherwise only slots whose light changed
    /// are pushed, plus the positional ones after a view change.
    pub(crate) fn update_lights<P: Pipeline>(
        &self,
        handle: BinHandle,
        cache: &mut DeviceStateCache,
        pipeline: &mut P,
    ) -> usize {
        let occupied = self.slots.occupied_mask();
        let reload = if cache.bin != Some(handle) || cache.dirty.contains(DirtyFlags::LIGHTS) {
            occupied
        } else {
            let mut mask = cache.slot_dirty & occupied;
            if cache.dirty.contains(DirtyFlags::VIEW) {
                mask |= self.slots.positional_mask();
            }
            mask
        };

        let mut calls = 0;
        for slot in mask_bits(reload) {
            if let Some(light) = self.slots.light(slot) {
                let data = light.read().to_gpu_data();
                pipeline.update_light(slot, &data, &cache.view);
                calls += 1;
            }
        }

        cache.bin = Some(handle);
        cache.slot_dirty = 0;
        cache.dirty.remove(DirtyFlags::LIGHTS | DirtyFlags::VIEW);
        calls
    }
}
