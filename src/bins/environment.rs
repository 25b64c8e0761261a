//! Environment sets: content sharing lights, fog and clip planes
//!
//! Membership is compared with set semantics. Lights, fog and clip planes
//! are compared by identity, never by value.

use glam::Vec3;

use super::list::{impl_linked, Bucket, Links, NodeState};
use super::{AttributeSet, BinHandle, EnvHandle};
use crate::backend::Pipeline;
use crate::scene::{FogRef, LightRef, ModelClipRef};
use crate::surface::{DeviceStateCache, DirtyFlags};

/// A requested light list split into slot-consuming lights and ambient
/// lights, duplicates removed.
#[derive(Debug, Clone, Default)]
pub struct LightSelection {
    lights: Vec<LightRef>,
    ambient: Vec<LightRef>,
}

impl LightSelection {
    pub fn new(lights: &[LightRef]) -> Self {
        let mut selection = Self::default();
        for light in lights {
            let target = if light.read().is_ambient() {
                &mut selection.ambient
            } else {
                &mut selection.lights
            };
            if !target.contains(light) {
                target.push(light.clone());
            }
        }
        selection
    }

    /// Non-ambient lights, each needing a slot
    pub fn lights(&self) -> &[LightRef] {
        &self.lights
    }

    pub fn ambient(&self) -> &[LightRef] {
        &self.ambient
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty() && self.ambient.is_empty()
    }
}

fn same_members(a: &[LightRef], b: &[LightRef]) -> bool {
    a.len() == b.len() && a.iter().all(|light| b.contains(light))
}

#[derive(Debug)]
pub struct EnvironmentSet {
    links: Links<EnvironmentSet>,
    state: NodeState,
    bin: BinHandle,
    lights: Vec<LightRef>,
    /// Slot of `lights[i]` in the owning bin
    positions: Vec<usize>,
    ambient_lights: Vec<LightRef>,
    fog: Option<FogRef>,
    clip: Option<ModelClipRef>,
    enable_mask: u64,
    ambient: Vec3,
    attribute_sets: Bucket<AttributeSet>,
}

impl_linked!(EnvironmentSet);

impl EnvironmentSet {
    pub(crate) fn new(
        bin: BinHandle,
        selection: LightSelection,
        positions: Vec<usize>,
        fog: Option<FogRef>,
        clip: Option<ModelClipRef>,
    ) -> Self {
        debug_assert_eq!(selection.lights.len(), positions.len());
        let mut env = Self {
            links: Links::default(),
            state: NodeState::Pending,
            bin,
            lights: selection.lights,
            positions,
            ambient_lights: selection.ambient,
            fog,
            clip,
            enable_mask: 0,
            ambient: Vec3::ZERO,
            attribute_sets: Bucket::new(),
        };
        env.recompute_enable_mask();
        env.recompute_ambient();
        env
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn bin(&self) -> BinHandle {
        self.bin
    }

    pub fn lights(&self) -> &[LightRef] {
        &self.lights
    }

    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    pub fn ambient_lights(&self) -> &[LightRef] {
        &self.ambient_lights
    }

    /// Slot assigned to `light` in the owning bin
    pub fn slot_of(&self, light: &LightRef) -> Option<usize> {
        self.lights
            .iter()
            .position(|l| l == light)
            .map(|i| self.positions[i])
    }

    pub fn contains_light(&self, light: &LightRef) -> bool {
        self.lights.contains(light) || self.ambient_lights.contains(light)
    }

    pub fn fog(&self) -> Option<&FogRef> {
        self.fog.as_ref()
    }

    pub fn clip(&self) -> Option<&ModelClipRef> {
        self.clip.as_ref()
    }

    pub fn enable_mask(&self) -> u64 {
        self.enable_mask
    }

    /// Accumulated color of the enabled ambient lights
    pub fn ambient(&self) -> Vec3 {
        self.ambient
    }

    pub fn attribute_sets(&self) -> &Bucket<AttributeSet> {
        &self.attribute_sets
    }

    pub(crate) fn attribute_sets_mut(&mut self) -> &mut Bucket<AttributeSet> {
        &mut self.attribute_sets
    }

    /// Full equality: both light partitions set-equal, same fog and same
    /// clip planes.
    ///
    /// An empty selection only matches an environment without any lights.
    pub fn matches(
        &self,
        selection: &LightSelection,
        fog: Option<&FogRef>,
        clip: Option<&ModelClipRef>,
    ) -> bool {
        self.fog.as_ref() == fog && self.clip.as_ref() == clip && self.matches_lights_only(selection)
    }

    /// Light membership only. Two environments equal here may still differ
    /// in fog or clip planes.
    pub fn matches_lights_only(&self, selection: &LightSelection) -> bool {
        same_members(&self.lights, &selection.lights)
            && same_members(&self.ambient_lights, &selection.ambient)
    }

    /// Returns whether the mask changed
    pub(crate) fn recompute_enable_mask(&mut self) -> bool {
        let mask = self
            .lights
            .iter()
            .zip(&self.positions)
            .filter(|(light, _)| light.read().is_enabled())
            .fold(0u64, |mask, (_, &slot)| mask | (1 << slot));
        let changed = mask != self.enable_mask;
        self.enable_mask = mask;
        changed
    }

    /// Sum the enabled ambient lights, clamped per channel. Returns whether
    /// the value changed.
    pub(crate) fn recompute_ambient(&mut self) -> bool {
        let sum = self
            .ambient_lights
            .iter()
            .map(|light| light.read())
            .filter(|light| light.is_enabled())
            .fold(Vec3::ZERO, |sum, light| sum + light.color());
        let ambient = sum.clamp(Vec3::ZERO, Vec3::ONE);
        let changed = ambient != self.ambient;
        self.ambient = ambient;
        changed
    }

    /// Diff this environment against what the surface has bound and issue
    /// only the differing state. Returns the number of calls issued.
    pub(crate) fn update_attributes<P: Pipeline>(
        &self,
        handle: EnvHandle,
        cache: &mut DeviceStateCache,
        pipeline: &mut P,
        max_lights: usize,
    ) -> usize {
        if cache.environment == Some(handle) && !cache.dirty.intersects(DirtyFlags::ENVIRONMENT) {
            return 0;
        }

        let mut calls = 0;
        let dirty = cache.dirty;

        if dirty.contains(DirtyFlags::LIGHT_ENABLES) || cache.enable_mask != self.enable_mask {
            pipeline.set_light_enables(self.enable_mask, max_lights);
            cache.enable_mask = self.enable_mask;
            calls += 1;
        }

        if dirty.contains(DirtyFlags::AMBIENT) || cache.ambient != self.ambient {
            pipeline.set_scene_ambient(self.ambient);
            cache.ambient = self.ambient;
            calls += 1;
        }

        let fog_id = self.fog.as_ref().map(|f| f.id());
        if dirty.contains(DirtyFlags::FOG) || cache.fog != fog_id {
            match &self.fog {
                Some(fog) => pipeline.set_fog(&fog.read()),
                None => pipeline.disable_fog(),
            }
            cache.fog = fog_id;
            calls += 1;
        }

        let clip_id = self.clip.as_ref().map(|c| c.id());
        if dirty.contains(DirtyFlags::MODEL_CLIP) || cache.clip != clip_id {
            match &self.clip {
                Some(clip) => {
                    let clip = clip.read();
                    pipeline.set_model_clip(clip.enable_mask(), clip.planes());
                }
                None => pipeline.disable_model_clip(),
            }
            cache.clip = clip_id;
            calls += 1;
        }

        cache.environment = Some(handle);
        cache.dirty.remove(DirtyFlags::ENVIRONMENT);
        calls
    }
}
