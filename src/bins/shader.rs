//! Shader sets: content of one attribute set sharing a shader program

use super::list::{impl_linked, Bucket, Links, NodeState};
use super::{AttrHandle, ShaderHandle, TextureSet};
use crate::backend::{Pipeline, ShaderId};
use crate::surface::{DeviceStateCache, DirtyFlags};

#[derive(Debug)]
pub struct ShaderSet {
    links: Links<ShaderSet>,
    state: NodeState,
    attribute_set: AttrHandle,
    shader: Option<ShaderId>,
    texture_sets: Bucket<TextureSet>,
}

impl_linked!(ShaderSet);

impl ShaderSet {
    pub(crate) fn new(attribute_set: AttrHandle, shader: Option<ShaderId>) -> Self {
        Self {
            links: Links::default(),
            state: NodeState::Pending,
            attribute_set,
            shader,
            texture_sets: Bucket::new(),
        }
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn attribute_set(&self) -> AttrHandle {
        self.attribute_set
    }

    /// `None` is the fixed-function path
    pub fn shader(&self) -> Option<ShaderId> {
        self.shader
    }

    pub fn texture_sets(&self) -> &Bucket<TextureSet> {
        &self.texture_sets
    }

    pub(crate) fn texture_sets_mut(&mut self) -> &mut Bucket<TextureSet> {
        &mut self.texture_sets
    }

    pub(crate) fn bind<P: Pipeline>(
        &self,
        handle: ShaderHandle,
        cache: &mut DeviceStateCache,
        pipeline: &mut P,
    ) -> usize {
        let dirty = cache.dirty.contains(DirtyFlags::SHADER);
        if cache.shader_set == Some(handle) && !dirty {
            return 0;
        }
        cache.shader_set = Some(handle);
        // another set with the same program may already be bound
        if !dirty && cache.shader == self.shader {
            return 0;
        }
        pipeline.bind_shader(self.shader);
        cache.shader = self.shader;
        cache.dirty.remove(DirtyFlags::SHADER);
        1
    }
}
