//! Texture sets and render atoms, the bottom of the bucket chain

use super::list::{impl_linked, Bucket, Links, NodeState};
use super::{ShaderHandle, TextureHandle};
use crate::backend::{GeometryId, Pipeline, TextureId};
use crate::surface::{DeviceStateCache, DirtyFlags};

/// Content of one shader set sharing the same texture units
#[derive(Debug)]
pub struct TextureSet {
    links: Links<TextureSet>,
    state: NodeState,
    shader_set: ShaderHandle,
    textures: Vec<TextureId>,
    atoms: Bucket<RenderAtom>,
}

impl_linked!(TextureSet);

impl TextureSet {
    pub(crate) fn new(shader_set: ShaderHandle, textures: Vec<TextureId>) -> Self {
        Self {
            links: Links::default(),
            state: NodeState::Pending,
            shader_set,
            textures,
            atoms: Bucket::new(),
        }
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn shader_set(&self) -> ShaderHandle {
        self.shader_set
    }

    /// Texture per unit, in unit order
    pub fn textures(&self) -> &[TextureId] {
        &self.textures
    }

    pub fn atoms(&self) -> &Bucket<RenderAtom> {
        &self.atoms
    }

    pub(crate) fn atoms_mut(&mut self) -> &mut Bucket<RenderAtom> {
        &mut self.atoms
    }

    pub(crate) fn bind<P: Pipeline>(
        &self,
        handle: TextureHandle,
        cache: &mut DeviceStateCache,
        pipeline: &mut P,
    ) -> usize {
        let dirty = cache.dirty.contains(DirtyFlags::TEXTURES);
        if cache.texture_set == Some(handle) && !dirty {
            return 0;
        }
        cache.texture_set = Some(handle);
        if !dirty && cache.textures == self.textures {
            return 0;
        }
        pipeline.bind_textures(&self.textures);
        cache.textures.clone_from(&self.textures);
        cache.dirty.remove(DirtyFlags::TEXTURES);
        1
    }
}

/// One drawable piece of geometry
#[derive(Debug)]
pub struct RenderAtom {
    links: Links<RenderAtom>,
    state: NodeState,
    texture_set: TextureHandle,
    geometry: GeometryId,
    /// Identity of the appearance this atom was bucketed for, if known
    appearance: Option<u64>,
}

impl_linked!(RenderAtom);

impl RenderAtom {
    pub(crate) fn new(texture_set: TextureHandle, geometry: GeometryId) -> Self {
        Self {
            links: Links::default(),
            state: NodeState::Pending,
            texture_set,
            geometry,
            appearance: None,
        }
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn texture_set(&self) -> TextureHandle {
        self.texture_set
    }

    pub fn geometry(&self) -> GeometryId {
        self.geometry
    }

    pub fn appearance(&self) -> Option<u64> {
        self.appearance
    }

    pub(crate) fn set_appearance(&mut self, appearance: u64) {
        self.appearance = Some(appearance);
    }

    pub(crate) fn set_texture_set(&mut self, texture_set: TextureHandle) {
        self.texture_set = texture_set;
    }
}
