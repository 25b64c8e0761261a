//! Core pipeline trait
//!
//! This is the interface the bins drive while traversing. Implementations
//! must treat every call as idempotent: issuing the same state twice is
//! wasteful but never wrong.

use glam::{Mat4, Vec3, Vec4};

use crate::backend::types::*;
use crate::scene::{Fog, GpuLightData, RenderingAttributes, MAX_CLIP_PLANES};

/// Device state-setting calls consumed by the bins
pub trait Pipeline {
    /// Enable exactly the light slots whose bit is set in `mask`
    fn set_light_enables(&mut self, mask: u64, max_lights: usize);

    /// Set the accumulated scene ambient color
    fn set_scene_ambient(&mut self, color: Vec3);

    /// Load a light into hardware slot `slot`.
    ///
    /// `view` is the world-to-eye transform positional lights are
    /// expressed against.
    fn update_light(&mut self, slot: usize, light: &GpuLightData, view: &Mat4);

    fn set_fog(&mut self, fog: &Fog);

    fn disable_fog(&mut self);

    fn set_model_clip(&mut self, enable_mask: u8, planes: &[Vec4; MAX_CLIP_PLANES]);

    fn disable_model_clip(&mut self);

    fn set_rendering_attributes(&mut self, attributes: &RenderingAttributes);

    /// Restore device default rendering attributes
    fn reset_rendering_attributes(&mut self, ignore_vertex_colors: bool);

    /// Bind a shader program, `None` selects the fixed-function path
    fn bind_shader(&mut self, shader: Option<ShaderId>);

    /// Bind textures to units `0..textures.len()` and disable the rest
    fn bind_textures(&mut self, textures: &[TextureId]);

    /// Draw one piece of geometry with the currently bound state
    fn draw_geometry(&mut self, geometry: GeometryId);
}
