//! Dummy pipeline for testing and development.
//!
//! This pipeline doesn't talk to any device. It records every call so tests
//! can assert exactly which state changes a traversal issued.

use glam::{Mat4, Vec3, Vec4};

use super::traits::Pipeline;
use super::types::{GeometryId, ShaderId, TextureId};
use crate::scene::{Fog, GpuLightData, RenderingAttributes, MAX_CLIP_PLANES};

/// One recorded pipeline call
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineCall {
    LightEnables { mask: u64, max_lights: usize },
    SceneAmbient(Vec3),
    UpdateLight { slot: usize, light: GpuLightData },
    Fog(Fog),
    DisableFog,
    ModelClip { enable_mask: u8 },
    DisableModelClip,
    RenderingAttributes(RenderingAttributes),
    ResetRenderingAttributes { ignore_vertex_colors: bool },
    BindShader(Option<ShaderId>),
    BindTextures(Vec<TextureId>),
    Draw(GeometryId),
}

impl PipelineCall {
    pub fn is_draw(&self) -> bool {
        matches!(self, PipelineCall::Draw(_))
    }
}

/// Recording pipeline.
#[derive(Debug, Default)]
pub struct DummyPipeline {
    calls: Vec<PipelineCall>,
}

impl DummyPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the pipeline name.
    pub fn name(&self) -> &'static str {
        "Dummy Pipeline"
    }

    /// All calls recorded since the last clear
    pub fn calls(&self) -> &[PipelineCall] {
        &self.calls
    }

    /// Drain the recorded calls
    pub fn take_calls(&mut self) -> Vec<PipelineCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }

    /// Number of recorded state changes, draws excluded
    pub fn state_call_count(&self) -> usize {
        self.calls.iter().filter(|c| !c.is_draw()).count()
    }

    /// Geometry drawn, in submission order
    pub fn draws(&self) -> Vec<GeometryId> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                PipelineCall::Draw(g) => Some(*g),
                _ => None,
            })
            .collect()
    }

    fn record(&mut self, call: PipelineCall) {
        log::trace!("DummyPipeline: {:?}", call);
        self.calls.push(call);
    }
}

impl Pipeline for DummyPipeline {
    fn set_light_enables(&mut self, mask: u64, max_lights: usize) {
        self.record(PipelineCall::LightEnables { mask, max_lights });
    }

    fn set_scene_ambient(&mut self, color: Vec3) {
        self.record(PipelineCall::SceneAmbient(color));
    }

    fn update_light(&mut self, slot: usize, light: &GpuLightData, _view: &Mat4) {
        self.record(PipelineCall::UpdateLight {
            slot,
            light: *light,
        });
    }

    fn set_fog(&mut self, fog: &Fog) {
        self.record(PipelineCall::Fog(fog.clone()));
    }

    fn disable_fog(&mut self) {
        self.record(PipelineCall::DisableFog);
    }

    fn set_model_clip(&mut self, enable_mask: u8, _planes: &[Vec4; MAX_CLIP_PLANES]) {
        self.record(PipelineCall::ModelClip { enable_mask });
    }

    fn disable_model_clip(&mut self) {
        self.record(PipelineCall::DisableModelClip);
    }

    fn set_rendering_attributes(&mut self, attributes: &RenderingAttributes) {
        self.record(PipelineCall::RenderingAttributes(attributes.clone()));
    }

    fn reset_rendering_attributes(&mut self, ignore_vertex_colors: bool) {
        self.record(PipelineCall::ResetRenderingAttributes {
            ignore_vertex_colors,
        });
    }

    fn bind_shader(&mut self, shader: Option<ShaderId>) {
        self.record(PipelineCall::BindShader(shader));
    }

    fn bind_textures(&mut self, textures: &[TextureId]) {
        self.record(PipelineCall::BindTextures(textures.to_vec()));
    }

    fn draw_geometry(&mut self, geometry: GeometryId) {
        self.record(PipelineCall::Draw(geometry));
    }
}
