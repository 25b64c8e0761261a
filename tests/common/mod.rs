//! Shared fixtures for the bucketing integration tests.

#![allow(dead_code)]

use glam::Vec3;

use render_bins::{
    Appearance, AppearanceState, BinPlacement, GeometryId, Light, LightRef, RenderBins,
    RenderItem, RendererConfig, RenderingAttributes, SurfaceState,
};

/// Route `log` output through the test harness.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Bins with `max_lights` slots and one registered surface.
pub fn bins_with_surface(max_lights: usize) -> (RenderBins, SurfaceState) {
    bins_with_config(RendererConfig::new().with_max_lights(max_lights))
}

pub fn bins_with_config(config: RendererConfig) -> (RenderBins, SurfaceState) {
    init_logging();
    let mut bins = RenderBins::new(config).expect("valid config");
    let surface = SurfaceState::new();
    bins.register_surface(&surface);
    (bins, surface)
}

pub fn placement_config(max_lights: usize, placement: BinPlacement) -> RendererConfig {
    RendererConfig::new()
        .with_max_lights(max_lights)
        .with_placement(placement)
}

pub fn point_light(x: f32) -> LightRef {
    Light::point(Vec3::new(x, 0.0, 0.0), Vec3::ONE, Vec3::new(1.0, 0.0, 0.0)).into_ref()
}

pub fn sun() -> LightRef {
    Light::directional(Vec3::NEG_Y, Vec3::ONE).into_ref()
}

pub fn ambient(color: f32) -> LightRef {
    Light::ambient(Vec3::splat(color)).into_ref()
}

pub fn plain_appearance() -> Appearance {
    AppearanceState::new().into_ref()
}

pub fn appearance_with(attributes: RenderingAttributes) -> Appearance {
    AppearanceState::new()
        .with_rendering_attributes(attributes)
        .into_ref()
}

/// Appearance whose rendering attributes are rewritten every frame
pub fn frequent_appearance() -> Appearance {
    AppearanceState::new()
        .with_rendering_attributes(RenderingAttributes::new())
        .with_frequent_attributes(true)
        .into_ref()
}

pub fn item(geometry: u64, appearance: &Appearance, lights: &[LightRef]) -> RenderItem {
    RenderItem::new(GeometryId(geometry), appearance.clone()).with_lights(lights.to_vec())
}
