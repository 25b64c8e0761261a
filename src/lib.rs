//! Render Bins - render-state bucketing for a retained-mode scene graph
//!
//! Compiled scene content is grouped by the device state it needs, so that a
//! frame issues each expensive state change only when it actually differs
//! from what the surface already has bound.
//!
//! # Features
//! - Light bins sharing a fixed budget of hardware light slots, with
//!   reference-counted slot reuse
//! - Environment, attribute, shader and texture buckets matched by identity
//!   or structural value
//! - Staged inserts committed once per frame, so traversal always sees a
//!   stable structure
//! - Per-surface device state caches with dirty tracking
//! - A recording [`DummyPipeline`] for testing without a device

pub mod backend;
pub mod bins;
pub mod config;
pub mod engine;
pub mod error;
pub mod scene;
pub mod surface;

pub use backend::{DummyPipeline, GeometryId, Pipeline, PipelineCall, ShaderId, TextureId};
pub use bins::{
    AtomHandle, AttrHandle, BinHandle, DrainStats, EnvHandle, FrameStats, NodeState, RenderBins,
    ShaderHandle, TextureHandle,
};
pub use config::{BinPlacement, RendererConfig};
pub use engine::BinEngine;
pub use error::{BinError, BinResult};
pub use scene::{
    Appearance, AppearanceState, Fog, FogRef, Light, LightRef, ModelClip, ModelClipRef,
    RenderItem, RenderingAttributes,
};
pub use surface::{DeviceStateCache, DirtyFlags, SurfaceState};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the crate banner. Logger setup is left to the application.
pub fn init() {
    log::info!("Render Bins v{}", VERSION);
}
