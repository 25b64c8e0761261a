//! Fog state

use glam::Vec3;

use super::Shared;

/// Shared reference to a scene fog node
pub type FogRef = Shared<Fog>;

#[derive(Debug, Clone, PartialEq)]
pub enum Fog {
    /// Fog ramps linearly between the front and back distances
    Linear { color: Vec3, front: f32, back: f32 },
    /// Fog density grows exponentially with distance
    Exponential { color: Vec3, density: f32 },
}

impl Fog {
    pub fn linear(color: Vec3, front: f32, back: f32) -> Self {
        Fog::Linear { color, front, back }
    }

    pub fn exponential(color: Vec3, density: f32) -> Self {
        Fog::Exponential { color, density }
    }

    pub fn color(&self) -> Vec3 {
        match self {
            Fog::Linear { color, .. } | Fog::Exponential { color, .. } => *color,
        }
    }

    pub fn into_ref(self) -> FogRef {
        Shared::new(self)
    }
}
