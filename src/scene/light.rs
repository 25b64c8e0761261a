//! Light types for the scene

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

use super::Shared;
use crate::error::{BinError, BinResult};

/// Shared reference to a scene light
pub type LightRef = Shared<Light>;

/// Kind of a light. Fixed for the lifetime of a [`LightRef`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightKind {
    Ambient,
    Directional,
    Point,
    Spot,
}

/// Ambient light, contributes to the accumulated scene ambient color
#[derive(Debug, Clone)]
pub struct AmbientLight {
    pub color: Vec3,
}

/// Directional light (like the sun)
#[derive(Debug, Clone)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub color: Vec3,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(0.0, 0.0, -1.0),
            color: Vec3::ONE,
        }
    }
}

/// Point light
#[derive(Debug, Clone)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec3,
    /// x = constant, y = linear, z = quadratic
    pub attenuation: Vec3,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            color: Vec3::ONE,
            attenuation: Vec3::new(1.0, 0.0, 0.0),
        }
    }
}

/// Spot light
#[derive(Debug, Clone)]
pub struct SpotLight {
    pub position: Vec3,
    pub direction: Vec3,
    pub color: Vec3,
    pub attenuation: Vec3,
    pub spread_angle: f32, // radians
    pub concentration: f32,
}

impl Default for SpotLight {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            direction: Vec3::new(0.0, 0.0, -1.0),
            color: Vec3::ONE,
            attenuation: Vec3::new(1.0, 0.0, 0.0),
            spread_angle: std::f32::consts::PI,
            concentration: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub enum LightSource {
    Ambient(AmbientLight),
    Directional(DirectionalLight),
    Point(PointLight),
    Spot(SpotLight),
}

impl LightSource {
    pub fn kind(&self) -> LightKind {
        match self {
            LightSource::Ambient(_) => LightKind::Ambient,
            LightSource::Directional(_) => LightKind::Directional,
            LightSource::Point(_) => LightKind::Point,
            LightSource::Spot(_) => LightKind::Spot,
        }
    }
}

/// Resolved light state as produced by scene compilation
#[derive(Debug, Clone)]
pub struct Light {
    source: LightSource,
    enabled: bool,
}

impl Light {
    pub fn new(source: LightSource) -> Self {
        Self {
            source,
            enabled: true,
        }
    }

    pub fn ambient(color: Vec3) -> Self {
        Self::new(LightSource::Ambient(AmbientLight { color }))
    }

    pub fn directional(direction: Vec3, color: Vec3) -> Self {
        Self::new(LightSource::Directional(DirectionalLight {
            direction: direction.normalize_or_zero(),
            color,
        }))
    }

    pub fn point(position: Vec3, color: Vec3, attenuation: Vec3) -> Self {
        Self::new(LightSource::Point(PointLight {
            position,
            color,
            attenuation,
        }))
    }

    pub fn spot(spot: SpotLight) -> Self {
        Self::new(LightSource::Spot(spot))
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Wrap into a shared reference
    pub fn into_ref(self) -> LightRef {
        Shared::new(self)
    }

    pub fn kind(&self) -> LightKind {
        self.source.kind()
    }

    pub fn source(&self) -> &LightSource {
        &self.source
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_ambient(&self) -> bool {
        self.kind() == LightKind::Ambient
    }

    /// Point and spot lights depend on the world-to-eye transform
    pub fn is_positional(&self) -> bool {
        matches!(self.kind(), LightKind::Point | LightKind::Spot)
    }

    pub fn color(&self) -> Vec3 {
        match &self.source {
            LightSource::Ambient(l) => l.color,
            LightSource::Directional(l) => l.color,
            LightSource::Point(l) => l.color,
            LightSource::Spot(l) => l.color,
        }
    }

    pub fn set_color(&mut self, color: Vec3) {
        match &mut self.source {
            LightSource::Ambient(l) => l.color = color,
            LightSource::Directional(l) => l.color = color,
            LightSource::Point(l) => l.color = color,
            LightSource::Spot(l) => l.color = color,
        }
    }

    /// Replace the light parameters. The kind must stay the same.
    pub fn set_source(&mut self, source: LightSource) -> BinResult<()> {
        if source.kind() != self.kind() {
            return Err(BinError::LightKindChanged);
        }
        self.source = source;
        Ok(())
    }

    /// Convert to GPU data format
    pub fn to_gpu_data(&self) -> GpuLightData {
        let color = self.color().extend(1.0);
        match &self.source {
            LightSource::Point(l) => GpuLightData {
                position: l.position.extend(1.0),
                color,
                direction_type: Vec4::new(0.0, 0.0, 0.0, 0.0), // type 0 = point
                attenuation: l.attenuation.extend(0.0),
                spot_params: Vec4::ZERO,
            },
            LightSource::Spot(l) => GpuLightData {
                position: l.position.extend(1.0),
                color,
                direction_type: l.direction.extend(1.0), // type 1 = spot
                attenuation: l.attenuation.extend(0.0),
                spot_params: Vec4::new(l.spread_angle.cos(), l.concentration, 0.0, 0.0),
            },
            LightSource::Directional(l) => GpuLightData {
                position: Vec4::ZERO,
                color,
                direction_type: l.direction.extend(2.0), // type 2 = directional
                attenuation: Vec4::new(1.0, 0.0, 0.0, 0.0),
                spot_params: Vec4::ZERO,
            },
            LightSource::Ambient(_) => GpuLightData {
                position: Vec4::ZERO,
                color,
                direction_type: Vec4::new(0.0, 0.0, 0.0, 3.0), // type 3 = ambient
                attenuation: Vec4::new(1.0, 0.0, 0.0, 0.0),
                spot_params: Vec4::ZERO,
            },
        }
    }
}

/// GPU-friendly light data structure
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuLightData {
    /// xyz = position, w = 1 for positional lights
    pub position: Vec4,
    /// xyz = color
    pub color: Vec4,
    /// xyz = direction, w = light type (0=point, 1=spot, 2=directional, 3=ambient)
    pub direction_type: Vec4,
    /// x = constant, y = linear, z = quadratic
    pub attenuation: Vec4,
    /// x = cos(spread_angle), y = concentration, zw = unused
    pub spot_params: Vec4,
}
