//! Model clip planes

use glam::Vec4;

use super::Shared;

/// Shared reference to a model clip node
pub type ModelClipRef = Shared<ModelClip>;

/// Number of model clip planes supported by the device
pub const MAX_CLIP_PLANES: usize = 6;

/// Up to six clip planes in model space, each individually enabled
#[derive(Debug, Clone, PartialEq)]
pub struct ModelClip {
    planes: [Vec4; MAX_CLIP_PLANES],
    enables: u8,
}

impl Default for ModelClip {
    fn default() -> Self {
        Self {
            planes: [
                Vec4::new(1.0, 0.0, 0.0, 1.0),
                Vec4::new(-1.0, 0.0, 0.0, 1.0),
                Vec4::new(0.0, 1.0, 0.0, 1.0),
                Vec4::new(0.0, -1.0, 0.0, 1.0),
                Vec4::new(0.0, 0.0, 1.0, 1.0),
                Vec4::new(0.0, 0.0, -1.0, 1.0),
            ],
            enables: 0,
        }
    }
}

impl ModelClip {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set plane `index` (ax + by + cz + d >= 0 is kept) and enable it.
    /// Out of range indices are ignored.
    pub fn with_plane(mut self, index: usize, plane: Vec4) -> Self {
        if index < MAX_CLIP_PLANES {
            self.planes[index] = plane;
            self.enables |= 1 << index;
        }
        self
    }

    pub fn set_enabled(&mut self, index: usize, enabled: bool) {
        if index >= MAX_CLIP_PLANES {
            return;
        }
        if enabled {
            self.enables |= 1 << index;
        } else {
            self.enables &= !(1 << index);
        }
    }

    pub fn planes(&self) -> &[Vec4; MAX_CLIP_PLANES] {
        &self.planes
    }

    /// Bit `i` set when plane `i` is enabled
    pub fn enable_mask(&self) -> u8 {
        self.enables
    }

    pub fn into_ref(self) -> ModelClipRef {
        Shared::new(self)
    }
}
