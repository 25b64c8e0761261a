//! Renderer configuration

use crate::error::{BinError, BinResult};

/// Upper bound on hardware light slots. Slot masks are stored as `u64`.
pub const MAX_SUPPORTED_LIGHTS: usize = 64;

/// How a new environment picks a bin when several existing bins could host it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BinPlacement {
    /// First bin, in creation order, with enough free slots.
    #[default]
    FirstFit,
    /// Bin that needs the fewest new slots; ties go to the earlier bin.
    BestFit,
}

/// Configuration for [`RenderBins`](crate::RenderBins).
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Number of hardware light slots per bin
    pub max_lights: usize,
    /// Bin selection policy
    pub placement: BinPlacement,
    /// Pin attribute bundles that change every frame to their appearance
    /// (sole-user mode) instead of sharing them by value
    pub pin_frequent_attributes: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            max_lights: 8,
            placement: BinPlacement::FirstFit,
            pin_frequent_attributes: true,
        }
    }
}

impl RendererConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_lights(mut self, max_lights: usize) -> Self {
        self.max_lights = max_lights;
        self
    }

    pub fn with_placement(mut self, placement: BinPlacement) -> Self {
        self.placement = placement;
        self
    }

    pub fn with_pinned_frequent_attributes(mut self, pin: bool) -> Self {
        self.pin_frequent_attributes = pin;
        self
    }

    /// Check that the configuration can be honoured.
    pub fn validate(&self) -> BinResult<()> {
        if self.max_lights == 0 || self.max_lights > MAX_SUPPORTED_LIGHTS {
            return Err(BinError::InvalidConfig(format!(
                "max_lights must be within 1..={MAX_SUPPORTED_LIGHTS}, got {}",
                self.max_lights
            )));
        }
        Ok(())
    }
}
