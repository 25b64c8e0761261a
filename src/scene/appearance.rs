//! Appearance and rendering attribute bundles

use super::Shared;
use crate::backend::{ColorWrites, CompareFunction, ShaderId, TextureId};

/// Shared reference to an appearance instance
pub type Appearance = Shared<AppearanceState>;

/// Per-pixel rendering state bundle.
///
/// Unlike lights and fog, bundles are shared between attribute sets by
/// structural value, see [`RenderingAttributes::equivalent`].
#[derive(Debug, Clone, PartialEq)]
pub struct RenderingAttributes {
    pub visible: bool,
    pub depth_test: bool,
    pub depth_write: bool,
    /// Fragments failing `function(alpha, reference)` are discarded
    pub alpha_test: Option<(CompareFunction, f32)>,
    pub color_write: ColorWrites,
    /// Use the material color instead of per-vertex colors
    pub ignore_vertex_colors: bool,
}

impl Default for RenderingAttributes {
    fn default() -> Self {
        Self {
            visible: true,
            depth_test: true,
            depth_write: true,
            alpha_test: None,
            color_write: ColorWrites::ALL,
            ignore_vertex_colors: false,
        }
    }
}

impl RenderingAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn with_depth(mut self, test: bool, write: bool) -> Self {
        self.depth_test = test;
        self.depth_write = write;
        self
    }

    pub fn with_alpha_test(mut self, function: CompareFunction, reference: f32) -> Self {
        self.alpha_test = Some((function, reference));
        self
    }

    pub fn with_color_write(mut self, color_write: ColorWrites) -> Self {
        self.color_write = color_write;
        self
    }

    pub fn with_ignore_vertex_colors(mut self, ignore: bool) -> Self {
        self.ignore_vertex_colors = ignore;
        self
    }

    /// Structural equality used for sharing attribute sets
    pub fn equivalent(&self, other: &RenderingAttributes) -> bool {
        self == other
    }
}

/// Resolved appearance: the attribute bundle plus the shader and texture
/// state that selects the lower levels of the bin chain.
#[derive(Debug, Clone, Default)]
pub struct AppearanceState {
    /// `None` renders with device defaults
    pub rendering_attributes: Option<RenderingAttributes>,
    /// The rendering attributes are rewritten every frame
    pub frequent_attributes: bool,
    pub shader: Option<ShaderId>,
    /// Texture units in order
    pub textures: Vec<TextureId>,
}

impl AppearanceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rendering_attributes(mut self, attributes: RenderingAttributes) -> Self {
        self.rendering_attributes = Some(attributes);
        self
    }

    pub fn with_frequent_attributes(mut self, frequent: bool) -> Self {
        self.frequent_attributes = frequent;
        self
    }

    pub fn with_shader(mut self, shader: ShaderId) -> Self {
        self.shader = Some(shader);
        self
    }

    pub fn with_textures(mut self, textures: Vec<TextureId>) -> Self {
        self.textures = textures;
        self
    }

    pub fn into_ref(self) -> Appearance {
        Shared::new(self)
    }
}
