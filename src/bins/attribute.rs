//! Attribute sets: content of one environment sharing a rendering
//! attribute bundle
//!
//! Bundles are normally shared by structural value. A bundle flagged as
//! changing every frame is never shared by value: its set follows exactly
//! one appearance. Pinned (sole-user) sets read the bundle straight from
//! the appearance when they bind, so edits never clone it. Tracked sets
//! keep a snapshot and compare it against the appearance on every drain.

use super::list::{impl_linked, Bucket, Links, NodeState};
use super::{AttrHandle, EnvHandle, ShaderSet};
use crate::backend::Pipeline;
use crate::scene::{Appearance, RenderingAttributes};
use crate::surface::{DeviceStateCache, DirtyFlags};

/// Where an attribute set takes its bundle from
#[derive(Debug, Clone)]
pub enum AttributeSource {
    /// Private snapshot, shared by value with equivalent candidates
    Owned,
    /// Pinned 1:1 to one appearance whose bundle changes every frame
    SoleUser(Appearance),
    /// Snapshot of one frequently changing appearance, revalidated every
    /// frame
    Tracked(Appearance),
}

#[derive(Debug)]
pub struct AttributeSet {
    links: Links<AttributeSet>,
    state: NodeState,
    environment: EnvHandle,
    source: AttributeSource,
    /// Snapshot used for matching and binding; unused in sole-user mode
    attributes: Option<RenderingAttributes>,
    ignore_vertex_colors: bool,
    /// Bumped whenever the bound bundle may differ from what a surface saw
    version: u64,
    shader_sets: Bucket<ShaderSet>,
}

impl_linked!(AttributeSet);

impl AttributeSet {
    pub(crate) fn new(environment: EnvHandle, source: AttributeSource, appearance: &Appearance) -> Self {
        let attributes = match source {
            AttributeSource::SoleUser(_) => None,
            _ => appearance.read().rendering_attributes.clone(),
        };
        let mut set = Self {
            links: Links::default(),
            state: NodeState::Pending,
            environment,
            source,
            attributes,
            ignore_vertex_colors: false,
            version: 0,
            shader_sets: Bucket::new(),
        };
        set.ignore_vertex_colors = set.resolve_ignore_vertex_colors();
        set
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn environment(&self) -> EnvHandle {
        self.environment
    }

    pub fn source(&self) -> &AttributeSource {
        &self.source
    }

    pub fn is_sole_user(&self) -> bool {
        matches!(self.source, AttributeSource::SoleUser(_))
    }

    /// Appearance followed in sole-user or tracked mode
    pub fn appearance(&self) -> Option<&Appearance> {
        match &self.source {
            AttributeSource::Owned => None,
            AttributeSource::SoleUser(app) | AttributeSource::Tracked(app) => Some(app),
        }
    }

    /// Current bundle. Sole-user sets read it from their appearance.
    pub fn attributes(&self) -> Option<RenderingAttributes> {
        match &self.source {
            AttributeSource::SoleUser(app) => app.read().rendering_attributes.clone(),
            _ => self.attributes.clone(),
        }
    }

    pub fn ignore_vertex_colors(&self) -> bool {
        self.ignore_vertex_colors
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_visible(&self) -> bool {
        match &self.source {
            AttributeSource::SoleUser(app) => app
                .read()
                .rendering_attributes
                .as_ref()
                .map_or(true, |a| a.visible),
            _ => self.attributes.as_ref().map_or(true, |a| a.visible),
        }
    }

    pub fn shader_sets(&self) -> &Bucket<ShaderSet> {
        &self.shader_sets
    }

    pub(crate) fn shader_sets_mut(&mut self) -> &mut Bucket<ShaderSet> {
        &mut self.shader_sets
    }

    /// Sharing policy.
    ///
    /// A frequently changing candidate only matches the set that follows
    /// its own appearance. Everything else matches owned sets by
    /// structural value.
    pub fn matches(&self, appearance: &Appearance) -> bool {
        let state = appearance.read();
        match &self.source {
            AttributeSource::SoleUser(app) | AttributeSource::Tracked(app) => {
                state.frequent_attributes && app == appearance
            }
            AttributeSource::Owned => {
                !state.frequent_attributes
                    && match (&self.attributes, &state.rendering_attributes) {
                        (Some(ours), Some(theirs)) => ours.equivalent(theirs),
                        (None, None) => true,
                        _ => false,
                    }
            }
        }
    }

    /// Pick up a change to the followed appearance. Returns whether the
    /// bound bundle may have changed.
    pub(crate) fn refresh(&mut self) -> bool {
        let changed = match &self.source {
            AttributeSource::Owned => false,
            AttributeSource::SoleUser(_) => true,
            AttributeSource::Tracked(app) => {
                let current = app.read().rendering_attributes.clone();
                if current != self.attributes {
                    self.attributes = current;
                    true
                } else {
                    false
                }
            }
        };
        if changed {
            self.ignore_vertex_colors = self.resolve_ignore_vertex_colors();
            self.version += 1;
        }
        changed
    }

    fn resolve_ignore_vertex_colors(&self) -> bool {
        match &self.source {
            AttributeSource::SoleUser(app) => app
                .read()
                .rendering_attributes
                .as_ref()
                .map_or(false, |a| a.ignore_vertex_colors),
            _ => self
                .attributes
                .as_ref()
                .map_or(false, |a| a.ignore_vertex_colors),
        }
    }

    /// Bind this bundle unless the surface already has this set bound at
    /// the current version.
    pub(crate) fn update_attributes<P: Pipeline>(
        &self,
        handle: AttrHandle,
        cache: &mut DeviceStateCache,
        pipeline: &mut P,
    ) -> usize {
        if cache.attribute_set == Some(handle)
            && cache.attribute_version == self.version
            && !cache.dirty.contains(DirtyFlags::RENDERING_ATTRIBUTES)
        {
            return 0;
        }

        match &self.source {
            AttributeSource::SoleUser(app) => {
                let state = app.read();
                self.apply(state.rendering_attributes.as_ref(), pipeline);
            }
            _ => self.apply(self.attributes.as_ref(), pipeline),
        }

        cache.attribute_set = Some(handle);
        cache.attribute_version = self.version;
        cache.dirty.remove(DirtyFlags::RENDERING_ATTRIBUTES);
        1
    }

    fn apply<P: Pipeline>(&self, attributes: Option<&RenderingAttributes>, pipeline: &mut P) {
        match attributes {
            Some(attributes) => pipeline.set_rendering_attributes(attributes),
            None => pipeline.reset_rendering_attributes(self.ignore_vertex_colors),
        }
    }
}
