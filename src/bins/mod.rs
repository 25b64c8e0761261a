//! Render bins
//!
//! Compiled content is bucketed by shared device state:
//!
//! ```text
//! LightBin -> EnvironmentSet -> AttributeSet -> ShaderSet -> TextureSet -> RenderAtom
//! ```
//!
//! Producers match or create buckets top-down. New buckets are staged on
//! their parent and only become visible to traversal after
//! [`RenderBins::drain_pending_updates`]. Removals take effect immediately,
//! cascade upward through emptied parents and reset any surface cache that
//! still names a removed bucket.

pub mod arena;
pub mod attribute;
pub mod environment;
pub mod light_bin;
pub mod list;
pub mod shader;
pub mod slots;
pub mod texture;
pub mod update;

pub use arena::{Arena, Handle};
pub use attribute::{AttributeSet, AttributeSource};
pub use environment::{EnvironmentSet, LightSelection};
pub use light_bin::LightBin;
pub use list::{Bucket, NodeState};
pub use shader::ShaderSet;
pub use slots::LightSlots;
pub use texture::{RenderAtom, TextureSet};
pub use update::Notification;

use std::collections::HashMap;

use crate::backend::{GeometryId, Pipeline, ShaderId, TextureId};
use crate::config::{BinPlacement, RendererConfig};
use crate::error::{BinError, BinResult};
use crate::scene::{Appearance, FogRef, LightRef, ModelClipRef, RenderItem};
use crate::surface::{DirtyFlags, SurfaceRegistry, SurfaceState};
use list::Linked;
use update::UpdateQueue;

pub type BinHandle = Handle<LightBin>;
pub type EnvHandle = Handle<EnvironmentSet>;
pub type AttrHandle = Handle<AttributeSet>;
pub type ShaderHandle = Handle<ShaderSet>;
pub type TextureHandle = Handle<TextureSet>;
pub type AtomHandle = Handle<RenderAtom>;

/// Work done by one traversal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub bins: usize,
    pub environments: usize,
    pub attribute_sets: usize,
    pub shader_sets: usize,
    pub texture_sets: usize,
    pub draws: usize,
    /// Pipeline calls other than draws
    pub state_calls: usize,
}

/// Work done by one drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    /// Pending buckets and atoms linked into their parents
    pub committed: usize,
    pub notifications: usize,
}

/// Atoms bucketed for one appearance, re-bucketed when it changes
#[derive(Debug)]
struct AppearanceAtoms {
    appearance: Appearance,
    atoms: Vec<AtomHandle>,
}

fn node_state<T: Linked>(arena: &Arena<T>, handle: Handle<T>) -> NodeState {
    arena
        .get(handle)
        .map_or(NodeState::Removed, |node| Linked::state(node))
}

/// Root of the bucket chain and the render schedule.
#[derive(Debug)]
pub struct RenderBins {
    config: RendererConfig,
    bins: Arena<LightBin>,
    environments: Arena<EnvironmentSet>,
    attribute_sets: Arena<AttributeSet>,
    shader_sets: Arena<ShaderSet>,
    texture_sets: Arena<TextureSet>,
    atoms: Arena<RenderAtom>,
    root: Bucket<LightBin>,
    /// Bins in creation order, the placement search order
    bin_order: Vec<BinHandle>,
    /// Environments listing each light, keyed by light identity
    light_users: HashMap<u64, Vec<EnvHandle>>,
    /// Attribute sets following each appearance, keyed by identity
    appearance_users: HashMap<u64, Vec<AttrHandle>>,
    /// Attribute sets revalidated on every drain
    tracked: Vec<AttrHandle>,
    /// Atoms inserted through [`RenderBins::insert`], keyed by appearance
    /// identity
    appearance_atoms: HashMap<u64, AppearanceAtoms>,
    updates: UpdateQueue,
    surfaces: SurfaceRegistry,
}

impl RenderBins {
    pub fn new(config: RendererConfig) -> BinResult<Self> {
        config.validate()?;
        log::info!(
            "Render bins: {} light slots, {:?} placement",
            config.max_lights,
            config.placement
        );
        Ok(Self {
            config,
            bins: Arena::new(),
            environments: Arena::new(),
            attribute_sets: Arena::new(),
            shader_sets: Arena::new(),
            texture_sets: Arena::new(),
            atoms: Arena::new(),
            root: Bucket::new(),
            bin_order: Vec::new(),
            light_users: HashMap::new(),
            appearance_users: HashMap::new(),
            tracked: Vec::new(),
            appearance_atoms: HashMap::new(),
            updates: UpdateQueue::default(),
            surfaces: SurfaceRegistry::default(),
        })
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Track `surface` so removals can invalidate its cache and drains can
    /// forward dirty light slots to it. Surfaces are held weakly.
    pub fn register_surface(&mut self, surface: &SurfaceState) {
        self.surfaces.register(surface);
    }

    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    // ---- matching and insertion ----

    fn check_capacity(&self, selection: &LightSelection) -> BinResult<()> {
        let required = selection.lights().len();
        if required > self.config.max_lights {
            log::warn!(
                "Light combination needs {} slots but only {} exist",
                required,
                self.config.max_lights
            );
            return Err(BinError::CapacityExceeded {
                required,
                max_lights: self.config.max_lights,
            });
        }
        Ok(())
    }

    fn find_environment(
        &self,
        bin: BinHandle,
        selection: &LightSelection,
        fog: Option<&FogRef>,
        clip: Option<&ModelClipRef>,
    ) -> Option<EnvHandle> {
        self.bins
            .get(bin)?
            .environments()
            .iter_all(&self.environments)
            .find(|(_, env)| env.matches(selection, fog, clip))
            .map(|(handle, _)| handle)
    }

    /// Pick the bin an environment with these lights belongs in.
    ///
    /// A bin already holding an equal environment wins. Otherwise the
    /// configured placement chooses among bins with room, and a new bin is
    /// created when none has room.
    pub fn match_or_create_bin(
        &mut self,
        lights: &[LightRef],
        fog: Option<&FogRef>,
        clip: Option<&ModelClipRef>,
    ) -> BinResult<BinHandle> {
        let selection = LightSelection::new(lights);
        self.check_capacity(&selection)?;

        if let Some(&bin) = self
            .bin_order
            .iter()
            .find(|&&bin| self.find_environment(bin, &selection, fog, clip).is_some())
        {
            return Ok(bin);
        }

        let fits = |bin: &BinHandle| {
            self.bins
                .get(*bin)
                .map(|b| (*bin, b.can_fit(selection.lights()), b))
        };
        let candidate = match self.config.placement {
            BinPlacement::FirstFit => self
                .bin_order
                .iter()
                .filter_map(fits)
                .find(|(_, can_fit, _)| *can_fit)
                .map(|(handle, _, _)| handle),
            BinPlacement::BestFit => self
                .bin_order
                .iter()
                .filter_map(fits)
                .filter(|(_, can_fit, _)| *can_fit)
                .min_by_key(|(_, _, bin)| bin.slots().slots_needed(selection.lights()))
                .map(|(handle, _, _)| handle),
        };

        match candidate {
            Some(bin) => Ok(bin),
            None => Ok(self.create_bin()),
        }
    }

    fn create_bin(&mut self) -> BinHandle {
        let handle = self.bins.insert(LightBin::new(self.config.max_lights));
        self.root.stage(&mut self.bins, handle);
        self.bin_order.push(handle);
        self.updates.mark_root();
        log::debug!("Created light bin {:?}", handle);
        handle
    }

    /// Find the environment in `bin` equal to the request, or reserve slots
    /// and stage a new one.
    ///
    /// Fails with [`BinError::BinFull`] when `bin` cannot host the lights.
    pub fn match_or_create_environment(
        &mut self,
        bin: BinHandle,
        lights: &[LightRef],
        fog: Option<&FogRef>,
        clip: Option<&ModelClipRef>,
    ) -> BinResult<EnvHandle> {
        let selection = LightSelection::new(lights);
        self.check_capacity(&selection)?;
        if let Some(env) = self.find_environment(bin, &selection, fog, clip) {
            return Ok(env);
        }

        let light_bin = self
            .bins
            .get_mut(bin)
            .ok_or(BinError::InvalidHandle("bin"))?;
        let positions = light_bin.slots_mut().commit(selection.lights())?;
        let members: Vec<u64> = selection
            .lights()
            .iter()
            .chain(selection.ambient())
            .map(|light| light.id())
            .collect();

        let env = self.environments.insert(EnvironmentSet::new(
            bin,
            selection,
            positions,
            fog.cloned(),
            clip.cloned(),
        ));
        light_bin.environments_mut().stage(&mut self.environments, env);
        for id in members {
            self.light_users.entry(id).or_default().push(env);
        }
        self.updates.mark_bin(bin);
        log::debug!("Created environment {:?} in bin {:?}", env, bin);
        Ok(env)
    }

    /// Find or stage the attribute set for `appearance` under `env`.
    ///
    /// A frequently changing bundle gets a set of its own, pinned or
    /// tracked depending on the configuration.
    pub fn match_or_create_attribute_set(
        &mut self,
        env: EnvHandle,
        appearance: &Appearance,
    ) -> BinResult<AttrHandle> {
        let pin = self.config.pin_frequent_attributes;
        let environment = self
            .environments
            .get_mut(env)
            .ok_or(BinError::InvalidHandle("environment"))?;
        if let Some((attr, _)) = environment
            .attribute_sets()
            .iter_all(&self.attribute_sets)
            .find(|(_, set)| set.matches(appearance))
        {
            return Ok(attr);
        }
        let frequent = appearance.read().frequent_attributes;

        let source = match (frequent, pin) {
            (true, true) => AttributeSource::SoleUser(appearance.clone()),
            (true, false) => AttributeSource::Tracked(appearance.clone()),
            (false, _) => AttributeSource::Owned,
        };
        let tracked = matches!(source, AttributeSource::Tracked(_));
        let attr = self
            .attribute_sets
            .insert(AttributeSet::new(env, source, appearance));
        environment
            .attribute_sets_mut()
            .stage(&mut self.attribute_sets, attr);
        if frequent {
            self.appearance_users
                .entry(appearance.id())
                .or_default()
                .push(attr);
        }
        if tracked {
            self.tracked.push(attr);
        }
        self.updates.mark_environment(env);
        Ok(attr)
    }

    pub fn match_or_create_shader_set(
        &mut self,
        attr: AttrHandle,
        shader: Option<ShaderId>,
    ) -> BinResult<ShaderHandle> {
        let attribute_set = self
            .attribute_sets
            .get_mut(attr)
            .ok_or(BinError::InvalidHandle("attribute set"))?;
        if let Some((handle, _)) = attribute_set
            .shader_sets()
            .iter_all(&self.shader_sets)
            .find(|(_, set)| set.shader() == shader)
        {
            return Ok(handle);
        }

        let handle = self.shader_sets.insert(ShaderSet::new(attr, shader));
        attribute_set
            .shader_sets_mut()
            .stage(&mut self.shader_sets, handle);
        self.updates.mark_attribute_set(attr);
        Ok(handle)
    }

    pub fn match_or_create_texture_set(
        &mut self,
        shader_set: ShaderHandle,
        textures: &[TextureId],
    ) -> BinResult<TextureHandle> {
        let parent = self
            .shader_sets
            .get_mut(shader_set)
            .ok_or(BinError::InvalidHandle("shader set"))?;
        if let Some((handle, _)) = parent
            .texture_sets()
            .iter_all(&self.texture_sets)
            .find(|(_, set)| set.textures() == textures)
        {
            return Ok(handle);
        }

        let handle = self
            .texture_sets
            .insert(TextureSet::new(shader_set, textures.to_vec()));
        parent
            .texture_sets_mut()
            .stage(&mut self.texture_sets, handle);
        self.updates.mark_shader_set(shader_set);
        Ok(handle)
    }

    /// Stage one draw of `geometry` under `texture_set`
    pub fn add_geometry(
        &mut self,
        texture_set: TextureHandle,
        geometry: GeometryId,
    ) -> BinResult<AtomHandle> {
        let parent = self
            .texture_sets
            .get_mut(texture_set)
            .ok_or(BinError::InvalidHandle("texture set"))?;
        let atom = self.atoms.insert(RenderAtom::new(texture_set, geometry));
        parent.atoms_mut().stage(&mut self.atoms, atom);
        self.updates.mark_texture_set(texture_set);
        Ok(atom)
    }

    /// Bucket one compiled item through the whole chain.
    pub fn insert(&mut self, item: &RenderItem) -> BinResult<AtomHandle> {
        let fog = item.fog.as_ref();
        let clip = item.clip.as_ref();
        let bin = self.match_or_create_bin(&item.lights, fog, clip)?;
        let env = self.match_or_create_environment(bin, &item.lights, fog, clip)?;
        let attr = self.match_or_create_attribute_set(env, &item.appearance)?;
        let (shader, textures) = {
            let appearance = item.appearance.read();
            (appearance.shader, appearance.textures.clone())
        };
        let shader_set = self.match_or_create_shader_set(attr, shader)?;
        let texture_set = self.match_or_create_texture_set(shader_set, &textures)?;
        let atom = self.add_geometry(texture_set, item.geometry)?;

        let id = item.appearance.id();
        if let Some(node) = self.atoms.get_mut(atom) {
            node.set_appearance(id);
        }
        self.appearance_atoms
            .entry(id)
            .or_insert_with(|| AppearanceAtoms {
                appearance: item.appearance.clone(),
                atoms: Vec::new(),
            })
            .atoms
            .push(atom);
        Ok(atom)
    }

    /// Move every atom of `appearance` whose chain no longer matches the
    /// appearance's bundle, shader or textures. Handles stay valid.
    fn rebucket_atoms(&mut self, appearance: &Appearance) -> usize {
        let Some(atoms) = self
            .appearance_atoms
            .get(&appearance.id())
            .map(|entry| entry.atoms.clone())
        else {
            log::debug!(
                "Appearance {} changed but no inserted atom uses it",
                appearance.id()
            );
            return 0;
        };
        let (shader, textures) = {
            let state = appearance.read();
            (state.shader, state.textures.clone())
        };

        let mut moved = 0;
        for atom in atoms {
            match self.rebucket_atom(atom, appearance, shader, &textures) {
                Ok(true) => moved += 1,
                Ok(false) => {}
                Err(err) => log::error!("Cannot re-bucket atom {:?}: {}", atom, err),
            }
        }
        if moved > 0 {
            log::debug!("Moved {} atoms of appearance {}", moved, appearance.id());
        }
        moved
    }

    fn rebucket_atom(
        &mut self,
        atom: AtomHandle,
        appearance: &Appearance,
        shader: Option<ShaderId>,
        textures: &[TextureId],
    ) -> BinResult<bool> {
        let old_textures = self
            .atoms
            .get(atom)
            .ok_or(BinError::InvalidHandle("render atom"))?
            .texture_set();
        let texture_set = self
            .texture_sets
            .get(old_textures)
            .ok_or(BinError::InvalidHandle("texture set"))?;
        let shader_set = self
            .shader_sets
            .get(texture_set.shader_set())
            .ok_or(BinError::InvalidHandle("shader set"))?;
        let attribute_set = self
            .attribute_sets
            .get(shader_set.attribute_set())
            .ok_or(BinError::InvalidHandle("attribute set"))?;
        if attribute_set.matches(appearance)
            && shader_set.shader() == shader
            && texture_set.textures() == textures
        {
            return Ok(false);
        }
        let env = attribute_set.environment();

        // build the new chain first so the environment never empties
        let attr = self.match_or_create_attribute_set(env, appearance)?;
        let shader_set = self.match_or_create_shader_set(attr, shader)?;
        let new_textures = self.match_or_create_texture_set(shader_set, textures)?;

        if let Some(parent) = self.texture_sets.get_mut(old_textures) {
            parent.atoms_mut().detach(&mut self.atoms, atom);
        }
        if let Some(node) = self.atoms.get_mut(atom) {
            node.set_texture_set(new_textures);
        }
        if let Some(parent) = self.texture_sets.get_mut(new_textures) {
            parent.atoms_mut().stage(&mut self.atoms, atom);
        }
        self.updates.mark_texture_set(new_textures);
        self.cascade_texture_set(old_textures);
        Ok(true)
    }

    fn forget_atom(&mut self, atom: AtomHandle) {
        let Some(id) = self.atoms.get(atom).and_then(|node| node.appearance()) else {
            return;
        };
        if let Some(entry) = self.appearance_atoms.get_mut(&id) {
            entry.atoms.retain(|handle| *handle != atom);
            if entry.atoms.is_empty() {
                self.appearance_atoms.remove(&id);
            }
        }
    }

    // ---- removal ----

    fn destroy_atom(&mut self, atom: AtomHandle) -> Option<TextureHandle> {
        let parent = self.atoms.get(atom)?.texture_set();
        if let Some(texture_set) = self.texture_sets.get_mut(parent) {
            texture_set.atoms_mut().detach(&mut self.atoms, atom);
        }
        self.forget_atom(atom);
        self.atoms.remove(atom);
        Some(parent)
    }

    fn destroy_texture_set(&mut self, handle: TextureHandle) -> Option<ShaderHandle> {
        let texture_set = self.texture_sets.get(handle)?;
        let parent = texture_set.shader_set();
        for atom in texture_set.atoms().all_handles(&self.atoms) {
            self.forget_atom(atom);
            self.atoms.remove(atom);
        }
        if let Some(shader_set) = self.shader_sets.get_mut(parent) {
            shader_set
                .texture_sets_mut()
                .detach(&mut self.texture_sets, handle);
        }
        self.texture_sets.remove(handle);
        self.surfaces.for_each(|cache| {
            if cache.texture_set == Some(handle) {
                cache.texture_set = None;
            }
        });
        Some(parent)
    }

    fn destroy_shader_set(&mut self, handle: ShaderHandle) -> Option<AttrHandle> {
        let shader_set = self.shader_sets.get(handle)?;
        let parent = shader_set.attribute_set();
        for texture_set in shader_set.texture_sets().all_handles(&self.texture_sets) {
            self.destroy_texture_set(texture_set);
        }
        if let Some(attribute_set) = self.attribute_sets.get_mut(parent) {
            attribute_set
                .shader_sets_mut()
                .detach(&mut self.shader_sets, handle);
        }
        self.shader_sets.remove(handle);
        self.surfaces.for_each(|cache| {
            if cache.shader_set == Some(handle) {
                cache.shader_set = None;
            }
        });
        Some(parent)
    }

    fn destroy_attribute_set(&mut self, handle: AttrHandle) -> Option<EnvHandle> {
        let attribute_set = self.attribute_sets.get(handle)?;
        let parent = attribute_set.environment();
        for shader_set in attribute_set.shader_sets().all_handles(&self.shader_sets) {
            self.destroy_shader_set(shader_set);
        }
        if let Some(env) = self.environments.get_mut(parent) {
            env.attribute_sets_mut()
                .detach(&mut self.attribute_sets, handle);
        }
        self.appearance_users.retain(|_, users| {
            users.retain(|user| *user != handle);
            !users.is_empty()
        });
        self.tracked.retain(|tracked| *tracked != handle);
        self.attribute_sets.remove(handle);
        self.surfaces.for_each(|cache| {
            if cache.attribute_set == Some(handle) {
                cache.attribute_set = None;
            }
        });
        Some(parent)
    }

    fn destroy_environment(&mut self, handle: EnvHandle) -> Option<BinHandle> {
        let env = self.environments.get(handle)?;
        let bin = env.bin();
        let lights = env.lights().to_vec();
        let positions = env.positions().to_vec();
        let members: Vec<u64> = env
            .lights()
            .iter()
            .chain(env.ambient_lights())
            .map(|light| light.id())
            .collect();
        for attribute_set in env.attribute_sets().all_handles(&self.attribute_sets) {
            self.destroy_attribute_set(attribute_set);
        }

        if let Some(light_bin) = self.bins.get_mut(bin) {
            let freed = light_bin.slots_mut().release(&lights, &positions);
            light_bin
                .environments_mut()
                .detach(&mut self.environments, handle);
            if freed != 0 {
                // a freed index may hold a different light next frame
                self.surfaces.for_each(|cache| {
                    if cache.bin == Some(bin) {
                        cache.slot_dirty &= !freed;
                    }
                });
            }
        }
        for id in members {
            if let Some(users) = self.light_users.get_mut(&id) {
                users.retain(|user| *user != handle);
                if users.is_empty() {
                    self.light_users.remove(&id);
                }
            }
        }

        self.environments.remove(handle);
        self.surfaces.for_each(|cache| {
            if cache.environment == Some(handle) {
                cache.environment = None;
            }
        });
        log::debug!("Removed environment {:?} from bin {:?}", handle, bin);
        Some(bin)
    }

    fn destroy_bin(&mut self, handle: BinHandle) -> bool {
        let Some(bin) = self.bins.get(handle) else {
            return false;
        };
        for env in bin.environments().all_handles(&self.environments) {
            self.destroy_environment(env);
        }
        self.root.detach(&mut self.bins, handle);
        self.bins.remove(handle);
        self.bin_order.retain(|bin| *bin != handle);
        self.surfaces.for_each(|cache| {
            if cache.bin == Some(handle) {
                cache.bin = None;
                cache.slot_dirty = 0;
            }
        });
        log::debug!("Removed light bin {:?}", handle);
        true
    }

    fn cascade_texture_set(&mut self, handle: TextureHandle) {
        let empty = self
            .texture_sets
            .get(handle)
            .map_or(false, |set| set.atoms().is_empty());
        if empty {
            if let Some(parent) = self.destroy_texture_set(handle) {
                self.cascade_shader_set(parent);
            }
        }
    }

    fn cascade_shader_set(&mut self, handle: ShaderHandle) {
        let empty = self
            .shader_sets
            .get(handle)
            .map_or(false, |set| set.texture_sets().is_empty());
        if empty {
            if let Some(parent) = self.destroy_shader_set(handle) {
                self.cascade_attribute_set(parent);
            }
        }
    }

    fn cascade_attribute_set(&mut self, handle: AttrHandle) {
        let empty = self
            .attribute_sets
            .get(handle)
            .map_or(false, |set| set.shader_sets().is_empty());
        if empty {
            if let Some(parent) = self.destroy_attribute_set(handle) {
                self.cascade_environment(parent);
            }
        }
    }

    fn cascade_environment(&mut self, handle: EnvHandle) {
        let empty = self
            .environments
            .get(handle)
            .map_or(false, |env| env.attribute_sets().is_empty());
        if empty {
            if let Some(bin) = self.destroy_environment(handle) {
                self.cascade_bin(bin);
            }
        }
    }

    fn cascade_bin(&mut self, handle: BinHandle) {
        let empty = self
            .bins
            .get(handle)
            .map_or(false, |bin| bin.environments().is_empty());
        if empty {
            self.destroy_bin(handle);
        }
    }

    /// Remove one draw. Emptied parents are removed up to the root.
    pub fn remove_atom(&mut self, atom: AtomHandle) -> BinResult<()> {
        let parent = self
            .destroy_atom(atom)
            .ok_or(BinError::InvalidHandle("render atom"))?;
        self.cascade_texture_set(parent);
        Ok(())
    }

    pub fn remove_texture_set(&mut self, handle: TextureHandle) -> BinResult<()> {
        let parent = self
            .destroy_texture_set(handle)
            .ok_or(BinError::InvalidHandle("texture set"))?;
        self.cascade_shader_set(parent);
        Ok(())
    }

    pub fn remove_shader_set(&mut self, handle: ShaderHandle) -> BinResult<()> {
        let parent = self
            .destroy_shader_set(handle)
            .ok_or(BinError::InvalidHandle("shader set"))?;
        self.cascade_attribute_set(parent);
        Ok(())
    }

    /// Remove an attribute set with everything below it. Removing the last
    /// one of an environment removes the environment too.
    pub fn remove_attribute_set(&mut self, handle: AttrHandle) -> BinResult<()> {
        let parent = self
            .destroy_attribute_set(handle)
            .ok_or(BinError::InvalidHandle("attribute set"))?;
        self.cascade_environment(parent);
        Ok(())
    }

    /// Remove an environment, releasing its light slots. Removing the last
    /// environment of a bin removes the bin from the schedule.
    pub fn remove_environment(&mut self, handle: EnvHandle) -> BinResult<()> {
        let bin = self
            .destroy_environment(handle)
            .ok_or(BinError::InvalidHandle("environment"))?;
        self.cascade_bin(bin);
        Ok(())
    }

    pub fn remove_bin(&mut self, handle: BinHandle) -> BinResult<()> {
        if self.destroy_bin(handle) {
            Ok(())
        } else {
            Err(BinError::InvalidHandle("bin"))
        }
    }

    // ---- change notifications ----

    pub fn notify_light_on_off_changed(&mut self, light: &LightRef) {
        self.updates.notify(Notification::LightOnOff(light.clone()));
    }

    pub fn notify_ambient_color_changed(&mut self, light: &LightRef) {
        self.updates.notify(Notification::AmbientColor(light.clone()));
    }

    /// Color, position, direction or attenuation of a light changed
    pub fn notify_light_changed(&mut self, light: &LightRef) {
        self.updates.notify(Notification::LightChanged(light.clone()));
    }

    pub fn notify_fog_changed(&mut self, fog: &FogRef) {
        self.updates.notify(Notification::FogChanged(fog.clone()));
    }

    pub fn notify_clip_changed(&mut self, clip: &ModelClipRef) {
        self.updates.notify(Notification::ClipChanged(clip.clone()));
    }

    /// The appearance's bundle, shader or textures changed. Sets following
    /// it pick up the new bundle and atoms inserted with it move to a
    /// matching chain on the next drain.
    pub fn notify_appearance_changed(&mut self, appearance: &Appearance) {
        self.updates
            .notify(Notification::AppearanceChanged(appearance.clone()));
    }

    fn apply_notification(&mut self, notification: Notification) {
        match notification {
            Notification::LightOnOff(light) => {
                let flag = if light.read().is_ambient() {
                    DirtyFlags::AMBIENT
                } else {
                    DirtyFlags::LIGHT_ENABLES
                };
                self.refresh_light_users(&light, flag);
            }
            Notification::AmbientColor(light) => {
                self.refresh_light_users(&light, DirtyFlags::AMBIENT);
            }
            Notification::LightChanged(light) => {
                if light.read().is_ambient() {
                    self.refresh_light_users(&light, DirtyFlags::AMBIENT);
                    return;
                }
                let Some(users) = self.light_users.get(&light.id()) else {
                    return;
                };
                for &env in users {
                    let Some(bin) = self.environments.get(env).map(|e| e.bin()) else {
                        continue;
                    };
                    if let Some(light_bin) = self.bins.get_mut(bin) {
                        light_bin.slots_mut().mark_light_dirty(&light);
                    }
                }
            }
            Notification::FogChanged(fog) => {
                let id = fog.id();
                self.surfaces.for_each(|cache| {
                    if cache.fog == Some(id) {
                        cache.dirty |= DirtyFlags::FOG;
                    }
                });
            }
            Notification::ClipChanged(clip) => {
                let id = clip.id();
                self.surfaces.for_each(|cache| {
                    if cache.clip == Some(id) {
                        cache.dirty |= DirtyFlags::MODEL_CLIP;
                    }
                });
            }
            Notification::AppearanceChanged(appearance) => {
                if let Some(users) = self.appearance_users.get(&appearance.id()) {
                    for &attr in users {
                        if let Some(set) = self.attribute_sets.get_mut(attr) {
                            set.refresh();
                        }
                    }
                }
                self.rebucket_atoms(&appearance);
            }
        }
    }

    /// Recompute the enable mask or ambient color of every environment
    /// listing `light`, and force surfaces still bound to a changed one to
    /// reapply it.
    fn refresh_light_users(&mut self, light: &LightRef, flag: DirtyFlags) {
        let Some(users) = self.light_users.get(&light.id()) else {
            return;
        };
        let mut changed = Vec::new();
        for &env in users {
            let Some(set) = self.environments.get_mut(env) else {
                continue;
            };
            let did_change = if flag == DirtyFlags::AMBIENT {
                set.recompute_ambient()
            } else {
                set.recompute_enable_mask()
            };
            if did_change {
                changed.push(env);
            }
        }
        if changed.is_empty() {
            return;
        }
        self.surfaces.for_each(|cache| {
            if cache.environment.map_or(false, |env| changed.contains(&env)) {
                cache.dirty |= flag;
            }
        });
    }

    // ---- per-frame driver ----

    /// Apply queued notifications and link every pending bucket into its
    /// parent, parents first. Call exactly once per frame, before any
    /// traversal.
    pub fn drain_pending_updates(&mut self) -> DrainStats {
        let notifications = std::mem::take(&mut self.updates.notifications);
        let notification_count = notifications.len();
        for notification in notifications {
            self.apply_notification(notification);
        }

        for &attr in &self.tracked {
            if let Some(set) = self.attribute_sets.get_mut(attr) {
                if set.refresh() {
                    log::trace!("Tracked attribute set {:?} changed", attr);
                }
            }
        }

        let mut committed = 0;
        if std::mem::take(&mut self.updates.root) {
            committed += self.root.commit(&mut self.bins);
        }
        for bin in self.updates.bins.take() {
            if let Some(bin) = self.bins.get_mut(bin) {
                committed += bin.environments_mut().commit(&mut self.environments);
            }
        }
        for env in self.updates.environments.take() {
            if let Some(env) = self.environments.get_mut(env) {
                committed += env.attribute_sets_mut().commit(&mut self.attribute_sets);
            }
        }
        for attr in self.updates.attribute_sets.take() {
            if let Some(attr) = self.attribute_sets.get_mut(attr) {
                committed += attr.shader_sets_mut().commit(&mut self.shader_sets);
            }
        }
        for shader in self.updates.shader_sets.take() {
            if let Some(shader) = self.shader_sets.get_mut(shader) {
                committed += shader.texture_sets_mut().commit(&mut self.texture_sets);
            }
        }
        for texture in self.updates.texture_sets.take() {
            if let Some(texture) = self.texture_sets.get_mut(texture) {
                committed += texture.atoms_mut().commit(&mut self.atoms);
            }
        }

        let mut slot_dirty = Vec::new();
        for &bin in &self.bin_order {
            if let Some(light_bin) = self.bins.get_mut(bin) {
                let dirty = light_bin.slots_mut().take_pending_dirty();
                if dirty != 0 {
                    slot_dirty.push((bin, dirty));
                }
            }
        }
        if !slot_dirty.is_empty() {
            self.surfaces.for_each(|cache| {
                for &(bin, dirty) in &slot_dirty {
                    if cache.bin == Some(bin) {
                        cache.slot_dirty |= dirty;
                    }
                }
            });
        }

        log::trace!(
            "Drained {} pending entries and {} notifications",
            committed,
            notification_count
        );
        DrainStats {
            committed,
            notifications: notification_count,
        }
    }

    /// Walk the live buckets and draw everything on `surface`, issuing
    /// only the state its cache says is missing.
    pub fn render_on_surface<P: Pipeline>(&self, surface: &SurfaceState, pipeline: &mut P) -> FrameStats {
        let mut guard = surface.lock();
        let cache = &mut *guard;
        let max_lights = self.config.max_lights;
        let mut stats = FrameStats::default();

        for (bin_handle, bin) in self.root.iter_live(&self.bins) {
            stats.bins += 1;
            stats.state_calls += bin.update_lights(bin_handle, cache, pipeline);

            for (env_handle, env) in bin.environments().iter_live(&self.environments) {
                stats.environments += 1;
                stats.state_calls += env.update_attributes(env_handle, cache, pipeline, max_lights);

                for (attr_handle, attr) in env.attribute_sets().iter_live(&self.attribute_sets) {
                    if !attr.is_visible() {
                        continue;
                    }
                    stats.attribute_sets += 1;
                    stats.state_calls += attr.update_attributes(attr_handle, cache, pipeline);

                    for (shader_handle, shader) in attr.shader_sets().iter_live(&self.shader_sets) {
                        stats.shader_sets += 1;
                        stats.state_calls += shader.bind(shader_handle, cache, pipeline);

                        for (texture_handle, textures) in
                            shader.texture_sets().iter_live(&self.texture_sets)
                        {
                            stats.texture_sets += 1;
                            stats.state_calls += textures.bind(texture_handle, cache, pipeline);

                            for (_, atom) in textures.atoms().iter_live(&self.atoms) {
                                pipeline.draw_geometry(atom.geometry());
                                stats.draws += 1;
                            }
                        }
                    }
                }
            }
        }

        log::trace!("Surface {}: {:?}", surface.id(), stats);
        stats
    }

    // ---- introspection ----

    /// Allocated bins, live or pending
    pub fn bin_count(&self) -> usize {
        self.bins.len()
    }

    pub fn environment_count(&self) -> usize {
        self.environments.len()
    }

    pub fn attribute_set_count(&self) -> usize {
        self.attribute_sets.len()
    }

    pub fn shader_set_count(&self) -> usize {
        self.shader_sets.len()
    }

    pub fn texture_set_count(&self) -> usize {
        self.texture_sets.len()
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    /// Bins in creation order
    pub fn bins(&self) -> &[BinHandle] {
        &self.bin_order
    }

    /// Bins visible to traversal
    pub fn live_bins(&self) -> Vec<BinHandle> {
        self.root.live().handles(&self.bins)
    }

    pub fn bin(&self, handle: BinHandle) -> Option<&LightBin> {
        self.bins.get(handle)
    }

    pub fn environment(&self, handle: EnvHandle) -> Option<&EnvironmentSet> {
        self.environments.get(handle)
    }

    pub fn attribute_set(&self, handle: AttrHandle) -> Option<&AttributeSet> {
        self.attribute_sets.get(handle)
    }

    pub fn shader_set(&self, handle: ShaderHandle) -> Option<&ShaderSet> {
        self.shader_sets.get(handle)
    }

    pub fn texture_set(&self, handle: TextureHandle) -> Option<&TextureSet> {
        self.texture_sets.get(handle)
    }

    pub fn atom(&self, handle: AtomHandle) -> Option<&RenderAtom> {
        self.atoms.get(handle)
    }

    pub fn bin_state(&self, handle: BinHandle) -> NodeState {
        node_state(&self.bins, handle)
    }

    pub fn environment_state(&self, handle: EnvHandle) -> NodeState {
        node_state(&self.environments, handle)
    }

    pub fn attribute_set_state(&self, handle: AttrHandle) -> NodeState {
        node_state(&self.attribute_sets, handle)
    }

    pub fn atom_state(&self, handle: AtomHandle) -> NodeState {
        node_state(&self.atoms, handle)
    }

    /// Queued containers and notifications not yet drained
    pub fn pending_update_count(&self) -> usize {
        self.updates.pending()
    }

    /// Check every bin's slots against the environments that use them: the
    /// free count plus occupied slots equals the slot count, and each
    /// occupied slot is referenced exactly once per environment listing its
    /// light.
    pub fn verify_slot_invariants(&self) -> BinResult<()> {
        if self.bin_order.len() != self.bins.len() {
            return Err(BinError::InvariantViolation(format!(
                "{} bins in placement order but {} allocated",
                self.bin_order.len(),
                self.bins.len()
            )));
        }

        for &handle in &self.bin_order {
            let bin = self.bins.get(handle).ok_or_else(|| {
                BinError::InvariantViolation(format!("bin {:?} is not allocated", handle))
            })?;
            let slots = bin.slots();
            slots
                .verify()
                .map_err(|msg| BinError::InvariantViolation(format!("bin {:?}: {}", handle, msg)))?;

            let mut expected = vec![0u32; slots.max_lights()];
            for (env_handle, env) in bin.environments().iter_all(&self.environments) {
                if env.bin() != handle {
                    return Err(BinError::InvariantViolation(format!(
                        "environment {:?} is listed in bin {:?} but points at {:?}",
                        env_handle,
                        handle,
                        env.bin()
                    )));
                }
                for (light, &slot) in env.lights().iter().zip(env.positions()) {
                    if slots.light(slot) != Some(light) {
                        return Err(BinError::InvariantViolation(format!(
                            "environment {:?} expects light {} in slot {}",
                            env_handle,
                            light.id(),
                            slot
                        )));
                    }
                    expected[slot] += 1;
                }
            }

            for (slot, &count) in expected.iter().enumerate() {
                if slots.ref_count(slot) != count {
                    return Err(BinError::InvariantViolation(format!(
                        "bin {:?} slot {} has {} references but {} environments use it",
                        handle,
                        slot,
                        slots.ref_count(slot),
                        count
                    )));
                }
            }
        }
        Ok(())
    }
}
