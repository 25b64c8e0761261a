//! Integration tests for the render bins.
//!
//! # Test Categories
//!
//! - **Slot tests**: reservation, sharing and reclamation of light slots
//! - **Visibility tests**: staged inserts only appear after a drain
//! - **Removal tests**: upward cascades and cache invalidation
//! - **State diffing tests**: redundant device calls are skipped
//! - **Sharing tests**: attribute set sharing and sole-user mode

mod common;

use glam::{Mat4, Vec3};
use rstest::rstest;

use common::{
    ambient, appearance_with, bins_with_config, bins_with_surface, frequent_appearance, item,
    placement_config, plain_appearance, point_light, sun,
};
use render_bins::{
    BinError, BinPlacement, DummyPipeline, EnvHandle, Fog, GeometryId, LightRef, NodeState,
    PipelineCall, RenderBins, RendererConfig, RenderingAttributes, ShaderId,
};

fn env_of(bins: &mut RenderBins, lights: &[LightRef]) -> EnvHandle {
    let bin = bins.match_or_create_bin(lights, None, None).unwrap();
    bins.match_or_create_environment(bin, lights, None, None)
        .unwrap()
}

// ============================================================================
// Slot Tests
// ============================================================================

#[test]
fn test_light_toggle_and_release_scenario() {
    let (mut bins, _surface) = bins_with_surface(2);
    let l1 = point_light(0.0);
    let l2 = point_light(1.0);
    l2.update(|l| l.set_enabled(false));

    let bin = bins
        .match_or_create_bin(&[l1.clone(), l2.clone()], None, None)
        .unwrap();
    let a = bins
        .match_or_create_environment(bin, &[l1.clone(), l2.clone()], None, None)
        .unwrap();
    // a light-free environment keeps the bin alive once A is gone
    let b = bins.match_or_create_environment(bin, &[], None, None).unwrap();
    assert_ne!(a, b);

    assert_eq!(bins.bin(bin).unwrap().num_empty_slots(), 0);
    assert_eq!(bins.environment(a).unwrap().enable_mask(), 0b01);

    l2.update(|l| l.set_enabled(true));
    bins.notify_light_on_off_changed(&l2);
    assert_eq!(bins.environment(a).unwrap().enable_mask(), 0b01);
    bins.drain_pending_updates();
    assert_eq!(bins.environment(a).unwrap().enable_mask(), 0b11);

    bins.remove_environment(a).unwrap();
    assert_eq!(bins.bin(bin).unwrap().num_empty_slots(), 2);
    assert_eq!(bins.environment_state(a), NodeState::Removed);
    bins.verify_slot_invariants().unwrap();
}

#[test]
fn test_environments_share_resident_lights() {
    let (mut bins, _surface) = bins_with_surface(2);
    let (l1, l2) = (point_light(0.0), point_light(1.0));

    let first = env_of(&mut bins, &[l1.clone(), l2.clone()]);
    let second = env_of(&mut bins, &[l2.clone()]);
    assert_ne!(first, second);
    assert_eq!(bins.bin_count(), 1);

    let bin = bins.environment(first).unwrap().bin();
    let slot = bins.environment(second).unwrap().slot_of(&l2).unwrap();
    assert_eq!(bins.environment(first).unwrap().slot_of(&l2), Some(slot));
    assert_eq!(bins.bin(bin).unwrap().slots().ref_count(slot), 2);
    bins.verify_slot_invariants().unwrap();

    bins.remove_environment(first).unwrap();
    let slots = bins.bin(bin).unwrap().slots();
    assert_eq!(slots.ref_count(slot), 1);
    assert_eq!(slots.num_empty_slots(), 1);
    bins.verify_slot_invariants().unwrap();
}

#[test]
fn test_full_bin_spills_into_new_bin() {
    let (mut bins, _surface) = bins_with_surface(2);
    let first = bins
        .insert(&item(1, &plain_appearance(), &[point_light(0.0), point_light(1.0)]))
        .unwrap();
    let second = bins
        .insert(&item(2, &plain_appearance(), &[point_light(2.0)]))
        .unwrap();
    assert_ne!(first, second);
    assert_eq!(bins.bin_count(), 2);
    bins.verify_slot_invariants().unwrap();
}

#[test]
fn test_explicit_bin_without_room_is_full() {
    let (mut bins, _surface) = bins_with_surface(2);
    let lights = [point_light(0.0), point_light(1.0)];
    let bin = bins.match_or_create_bin(&lights, None, None).unwrap();
    bins.match_or_create_environment(bin, &lights, None, None)
        .unwrap();

    assert_eq!(
        bins.match_or_create_environment(bin, &[point_light(2.0)], None, None),
        Err(BinError::BinFull)
    );
    // resident lights need no room
    assert!(bins
        .match_or_create_environment(bin, &lights[..1], None, None)
        .is_ok());
}

#[rstest]
#[case::one_over(2, 3)]
#[case::far_over(1, 5)]
fn test_content_beyond_light_budget_is_reported(#[case] max_lights: usize, #[case] count: usize) {
    let (mut bins, _surface) = bins_with_surface(max_lights);
    let lights: Vec<LightRef> = (0..count).map(|i| point_light(i as f32)).collect();

    assert_eq!(
        bins.insert(&item(1, &plain_appearance(), &lights)),
        Err(BinError::CapacityExceeded {
            required: count,
            max_lights
        })
    );
    assert_eq!(bins.bin_count(), 0);
}

#[test]
fn test_ambient_lights_take_no_slots() {
    let (mut bins, _surface) = bins_with_surface(1);
    let lights = [point_light(0.0), ambient(0.1), ambient(0.2), ambient(0.3)];
    let env = env_of(&mut bins, &lights);

    let bin = bins.environment(env).unwrap().bin();
    assert_eq!(bins.bin(bin).unwrap().num_empty_slots(), 0);
    assert_eq!(bins.environment(env).unwrap().ambient_lights().len(), 3);
    assert!((bins.environment(env).unwrap().ambient() - Vec3::splat(0.6)).length() < 1e-6);
}

#[rstest]
#[case::single_slot(1)]
#[case::two_slots(2)]
#[case::four_slots(4)]
#[case::eight_slots(8)]
fn test_slot_invariant_under_churn(#[case] max_lights: usize) {
    let (mut bins, _surface) = bins_with_surface(max_lights);
    let pool: Vec<LightRef> = (0..6).map(|i| point_light(i as f32)).collect();
    let appearance = plain_appearance();

    let mut atoms = Vec::new();
    for i in 0..24usize {
        let count = 1 + i % max_lights;
        let lights: Vec<LightRef> = (0..count).map(|k| pool[(i + k) % pool.len()].clone()).collect();
        atoms.push(bins.insert(&item(i as u64, &appearance, &lights)).unwrap());
        bins.verify_slot_invariants().unwrap();
        if i % 5 == 0 {
            bins.drain_pending_updates();
        }
    }

    for atom in atoms.iter().step_by(2) {
        bins.remove_atom(*atom).unwrap();
        bins.verify_slot_invariants().unwrap();
    }
    bins.drain_pending_updates();
    for atom in atoms.iter().skip(1).step_by(2) {
        bins.remove_atom(*atom).unwrap();
        bins.verify_slot_invariants().unwrap();
    }

    assert_eq!(bins.bin_count(), 0);
    assert_eq!(bins.environment_count(), 0);
    assert_eq!(bins.atom_count(), 0);
}

// ============================================================================
// Placement Tests
// ============================================================================

#[rstest]
#[case::first_fit(BinPlacement::FirstFit, 0)]
#[case::best_fit(BinPlacement::BestFit, 1)]
fn test_placement_policy(#[case] placement: BinPlacement, #[case] expected_bin: usize) {
    let (mut bins, _surface) = bins_with_config(placement_config(3, placement));
    let pool: Vec<LightRef> = (0..5).map(|i| point_light(i as f32)).collect();

    // bin 0 keeps a light-free environment and ends up with 3 free slots
    let first = bins.match_or_create_bin(&[], None, None).unwrap();
    bins.match_or_create_environment(first, &[], None, None)
        .unwrap();
    let crowded = env_of(&mut bins, &pool[0..3]);
    assert_eq!(bins.environment(crowded).unwrap().bin(), first);

    // bin 1 holds pool[3] with 2 free slots
    let second_env = env_of(&mut bins, &pool[3..4]);
    let second = bins.environment(second_env).unwrap().bin();
    assert_ne!(first, second);
    bins.remove_environment(crowded).unwrap();

    let chosen = bins
        .match_or_create_bin(&[pool[3].clone(), pool[4].clone()], None, None)
        .unwrap();
    assert_eq!(chosen, bins.bins()[expected_bin]);
}

#[test]
fn test_bin_with_equal_environment_is_reused() {
    let (mut bins, _surface) = bins_with_surface(4);
    let (a, b, c) = (point_light(0.0), sun(), ambient(0.3));
    let fog = Fog::linear(Vec3::ONE, 1.0, 50.0).into_ref();

    let bin = bins
        .match_or_create_bin(&[a.clone(), b.clone(), c.clone()], Some(&fog), None)
        .unwrap();
    let env = bins
        .match_or_create_environment(bin, &[a.clone(), b.clone(), c.clone()], Some(&fog), None)
        .unwrap();

    let reordered = [c.clone(), a.clone(), b.clone(), a.clone()];
    assert_eq!(bins.match_or_create_bin(&reordered, Some(&fog), None), Ok(bin));
    assert_eq!(
        bins.match_or_create_environment(bin, &reordered, Some(&fog), None),
        Ok(env)
    );
    // a different fog is a different environment
    let other = bins
        .match_or_create_environment(bin, &reordered, None, None)
        .unwrap();
    assert_ne!(other, env);
    assert_eq!(bins.environment_count(), 2);
}

// ============================================================================
// Visibility Tests
// ============================================================================

#[test]
fn test_inserts_visible_only_after_drain() {
    let (mut bins, surface) = bins_with_surface(8);
    let atom = bins
        .insert(&item(7, &plain_appearance(), &[point_light(0.0)]))
        .unwrap();
    let mut pipeline = DummyPipeline::new();

    let stats = bins.render_on_surface(&surface, &mut pipeline);
    assert_eq!(stats.bins, 0);
    assert_eq!(stats.draws, 0);
    assert!(pipeline.calls().is_empty());
    assert_eq!(bins.atom_state(atom), NodeState::Pending);

    let drained = bins.drain_pending_updates();
    assert_eq!(drained.committed, 6);
    assert_eq!(bins.atom_state(atom), NodeState::Live);

    let stats = bins.render_on_surface(&surface, &mut pipeline);
    assert_eq!(stats.bins, 1);
    assert_eq!(pipeline.draws(), vec![GeometryId(7)]);
}

#[test]
fn test_new_sibling_waits_for_next_drain() {
    let (mut bins, surface) = bins_with_surface(8);
    let lights = [sun()];
    bins.insert(&item(1, &plain_appearance(), &lights)).unwrap();
    bins.drain_pending_updates();

    // lands in the live texture set but stays pending itself
    bins.insert(&item(2, &plain_appearance(), &lights)).unwrap();
    assert_eq!(bins.texture_set_count(), 1);

    let mut pipeline = DummyPipeline::new();
    bins.render_on_surface(&surface, &mut pipeline);
    assert_eq!(pipeline.draws(), vec![GeometryId(1)]);

    pipeline.clear();
    bins.drain_pending_updates();
    bins.render_on_surface(&surface, &mut pipeline);
    let mut draws = pipeline.draws();
    draws.sort();
    assert_eq!(draws, vec![GeometryId(1), GeometryId(2)]);
}

// ============================================================================
// Removal Tests
// ============================================================================

#[test]
fn test_removing_last_attribute_set_cascades() {
    let (mut bins, _surface) = bins_with_surface(4);
    let lights = [point_light(0.0), point_light(1.0)];
    let opaque = appearance_with(RenderingAttributes::new());
    let masked = appearance_with(RenderingAttributes::new().with_depth(true, false));

    let env = env_of(&mut bins, &lights);
    let first = bins.match_or_create_attribute_set(env, &opaque).unwrap();
    let second = bins.match_or_create_attribute_set(env, &masked).unwrap();
    assert_ne!(first, second);
    let bin = bins.environment(env).unwrap().bin();
    bins.drain_pending_updates();

    bins.remove_attribute_set(first).unwrap();
    assert_eq!(bins.environment_state(env), NodeState::Live);

    bins.remove_attribute_set(second).unwrap();
    assert_eq!(bins.environment_state(env), NodeState::Removed);
    assert_eq!(bins.bin_state(bin), NodeState::Removed);
    assert_eq!(bins.bin_count(), 0);
    bins.verify_slot_invariants().unwrap();

    assert_eq!(
        bins.remove_attribute_set(second),
        Err(BinError::InvalidHandle("attribute set"))
    );
}

#[test]
fn test_removing_last_atom_clears_the_chain() {
    let (mut bins, _surface) = bins_with_surface(4);
    let atom = bins
        .insert(&item(1, &plain_appearance(), &[sun(), ambient(0.2)]))
        .unwrap();
    bins.drain_pending_updates();

    bins.remove_atom(atom).unwrap();
    assert_eq!(bins.atom_count(), 0);
    assert_eq!(bins.texture_set_count(), 0);
    assert_eq!(bins.shader_set_count(), 0);
    assert_eq!(bins.attribute_set_count(), 0);
    assert_eq!(bins.environment_count(), 0);
    assert_eq!(bins.bin_count(), 0);
    assert!(bins.live_bins().is_empty());
}

#[test]
fn test_removing_pending_entries_before_drain() {
    let (mut bins, surface) = bins_with_surface(4);
    let atom = bins
        .insert(&item(1, &plain_appearance(), &[sun()]))
        .unwrap();
    bins.remove_atom(atom).unwrap();
    assert_eq!(bins.bin_count(), 0);

    bins.drain_pending_updates();
    let mut pipeline = DummyPipeline::new();
    let stats = bins.render_on_surface(&surface, &mut pipeline);
    assert_eq!(stats.bins, 0);
    assert!(pipeline.calls().is_empty());
}

#[test]
fn test_removal_invalidates_surface_cache() {
    let (mut bins, surface) = bins_with_surface(4);
    let lights = [point_light(0.0)];
    let atom = bins.insert(&item(1, &plain_appearance(), &lights)).unwrap();
    let env = env_of(&mut bins, &lights);
    bins.drain_pending_updates();

    let mut pipeline = DummyPipeline::new();
    bins.render_on_surface(&surface, &mut pipeline);
    assert_eq!(surface.lock().bound_environment(), Some(env));
    assert!(surface.lock().bound_bin().is_some());

    bins.remove_atom(atom).unwrap();
    let cache = surface.lock();
    assert_eq!(cache.bound_environment(), None);
    assert_eq!(cache.bound_bin(), None);
    assert_eq!(cache.bound_attribute_set(), None);
    assert_eq!(cache.bound_texture_set(), None);
}

#[test]
fn test_removed_bin_leaves_schedule() {
    let (mut bins, _surface) = bins_with_surface(2);
    let env = env_of(&mut bins, &[sun()]);
    let bin = bins.environment(env).unwrap().bin();
    bins.drain_pending_updates();
    assert_eq!(bins.live_bins(), vec![bin]);

    bins.remove_bin(bin).unwrap();
    assert!(bins.live_bins().is_empty());
    assert!(bins.bins().is_empty());
    assert_eq!(bins.environment_state(env), NodeState::Removed);
    assert_eq!(bins.remove_bin(bin), Err(BinError::InvalidHandle("bin")));
}

// ============================================================================
// State Diffing Tests
// ============================================================================

#[test]
fn test_steady_state_frame_issues_no_state() {
    let (mut bins, surface) = bins_with_surface(4);
    bins.insert(&item(1, &plain_appearance(), &[point_light(0.0)]))
        .unwrap();
    bins.drain_pending_updates();

    let mut pipeline = DummyPipeline::new();
    let first = bins.render_on_surface(&surface, &mut pipeline);
    // light, enables, ambient, fog, clip, attributes, shader, textures
    assert_eq!(first.state_calls, 8);
    assert_eq!(pipeline.state_call_count(), 8);

    pipeline.clear();
    bins.drain_pending_updates();
    let second = bins.render_on_surface(&surface, &mut pipeline);
    assert_eq!(second.state_calls, 0);
    assert_eq!(pipeline.calls(), &[PipelineCall::Draw(GeometryId(1))]);
}

#[test]
fn test_each_surface_has_its_own_cache() {
    let (mut bins, first) = bins_with_surface(4);
    let second = render_bins::SurfaceState::new();
    bins.register_surface(&second);
    bins.insert(&item(1, &plain_appearance(), &[sun()])).unwrap();
    bins.drain_pending_updates();

    let mut pipeline = DummyPipeline::new();
    bins.render_on_surface(&first, &mut pipeline);
    let on_first = pipeline.take_calls();
    bins.render_on_surface(&second, &mut pipeline);
    assert_eq!(pipeline.take_calls(), on_first);

    bins.render_on_surface(&first, &mut pipeline);
    assert_eq!(pipeline.state_call_count(), 0);
}

#[test]
fn test_changed_light_reloads_only_its_slot() {
    let (mut bins, surface) = bins_with_surface(4);
    let (l1, l2) = (point_light(0.0), point_light(1.0));
    let lights = [l1, l2.clone()];
    bins.insert(&item(1, &plain_appearance(), &lights)).unwrap();
    let env = env_of(&mut bins, &lights);
    bins.drain_pending_updates();

    let mut pipeline = DummyPipeline::new();
    bins.render_on_surface(&surface, &mut pipeline);
    pipeline.clear();

    l2.update(|l| l.set_color(Vec3::new(1.0, 0.0, 0.0)));
    bins.notify_light_changed(&l2);
    bins.drain_pending_updates();
    bins.render_on_surface(&surface, &mut pipeline);

    let slot = bins.environment(env).unwrap().slot_of(&l2).unwrap();
    assert_eq!(
        pipeline.calls(),
        &[
            PipelineCall::UpdateLight {
                slot,
                light: l2.read().to_gpu_data()
            },
            PipelineCall::Draw(GeometryId(1))
        ]
    );
}

#[test]
fn test_view_change_reloads_positional_lights() {
    let (mut bins, surface) = bins_with_surface(4);
    let point = point_light(0.0);
    let lights = [sun(), point.clone()];
    bins.insert(&item(1, &plain_appearance(), &lights)).unwrap();
    let env = env_of(&mut bins, &lights);
    bins.drain_pending_updates();

    let mut pipeline = DummyPipeline::new();
    bins.render_on_surface(&surface, &mut pipeline);
    pipeline.clear();

    surface.set_view_transform(Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0)));
    bins.drain_pending_updates();
    bins.render_on_surface(&surface, &mut pipeline);

    let slot = bins.environment(env).unwrap().slot_of(&point).unwrap();
    let reloaded: Vec<usize> = pipeline
        .calls()
        .iter()
        .filter_map(|call| match call {
            PipelineCall::UpdateLight { slot, .. } => Some(*slot),
            _ => None,
        })
        .collect();
    assert_eq!(reloaded, vec![slot]);
    assert_eq!(pipeline.state_call_count(), 1);
}

#[test]
fn test_ambient_toggle_reapplies_ambient() {
    let (mut bins, surface) = bins_with_surface(4);
    let (dim, bright) = (ambient(0.25), ambient(0.5));
    let lights = [dim, bright.clone()];
    bins.insert(&item(1, &plain_appearance(), &lights)).unwrap();
    let env = env_of(&mut bins, &lights);
    bins.drain_pending_updates();

    let mut pipeline = DummyPipeline::new();
    bins.render_on_surface(&surface, &mut pipeline);
    assert_eq!(surface.lock().ambient(), Vec3::splat(0.75));
    pipeline.clear();

    bright.update(|l| l.set_enabled(false));
    bins.notify_light_on_off_changed(&bright);
    bins.drain_pending_updates();
    assert_eq!(bins.environment(env).unwrap().ambient(), Vec3::splat(0.25));

    bins.render_on_surface(&surface, &mut pipeline);
    assert_eq!(
        pipeline.calls(),
        &[
            PipelineCall::SceneAmbient(Vec3::splat(0.25)),
            PipelineCall::Draw(GeometryId(1))
        ]
    );
}

#[test]
fn test_fog_edit_reapplies_fog() {
    let (mut bins, surface) = bins_with_surface(4);
    let fog = Fog::linear(Vec3::ONE, 1.0, 10.0).into_ref();
    let lights = [sun()];
    bins.insert(&item(1, &plain_appearance(), &lights).with_fog(fog.clone()))
        .unwrap();
    bins.drain_pending_updates();

    let mut pipeline = DummyPipeline::new();
    bins.render_on_surface(&surface, &mut pipeline);
    pipeline.clear();

    fog.update(|f| *f = Fog::linear(Vec3::ZERO, 2.0, 20.0));
    bins.notify_fog_changed(&fog);
    bins.drain_pending_updates();
    bins.render_on_surface(&surface, &mut pipeline);
    assert_eq!(
        pipeline.calls(),
        &[
            PipelineCall::Fog(Fog::linear(Vec3::ZERO, 2.0, 20.0)),
            PipelineCall::Draw(GeometryId(1))
        ]
    );
}

#[test]
fn test_invisible_attributes_are_not_drawn() {
    let (mut bins, surface) = bins_with_surface(4);
    let hidden = appearance_with(RenderingAttributes::new().with_visible(false));
    let lights = [sun()];
    bins.insert(&item(1, &hidden, &lights)).unwrap();
    bins.insert(&item(2, &plain_appearance(), &lights)).unwrap();
    bins.drain_pending_updates();

    let mut pipeline = DummyPipeline::new();
    let stats = bins.render_on_surface(&surface, &mut pipeline);
    assert_eq!(stats.attribute_sets, 1);
    assert_eq!(pipeline.draws(), vec![GeometryId(2)]);
}

// ============================================================================
// Sharing Tests
// ============================================================================

#[test]
fn test_equal_bundles_share_an_attribute_set() {
    let (mut bins, _surface) = bins_with_surface(4);
    let lights = [sun()];
    let a = appearance_with(RenderingAttributes::new().with_depth(true, false));
    let b = appearance_with(RenderingAttributes::new().with_depth(true, false));
    bins.insert(&item(1, &a, &lights)).unwrap();
    bins.insert(&item(2, &b, &lights)).unwrap();
    assert_eq!(bins.attribute_set_count(), 1);
}

#[test]
fn test_sole_user_scenario() {
    let (mut bins, surface) = bins_with_surface(4);
    let lights = [sun()];
    let x = frequent_appearance();
    bins.insert(&item(1, &x, &lights)).unwrap();
    bins.insert(&item(2, &x, &lights)).unwrap();
    // an equal but ordinary bundle is not folded into the pinned set
    bins.insert(&item(3, &appearance_with(RenderingAttributes::new()), &lights))
        .unwrap();

    let env = env_of(&mut bins, &lights);
    let attr = bins.match_or_create_attribute_set(env, &x).unwrap();
    assert!(bins.attribute_set(attr).unwrap().is_sole_user());
    assert_eq!(bins.attribute_set_count(), 2);
    bins.drain_pending_updates();

    let mut pipeline = DummyPipeline::new();
    bins.render_on_surface(&surface, &mut pipeline);
    pipeline.clear();

    let edited = RenderingAttributes::new().with_depth(false, false);
    x.update(|state| state.rendering_attributes = Some(edited.clone()));
    bins.notify_appearance_changed(&x);
    bins.drain_pending_updates();
    assert_eq!(bins.attribute_set(attr).unwrap().version(), 1);
    assert_eq!(bins.attribute_set_count(), 2);

    bins.render_on_surface(&surface, &mut pipeline);
    assert!(pipeline
        .calls()
        .contains(&PipelineCall::RenderingAttributes(edited)));
}

#[rstest]
#[case::pinned(true)]
#[case::tracked(false)]
fn test_frequent_bundles_get_a_set_per_appearance(#[case] pin: bool) {
    let config = RendererConfig::new().with_pinned_frequent_attributes(pin);
    let (mut bins, _surface) = bins_with_config(config);
    let lights = [sun()];
    let x = frequent_appearance();
    let y = frequent_appearance();
    let ordinary = appearance_with(RenderingAttributes::new());
    bins.insert(&item(1, &x, &lights)).unwrap();
    bins.insert(&item(2, &x, &lights)).unwrap();
    bins.insert(&item(3, &y, &lights)).unwrap();
    bins.insert(&item(4, &ordinary, &lights)).unwrap();
    assert_eq!(bins.attribute_set_count(), 3);

    let env = env_of(&mut bins, &lights);
    let attr = bins.match_or_create_attribute_set(env, &x).unwrap();
    assert_eq!(bins.attribute_set(attr).unwrap().is_sole_user(), pin);
    assert_eq!(bins.attribute_set(attr).unwrap().appearance(), Some(&x));
}

#[rstest]
#[case::pinned(true)]
#[case::tracked(false)]
fn test_frequent_edit_stays_with_its_appearance(#[case] pin: bool) {
    let config = RendererConfig::new().with_pinned_frequent_attributes(pin);
    let (mut bins, surface) = bins_with_config(config);
    let lights = [sun()];
    let x = frequent_appearance();
    let y = frequent_appearance();
    bins.insert(&item(1, &x, &lights)).unwrap();
    bins.insert(&item(2, &y, &lights)).unwrap();
    bins.drain_pending_updates();

    y.update(|state| {
        state.rendering_attributes = Some(RenderingAttributes::new().with_visible(false))
    });
    bins.notify_appearance_changed(&y);
    bins.drain_pending_updates();

    let mut pipeline = DummyPipeline::new();
    bins.render_on_surface(&surface, &mut pipeline);
    assert_eq!(pipeline.draws(), vec![GeometryId(1)]);
}

#[test]
fn test_frequent_edit_leaves_equal_ordinary_bundle_alone() {
    let config = RendererConfig::new().with_pinned_frequent_attributes(false);
    let (mut bins, surface) = bins_with_config(config);
    let lights = [sun()];
    let ordinary = appearance_with(RenderingAttributes::new());
    let x = frequent_appearance();
    bins.insert(&item(1, &ordinary, &lights)).unwrap();
    bins.insert(&item(2, &x, &lights)).unwrap();
    assert_eq!(bins.attribute_set_count(), 2);
    bins.drain_pending_updates();

    x.update(|state| {
        state.rendering_attributes = Some(RenderingAttributes::new().with_visible(false))
    });
    bins.drain_pending_updates();

    let mut pipeline = DummyPipeline::new();
    bins.render_on_surface(&surface, &mut pipeline);
    assert_eq!(pipeline.draws(), vec![GeometryId(1)]);
}

#[test]
fn test_ordinary_edit_rebinds_new_bundle() {
    let (mut bins, surface) = bins_with_surface(4);
    let lights = [sun()];
    let a = appearance_with(RenderingAttributes::new());
    let atom = bins.insert(&item(1, &a, &lights)).unwrap();
    bins.drain_pending_updates();

    let mut pipeline = DummyPipeline::new();
    bins.render_on_surface(&surface, &mut pipeline);
    pipeline.clear();

    let edited = RenderingAttributes::new().with_depth(false, false);
    a.update(|state| state.rendering_attributes = Some(edited.clone()));
    bins.notify_appearance_changed(&a);
    bins.drain_pending_updates();
    assert_eq!(bins.attribute_set_count(), 1);
    assert_eq!(bins.atom_state(atom), NodeState::Live);

    bins.render_on_surface(&surface, &mut pipeline);
    assert_eq!(
        pipeline.calls(),
        &[
            PipelineCall::RenderingAttributes(edited),
            PipelineCall::Draw(GeometryId(1))
        ]
    );

    // the handle survives the move
    bins.remove_atom(atom).unwrap();
    assert_eq!(bins.bin_count(), 0);
}

#[test]
fn test_ordinary_edit_splits_shared_set() {
    let (mut bins, surface) = bins_with_surface(4);
    let lights = [sun()];
    let a = appearance_with(RenderingAttributes::new());
    let b = appearance_with(RenderingAttributes::new());
    bins.insert(&item(1, &a, &lights)).unwrap();
    bins.insert(&item(2, &b, &lights)).unwrap();
    assert_eq!(bins.attribute_set_count(), 1);
    bins.drain_pending_updates();

    a.update(|state| {
        state.rendering_attributes = Some(RenderingAttributes::new().with_visible(false))
    });
    // not yet applied
    let mut pipeline = DummyPipeline::new();
    bins.render_on_surface(&surface, &mut pipeline);
    let mut draws = pipeline.draws();
    draws.sort();
    assert_eq!(draws, vec![GeometryId(1), GeometryId(2)]);

    pipeline.clear();
    bins.notify_appearance_changed(&a);
    bins.drain_pending_updates();
    assert_eq!(bins.attribute_set_count(), 2);
    bins.render_on_surface(&surface, &mut pipeline);
    assert_eq!(pipeline.draws(), vec![GeometryId(2)]);
    bins.verify_slot_invariants().unwrap();
}

#[test]
fn test_shader_edit_moves_atoms() {
    let (mut bins, surface) = bins_with_surface(4);
    let lights = [sun()];
    let a = plain_appearance();
    bins.insert(&item(1, &a, &lights)).unwrap();
    bins.drain_pending_updates();

    let mut pipeline = DummyPipeline::new();
    bins.render_on_surface(&surface, &mut pipeline);
    pipeline.clear();

    a.update(|state| state.shader = Some(ShaderId(3)));
    bins.notify_appearance_changed(&a);
    bins.drain_pending_updates();
    assert_eq!(bins.shader_set_count(), 1);

    bins.render_on_surface(&surface, &mut pipeline);
    assert!(pipeline
        .calls()
        .contains(&PipelineCall::BindShader(Some(ShaderId(3)))));
    assert_eq!(pipeline.draws(), vec![GeometryId(1)]);
}

#[test]
fn test_tracked_bundle_revalidates_each_drain() {
    let config = RendererConfig::new().with_pinned_frequent_attributes(false);
    let (mut bins, surface) = bins_with_config(config);
    let lights = [sun()];
    let x = frequent_appearance();
    bins.insert(&item(1, &x, &lights)).unwrap();
    let env = env_of(&mut bins, &lights);
    let attr = bins.match_or_create_attribute_set(env, &x).unwrap();
    bins.drain_pending_updates();

    let mut pipeline = DummyPipeline::new();
    bins.render_on_surface(&surface, &mut pipeline);
    pipeline.clear();

    // no notification: the tracked set notices on its own
    let edited = RenderingAttributes::new().with_ignore_vertex_colors(true);
    x.update(|state| state.rendering_attributes = Some(edited.clone()));
    bins.drain_pending_updates();
    assert_eq!(bins.attribute_set(attr).unwrap().version(), 1);
    assert!(bins.attribute_set(attr).unwrap().ignore_vertex_colors());

    bins.render_on_surface(&surface, &mut pipeline);
    assert_eq!(
        pipeline.calls(),
        &[
            PipelineCall::RenderingAttributes(edited),
            PipelineCall::Draw(GeometryId(1))
        ]
    );
}

#[test]
fn test_invalid_config_is_rejected() {
    assert!(matches!(
        RenderBins::new(RendererConfig::new().with_max_lights(0)),
        Err(BinError::InvalidConfig(_))
    ));
}
