//! Hardware light slot allocation
//!
//! Every bin owns a fixed array of light slots mirroring the device's light
//! units. A light resident in a slot is shared by all environments of the
//! bin that list it; the slot keeps a reference count of those environments
//! and is reclaimed when the count drops to zero.
//!
//! Invariant: `num_empty_slots + occupied slots == max_lights`, and a light
//! occupies at most one slot of a given bin.

use crate::backend::{low_bits, mask_bits};
use crate::error::{BinError, BinResult};
use crate::scene::LightRef;

#[derive(Debug)]
pub struct LightSlots {
    lights: Vec<Option<LightRef>>,
    ref_counts: Vec<u32>,
    num_empty: usize,
    /// Slots holding point or spot lights, re-pushed when the view changes
    positional: u64,
    /// Slots whose contents changed since the last update pass
    pending_dirty: u64,
}

impl LightSlots {
    pub fn new(max_lights: usize) -> Self {
        Self {
            lights: vec![None; max_lights],
            ref_counts: vec![0; max_lights],
            num_empty: max_lights,
            positional: 0,
            pending_dirty: 0,
        }
    }

    pub fn max_lights(&self) -> usize {
        self.lights.len()
    }

    pub fn num_empty_slots(&self) -> usize {
        self.num_empty
    }

    pub fn slot_of(&self, light: &LightRef) -> Option<usize> {
        self.lights
            .iter()
            .position(|slot| slot.as_ref() == Some(light))
    }

    pub fn light(&self, slot: usize) -> Option<&LightRef> {
        self.lights.get(slot).and_then(Option::as_ref)
    }

    pub fn ref_count(&self, slot: usize) -> u32 {
        self.ref_counts.get(slot).copied().unwrap_or(0)
    }

    /// Occupied slots with their lights, ascending
    pub fn occupied(&self) -> impl Iterator<Item = (usize, &LightRef)> {
        self.lights
            .iter()
            .enumerate()
            .filter_map(|(slot, light)| light.as_ref().map(|l| (slot, l)))
    }

    pub fn occupied_mask(&self) -> u64 {
        self.occupied().fold(0, |mask, (slot, _)| mask | (1 << slot))
    }

    pub fn positional_mask(&self) -> u64 {
        self.positional
    }

    /// New slots `lights` would take. Lights already resident are free.
    ///
    /// `lights` must not contain duplicates.
    pub fn slots_needed(&self, lights: &[LightRef]) -> usize {
        lights
            .iter()
            .filter(|light| self.slot_of(light).is_none())
            .count()
    }

    pub fn try_reserve(&self, lights: &[LightRef]) -> bool {
        self.slots_needed(lights) <= self.num_empty
    }

    /// Reserve slots for `lights`, returning the slot of each light in input
    /// order. Resident lights gain a reference, new lights take the lowest
    /// free slot. Nothing is changed when the lights do not fit.
    pub fn commit(&mut self, lights: &[LightRef]) -> BinResult<Vec<usize>> {
        if !self.try_reserve(lights) {
            return Err(BinError::BinFull);
        }

        let mut positions = Vec::with_capacity(lights.len());
        for light in lights {
            if let Some(slot) = self.slot_of(light) {
                self.ref_counts[slot] += 1;
                positions.push(slot);
                continue;
            }

            let Some(slot) = self.lights.iter().position(Option::is_none) else {
                // try_reserve above guarantees a free slot
                return Err(BinError::BinFull);
            };
            self.lights[slot] = Some(light.clone());
            self.ref_counts[slot] = 1;
            self.num_empty -= 1;
            self.pending_dirty |= 1 << slot;
            if light.read().is_positional() {
                self.positional |= 1 << slot;
            }
            positions.push(slot);
        }
        Ok(positions)
    }

    /// Drop one reference for each `(light, slot)` pair. Returns the mask of
    /// slots that became free.
    pub fn release(&mut self, lights: &[LightRef], positions: &[usize]) -> u64 {
        let mut freed = 0u64;
        for (light, &slot) in lights.iter().zip(positions) {
            let resident = self.lights.get(slot).and_then(Option::as_ref) == Some(light);
            if !resident || self.ref_counts[slot] == 0 {
                log::error!(
                    "releasing light {} from slot {} which does not hold it",
                    light.id(),
                    slot
                );
                debug_assert!(false, "slot double release");
                continue;
            }

            self.ref_counts[slot] -= 1;
            if self.ref_counts[slot] == 0 {
                let bit = 1u64 << slot;
                self.lights[slot] = None;
                self.num_empty += 1;
                self.positional &= !bit;
                // the index may be handed to another light next frame
                self.pending_dirty &= !bit;
                freed |= bit;
            }
        }
        freed
    }

    /// Flag the slot holding `light` for a device update. Returns whether the
    /// light is resident.
    pub fn mark_light_dirty(&mut self, light: &LightRef) -> bool {
        match self.slot_of(light) {
            Some(slot) => {
                self.pending_dirty |= 1 << slot;
                true
            }
            None => false,
        }
    }

    pub fn pending_dirty(&self) -> u64 {
        self.pending_dirty
    }

    pub fn take_pending_dirty(&mut self) -> u64 {
        std::mem::take(&mut self.pending_dirty)
    }

    /// Check the slot invariants, reporting the first violation
    pub fn verify(&self) -> Result<(), String> {
        let occupied = self.occupied().count();
        if occupied + self.num_empty != self.max_lights() {
            return Err(format!(
                "{} occupied + {} empty != {} slots",
                occupied,
                self.num_empty,
                self.max_lights()
            ));
        }
        for (slot, light) in self.lights.iter().enumerate() {
            match light {
                Some(_) if self.ref_counts[slot] == 0 => {
                    return Err(format!("slot {slot} holds a light with zero references"))
                }
                None if self.ref_counts[slot] != 0 => {
                    return Err(format!("empty slot {slot} has references"))
                }
                _ => {}
            }
        }
        if self.pending_dirty & !low_bits(self.max_lights()) != 0 {
            return Err(format!("dirty mask {:#x} names slots past the end", self.pending_dirty));
        }
        for slot in mask_bits(self.positional) {
            if self.light(slot).is_none() {
                return Err(format!("positional index names empty slot {slot}"));
            }
        }
        Ok(())
    }
}
