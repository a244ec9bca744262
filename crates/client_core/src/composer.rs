//! Hand slot retention and lane vector composition.

use shared::domain::LaneVector;
use tracing::trace;

use crate::{detector::DetectionCycle, error::CoreError};

/// Hands tracked at once; extra samples in a cycle are ignored.
pub const MAX_HANDS: usize = 2;

pub const DEFAULT_HAND_EXPIRY_CYCLES: u32 = 30;

#[derive(Debug, Clone, Copy, Default)]
struct HandSlot {
    height: Option<f64>,
    missed: u32,
}

/// Last known height per hand slot.
///
/// Slots are assigned by position within the cycle, never by label. A slot
/// without a valid sample keeps its previous height for up to
/// `expiry_cycles` cycles; `0` keeps it indefinitely.
#[derive(Debug, Clone)]
pub struct HandSlots {
    slots: [HandSlot; MAX_HANDS],
    expiry_cycles: u32,
}

impl HandSlots {
    pub fn new(expiry_cycles: u32) -> Self {
        Self {
            slots: [HandSlot::default(); MAX_HANDS],
            expiry_cycles,
        }
    }

    pub fn observe(&mut self, cycle: &DetectionCycle) -> [Option<f64>; MAX_HANDS] {
        if cycle.samples.len() > MAX_HANDS {
            trace!(
                hands = cycle.samples.len(),
                "composer: ignoring hands beyond the tracked pair"
            );
        }

        let expiry_cycles = self.expiry_cycles;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let height = cycle
                .samples
                .get(index)
                .and_then(|sample| sample.height(cycle.space));
            match height {
                Some(height) => {
                    slot.height = Some(height);
                    slot.missed = 0;
                }
                None if slot.height.is_some() => {
                    slot.missed += 1;
                    if expiry_cycles > 0 && slot.missed > expiry_cycles {
                        trace!(slot = index, "composer: hand expired");
                        *slot = HandSlot::default();
                    }
                }
                None => {}
            }
        }
        self.heights()
    }

    pub fn heights(&self) -> [Option<f64>; MAX_HANDS] {
        self.slots.map(|slot| slot.height)
    }
}

impl Default for HandSlots {
    fn default() -> Self {
        Self::new(DEFAULT_HAND_EXPIRY_CYCLES)
    }
}

/// OR-combines per-hand lanes and reports value changes between cycles.
#[derive(Debug, Clone, Default)]
pub struct StateComposer {
    previous: LaneVector,
}

impl StateComposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the new vector if it differs from the previous cycle's.
    /// The stored vector is replaced either way.
    pub fn compose(&mut self, zones: &[Option<usize>]) -> Result<Option<LaneVector>, CoreError> {
        let lanes = LaneVector::from_active(zones.iter().flatten().copied())?;
        let changed = lanes != self.previous;
        self.previous = lanes;
        Ok(changed.then_some(lanes))
    }

    pub fn current(&self) -> LaneVector {
        self.previous
    }
}

#[cfg(test)]
#[path = "tests/composer_tests.rs"]
mod tests;
