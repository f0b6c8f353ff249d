use crate::advective::element::AdvectedParticle;
use crate::error::{ElementId, ReconstructionError};
use crate::listener::NumberShiftListener;
use log::trace;
use std::fmt;
use std::rc::Rc;

/// Manages fixed-size slots of coefficients inside one shared vector.
///
/// Slots are identified by their start offset, always a multiple of the number of
/// coefficients per element. Freed slots go on a free stack and are reused before the
/// vector grows, except for the trailing slot, which is simply cut off. Between calls, the
/// vector holds exactly `dofs_per_element * (active_elements + freelist.len())` entries.
/// Its capacity grows geometrically.
#[derive(Clone, Default)]
pub struct SlabAllocator {
    rho: Vec<f64>,
    active_elements: usize,
    freelist: Vec<usize>,
    listener: Option<Rc<dyn NumberShiftListener>>,
}

impl fmt::Debug for SlabAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlabAllocator")
            .field("rho", &self.rho)
            .field("active_elements", &self.active_elements)
            .field("freelist", &self.freelist)
            .field("listener", &self.listener.is_some())
            .finish()
    }
}

impl SlabAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rho(&self) -> &[f64] {
        &self.rho
    }

    pub(crate) fn rho_mut(&mut self) -> &mut [f64] {
        &mut self.rho
    }

    pub fn active_elements(&self) -> usize {
        self.active_elements
    }

    /// Slot numbers (offsets divided by the slot size) available for reuse.
    pub fn freelist(&self) -> &[usize] {
        &self.freelist
    }

    /// Number of slots in the contiguous allocated range, including freed ones.
    pub fn contiguous_slots(&self) -> usize {
        self.active_elements + self.freelist.len()
    }

    pub fn capacity(&self) -> usize {
        self.rho.capacity()
    }

    pub fn set_listener(&mut self, listener: Option<Rc<dyn NumberShiftListener>>) {
        self.listener = listener;
    }

    /// Returns the start offset of a slot of `dofs_per_element` coefficients.
    ///
    /// Reused slots keep their previous contents, fresh slots are zero.
    pub fn allocate(&mut self, dofs_per_element: usize) -> Result<usize, ReconstructionError> {
        if dofs_per_element == 0 {
            return Err(ReconstructionError::UninitializedDofs);
        }

        if let Some(slot) = self.freelist.pop() {
            self.active_elements += 1;
            let start = slot * dofs_per_element;
            if let Some(listener) = &self.listener {
                listener.note_reset(start, dofs_per_element);
            }
            return Ok(start);
        }

        // No gaps available, append at the high-water mark
        let start = self.active_elements * dofs_per_element;
        let new_len = start + dofs_per_element;
        if new_len > self.rho.capacity() {
            let new_capacity = usize::max(2 * self.rho.capacity(), new_len);
            trace!(
                "Growing advective coefficient storage from {} to {}",
                self.rho.capacity(),
                new_capacity
            );
            self.rho.reserve_exact(new_capacity - self.rho.len());
        }
        self.rho.resize(new_len, 0.0);
        self.active_elements += 1;

        if let Some(listener) = &self.listener {
            listener.note_change_size(self.rho.len());
        }
        Ok(start)
    }

    /// Releases the slot starting at `start`.
    pub fn deallocate(&mut self, start: usize, dofs_per_element: usize) -> Result<(), ReconstructionError> {
        if dofs_per_element == 0 {
            return Err(ReconstructionError::UninitializedDofs);
        }
        if start % dofs_per_element != 0 {
            return Err(ReconstructionError::MisalignedDeallocation {
                start,
                dofs_per_element,
            });
        }
        let slot = start / dofs_per_element;
        if slot >= self.contiguous_slots() || self.freelist.contains(&slot) {
            return Err(ReconstructionError::UnallocatedSlot { start });
        }

        self.active_elements -= 1;
        if let Some(listener) = &self.listener {
            listener.note_reset(start, dofs_per_element);
        }

        // Unless this is the trailing slot, keep it around for reuse
        if slot != self.contiguous_slots() {
            self.freelist.push(slot);
        } else {
            self.rho.truncate(start);
            if let Some(listener) = &self.listener {
                listener.note_change_size(self.rho.len());
            }
        }
        Ok(())
    }

    /// Releases all slots.
    pub fn clear(&mut self) {
        self.rho.clear();
        self.freelist.clear();
        self.active_elements = 0;
        if let Some(listener) = &self.listener {
            listener.note_change_size(0);
        }
    }
}

/// Advective density representations of all particles and their shared coefficient storage.
#[derive(Debug, Clone, Default)]
pub struct AdvectiveState {
    pub(crate) slab: SlabAllocator,
    pub(crate) particles: Vec<AdvectedParticle>,
}

impl AdvectiveState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a listener that mirrors changes to the coefficient vector layout.
    pub fn with_shift_listener(mut self, listener: Rc<dyn NumberShiftListener>) -> Self {
        self.slab.set_listener(Some(listener));
        self
    }

    pub fn set_shift_listener(&mut self, listener: Option<Rc<dyn NumberShiftListener>>) {
        self.slab.set_listener(listener);
    }

    pub fn slab(&self) -> &SlabAllocator {
        &self.slab
    }

    /// The shared coefficient vector.
    pub fn rho(&self) -> &[f64] {
        self.slab.rho()
    }

    pub fn particles(&self) -> &[AdvectedParticle] {
        &self.particles
    }

    pub fn particle(&self, pn: usize) -> Option<&AdvectedParticle> {
        self.particles.get(pn)
    }

    pub fn count_advective_particles(&self) -> usize {
        self.particles.len()
    }

    /// Total number of active elements over all particles.
    pub fn active_element_count(&self) -> usize {
        self.slab.active_elements()
    }

    /// Mutable access to the coefficients of one element of one particle.
    pub fn element_dofs_mut(&mut self, pn: usize, element: ElementId) -> Option<&mut [f64]> {
        let particle = self.particles.get(pn)?;
        let start = particle.find_element(element)?.start_index;
        // The vector consists of equally sized slots
        let dofs = self.slab.rho.len() / self.slab.contiguous_slots().max(1);
        self.slab.rho.get_mut(start..start + dofs)
    }

    /// Drops all particles and releases all coefficient storage.
    pub fn clear(&mut self) {
        self.particles.clear();
        self.slab.clear();
    }
}
