//! Logical worker identity and slot assignment.
//!
//! Identities are purely dispatcher-side bookkeeping: the pool is free to run
//! any task on any physical worker. Sticky data tasks draw from the 1-based
//! space `1..=num_workers`; one-shot initialization tasks own the separate
//! 0-based space `0..num_workers` and those ids are never reused for data.

use std::fmt;

/// Bounded logical identity for a pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u32);

impl WorkerId {
    pub(crate) fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One in-flight slot: a logical id plus the number of tasks it has carried.
///
/// The generation separates "the same id, later task" from "the same task"
/// in logs without tying the id to a physical worker lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSlot {
    pub id: WorkerId,
    pub generation: u64,
}

impl WorkerSlot {
    fn first(id: WorkerId) -> Self {
        Self { id, generation: 0 }
    }

    /// The same slot, one resubmission later.
    pub(crate) fn renewed(self) -> Self {
        Self {
            id: self.id,
            generation: self.generation + 1,
        }
    }
}

impl fmt::Display for WorkerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.id, self.generation)
    }
}

/// Round-robin cycle over the 1-based data-task id space.
#[derive(Debug)]
struct SlotCycle {
    num_workers: u32,
    next: u32,
}

impl SlotCycle {
    fn new(num_workers: u32) -> Self {
        Self {
            num_workers,
            next: 1,
        }
    }

    fn next_slot(&mut self) -> WorkerSlot {
        let id = self.next;
        self.next = self.next % self.num_workers + 1;
        WorkerSlot::first(WorkerId::new(id))
    }
}

/// Policy consulted by the dispatcher when assigning a slot to a data task.
#[derive(Debug)]
pub(crate) enum Assignment {
    /// Slot ids are fixed at first fill and reused on every resubmission
    /// through that slot; only `num_workers` distinct ids ever appear.
    Sticky(SlotCycle),
    /// Every submission takes the next id in the cycle.
    RoundRobin(SlotCycle),
}

impl Assignment {
    pub(crate) fn sticky(num_workers: usize) -> Self {
        Self::Sticky(SlotCycle::new(num_workers as u32))
    }

    pub(crate) fn round_robin(num_workers: usize) -> Self {
        Self::RoundRobin(SlotCycle::new(num_workers as u32))
    }

    /// Slot for a task submitted while filling the in-flight set.
    pub(crate) fn first_fill(&mut self) -> WorkerSlot {
        match self {
            Self::Sticky(cycle) | Self::RoundRobin(cycle) => cycle.next_slot(),
        }
    }

    /// Slot for the task replacing `freed` after a completion.
    pub(crate) fn reassign(&mut self, freed: WorkerSlot) -> WorkerSlot {
        match self {
            Self::Sticky(_) => freed.renewed(),
            Self::RoundRobin(cycle) => cycle.next_slot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_wraps_one_based() {
        let mut cycle = SlotCycle::new(3);
        let ids: Vec<u32> = (0..7).map(|_| cycle.next_slot().id.get()).collect();
        assert_eq!(ids, vec![1, 2, 3, 1, 2, 3, 1]);
    }

    #[test]
    fn sticky_reassign_keeps_id_and_bumps_generation() {
        let mut assignment = Assignment::sticky(2);
        let slot = assignment.first_fill();
        assert_eq!(slot.id.get(), 1);
        assert_eq!(slot.generation, 0);

        let renewed = assignment.reassign(slot);
        assert_eq!(renewed.id, slot.id);
        assert_eq!(renewed.generation, 1);

        let again = assignment.reassign(renewed);
        assert_eq!(again.id, slot.id);
        assert_eq!(again.generation, 2);
    }

    #[test]
    fn round_robin_reassign_advances_the_cycle() {
        let mut assignment = Assignment::round_robin(2);
        let first = assignment.first_fill();
        let second = assignment.first_fill();
        assert_eq!(first.id.get(), 1);
        assert_eq!(second.id.get(), 2);

        // Reassignment ignores the freed slot entirely.
        let next = assignment.reassign(first);
        assert_eq!(next.id.get(), 1);
        let next = assignment.reassign(first);
        assert_eq!(next.id.get(), 2);
    }

    #[test]
    fn single_worker_cycle_stays_at_one() {
        let mut assignment = Assignment::sticky(1);
        let slot = assignment.first_fill();
        assert_eq!(slot.id.get(), 1);
        assert_eq!(assignment.first_fill().id.get(), 1);
    }

    #[test]
    fn slot_display_includes_generation() {
        let slot = WorkerSlot::first(WorkerId::new(3)).renewed();
        assert_eq!(slot.to_string(), "3#1");
    }
}
