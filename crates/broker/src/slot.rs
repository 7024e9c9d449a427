//! Conversion slots and their state machine.
//!
//! ```text
//! Idle ──bind──▶ Busy(assignment) ──release──▶ Idle
//!                    │
//!                    └──restart──▶ Restarting ──recovered──▶ Idle
//! ```
//!
//! The state lives behind a plain mutex and every transition is checked, so
//! a slot can never be bound twice. The engine sits behind its own async
//! mutex, which is what serializes invocations within a slot.

use crate::engine::{ConversionEngine, SlotId};
use crate::task::Assignment;
use log::error;
use std::fmt;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Busy(Assignment),
    Restarting,
}

impl SlotState {
    pub fn can_transition_to(self, next: SlotState) -> bool {
        matches!(
            (self, next),
            (SlotState::Idle, SlotState::Busy(_))
                | (SlotState::Busy(_), SlotState::Idle)
                | (SlotState::Busy(_), SlotState::Restarting)
                | (SlotState::Restarting, SlotState::Idle)
        )
    }
}

pub(crate) struct ConversionSlot {
    pub id: SlotId,
    state: Mutex<SlotState>,
    pub engine: tokio::sync::Mutex<Box<dyn ConversionEngine>>,
}

impl fmt::Debug for ConversionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionSlot").field("id", &self.id).field("state", &self.state()).finish()
    }
}

impl ConversionSlot {
    pub fn new(id: SlotId, engine: Box<dyn ConversionEngine>, initial: SlotState) -> Self {
        Self { id, state: Mutex::new(initial), engine: tokio::sync::Mutex::new(engine) }
    }

    pub fn state(&self) -> SlotState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Moves to `next` if the transition is legal; returns the state found
    /// otherwise.
    pub fn transition(&self, next: SlotState) -> Result<(), SlotState> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.can_transition_to(next) {
            *state = next;
            Ok(())
        } else {
            Err(*state)
        }
    }

    pub fn bind(&self, assignment: Assignment) -> Result<(), SlotState> {
        self.transition(SlotState::Busy(assignment))
    }

    /// Like [`transition`](Self::transition), for callers that hold the slot
    /// and therefore know the move is legal. A refusal is logged.
    pub fn expect_transition(&self, next: SlotState) -> bool {
        match self.transition(next) {
            Ok(()) => true,
            Err(found) => {
                error!("[SLOT-{}] Illegal transition {:?} -> {:?}", self.id, found, next);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedFactory;
    use crate::engine::EngineFactory;

    fn first(task: u64) -> Assignment {
        Assignment { task: TaskId(task), attempt: 1 }
    }

    fn slot() -> ConversionSlot {
        ConversionSlot::new(0, ScriptedFactory::new().create(0), SlotState::Idle)
    }

    #[test]
    fn bind_requires_idle() {
        let slot = slot();
        assert_eq!(slot.bind(first(1)), Ok(()));
        assert_eq!(slot.bind(first(2)), Err(SlotState::Busy(first(1))));
        assert_eq!(slot.state(), SlotState::Busy(first(1)));
    }

    #[test]
    fn restart_path_returns_to_idle() {
        let slot = slot();
        slot.bind(first(7)).unwrap();
        assert!(slot.expect_transition(SlotState::Restarting));
        assert_eq!(slot.bind(first(8)), Err(SlotState::Restarting));
        assert!(slot.expect_transition(SlotState::Idle));
        assert_eq!(slot.bind(first(8)), Ok(()));
    }

    #[test]
    fn idle_cannot_restart_or_release() {
        let slot = slot();
        assert!(!slot.expect_transition(SlotState::Restarting));
        assert!(!slot.expect_transition(SlotState::Idle));
        assert_eq!(slot.state(), SlotState::Idle);
    }
}
