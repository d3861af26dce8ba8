//! The plain state tracker: user actions are taken at face value.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::action::{SemanticAction, SlotMap};
use crate::db::ConstraintStore;
use crate::error::TrackerResult;

use super::{DialogueTracker, StateEncoder, TrackerCore, Turn};

pub struct StateTracker {
    core: TrackerCore,
}

impl StateTracker {
    pub const KIND: &'static str = "state";

    pub fn new(store: Arc<ConstraintStore>, encoder: StateEncoder) -> Self {
        Self {
            core: TrackerCore::new(store, encoder),
        }
    }
}

impl DialogueTracker for StateTracker {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn reset(&mut self) {
        self.core.reset();
    }

    fn ingest_agent_action(&mut self, action: SemanticAction) -> TrackerResult<SemanticAction> {
        self.core.ingest_agent_action(action)
    }

    fn ingest_user_action(&mut self, action: SemanticAction) -> TrackerResult<SemanticAction> {
        Ok(self.core.commit_user_action(action, Vec::new()))
    }

    fn encode(&self, done: bool) -> TrackerResult<Vec<f32>> {
        self.core.encode(done)
    }

    fn state_size(&self) -> usize {
        self.core.encoder().state_size()
    }

    fn current_informs(&self) -> &SlotMap {
        self.core.current_informs()
    }

    fn history(&self) -> &[Turn] {
        self.core.history()
    }

    fn round(&self) -> usize {
        self.core.round()
    }

    fn suggest_values(&self, slots: &[String]) -> BTreeMap<String, Vec<String>> {
        self.core.suggest_values(slots)
    }
}

impl std::fmt::Debug for StateTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateTracker")
            .field("round", &self.core.round())
            .field("turns", &self.core.history().len())
            .field("current_informs", self.core.current_informs())
            .finish()
    }
}
