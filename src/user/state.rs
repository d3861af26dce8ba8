//! Per-episode state of the rule-based user.

use serde::Serialize;

use crate::action::{Intent, PLACEHOLDER, SemanticAction, SlotMap, UNKNOWN};
use crate::data::UserGoal;
use crate::error::{UserSimError, UserSimResult};

/// Outcome of validating the agent's proposed match against the goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintCheck {
    /// No `match_found` seen yet.
    #[default]
    Unresolved,
    Success,
    Fail,
}

/// Goal progress plus the action being assembled this turn.
///
/// `rest_slots` holds goal slots not yet communicated, `history_slots`
/// everything communicated by either side. A goal slot lives in exactly one
/// of the two.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct UserState {
    pub rest_slots: SlotMap,
    pub history_slots: SlotMap,
    pub inform_slots: SlotMap,
    pub request_slots: SlotMap,
    pub intent: Option<Intent>,
    pub constraint_check: ConstraintCheck,
    pub episode_over: bool,
}

impl UserState {
    /// Fresh state for `goal`: every goal slot starts in `rest_slots`.
    pub fn new(goal: &UserGoal) -> Self {
        let mut rest_slots = goal.inform_slots.clone();
        rest_slots.extend(
            goal.request_slots
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        Self {
            rest_slots,
            ..Default::default()
        }
    }

    /// Inform `slot = value` this turn and record it as communicated.
    pub fn reveal(&mut self, slot: &str, value: &str) {
        self.inform_slots.insert(slot.to_string(), value.to_string());
        self.settle(slot, value);
    }

    /// Record `slot = value` as communicated without informing it.
    pub fn settle(&mut self, slot: &str, value: &str) {
        self.rest_slots.remove(slot);
        self.history_slots.insert(slot.to_string(), value.to_string());
    }

    pub fn request(&mut self, slot: &str) {
        self.request_slots
            .insert(slot.to_string(), UNKNOWN.to_string());
    }

    /// Start a new turn: the previous action's informs and intent go away,
    /// outstanding requests stay.
    pub fn begin_turn(&mut self) {
        self.inform_slots.clear();
        self.intent = None;
    }

    /// The action this state currently describes.
    pub fn to_action(&self) -> UserSimResult<SemanticAction> {
        let intent = self.intent.ok_or_else(|| UserSimError::InvariantViolated {
            detail: "no intent chosen for the user turn".into(),
        })?;
        let mut action = SemanticAction::new(intent);
        action.inform_slots = self.inform_slots.clone();
        action.request_slots = self.request_slots.clone();
        Ok(action)
    }

    /// Check every per-turn invariant against `goal`.
    pub fn check_invariants(&self, goal: &UserGoal) -> UserSimResult<()> {
        let violated = |detail: String| Err(UserSimError::InvariantViolated { detail });

        if self.inform_slots.values().any(|v| v == UNKNOWN || v == PLACEHOLDER) {
            return violated(format!("unresolved inform value in {:?}", self.inform_slots));
        }
        if self.request_slots.values().any(|v| v == PLACEHOLDER) {
            return violated(format!("placeholder request value in {:?}", self.request_slots));
        }
        if let Some(slot) = self.rest_slots.keys().find(|k| self.history_slots.contains_key(*k)) {
            return violated(format!("slot \"{slot}\" is both rest and history"));
        }
        for slot in goal.inform_slots.keys().chain(goal.request_slots.keys()) {
            if !self.rest_slots.contains_key(slot) && !self.history_slots.contains_key(slot) {
                return violated(format!("goal slot \"{slot}\" is neither rest nor history"));
            }
        }
        if let Some(slot) = self
            .rest_slots
            .keys()
            .find(|k| !goal.inform_slots.contains_key(*k) && !goal.request_slots.contains_key(*k))
        {
            return violated(format!("rest slot \"{slot}\" is not a goal slot"));
        }

        self.to_action()?.validate()?;
        Ok(())
    }
}
