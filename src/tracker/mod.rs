//! Dialogue state tracking.
//!
//! A tracker owns the per-episode history and the accumulated current
//! informs, resolves agent informs against the constraint store and encodes
//! the state for the policy. Two variants exist:
//!
//! - [`state::StateTracker`]: commits user actions as they arrive
//! - [`belief::BeliefStateTracker`]: expands each user action into an N-best
//!   list, rescores it and commits the best hypothesis
//!
//! Both share [`TrackerCore`] for everything except user ingestion.

pub mod belief;
pub mod encode;
pub mod state;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::action::{Intent, NO_MATCH, PLACEHOLDER, SemanticAction, SlotMap, Speaker};
use crate::db::ConstraintStore;
use crate::error::{ActionError, TrackerError, TrackerResult};

pub use belief::{BeliefConfig, BeliefStateTracker, RescoringWeights, ScoredHypothesis};
pub use encode::StateEncoder;
pub use state::StateTracker;

/// Label reserved for the match-found intent; never a legal inform slot.
const MATCH_FOUND_LABEL: &str = "match_found";

/// One history entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    /// The committed action, stamped with round and speaker.
    pub action: SemanticAction,
    /// Every scored hypothesis of a belief-tracked user turn; empty otherwise.
    pub hypotheses: Vec<ScoredHypothesis>,
}

impl Turn {
    fn committed(action: SemanticAction) -> Self {
        Self {
            action,
            hypotheses: Vec::new(),
        }
    }
}

/// Interface the session drives each round.
pub trait DialogueTracker: Send {
    /// Registry tag of this implementation.
    fn kind(&self) -> &'static str;

    /// Drop all per-episode state.
    fn reset(&mut self);

    /// Resolve, stamp and record an agent action. Returns the action as the
    /// user simulator should see it.
    fn ingest_agent_action(&mut self, action: SemanticAction) -> TrackerResult<SemanticAction>;

    /// Record a (possibly noisy) user action and advance the round. Returns
    /// the committed action.
    fn ingest_user_action(&mut self, action: SemanticAction) -> TrackerResult<SemanticAction>;

    /// State vector for the policy; all zeros when `done`.
    fn encode(&self, done: bool) -> TrackerResult<Vec<f32>>;

    fn state_size(&self) -> usize;

    /// `(sequences, features)` of the structured match input, if any.
    fn db_feature_size(&self) -> Option<(usize, usize)> {
        None
    }

    /// Rows of the structured match input, oldest first.
    fn encode_db_features(&self) -> Option<Vec<Vec<f32>>> {
        None
    }

    fn current_informs(&self) -> &SlotMap;

    fn history(&self) -> &[Turn];

    fn round(&self) -> usize;

    /// Ranked candidate values for `slots` under the current informs.
    fn suggest_values(&self, slots: &[String]) -> BTreeMap<String, Vec<String>>;
}

/// State and agent-side logic shared by every tracker.
#[derive(Debug)]
pub struct TrackerCore {
    store: Arc<ConstraintStore>,
    encoder: StateEncoder,
    current_informs: SlotMap,
    history: Vec<Turn>,
    round: usize,
}

impl TrackerCore {
    pub fn new(store: Arc<ConstraintStore>, encoder: StateEncoder) -> Self {
        Self {
            store,
            encoder,
            current_informs: SlotMap::new(),
            history: Vec::new(),
            round: 0,
        }
    }

    pub fn store(&self) -> &ConstraintStore {
        &self.store
    }

    pub fn encoder(&self) -> &StateEncoder {
        &self.encoder
    }

    pub fn reset(&mut self) {
        self.current_informs.clear();
        self.history.clear();
        self.round = 0;
    }

    pub fn current_informs(&self) -> &SlotMap {
        &self.current_informs
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn round(&self) -> usize {
        self.round
    }

    /// The most recent agent action, if the agent has spoken.
    pub fn last_agent_action(&self) -> Option<&SemanticAction> {
        self.history
            .iter()
            .rev()
            .map(|t| &t.action)
            .find(|a| a.speaker == Some(Speaker::Agent))
    }

    pub fn ingest_agent_action(&mut self, mut action: SemanticAction) -> TrackerResult<SemanticAction> {
        match action.intent {
            Intent::Inform => {
                if action.inform_slots.is_empty() {
                    return Err(ActionError::EmptyInform.into());
                }
                let filled = self
                    .store
                    .resolve_informs(&action.inform_slots, &self.current_informs)?;
                for (slot, value) in &filled {
                    if slot == MATCH_FOUND_LABEL {
                        return Err(TrackerError::ReservedKey { slot: slot.clone() });
                    }
                    if value == PLACEHOLDER {
                        return Err(ActionError::UnresolvedValue {
                            slot: slot.clone(),
                            value: value.clone(),
                        }
                        .into());
                    }
                }
                self.current_informs
                    .extend(filled.iter().map(|(k, v)| (k.clone(), v.clone())));
                action.inform_slots = filled;
            }
            Intent::MatchFound => {
                if !action.inform_slots.is_empty() {
                    return Err(TrackerError::MatchWithInforms);
                }
                let match_key = self.encoder.domain().match_key().to_string();
                let matches = self.store.match_constraints(&self.current_informs);
                let id = match matches.first() {
                    Some((id, record)) => {
                        action.inform_slots = record.clone();
                        id.to_string()
                    }
                    None => NO_MATCH.to_string(),
                };
                action.inform_slots.insert(match_key.clone(), id.clone());
                self.current_informs.insert(match_key, id);
            }
            _ => {}
        }
        action.validate()?;

        action.round = Some(self.round);
        action.speaker = Some(Speaker::Agent);
        tracing::debug!(round = self.round, action = %action, "agent turn");
        self.history.push(Turn::committed(action.clone()));
        Ok(action)
    }

    /// Commit a user action: merge informs, advance the round, record.
    pub fn commit_user_action(
        &mut self,
        mut action: SemanticAction,
        hypotheses: Vec<ScoredHypothesis>,
    ) -> SemanticAction {
        self.current_informs.extend(
            action
                .inform_slots
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        self.round += 1;
        action.round = Some(self.round);
        action.speaker = Some(Speaker::User);
        tracing::debug!(
            round = self.round,
            action = %action,
            informs = self.current_informs.len(),
            "user turn"
        );
        self.history.push(Turn {
            action: action.clone(),
            hypotheses,
        });
        action
    }

    pub fn encode(&self, done: bool) -> TrackerResult<Vec<f32>> {
        if done {
            return Ok(self.encoder.zeros());
        }
        let user = &self
            .history
            .last()
            .ok_or(TrackerError::EmptyHistory)?
            .action;
        let agent = self
            .history
            .len()
            .checked_sub(2)
            .map(|i| &self.history[i].action);
        let counts = self.store.count_matches_per_slot(&self.current_informs);
        self.encoder
            .encode(user, agent, &self.current_informs, self.round, &counts)
    }

    pub fn suggest_values(&self, slots: &[String]) -> BTreeMap<String, Vec<String>> {
        if slots.is_empty() {
            return BTreeMap::new();
        }
        self.store.suggest_values(slots, &self.current_informs)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::store::tests::sample_store;
    use crate::domain::{Domain, DomainConfig};

    pub(crate) fn core() -> TrackerCore {
        let domain = Arc::new(Domain::new(DomainConfig::default()).unwrap());
        TrackerCore::new(Arc::new(sample_store()), StateEncoder::new(domain, 20))
    }

    #[test]
    fn agent_inform_resolves_and_merges() {
        let mut core = core();
        core.commit_user_action(SemanticAction::inform("city", "portland"), Vec::new());
        let action = core
            .ingest_agent_action(SemanticAction::inform("theater", PLACEHOLDER))
            .unwrap();
        assert_eq!(action.inform_slots["theater"], "regal");
        assert_eq!(core.current_informs()["theater"], "regal");
        assert_eq!(action.speaker, Some(Speaker::Agent));
        assert_eq!(action.round, Some(1));
    }

    #[test]
    fn match_found_fills_from_first_entity() {
        let mut core = core();
        core.commit_user_action(SemanticAction::inform("city", "seattle"), Vec::new());
        let action = core
            .ingest_agent_action(SemanticAction::new(Intent::MatchFound))
            .unwrap();
        assert_eq!(action.inform_slots["ticket"], "1");
        assert_eq!(action.inform_slots["theater"], "regal");
        assert_eq!(core.current_informs()["ticket"], "1");
    }

    #[test]
    fn match_found_without_match_records_sentinel() {
        let mut core = core();
        core.commit_user_action(SemanticAction::inform("city", "tokyo"), Vec::new());
        let action = core
            .ingest_agent_action(SemanticAction::new(Intent::MatchFound))
            .unwrap();
        assert_eq!(action.inform_slots.len(), 1);
        assert_eq!(action.inform_slots["ticket"], NO_MATCH);
    }

    #[test]
    fn match_found_with_informs_is_rejected() {
        let mut core = core();
        let err = core
            .ingest_agent_action(SemanticAction::new(Intent::MatchFound).with_inform("city", "x"))
            .unwrap_err();
        assert!(matches!(err, TrackerError::MatchWithInforms));
    }

    #[test]
    fn empty_agent_inform_is_rejected() {
        let mut core = core();
        let err = core
            .ingest_agent_action(SemanticAction::new(Intent::Inform))
            .unwrap_err();
        assert!(matches!(err, TrackerError::Action(ActionError::EmptyInform)));
    }

    #[test]
    fn reserved_key_is_rejected() {
        let mut core = core();
        let err = core
            .ingest_agent_action(SemanticAction::inform("match_found", "yes"))
            .unwrap_err();
        assert!(matches!(err, TrackerError::ReservedKey { .. }));
    }

    #[test]
    fn user_commit_advances_round_and_stamps() {
        let mut core = core();
        let a = core.commit_user_action(SemanticAction::request("theater"), Vec::new());
        assert_eq!(a.round, Some(1));
        assert_eq!(a.speaker, Some(Speaker::User));
        assert_eq!(core.round(), 1);
        core.reset();
        assert_eq!(core.round(), 0);
        assert!(core.history().is_empty());
        assert!(core.current_informs().is_empty());
    }

    #[test]
    fn encode_needs_history_unless_done() {
        let core = core();
        assert!(matches!(core.encode(false), Err(TrackerError::EmptyHistory)));
        let zeros = core.encode(true).unwrap();
        assert_eq!(zeros.len(), core.encoder().state_size());
        assert!(zeros.iter().all(|x| *x == 0.0));
    }
}
