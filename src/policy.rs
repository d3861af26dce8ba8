//! Agent action vocabulary and the policy seam.
//!
//! A policy maps a state vector to an index into the [`ActionSpace`]; the
//! space turns indices back into canonical actions and canonical actions
//! (or their tracker-resolved forms) back into indices.

use std::collections::HashMap;

use crate::action::{Intent, PLACEHOLDER, SemanticAction};
use crate::config::{ConfigError, invalid};
use crate::domain::Domain;
use crate::error::SimResult;

/// Identity of a canonical action: its intent and the single slot it
/// names, if any.
type ActionKey = (Intent, Option<String>);

fn key_of(action: &SemanticAction) -> Option<ActionKey> {
    match action.intent {
        Intent::Done | Intent::MatchFound => Some((action.intent, None)),
        Intent::Inform if action.inform_slots.len() == 1 && action.request_slots.is_empty() => {
            action
                .inform_slots
                .keys()
                .next()
                .map(|slot| (Intent::Inform, Some(slot.clone())))
        }
        Intent::Request if action.request_slots.len() == 1 && action.inform_slots.is_empty() => {
            action
                .request_slots
                .keys()
                .next()
                .map(|slot| (Intent::Request, Some(slot.clone())))
        }
        _ => None,
    }
}

/// Enumerable, index-addressable agent actions.
///
/// Order: `done`, `match_found`, one `inform{slot: PLACEHOLDER}` per agent
/// inform slot, one `request{slot}` per agent request slot.
#[derive(Debug, Clone)]
pub struct ActionSpace {
    actions: Vec<SemanticAction>,
    index: HashMap<ActionKey, usize>,
}

impl ActionSpace {
    pub fn new(domain: &Domain) -> Self {
        let config = domain.config();
        let mut actions = vec![
            SemanticAction::new(Intent::Done),
            SemanticAction::new(Intent::MatchFound),
        ];
        actions.extend(
            config
                .agent_inform_slots
                .iter()
                .map(|slot| SemanticAction::inform(slot.clone(), PLACEHOLDER)),
        );
        actions.extend(
            config
                .agent_request_slots
                .iter()
                .map(|slot| SemanticAction::request(slot.clone())),
        );

        let index = actions
            .iter()
            .enumerate()
            .filter_map(|(i, a)| key_of(a).map(|k| (k, i)))
            .collect();
        Self { actions, index }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn action(&self, index: usize) -> Option<&SemanticAction> {
        self.actions.get(index)
    }

    /// Index of a canonical action or of its resolved form (an inform whose
    /// placeholder the tracker already filled).
    pub fn index_of(&self, action: &SemanticAction) -> Option<usize> {
        key_of(action).and_then(|k| self.index.get(&k).copied())
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &SemanticAction)> {
        self.actions.iter().enumerate()
    }
}

/// Decision-maker on the agent side.
pub trait Policy: Send {
    /// Pick the next agent action for `state`.
    fn choose_action(&mut self, state: &[f32]) -> SimResult<(usize, SemanticAction)>;

    /// Forget per-episode progress.
    fn reset(&mut self);
}

/// Warm-up policy: request the configured slots in order, inform the
/// configured slots, propose a match, then end the dialogue.
#[derive(Debug, Clone)]
pub struct RulePolicy {
    script: Vec<usize>,
    done: usize,
    space: ActionSpace,
    cursor: usize,
}

impl RulePolicy {
    pub fn new(domain: &Domain) -> Result<Self, ConfigError> {
        let space = ActionSpace::new(domain);
        let config = domain.config();
        let lookup = |action: SemanticAction| {
            space.index_of(&action).ok_or_else(|| {
                invalid(format!("rule policy action {action} is not in the agent action space"))
            })
        };

        let mut script = Vec::new();
        for slot in &config.rule_requests {
            script.push(lookup(SemanticAction::request(slot.clone()))?);
        }
        for slot in &config.rule_informs {
            script.push(lookup(SemanticAction::inform(slot.clone(), PLACEHOLDER))?);
        }
        script.push(lookup(SemanticAction::new(Intent::MatchFound))?);
        let done = lookup(SemanticAction::new(Intent::Done))?;

        Ok(Self {
            script,
            done,
            space,
            cursor: 0,
        })
    }

    pub fn action_space(&self) -> &ActionSpace {
        &self.space
    }
}

impl Policy for RulePolicy {
    fn choose_action(&mut self, _state: &[f32]) -> SimResult<(usize, SemanticAction)> {
        let index = match self.script.get(self.cursor) {
            Some(index) => {
                self.cursor += 1;
                *index
            }
            None => self.done,
        };
        let action = self
            .space
            .action(index)
            .cloned()
            .ok_or_else(|| invalid(format!("action index {index} out of range")))?;
        Ok((index, action))
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainConfig;

    fn domain() -> Domain {
        Domain::new(DomainConfig::default()).unwrap()
    }

    #[test]
    fn space_layout() {
        let d = domain();
        let space = ActionSpace::new(&d);
        let config = d.config();
        assert_eq!(
            space.len(),
            2 + config.agent_inform_slots.len() + config.agent_request_slots.len()
        );
        assert_eq!(space.action(0).unwrap().intent, Intent::Done);
        assert_eq!(space.action(1).unwrap().intent, Intent::MatchFound);
        assert_eq!(space.action(2).unwrap().inform_slots["moviename"], PLACEHOLDER);
    }

    #[test]
    fn index_and_action_are_inverse() {
        let space = ActionSpace::new(&domain());
        for (i, action) in space.iter() {
            assert_eq!(space.index_of(action), Some(i));
        }
    }

    #[test]
    fn resolved_inform_maps_to_its_canonical_index() {
        let space = ActionSpace::new(&domain());
        let canonical = space
            .index_of(&SemanticAction::inform("theater", PLACEHOLDER))
            .unwrap();
        let resolved = SemanticAction::inform("theater", "regal");
        assert_eq!(space.index_of(&resolved), Some(canonical));
        assert_eq!(space.index_of(&SemanticAction::new(Intent::Thanks)), None);
    }

    #[test]
    fn rule_policy_follows_script() {
        let d = domain();
        let mut policy = RulePolicy::new(&d).unwrap();
        let mut intents = Vec::new();
        for _ in 0..9 {
            let (index, action) = policy.choose_action(&[]).unwrap();
            assert_eq!(policy.action_space().action(index), Some(&action));
            intents.push((action.intent, action.request_slots.keys().next().cloned()));
        }
        assert_eq!(intents[0], (Intent::Request, Some("moviename".to_string())));
        assert_eq!(intents[5], (Intent::Request, Some("numberofpeople".to_string())));
        assert_eq!(intents[6].0, Intent::MatchFound);
        assert_eq!(intents[7].0, Intent::Done);
        assert_eq!(intents[8].0, Intent::Done);

        policy.reset();
        let (_, first) = policy.choose_action(&[]).unwrap();
        assert_eq!(first.request_slots.keys().next().unwrap(), "moviename");
    }

    #[test]
    fn rule_request_outside_action_space_rejected() {
        let mut config = DomainConfig::default();
        config.agent_request_slots.retain(|s| s != "city");
        let d = Domain::new(config).unwrap();
        assert!(RulePolicy::new(&d).is_err());
    }
}
