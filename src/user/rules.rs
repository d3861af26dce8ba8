//! Transition rules of the rule-based user, keyed by agent intent.
//!
//! Each handler fills in the user's next intent and slots on the
//! [`UserState`] and reports whether the episode reached an outcome.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::action::{ANYTHING, Intent, NO_MATCH, SemanticAction, UNKNOWN};
use crate::data::UserGoal;
use crate::domain::Domain;
use crate::error::{UserSimError, UserSimResult};

use super::DialogueStatus;
use super::state::{ConstraintCheck, UserState};

/// Everything a transition may read or change.
pub(crate) struct RuleContext<'a> {
    pub goal: &'a UserGoal,
    pub state: &'a mut UserState,
    pub domain: &'a Domain,
    pub rng: &'a mut StdRng,
}

pub(crate) type Handler = fn(&mut RuleContext<'_>, &SemanticAction) -> UserSimResult<DialogueStatus>;

/// Agent intent → transition.
pub(crate) const TRANSITIONS: &[(Intent, Handler)] = &[
    (Intent::Request, on_request),
    (Intent::Inform, on_inform),
    (Intent::MatchFound, on_match_found),
    (Intent::Done, on_done),
];

pub(crate) fn handler_for(intent: Intent) -> Option<Handler> {
    TRANSITIONS
        .iter()
        .find(|(i, _)| *i == intent)
        .map(|(_, h)| *h)
}

/// Agent asks for a slot: answer from the goal, from what was already
/// settled, with a counter-request, or with `anything`.
fn on_request(cx: &mut RuleContext<'_>, agent: &SemanticAction) -> UserSimResult<DialogueStatus> {
    let Some(slot) = agent.request_slots.keys().next() else {
        return Err(crate::error::ActionError::EmptyRequest.into());
    };
    let goal = cx.goal;
    let state = &mut *cx.state;

    if let Some(value) = goal.inform_slots.get(slot) {
        state.intent = Some(Intent::Inform);
        state.reveal(slot, value);
        state.request_slots.clear();
    } else if goal.request_slots.contains_key(slot)
        && !state.rest_slots.contains_key(slot)
        && state.history_slots.contains_key(slot)
    {
        let value = state.history_slots[slot].clone();
        state.intent = Some(Intent::Inform);
        state.inform_slots.insert(slot.clone(), value);
        state.request_slots.clear();
    } else if goal.request_slots.contains_key(slot) && state.rest_slots.contains_key(slot) {
        state.request_slots.clear();
        state.intent = Some(Intent::Request);
        state.request(slot);

        let volunteers: Vec<(String, String)> = state
            .rest_slots
            .iter()
            .filter(|(k, _)| goal.inform_slots.contains_key(*k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some((k, v)) = volunteers.choose(cx.rng) {
            state.reveal(k, v);
        }
    } else {
        state.intent = Some(Intent::Inform);
        state.reveal(slot, ANYTHING);
        state.request_slots.clear();
    }
    Ok(DialogueStatus::Ongoing)
}

/// Agent informs a slot: record it, correct it if it contradicts the goal,
/// otherwise move the conversation along.
fn on_inform(cx: &mut RuleContext<'_>, agent: &SemanticAction) -> UserSimResult<DialogueStatus> {
    let Some((slot, value)) = agent.inform_slots.iter().next() else {
        return Err(crate::error::ActionError::EmptyInform.into());
    };
    let match_key = cx.domain.match_key();
    if slot == match_key {
        return Err(UserSimError::InformedMatchKey {
            key: match_key.to_string(),
        });
    }

    cx.state.settle(slot, value);
    cx.state.request_slots.remove(slot);

    match cx.goal.inform_slots.get(slot) {
        Some(wanted) if wanted != value => {
            cx.state.intent = Some(Intent::Inform);
            cx.state.request_slots.clear();
            cx.state.reveal(slot, wanted);
        }
        _ => follow_up(cx),
    }
    Ok(DialogueStatus::Ongoing)
}

/// Next move when nothing needs correcting: repeat an outstanding request,
/// reveal or request a remaining goal slot, or say thanks.
fn follow_up(cx: &mut RuleContext<'_>) {
    let match_key = cx.domain.match_key();
    let state = &mut *cx.state;

    if !state.request_slots.is_empty() {
        state.intent = Some(Intent::Request);
        return;
    }
    if state.rest_slots.is_empty() {
        state.intent = Some(Intent::Thanks);
        return;
    }

    // The match key is only asked for once nothing else remains.
    let parked = state.rest_slots.remove(match_key);
    let remaining: Vec<(String, String)> = state
        .rest_slots
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    match remaining.choose(cx.rng) {
        Some((k, v)) if v != UNKNOWN => {
            state.intent = Some(Intent::Inform);
            state.reveal(k, v);
        }
        Some((k, _)) => {
            state.intent = Some(Intent::Request);
            state.request(k);
        }
        None => {
            state.intent = Some(Intent::Request);
            state.request(match_key);
        }
    }
    if let Some(value) = parked {
        state.rest_slots.insert(match_key.to_string(), value);
    }
}

/// Agent proposes an entity: accept it only if it satisfies every queryable
/// goal constraint.
///
/// Goal values compare exactly, unlike the case-insensitive store match, so
/// an entity differing from the goal only in case is rejected.
fn on_match_found(
    cx: &mut RuleContext<'_>,
    agent: &SemanticAction,
) -> UserSimResult<DialogueStatus> {
    let match_key = cx.domain.match_key();
    let id = agent
        .inform_slots
        .get(match_key)
        .ok_or_else(|| UserSimError::MissingMatchKey {
            key: match_key.to_string(),
        })?;

    let state = &mut *cx.state;
    state.settle(match_key, id);
    state.request_slots.remove(match_key);

    let satisfied = id != NO_MATCH
        && cx
            .goal
            .inform_slots
            .iter()
            .filter(|(k, _)| !cx.domain.is_unqueryable(k))
            .all(|(k, v)| agent.inform_slots.get(k) == Some(v));

    if satisfied {
        state.constraint_check = ConstraintCheck::Success;
        state.intent = Some(Intent::Thanks);
        // Requested attributes carried by the entity are answered by it.
        for slot in cx.goal.request_slots.keys() {
            if let Some(value) = agent.inform_slots.get(slot) {
                if state.rest_slots.contains_key(slot) {
                    state.settle(slot, value);
                }
                state.request_slots.remove(slot);
            }
        }
    } else {
        state.constraint_check = ConstraintCheck::Fail;
        state.intent = Some(Intent::Reject);
        state.request_slots.clear();
        state.inform_slots.clear();
    }
    tracing::debug!(entity = %id, check = ?state.constraint_check, "match proposed");
    Ok(DialogueStatus::Ongoing)
}

/// Agent ends the dialogue: success needs an accepted match and nothing
/// left unresolved.
fn on_done(cx: &mut RuleContext<'_>, _agent: &SemanticAction) -> UserSimResult<DialogueStatus> {
    let state = &mut *cx.state;
    let status = if state.constraint_check == ConstraintCheck::Success && state.rest_slots.is_empty() {
        DialogueStatus::Success
    } else {
        DialogueStatus::Failure
    };
    state.intent = Some(Intent::Done);
    state.request_slots.clear();
    Ok(status)
}
