//! Goal-directed rule-based user simulator.
//!
//! The simulator samples a [`UserGoal`] at [`reset`](RuleBasedUser::reset)
//! and answers each agent action through the transition table in
//! [`rules`]. Every emitted action is checked against the state invariants
//! before it leaves the simulator.

pub mod rules;
pub mod state;

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Serialize;

use crate::action::{Intent, SemanticAction, UNKNOWN};
use crate::data::UserGoal;
use crate::domain::Domain;
use crate::error::{UserSimError, UserSimResult};

pub use state::{ConstraintCheck, UserState};

/// Episode outcome as seen after one user step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogueStatus {
    Ongoing,
    Success,
    Failure,
}

/// Per-turn reward: `-1`, plus `-max_round` on failure or `2 * max_round`
/// on success.
pub fn reward(status: DialogueStatus, max_round: usize) -> i64 {
    let max_round = max_round as i64;
    match status {
        DialogueStatus::Ongoing => -1,
        DialogueStatus::Failure => -1 - max_round,
        DialogueStatus::Success => -1 + 2 * max_round,
    }
}

/// What one simulator step produced.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub action: SemanticAction,
    pub reward: i64,
    pub done: bool,
    pub success: bool,
    pub status: DialogueStatus,
}

pub struct RuleBasedUser {
    domain: Arc<Domain>,
    goals: Arc<Vec<UserGoal>>,
    max_round: usize,
    rng: StdRng,
    goal: Option<UserGoal>,
    state: UserState,
}

impl RuleBasedUser {
    pub fn new(domain: Arc<Domain>, goals: Arc<Vec<UserGoal>>, max_round: usize, rng: StdRng) -> Self {
        Self {
            domain,
            goals,
            max_round,
            rng,
            goal: None,
            state: UserState::default(),
        }
    }

    /// The goal of the running episode, with the match key among its
    /// requests.
    pub fn goal(&self) -> Option<&UserGoal> {
        self.goal.as_ref()
    }

    pub fn state(&self) -> &UserState {
        &self.state
    }

    pub fn max_round(&self) -> usize {
        self.max_round
    }

    /// Sample a goal and return the opening user action.
    pub fn reset(&mut self) -> UserSimResult<SemanticAction> {
        let sampled = self
            .goals
            .choose(&mut self.rng)
            .ok_or(UserSimError::EmptyGoalPool)?;
        self.start(sampled.clone())
    }

    /// Begin an episode with a specific goal.
    pub fn reset_with_goal(&mut self, goal: UserGoal) -> UserSimResult<SemanticAction> {
        self.start(goal)
    }

    fn start(&mut self, mut goal: UserGoal) -> UserSimResult<SemanticAction> {
        let match_key = self.domain.match_key().to_string();
        goal.request_slots
            .insert(match_key.clone(), UNKNOWN.to_string());
        self.state = UserState::new(&goal);
        self.state.intent = Some(Intent::Request);

        if !goal.inform_slots.is_empty() {
            for slot in &self.domain.config().required_initial_informs {
                if let Some(value) = goal.inform_slots.get(slot) {
                    self.state.reveal(slot, value);
                }
            }
            if self.state.inform_slots.is_empty() {
                let informs: Vec<(&String, &String)> = goal.inform_slots.iter().collect();
                if let Some((slot, value)) = informs.choose(&mut self.rng) {
                    self.state.reveal(slot, value);
                }
            }
        }

        let requests: Vec<&String> = goal
            .request_slots
            .keys()
            .filter(|k| **k != match_key)
            .collect();
        let first_request = requests
            .choose(&mut self.rng)
            .map(|s| (*s).clone())
            .unwrap_or(match_key);
        self.state.request(&first_request);

        self.state.check_invariants(&goal)?;
        let action = self.state.to_action()?;
        tracing::debug!(
            informs = goal.inform_slots.len(),
            requests = goal.request_slots.len(),
            opening = %action,
            "user goal sampled"
        );
        self.goal = Some(goal);
        Ok(action)
    }

    /// Respond to an agent action that went through the state tracker.
    pub fn step(&mut self, agent: &SemanticAction) -> UserSimResult<StepOutcome> {
        let goal = self.goal.as_ref().ok_or(UserSimError::NotStarted)?;
        if self.state.episode_over {
            return Err(UserSimError::InvariantViolated {
                detail: "stepped after the episode ended".into(),
            });
        }
        agent.validate()?;

        self.state.begin_turn();
        let round = agent.round.unwrap_or(0);
        let status = if self.max_round > 0 && round >= self.max_round {
            tracing::debug!(round, max_round = self.max_round, "round limit reached");
            self.state.intent = Some(Intent::Done);
            self.state.request_slots.clear();
            DialogueStatus::Failure
        } else {
            let handler =
                rules::handler_for(agent.intent).ok_or_else(|| UserSimError::UnsupportedAgentIntent {
                    intent: agent.intent.to_string(),
                })?;
            let mut cx = rules::RuleContext {
                goal,
                state: &mut self.state,
                domain: &self.domain,
                rng: &mut self.rng,
            };
            handler(&mut cx, agent)?
        };

        self.state.check_invariants(goal)?;
        let action = self.state.to_action()?;
        let done = status != DialogueStatus::Ongoing;
        self.state.episode_over = done;
        if done {
            tracing::debug!(?status, round, "user ended the episode");
        }

        Ok(StepOutcome {
            action,
            reward: reward(status, self.max_round),
            done,
            success: status == DialogueStatus::Success,
            status,
        })
    }
}

impl std::fmt::Debug for RuleBasedUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleBasedUser")
            .field("goals", &self.goals.len())
            .field("max_round", &self.max_round)
            .field("goal", &self.goal)
            .finish()
    }
}
