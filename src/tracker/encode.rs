//! Fixed-length numeric encoding of the dialogue state.
//!
//! Layout, in concatenation order:
//!
//! | block                     | width           |
//! |---------------------------|-----------------|
//! | user intent one-hot       | `NUM_INTENTS`   |
//! | user inform slots         | `num_slots`     |
//! | user request slots        | `num_slots`     |
//! | current informs           | `num_slots`     |
//! | last agent intent one-hot | `NUM_INTENTS`   |
//! | last agent inform slots   | `num_slots`     |
//! | last agent request slots  | `num_slots`     |
//! | round / 5                 | 1               |
//! | round one-hot             | `max_round`     |
//! | match counts / 100        | `num_slots + 1` |
//! | match indicators          | `num_slots + 1` |

use std::sync::Arc;

use crate::action::{Intent, SemanticAction, SlotMap};
use crate::db::SlotCounts;
use crate::domain::Domain;
use crate::error::{TrackerError, TrackerResult};

pub const NUM_INTENTS: usize = Intent::ALL.len();

/// Builds state vectors for one domain and round limit.
#[derive(Debug, Clone)]
pub struct StateEncoder {
    domain: Arc<Domain>,
    max_round: usize,
}

impl StateEncoder {
    pub fn new(domain: Arc<Domain>, max_round: usize) -> Self {
        Self { domain, max_round }
    }

    pub fn domain(&self) -> &Arc<Domain> {
        &self.domain
    }

    pub fn max_round(&self) -> usize {
        self.max_round
    }

    /// Width of every vector [`encode`](Self::encode) returns.
    pub fn state_size(&self) -> usize {
        2 * NUM_INTENTS + 7 * self.domain.num_slots() + 3 + self.max_round
    }

    /// Width of one hypothesis' match features.
    pub fn match_feature_size(&self) -> usize {
        2 * self.domain.num_slots() + 2
    }

    /// The terminal sentinel state.
    pub fn zeros(&self) -> Vec<f32> {
        vec![0.0; self.state_size()]
    }

    pub fn encode(
        &self,
        user: &SemanticAction,
        agent: Option<&SemanticAction>,
        current: &SlotMap,
        round: usize,
        counts: &SlotCounts,
    ) -> TrackerResult<Vec<f32>> {
        let n = self.domain.num_slots();
        let mut out = Vec::with_capacity(self.state_size());

        out.extend(one_hot(NUM_INTENTS, Some(user.intent.index())));
        out.extend(self.bag(user.inform_slots.keys())?);
        out.extend(self.bag(user.request_slots.keys())?);
        out.extend(self.bag(current.keys())?);

        match agent {
            Some(agent) => {
                out.extend(one_hot(NUM_INTENTS, Some(agent.intent.index())));
                out.extend(self.bag(agent.inform_slots.keys())?);
                out.extend(self.bag(agent.request_slots.keys())?);
            }
            None => out.extend(std::iter::repeat_n(0.0, NUM_INTENTS + 2 * n)),
        }

        out.push(round as f32 / 5.0);
        let turn = round.saturating_sub(1).min(self.max_round.saturating_sub(1));
        out.extend(one_hot(self.max_round, Some(turn)));
        out.extend(self.match_features(counts));

        debug_assert_eq!(out.len(), self.state_size());
        Ok(out)
    }

    /// Scaled match counts followed by any-match indicators.
    ///
    /// Slots that are not constrained carry the all-constraints value, the
    /// final entry is the all-constraints value itself.
    pub fn match_features(&self, counts: &SlotCounts) -> Vec<f32> {
        let width = self.domain.num_slots() + 1;
        let mut scaled = vec![counts.total as f32 / 100.0; width];
        let mut binary = vec![if counts.total > 0 { 1.0 } else { 0.0 }; width];
        for (slot, count) in &counts.per_slot {
            if let Some(i) = self.domain.slot_index(slot) {
                scaled[i] = *count as f32 / 100.0;
                binary[i] = if *count > 0 { 1.0 } else { 0.0 };
            }
        }
        scaled.extend(binary);
        scaled
    }

    fn bag<'a>(&self, slots: impl Iterator<Item = &'a String>) -> TrackerResult<Vec<f32>> {
        let mut bag = vec![0.0; self.domain.num_slots()];
        for slot in slots {
            let i = self
                .domain
                .slot_index(slot)
                .ok_or_else(|| TrackerError::UnknownSlot { slot: slot.clone() })?;
            bag[i] = 1.0;
        }
        Ok(bag)
    }
}

fn one_hot(width: usize, index: Option<usize>) -> Vec<f32> {
    let mut v = vec![0.0; width];
    if let Some(i) = index.filter(|i| *i < width) {
        v[i] = 1.0;
    }
    v
}
