//! N-best belief tracking.
//!
//! Each user action is expanded into `n_best` hypotheses (the observed
//! action plus confused copies). Every hypothesis is scored by:
//!
//! - a penalty per inform that only repeats a known value
//! - the match-count ratio before/after applying its informs, or a penalty
//!   when it leaves no entity matching
//! - its dialogue-act coherence with the most recent agent intent
//!
//! The best-scoring hypothesis (first on ties) is committed; all of them,
//! with softmax probabilities, stay in the history turn.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::action::{Intent, SemanticAction, SlotMap};
use crate::config::{ConfigResult, invalid};
use crate::data::Vocabulary;
use crate::db::ConstraintStore;
use crate::error::TrackerResult;
use crate::noise::{ConfusionConfig, ConfusionGenerator};

use super::{DialogueTracker, StateEncoder, TrackerCore, Turn};

/// Score deltas for a user intent following a given agent intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoherenceWeights {
    pub inform: f64,
    pub request: f64,
    pub thanks: f64,
    pub other: f64,
}

impl CoherenceWeights {
    fn score(&self, intent: Intent) -> f64 {
        match intent {
            Intent::Inform => self.inform,
            Intent::Request => self.request,
            Intent::Thanks => self.thanks,
            _ => self.other,
        }
    }
}

/// Rescoring constants (`[belief.weights]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RescoringWeights {
    #[serde(default = "default_repeat_penalty")]
    pub repeat_penalty: f64,
    #[serde(default = "default_no_match_penalty")]
    pub no_match_penalty: f64,
    #[serde(default = "default_ratio_weight")]
    pub ratio_weight: f64,
    /// Applied when the agent last requested.
    #[serde(default = "default_after_request")]
    pub after_request: CoherenceWeights,
    /// Applied when the agent last informed.
    #[serde(default = "default_after_inform")]
    pub after_inform: CoherenceWeights,
}

fn default_repeat_penalty() -> f64 {
    2.0
}
fn default_no_match_penalty() -> f64 {
    1.0
}
fn default_ratio_weight() -> f64 {
    1.0
}
fn default_after_request() -> CoherenceWeights {
    CoherenceWeights {
        inform: 1.5,
        request: 0.5,
        thanks: 0.1,
        other: -0.5,
    }
}
fn default_after_inform() -> CoherenceWeights {
    CoherenceWeights {
        inform: 0.5,
        request: 1.5,
        thanks: -0.5,
        other: -0.5,
    }
}

impl Default for RescoringWeights {
    fn default() -> Self {
        Self {
            repeat_penalty: default_repeat_penalty(),
            no_match_penalty: default_no_match_penalty(),
            ratio_weight: default_ratio_weight(),
            after_request: default_after_request(),
            after_inform: default_after_inform(),
        }
    }
}

/// `[belief]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeliefConfig {
    /// Hypotheses per user turn, the observed action included.
    #[serde(default = "default_n_best")]
    pub n_best: usize,
    /// Rows of the rolling match-feature window.
    #[serde(default = "default_num_sequences")]
    pub num_sequences: usize,
    /// Softmax temperature for hypothesis probabilities.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub confusion: ConfusionConfig,
    #[serde(default)]
    pub weights: RescoringWeights,
}

fn default_n_best() -> usize {
    3
}
fn default_num_sequences() -> usize {
    4
}
fn default_temperature() -> f64 {
    1.0
}

impl Default for BeliefConfig {
    fn default() -> Self {
        Self {
            n_best: default_n_best(),
            num_sequences: default_num_sequences(),
            temperature: default_temperature(),
            confusion: ConfusionConfig::default(),
            weights: RescoringWeights::default(),
        }
    }
}

impl BeliefConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.n_best == 0 {
            return Err(invalid("belief.n_best must be at least 1"));
        }
        if self.num_sequences == 0 {
            return Err(invalid("belief.num_sequences must be at least 1"));
        }
        if !(self.temperature > 0.0 && self.temperature.is_finite()) {
            return Err(invalid("belief.temperature must be positive"));
        }
        self.confusion.validate()
    }
}

/// One rescored hypothesis of a user turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredHypothesis {
    pub action: SemanticAction,
    pub score: f64,
    pub probability: f64,
}

fn softmax(scores: &[f64], temperature: f64) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores
        .iter()
        .map(|s| ((s - max) / temperature).exp())
        .collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

pub struct BeliefStateTracker {
    core: TrackerCore,
    config: BeliefConfig,
    generator: ConfusionGenerator,
    rng: StdRng,
    db_rows: VecDeque<Vec<f32>>,
}

impl BeliefStateTracker {
    pub const KIND: &'static str = "belief";

    pub fn new(
        store: Arc<ConstraintStore>,
        encoder: StateEncoder,
        vocabulary: Arc<Vocabulary>,
        config: BeliefConfig,
        rng: StdRng,
    ) -> TrackerResult<Self> {
        let generator = ConfusionGenerator::new(
            config.confusion.clone(),
            Arc::clone(encoder.domain()),
            vocabulary,
        )?;
        Ok(Self {
            core: TrackerCore::new(store, encoder),
            config,
            generator,
            rng,
            db_rows: VecDeque::new(),
        })
    }

    pub fn config(&self) -> &BeliefConfig {
        &self.config
    }

    /// Score every hypothesis against the current informs.
    pub fn rescore(&self, hypotheses: Vec<SemanticAction>) -> Vec<ScoredHypothesis> {
        let store = self.core.store();
        let weights = &self.config.weights;
        let current = self.core.current_informs();
        let old_total = store.count_matches_per_slot(current).total;
        let coherence = match self.core.last_agent_action().map(|a| a.intent) {
            Some(Intent::Request) => Some(&weights.after_request),
            Some(Intent::Inform) => Some(&weights.after_inform),
            _ => None,
        };

        let scores: Vec<f64> = hypotheses
            .iter()
            .map(|h| {
                let mut score = 0.0;
                let mut informs = current.clone();
                for (slot, value) in &h.inform_slots {
                    if current.get(slot) == Some(value) {
                        score -= weights.repeat_penalty;
                    }
                    informs.insert(slot.clone(), value.clone());
                }

                let new_total = store.count_matches_per_slot(&informs).total;
                if new_total == 0 {
                    score -= weights.no_match_penalty;
                } else if old_total != store.len() {
                    score += weights.ratio_weight * old_total as f64 / new_total as f64;
                }

                if let Some(table) = coherence {
                    score += table.score(h.intent);
                }
                score
            })
            .collect();

        let probabilities = softmax(&scores, self.config.temperature);
        hypotheses
            .into_iter()
            .zip(scores)
            .zip(probabilities)
            .map(|((action, score), probability)| ScoredHypothesis {
                action,
                score,
                probability,
            })
            .collect()
    }

    /// Match features of every hypothesis applied to the current informs.
    fn db_row(&self, hypotheses: &[ScoredHypothesis]) -> Vec<f32> {
        let encoder = self.core.encoder();
        let mut row = Vec::with_capacity(self.config.n_best * encoder.match_feature_size());
        for h in hypotheses.iter().take(self.config.n_best) {
            let mut informs: SlotMap = self.core.current_informs().clone();
            informs.extend(h.action.inform_slots.iter().map(|(k, v)| (k.clone(), v.clone())));
            let counts = self.core.store().count_matches_per_slot(&informs);
            row.extend(encoder.match_features(&counts));
        }
        row.resize(self.config.n_best * encoder.match_feature_size(), 0.0);
        row
    }
}

fn best_index(hypotheses: &[ScoredHypothesis]) -> usize {
    let mut best = 0;
    for (i, h) in hypotheses.iter().enumerate() {
        if h.score > hypotheses[best].score {
            best = i;
        }
    }
    best
}

impl DialogueTracker for BeliefStateTracker {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn reset(&mut self) {
        self.core.reset();
        self.db_rows.clear();
    }

    fn ingest_agent_action(&mut self, action: SemanticAction) -> TrackerResult<SemanticAction> {
        self.core.ingest_agent_action(action)
    }

    fn ingest_user_action(&mut self, action: SemanticAction) -> TrackerResult<SemanticAction> {
        let hypotheses = self
            .generator
            .n_best(&action, self.config.n_best, &mut self.rng)?;
        let scored = self.rescore(hypotheses);
        let best = best_index(&scored);
        tracing::trace!(
            hypotheses = scored.len(),
            best,
            score = scored[best].score,
            "rescored user turn"
        );

        let row = self.db_row(&scored);
        if self.db_rows.len() == self.config.num_sequences {
            self.db_rows.pop_front();
        }
        self.db_rows.push_back(row);

        let chosen = scored[best].action.clone();
        Ok(self.core.commit_user_action(chosen, scored))
    }

    fn encode(&self, done: bool) -> TrackerResult<Vec<f32>> {
        self.core.encode(done)
    }

    fn state_size(&self) -> usize {
        self.core.encoder().state_size()
    }

    fn db_feature_size(&self) -> Option<(usize, usize)> {
        Some((
            self.config.num_sequences,
            self.config.n_best * self.core.encoder().match_feature_size(),
        ))
    }

    /// The last `num_sequences` user turns, zero rows first when fewer.
    fn encode_db_features(&self) -> Option<Vec<Vec<f32>>> {
        let (rows, width) = self.db_feature_size()?;
        let mut out = vec![vec![0.0; width]; rows - self.db_rows.len()];
        out.extend(self.db_rows.iter().cloned());
        Some(out)
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

impl std::fmt::Debug for BeliefStateTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeliefStateTracker")
            .field("n_best", &self.config.n_best)
            .field("round", &self.core.round())
            .field("turns", &self.core.history().len())
            .finish()
    }
}
