//! Recognition-noise models for user actions.
//!
//! Two front-ends share one set of corruption primitives ([`Corruptor`]):
//!
//! - [`NoiseInjector`]: the single-frame error model. Each inform slot is
//!   corrupted independently with `slot_error_prob`, then the intent with
//!   `intent_error_prob`.
//! - [`ConfusionGenerator`]: produces the N-best hypothesis list consumed by
//!   the belief tracker. The true action is always hypothesis 0.
//!
//! Corruption only draws slots that appear in both the domain slot list and
//! the vocabulary, and only draws values from the vocabulary. The match key
//! is never touched.

use std::sync::Arc;

use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::action::{Intent, SemanticAction, UNKNOWN};
use crate::config::{ConfigResult, check_probability, invalid};
use crate::data::Vocabulary;
use crate::domain::Domain;
use crate::error::NoiseError;

/// How a selected inform slot gets corrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotErrorMode {
    /// Keep the slot, replace its value.
    ValueSubstitution,
    /// Drop the slot, add a different slot with a fresh value.
    SlotSubstitution,
    /// Drop the slot.
    SlotDeletion,
    /// Weighted choice among the three above, per slot.
    Mixed,
}

/// `[noise]` section: the single-frame error model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorModelConfig {
    #[serde(default = "default_slot_error_prob")]
    pub slot_error_prob: f64,
    #[serde(default = "default_slot_error_mode")]
    pub slot_error_mode: SlotErrorMode,
    /// Weights of value substitution, slot substitution and deletion in
    /// [`SlotErrorMode::Mixed`].
    #[serde(default = "default_mode_weights")]
    pub mode_weights: [f64; 3],
    #[serde(default = "default_intent_error_prob")]
    pub intent_error_prob: f64,
    /// Never corrupt an intent into `thanks`.
    #[serde(default)]
    pub exclude_thanks: bool,
}

fn default_slot_error_prob() -> f64 {
    0.05
}
fn default_slot_error_mode() -> SlotErrorMode {
    SlotErrorMode::Mixed
}
fn default_mode_weights() -> [f64; 3] {
    [0.3, 0.3, 0.4]
}
fn default_intent_error_prob() -> f64 {
    0.0
}

impl Default for ErrorModelConfig {
    fn default() -> Self {
        Self {
            slot_error_prob: default_slot_error_prob(),
            slot_error_mode: default_slot_error_mode(),
            mode_weights: default_mode_weights(),
            intent_error_prob: default_intent_error_prob(),
            exclude_thanks: false,
        }
    }
}

impl ErrorModelConfig {
    /// A model that never corrupts anything.
    pub fn noiseless() -> Self {
        Self {
            slot_error_prob: 0.0,
            intent_error_prob: 0.0,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        check_probability("noise.slot_error_prob", self.slot_error_prob)?;
        check_probability("noise.intent_error_prob", self.intent_error_prob)?;
        check_weights("noise.mode_weights", &self.mode_weights)
    }
}

/// Confusion parameters of the N-best generator (`[belief.confusion]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionConfig {
    /// Weight of value substitution when confusing informs.
    #[serde(default = "default_value_error_prob")]
    pub value_error_prob: f64,
    /// Weight of slot substitution when confusing informs.
    #[serde(default = "default_confusion_slot_error_prob")]
    pub slot_error_prob: f64,
    /// Weight of adding a spurious slot when confusing informs.
    #[serde(default = "default_miss_error_prob")]
    pub miss_error_prob: f64,
    /// Extra intent corruption applied to every confused hypothesis.
    #[serde(default = "default_confusion_intent_error_prob")]
    pub intent_error_prob: f64,
    /// Chance of confusing informs rather than requests when an action
    /// carries both.
    #[serde(default = "default_inform_bias")]
    pub inform_bias: f64,
    #[serde(default = "default_true")]
    pub exclude_thanks: bool,
}

fn default_value_error_prob() -> f64 {
    0.5
}
fn default_confusion_slot_error_prob() -> f64 {
    0.25
}
fn default_miss_error_prob() -> f64 {
    0.25
}
fn default_confusion_intent_error_prob() -> f64 {
    0.1
}
fn default_inform_bias() -> f64 {
    0.7
}
fn default_true() -> bool {
    true
}

impl Default for ConfusionConfig {
    fn default() -> Self {
        Self {
            value_error_prob: default_value_error_prob(),
            slot_error_prob: default_confusion_slot_error_prob(),
            miss_error_prob: default_miss_error_prob(),
            intent_error_prob: default_confusion_intent_error_prob(),
            inform_bias: default_inform_bias(),
            exclude_thanks: true,
        }
    }
}

impl ConfusionConfig {
    fn inform_weights(&self) -> [f64; 3] {
        [self.value_error_prob, self.slot_error_prob, self.miss_error_prob]
    }

    pub fn validate(&self) -> ConfigResult<()> {
        check_probability("belief.confusion.value_error_prob", self.value_error_prob)?;
        check_probability("belief.confusion.slot_error_prob", self.slot_error_prob)?;
        check_probability("belief.confusion.miss_error_prob", self.miss_error_prob)?;
        check_probability("belief.confusion.intent_error_prob", self.intent_error_prob)?;
        check_probability("belief.confusion.inform_bias", self.inform_bias)?;
        check_weights("belief.confusion error weights", &self.inform_weights())
    }
}

fn check_weights(name: &str, weights: &[f64]) -> ConfigResult<()> {
    if weights.iter().any(|w| *w < 0.0 || !w.is_finite()) {
        return Err(invalid(format!("{name} contains a negative or non-finite weight")));
    }
    if weights.iter().sum::<f64>() <= 0.0 {
        return Err(invalid(format!("{name} sums to zero")));
    }
    Ok(())
}

fn weighted_index(weights: &[f64]) -> Result<WeightedIndex<f64>, NoiseError> {
    WeightedIndex::new(weights).map_err(|e| NoiseError::InvalidWeights {
        message: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Corruption primitives
// ---------------------------------------------------------------------------

/// Corruption operations bounded by the domain and its vocabulary.
///
/// Every method returns whether the action changed.
#[derive(Debug, Clone)]
pub struct Corruptor {
    domain: Arc<Domain>,
    vocabulary: Arc<Vocabulary>,
}

impl Corruptor {
    pub fn new(domain: Arc<Domain>, vocabulary: Arc<Vocabulary>) -> Self {
        Self { domain, vocabulary }
    }

    fn values(&self, slot: &str) -> Result<&[String], NoiseError> {
        match self.vocabulary.get(slot) {
            Some(values) if !values.is_empty() => Ok(values),
            _ => Err(NoiseError::UnknownSlot {
                slot: slot.to_string(),
            }),
        }
    }

    /// Domain slots with a value list, minus the match key and `exclude`.
    fn candidate_slots(&self, exclude: impl Fn(&str) -> bool) -> Vec<&String> {
        self.domain
            .slots()
            .iter()
            .filter(|s| s.as_str() != self.domain.match_key())
            .filter(|s| self.vocabulary.get(s.as_str()).is_some_and(|v| !v.is_empty()))
            .filter(|s| !exclude(s.as_str()))
            .collect()
    }

    /// A random inform slot other than the match key.
    pub fn pick_inform_slot<R: Rng + ?Sized>(
        &self,
        action: &SemanticAction,
        rng: &mut R,
    ) -> Option<String> {
        let keys: Vec<&String> = action
            .inform_slots
            .keys()
            .filter(|k| k.as_str() != self.domain.match_key())
            .collect();
        keys.choose(rng).map(|k| (*k).clone())
    }

    /// Replace the value of `slot` with a different vocabulary value.
    pub fn substitute_value<R: Rng + ?Sized>(
        &self,
        action: &mut SemanticAction,
        slot: &str,
        rng: &mut R,
    ) -> Result<bool, NoiseError> {
        let values = self.values(slot)?;
        let current = action.inform_slots.get(slot);
        let alternatives: Vec<&String> = values.iter().filter(|v| Some(*v) != current).collect();
        let Some(value) = alternatives.choose(rng) else {
            tracing::warn!(slot, "no alternative value to substitute");
            return Ok(false);
        };
        action.inform_slots.insert(slot.to_string(), (*value).clone());
        Ok(true)
    }

    /// Drop `slot` and inform a previously absent slot instead.
    pub fn substitute_slot<R: Rng + ?Sized>(
        &self,
        action: &mut SemanticAction,
        slot: &str,
        rng: &mut R,
    ) -> Result<bool, NoiseError> {
        let informs = &action.inform_slots;
        let new_slot = self
            .candidate_slots(|s| s == slot || informs.contains_key(s))
            .choose(rng)
            .map(|s| (*s).clone())
            .ok_or(NoiseError::Exhausted { what: "inform slot" })?;
        let value = self
            .values(&new_slot)?
            .choose(rng)
            .cloned()
            .ok_or(NoiseError::Exhausted { what: "value" })?;
        action.inform_slots.remove(slot);
        action.inform_slots.insert(new_slot, value);
        Ok(true)
    }

    /// Drop `slot`, unless it is the last inform of an `inform` action.
    pub fn delete_slot(&self, action: &mut SemanticAction, slot: &str) -> bool {
        if action.intent == Intent::Inform && action.inform_slots.len() <= 1 {
            tracing::debug!(slot, "kept last inform slot");
            return false;
        }
        action.inform_slots.remove(slot).is_some()
    }

    /// Inform an extra slot the action did not carry.
    pub fn add_spurious_slot<R: Rng + ?Sized>(
        &self,
        action: &mut SemanticAction,
        rng: &mut R,
    ) -> Result<bool, NoiseError> {
        let informs = &action.inform_slots;
        let new_slot = self
            .candidate_slots(|s| informs.contains_key(s))
            .choose(rng)
            .map(|s| (*s).clone())
            .ok_or(NoiseError::Exhausted { what: "inform slot" })?;
        let value = self
            .values(&new_slot)?
            .choose(rng)
            .cloned()
            .ok_or(NoiseError::Exhausted { what: "value" })?;
        action.inform_slots.insert(new_slot, value);
        Ok(true)
    }

    /// Swap one requested slot for a previously unrequested one.
    pub fn substitute_request<R: Rng + ?Sized>(
        &self,
        action: &mut SemanticAction,
        rng: &mut R,
    ) -> Result<bool, NoiseError> {
        let match_key = self.domain.match_key();
        let requested: Vec<&String> = action
            .request_slots
            .keys()
            .filter(|k| k.as_str() != match_key)
            .collect();
        let Some(old) = requested.choose(rng).map(|s| (*s).clone()) else {
            return Ok(false);
        };
        let requests = &action.request_slots;
        let new_slot = self
            .domain
            .slots()
            .iter()
            .filter(|s| s.as_str() != match_key && !requests.contains_key(s.as_str()))
            .collect::<Vec<_>>()
            .choose(rng)
            .map(|s| (*s).clone())
            .ok_or(NoiseError::Exhausted { what: "request slot" })?;
        action.request_slots.remove(&old);
        action.request_slots.insert(new_slot, UNKNOWN.to_string());
        Ok(true)
    }

    /// Replace the intent with a different user intent.
    pub fn substitute_intent<R: Rng + ?Sized>(
        &self,
        action: &mut SemanticAction,
        exclude_thanks: bool,
        rng: &mut R,
    ) -> bool {
        let pool: Vec<Intent> = self
            .domain
            .user_intents()
            .iter()
            .copied()
            .filter(|i| *i != action.intent)
            .filter(|i| !(exclude_thanks && *i == Intent::Thanks))
            .collect();
        match pool.choose(rng) {
            Some(intent) => {
                action.intent = *intent;
                true
            }
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Single-frame error model
// ---------------------------------------------------------------------------

/// Corrupts one user action in place.
#[derive(Debug, Clone)]
pub struct NoiseInjector {
    config: ErrorModelConfig,
    corruptor: Corruptor,
    modes: WeightedIndex<f64>,
}

impl NoiseInjector {
    pub fn new(
        config: ErrorModelConfig,
        domain: Arc<Domain>,
        vocabulary: Arc<Vocabulary>,
    ) -> Result<Self, NoiseError> {
        let modes = weighted_index(&config.mode_weights)?;
        Ok(Self {
            config,
            corruptor: Corruptor::new(domain, vocabulary),
            modes,
        })
    }

    pub fn config(&self) -> &ErrorModelConfig {
        &self.config
    }

    fn resolve_mode<R: Rng + ?Sized>(&self, rng: &mut R) -> SlotErrorMode {
        match self.config.slot_error_mode {
            SlotErrorMode::Mixed => match self.modes.sample(rng) {
                0 => SlotErrorMode::ValueSubstitution,
                1 => SlotErrorMode::SlotSubstitution,
                _ => SlotErrorMode::SlotDeletion,
            },
            mode => mode,
        }
    }

    /// Corrupt `action` per the configured error model.
    pub fn infuse_error<R: Rng + ?Sized>(
        &self,
        action: &mut SemanticAction,
        rng: &mut R,
    ) -> Result<(), NoiseError> {
        let original = action.clone();
        if self.config.slot_error_prob > 0.0 {
            let slots: Vec<String> = action.inform_slots.keys().cloned().collect();
            for slot in slots {
                if slot == self.corruptor.domain.match_key() || !action.inform_slots.contains_key(&slot) {
                    continue;
                }
                if !rng.gen_bool(self.config.slot_error_prob) {
                    continue;
                }
                match self.resolve_mode(rng) {
                    SlotErrorMode::ValueSubstitution => {
                        self.corruptor.substitute_value(action, &slot, rng)?;
                    }
                    SlotErrorMode::SlotSubstitution => {
                        self.corruptor.substitute_slot(action, &slot, rng)?;
                    }
                    SlotErrorMode::SlotDeletion | SlotErrorMode::Mixed => {
                        self.corruptor.delete_slot(action, &slot);
                    }
                }
            }
        }
        if self.config.intent_error_prob > 0.0 && rng.gen_bool(self.config.intent_error_prob) {
            self.corruptor
                .substitute_intent(action, self.config.exclude_thanks, rng);
        }
        if !action.same_content(&original) {
            tracing::debug!(from = %original, to = %action, "noise injected");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// N-best confusion
// ---------------------------------------------------------------------------

/// Generates confused copies of a user action.
#[derive(Debug, Clone)]
pub struct ConfusionGenerator {
    config: ConfusionConfig,
    corruptor: Corruptor,
    inform_modes: WeightedIndex<f64>,
}

impl ConfusionGenerator {
    pub fn new(
        config: ConfusionConfig,
        domain: Arc<Domain>,
        vocabulary: Arc<Vocabulary>,
    ) -> Result<Self, NoiseError> {
        let inform_modes = weighted_index(&config.inform_weights())?;
        Ok(Self {
            config,
            corruptor: Corruptor::new(domain, vocabulary),
            inform_modes,
        })
    }

    /// The true action followed by `n - 1` confused copies.
    pub fn n_best<R: Rng + ?Sized>(
        &self,
        action: &SemanticAction,
        n: usize,
        rng: &mut R,
    ) -> Result<Vec<SemanticAction>, NoiseError> {
        let mut hypotheses = Vec::with_capacity(n.max(1));
        hypotheses.push(action.clone());
        for _ in 1..n {
            hypotheses.push(self.confuse(action, rng)?);
        }
        Ok(hypotheses)
    }

    /// One confused copy of `action`.
    pub fn confuse<R: Rng + ?Sized>(
        &self,
        action: &SemanticAction,
        rng: &mut R,
    ) -> Result<SemanticAction, NoiseError> {
        let mut confused = action.clone();
        let has_informs = self.corruptor.pick_inform_slot(action, rng).is_some();
        let has_requests = !action.request_slots.is_empty();

        match (has_informs, has_requests) {
            (true, true) => {
                if rng.gen_bool(self.config.inform_bias) {
                    self.confuse_inform(&mut confused, rng)?;
                } else {
                    self.corruptor.substitute_request(&mut confused, rng)?;
                }
            }
            (true, false) => self.confuse_inform(&mut confused, rng)?,
            (false, true) => {
                self.corruptor.substitute_request(&mut confused, rng)?;
            }
            (false, false) => {
                self.corruptor
                    .substitute_intent(&mut confused, self.config.exclude_thanks, rng);
            }
        }

        if self.config.intent_error_prob > 0.0 && rng.gen_bool(self.config.intent_error_prob) {
            self.corruptor
                .substitute_intent(&mut confused, self.config.exclude_thanks, rng);
        }
        Ok(confused)
    }

    fn confuse_inform<R: Rng + ?Sized>(
        &self,
        action: &mut SemanticAction,
        rng: &mut R,
    ) -> Result<(), NoiseError> {
        let mode = self.inform_modes.sample(rng);
        let slot = self.corruptor.pick_inform_slot(action, rng);
        match (mode, slot) {
            (0, Some(slot)) => {
                self.corruptor.substitute_value(action, &slot, rng)?;
            }
            (1, Some(slot)) => {
                self.corruptor.substitute_slot(action, &slot, rng)?;
            }
            _ => {
                self.corruptor.add_spurious_slot(action, rng)?;
            }
        }
        Ok(())
    }
}
