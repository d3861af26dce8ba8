//! Tracker registry: configuration tag → constructor.
//!
//! [`TrackerRegistry`] replaces load-by-name component selection. The
//! `[run] tracker` tag picks a constructor from an explicit table; unknown
//! tags fail with a diagnostic listing what is registered.

use std::collections::BTreeMap;
use std::sync::Arc;

use miette::Diagnostic;
use rand::rngs::StdRng;
use thiserror::Error;

use crate::data::Vocabulary;
use crate::db::ConstraintStore;
use crate::domain::Domain;
use crate::error::SimResult;
use crate::tracker::{
    BeliefConfig, BeliefStateTracker, DialogueTracker, StateEncoder, StateTracker,
};

#[derive(Debug, Error, Diagnostic)]
pub enum RegistryError {
    #[error("unknown tracker \"{tag}\"")]
    #[diagnostic(
        code(dsim::registry::unknown_tag),
        help("Registered trackers: {known}. Set `[run] tracker` to one of them.")
    )]
    UnknownTag { tag: String, known: String },
}

/// Everything a tracker constructor may draw on.
pub struct TrackerContext {
    pub domain: Arc<Domain>,
    pub store: Arc<ConstraintStore>,
    pub vocabulary: Arc<Vocabulary>,
    pub max_round: usize,
    pub belief: BeliefConfig,
    pub rng: StdRng,
}

pub type TrackerConstructor = fn(TrackerContext) -> SimResult<Box<dyn DialogueTracker>>;

fn build_state(cx: TrackerContext) -> SimResult<Box<dyn DialogueTracker>> {
    let encoder = StateEncoder::new(cx.domain, cx.max_round);
    Ok(Box::new(StateTracker::new(cx.store, encoder)))
}

fn build_belief(cx: TrackerContext) -> SimResult<Box<dyn DialogueTracker>> {
    let encoder = StateEncoder::new(cx.domain, cx.max_round);
    let tracker = BeliefStateTracker::new(cx.store, encoder, cx.vocabulary, cx.belief, cx.rng)?;
    Ok(Box::new(tracker))
}

#[derive(Clone)]
pub struct TrackerRegistry {
    constructors: BTreeMap<String, TrackerConstructor>,
}

impl TrackerRegistry {
    /// A registry with no trackers.
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Register (or replace) the constructor for `tag`.
    pub fn register(&mut self, tag: impl Into<String>, constructor: TrackerConstructor) {
        self.constructors.insert(tag.into(), constructor);
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.constructors.contains_key(tag)
    }

    /// Registered tags in sorted order.
    pub fn tags(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    pub fn build(&self, tag: &str, cx: TrackerContext) -> SimResult<Box<dyn DialogueTracker>> {
        let constructor = self.constructors.get(tag).ok_or_else(|| RegistryError::UnknownTag {
            tag: tag.to_string(),
            known: self.tags().join(", "),
        })?;
        let tracker = constructor(cx)?;
        tracing::debug!(tag, kind = tracker.kind(), "tracker constructed");
        Ok(tracker)
    }
}

impl Default for TrackerRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(StateTracker::KIND, build_state);
        registry.register(BeliefStateTracker::KIND, build_belief);
        registry
    }
}

impl std::fmt::Debug for TrackerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerRegistry")
            .field("tags", &self.tags())
            .finish()
    }
}
