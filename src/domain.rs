//! Domain description: the slot vocabulary and the slot roles the rest of
//! the system keys off (match key, unqueryable slots, pass-through slots).
//!
//! [`DomainConfig`] is the serialisable `[domain]` config section;
//! [`Domain`] is the validated, indexed form shared (behind an `Arc`) by the
//! constraint store, trackers, noise injector and user simulator.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::action::Intent;
use crate::config::ConfigError;

/// `[domain]` section of the simulator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Global slot vocabulary, in bag-of-slots encoding order.
    #[serde(default = "default_slots")]
    pub slots: Vec<String>,
    /// Slots the agent may inform (one action each in the action space).
    #[serde(default = "default_agent_inform_slots")]
    pub agent_inform_slots: Vec<String>,
    /// Slots the agent may request (one action each in the action space).
    #[serde(default = "default_agent_request_slots")]
    pub agent_request_slots: Vec<String>,
    /// Slot carrying the matched entity id; every goal implicitly requests it.
    #[serde(default = "default_match_key")]
    pub match_key: String,
    /// Slots excluded from constraint matching.
    #[serde(default = "default_unqueryable")]
    pub unqueryable: Vec<String>,
    /// Goal informs the user always reveals in the opening turn, when present.
    #[serde(default = "default_required_initial_informs")]
    pub required_initial_informs: Vec<String>,
    /// Slots whose inform value is copied through instead of resolved.
    #[serde(default = "default_passthrough_slots")]
    pub passthrough_slots: Vec<String>,
    /// Slots resolved to an availability sentinel rather than a value.
    #[serde(default = "default_availability_slots")]
    pub availability_slots: Vec<String>,
    /// Intents a user (or its noisy channel) may produce.
    #[serde(default = "default_user_intents")]
    pub user_intents: Vec<Intent>,
    /// Request order of the warm-up rule policy.
    #[serde(default = "default_rule_requests")]
    pub rule_requests: Vec<String>,
    /// Slots the warm-up rule policy informs after its requests.
    #[serde(default)]
    pub rule_informs: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_slots() -> Vec<String> {
    strings(&[
        "actor",
        "actress",
        "city",
        "critic_rating",
        "date",
        "description",
        "distanceconstraints",
        "genre",
        "greeting",
        "implicit_value",
        "movie_series",
        "moviename",
        "mpaa_rating",
        "numberofpeople",
        "numberofkids",
        "other",
        "price",
        "seating",
        "starttime",
        "state",
        "theater",
        "theater_chain",
        "video_format",
        "zip",
        "result",
        "ticket",
        "mc_list",
    ])
}
fn default_agent_inform_slots() -> Vec<String> {
    strings(&[
        "moviename",
        "theater",
        "starttime",
        "date",
        "genre",
        "state",
        "city",
        "zip",
        "critic_rating",
        "mpaa_rating",
        "distanceconstraints",
        "video_format",
        "theater_chain",
        "price",
        "actor",
        "description",
        "other",
        "numberofkids",
    ])
}
fn default_agent_request_slots() -> Vec<String> {
    strings(&[
        "moviename",
        "theater",
        "starttime",
        "date",
        "numberofpeople",
        "genre",
        "state",
        "city",
        "zip",
        "critic_rating",
        "mpaa_rating",
        "distanceconstraints",
        "video_format",
        "theater_chain",
        "price",
        "actor",
        "description",
        "other",
        "numberofkids",
    ])
}
fn default_match_key() -> String {
    "ticket".into()
}
fn default_unqueryable() -> Vec<String> {
    strings(&["numberofpeople", "ticket"])
}
fn default_required_initial_informs() -> Vec<String> {
    strings(&["moviename"])
}
fn default_passthrough_slots() -> Vec<String> {
    strings(&["numberofpeople"])
}
fn default_availability_slots() -> Vec<String> {
    strings(&["ticket", "taskcomplete"])
}
fn default_user_intents() -> Vec<Intent> {
    vec![
        Intent::Inform,
        Intent::Request,
        Intent::Thanks,
        Intent::Reject,
        Intent::Done,
    ]
}
fn default_rule_requests() -> Vec<String> {
    strings(&[
        "moviename",
        "starttime",
        "city",
        "date",
        "theater",
        "numberofpeople",
    ])
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            slots: default_slots(),
            agent_inform_slots: default_agent_inform_slots(),
            agent_request_slots: default_agent_request_slots(),
            match_key: default_match_key(),
            unqueryable: default_unqueryable(),
            required_initial_informs: default_required_initial_informs(),
            passthrough_slots: default_passthrough_slots(),
            availability_slots: default_availability_slots(),
            user_intents: default_user_intents(),
            rule_requests: default_rule_requests(),
            rule_informs: Vec::new(),
        }
    }
}

/// Validated domain with an O(1) slot index.
#[derive(Debug, Clone)]
pub struct Domain {
    config: DomainConfig,
    slot_index: HashMap<String, usize>,
}

impl Domain {
    /// Validate and index a domain description.
    ///
    /// Slot names must be unique, and the match key plus every agent
    /// inform/request slot must belong to the slot vocabulary.
    pub fn new(config: DomainConfig) -> Result<Self, ConfigError> {
        let mut slot_index = HashMap::with_capacity(config.slots.len());
        for (i, slot) in config.slots.iter().enumerate() {
            if slot_index.insert(slot.clone(), i).is_some() {
                return Err(ConfigError::Invalid {
                    message: format!("slot \"{slot}\" is listed twice in domain.slots"),
                });
            }
        }

        let must_exist = std::iter::once(&config.match_key)
            .chain(config.agent_inform_slots.iter())
            .chain(config.agent_request_slots.iter())
            .chain(config.rule_requests.iter())
            .chain(config.rule_informs.iter());
        for slot in must_exist {
            if !slot_index.contains_key(slot) {
                return Err(ConfigError::Invalid {
                    message: format!("slot \"{slot}\" is not in domain.slots"),
                });
            }
        }
        if config.agent_inform_slots.contains(&config.match_key) {
            return Err(ConfigError::Invalid {
                message: format!(
                    "match key \"{}\" cannot be an agent inform slot",
                    config.match_key
                ),
            });
        }
        if config.user_intents.is_empty() {
            return Err(ConfigError::Invalid {
                message: "domain.user_intents is empty".into(),
            });
        }

        Ok(Self { config, slot_index })
    }

    pub fn config(&self) -> &DomainConfig {
        &self.config
    }

    pub fn slots(&self) -> &[String] {
        &self.config.slots
    }

    pub fn num_slots(&self) -> usize {
        self.config.slots.len()
    }

    /// Position of a slot in the bag-of-slots encoding.
    pub fn slot_index(&self, slot: &str) -> Option<usize> {
        self.slot_index.get(slot).copied()
    }

    pub fn contains_slot(&self, slot: &str) -> bool {
        self.slot_index.contains_key(slot)
    }

    pub fn match_key(&self) -> &str {
        &self.config.match_key
    }

    pub fn is_unqueryable(&self, slot: &str) -> bool {
        self.config.unqueryable.iter().any(|s| s == slot)
    }

    pub fn user_intents(&self) -> &[Intent] {
        &self.config.user_intents
    }
}
