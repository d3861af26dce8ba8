//! Semantic actions: the unit of dialogue communication.
//!
//! An action is an intent plus two slot maps. Inform slots carry values;
//! request slots always carry the [`UNKNOWN`] sentinel. Slot maps are
//! ordered (`BTreeMap`), so "first slot" and random draws over a map are
//! reproducible under a seeded RNG.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ActionError;

/// Value of every request slot: the speaker does not know it yet.
pub const UNKNOWN: &str = "UNK";
/// Agent-side marker for an inform value the tracker must resolve.
pub const PLACEHOLDER: &str = "PLACEHOLDER";
/// The user does not care about this slot; matches every entity.
pub const ANYTHING: &str = "anything";
/// Resolution found no entity for the slot (or no entity at all).
pub const NO_MATCH: &str = "no match available";
/// Resolution found at least one entity for an availability slot.
pub const TICKET_AVAILABLE: &str = "Ticket Available";

/// Ordered slot → value mapping.
pub type SlotMap = BTreeMap<String, String>;

/// Dialogue-act type of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Request,
    Inform,
    ConfirmQuestion,
    ConfirmAnswer,
    Greeting,
    Closing,
    MultipleChoice,
    Thanks,
    Welcome,
    Reject,
    Deny,
    NotSure,
    Done,
    MatchFound,
}

impl Intent {
    /// Every intent, in one-hot encoding order.
    pub const ALL: [Intent; 14] = [
        Intent::Request,
        Intent::Inform,
        Intent::ConfirmQuestion,
        Intent::ConfirmAnswer,
        Intent::Greeting,
        Intent::Closing,
        Intent::MultipleChoice,
        Intent::Thanks,
        Intent::Welcome,
        Intent::Reject,
        Intent::Deny,
        Intent::NotSure,
        Intent::Done,
        Intent::MatchFound,
    ];

    /// Position of this intent in [`Intent::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_label(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Inform => "inform",
            Self::ConfirmQuestion => "confirm_question",
            Self::ConfirmAnswer => "confirm_answer",
            Self::Greeting => "greeting",
            Self::Closing => "closing",
            Self::MultipleChoice => "multiple_choice",
            Self::Thanks => "thanks",
            Self::Welcome => "welcome",
            Self::Reject => "reject",
            Self::Deny => "deny",
            Self::NotSure => "not_sure",
            Self::Done => "done",
            Self::MatchFound => "match_found",
        }
    }

    pub fn from_label(label: &str) -> Result<Self, ActionError> {
        Self::ALL
            .iter()
            .copied()
            .find(|i| i.as_label() == label)
            .ok_or_else(|| ActionError::UnknownIntent {
                label: label.to_string(),
            })
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Who produced an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Agent,
}

/// One dialogue act.
///
/// `round` and `speaker` are stamped by the state tracker at ingestion;
/// freshly built actions leave them unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticAction {
    pub intent: Intent,
    #[serde(default)]
    pub inform_slots: SlotMap,
    #[serde(default)]
    pub request_slots: SlotMap,
    #[serde(default)]
    pub round: Option<usize>,
    #[serde(default)]
    pub speaker: Option<Speaker>,
}

impl SemanticAction {
    /// An action with the given intent and no slots.
    pub fn new(intent: Intent) -> Self {
        Self {
            intent,
            inform_slots: SlotMap::new(),
            request_slots: SlotMap::new(),
            round: None,
            speaker: None,
        }
    }

    /// `inform{slot: value}`.
    pub fn inform(slot: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(Intent::Inform).with_inform(slot, value)
    }

    /// `request{slot: UNK}`.
    pub fn request(slot: impl Into<String>) -> Self {
        Self::new(Intent::Request).with_request(slot)
    }

    /// Add an inform slot.
    pub fn with_inform(mut self, slot: impl Into<String>, value: impl Into<String>) -> Self {
        self.inform_slots.insert(slot.into(), value.into());
        self
    }

    /// Add a request slot (value is always [`UNKNOWN`]).
    pub fn with_request(mut self, slot: impl Into<String>) -> Self {
        self.request_slots.insert(slot.into(), UNKNOWN.to_string());
        self
    }

    /// Check the structural invariants of a committed action.
    ///
    /// `request` needs request slots; `inform` needs inform slots and no
    /// request slots; no inform value may still be a placeholder or unknown.
    pub fn validate(&self) -> Result<(), ActionError> {
        match self.intent {
            Intent::Request if self.request_slots.is_empty() => {
                return Err(ActionError::EmptyRequest);
            }
            Intent::Inform if self.inform_slots.is_empty() => {
                return Err(ActionError::EmptyInform);
            }
            Intent::Inform if !self.request_slots.is_empty() => {
                return Err(ActionError::InformWithRequests {
                    slots: self.request_slots.keys().cloned().collect(),
                });
            }
            _ => {}
        }
        self.check_resolved()
    }

    /// Fail if any inform value is [`PLACEHOLDER`] or [`UNKNOWN`], or any
    /// request value is [`PLACEHOLDER`].
    pub fn check_resolved(&self) -> Result<(), ActionError> {
        for (slot, value) in &self.inform_slots {
            if value == PLACEHOLDER || value == UNKNOWN {
                return Err(ActionError::UnresolvedValue {
                    slot: slot.clone(),
                    value: value.clone(),
                });
            }
        }
        for (slot, value) in &self.request_slots {
            if value == PLACEHOLDER {
                return Err(ActionError::UnresolvedValue {
                    slot: slot.clone(),
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }

    /// Same intent and slots, ignoring the ingestion stamps.
    pub fn same_content(&self, other: &SemanticAction) -> bool {
        self.intent == other.intent
            && self.inform_slots == other.inform_slots
            && self.request_slots == other.request_slots
    }
}

impl std::fmt::Display for SemanticAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(", self.intent)?;
        let mut first = true;
        for (k, v) in &self.inform_slots {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{k}={v}")?;
            first = false;
        }
        for k in self.request_slots.keys() {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{k}=?")?;
            first = false;
        }
        write!(f, ")")
    }
}
