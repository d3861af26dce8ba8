//! Rich diagnostic error types for the dialogue simulator.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives.
//! Almost every variant here is a contract violation: a bug in an upstream
//! component (policy, user simulator, noise configuration) that aborts the
//! current episode. Constraint queries that find nothing are *not* errors;
//! they travel as data through [`crate::db::MatchResult`] and the
//! [`crate::action::NO_MATCH`] sentinel.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the dialogue simulator.
#[derive(Debug, Error, Diagnostic)]
pub enum SimError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Noise(#[from] NoiseError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    UserSim(#[from] UserSimError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Registry(#[from] crate::registry::RegistryError),
}

// ---------------------------------------------------------------------------
// Action shape errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ActionError {
    #[error("request action carries no request slots")]
    #[diagnostic(
        code(dsim::action::empty_request),
        help("A `request` action must name at least one slot it wants resolved.")
    )]
    EmptyRequest,

    #[error("inform action carries no inform slots")]
    #[diagnostic(
        code(dsim::action::empty_inform),
        help("An `inform` action must carry at least one slot/value pair.")
    )]
    EmptyInform,

    #[error("inform action also carries request slots: {slots:?}")]
    #[diagnostic(
        code(dsim::action::mixed_inform),
        help("Emit the inform and the request as separate turns, or use intent `request` with volunteered informs.")
    )]
    InformWithRequests { slots: Vec<String> },

    #[error("slot \"{slot}\" still holds the sentinel \"{value}\"")]
    #[diagnostic(
        code(dsim::action::unresolved_value),
        help(
            "Placeholder and unknown values must be resolved before an action is committed. \
             Agent informs are resolved by the state tracker against the constraint store."
        )
    )]
    UnresolvedValue { slot: String, value: String },

    #[error("unknown intent label \"{label}\"")]
    #[diagnostic(
        code(dsim::action::unknown_intent),
        help("Valid intents are listed by `Intent::ALL` (request, inform, match_found, done, ...).")
    )]
    UnknownIntent { label: String },
}

// ---------------------------------------------------------------------------
// Constraint store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum DbError {
    #[error("entity {id} not found in the entity table")]
    #[diagnostic(
        code(dsim::db::entity_not_found),
        help("The match key refers to an entity id that is not loaded. Check the entity table file.")
    )]
    EntityNotFound { id: u64 },

    #[error("inform resolution produced no slots")]
    #[diagnostic(
        code(dsim::db::empty_resolution),
        help(
            "Every requested inform slot was dropped during resolution. \
             The agent asked to inform only slots that resolution skips (e.g. `thanks`)."
        )
    )]
    EmptyResolution,
}

// ---------------------------------------------------------------------------
// Noise injection errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum NoiseError {
    #[error("slot \"{slot}\" has no known values in the vocabulary")]
    #[diagnostic(
        code(dsim::noise::unknown_slot),
        help(
            "The noise injector only corrupts slots with a declared value domain. \
             Add the slot to the vocabulary file or remove it from the action."
        )
    )]
    UnknownSlot { slot: String },

    #[error("no candidate {what} left to substitute")]
    #[diagnostic(
        code(dsim::noise::exhausted),
        help("The slot vocabulary is too small for this corruption mode. Add slots or lower the error probability.")
    )]
    Exhausted { what: &'static str },

    #[error("invalid error-model weights: {message}")]
    #[diagnostic(
        code(dsim::noise::weights),
        help("Mode weights must be non-negative and sum to a positive value.")
    )]
    InvalidWeights { message: String },
}

// ---------------------------------------------------------------------------
// State tracker errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum TrackerError {
    #[error("slot \"{slot}\" is not part of the slot vocabulary")]
    #[diagnostic(
        code(dsim::tracker::unknown_slot),
        help("Every slot that reaches the state encoder must appear in `domain.slots`.")
    )]
    UnknownSlot { slot: String },

    #[error("match_found action already carries inform slots")]
    #[diagnostic(
        code(dsim::tracker::match_with_informs),
        help("The tracker fills `match_found` informs from the constraint store; send it empty.")
    )]
    MatchWithInforms,

    #[error("inform action may not use the reserved key \"{slot}\"")]
    #[diagnostic(
        code(dsim::tracker::reserved_key),
        help("The `match_found` label is reserved for the match-found intent.")
    )]
    ReservedKey { slot: String },

    #[error("cannot encode state: the dialogue history is empty")]
    #[diagnostic(
        code(dsim::tracker::empty_history),
        help("Ingest the initial user action (after `reset`) before encoding.")
    )]
    EmptyHistory,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Noise(#[from] NoiseError),
}

// ---------------------------------------------------------------------------
// User simulator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum UserSimError {
    #[error("goal pool is empty")]
    #[diagnostic(
        code(dsim::user::empty_goal_pool),
        help("Load at least one user goal before resetting the simulator.")
    )]
    EmptyGoalPool,

    #[error("simulator stepped before reset")]
    #[diagnostic(
        code(dsim::user::not_started),
        help("Call `reset()` to sample a goal and begin an episode.")
    )]
    NotStarted,

    #[error("agent intent `{intent}` has no transition")]
    #[diagnostic(
        code(dsim::user::unsupported_intent),
        help("The simulator reacts to request, inform, match_found and done.")
    )]
    UnsupportedAgentIntent { intent: String },

    #[error("agent match_found carries no \"{key}\" slot")]
    #[diagnostic(
        code(dsim::user::missing_match_key),
        help("The state tracker stamps the match key on match_found; ingest the action before stepping.")
    )]
    MissingMatchKey { key: String },

    #[error("agent informed the match key \"{key}\" directly")]
    #[diagnostic(
        code(dsim::user::inform_match_key),
        help("The match key is only communicated through match_found.")
    )]
    InformedMatchKey { key: String },

    #[error("simulator invariant violated: {detail}")]
    #[diagnostic(
        code(dsim::user::invariant),
        help("This is a bug in the simulator transition rules; the episode is aborted.")
    )]
    InvariantViolated { detail: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Action(#[from] ActionError),
}

// ---------------------------------------------------------------------------
// Data loading errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum DataError {
    #[error("failed to read {what} file: {path}")]
    #[diagnostic(
        code(dsim::data::io),
        help("Ensure the file exists and is readable. Paths are relative to the working directory.")
    )]
    Io {
        what: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {what} file {path}: {message}")]
    #[diagnostic(
        code(dsim::data::parse),
        help("The file must be JSON in the documented snapshot format.")
    )]
    Parse {
        what: &'static str,
        path: String,
        message: String,
    },

    #[error("entity id \"{id}\" is not a non-negative integer")]
    #[diagnostic(
        code(dsim::data::entity_id),
        help("Entity table keys must be integer ids such as \"42\".")
    )]
    InvalidEntityId { id: String },
}

/// Convenience alias for simulator operations.
pub type SimResult<T> = std::result::Result<T, SimError>;

/// Convenience alias for tracker operations.
pub type TrackerResult<T> = std::result::Result<T, TrackerError>;

/// Convenience alias for user simulator operations.
pub type UserSimResult<T> = std::result::Result<T, UserSimError>;
