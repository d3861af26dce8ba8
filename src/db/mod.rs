//! Constraint store: the in-memory entity table and its memoized queries.
//!
//! - [`store`]: constraint matching and per-slot match counting, each with
//!   its own `DashMap` cache keyed by the frozen constraint set
//! - [`resolve`]: agent-inform resolution and value suggestion built on top
//!   of the match query
//!
//! The table is immutable for the life of a store, so cache entries never go
//! stale; [`ConstraintStore::reload`] is the only operation that clears them.

pub mod resolve;
pub mod store;

pub use store::{ConstraintKey, ConstraintStore, MatchResult, SlotCounts, TOTAL_KEY};
