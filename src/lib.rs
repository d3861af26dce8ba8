// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # dialogue-sim
//!
//! Dialogue-state tracking and user simulation for training task-oriented
//! dialogue agents.
//!
//! ## Architecture
//!
//! - **Actions** (`action`): the semantic dialogue act exchanged by both sides
//! - **Constraint store** (`db`): entity matching with memoized queries
//! - **State tracking** (`tracker`): plain and N-best belief trackers that
//!   resolve agent informs and encode the dialogue for a policy
//! - **Noise** (`noise`): error models corrupting user actions
//! - **User simulation** (`user`): goal-directed rule-based user
//! - **Orchestration** (`session`, `policy`, `registry`): episodes, the
//!   agent action vocabulary and tracker selection by tag
//!
//! ## Library usage
//!
//! ```no_run
//! use std::path::Path;
//!
//! use dialogue_sim::config::SimConfig;
//! use dialogue_sim::session::Simulation;
//!
//! let config = SimConfig::load(Path::new("sim.toml")).unwrap();
//! let sim = Simulation::load(config, Path::new(".")).unwrap();
//! let mut policy = sim.rule_policy().unwrap();
//! let summary = sim.run(10, &mut policy).unwrap();
//! println!("{summary}");
//! ```

pub mod action;
pub mod config;
pub mod data;
pub mod db;
pub mod domain;
pub mod error;
pub mod noise;
pub mod policy;
pub mod registry;
pub mod session;
pub mod tracker;
pub mod user;
