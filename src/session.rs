//! Episode orchestration.
//!
//! [`Simulation`] holds the read-mostly state of a run (domain, constraint
//! store, vocabulary, goal pool) behind `Arc`s. Each [`DialogueSession`]
//! owns its own tracker, user simulator, noise injector and RNG, so
//! sessions can run on separate rayon workers against one shared store.

use std::path::Path;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;

use crate::action::SemanticAction;
use crate::config::{SimConfig, invalid};
use crate::data::{DataSet, UserGoal, Vocabulary};
use crate::db::ConstraintStore;
use crate::domain::Domain;
use crate::error::{SimResult, UserSimError};
use crate::noise::NoiseInjector;
use crate::policy::{Policy, RulePolicy};
use crate::registry::{TrackerContext, TrackerRegistry};
use crate::tracker::DialogueTracker;
use crate::user::RuleBasedUser;

/// Result of one agent turn plus the user's answer.
#[derive(Debug, Clone)]
pub struct RoundOutcome {
    /// Encoded state after the user turn; zeros once `done`.
    pub state: Vec<f32>,
    pub reward: i64,
    pub done: bool,
    pub success: bool,
    /// The agent action as the user saw it (placeholders resolved).
    pub agent: SemanticAction,
    /// The user action as the tracker committed it.
    pub user: SemanticAction,
}

/// Totals for one finished episode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpisodeReport {
    pub success: bool,
    pub reward: i64,
    /// Agent turns taken.
    pub rounds: usize,
    pub goal: Option<UserGoal>,
}

/// Aggregate over many episodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub episodes: usize,
    pub successes: usize,
    pub total_reward: i64,
    pub total_rounds: usize,
}

impl RunSummary {
    pub fn record(&mut self, report: &EpisodeReport) {
        self.episodes += 1;
        self.successes += usize::from(report.success);
        self.total_reward += report.reward;
        self.total_rounds += report.rounds;
    }

    pub fn merge(&mut self, other: &RunSummary) {
        self.episodes += other.episodes;
        self.successes += other.successes;
        self.total_reward += other.total_reward;
        self.total_rounds += other.total_rounds;
    }

    pub fn success_rate(&self) -> f64 {
        ratio(self.successes as f64, self.episodes)
    }

    pub fn average_reward(&self) -> f64 {
        ratio(self.total_reward as f64, self.episodes)
    }

    pub fn average_rounds(&self) -> f64 {
        ratio(self.total_rounds as f64, self.episodes)
    }
}

fn ratio(total: f64, episodes: usize) -> f64 {
    if episodes == 0 { 0.0 } else { total / episodes as f64 }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "episodes: {}, success rate: {:.3}, avg reward: {:.2}, avg rounds: {:.2}",
            self.episodes,
            self.success_rate(),
            self.average_reward(),
            self.average_rounds()
        )
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One user, one tracker, one error model: a single dialogue at a time.
pub struct DialogueSession {
    tracker: Box<dyn DialogueTracker>,
    user: RuleBasedUser,
    noise: NoiseInjector,
    rng: StdRng,
    started: bool,
    done: bool,
}

impl DialogueSession {
    pub fn new(
        tracker: Box<dyn DialogueTracker>,
        user: RuleBasedUser,
        noise: NoiseInjector,
        rng: StdRng,
    ) -> Self {
        Self {
            tracker,
            user,
            noise,
            rng,
            started: false,
            done: false,
        }
    }

    pub fn tracker(&self) -> &dyn DialogueTracker {
        self.tracker.as_ref()
    }

    pub fn user(&self) -> &RuleBasedUser {
        &self.user
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Begin an episode and return the opening user action as committed.
    pub fn reset(&mut self) -> SimResult<SemanticAction> {
        self.tracker.reset();
        let mut action = self.user.reset()?;
        self.noise.infuse_error(&mut action, &mut self.rng)?;
        let committed = self.tracker.ingest_user_action(action)?;
        self.started = true;
        self.done = false;
        Ok(committed)
    }

    /// One agent turn chosen by `policy`, then the user's reply.
    pub fn run_round(&mut self, policy: &mut dyn Policy) -> SimResult<RoundOutcome> {
        if !self.started {
            return Err(UserSimError::NotStarted.into());
        }
        let state = self.tracker.encode(false)?;
        let (_, chosen) = policy.choose_action(&state)?;
        let agent = self.tracker.ingest_agent_action(chosen)?;

        let mut outcome = self.user.step(&agent)?;
        if !outcome.done {
            self.noise.infuse_error(&mut outcome.action, &mut self.rng)?;
        }
        let user = self.tracker.ingest_user_action(outcome.action)?;
        let state = self.tracker.encode(outcome.done)?;
        self.done = outcome.done;

        Ok(RoundOutcome {
            state,
            reward: outcome.reward,
            done: outcome.done,
            success: outcome.success,
            agent,
            user,
        })
    }

    /// Run a whole episode under `policy`.
    pub fn run_episode(&mut self, policy: &mut dyn Policy) -> SimResult<EpisodeReport> {
        policy.reset();
        self.reset()?;
        let mut reward = 0;
        let mut rounds = 0;
        loop {
            let outcome = self.run_round(policy)?;
            reward += outcome.reward;
            rounds += 1;
            if outcome.done {
                let report = EpisodeReport {
                    success: outcome.success,
                    reward,
                    rounds,
                    goal: self.user.goal().cloned(),
                };
                tracing::info!(
                    success = report.success,
                    reward = report.reward,
                    rounds = report.rounds,
                    tracker = self.tracker.kind(),
                    "episode finished"
                );
                return Ok(report);
            }
        }
    }
}

impl std::fmt::Debug for DialogueSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogueSession")
            .field("tracker", &self.tracker.kind())
            .field("round", &self.tracker.round())
            .field("user", &self.user)
            .field("done", &self.done)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

/// Shared state of a run and the factory for its sessions.
pub struct Simulation {
    config: SimConfig,
    domain: Arc<Domain>,
    store: Arc<ConstraintStore>,
    vocabulary: Arc<Vocabulary>,
    goals: Arc<Vec<UserGoal>>,
    registry: TrackerRegistry,
}

impl Simulation {
    pub fn new(config: SimConfig, data: DataSet) -> SimResult<Self> {
        Self::with_registry(config, data, TrackerRegistry::default())
    }

    pub fn with_registry(
        config: SimConfig,
        data: DataSet,
        registry: TrackerRegistry,
    ) -> SimResult<Self> {
        config.validate()?;
        if !registry.contains(&config.run.tracker) {
            return Err(crate::registry::RegistryError::UnknownTag {
                tag: config.run.tracker.clone(),
                known: registry.tags().join(", "),
            }
            .into());
        }
        if data.goals.is_empty() {
            return Err(UserSimError::EmptyGoalPool.into());
        }
        let domain = Domain::new(config.domain.clone())?;
        let store = ConstraintStore::new(data.entities, &domain);
        Ok(Self {
            config,
            domain: Arc::new(domain),
            store: Arc::new(store),
            vocabulary: Arc::new(data.vocabulary),
            goals: Arc::new(data.goals),
            registry,
        })
    }

    /// Load the data files named by `config`, relative paths taken from
    /// `base`.
    pub fn load(config: SimConfig, base: &Path) -> SimResult<Self> {
        let data = DataSet::load(
            &base.join(&config.data.entities),
            &base.join(&config.data.vocabulary),
            &base.join(&config.data.goals),
        )?;
        Self::new(config, data)
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn domain(&self) -> &Arc<Domain> {
        &self.domain
    }

    pub fn store(&self) -> &Arc<ConstraintStore> {
        &self.store
    }

    pub fn goals(&self) -> &[UserGoal] {
        &self.goals
    }

    pub fn rule_policy(&self) -> SimResult<RulePolicy> {
        Ok(RulePolicy::new(&self.domain)?)
    }

    /// A fresh session drawing its randomness from RNG stream `stream`.
    pub fn session(&self, stream: u64) -> SimResult<DialogueSession> {
        let mut seeds = self.config.rng(stream);
        let max_round = self.config.run.max_round;
        let tracker = self.registry.build(
            &self.config.run.tracker,
            TrackerContext {
                domain: Arc::clone(&self.domain),
                store: Arc::clone(&self.store),
                vocabulary: Arc::clone(&self.vocabulary),
                max_round,
                belief: self.config.belief.clone(),
                rng: StdRng::seed_from_u64(seeds.next_u64()),
            },
        )?;
        let user = RuleBasedUser::new(
            Arc::clone(&self.domain),
            Arc::clone(&self.goals),
            max_round,
            StdRng::seed_from_u64(seeds.next_u64()),
        );
        let noise = NoiseInjector::new(
            self.config.noise.clone(),
            Arc::clone(&self.domain),
            Arc::clone(&self.vocabulary),
        )?;
        let rng = StdRng::seed_from_u64(seeds.next_u64());
        Ok(DialogueSession::new(tracker, user, noise, rng))
    }

    /// Run `episodes` episodes sequentially in one session.
    pub fn run(&self, episodes: usize, policy: &mut dyn Policy) -> SimResult<RunSummary> {
        let mut session = self.session(0)?;
        let mut summary = RunSummary::default();
        for _ in 0..episodes {
            summary.record(&session.run_episode(policy)?);
        }
        tracing::info!(%summary, "run finished");
        Ok(summary)
    }

    /// Split `episodes` across `workers` independent sessions on the rayon
    /// pool. Each worker builds its own policy with `make_policy`.
    pub fn run_parallel<P, F>(
        &self,
        episodes: usize,
        workers: usize,
        make_policy: F,
    ) -> SimResult<RunSummary>
    where
        P: Policy,
        F: Fn() -> SimResult<P> + Sync,
    {
        if workers == 0 {
            return Err(invalid("workers must be at least 1").into());
        }
        let share = episodes / workers;
        let extra = episodes % workers;

        let parts: Vec<RunSummary> = (0..workers)
            .into_par_iter()
            .map(|worker| {
                let count = share + usize::from(worker < extra);
                let mut policy = make_policy()?;
                let mut session = self.session(worker as u64 + 1)?;
                let mut summary = RunSummary::default();
                for _ in 0..count {
                    summary.record(&session.run_episode(&mut policy)?);
                }
                tracing::debug!(worker, episodes = count, "worker finished");
                Ok(summary)
            })
            .collect::<SimResult<_>>()?;

        let mut summary = RunSummary::default();
        for part in &parts {
            summary.merge(part);
        }
        let (match_cache, count_cache) = self.store.cache_sizes();
        tracing::info!(%summary, workers, match_cache, count_cache, "parallel run finished");
        Ok(summary)
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("tracker", &self.config.run.tracker)
            .field("entities", &self.store.len())
            .field("goals", &self.goals.len())
            .field("registry", &self.registry)
            .finish()
    }
}
