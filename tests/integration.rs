//! End-to-end tests: snapshot files on disk, a config, whole episodes.
//!
//! These drive the simulator through the public API the way the CLI does,
//! so the loaders, the registry, both trackers and the user simulator are
//! exercised together.

use std::path::Path;
use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;

use dialogue_sim::action::{Intent, NO_MATCH, SemanticAction, UNKNOWN};
use dialogue_sim::config::SimConfig;
use dialogue_sim::data::{self, UserGoal};
use dialogue_sim::db::ConstraintStore;
use dialogue_sim::domain::{Domain, DomainConfig};
use dialogue_sim::error::SimResult;
use dialogue_sim::noise::ErrorModelConfig;
use dialogue_sim::policy::{ActionSpace, Policy};
use dialogue_sim::session::Simulation;
use dialogue_sim::tracker::{DialogueTracker, StateEncoder, StateTracker};
use dialogue_sim::user::{ConstraintCheck, RuleBasedUser};

const ENTITIES: &str = r#"{
    "1": {"moviename": "zootopia", "city": "seattle", "theater": "regal", "starttime": "7pm", "date": "friday"},
    "2": {"moviename": "zootopia", "city": "portland", "theater": "amc", "starttime": "9pm", "date": "friday"},
    "3": {"moviename": "deadpool", "city": "seattle", "theater": "amc", "starttime": "9pm", "date": ""}
}"#;

const VOCABULARY: &str = r#"{
    "moviename": ["zootopia", "deadpool"],
    "city": ["seattle", "portland"],
    "theater": ["regal", "amc"],
    "starttime": ["7pm", "9pm"],
    "date": ["friday", "saturday"]
}"#;

const GOALS: &str = r#"[
    {"inform_slots": {"moviename": "zootopia", "city": "seattle", "starttime": "7pm"},
     "request_slots": {"theater": "UNK"}},
    {"inform_slots": {"moviename": "deadpool", "city": "seattle"},
     "request_slots": {"theater": "UNK", "starttime": "UNK"}}
]"#;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn domain_config() -> DomainConfig {
    DomainConfig {
        slots: strings(&["moviename", "city", "theater", "starttime", "date", "ticket"]),
        agent_inform_slots: strings(&["moviename", "city", "theater", "starttime", "date"]),
        agent_request_slots: strings(&["moviename", "city", "theater", "starttime", "date"]),
        rule_requests: strings(&["moviename", "city", "starttime"]),
        ..Default::default()
    }
}

/// Writes the snapshot files plus a config referencing them by relative
/// path, and returns the config path.
fn write_fixture(dir: &Path, tweak: impl FnOnce(&mut SimConfig)) -> std::path::PathBuf {
    let data_dir = dir.join("data");
    std::fs::create_dir_all(&data_dir).unwrap();
    std::fs::write(data_dir.join("entities.json"), ENTITIES).unwrap();
    std::fs::write(data_dir.join("vocabulary.json"), VOCABULARY).unwrap();
    std::fs::write(data_dir.join("goals.json"), GOALS).unwrap();

    let mut config = SimConfig::default();
    config.run.seed = Some(2024);
    config.run.max_round = 12;
    config.noise = ErrorModelConfig::noiseless();
    config.domain = domain_config();
    tweak(&mut config);

    let path = dir.join("sim.toml");
    config.save(&path).unwrap();
    path
}

fn load(dir: &Path, tweak: impl FnOnce(&mut SimConfig)) -> Simulation {
    let path = write_fixture(dir, tweak);
    let config = SimConfig::load(&path).unwrap();
    Simulation::load(config, dir).unwrap()
}

/// Always emits the same canonical action.
struct RepeatPolicy {
    index: usize,
    action: SemanticAction,
}

impl RepeatPolicy {
    fn new(space: &ActionSpace, action: SemanticAction) -> Self {
        let index = space.index_of(&action).unwrap();
        Self { index, action }
    }
}

impl Policy for RepeatPolicy {
    fn choose_action(&mut self, _state: &[f32]) -> SimResult<(usize, SemanticAction)> {
        Ok((self.index, self.action.clone()))
    }

    fn reset(&mut self) {}
}

#[test]
fn noiseless_rule_policy_always_succeeds() {
    let dir = tempfile::TempDir::new().unwrap();
    let sim = load(dir.path(), |_| {});
    assert_eq!(sim.store().len(), 3);
    assert_eq!(sim.goals().len(), 2);

    let mut policy = sim.rule_policy().unwrap();
    let summary = sim.run(20, &mut policy).unwrap();
    assert_eq!(summary.episodes, 20);
    assert_eq!(summary.successes, 20);
    assert_eq!(summary.success_rate(), 1.0);
    assert_eq!(summary.average_rounds(), 5.0);
}

#[test]
fn empty_values_are_dropped_at_load() {
    let dir = tempfile::TempDir::new().unwrap();
    let sim = load(dir.path(), |_| {});
    let record = sim.store().entity(3).unwrap();
    assert!(!record.contains_key("date"));
}

#[test]
fn round_limit_ends_in_failure() {
    let dir = tempfile::TempDir::new().unwrap();
    let sim = load(dir.path(), |c| c.run.max_round = 6);
    let space = ActionSpace::new(sim.domain());
    let mut policy = RepeatPolicy::new(&space, SemanticAction::request("city"));

    let mut session = sim.session(0).unwrap();
    let report = session.run_episode(&mut policy).unwrap();
    assert!(!report.success);
    assert_eq!(report.rounds, 6);
    // five ongoing turns, then -1 - max_round
    assert_eq!(report.reward, -5 - 7);
}

#[test]
fn belief_tracker_runs_under_noise() {
    let dir = tempfile::TempDir::new().unwrap();
    let sim = load(dir.path(), |c| {
        c.run.tracker = "belief".into();
        c.noise.slot_error_prob = 0.2;
        c.noise.intent_error_prob = 0.05;
        c.belief.n_best = 3;
    });
    let mut policy = sim.rule_policy().unwrap();
    let mut session = sim.session(5).unwrap();
    assert_eq!(session.tracker().kind(), "belief");

    for _ in 0..10 {
        let report = session.run_episode(&mut policy).unwrap();
        assert!(report.rounds <= 12);
        assert!(report.reward >= -12 - 13);
        assert!(report.reward <= 2 * 12 - 1);

        let (rows, width) = session.tracker().db_feature_size().unwrap();
        let features = session.tracker().encode_db_features().unwrap();
        assert_eq!(features.len(), rows);
        assert!(features.iter().all(|r| r.len() == width));
        let hypotheses = &session.tracker().history().last().unwrap().hypotheses;
        assert_eq!(hypotheses.len(), 3);
        let total: f64 = hypotheses.iter().map(|h| h.probability).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }
}

#[test]
fn parallel_workers_share_one_store() {
    let dir = tempfile::TempDir::new().unwrap();
    let sim = load(dir.path(), |_| {});
    let summary = sim.run_parallel(12, 4, || sim.rule_policy()).unwrap();
    assert_eq!(summary.episodes, 12);
    assert_eq!(summary.successes, 12);
    let (matches, _) = sim.store().cache_sizes();
    assert!(matches > 0);
}

#[test]
fn seeded_runs_are_reproducible() {
    let dir = tempfile::TempDir::new().unwrap();
    let sim = load(dir.path(), |c| c.noise.slot_error_prob = 0.3);
    let run = || {
        let mut policy = sim.rule_policy().unwrap();
        let mut session = sim.session(9).unwrap();
        (0..5)
            .map(|_| session.run_episode(&mut policy).unwrap())
            .collect::<Vec<_>>()
    };
    assert_eq!(run(), run());
}

// ---------------------------------------------------------------------------
// Tracker and user simulator in the loop
// ---------------------------------------------------------------------------

struct Loop {
    tracker: StateTracker,
    user: RuleBasedUser,
}

impl Loop {
    fn new(goal: UserGoal) -> (Self, SemanticAction) {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("entities.json");
        std::fs::write(&path, ENTITIES).unwrap();
        let entities = data::load_entities(&path).unwrap();

        let domain = Arc::new(Domain::new(domain_config()).unwrap());
        let store = Arc::new(ConstraintStore::new(entities, &domain));
        let mut tracker = StateTracker::new(store, StateEncoder::new(Arc::clone(&domain), 20));
        let mut user = RuleBasedUser::new(domain, Arc::new(Vec::new()), 20, StdRng::seed_from_u64(8));

        let opening = user.reset_with_goal(goal).unwrap();
        tracker.ingest_user_action(opening.clone()).unwrap();
        (Self { tracker, user }, opening)
    }

    fn turn(&mut self, agent: SemanticAction) -> (SemanticAction, dialogue_sim::user::StepOutcome) {
        let seen = self.tracker.ingest_agent_action(agent).unwrap();
        let outcome = self.user.step(&seen).unwrap();
        self.tracker.ingest_user_action(outcome.action.clone()).unwrap();
        (seen, outcome)
    }
}

fn seattle_goal() -> UserGoal {
    let mut goal = UserGoal::default();
    goal.inform_slots.insert("city".into(), "seattle".into());
    goal.request_slots.insert("theater".into(), UNKNOWN.into());
    goal
}

#[test]
fn immediate_match_scenario() {
    let (mut lp, opening) = Loop::new(seattle_goal());
    assert_eq!(opening.inform_slots["city"], "seattle");

    let (_, out) = lp.turn(SemanticAction::request("city"));
    assert_eq!(out.action.intent, Intent::Inform);
    assert_eq!(out.action.inform_slots["city"], "seattle");

    let (seen, out) = lp.turn(SemanticAction::new(Intent::MatchFound));
    assert_eq!(seen.inform_slots["ticket"], "1");
    assert_eq!(seen.inform_slots["theater"], "regal");
    assert_eq!(lp.user.state().constraint_check, ConstraintCheck::Success);
    assert!(!out.done);

    let (_, out) = lp.turn(SemanticAction::new(Intent::Done));
    assert!(out.done);
    assert!(out.success);
    assert_eq!(out.reward, 2 * 20 - 1);
}

#[test]
fn mismatch_scenario() {
    let (mut lp, _) = Loop::new(seattle_goal());
    // The agent informs a contradicting city, then proposes a match on it.
    let (seen, out) = lp.turn(SemanticAction::inform("city", "portland"));
    assert_eq!(seen.inform_slots["city"], "portland");
    assert_eq!(out.action.inform_slots["city"], "seattle");

    // Propose a portland entity directly.
    let found = SemanticAction::new(Intent::MatchFound)
        .with_inform("ticket", "2")
        .with_inform("city", "portland")
        .with_inform("theater", "amc");
    let out = lp.user.step(&SemanticAction { round: Some(3), ..found }).unwrap();
    assert_eq!(lp.user.state().constraint_check, ConstraintCheck::Fail);
    assert_eq!(out.action.intent, Intent::Reject);
    assert!(out.action.inform_slots.is_empty());
    assert!(out.action.request_slots.is_empty());
}

#[test]
fn no_match_is_data_not_an_error() {
    let mut goal = seattle_goal();
    goal.inform_slots.insert("moviename".into(), "inception".into());
    let (mut lp, _) = Loop::new(goal);
    let (seen, out) = lp.turn(SemanticAction::new(Intent::MatchFound));
    assert_eq!(seen.inform_slots["ticket"], NO_MATCH);
    assert_eq!(out.action.intent, Intent::Reject);

    let (_, out) = lp.turn(SemanticAction::new(Intent::Done));
    assert!(out.done);
    assert!(!out.success);
    assert_eq!(out.reward, -1 - 20);
}
