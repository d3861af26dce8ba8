//! Config and snapshot files: save/load cycles and load failures.
//!
//! These verify that a config written by `init-config` reloads unchanged,
//! that hand-edited partial configs fill in defaults, and that missing or
//! malformed snapshot files surface as typed errors carrying the path.

use dialogue_sim::config::{ConfigError, SimConfig};
use dialogue_sim::data::{self, DataSet};
use dialogue_sim::error::{DataError, SimError};
use dialogue_sim::noise::SlotErrorMode;
use dialogue_sim::session::Simulation;

#[test]
fn default_config_survives_save_and_load() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("sim.toml");

    let config = SimConfig::default();
    config.save(&path).unwrap();
    let loaded = SimConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
    assert_eq!(loaded.domain.unqueryable, vec!["numberofpeople", "ticket"]);
    assert_eq!(loaded.domain.required_initial_informs, vec!["moviename"]);
}

#[test]
fn edited_config_keeps_edits_and_defaults() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("sim.toml");
    std::fs::write(
        &path,
        r#"
[run]
tracker = "belief"
seed = 5

[noise]
slot_error_mode = "slot_deletion"
intent_error_prob = 0.1

[belief]
n_best = 5
"#,
    )
    .unwrap();

    let config = SimConfig::load(&path).unwrap();
    assert_eq!(config.run.tracker, "belief");
    assert_eq!(config.run.seed, Some(5));
    assert_eq!(config.run.max_round, 20);
    assert_eq!(config.noise.slot_error_mode, SlotErrorMode::SlotDeletion);
    assert_eq!(config.belief.n_best, 5);
    assert_eq!(config.domain.match_key, "ticket");

    // Resaving and reloading is stable.
    let again = dir.path().join("again.toml");
    config.save(&again).unwrap();
    assert_eq!(SimConfig::load(&again).unwrap(), config);
}

#[test]
fn invalid_values_are_rejected_on_load() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("sim.toml");
    std::fs::write(&path, "[belief]\nn_best = 0\n").unwrap();
    assert!(matches!(
        SimConfig::load(&path),
        Err(ConfigError::Invalid { .. })
    ));
}

#[test]
fn missing_config_is_a_read_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let err = SimConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    match err {
        ConfigError::Read { path, .. } => assert!(path.ends_with("absent.toml")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn snapshot_files_load() {
    let dir = tempfile::TempDir::new().unwrap();
    let entities = dir.path().join("entities.json");
    let vocabulary = dir.path().join("vocabulary.json");
    let goals = dir.path().join("goals.json");
    std::fs::write(&entities, r#"{"10": {"city": "seattle", "theater": "regal"}}"#).unwrap();
    std::fs::write(&vocabulary, r#"{"city": ["seattle", "portland"]}"#).unwrap();
    std::fs::write(
        &goals,
        r#"[{"inform_slots": {"city": "seattle"}, "request_slots": {"theater": "UNK"}},
            {"request_slots": {"theater": "UNK"}}]"#,
    )
    .unwrap();

    let data = DataSet::load(&entities, &vocabulary, &goals).unwrap();
    assert_eq!(data.entities[&10]["theater"], "regal");
    assert_eq!(data.vocabulary["city"].len(), 2);
    assert_eq!(data.goals.len(), 2);
    assert!(data.goals[1].inform_slots.is_empty());
}

#[test]
fn malformed_snapshot_reports_path() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("goals.json");
    std::fs::write(&path, "[{\"inform_slots\": ").unwrap();
    match data::load_goals(&path).unwrap_err() {
        DataError::Parse { what, path: p, .. } => {
            assert_eq!(what, "goal pool");
            assert!(p.ends_with("goals.json"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn missing_data_fails_simulation_load() {
    let dir = tempfile::TempDir::new().unwrap();
    let err = Simulation::load(SimConfig::default(), dir.path()).unwrap_err();
    assert!(matches!(err, SimError::Data(DataError::Io { .. })));
}
