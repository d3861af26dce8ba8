//! Snapshot loaders for the entity table, slot-value vocabulary and goal pool.
//!
//! All three are JSON files loaded once at process start:
//!
//! - entity table: `{"<id>": {"<slot>": "<value>", ...}, ...}`
//! - vocabulary: `{"<slot>": ["<value>", ...], ...}`
//! - goal pool: `[{"inform_slots": {...}, "request_slots": {...}}, ...]`

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::action::SlotMap;
use crate::error::DataError;

/// Entity identifier (row key of the entity table).
pub type EntityId = u64;

/// One row of the constraint store.
pub type EntityRecord = SlotMap;

/// The full entity table, ordered by id.
pub type EntityTable = BTreeMap<EntityId, EntityRecord>;

/// Legal values per slot.
pub type Vocabulary = BTreeMap<String, Vec<String>>;

/// What a simulated user wants out of an episode.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserGoal {
    /// Constraint values the user reveals when asked.
    #[serde(default)]
    pub inform_slots: SlotMap,
    /// Slots the user wants resolved (values are `UNK`).
    #[serde(default)]
    pub request_slots: SlotMap,
}

/// Everything loaded from disk for one run.
#[derive(Debug, Clone, Default)]
pub struct DataSet {
    pub entities: EntityTable,
    pub vocabulary: Vocabulary,
    pub goals: Vec<UserGoal>,
}

impl DataSet {
    /// Load all three snapshot files.
    pub fn load(entities: &Path, vocabulary: &Path, goals: &Path) -> Result<Self, DataError> {
        let data = Self {
            entities: load_entities(entities)?,
            vocabulary: load_vocabulary(vocabulary)?,
            goals: load_goals(goals)?,
        };
        tracing::info!(
            entities = data.entities.len(),
            slots = data.vocabulary.len(),
            goals = data.goals.len(),
            "loaded dialogue data"
        );
        Ok(data)
    }
}

fn read(what: &'static str, path: &Path) -> Result<String, DataError> {
    std::fs::read_to_string(path).map_err(|source| DataError::Io {
        what,
        path: path.display().to_string(),
        source,
    })
}

fn parse<T: serde::de::DeserializeOwned>(
    what: &'static str,
    path: &Path,
    content: &str,
) -> Result<T, DataError> {
    serde_json::from_str(content).map_err(|e| DataError::Parse {
        what,
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Load the entity table, dropping empty-string values.
pub fn load_entities(path: &Path) -> Result<EntityTable, DataError> {
    let content = read("entity table", path)?;
    let raw: BTreeMap<String, SlotMap> = parse("entity table", path, &content)?;
    entities_from_raw(raw)
}

/// Convert string-keyed rows into an [`EntityTable`].
pub fn entities_from_raw(raw: BTreeMap<String, SlotMap>) -> Result<EntityTable, DataError> {
    let mut table = EntityTable::new();
    for (id, mut record) in raw {
        let id: EntityId = id
            .trim()
            .parse()
            .map_err(|_| DataError::InvalidEntityId { id: id.clone() })?;
        record.retain(|_, value| !value.is_empty());
        table.insert(id, record);
    }
    Ok(table)
}

pub fn load_vocabulary(path: &Path) -> Result<Vocabulary, DataError> {
    let content = read("vocabulary", path)?;
    parse("vocabulary", path, &content)
}

pub fn load_goals(path: &Path) -> Result<Vec<UserGoal>, DataError> {
    let content = read("goal pool", path)?;
    parse("goal pool", path, &content)
}
