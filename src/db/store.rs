//! Constraint matching with memoized results.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;

use crate::action::{ANYTHING, SlotMap};
use crate::data::{EntityId, EntityRecord, EntityTable};
use crate::domain::Domain;
use crate::error::DbError;

/// Name of the synthetic "every constraint matched" count.
pub const TOTAL_KEY: &str = "matching_all_constraints";

/// Frozen, order-independent constraint set used as a cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConstraintKey(Vec<(String, String)>);

impl ConstraintKey {
    /// Freeze the given pairs. Insertion order does not matter.
    pub fn new<'a>(pairs: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        let mut items: Vec<(String, String)> = pairs
            .into_iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        items.sort();
        items.dedup();
        Self(items)
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Outcome of a match query.
///
/// `NoMatch` is an explicit, cacheable answer; a key that is absent from
/// the cache simply has not been queried yet.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    NoMatch,
    Found(Arc<EntityTable>),
}

impl MatchResult {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::NoMatch)
    }

    pub fn len(&self) -> usize {
        match self {
            Self::NoMatch => 0,
            Self::Found(rows) => rows.len(),
        }
    }

    /// The matching entity with the lowest id.
    pub fn first(&self) -> Option<(EntityId, &EntityRecord)> {
        match self {
            Self::NoMatch => None,
            Self::Found(rows) => rows.iter().next().map(|(id, r)| (*id, r)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &EntityRecord)> {
        let rows = match self {
            Self::NoMatch => None,
            Self::Found(rows) => Some(rows.iter()),
        };
        rows.into_iter().flatten()
    }
}

/// Per-slot match counts plus the all-constraints total.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotCounts {
    pub per_slot: BTreeMap<String, usize>,
    pub total: usize,
}

impl SlotCounts {
    pub fn get(&self, slot: &str) -> usize {
        if slot == TOTAL_KEY {
            return self.total;
        }
        self.per_slot.get(slot).copied().unwrap_or(0)
    }

    /// Flatten into a single map with a [`TOTAL_KEY`] entry.
    pub fn to_map(&self) -> BTreeMap<String, usize> {
        let mut map = self.per_slot.clone();
        map.insert(TOTAL_KEY.to_string(), self.total);
        map
    }
}

/// In-memory entity table with memoized constraint queries.
///
/// Queries take `&self`; both caches are `DashMap`s, so one store can be
/// shared behind an `Arc` by concurrently running episodes. Entries are
/// idempotent, so a racing double computation only costs time.
pub struct ConstraintStore {
    entities: Arc<EntityTable>,
    unqueryable: HashSet<String>,
    passthrough: HashSet<String>,
    availability: HashSet<String>,
    match_cache: DashMap<ConstraintKey, MatchResult>,
    count_cache: DashMap<ConstraintKey, SlotCounts>,
}

impl ConstraintStore {
    /// Build a store over `entities`, taking slot roles from the domain.
    pub fn new(entities: EntityTable, domain: &Domain) -> Self {
        let config = domain.config();
        Self {
            entities: Arc::new(entities),
            unqueryable: config.unqueryable.iter().cloned().collect(),
            passthrough: config.passthrough_slots.iter().cloned().collect(),
            availability: config.availability_slots.iter().cloned().collect(),
            match_cache: DashMap::new(),
            count_cache: DashMap::new(),
        }
    }

    /// Replace the entity table and drop both caches.
    pub fn reload(&mut self, entities: EntityTable) {
        tracing::info!(entities = entities.len(), "reloading entity table");
        self.entities = Arc::new(entities);
        self.match_cache.clear();
        self.count_cache.clear();
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Look up one loaded entity by id.
    pub fn entity(&self, id: EntityId) -> Result<&EntityRecord, DbError> {
        self.entities.get(&id).ok_or(DbError::EntityNotFound { id })
    }

    pub fn entities(&self) -> &EntityTable {
        &self.entities
    }

    pub fn is_unqueryable(&self, slot: &str) -> bool {
        self.unqueryable.contains(slot)
    }

    pub(crate) fn is_passthrough(&self, slot: &str) -> bool {
        self.passthrough.contains(slot)
    }

    pub(crate) fn is_availability(&self, slot: &str) -> bool {
        self.availability.contains(slot)
    }

    /// Number of cached (match, count) entries.
    pub fn cache_sizes(&self) -> (usize, usize) {
        (self.match_cache.len(), self.count_cache.len())
    }

    /// All entities satisfying every constraint.
    ///
    /// Values compare case-insensitively. Unqueryable slots and constraints
    /// whose value is [`ANYTHING`] are ignored. An entity lacking a
    /// constrained slot does not match.
    pub fn match_constraints(&self, constraints: &SlotMap) -> MatchResult {
        let effective: Vec<(&String, &String)> = constraints
            .iter()
            .filter(|(k, v)| !self.unqueryable.contains(k.as_str()) && v.as_str() != ANYTHING)
            .collect();
        let key = ConstraintKey::new(effective.iter().copied());

        if let Some(hit) = self.match_cache.get(&key) {
            tracing::trace!(constraints = key.pairs().len(), "match cache hit");
            return hit.value().clone();
        }

        let lowered: Vec<(&str, String)> = effective
            .iter()
            .map(|(k, v)| (k.as_str(), v.to_lowercase()))
            .collect();

        let mut found = EntityTable::new();
        for (id, record) in self.entities.iter() {
            let matches = lowered.iter().all(|(slot, want)| {
                record
                    .get(*slot)
                    .is_some_and(|have| have.to_lowercase() == *want)
            });
            if matches {
                found.insert(*id, record.clone());
            }
        }

        let result = if found.is_empty() {
            MatchResult::NoMatch
        } else {
            MatchResult::Found(Arc::new(found))
        };
        tracing::trace!(
            constraints = key.pairs().len(),
            matches = result.len(),
            "match cache miss"
        );
        self.match_cache.insert(key, result.clone());
        result
    }

    /// Count, per constrained slot, the entities agreeing on that slot, and
    /// the entities agreeing on all of them at once.
    ///
    /// [`ANYTHING`] counts as a per-slot match for every entity and never
    /// breaks the total. Unqueryable slots keep a zero count and are
    /// skipped for the total.
    pub fn count_matches_per_slot(&self, constraints: &SlotMap) -> SlotCounts {
        let key = ConstraintKey::new(constraints.iter());
        if let Some(hit) = self.count_cache.get(&key) {
            return hit.value().clone();
        }

        let mut counts = SlotCounts {
            per_slot: constraints.keys().map(|k| (k.clone(), 0)).collect(),
            total: 0,
        };
        // `None` marks an ANYTHING wildcard, checked before lowercasing.
        let lowered: Vec<(&str, Option<String>)> = constraints
            .iter()
            .filter(|(k, _)| !self.unqueryable.contains(k.as_str()))
            .map(|(k, v)| (k.as_str(), (v.as_str() != ANYTHING).then(|| v.to_lowercase())))
            .collect();

        for record in self.entities.values() {
            let mut all_match = true;
            for (slot, want) in &lowered {
                let hit = match want {
                    None => true,
                    Some(want) => record
                        .get(*slot)
                        .is_some_and(|have| have.to_lowercase() == *want),
                };
                if hit {
                    if let Some(c) = counts.per_slot.get_mut(*slot) {
                        *c += 1;
                    }
                } else {
                    all_match = false;
                }
            }
            if all_match {
                counts.total += 1;
            }
        }

        self.count_cache.insert(key, counts.clone());
        counts
    }
}

impl std::fmt::Debug for ConstraintStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (matches, counts) = self.cache_sizes();
        f.debug_struct("ConstraintStore")
            .field("entities", &self.entities.len())
            .field("match_cache", &matches)
            .field("count_cache", &counts)
            .finish()
    }
}
