//! Inform resolution and value suggestion.
//!
//! Both operations run the match query on the current informs and then
//! rank candidate values by how many matching entities carry them.

use std::collections::BTreeMap;

use crate::action::{NO_MATCH, PLACEHOLDER, SlotMap, TICKET_AVAILABLE};
use crate::error::DbError;

use super::store::{ConstraintStore, MatchResult};

/// Slot the agent requests when it wants the whole booking confirmed.
pub const TASK_COMPLETE_SLOT: &str = "taskcomplete";

/// Slot label that resolution always skips.
const THANKS_SLOT: &str = "thanks";

/// Count values of `slot` among `rows`, keeping first-encountered order so
/// ties rank by iteration order.
fn value_counts(slot: &str, rows: &MatchResult) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for (_, record) in rows.iter() {
        let Some(value) = record.get(slot) else {
            continue;
        };
        match counts.iter_mut().find(|(v, _)| v == value) {
            Some((_, n)) => *n += 1,
            None => counts.push((value.clone(), 1)),
        }
    }
    counts
}

/// Values sorted by descending count; stable, so ties keep encounter order.
fn ranked(mut counts: Vec<(String, usize)>) -> Vec<String> {
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.into_iter().map(|(v, _)| v).collect()
}

impl ConstraintStore {
    /// Fill the values of an agent inform against the current informs.
    ///
    /// - requesting [`TASK_COMPLETE_SLOT`] first copies every current inform
    /// - pass-through slots take the current value, else the requested one
    /// - availability slots become [`TICKET_AVAILABLE`] or [`NO_MATCH`]
    /// - a [`PLACEHOLDER`] becomes the most frequent matching value; any
    ///   other value is kept when at least one match carries the slot
    /// - a slot no matching entity carries becomes [`NO_MATCH`]
    pub fn resolve_informs(&self, requested: &SlotMap, current: &SlotMap) -> Result<SlotMap, DbError> {
        let rows = self.match_constraints(current);
        let mut filled = SlotMap::new();

        if requested.contains_key(TASK_COMPLETE_SLOT) {
            filled.extend(current.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        for (slot, want) in requested {
            if self.is_passthrough(slot) {
                let value = current.get(slot).unwrap_or(want);
                filled.insert(slot.clone(), value.clone());
                continue;
            }
            if self.is_availability(slot) || slot == TASK_COMPLETE_SLOT {
                let value = if rows.is_empty() { NO_MATCH } else { TICKET_AVAILABLE };
                filled.insert(slot.clone(), value.to_string());
                continue;
            }
            if slot == THANKS_SLOT {
                continue;
            }

            let counts = value_counts(slot, &rows);
            let value = if counts.is_empty() {
                NO_MATCH.to_string()
            } else if want == PLACEHOLDER {
                ranked(counts).swap_remove(0)
            } else {
                want.clone()
            };
            filled.insert(slot.clone(), value);
        }

        if filled.is_empty() {
            return Err(DbError::EmptyResolution);
        }
        tracing::trace!(requested = requested.len(), matches = rows.len(), "resolved informs");
        Ok(filled)
    }

    /// Candidate values per requested slot, most frequent first, among the
    /// entities matching `current`. Slots nobody carries get an empty list.
    pub fn suggest_values<'a>(
        &self,
        slots: impl IntoIterator<Item = &'a String>,
        current: &SlotMap,
    ) -> BTreeMap<String, Vec<String>> {
        let rows = self.match_constraints(current);
        slots
            .into_iter()
            .map(|slot| (slot.clone(), ranked(value_counts(slot, &rows))))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::tests::{record, sample_store};

    #[test]
    fn placeholder_takes_most_frequent_value() {
        let store = sample_store();
        let filled = store
            .resolve_informs(&record(&[("moviename", PLACEHOLDER)]), &record(&[("city", "seattle")]))
            .unwrap();
        // seattle rows: 1 zootopia, 2 zootopia, 4 deadpool
        assert_eq!(filled["moviename"], "zootopia");
    }

    #[test]
    fn ties_break_by_first_encountered() {
        let store = sample_store();
        let filled = store
            .resolve_informs(
                &record(&[("theater", PLACEHOLDER)]),
                &record(&[("moviename", "zootopia")]),
            )
            .unwrap();
        // entity 1 (regal) comes before entity 2 (amc)
        assert_eq!(filled["theater"], "regal");
    }

    #[test]
    fn concrete_value_is_kept() {
        let store = sample_store();
        let filled = store
            .resolve_informs(&record(&[("theater", "amc")]), &record(&[("city", "portland")]))
            .unwrap();
        assert_eq!(filled["theater"], "amc");
    }

    #[test]
    fn no_match_sentinel_when_nothing_matches() {
        let store = sample_store();
        let filled = store
            .resolve_informs(&record(&[("theater", PLACEHOLDER)]), &record(&[("city", "tokyo")]))
            .unwrap();
        assert_eq!(filled["theater"], NO_MATCH);
    }

    #[test]
    fn availability_and_passthrough_slots() {
        let store = sample_store();
        let current = record(&[("city", "seattle"), ("numberofpeople", "3")]);
        let filled = store
            .resolve_informs(
                &record(&[("ticket", PLACEHOLDER), ("numberofpeople", PLACEHOLDER)]),
                &current,
            )
            .unwrap();
        assert_eq!(filled["ticket"], TICKET_AVAILABLE);
        assert_eq!(filled["numberofpeople"], "3");

        let filled = store
            .resolve_informs(&record(&[("ticket", PLACEHOLDER)]), &record(&[("city", "tokyo")]))
            .unwrap();
        assert_eq!(filled["ticket"], NO_MATCH);
    }

    #[test]
    fn task_complete_copies_current_informs() {
        let store = sample_store();
        let current = record(&[("city", "portland")]);
        let filled = store
            .resolve_informs(&record(&[(TASK_COMPLETE_SLOT, PLACEHOLDER)]), &current)
            .unwrap();
        assert_eq!(filled["city"], "portland");
        assert_eq!(filled[TASK_COMPLETE_SLOT], TICKET_AVAILABLE);
    }

    #[test]
    fn thanks_only_resolution_is_an_error() {
        let store = sample_store();
        let err = store
            .resolve_informs(&record(&[("thanks", PLACEHOLDER)]), &SlotMap::new())
            .unwrap_err();
        assert!(matches!(err, DbError::EmptyResolution));
    }

    #[test]
    fn suggestions_rank_by_frequency() {
        let store = sample_store();
        let slots = vec!["moviename".to_string(), "zip".to_string()];
        let suggested = store.suggest_values(&slots, &record(&[("city", "seattle")]));
        assert_eq!(suggested["moviename"], vec!["zootopia", "deadpool"]);
        assert!(suggested["zip"].is_empty());
    }
}
