//! Table schema: the column families a range's access groups partition.
//!
//! There is no DDL execution in scope (spec.md §1 non-goals) — a [`Schema`]
//! is a plain, already-resolved description handed to a [`crate::range::Range`]
//! at construction, the same way `engine::Engine::new` takes already-resolved
//! paths and thresholds rather than parsing a config file itself.

use std::collections::HashMap;

/// One column family: its schema-assigned id and whether its values are
/// summed as counters rather than kept as separate timestamped versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnFamily {
    /// Name used administratively; not persisted in any cell.
    pub name: String,
    /// The 8-bit id embedded in every serialized key for this family.
    pub id: u8,
    /// Which access group (by name) this family's cells are written to.
    pub access_group: String,
    /// `true` if writes to this family are summed as big-endian `i64` counters.
    pub is_counter: bool,
    /// Maximum number of versions kept per cell; `None` means unlimited.
    pub max_versions: Option<u32>,
}

/// A table's full set of column families and their access-group partitioning.
///
/// The `generation` increments whenever a schema change is applied; a write
/// or scan carrying an older generation than a range currently holds is
/// rejected with [`crate::Error::SchemaGenerationMismatch`] so a stale client
/// can refresh and retry.
#[derive(Debug, Clone)]
pub struct Schema {
    /// Current schema generation, bumped on every structural change.
    pub generation: u64,
    families_by_id: HashMap<u8, ColumnFamily>,
}

impl Schema {
    /// Builds a schema from its column families at generation `generation`.
    ///
    /// # Panics
    ///
    /// Panics if two families share the same id — this is a construction-time
    /// invariant, not a runtime condition a range ever has to recover from.
    #[must_use]
    pub fn new(generation: u64, families: Vec<ColumnFamily>) -> Self {
        let mut families_by_id = HashMap::with_capacity(families.len());
        for cf in families {
            let id = cf.id;
            if families_by_id.insert(id, cf).is_some() {
                panic!("duplicate column family id {id} in schema");
            }
        }
        Schema {
            generation,
            families_by_id,
        }
    }

    /// Looks up a column family by its id.
    #[must_use]
    pub fn column_family(&self, id: u8) -> Option<&ColumnFamily> {
        self.families_by_id.get(&id)
    }

    /// Returns every access group name referenced by this schema, in no
    /// particular order, each appearing once.
    #[must_use]
    pub fn access_group_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .families_by_id
            .values()
            .map(|cf| cf.access_group.clone())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Returns every column family id assigned to `access_group`.
    #[must_use]
    pub fn column_families_for_access_group(&self, access_group: &str) -> Vec<u8> {
        let mut ids: Vec<u8> = self
            .families_by_id
            .values()
            .filter(|cf| cf.access_group == access_group)
            .map(|cf| cf.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Returns the column family ids this schema considers counters,
    /// restricted to those assigned to `access_group`. Feeds
    /// `cellstore::merge::MergeConfig::counter_column_families` directly.
    #[must_use]
    pub fn counter_column_families_for_access_group(&self, access_group: &str) -> Vec<u8> {
        let mut ids: Vec<u8> = self
            .families_by_id
            .values()
            .filter(|cf| cf.access_group == access_group && cf.is_counter)
            .map(|cf| cf.id)
            .collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Schema {
        Schema::new(
            1,
            vec![
                ColumnFamily {
                    name: "meta".into(),
                    id: 1,
                    access_group: "default".into(),
                    is_counter: false,
                    max_versions: Some(3),
                },
                ColumnFamily {
                    name: "hits".into(),
                    id: 2,
                    access_group: "counters".into(),
                    is_counter: true,
                    max_versions: None,
                },
            ],
        )
    }

    #[test]
    fn looks_up_column_family_by_id() {
        let schema = sample();
        assert_eq!(schema.column_family(1).unwrap().name, "meta");
        assert!(schema.column_family(99).is_none());
    }

    #[test]
    fn groups_column_families_by_access_group() {
        let schema = sample();
        let mut names = schema.access_group_names();
        names.sort_unstable();
        assert_eq!(names, vec!["counters".to_string(), "default".to_string()]);
        assert_eq!(schema.column_families_for_access_group("counters"), vec![2]);
    }

    #[test]
    fn counter_families_are_filtered_per_access_group() {
        let schema = sample();
        assert_eq!(schema.counter_column_families_for_access_group("counters"), vec![2]);
        assert!(schema.counter_column_families_for_access_group("default").is_empty());
    }

    #[test]
    #[should_panic(expected = "duplicate column family id")]
    fn duplicate_ids_panic_at_construction() {
        Schema::new(
            1,
            vec![
                ColumnFamily {
                    name: "a".into(),
                    id: 1,
                    access_group: "default".into(),
                    is_counter: false,
                    max_versions: None,
                },
                ColumnFamily {
                    name: "b".into(),
                    id: 1,
                    access_group: "default".into(),
                    is_counter: false,
                    max_versions: None,
                },
            ],
        );
    }
}
