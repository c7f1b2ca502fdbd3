//! Column diffing between the live flattened table and a configuration

use serde::Serialize;
use std::collections::HashSet;

use crate::entities::FieldConfig;
use crate::field_type::FieldType;

/// Statements needed to bring the flattened table in line with a configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnDiff {
    pub to_add: Vec<(String, FieldType)>,
    pub to_drop: Vec<String>,
}

impl ColumnDiff {
    /// Compare live non-key columns against the configured machine names
    ///
    /// Names compare exactly since columns are created quoted.
    pub fn compute(existing: &[String], fields: &[FieldConfig]) -> Self {
        let configured: HashSet<&str> = fields
            .iter()
            .map(|f| f.machine_field_name.as_str())
            .collect();
        let live: HashSet<&str> = existing.iter().map(String::as_str).collect();

        let to_add = fields
            .iter()
            .filter(|f| !live.contains(f.machine_field_name.as_str()))
            .map(|f| (f.machine_field_name.clone(), f.logical_type()))
            .collect();
        let to_drop = existing
            .iter()
            .filter(|c| !configured.contains(c.as_str()))
            .cloned()
            .collect();

        Self { to_add, to_drop }
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_drop.is_empty()
    }
}

/// Outcome of one schema migration call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub entity_type: String,
    /// The main and flattened tables were created by this call
    pub tables_created: bool,
    pub added: Vec<String>,
    pub dropped: Vec<String>,
    pub triggers_regenerated: bool,
}

impl MigrationReport {
    /// No column was added or dropped
    pub fn is_noop(&self) -> bool {
        !self.tables_created && self.added.is_empty() && self.dropped.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn config(names: &[&str]) -> Vec<FieldConfig> {
        names
            .iter()
            .map(|n| FieldConfig::new(n, FieldType::Text))
            .collect()
    }

    #[test]
    fn removed_field_is_dropped() {
        let existing = vec!["height".to_string(), "bio".to_string()];
        let diff = ColumnDiff::compute(&existing, &config(&["bio"]));
        assert!(diff.to_add.is_empty());
        assert_eq!(diff.to_drop, vec!["height".to_string()]);
    }

    #[test]
    fn new_field_is_added_with_its_type() {
        let existing = vec!["bio".to_string()];
        let fields = vec![
            FieldConfig::new("bio", FieldType::Text),
            FieldConfig::new("born", FieldType::Date),
        ];
        let diff = ColumnDiff::compute(&existing, &fields);
        assert_eq!(diff.to_add, vec![("born".to_string(), FieldType::Date)]);
        assert!(diff.to_drop.is_empty());
    }

    #[test]
    fn same_set_is_empty() {
        let existing = vec!["bio".to_string(), "height".to_string()];
        assert!(ColumnDiff::compute(&existing, &config(&["height", "bio"])).is_empty());
    }

    #[test]
    fn names_compare_exactly() {
        let existing = vec!["Bio".to_string()];
        let diff = ColumnDiff::compute(&existing, &config(&["bio"]));
        assert_eq!(diff.to_drop, vec!["Bio".to_string()]);
        assert_eq!(diff.to_add.len(), 1);
    }

    fn apply(existing: &[String], diff: &ColumnDiff) -> Vec<String> {
        let mut columns: Vec<String> = existing
            .iter()
            .filter(|c| !diff.to_drop.contains(c))
            .cloned()
            .collect();
        columns.extend(diff.to_add.iter().map(|(n, _)| n.clone()));
        columns
    }

    proptest! {
        #[test]
        fn migration_converges_and_is_idempotent(
            live in prop::collection::btree_set("[a-e]{1,2}", 0..8),
            wanted in prop::collection::btree_set("[a-e]{1,2}", 0..8),
        ) {
            let existing: Vec<String> = live.into_iter().collect();
            let names: Vec<&str> = wanted.iter().map(String::as_str).collect();
            let fields = config(&names);

            let diff = ColumnDiff::compute(&existing, &fields);
            let migrated = apply(&existing, &diff);

            let result: BTreeSet<String> = migrated.iter().cloned().collect();
            prop_assert_eq!(&result, &wanted);
            prop_assert_eq!(result.len(), migrated.len());
            prop_assert!(ColumnDiff::compute(&migrated, &fields).is_empty());
        }
    }
}
