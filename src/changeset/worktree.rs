//! Working-tree extraction
//!
//! Input is the set of uncommitted diffs against HEAD. A rename is modeled
//! as delete-old plus modify-new so stale objects are cleaned up. Entries on
//! shallow paths land in the reserved global bucket; when other tenant
//! buckets exist the global entries are copied into each of them and the
//! global bucket is discarded, otherwise the global bucket stands alone.

use std::collections::BTreeMap;

use super::{identifier_from_segments, object_segments, ChangeSet, Operation};
use crate::config::Config;
use crate::object::SqlObjectIdentifier;

/// One uncommitted change against HEAD
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffEntry {
    Added { path: String },
    Modified { path: String },
    Deleted { path: String },
    Renamed { from: String, to: String },
}

impl DiffEntry {
    /// The `(operation, path)` pairs this entry contributes. Added and
    /// updated make no functional difference downstream.
    fn operations(&self) -> Vec<(Operation, &str)> {
        match self {
            Self::Added { path } | Self::Modified { path } => {
                vec![(Operation::Modified, path)]
            }
            Self::Deleted { path } => vec![(Operation::Deleted, path)],
            Self::Renamed { from, to } => vec![
                (Operation::Deleted, from),
                (Operation::Modified, to),
            ],
        }
    }
}

pub(super) fn classify(
    diffs: &[DiffEntry],
    config: &Config,
) -> BTreeMap<String, ChangeSet> {
    let global = config.naming.global_marker.clone();
    let mut by_tenant: BTreeMap<String, ChangeSet> = BTreeMap::new();

    for entry in diffs {
        for (operation, path) in entry.operations() {
            let Some(segments) = object_segments(path, config) else {
                continue;
            };
            let tenant = if segments.len() <= 3 {
                global.as_str()
            } else {
                segments[0]
            };
            if let Some(id) = identifier_from_segments(tenant, &segments, config) {
                by_tenant
                    .entry(tenant.to_string())
                    .or_default()
                    .insert(operation, id);
            }
        }
    }

    // With other tenants present, global entries apply to each of them and
    // the global bucket disappears; a lone global bucket is kept as-is.
    if by_tenant.len() > 1 {
        if let Some(shared) = by_tenant.remove(&global) {
            for (tenant, set) in by_tenant.iter_mut() {
                for id in &shared.modified {
                    set.insert(Operation::Modified, rekeyed(id, tenant, config));
                }
                for id in &shared.deleted {
                    set.insert(Operation::Deleted, rekeyed(id, tenant, config));
                }
            }
        }
    }

    by_tenant
}

fn rekeyed(id: &SqlObjectIdentifier, tenant: &str, config: &Config) -> SqlObjectIdentifier {
    SqlObjectIdentifier::new(tenant, id.dataset(), id.name(), &config.naming)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify_entries(diffs: &[DiffEntry]) -> BTreeMap<String, ChangeSet> {
        classify(diffs, &Config::default())
    }

    #[test]
    fn rename_is_delete_old_plus_modify_new() {
        let sets = classify_entries(&[DiffEntry::Renamed {
            from: "acme/ext/view/vw_old.sql".to_string(),
            to: "acme/ext/view/vw_new.sql".to_string(),
        }]);

        let acme = &sets["acme"];
        assert!(acme.deleted.iter().any(|id| id.name() == "vw_old"));
        assert!(acme.modified.iter().any(|id| id.name() == "vw_new"));
    }

    #[test]
    fn global_bucket_kept_when_alone() {
        let sets = classify_entries(&[DiffEntry::Modified {
            path: "core/view/vw_base.sql".to_string(),
        }]);

        assert_eq!(sets.keys().collect::<Vec<_>>(), vec!["global"]);
        assert_eq!(sets["global"].modified.len(), 1);
    }

    #[test]
    fn global_bucket_merged_into_other_tenants_then_dropped() {
        let sets = classify_entries(&[
            DiffEntry::Modified {
                path: "core/view/vw_base.sql".to_string(),
            },
            DiffEntry::Modified {
                path: "acme/ext/view/vw_local.sql".to_string(),
            },
            DiffEntry::Deleted {
                path: "bluesky/ext/view/vw_gone.sql".to_string(),
            },
        ]);

        assert!(!sets.contains_key("global"));
        assert!(sets["acme"].modified.iter().any(|id| id.name() == "vw_base"));
        assert!(sets["bluesky"].modified.iter().any(|id| id.name() == "vw_base"));
        // Merged entries belong to the receiving tenant's project.
        let merged = sets["bluesky"]
            .modified
            .iter()
            .find(|id| id.name() == "vw_base")
            .unwrap();
        assert_eq!(merged.tenant(), "bluesky");
    }

    #[test]
    fn added_and_modified_both_count_as_modified() {
        let sets = classify_entries(&[
            DiffEntry::Added {
                path: "acme/ext/view/vw_a.sql".to_string(),
            },
            DiffEntry::Modified {
                path: "acme/ext/view/vw_b.sql".to_string(),
            },
        ]);
        assert_eq!(sets["acme"].modified.len(), 2);
        assert!(sets["acme"].deleted.is_empty());
    }

    #[test]
    fn non_definition_files_are_ignored() {
        let sets = classify_entries(&[DiffEntry::Modified {
            path: "acme/ext/view/README.md".to_string(),
        }]);
        assert!(sets.is_empty());
    }
}
