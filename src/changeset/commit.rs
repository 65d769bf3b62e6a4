//! Commit-based extraction
//!
//! Input is a single commit's per-file change statistics. A file is deleted
//! iff every changed line is a deletion and nothing was inserted; everything
//! else counts as modified. Shallow paths (three or fewer segments below the
//! object root) are fleet-wide changes fanned out to every known tenant.

use std::collections::BTreeMap;

use super::{identifier_from_segments, object_segments, ChangeSet, Operation};
use crate::config::Config;
use crate::tenants::TenantDirectory;

/// Per-file line statistics of one commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub insertions: u32,
    pub deletions: u32,
    pub lines: u32,
}

/// All file statistics of one commit
#[derive(Debug, Clone, Default)]
pub struct CommitStats {
    pub files: BTreeMap<String, FileStat>,
}

impl CommitStats {
    pub fn record(&mut self, path: impl Into<String>, insertions: u32, deletions: u32) {
        self.files.insert(
            path.into(),
            FileStat {
                insertions,
                deletions,
                lines: insertions + deletions,
            },
        );
    }
}

impl FileStat {
    /// A file whose every changed line is a deletion was removed outright.
    /// Added versus updated makes no functional difference downstream.
    fn operation(&self) -> Operation {
        if self.lines == self.deletions && self.insertions == 0 {
            Operation::Deleted
        } else {
            Operation::Modified
        }
    }
}

pub(super) fn classify(
    stats: &CommitStats,
    config: &Config,
    tenants: &dyn TenantDirectory,
) -> BTreeMap<String, ChangeSet> {
    let known = tenants.tenants();

    // Fleet-wide changes first: prefill a bucket per known tenant and fan
    // every shallow path out into all of them.
    let mut by_tenant: BTreeMap<String, ChangeSet> = known
        .iter()
        .map(|t| (t.clone(), ChangeSet::default()))
        .collect();
    let mut global_count = 0usize;

    for (path, stat) in &stats.files {
        let Some(segments) = object_segments(path, config) else {
            continue;
        };
        if segments.len() <= 3 {
            global_count += 1;
            for tenant in &known {
                if let Some(id) = identifier_from_segments(tenant, &segments, config) {
                    by_tenant
                        .get_mut(tenant)
                        .expect("prefilled above")
                        .insert(stat.operation(), id);
                }
            }
        }
    }

    // No fleet-wide change in the commit: drop the prefilled fan-out map
    // outright so an empty intersection cannot redeploy the whole fleet.
    if global_count == 0 {
        by_tenant = BTreeMap::new();
    }

    // Deeper paths carry an explicit leading tenant segment.
    for (path, stat) in &stats.files {
        let Some(segments) = object_segments(path, config) else {
            continue;
        };
        if segments.len() <= 3 {
            continue;
        }
        let tenant = segments[0];
        if let Some(id) = identifier_from_segments(tenant, &segments, config) {
            by_tenant
                .entry(tenant.to_string())
                .or_default()
                .insert(stat.operation(), id);
        }
    }

    by_tenant
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenants::StaticTenantDirectory;

    fn classify_with(
        stats: &CommitStats,
        tenants: &[&str],
    ) -> BTreeMap<String, ChangeSet> {
        let directory = StaticTenantDirectory::new(tenants.iter().copied());
        classify(stats, &Config::default(), &directory)
    }

    #[test]
    fn deletion_requires_all_lines_deleted() {
        let mut stats = CommitStats::default();
        stats.record("acme/ext/view/vw_gone.sql", 0, 12);
        stats.record("acme/ext/view/vw_kept.sql", 1, 12);

        let sets = classify_with(&stats, &[]);
        let acme = &sets["acme"];
        assert_eq!(acme.deleted.len(), 1);
        assert_eq!(acme.modified.len(), 1);
        assert!(acme.deleted.iter().any(|id| id.name() == "vw_gone"));
        assert!(acme.modified.iter().any(|id| id.name() == "vw_kept"));
    }

    #[test]
    fn shallow_path_fans_out_to_all_known_tenants() {
        let mut stats = CommitStats::default();
        stats.record("global/view/vw_shared.sql", 5, 0);

        let sets = classify_with(&stats, &["a", "b"]);
        assert_eq!(sets.len(), 2);
        for tenant in ["a", "b"] {
            assert!(
                sets[tenant].modified.iter().any(|id| id.name() == "vw_shared"),
                "{tenant} missing fan-out"
            );
        }
    }

    #[test]
    fn fan_out_with_no_known_tenants_is_empty() {
        let mut stats = CommitStats::default();
        stats.record("global/view/vw_shared.sql", 5, 0);

        let sets = classify_with(&stats, &[]);
        assert!(sets.is_empty());
    }

    #[test]
    fn zero_global_changes_drop_the_prefilled_map() {
        let mut stats = CommitStats::default();
        stats.record("acme/ext/view/vw_a.sql", 2, 0);

        let sets = classify_with(&stats, &["a", "b"]);
        // Only the tenant actually touched appears; no empty fleet buckets.
        assert_eq!(sets.keys().collect::<Vec<_>>(), vec!["acme"]);
    }

    #[test]
    fn non_definition_extensions_are_ignored() {
        let mut stats = CommitStats::default();
        stats.record("acme/ext/view/notes.md", 2, 0);
        stats.record("acme/ext/table/orders.json", 2, 0);

        let sets = classify_with(&stats, &[]);
        assert_eq!(sets["acme"].modified.len(), 1);
        assert!(sets["acme"].modified.iter().any(|id| id.name() == "orders"));
    }

    #[test]
    fn global_and_tenant_changes_combine() {
        let mut stats = CommitStats::default();
        stats.record("core/view/vw_base.sql", 4, 1);
        stats.record("acme/ext/view/vw_local.sql", 2, 0);

        let sets = classify_with(&stats, &["acme", "bluesky"]);
        assert_eq!(sets["acme"].modified.len(), 2);
        assert_eq!(sets["bluesky"].modified.len(), 1);
    }
}
