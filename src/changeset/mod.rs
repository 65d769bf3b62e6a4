//! Change-set extraction
//!
//! Classifies a raw change source into a per-tenant `{modified, deleted}`
//! partition of object identifiers. Three interchangeable strategies exist
//! (a commit's file statistics, a manifest file, the uncommitted working
//! tree), selected by the `ChangeSource` value at construction time. The
//! partition is computed once per extractor; `refresh()` forces
//! recomputation.

mod commit;
mod manifest;
mod worktree;

pub use commit::{CommitStats, FileStat};
pub use manifest::example_manifest;
pub use worktree::DiffEntry;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::error::ShipResult;
use crate::events::EventSink;
use crate::fs::FileSystem;
use crate::object::SqlObjectIdentifier;
use crate::tenants::TenantDirectory;

/// What happened to an object in the change source
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operation {
    Modified,
    Deleted,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input {
            "modified" => Some(Self::Modified),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-tenant partition of changed objects
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub modified: BTreeSet<SqlObjectIdentifier>,
    pub deleted: BTreeSet<SqlObjectIdentifier>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.modified.is_empty() && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.modified.len() + self.deleted.len()
    }

    pub fn insert(&mut self, operation: Operation, id: SqlObjectIdentifier) {
        match operation {
            Operation::Modified => self.modified.insert(id),
            Operation::Deleted => self.deleted.insert(id),
        };
    }
}

/// The raw material a change set is extracted from
#[derive(Debug, Clone)]
pub enum ChangeSource {
    /// Per-file change statistics of a single commit
    Commit(CommitStats),
    /// Path to a delimited manifest file
    Manifest(PathBuf),
    /// Uncommitted add/modify/delete/rename entries against HEAD
    WorkingTree(Vec<DiffEntry>),
}

/// Classifies a change source into per-tenant change sets.
///
/// The result is computed on first access and cached; the cache is
/// invalidated only by an explicit [`ChangeSetExtractor::refresh`].
pub struct ChangeSetExtractor<FS> {
    source: ChangeSource,
    config: Config,
    fs: FS,
    tenants: Arc<dyn TenantDirectory>,
    events: Arc<dyn EventSink>,
    cache: Option<BTreeMap<String, ChangeSet>>,
}

impl<FS: FileSystem> ChangeSetExtractor<FS> {
    pub fn new(
        source: ChangeSource,
        config: Config,
        fs: FS,
        tenants: Arc<dyn TenantDirectory>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            source,
            config,
            fs,
            tenants,
            events,
            cache: None,
        }
    }

    /// The per-tenant change sets, computed once.
    pub fn change_sets(&mut self) -> ShipResult<&BTreeMap<String, ChangeSet>> {
        if self.cache.is_none() {
            self.cache = Some(self.compute()?);
        }
        Ok(self.cache.as_ref().expect("cache filled above"))
    }

    /// The change set for one tenant; empty when the tenant has no changes.
    pub fn change_set(&mut self, tenant: &str) -> ShipResult<ChangeSet> {
        Ok(self
            .change_sets()?
            .get(tenant)
            .cloned()
            .unwrap_or_default())
    }

    /// Every tenant with at least one change.
    pub fn all_tenants(&mut self) -> ShipResult<BTreeSet<String>> {
        Ok(self.change_sets()?.keys().cloned().collect())
    }

    /// Drop the cached partition so the next access recomputes it.
    pub fn refresh(&mut self) {
        self.cache = None;
    }

    fn compute(&self) -> ShipResult<BTreeMap<String, ChangeSet>> {
        match &self.source {
            ChangeSource::Commit(stats) => Ok(commit::classify(
                stats,
                &self.config,
                self.tenants.as_ref(),
            )),
            ChangeSource::Manifest(path) => manifest::classify(
                path,
                &self.config,
                &self.fs,
                self.events.as_ref(),
            ),
            ChangeSource::WorkingTree(diffs) => {
                Ok(worktree::classify(diffs, &self.config))
            }
        }
    }
}

/// Strip the repository prefix and split a change path into segments.
///
/// Returns `None` for paths outside the object root or with an extension
/// that is not a definition file.
fn object_segments<'a>(path: &'a str, config: &Config) -> Option<Vec<&'a str>> {
    let relative = if config.repo_prefix.is_empty() {
        path
    } else {
        path.strip_prefix(&config.repo_prefix)?
    };
    let relative = relative.trim_start_matches('/');

    let extension = relative.rsplit('.').next()?;
    if extension != "sql" && extension != "json" {
        return None;
    }

    Some(relative.split('/').collect())
}

/// Build an identifier from the trailing `dataset/kind/file` path segments,
/// owned by the given tenant. Files under an unrecognized kind directory are
/// not object files.
fn identifier_from_segments(
    tenant: &str,
    segments: &[&str],
    config: &Config,
) -> Option<SqlObjectIdentifier> {
    if segments.len() < 3 {
        return None;
    }
    let file = segments[segments.len() - 1];
    let kind_dir = segments[segments.len() - 2];
    let dataset = segments[segments.len() - 3];
    let name = file.rsplit_once('.').map(|(stem, _)| stem)?;
    crate::object::ObjectKind::from_segment(kind_dir, name).ok()?;
    Some(SqlObjectIdentifier::new(
        tenant,
        dataset,
        name,
        &config.naming,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::test_support::RecordingEventSink;
    use crate::fs::MockFileSystem;
    use crate::tenants::StaticTenantDirectory;

    fn extractor(source: ChangeSource) -> ChangeSetExtractor<MockFileSystem> {
        ChangeSetExtractor::new(
            source,
            Config::default(),
            MockFileSystem::new(),
            Arc::new(StaticTenantDirectory::new(["acme", "bluesky"])),
            RecordingEventSink::shared(),
        )
    }

    #[test]
    fn operation_parses_known_values() {
        assert_eq!(Operation::parse("modified"), Some(Operation::Modified));
        assert_eq!(Operation::parse("deleted"), Some(Operation::Deleted));
        assert_eq!(Operation::parse("renamed"), None);
    }

    #[test]
    fn object_segments_filters_extensions() {
        let config = Config::default();
        assert!(object_segments("acme/ext/view/vw_a.sql", &config).is_some());
        assert!(object_segments("acme/ext/table/orders.json", &config).is_some());
        assert!(object_segments("acme/readme.md", &config).is_none());
    }

    #[test]
    fn object_segments_strips_repo_prefix() {
        let config = Config {
            repo_prefix: "infra/warehouse/sql/".to_string(),
            ..Config::default()
        };
        let segments =
            object_segments("infra/warehouse/sql/acme/ext/view/vw_a.sql", &config).unwrap();
        assert_eq!(segments, vec!["acme", "ext", "view", "vw_a.sql"]);

        assert!(object_segments("docs/acme/ext/view/vw_a.sql", &config).is_none());
    }

    #[test]
    fn extractor_caches_until_refresh() {
        let mut stats = CommitStats::default();
        stats.record("acme/ext/view/vw_a.sql", 3, 1);
        let mut extractor = extractor(ChangeSource::Commit(stats));

        let first = extractor.change_sets().unwrap().clone();
        let again = extractor.change_sets().unwrap().clone();
        assert_eq!(first, again);

        extractor.refresh();
        let rebuilt = extractor.change_sets().unwrap().clone();
        assert_eq!(first, rebuilt);
    }

    #[test]
    fn unknown_kind_directory_is_not_an_object_file() {
        let config = Config::default();
        let segments = vec!["acme", "ext", "matview", "mv_sales.sql"];
        assert!(identifier_from_segments("acme", &segments, &config).is_none());
    }

    #[test]
    fn change_set_for_unknown_tenant_is_empty() {
        let mut extractor = extractor(ChangeSource::Commit(CommitStats::default()));
        assert!(extractor.change_set("nobody").unwrap().is_empty());
    }
}
