//! Manifest-based extraction
//!
//! The manifest is delimited UTF-8 text: a header row carrying the tenant
//! column marker, then `"tenant", "operation", "dataset.object_name"` rows.
//! Rows are resolved to a concrete source path through the naming-convention
//! kind inference; rows that resolve nowhere are reported and skipped, with
//! shared-template rows exempt from the existence check. A missing manifest
//! file aborts the run before anything is attempted.

use std::collections::BTreeMap;
use std::path::Path;

use super::{ChangeSet, Operation};
use crate::config::Config;
use crate::error::{ShipError, ShipResult};
use crate::events::{DeployEvent, EventSink};
use crate::fs::FileSystem;
use crate::object::SqlObjectIdentifier;

const TENANT_MARKER: &str = "tenant";

/// Render an example manifest showing the expected format.
pub fn example_manifest() -> String {
    [
        "tenant_name, operation, object_name",
        "\"sc\", \"deleted\", \"dataset.vw_view1\"",
        "\"sc\", \"modified\", \"dataset.vw_view2\"",
    ]
    .join("\n")
}

pub(super) fn classify<FS: FileSystem>(
    path: &Path,
    config: &Config,
    fs: &FS,
    events: &dyn EventSink,
) -> ShipResult<BTreeMap<String, ChangeSet>> {
    if !fs.exists(path) {
        return Err(ShipError::ManifestNotFound {
            path: path.to_path_buf(),
        });
    }
    let content = fs.read_to_string(path)?;

    let mut by_tenant: BTreeMap<String, ChangeSet> = BTreeMap::new();
    let mut lines = content.lines();

    // Header row is recognized by its tenant column marker.
    let mut first = lines.next();
    if let Some(header) = first {
        if header.contains(TENANT_MARKER) {
            first = None;
        }
    }

    for line in first.into_iter().chain(lines) {
        if !line.contains(',') {
            continue;
        }
        let columns: Vec<String> = line
            .split(',')
            .map(|c| c.replace('"', "").trim().to_string())
            .collect();
        if columns.len() < 3 {
            warn(events, format!("Malformed manifest row '{line}', skipping..."));
            continue;
        }

        let (tenant, operation, full_name) = (&columns[0], &columns[1], &columns[2]);
        let Some(operation) = Operation::parse(operation) else {
            warn(
                events,
                format!("Unknown operation '{operation}' for {tenant}:{full_name}, skipping..."),
            );
            continue;
        };
        let Some((dataset, name)) = full_name.split_once('.') else {
            warn(
                events,
                format!("Expected dataset.object_name, got '{full_name}', skipping..."),
            );
            continue;
        };

        let id = SqlObjectIdentifier::new(tenant, dataset, name, &config.naming);

        // Shared templates are exempt from existence checking; the row may
        // predate the template landing in this checkout.
        if !name.ends_with(&config.naming.shared_suffix) {
            let source = id.source_path(&config.source_root, &config.naming);
            if !fs.exists(&source) {
                warn(
                    events,
                    format!("Failed to resolve file path for {tenant}:{name}, skipping..."),
                );
                continue;
            }
        }

        by_tenant
            .entry(tenant.clone())
            .or_default()
            .insert(operation, id);
    }

    Ok(by_tenant)
}

fn warn(events: &dyn EventSink, message: String) {
    events.on_event(DeployEvent::Warning { message });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::test_support::RecordingEventSink;
    use crate::fs::MockFileSystem;
    use std::path::PathBuf;

    fn run(
        manifest: &str,
        existing: &[&str],
    ) -> (ShipResult<BTreeMap<String, ChangeSet>>, Vec<String>) {
        let fs = MockFileSystem::new();
        fs.insert("/changes.csv", manifest);
        for path in existing {
            fs.insert(*path, "definition");
        }
        let events = RecordingEventSink::shared();
        let config = Config {
            source_root: PathBuf::from("/"),
            ..Config::default()
        };
        let result = classify(Path::new("/changes.csv"), &config, &fs, events.as_ref());
        let warnings = events.warnings();
        (result, warnings)
    }

    #[test]
    fn missing_manifest_is_fatal() {
        let fs = MockFileSystem::new();
        let events = RecordingEventSink::shared();
        let err = classify(
            Path::new("/absent.csv"),
            &Config::default(),
            &fs,
            events.as_ref(),
        )
        .unwrap_err();
        assert!(matches!(err, ShipError::ManifestNotFound { path } if path == PathBuf::from("/absent.csv")));
    }

    #[test]
    fn rows_partition_by_tenant_and_operation() {
        let manifest = "tenant_name, operation, object_name\n\
                        \"sc\", \"deleted\", \"core.vw_orders\"\n\
                        \"sc\", \"modified\", \"ext.vw_customers\"\n";
        let (result, warnings) = run(
            manifest,
            &["/core/view/vw_orders.sql", "/sc/ext/view/vw_customers.sql"],
        );
        let sets = result.unwrap();

        assert!(warnings.is_empty());
        let sc = &sets["sc"];
        assert_eq!(sc.modified.len(), 1);
        assert_eq!(sc.deleted.len(), 1);
        assert!(sc.modified.iter().any(|id| id.name() == "vw_customers"));
        assert!(sc.deleted.iter().any(|id| id.name() == "vw_orders"));
    }

    #[test]
    fn unresolvable_rows_warn_and_skip() {
        let manifest = "tenant_name, operation, object_name\n\
                        \"sc\", \"modified\", \"ext.vw_missing\"\n";
        let (result, warnings) = run(manifest, &[]);
        let sets = result.unwrap();

        assert!(sets.is_empty());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("vw_missing"));
    }

    #[test]
    fn shared_template_rows_skip_existence_check() {
        let manifest = "tenant_name, operation, object_name\n\
                        \"sc\", \"modified\", \"ext.vw_base_0\"\n";
        let (result, warnings) = run(manifest, &[]);
        let sets = result.unwrap();

        assert!(warnings.is_empty());
        assert_eq!(sets["sc"].modified.len(), 1);
    }

    #[test]
    fn unknown_operations_warn_and_skip() {
        let manifest = "tenant_name, operation, object_name\n\
                        \"sc\", \"renamed\", \"ext.vw_a\"\n";
        let (result, warnings) = run(manifest, &["/sc/ext/view/vw_a.sql"]);

        assert!(result.unwrap().is_empty());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("renamed"));
    }

    #[test]
    fn blank_and_commentary_lines_are_ignored() {
        let manifest = "tenant_name, operation, object_name\n\
                        \n\
                        just a note without delimiters\n";
        let (result, warnings) = run(manifest, &[]);
        assert!(result.unwrap().is_empty());
        assert!(warnings.is_empty());
    }

    #[test]
    fn example_manifest_parses_cleanly() {
        let (result, warnings) = run(
            &example_manifest(),
            &["/sc/dataset/view/vw_view1.sql", "/sc/dataset/view/vw_view2.sql"],
        );
        let sets = result.unwrap();
        assert_eq!(sets["sc"].len(), 2);
        assert!(warnings.is_empty());
    }
}
