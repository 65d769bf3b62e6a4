//! Deployment engine
//!
//! Orchestrates one pass per tenant, sequentially: snapshot the catalog,
//! apply dependencies then targets, validate the outcome against the pre-run
//! snapshot. Per-object faults become records in the report and never halt
//! the batch; validation failures are reported and trigger no rollback.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use similar::TextDiff;

use crate::catalog::{CatalogClient, CatalogError, CatalogObject, UpdateField};
use crate::changeset::{ChangeSet, Operation};
use crate::deps::DependencyResolver;
use crate::error::ShipResult;
use crate::events::{DeployEvent, EventSink};
use crate::fs::FileSystem;
use crate::object::{
    parse_table_columns, DefinitionStore, ObjectKind, RoutineSignature, SqlObjectIdentifier,
};

/// Outcome of one object's apply step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Updated,
    SkippedUnchanged,
    SkippedAlreadyApplied,
    SkippedManualDropRequired,
    Deleted,
    DeletionSkippedNotFound,
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::SkippedUnchanged => "skipped-unchanged",
            Self::SkippedAlreadyApplied => "skipped-already-applied",
            Self::SkippedManualDropRequired => "skipped-manual-drop-required",
            Self::Deleted => "deleted",
            Self::DeletionSkippedNotFound => "deletion-skipped-not-found",
            Self::Failed => "failed",
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            Self::SkippedUnchanged
                | Self::SkippedAlreadyApplied
                | Self::SkippedManualDropRequired
                | Self::DeletionSkippedNotFound
        )
    }
}

/// Outcome record for one object
#[derive(Debug, Clone)]
pub struct DeploymentRecord {
    pub id: SqlObjectIdentifier,
    pub operation: Operation,
    pub outcome: Outcome,
    pub detail: Option<String>,
    /// Fingerprint of the definition that was applied, when one was
    pub fingerprint: Option<String>,
}

/// Validation results for one tenant
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Deleted objects still present after the run
    pub residual_deletions: Vec<String>,
    /// Objects present before and absent after without being deleted
    pub collateral_drops: Vec<String>,
    /// Unified diffs between deployed source and live definition
    pub definition_diffs: Vec<(String, String)>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.residual_deletions.is_empty() && self.collateral_drops.is_empty()
    }
}

/// What will be deployed for one tenant
#[derive(Debug, Clone)]
pub struct TenantPlan {
    pub tenant: String,
    pub changes: ChangeSet,
}

/// The full deployment plan, in tenant order
#[derive(Debug, Clone, Default)]
pub struct DeploymentPlan {
    pub tenants: Vec<TenantPlan>,
}

impl DeploymentPlan {
    /// Human-readable per-object summary lines, one per planned change.
    pub fn summary(&self) -> Vec<String> {
        let mut lines = Vec::new();
        let mut total = 0usize;
        for plan in &self.tenants {
            lines.push(format!("{}:", plan.tenant));
            for id in &plan.changes.modified {
                lines.push(format!(
                    "  ({}) {} will be modified",
                    id.kind(),
                    id.qualified_name()
                ));
                total += 1;
            }
            for id in &plan.changes.deleted {
                lines.push(format!(
                    "  ({}) {} will be deleted",
                    id.kind(),
                    id.qualified_name()
                ));
                total += 1;
            }
        }
        lines.push(format!("Total objects to be deployed: {total}"));
        lines
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.iter().all(|t| t.changes.is_empty())
    }
}

/// Per-tenant slice of the run report
#[derive(Debug, Clone)]
pub struct TenantReport {
    pub tenant: String,
    pub records: Vec<DeploymentRecord>,
    /// Absent for dry runs
    pub validation: Option<ValidationReport>,
}

impl TenantReport {
    pub fn applied(&self) -> usize {
        self.records
            .iter()
            .filter(|r| {
                matches!(
                    r.outcome,
                    Outcome::Created | Outcome::Updated | Outcome::Deleted
                )
            })
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.records.iter().filter(|r| r.outcome.is_skip()).count()
    }

    pub fn failed(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.outcome == Outcome::Failed)
            .count()
    }
}

/// Result of one deployment run
#[derive(Debug, Clone)]
pub struct Report {
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub planned: Vec<String>,
    pub tenants: Vec<TenantReport>,
}

impl Report {
    pub fn is_success(&self) -> bool {
        self.tenants.iter().all(|t| {
            t.failed() == 0 && t.validation.as_ref().map_or(true, |v| v.passed())
        })
    }
}

/// Fingerprint of definition content, recorded alongside applied objects.
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("sha256:{:x}", hasher.finalize())
}

/// Dependency-aware deployment engine
pub struct DeploymentEngine<FS, C> {
    store: DefinitionStore<FS>,
    catalog: C,
    events: Arc<dyn EventSink>,
    tenant_filter: Vec<String>,
    resolve_dependencies: bool,
}

impl<FS: FileSystem, C: CatalogClient> DeploymentEngine<FS, C> {
    pub fn new(store: DefinitionStore<FS>, catalog: C, events: Arc<dyn EventSink>) -> Self {
        Self {
            store,
            catalog,
            events,
            tenant_filter: Vec::new(),
            resolve_dependencies: false,
        }
    }

    /// Restrict the run to the named tenants; an empty filter means all.
    pub fn with_tenant_filter(mut self, tenants: Vec<String>) -> Self {
        self.tenant_filter = tenants;
        self
    }

    /// Apply each modified object's dependencies before the object itself.
    pub fn with_dependency_resolution(mut self, enabled: bool) -> Self {
        self.resolve_dependencies = enabled;
        self
    }

    /// The catalog this engine deploys against.
    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Turn per-tenant change sets into an ordered deployment plan.
    pub fn plan(&self, change_sets: &BTreeMap<String, ChangeSet>) -> DeploymentPlan {
        let tenants = change_sets
            .iter()
            .filter(|(tenant, _)| {
                self.tenant_filter.is_empty()
                    || self.tenant_filter.iter().any(|t| t == *tenant)
            })
            .map(|(tenant, changes)| TenantPlan {
                tenant: tenant.clone(),
                changes: changes.clone(),
            })
            .collect();
        DeploymentPlan { tenants }
    }

    /// Execute a plan. Dry runs report what would happen and make zero
    /// mutating catalog calls.
    pub fn execute(&self, plan: &DeploymentPlan, dry_run: bool) -> Report {
        let started_at = Utc::now();
        let planned = plan.summary();

        let mut tenants = Vec::new();
        if !dry_run {
            for tenant_plan in &plan.tenants {
                tenants.push(self.deploy_tenant(tenant_plan));
            }
        }

        Report {
            dry_run,
            started_at,
            finished_at: Utc::now(),
            planned,
            tenants,
        }
    }

    /// One tenant, start to finish: snapshot, apply, validate.
    fn deploy_tenant(&self, plan: &TenantPlan) -> TenantReport {
        let project = self
            .store
            .naming()
            .project_for(&plan.tenant);

        self.events.on_event(DeployEvent::TenantStarted {
            tenant: plan.tenant.clone(),
            modified: plan.changes.modified.len(),
            deleted: plan.changes.deleted.len(),
        });

        // Snapshot once; collateral detection compares against this.
        let before_state = self
            .catalog
            .list_objects(&project, &[])
            .unwrap_or_default();

        let mut records = Vec::new();
        let mut processed: BTreeSet<String> = BTreeSet::new();

        for id in &plan.changes.modified {
            if self.resolve_dependencies
                && !self.apply_dependencies(id, &mut processed, &mut records)
            {
                continue;
            }
            if processed.contains(&id.fully_qualified()) {
                records.push(self.record(
                    id,
                    Operation::Modified,
                    Outcome::SkippedAlreadyApplied,
                    Some("already deployed as a dependency".to_string()),
                ));
                continue;
            }
            processed.insert(id.fully_qualified());
            records.push(self.apply(id, Operation::Modified));
        }

        for id in &plan.changes.deleted {
            records.push(self.apply(id, Operation::Deleted));
        }

        let validation =
            self.validate_deployment(&plan.changes, &project, &before_state);

        let report = TenantReport {
            tenant: plan.tenant.clone(),
            records,
            validation: Some(validation),
        };
        self.events.on_event(DeployEvent::TenantCompleted {
            tenant: plan.tenant.clone(),
            applied: report.applied(),
            skipped: report.skipped(),
            failed: report.failed(),
        });
        report
    }

    /// Apply everything `id` depends on, deepest first, each at most once
    /// across the whole batch. Returns false when tree construction failed
    /// and the target was already recorded as failed.
    fn apply_dependencies(
        &self,
        id: &SqlObjectIdentifier,
        processed: &mut BTreeSet<String>,
        records: &mut Vec<DeploymentRecord>,
    ) -> bool {
        let resolver = DependencyResolver::new(&self.store);
        let tree = match resolver.dependencies_of(id) {
            Ok(tree) => tree,
            Err(e) => {
                records.push(self.record(
                    id,
                    Operation::Modified,
                    Outcome::Failed,
                    Some(e.to_string()),
                ));
                processed.insert(id.fully_qualified());
                return false;
            }
        };
        for fault in &tree.faults {
            self.events.on_event(DeployEvent::Warning {
                message: fault.clone(),
            });
        }

        for dependency in tree.flatten() {
            if !processed.insert(dependency.fully_qualified()) {
                continue;
            }
            self.events.on_event(DeployEvent::DependencyApplied {
                of: id.fully_qualified(),
                dependency: dependency.fully_qualified(),
            });
            records.push(self.apply(&dependency, Operation::Modified));
        }
        true
    }

    /// Apply one object, folding any fault into its record.
    fn apply(&self, id: &SqlObjectIdentifier, operation: Operation) -> DeploymentRecord {
        match self.try_apply(id, operation) {
            Ok(record) => record,
            Err(e) => self.record(id, operation, Outcome::Failed, Some(e.to_string())),
        }
    }

    fn try_apply(
        &self,
        id: &SqlObjectIdentifier,
        operation: Operation,
    ) -> ShipResult<DeploymentRecord> {
        match (operation, id.kind()) {
            // Physical tables are never dropped by tooling.
            (Operation::Deleted, ObjectKind::Table) => Ok(self.record(
                id,
                operation,
                Outcome::SkippedManualDropRequired,
                Some("table drops must be performed manually".to_string()),
            )),
            (Operation::Deleted, _) => match self.catalog.delete_object(id) {
                Ok(()) => Ok(self.record(id, operation, Outcome::Deleted, None)),
                Err(CatalogError::NotFound { .. }) => Ok(self.record(
                    id,
                    operation,
                    Outcome::DeletionSkippedNotFound,
                    Some("does not exist and will be skipped".to_string()),
                )),
                Err(e) => Err(e.into()),
            },
            (Operation::Modified, ObjectKind::Table) => self.apply_table(id),
            (Operation::Modified, kind) => self.apply_definition(id, kind),
        }
    }

    /// Get-or-create for definition-backed kinds; unchanged definitions are
    /// skipped, changed ones updated in place.
    fn apply_definition(
        &self,
        id: &SqlObjectIdentifier,
        kind: ObjectKind,
    ) -> ShipResult<DeploymentRecord> {
        let definition = self.store.definition(id)?;
        if kind.is_routine() {
            RoutineSignature::parse(&definition, id.name())?;
        }

        let fingerprint = hash_content(&definition);
        match self.catalog.get_object(id) {
            Ok(live) => {
                if live.definition == definition {
                    let mut record = self.record(
                        id,
                        Operation::Modified,
                        Outcome::SkippedUnchanged,
                        Some("definition is already up to date".to_string()),
                    );
                    record.fingerprint = Some(fingerprint);
                    Ok(record)
                } else {
                    self.catalog.update_object(
                        id,
                        CatalogObject::with_definition(kind, definition),
                        &[UpdateField::Definition],
                    )?;
                    let mut record =
                        self.record(id, Operation::Modified, Outcome::Updated, None);
                    record.fingerprint = Some(fingerprint);
                    Ok(record)
                }
            }
            Err(CatalogError::NotFound { .. }) => {
                self.catalog
                    .create_object(id, CatalogObject::with_definition(kind, definition))?;
                let mut record = self.record(id, Operation::Modified, Outcome::Created, None);
                record.fingerprint = Some(fingerprint);
                Ok(record)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Additive-only schema evolution: new columns are appended, live
    /// columns missing from the definition are reported and kept.
    fn apply_table(&self, id: &SqlObjectIdentifier) -> ShipResult<DeploymentRecord> {
        let definition = self.store.definition(id)?;
        let columns = parse_table_columns(&definition)?;

        match self.catalog.get_object(id) {
            Ok(live) => {
                let live_names: BTreeSet<&str> =
                    live.columns.iter().map(|c| c.name.as_str()).collect();
                let file_names: BTreeSet<&str> =
                    columns.iter().map(|c| c.name.as_str()).collect();

                let missing: Vec<&str> = live_names.difference(&file_names).copied().collect();
                if !missing.is_empty() {
                    self.events.on_event(DeployEvent::Warning {
                        message: format!(
                            "Columns missing from the provided definition for {}: {}. They will not be dropped.",
                            id.qualified_name(),
                            missing.join(", ")
                        ),
                    });
                }

                let to_add: Vec<_> = columns
                    .iter()
                    .filter(|c| !live_names.contains(c.name.as_str()))
                    .cloned()
                    .collect();
                if to_add.is_empty() {
                    return Ok(self.record(
                        id,
                        Operation::Modified,
                        Outcome::SkippedUnchanged,
                        Some("table schema already matches".to_string()),
                    ));
                }

                let mut new_schema = live.columns.clone();
                new_schema.extend(to_add);
                self.catalog.update_object(
                    id,
                    CatalogObject::with_columns(new_schema),
                    &[UpdateField::Schema],
                )?;
                Ok(self.record(id, Operation::Modified, Outcome::Updated, None))
            }
            Err(CatalogError::NotFound { .. }) => {
                self.catalog
                    .create_object(id, CatalogObject::with_columns(columns))?;
                Ok(self.record(id, Operation::Modified, Outcome::Created, None))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Re-query deletions, re-fetch modified definitions for diffing, and
    /// flag collateral drops against the pre-run snapshot.
    fn validate_deployment(
        &self,
        changes: &ChangeSet,
        project: &str,
        before_state: &BTreeSet<String>,
    ) -> ValidationReport {
        let mut validation = ValidationReport::default();

        for id in &changes.deleted {
            if id.kind() == ObjectKind::Table {
                continue;
            }
            if self.catalog.get_object(id).is_ok() {
                validation
                    .residual_deletions
                    .push(id.fully_qualified());
                self.events.on_event(DeployEvent::ResidualDeletion {
                    name: id.fully_qualified(),
                });
            }
        }

        for id in &changes.modified {
            if id.kind() == ObjectKind::Table {
                continue;
            }
            let (Ok(live), Ok(local)) =
                (self.catalog.get_object(id), self.store.definition(id))
            else {
                continue;
            };
            if live.definition != local {
                let diff = TextDiff::from_lines(live.definition.as_str(), local.as_str())
                    .unified_diff()
                    .header("live", "source")
                    .to_string();
                validation
                    .definition_diffs
                    .push((id.fully_qualified(), diff));
            }
        }

        let after_state = self
            .catalog
            .list_objects(project, &[])
            .unwrap_or_default();
        let deleted_names: BTreeSet<String> = changes
            .deleted
            .iter()
            .map(|id| id.qualified_name())
            .collect();
        for vanished in before_state.difference(&after_state) {
            if !deleted_names.contains(vanished) {
                validation.collateral_drops.push(vanished.clone());
                self.events.on_event(DeployEvent::CollateralDrop {
                    name: vanished.clone(),
                });
            }
        }

        validation
    }

    fn record(
        &self,
        id: &SqlObjectIdentifier,
        operation: Operation,
        outcome: Outcome,
        detail: Option<String>,
    ) -> DeploymentRecord {
        let record = DeploymentRecord {
            id: id.clone(),
            operation,
            outcome,
            detail,
            fingerprint: None,
        };
        self.events.on_event(DeployEvent::ObjectApplied {
            tenant: id.tenant().to_string(),
            name: id.qualified_name(),
            outcome,
            detail: record.detail.clone(),
        });
        record
    }
}
