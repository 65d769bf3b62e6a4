//! sqlship - dependency-aware SQL object deployment
//!
//! sqlship deploys versioned SQL object definitions (views, materialized
//! views, tables, functions, procedures) from a shared multi-tenant source
//! tree out to per-tenant projects in a cloud data warehouse, resolving
//! inter-object dependencies and validating the outcome against the catalog.

pub mod catalog;
pub mod changeset;
pub mod config;
pub mod deps;
pub mod engine;
pub mod error;
pub mod events;
pub mod fs;
pub mod git;
pub mod object;
pub mod pipeline;
pub mod tenants;

// Re-exports for convenience
pub use catalog::{CatalogClient, CatalogError, CatalogObject, MemoryCatalog, UpdateField};
pub use changeset::{
    example_manifest, ChangeSet, ChangeSetExtractor, ChangeSource, CommitStats, DiffEntry,
    Operation,
};
pub use config::{Config, Naming};
pub use deps::{DependencyResolver, DependencyTree};
pub use engine::{DeploymentEngine, DeploymentPlan, DeploymentRecord, Outcome, Report};
pub use error::{ShipError, ShipResult};
pub use events::{DeployEvent, EventSink, JsonEventSink, NoopEventSink};
pub use fs::{FileSystem, LocalFs};
pub use git::GitCli;
pub use object::{DefinitionStore, ObjectKind, RoutineSignature, SqlObjectIdentifier};
pub use pipeline::{Advance, PipelineCoordinator, StageJob, StageStatus, StageTracker};
pub use tenants::{JsonTenantDirectory, StaticTenantDirectory, TenantDirectory};
