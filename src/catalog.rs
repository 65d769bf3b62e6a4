//! Catalog client boundary
//!
//! Everything the engine knows about the warehouse goes through
//! `CatalogClient`. The production implementation wraps the warehouse API
//! and lives with the caller; `MemoryCatalog` backs the test suite and
//! records every mutating call so dry-run and refusal guarantees can be
//! asserted.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use thiserror::Error;

use crate::object::{ColumnDef, ObjectKind, SqlObjectIdentifier};

/// Error at the catalog boundary
#[derive(Error, Debug)]
pub enum CatalogError {
    /// The object does not exist
    #[error("not found: {name}")]
    NotFound { name: String },

    /// Any other API failure
    #[error("catalog error: {message}")]
    Api { message: String },
}

/// Which field of a live object an update replaces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateField {
    /// View query or routine body
    Definition,
    /// Table column schema
    Schema,
}

/// A live catalog object as the warehouse reports it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogObject {
    pub kind: ObjectKind,
    /// View query or routine body; empty for tables
    pub definition: String,
    /// Column schema; empty for non-tables
    pub columns: Vec<ColumnDef>,
}

impl CatalogObject {
    pub fn with_definition(kind: ObjectKind, definition: impl Into<String>) -> Self {
        Self {
            kind,
            definition: definition.into(),
            columns: Vec::new(),
        }
    }

    pub fn with_columns(columns: Vec<ColumnDef>) -> Self {
        Self {
            kind: ObjectKind::Table,
            definition: String::new(),
            columns,
        }
    }
}

/// Synchronous catalog operations, one warehouse project per tenant
pub trait CatalogClient: Send + Sync {
    /// Fetch one object; `CatalogError::NotFound` when absent
    fn get_object(&self, id: &SqlObjectIdentifier) -> Result<CatalogObject, CatalogError>;

    /// Create a new object
    fn create_object(
        &self,
        id: &SqlObjectIdentifier,
        object: CatalogObject,
    ) -> Result<(), CatalogError>;

    /// Update the named fields of an existing object
    fn update_object(
        &self,
        id: &SqlObjectIdentifier,
        object: CatalogObject,
        fields: &[UpdateField],
    ) -> Result<(), CatalogError>;

    /// Delete an object; `CatalogError::NotFound` when already absent
    fn delete_object(&self, id: &SqlObjectIdentifier) -> Result<(), CatalogError>;

    /// All `dataset.name` entries live in a project, optionally restricted
    /// to the given datasets
    fn list_objects(
        &self,
        project: &str,
        datasets: &[String],
    ) -> Result<BTreeSet<String>, CatalogError>;
}

/// In-memory catalog for tests and local dry runs.
///
/// Objects are keyed by project, then `dataset.name`. Every mutating call is
/// appended to a log so tests can assert what reached the boundary.
#[derive(Default)]
pub struct MemoryCatalog {
    state: Mutex<BTreeMap<String, BTreeMap<String, CatalogObject>>>,
    mutations: Mutex<Vec<String>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a live object, bypassing the mutation log.
    pub fn seed(&self, id: &SqlObjectIdentifier, object: CatalogObject) {
        self.state
            .lock()
            .unwrap()
            .entry(id.project().to_string())
            .or_default()
            .insert(id.qualified_name(), object);
    }

    /// Remove a live object out-of-band, simulating external interference.
    pub fn drop_out_of_band(&self, id: &SqlObjectIdentifier) {
        if let Some(project) = self.state.lock().unwrap().get_mut(id.project()) {
            project.remove(&id.qualified_name());
        }
    }

    /// Every mutating call made so far, in order.
    pub fn mutations(&self) -> Vec<String> {
        self.mutations.lock().unwrap().clone()
    }

    fn log(&self, call: String) {
        self.mutations.lock().unwrap().push(call);
    }
}

impl CatalogClient for MemoryCatalog {
    fn get_object(&self, id: &SqlObjectIdentifier) -> Result<CatalogObject, CatalogError> {
        self.state
            .lock()
            .unwrap()
            .get(id.project())
            .and_then(|p| p.get(&id.qualified_name()))
            .cloned()
            .ok_or_else(|| CatalogError::NotFound {
                name: id.fully_qualified(),
            })
    }

    fn create_object(
        &self,
        id: &SqlObjectIdentifier,
        object: CatalogObject,
    ) -> Result<(), CatalogError> {
        self.log(format!("create {}", id.fully_qualified()));
        self.state
            .lock()
            .unwrap()
            .entry(id.project().to_string())
            .or_default()
            .insert(id.qualified_name(), object);
        Ok(())
    }

    fn update_object(
        &self,
        id: &SqlObjectIdentifier,
        object: CatalogObject,
        fields: &[UpdateField],
    ) -> Result<(), CatalogError> {
        self.log(format!("update {}", id.fully_qualified()));
        let mut state = self.state.lock().unwrap();
        let live = state
            .get_mut(id.project())
            .and_then(|p| p.get_mut(&id.qualified_name()))
            .ok_or_else(|| CatalogError::NotFound {
                name: id.fully_qualified(),
            })?;
        for field in fields {
            match field {
                UpdateField::Definition => live.definition = object.definition.clone(),
                UpdateField::Schema => live.columns = object.columns.clone(),
            }
        }
        Ok(())
    }

    fn delete_object(&self, id: &SqlObjectIdentifier) -> Result<(), CatalogError> {
        self.log(format!("delete {}", id.fully_qualified()));
        let mut state = self.state.lock().unwrap();
        let removed = state
            .get_mut(id.project())
            .and_then(|p| p.remove(&id.qualified_name()));
        match removed {
            Some(_) => Ok(()),
            None => Err(CatalogError::NotFound {
                name: id.fully_qualified(),
            }),
        }
    }

    fn list_objects(
        &self,
        project: &str,
        datasets: &[String],
    ) -> Result<BTreeSet<String>, CatalogError> {
        let state = self.state.lock().unwrap();
        let names = state
            .get(project)
            .map(|p| {
                p.keys()
                    .filter(|name| {
                        datasets.is_empty()
                            || datasets
                                .iter()
                                .any(|d| name.starts_with(&format!("{}.", d)))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(names)
    }
}
