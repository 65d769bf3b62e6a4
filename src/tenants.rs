//! Tenant directory
//!
//! Authoritative list of known tenant identifiers. Injected wherever the
//! fleet membership matters (global fan-out, deployment iteration) so tests
//! and one-off runs can substitute a fixed list.

use std::path::Path;

use serde::Deserialize;

use crate::error::ShipResult;
use crate::fs::FileSystem;

/// Authoritative list of known tenants
pub trait TenantDirectory {
    /// All known tenant names, in stable order
    fn tenants(&self) -> Vec<String>;

    /// Whether a tenant is known
    fn contains(&self, name: &str) -> bool {
        self.tenants().iter().any(|t| t == name)
    }
}

/// One row of the tenant registry file
#[derive(Debug, Clone, Deserialize)]
struct RegistryEntry {
    name: String,
    #[serde(default)]
    #[allow(dead_code)]
    project: Option<String>,
}

/// Tenant directory backed by a JSON registry file
///
/// The registry is a JSON array of `{"name": ..., "project": optional}`
/// entries. Entries named in the ignore list are excluded. The file is read
/// once at construction; a malformed or missing registry is an input-level
/// error that aborts the run.
#[derive(Debug, Clone)]
pub struct JsonTenantDirectory {
    names: Vec<String>,
}

impl JsonTenantDirectory {
    pub fn load<FS: FileSystem + ?Sized>(
        path: &Path,
        fs: &FS,
        ignore: &[String],
    ) -> ShipResult<Self> {
        let raw = fs.read_to_string(path)?;
        let entries: Vec<RegistryEntry> = serde_json::from_str(&raw)?;
        let names = entries
            .into_iter()
            .map(|e| e.name)
            .filter(|n| !ignore.iter().any(|i| i == n))
            .collect();
        Ok(Self { names })
    }
}

impl TenantDirectory for JsonTenantDirectory {
    fn tenants(&self) -> Vec<String> {
        self.names.clone()
    }
}

/// Fixed-list tenant directory for tests and explicit runs
#[derive(Debug, Clone, Default)]
pub struct StaticTenantDirectory {
    names: Vec<String>,
}

impl StaticTenantDirectory {
    pub fn new(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl TenantDirectory for StaticTenantDirectory {
    fn tenants(&self) -> Vec<String> {
        self.names.clone()
    }
}
