//! Configuration module for sqlship
//!
//! Configuration hierarchy:
//! 1. CLI flags (highest priority, applied by the caller)
//! 2. Environment variables (SQLSHIP_*)
//! 3. Config file (sqlship.toml)
//! 4. Built-in defaults (lowest priority)

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ShipError, ShipResult};

/// Naming conventions shared by identifier resolution and path derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Naming {
    /// Prefix prepended to a tenant name to form its warehouse project id
    #[serde(default = "default_project_prefix")]
    pub project_prefix: String,

    /// Explicit project id that overrides the derived one for every tenant
    #[serde(default)]
    pub project_override: Option<String>,

    /// Reserved tenant marker for objects shared across the whole fleet
    #[serde(default = "default_global_marker")]
    pub global_marker: String,

    /// Dataset whose objects live under the shared root with no tenant segment
    #[serde(default = "default_shared_dataset")]
    pub shared_dataset: String,

    /// Object-name suffix marking a shared template
    #[serde(default = "default_shared_suffix")]
    pub shared_suffix: String,
}

impl Default for Naming {
    fn default() -> Self {
        Self {
            project_prefix: default_project_prefix(),
            project_override: None,
            global_marker: default_global_marker(),
            shared_dataset: default_shared_dataset(),
            shared_suffix: default_shared_suffix(),
        }
    }
}

impl Naming {
    /// Derive the warehouse project id for a tenant.
    pub fn project_for(&self, tenant: &str) -> String {
        match &self.project_override {
            Some(project) => project.clone(),
            None => format!("{}{}", self.project_prefix, tenant),
        }
    }

    /// Recover the tenant name from a project id.
    ///
    /// Projects carrying the configured prefix strip it; anything else keeps
    /// its last dash-separated segment, matching how override and sandbox
    /// projects are named.
    pub fn tenant_for(&self, project: &str) -> String {
        if let Some(tenant) = project.strip_prefix(&self.project_prefix) {
            if !tenant.is_empty() {
                return tenant.to_string();
            }
        }
        project
            .rsplit('-')
            .next()
            .unwrap_or(project)
            .to_string()
    }
}

fn default_project_prefix() -> String {
    "warehouse-tenant-".to_string()
}

fn default_global_marker() -> String {
    "global".to_string()
}

fn default_shared_dataset() -> String {
    "core".to_string()
}

fn default_shared_suffix() -> String {
    "_0".to_string()
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Root of the SQL object source tree
    #[serde(default)]
    pub source_root: PathBuf,

    /// Repository-relative prefix stripped from commit and diff paths to
    /// reach the object root (e.g. `infrastructure/warehouse/sql/`)
    #[serde(default)]
    pub repo_prefix: String,

    /// Path to the tenant registry JSON file
    #[serde(default)]
    pub registry: Option<PathBuf>,

    #[serde(default)]
    pub naming: Naming,
}

impl Config {
    /// Load configuration from the default file, if present, then apply
    /// environment overrides.
    pub fn load() -> ShipResult<Self> {
        Self::load_from(Path::new("sqlship.toml"))
    }

    /// Load configuration from a specific file path.
    ///
    /// A missing file is not an error; defaults apply. A present but
    /// malformed file is a `Config` error.
    pub fn load_from(path: &Path) -> ShipResult<Self> {
        let mut config = if path.exists() {
            let raw = fs::read_to_string(path)?;
            toml::from_str(&raw).map_err(|e| ShipError::Config(e.to_string()))?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply SQLSHIP_* environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SQLSHIP_SOURCE_ROOT") {
            self.source_root = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("SQLSHIP_REGISTRY") {
            self.registry = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("SQLSHIP_REPO_PREFIX") {
            self.repo_prefix = v;
        }
        if let Ok(v) = std::env::var("SQLSHIP_PROJECT_PREFIX") {
            self.naming.project_prefix = v;
        }
        if let Ok(v) = std::env::var("SQLSHIP_PROJECT_OVERRIDE") {
            self.naming.project_override = Some(v);
        }
        if let Ok(v) = std::env::var("SQLSHIP_GLOBAL_MARKER") {
            self.naming.global_marker = v;
        }
        if let Ok(v) = std::env::var("SQLSHIP_SHARED_DATASET") {
            self.naming.shared_dataset = v;
        }
        if let Ok(v) = std::env::var("SQLSHIP_SHARED_SUFFIX") {
            self.naming.shared_suffix = v;
        }
    }
}
