//! Error types for sqlship
//!
//! Uses `thiserror` for library errors. Per-object errors are caught at the
//! apply/resolve boundary and folded into the run report; only input-level
//! errors abort a run before any mutation.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for sqlship operations
pub type ShipResult<T> = Result<T, ShipError>;

/// Main error type for sqlship operations
#[derive(Error, Debug)]
pub enum ShipError {
    /// Object absent where one was expected; recovered locally into a skip record
    #[error("object not found: {name}")]
    NotFound { name: String },

    /// Source definition could not be read; fatal for that object's branch
    #[error("failed to read definition from '{path}': {message}")]
    DefinitionRead { path: PathBuf, message: String },

    /// Malformed routine header; fatal for that object only
    #[error("malformed routine header in {name}: {message}")]
    Parse { name: String, message: String },

    /// Input manifest missing; fatal before any mutation
    #[error("manifest file not found: {path}")]
    ManifestNotFound { path: PathBuf },

    /// Unrecognized object kind
    #[error("unsupported object kind '{kind}' for {name}")]
    UnsupportedKind { kind: String, name: String },

    /// Identifier text did not split into exactly project.dataset.name
    #[error("invalid identifier '{input}': expected project.dataset.name")]
    InvalidIdentifier { input: String },

    /// Dependency scanning revisited an identifier on the current path
    #[error("dependency cycle detected at {name}")]
    CycleDetected { name: String },

    /// Configuration file or value error
    #[error("config error: {0}")]
    Config(String),

    /// git invocation failed
    #[error("git error: {0}")]
    Git(String),

    /// Catalog boundary failure other than NotFound
    #[error(transparent)]
    Catalog(#[from] crate::catalog::CatalogError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error (tenant registry, table field lists)
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_error_display_definition_read() {
        let err = ShipError::DefinitionRead {
            path: PathBuf::from("acme/ext/view/vw_orders.sql"),
            message: "permission denied".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to read definition from 'acme/ext/view/vw_orders.sql': permission denied"
        );
    }

    #[test]
    fn test_error_display_manifest_not_found() {
        let err = ShipError::ManifestNotFound {
            path: PathBuf::from("changes.csv"),
        };
        assert_eq!(err.to_string(), "manifest file not found: changes.csv");
    }

    #[test]
    fn test_error_display_invalid_identifier() {
        let err = ShipError::InvalidIdentifier {
            input: "only.two".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid identifier 'only.two': expected project.dataset.name"
        );
    }
}
