//! SQL object identifiers and definitions
//!
//! An identifier is an immutable value `{tenant, dataset, name, kind}` with
//! the warehouse project derived from the tenant. Identifiers map
//! deterministically to exactly one source-tree path; definitions are read
//! from that path at most once and placeholder-substituted at load time.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Deserialize;

use crate::config::Naming;
use crate::error::{ShipError, ShipResult};
use crate::fs::FileSystem;

/// Kind of catalog object, inferred from the object name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectKind {
    View,
    MaterializedView,
    Table,
    Function,
    Procedure,
}

impl ObjectKind {
    /// Infer the kind from the naming convention.
    pub fn infer(name: &str) -> Self {
        if name.starts_with("vw_") {
            Self::View
        } else if name.starts_with("mv_") {
            Self::MaterializedView
        } else if name.starts_with("proc_") {
            Self::Procedure
        } else if name.starts_with("fn_") || name.contains('(') {
            Self::Function
        } else {
            Self::Table
        }
    }

    /// Resolve a source-tree kind directory segment.
    pub fn from_segment(segment: &str, name: &str) -> ShipResult<Self> {
        match segment {
            "view" => Ok(Self::View),
            "materialized_view" => Ok(Self::MaterializedView),
            "table" => Ok(Self::Table),
            "function" => Ok(Self::Function),
            "procedure" => Ok(Self::Procedure),
            _ => Err(ShipError::UnsupportedKind {
                kind: segment.to_string(),
                name: name.to_string(),
            }),
        }
    }

    /// Directory segment used in the source tree.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::MaterializedView => "materialized_view",
            Self::Table => "table",
            Self::Function => "function",
            Self::Procedure => "procedure",
        }
    }

    /// Source file extension: SQL text for everything except table schemas,
    /// which are structured field lists.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Table => "json",
            _ => "sql",
        }
    }

    /// Whether this kind is a routine with a parsed signature.
    pub fn is_routine(&self) -> bool {
        matches!(self, Self::Function | Self::Procedure)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of one catalog object.
///
/// Equality, ordering, and hashing are strict (on the fully-qualified name
/// plus kind); use [`SqlObjectIdentifier::matches`] for the loose template
/// match between a tenant override and its generic shared template.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SqlObjectIdentifier {
    project: String,
    tenant: String,
    dataset: String,
    name: String,
    kind: ObjectKind,
}

impl SqlObjectIdentifier {
    /// Build an identifier from its parts, deriving the project.
    pub fn new(tenant: &str, dataset: &str, name: &str, naming: &Naming) -> Self {
        Self {
            project: naming.project_for(tenant),
            tenant: tenant.to_string(),
            dataset: dataset.to_string(),
            name: name.to_string(),
            kind: ObjectKind::infer(name),
        }
    }

    /// Parse a fully-qualified `project.dataset.name` identifier.
    ///
    /// Backtick quoting is stripped; anything other than exactly three
    /// dot-separated tokens is rejected.
    pub fn resolve(input: &str, naming: &Naming) -> ShipResult<Self> {
        let cleaned = input.replace('`', "");
        let parts: Vec<&str> = cleaned.split('.').collect();
        if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(ShipError::InvalidIdentifier {
                input: input.to_string(),
            });
        }
        let (project, dataset, name) = (parts[0], parts[1], parts[2]);
        Ok(Self {
            project: project.to_string(),
            tenant: naming.tenant_for(project),
            dataset: dataset.to_string(),
            name: name.to_string(),
            kind: ObjectKind::infer(name),
        })
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// `project.dataset.name`
    pub fn fully_qualified(&self) -> String {
        format!("{}.{}.{}", self.project, self.dataset, self.name)
    }

    /// `dataset.name`, the form the warehouse lists objects under.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.dataset, self.name)
    }

    fn is_global(&self, naming: &Naming) -> bool {
        self.tenant == naming.global_marker
    }

    /// Whether this object lives under the shared root (no tenant segment).
    ///
    /// Shared placement is signalled by the reserved shared dataset, by the
    /// global-marker dataset (fleet-wide objects fanned out from a shallow
    /// change path), or by the shared-template suffix on the name.
    pub fn is_shared(&self, naming: &Naming) -> bool {
        self.dataset == naming.shared_dataset
            || self.dataset == naming.global_marker
            || self.name.ends_with(&naming.shared_suffix)
    }

    /// Loose template match.
    ///
    /// Identical fully-qualified names always match. Otherwise a match
    /// requires exactly one side to be the global marker, datasets to agree
    /// (an empty dataset agrees with anything), kinds to agree, and names to
    /// agree after stripping one trailing `*` wildcard. This is how a tenant
    /// override is paired with its generic shared template.
    pub fn matches(&self, other: &Self, naming: &Naming) -> bool {
        if self.fully_qualified() == other.fully_qualified() {
            return true;
        }
        if self.name.is_empty() || other.name.is_empty() {
            return false;
        }

        let mut matched = self.is_global(naming) ^ other.is_global(naming);
        matched &= self.dataset == other.dataset
            || (self.dataset.is_empty() ^ other.dataset.is_empty());
        matched &= self.kind == other.kind;

        let own = self.name.strip_suffix('*').unwrap_or(&self.name);
        let theirs = other.name.strip_suffix('*').unwrap_or(&other.name);
        matched && own == theirs
    }

    /// The single source-tree path this identifier maps to.
    ///
    /// Shared objects (the shared dataset, or names carrying the shared
    /// template suffix) live directly under the root with no tenant segment.
    pub fn source_path(&self, root: &Path, naming: &Naming) -> PathBuf {
        let mut path = root.to_path_buf();
        if !self.is_shared(naming) {
            path.push(&self.tenant);
        }
        path.push(&self.dataset);
        path.push(self.kind.as_str());
        path.push(format!("{}.{}", self.name, self.kind.extension()));
        path
    }
}

impl fmt::Display for SqlObjectIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fully_qualified())
    }
}

/// One column of a table field-list schema.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    #[serde(default = "default_mode")]
    pub mode: String,
}

fn default_mode() -> String {
    "NULLABLE".to_string()
}

/// Parse a table definition (JSON field list) into columns.
pub fn parse_table_columns(definition: &str) -> ShipResult<Vec<ColumnDef>> {
    Ok(serde_json::from_str(definition)?)
}

/// Memoized definition loader.
///
/// Each identifier's source file is read at most once per store; the
/// `${project}` and `${dataset}` placeholders are substituted with the
/// identifier's concrete values at load time.
pub struct DefinitionStore<FS> {
    fs: FS,
    root: PathBuf,
    naming: Naming,
    cache: Mutex<HashMap<String, String>>,
}

impl<FS: FileSystem> DefinitionStore<FS> {
    pub fn new(fs: FS, root: impl Into<PathBuf>, naming: Naming) -> Self {
        Self {
            fs,
            root: root.into(),
            naming,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn naming(&self) -> &Naming {
        &self.naming
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load (or recall) the substituted definition text for an identifier.
    pub fn definition(&self, id: &SqlObjectIdentifier) -> ShipResult<String> {
        let key = id.fully_qualified();
        if let Some(cached) = self.cache.lock().unwrap().get(&key) {
            return Ok(cached.clone());
        }

        let path = id.source_path(&self.root, &self.naming);
        let raw = self
            .fs
            .read_to_string(&path)
            .map_err(|e| ShipError::DefinitionRead {
                path: path.clone(),
                message: e.to_string(),
            })?;
        let substituted = raw
            .replace("${project}", id.project())
            .replace("${dataset}", id.dataset());

        self.cache
            .lock()
            .unwrap()
            .insert(key, substituted.clone());
        Ok(substituted)
    }
}

/// Parsed routine header.
///
/// Two shapes exist: scalar routines declare `RETURNS <type>`; table-valued
/// routines have no `RETURNS` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineSignature {
    pub args: Vec<RoutineArg>,
    pub returns: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineArg {
    pub name: String,
    pub arg_type: String,
}

impl RoutineSignature {
    /// Pattern-match the `CREATE ... name(args)` header of a routine
    /// definition. Applies only to function/procedure kinds; a malformed
    /// header is fatal for that object.
    pub fn parse(definition: &str, object_name: &str) -> ShipResult<Self> {
        let malformed = |message: &str| ShipError::Parse {
            name: object_name.to_string(),
            message: message.to_string(),
        };

        let upper = definition.to_uppercase();
        if !upper.contains("CREATE") {
            return Err(malformed("no CREATE header"));
        }

        let open = definition
            .find('(')
            .ok_or_else(|| malformed("no argument list"))?;
        let mut depth = 0usize;
        let mut close = None;
        for (offset, ch) in definition[open..].char_indices() {
            match ch {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some(open + offset);
                        break;
                    }
                }
                _ => {}
            }
        }
        let close = close.ok_or_else(|| malformed("unbalanced argument list"))?;

        let mut args = Vec::new();
        let arg_text = &definition[open + 1..close];
        for piece in split_top_level(arg_text) {
            let piece = piece.trim();
            if piece.is_empty() {
                continue;
            }
            let (name, arg_type) = piece
                .split_once(char::is_whitespace)
                .ok_or_else(|| malformed("argument without a type"))?;
            args.push(RoutineArg {
                name: name.to_string(),
                arg_type: arg_type.split_whitespace().collect::<Vec<_>>().join(" "),
            });
        }

        let tail = &definition[close + 1..];
        let returns = match tail.to_uppercase().find("RETURNS") {
            Some(at) => {
                let after = tail[at + "RETURNS".len()..].trim_start();
                let ty: String = take_type_token(after);
                if ty.is_empty() {
                    return Err(malformed("RETURNS with no type"));
                }
                Some(ty)
            }
            None => None,
        };

        Ok(Self { args, returns })
    }
}

/// Split on commas that are not nested inside parentheses or angle brackets
/// (STRUCT<...> and ARRAY<...> types carry internal commas).
fn split_top_level(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut depth = 0isize;
    let mut start = 0usize;
    for (idx, ch) in text.char_indices() {
        match ch {
            '(' | '<' => depth += 1,
            ')' | '>' => depth -= 1,
            ',' if depth == 0 => {
                pieces.push(&text[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    pieces.push(&text[start..]);
    pieces
}

/// Take one type token, keeping any balanced `<...>` payload together.
fn take_type_token(text: &str) -> String {
    let mut out = String::new();
    let mut depth = 0isize;
    for ch in text.chars() {
        match ch {
            '<' => depth += 1,
            '>' => depth -= 1,
            c if c.is_whitespace() && depth == 0 => break,
            _ => {}
        }
        out.push(ch);
    }
    out
}
