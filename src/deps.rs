//! Dependency resolution
//!
//! Builds a dependency tree for one object by recursively scanning
//! definition text for references to other catalog objects, then flattens
//! it into a dependency-first apply order. Reference extraction is lexical:
//! whitespace-split tokens that carry the tenant's project id mark a
//! reference; temp/staging namespaces and self-references are excluded.

use std::collections::BTreeSet;

use crate::error::{ShipError, ShipResult};
use crate::fs::FileSystem;
use crate::object::{DefinitionStore, SqlObjectIdentifier};

/// One node of a dependency tree
#[derive(Debug, Clone)]
pub struct DependencyNode {
    pub id: SqlObjectIdentifier,
    pub children: Vec<DependencyNode>,
}

/// Dependency tree rooted at one identifier
#[derive(Debug, Clone)]
pub struct DependencyTree {
    pub root: DependencyNode,
    /// Branches that could not be read; the tree is incomplete but usable
    pub faults: Vec<String>,
}

impl DependencyTree {
    /// Dependency-first apply order: deepest descendants first, each
    /// identifier once, the root itself excluded.
    pub fn flatten(&self) -> Vec<SqlObjectIdentifier> {
        let mut by_depth: Vec<(usize, &SqlObjectIdentifier)> = Vec::new();
        collect(&self.root, 0, &mut by_depth);

        let max_depth = by_depth.iter().map(|(d, _)| *d).max().unwrap_or(0);
        let mut seen = BTreeSet::new();
        let mut ordered = Vec::new();
        for depth in (1..=max_depth).rev() {
            for (d, id) in &by_depth {
                if *d == depth && seen.insert(id.fully_qualified()) {
                    ordered.push((*id).clone());
                }
            }
        }
        ordered
    }

    /// Indented rendering of the tree for reports.
    pub fn render(&self) -> String {
        let mut out = String::new();
        render_node(&self.root, 0, &mut out);
        out
    }
}

fn collect<'a>(
    node: &'a DependencyNode,
    depth: usize,
    out: &mut Vec<(usize, &'a SqlObjectIdentifier)>,
) {
    out.push((depth, &node.id));
    for child in &node.children {
        collect(child, depth + 1, out);
    }
}

fn render_node(node: &DependencyNode, depth: usize, out: &mut String) {
    for _ in 0..depth {
        out.push_str("    ");
    }
    out.push_str(&node.id.fully_qualified());
    out.push('\n');
    for child in &node.children {
        render_node(child, depth + 1, out);
    }
}

/// Builds dependency trees against a definition store
pub struct DependencyResolver<'a, FS> {
    store: &'a DefinitionStore<FS>,
}

impl<'a, FS: FileSystem> DependencyResolver<'a, FS> {
    pub fn new(store: &'a DefinitionStore<FS>) -> Self {
        Self { store }
    }

    /// Build the dependency tree rooted at `root`.
    ///
    /// Best-effort: an unreadable definition ends that branch with a fault
    /// and siblings continue. Revisiting an identifier already on the
    /// current path is a `CycleDetected` error.
    pub fn dependencies_of(&self, root: &SqlObjectIdentifier) -> ShipResult<DependencyTree> {
        let mut faults = Vec::new();
        let mut visiting = BTreeSet::new();
        let node = self.build_node(root, &mut visiting, &mut faults)?;
        Ok(DependencyTree { root: node, faults })
    }

    fn build_node(
        &self,
        id: &SqlObjectIdentifier,
        visiting: &mut BTreeSet<String>,
        faults: &mut Vec<String>,
    ) -> ShipResult<DependencyNode> {
        let key = id.fully_qualified();
        if !visiting.insert(key.clone()) {
            return Err(ShipError::CycleDetected { name: key });
        }

        let mut children = Vec::new();
        match self.store.definition(id) {
            Ok(text) => {
                for reference in extract_references(&text, id) {
                    match SqlObjectIdentifier::resolve(&reference, self.store.naming()) {
                        Ok(child) => {
                            children.push(self.build_node(&child, visiting, faults)?)
                        }
                        Err(_) => faults.push(format!(
                            "Reference '{reference}' in {key} is not a resolvable identifier"
                        )),
                    }
                }
            }
            Err(_) => faults.push(format!(
                "Definition for {key} could not be read. Dependency tree will be incomplete."
            )),
        }

        visiting.remove(&key);
        Ok(DependencyNode {
            id: id.clone(),
            children,
        })
    }
}

/// Lexically extract referenced identifiers from substituted definition text.
fn extract_references(text: &str, parent: &SqlObjectIdentifier) -> Vec<String> {
    let project = parent.project();
    let own_name = parent.fully_qualified();

    let mut references = Vec::new();
    for word in text.split_whitespace() {
        if !word.contains(project) || word.contains("temp.") || word.contains("staging.") {
            continue;
        }
        let cleaned = leading_identifier_run(&word.replace('`', ""));
        if cleaned.is_empty() || cleaned == own_name {
            continue;
        }
        references.push(cleaned);
    }
    references
}

/// Leading run of identifier characters; trailing punctuation like `,` or
/// `)` ends the reference.
fn leading_identifier_run(token: &str) -> String {
    token
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '*'))
        .collect()
}
