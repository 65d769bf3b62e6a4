//! sqlship CLI - dependency-aware SQL object deployment
//!
//! Usage: sqlship <COMMAND>
//!
//! Commands:
//!   deploy            Classify a change source and plan its deployment
//!   example-manifest  Print the expected manifest format
//!
//! The binary is glue: it selects a change-source strategy, wires the
//! library together, and renders the resulting plan and report. Executing
//! against a live warehouse happens through a `CatalogClient` linked in by
//! an integrator; this build previews only.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use sqlship::changeset::{ChangeSetExtractor, ChangeSource};
use sqlship::deps::DependencyResolver;
use sqlship::engine::DeploymentEngine;
use sqlship::events::{EventSink, JsonEventSink, NoopEventSink};
use sqlship::fs::LocalFs;
use sqlship::git::GitCli;
use sqlship::object::DefinitionStore;
use sqlship::tenants::{JsonTenantDirectory, StaticTenantDirectory, TenantDirectory};
use sqlship::{Config, MemoryCatalog};

/// sqlship - dependency-aware SQL object deployment
#[derive(Parser, Debug)]
#[command(name = "sqlship")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Emit NDJSON events instead of plain text
    #[arg(long, default_value = "false")]
    json: bool,

    /// Path to the configuration file
    #[arg(long, default_value = "sqlship.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify a change source and plan its deployment
    Deploy {
        /// Commit SHA whose changed files should be deployed
        #[arg(long)]
        sha: Option<String>,

        /// Manifest file of modifications to deploy
        #[arg(long)]
        manifest: Option<PathBuf>,

        /// Deploy the uncommitted working tree
        #[arg(long)]
        working_tree: bool,

        /// Repository root for git-based change sources
        #[arg(long, default_value = ".")]
        repo: PathBuf,

        /// Restrict the run to these tenants (comma separated)
        #[arg(long)]
        tenants: Option<String>,

        /// Resolve and apply each object's dependencies first
        #[arg(long)]
        deps: bool,

        /// Apply the changes instead of previewing them
        #[arg(long)]
        go: bool,

        /// Comma-separated tenants to exclude from the registry
        #[arg(long)]
        ignore: Option<String>,
    },

    /// Print the expected manifest format
    ExampleManifest,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::ExampleManifest => {
            println!("{}", sqlship::example_manifest());
            Ok(())
        }
        Commands::Deploy {
            sha,
            manifest,
            working_tree,
            repo,
            tenants,
            deps,
            go,
            ignore,
        } => {
            let config = Config::load_from(&cli.config)?;
            let events: Arc<dyn EventSink> = if cli.json {
                Arc::new(JsonEventSink::stdout())
            } else {
                Arc::new(NoopEventSink)
            };

            let source = change_source(sha, manifest, working_tree, &repo)?;
            let directory = tenant_directory(&config, ignore.as_deref())?;

            let mut extractor = ChangeSetExtractor::new(
                source,
                config.clone(),
                LocalFs,
                directory,
                events.clone(),
            );
            let change_sets = extractor.change_sets()?.clone();
            if change_sets.is_empty() {
                println!("No SQL object changes found in the provided source, exiting...");
                return Ok(());
            }

            let store = DefinitionStore::new(
                LocalFs,
                config.source_root.clone(),
                config.naming.clone(),
            );
            let engine = DeploymentEngine::new(store, MemoryCatalog::new(), events)
                .with_tenant_filter(arg_to_list(tenants.as_deref()))
                .with_dependency_resolution(deps);

            let plan = engine.plan(&change_sets);
            if go {
                // The warehouse client is an integration point, not part of
                // this binary; see sqlship::CatalogClient.
                bail!(
                    "this build carries no warehouse driver; \
                     wire a CatalogClient through DeploymentEngine::execute, \
                     or run without --go to preview"
                );
            }

            let report = engine.execute(&plan, true);
            for line in &report.planned {
                println!("{line}");
            }

            if deps {
                print_dependency_trees(&plan, &config)?;
            }

            println!("Dry run only; no changes were made.");
            Ok(())
        }
    }
}

/// Exactly one change source must be selected.
fn change_source(
    sha: Option<String>,
    manifest: Option<PathBuf>,
    working_tree: bool,
    repo: &PathBuf,
) -> Result<ChangeSource> {
    let selected =
        usize::from(sha.is_some()) + usize::from(manifest.is_some()) + usize::from(working_tree);
    if selected != 1 {
        bail!("exactly one of --sha, --manifest, or --working-tree is required");
    }

    let git = GitCli::new(repo);
    Ok(if let Some(sha) = sha {
        ChangeSource::Commit(git.commit_stats(&sha)?)
    } else if let Some(path) = manifest {
        ChangeSource::Manifest(path)
    } else {
        ChangeSource::WorkingTree(git.working_tree_diffs()?)
    })
}

fn tenant_directory(
    config: &Config,
    ignore: Option<&str>,
) -> Result<Arc<dyn TenantDirectory>> {
    Ok(match &config.registry {
        Some(path) => Arc::new(JsonTenantDirectory::load(
            path,
            &LocalFs,
            &arg_to_list(ignore),
        )?),
        None => Arc::new(StaticTenantDirectory::new(Vec::<String>::new())),
    })
}

fn arg_to_list(arg: Option<&str>) -> Vec<String> {
    arg.map(|raw| {
        raw.split(',')
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

fn print_dependency_trees(
    plan: &sqlship::DeploymentPlan,
    config: &Config,
) -> Result<()> {
    let store = DefinitionStore::new(LocalFs, config.source_root.clone(), config.naming.clone());
    let resolver = DependencyResolver::new(&store);
    for tenant in &plan.tenants {
        for id in &tenant.changes.modified {
            match resolver.dependencies_of(id) {
                Ok(tree) => {
                    print!("{}", tree.render());
                    for fault in &tree.faults {
                        eprintln!("warning: {fault}");
                    }
                }
                Err(e) => eprintln!("warning: {e}"),
            }
        }
    }
    Ok(())
}
