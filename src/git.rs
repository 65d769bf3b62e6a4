//! git adapter
//!
//! Thin wrapper over the `git` binary producing the plain data the change
//! extractors consume: per-file commit statistics and working-tree diff
//! entries. The extractors never talk to git themselves.

use std::path::PathBuf;
use std::process::Command;

use crate::changeset::{CommitStats, DiffEntry};
use crate::error::{ShipError, ShipResult};

/// Invokes the system `git` against one repository
#[derive(Debug, Clone)]
pub struct GitCli {
    repo_root: PathBuf,
}

impl GitCli {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    fn run(&self, args: &[&str]) -> ShipResult<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_root)
            .output()
            .map_err(|e| ShipError::Git(format!("failed to spawn git: {e}")))?;
        if !output.status.success() {
            return Err(ShipError::Git(format!(
                "git {} failed: {}",
                args.first().unwrap_or(&""),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Per-file insertion/deletion statistics of one commit.
    pub fn commit_stats(&self, sha: &str) -> ShipResult<CommitStats> {
        let raw = self.run(&["show", "--numstat", "--format=", sha])?;
        Ok(parse_numstat(&raw))
    }

    /// Uncommitted changes against HEAD.
    pub fn working_tree_diffs(&self) -> ShipResult<Vec<DiffEntry>> {
        let raw = self.run(&["status", "--porcelain"])?;
        Ok(parse_porcelain(&raw))
    }
}

fn parse_numstat(raw: &str) -> CommitStats {
    let mut stats = CommitStats::default();
    for line in raw.lines() {
        let mut fields = line.split('\t');
        let (Some(insertions), Some(deletions), Some(path)) =
            (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        // Binary files report "-" counts and carry no deployable text.
        let (Ok(insertions), Ok(deletions)) =
            (insertions.parse::<u32>(), deletions.parse::<u32>())
        else {
            continue;
        };
        stats.record(path, insertions, deletions);
    }
    stats
}

fn parse_porcelain(raw: &str) -> Vec<DiffEntry> {
    let mut entries = Vec::new();
    for line in raw.lines() {
        if line.len() < 4 {
            continue;
        }
        let status = &line[..2];
        let rest = line[3..].trim();
        let entry = if status.contains('R') {
            match rest.split_once(" -> ") {
                Some((from, to)) => DiffEntry::Renamed {
                    from: from.to_string(),
                    to: to.to_string(),
                },
                None => continue,
            }
        } else if status.contains('D') {
            DiffEntry::Deleted {
                path: rest.to_string(),
            }
        } else if status.contains('A') || status == "??" {
            DiffEntry::Added {
                path: rest.to_string(),
            }
        } else if status.contains('M') {
            DiffEntry::Modified {
                path: rest.to_string(),
            }
        } else {
            continue;
        };
        entries.push(entry);
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numstat_parses_counts_and_skips_binary() {
        let raw = "3\t1\tacme/ext/view/vw_a.sql\n\
                   -\t-\tassets/logo.png\n\
                   0\t12\tacme/ext/view/vw_gone.sql\n";
        let stats = parse_numstat(raw);

        assert_eq!(stats.files.len(), 2);
        let gone = &stats.files["acme/ext/view/vw_gone.sql"];
        assert_eq!(gone.insertions, 0);
        assert_eq!(gone.deletions, 12);
        assert_eq!(gone.lines, 12);
    }

    #[test]
    fn porcelain_parses_every_change_type() {
        let raw = " M acme/ext/view/vw_a.sql\n\
                   A  acme/ext/view/vw_b.sql\n\
                   ?? acme/ext/view/vw_c.sql\n\
                   D  acme/ext/view/vw_d.sql\n\
                   R  acme/ext/view/vw_old.sql -> acme/ext/view/vw_new.sql\n";
        let entries = parse_porcelain(raw);

        assert_eq!(entries.len(), 5);
        assert!(matches!(&entries[0], DiffEntry::Modified { path } if path.ends_with("vw_a.sql")));
        assert!(matches!(&entries[1], DiffEntry::Added { .. }));
        assert!(matches!(&entries[2], DiffEntry::Added { .. }));
        assert!(matches!(&entries[3], DiffEntry::Deleted { .. }));
        assert!(
            matches!(&entries[4], DiffEntry::Renamed { from, to }
                if from.ends_with("vw_old.sql") && to.ends_with("vw_new.sql"))
        );
    }
}
