use std::path::{Path, PathBuf};

use clap::Parser;

use crate::{classify, ChangeRecord};

use super::{build_reconciler, cached_paths, list_paths, read_input, run_wrapped, GlobalOptions};

/// Reconciles the file-state cache after a list of changes reported by a
/// version control client.
///
/// The input is a JSON array of change records. Records are processed in the
/// order given. The working root is cached before anything else happens, so
/// that a command given after `--` (usually the version control operation
/// itself) changes files the cache already knows about.
#[derive(Debug, Parser)]
pub struct ChangesCommand {
    /// Path to the JSON file holding the change records.
    pub input: PathBuf,

    /// If provided, every refreshed path is listed on stdout along with
    /// whether it exists after the pass.
    #[clap(long, short = 'l')]
    pub list: bool,

    /// Command to run after caching the working root and before reading the
    /// input.
    #[clap(last = true)]
    pub command: Vec<String>,
}

impl ChangesCommand {
    pub fn run(self, global: GlobalOptions) -> anyhow::Result<()> {
        let root = global.root_dir();

        let reconciler = build_reconciler(&root)?;
        run_wrapped(&root, &self.command)?;

        let mut changes: Vec<ChangeRecord> = read_input(&root, &self.input)?;
        for change in &mut changes {
            change.resolve_against(&root);
        }

        let cached_before = cached_paths(reconciler.cache());
        let report = reconciler.update_changes(&changes)?;

        log::info!(
            "Reconciled {} of {} changes",
            report.processed,
            report.units
        );

        if self.list {
            let paths = refreshed_paths(&changes);
            list_paths(
                paths.iter().map(PathBuf::as_path),
                &cached_before,
                reconciler.cache(),
                global.color,
                &root,
            )?;
        }

        Ok(())
    }
}

/// Every path a pass over `changes` refreshes directly, without repeats.
fn refreshed_paths(changes: &[ChangeRecord]) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = Vec::new();
    let mut push = |path: &Path| {
        if !paths.iter().any(|seen| seen == path) {
            paths.push(path.to_path_buf());
        }
    };

    for change in changes {
        let plan = classify(change);
        if let Some((path, _)) = &plan.before {
            push(path);
        }
        if let Some(path) = &plan.after {
            push(path);
        }
    }

    paths
}
