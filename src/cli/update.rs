use std::path::PathBuf;

use clap::Parser;

use crate::UpdatedFiles;

use super::{build_reconciler, cached_paths, list_paths, read_input, run_wrapped, GlobalOptions};

/// Reconciles the file-state cache after an update or checkout.
///
/// The input is a JSON grouped update result. Files removed from the
/// repository are handled before everything else. As with `changes`, the
/// working root is cached first and a command given after `--` runs before
/// the input is read.
#[derive(Debug, Parser)]
pub struct UpdateCommand {
    /// Path to the JSON file holding the grouped update result.
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

impl UpdateCommand {
    pub fn run(self, global: GlobalOptions) -> anyhow::Result<()> {
        let root = global.root_dir();

        let reconciler = build_reconciler(&root)?;
        run_wrapped(&root, &self.command)?;

        let mut updated: UpdatedFiles = read_input(&root, &self.input)?;
        updated.resolve_against(&root);

        if updated.is_empty() {
            log::info!("Update result names no files");
        }

        let cached_before = cached_paths(reconciler.cache());
        let report = reconciler.update_all_changed(&updated)?;

        log::info!("Reconciled {} of {} files", report.processed, report.units);

        if self.list {
            list_paths(
                updated
                    .iter_deleted_on_server_first()
                    .map(|(_, path)| path),
                &cached_before,
                reconciler.cache(),
                global.color,
                &root,
            )?;
        }

        Ok(())
    }
}
