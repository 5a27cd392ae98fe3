use std::{io, path::PathBuf};

use clap::Parser;
use statefs::FileStateCache;

use crate::refresh::find_created_file;

use super::GlobalOptions;

/// Refreshes a single path that was just created and prints its state as
/// JSON, or `null` if nothing exists there.
#[derive(Debug, Parser)]
pub struct ProbeCommand {
    /// Path to probe, relative to the root.
    pub path: PathBuf,
}

impl ProbeCommand {
    pub fn run(self, global: GlobalOptions) -> anyhow::Result<()> {
        let path = global.root_dir().join(&self.path);
        let cache = FileStateCache::new_default();

        let state = find_created_file(&cache, &path)?;
        if state.is_none() {
            log::warn!("Nothing exists at {}", path.display());
        }

        let mut stdout = io::stdout().lock();
        serde_json::to_writer_pretty(&mut stdout, &state)?;
        io::Write::write_all(&mut stdout, b"\n")?;

        Ok(())
    }
}
