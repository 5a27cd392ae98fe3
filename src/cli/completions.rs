use std::{io, path::PathBuf};

use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};

use super::Options;

/// Prints a shell completion script for resync.
#[derive(Debug, Parser)]
pub struct CompletionsCommand {
    /// Shell to generate completions for.
    #[clap(value_enum)]
    pub shell: Shell,

    /// Write the script to this file instead of stdout.
    #[clap(long, short = 'o')]
    pub output: Option<PathBuf>,
}

impl CompletionsCommand {
    pub fn run(self) -> anyhow::Result<()> {
        let mut cmd = Options::command();
        let bin_name = cmd.get_name().to_owned();

        match &self.output {
            Some(path) => {
                let mut file = fs_err::File::create(path)?;
                generate(self.shell, &mut cmd, bin_name, &mut file);
                log::info!("Wrote {} completions to {}", self.shell, path.display());
            }
            None => generate(self.shell, &mut cmd, bin_name, &mut io::stdout()),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_script_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("resync.bash");

        CompletionsCommand {
            shell: Shell::Bash,
            output: Some(output.clone()),
        }
        .run()
        .unwrap();

        let script = fs_err::read_to_string(&output).unwrap();
        assert!(script.contains("resync"));
    }
}
