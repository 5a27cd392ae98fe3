//! Defines resync's CLI through clap types.

mod changes;
mod completions;
mod probe;
mod update;

use std::{
    borrow::Cow,
    collections::BTreeSet,
    env,
    io::{self, Write},
    path::{Path, PathBuf},
    process::Command,
    str::FromStr,
    sync::Arc,
};

use anyhow::{bail, Context};
use clap::Parser;
use serde::de::DeserializeOwned;
use statefs::FileStateCache;
use termcolor::{BufferWriter, Color, ColorSpec, WriteColor};
use thiserror::Error;

use crate::{config::STATE_DIR_NAME, error::InputSource, Config, ReconcileError, Reconciler};

pub use self::changes::ChangesCommand;
pub use self::completions::CompletionsCommand;
pub use self::probe::ProbeCommand;
pub use self::update::UpdateCommand;

/// Command line options that resync accepts, defined using the clap crate.
#[derive(Debug, Parser)]
#[clap(name = "resync", version, about)]
pub struct Options {
    #[clap(flatten)]
    pub global: GlobalOptions,

    /// Subcommand to run in this invocation.
    #[clap(subcommand)]
    pub subcommand: Subcommand,
}

impl Options {
    pub fn run(self) -> anyhow::Result<()> {
        match self.subcommand {
            Subcommand::Changes(subcommand) => subcommand.run(self.global),
            Subcommand::Update(subcommand) => subcommand.run(self.global),
            Subcommand::Probe(subcommand) => subcommand.run(self.global),
            Subcommand::Completions(subcommand) => subcommand.run(),
        }
    }
}

#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Directory that relative paths are resolved against. Defaults to the
    /// current directory.
    #[clap(long, global(true))]
    pub root: Option<PathBuf>,

    /// Sets verbosity level. Can be specified multiple times.
    #[clap(long("verbose"), short, global(true), action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Set color behavior. Valid values are auto, always, and never.
    #[clap(long("color"), global(true), default_value("auto"))]
    pub color: ColorChoice,
}

impl GlobalOptions {
    pub fn root_dir(&self) -> PathBuf {
        match &self.root {
            Some(root) => resolve_path(root).into_owned(),
            None => env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ColorChoice {
    Auto,
    Always,
    Never,
}

impl FromStr for ColorChoice {
    type Err = ColorChoiceParseError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        match source {
            "auto" => Ok(ColorChoice::Auto),
            "always" => Ok(ColorChoice::Always),
            "never" => Ok(ColorChoice::Never),
            _ => Err(ColorChoiceParseError {
                attempted: source.to_owned(),
            }),
        }
    }
}

impl From<ColorChoice> for termcolor::ColorChoice {
    fn from(value: ColorChoice) -> Self {
        match value {
            ColorChoice::Auto => termcolor::ColorChoice::Auto,
            ColorChoice::Always => termcolor::ColorChoice::Always,
            ColorChoice::Never => termcolor::ColorChoice::Never,
        }
    }
}

#[derive(Debug, Error)]
#[error("Invalid color choice '{attempted}'. Valid values are: auto, always, never")]
pub struct ColorChoiceParseError {
    attempted: String,
}

#[derive(Debug, Parser)]
pub enum Subcommand {
    /// Reconcile a JSON list of change records.
    Changes(ChangesCommand),
    /// Reconcile a JSON grouped update result.
    Update(UpdateCommand),
    /// Refresh one freshly created path and print its state.
    Probe(ProbeCommand),
    Completions(CompletionsCommand),
}

impl Subcommand {
    pub fn command_name(&self) -> &'static str {
        match self {
            Subcommand::Changes(_) => "changes",
            Subcommand::Update(_) => "update",
            Subcommand::Probe(_) => "probe",
            Subcommand::Completions(_) => "completions",
        }
    }

    /// Whether this invocation touches a working root worth logging into.
    pub fn uses_root(&self) -> bool {
        !matches!(self, Subcommand::Completions(_))
    }
}

pub fn resolve_path(path: &Path) -> Cow<'_, Path> {
    if path.is_absolute() {
        Cow::Borrowed(path)
    } else {
        Cow::Owned(
            env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(path),
        )
    }
}

/// Reads and deserializes a JSON input file. Relative paths are taken
/// relative to `root`.
fn read_input<T: DeserializeOwned>(root: &Path, input: &Path) -> Result<T, ReconcileError> {
    let path = root.join(input);
    let input_error = |source: InputSource| ReconcileError::Input {
        path: path.clone(),
        source,
    };

    let contents = fs_err::read(&path).map_err(|err| input_error(err.into()))?;
    serde_json::from_slice(&contents).map_err(|err| input_error(err.into()))
}

/// Builds a reconciler over a cache primed with everything under `root`,
/// so subtree refreshes have entries to invalidate.
fn build_reconciler(root: &Path) -> anyhow::Result<Reconciler> {
    let config = Config::load(root)?;
    let cache = Arc::new(FileStateCache::new_default());

    let state_dir = root.join(STATE_DIR_NAME);
    let cached = cache
        .scan(root, |path| path != state_dir)
        .map_err(|source| ReconcileError::refresh(root, source))?;
    log::debug!("Cached {} paths under {}", cached, root.display());

    Ok(Reconciler::new(cache)?.with_progress(config.progress_sink()))
}

/// Runs the command given after `--` from `root`. Does nothing when no
/// command was given.
fn run_wrapped(root: &Path, command: &[String]) -> anyhow::Result<()> {
    let Some((program, args)) = command.split_first() else {
        return Ok(());
    };

    log::info!("Running {}", command.join(" "));
    let status = Command::new(program)
        .args(args)
        .current_dir(root)
        .status()
        .with_context(|| format!("Failed to start {program}"))?;

    if !status.success() {
        bail!("{program} failed with {status}");
    }
    Ok(())
}

/// Every path currently in `cache`.
fn cached_paths(cache: &FileStateCache) -> BTreeSet<PathBuf> {
    cache.read().paths().map(Path::to_path_buf).collect()
}

/// Prints each refreshed path, green if it exists after the pass and red if
/// it is gone. Paths from `cached_before` that the pass dropped without
/// naming them are printed last as removed.
fn list_paths<'a>(
    paths: impl IntoIterator<Item = &'a Path>,
    cached_before: &BTreeSet<PathBuf>,
    cache: &FileStateCache,
    color: ColorChoice,
    root: &Path,
) -> io::Result<()> {
    let no_color = ColorSpec::new();
    let mut present_color = ColorSpec::new();
    present_color.set_fg(Some(Color::Green));
    let mut missing_color = ColorSpec::new();
    missing_color.set_fg(Some(Color::Red));

    let writer = BufferWriter::stdout(color.into());
    let mut buffer = writer.buffer();
    let mut listed = BTreeSet::new();

    for path in paths {
        listed.insert(path);
        if cache.get(path).is_some() {
            buffer.set_color(&present_color)?;
            writeln!(&mut buffer, "Present {}", relative(path, root).display())?;
        } else {
            buffer.set_color(&missing_color)?;
            writeln!(&mut buffer, "Missing {}", relative(path, root).display())?;
        }
    }

    let cached_after = cache.read();
    for path in cached_before {
        if !listed.contains(path.as_path()) && !cached_after.contains(path) {
            buffer.set_color(&missing_color)?;
            writeln!(&mut buffer, "Removed {}", relative(path, root).display())?;
        }
    }
    drop(cached_after);
    buffer.set_color(&no_color)?;

    writer.print(&buffer)
}

fn relative<'a>(path: &'a Path, root: &Path) -> &'a Path {
    path.strip_prefix(root).unwrap_or(path)
}
