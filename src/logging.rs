use std::{
    io::{self, IsTerminal, Write},
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    fmt::{self, time::UtcTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::{
    cli::ColorChoice,
    config::{FileLogLevel, CONFIG_FILE_NAME, STATE_DIR_NAME},
};

const SECONDS_PER_DAY: u64 = 86400;

/// Compressed logs older than this many days are deleted.
const KEEP_COMPRESSED_DAYS: u64 = 7;

pub struct LogGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

pub fn init_logging(
    verbosity: u8,
    color: ColorChoice,
    root: Option<&Path>,
    file_log_level: Option<LevelFilter>,
    command_name: &str,
) -> LogGuard {
    if let Err(err) = tracing_log::LogTracer::init() {
        eprintln!("Warning: could not forward log records to tracing: {err}");
    }

    let console_filter = match verbosity {
        0 => "info",
        1 => "info,libresync=debug,statefs=debug",
        2 => "info,libresync=trace,statefs=trace",
        _ => "trace",
    };

    let console_env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(console_filter));

    let use_ansi = match color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => io::stderr().is_terminal(),
    };

    let console_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(use_ansi)
        .without_time()
        .with_target(false)
        .with_thread_names(false)
        .with_level(true)
        .with_filter(console_env_filter);

    let mut file_guard = None;

    let file_layer = if let (Some(root), Some(level)) = (root, file_log_level) {
        let log_dir = root.join(STATE_DIR_NAME).join("logs");

        let appender = fs_err::create_dir_all(&log_dir).and_then(|()| {
            compress_old_logs(&log_dir, command_name);

            tracing_appender::rolling::Builder::new()
                .rotation(tracing_appender::rolling::Rotation::DAILY)
                .filename_prefix(command_name)
                .filename_suffix("log")
                .build(&log_dir)
                .map_err(io::Error::other)
        });

        match appender {
            Ok(appender) => {
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);
                file_guard = Some(guard);

                let layer = fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_timer(UtcTime::rfc_3339())
                    .with_target(true)
                    .with_thread_names(true)
                    .with_level(true)
                    .with_filter(EnvFilter::new(level.to_string()));

                Some(layer)
            }
            Err(err) => {
                eprintln!(
                    "Warning: could not set up file logging in {}: {err}",
                    log_dir.display()
                );
                None
            }
        }
    } else {
        None
    };

    if let Err(err) = tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
    {
        eprintln!("Warning: could not install log subscriber: {err}");
    }

    LogGuard {
        _file_guard: file_guard,
    }
}

fn days_since_epoch(time: SystemTime) -> Option<u64> {
    time.duration_since(UNIX_EPOCH)
        .ok()
        .map(|since| since.as_secs() / SECONDS_PER_DAY)
}

/// Gzips this command's logs from previous days and deletes compressed logs
/// that have aged out. Failures are ignored; this is housekeeping.
fn compress_old_logs(log_dir: &Path, command_name: &str) {
    let today = days_since_epoch(SystemTime::now()).unwrap_or_default();

    let Ok(entries) = fs_err::read_dir(log_dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let modified_day = entry
            .metadata()
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(days_since_epoch);

        if file_name.ends_with(".log.gz") {
            if let Some(day) = modified_day {
                if today.saturating_sub(day) > KEEP_COMPRESSED_DAYS {
                    let _ = fs_err::remove_file(&path);
                }
            }
            continue;
        }

        if !file_name.ends_with(".log") || !file_name.starts_with(command_name) {
            continue;
        }

        if modified_day.unwrap_or(today) >= today {
            continue;
        }

        let gz_path = path.with_extension("log.gz");
        let Ok(input) = fs_err::read(&path) else {
            continue;
        };
        let Ok(gz_file) = fs_err::File::create(&gz_path) else {
            continue;
        };

        let mut encoder = flate2::write::GzEncoder::new(gz_file, flate2::Compression::default());
        if encoder.write_all(&input).is_ok() && encoder.finish().is_ok() {
            let _ = fs_err::remove_file(&path);
        } else {
            let _ = fs_err::remove_file(&gz_path);
        }
    }
}

/// Lightweight pre-read of `resync.toml` for the `file_log_level` setting,
/// done before logging exists so a broken config can still be logged about.
///
/// Returns `None` when there is no config or the field is absent (caller
/// defaults to trace) and `Some(None)` when file logging is turned off.
/// Unknown level names fall back to trace.
pub fn quick_read_file_log_level(root: &Path) -> Option<Option<LevelFilter>> {
    let contents = fs_err::read_to_string(root.join(CONFIG_FILE_NAME)).ok()?;
    let table: toml::Table = toml::from_str(&contents).ok()?;
    let level = table.get("file_log_level")?.as_str()?;

    Some(
        level
            .parse::<FileLogLevel>()
            .unwrap_or_default()
            .level_filter(),
    )
}
