//! Log subscriber setup.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingSection};

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level. File output goes through a
/// background writer; keep the returned guard alive until exit or buffered
/// lines are lost.
pub fn init(section: &LoggingSection) -> Result<Option<WorkerGuard>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&section.level)
            .with_context(|| format!("invalid log level `{}`", section.level))?,
    };

    let (writer, guard, ansi) = match section.location.as_str() {
        "" | "stderr" => (BoxMakeWriter::new(std::io::stderr), None, true),
        "stdout" => (BoxMakeWriter::new(std::io::stdout), None, true),
        path => {
            let (writer, guard) = file_writer(Path::new(path))?;
            (writer, Some(guard), false)
        }
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi);

    let installed = match section.format {
        LogFormat::Json => builder.json().with_target(true).try_init(),
        LogFormat::Text => builder
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .try_init(),
    };
    installed.map_err(|e| anyhow!("installing log subscriber: {}", e))?;

    Ok(guard)
}

fn file_writer(path: &Path) -> Result<(BoxMakeWriter, WorkerGuard)> {
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("log location `{}` is not a file", path.display()))?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating log directory {}", dir.display()))?;

    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    Ok((BoxMakeWriter::new(writer), guard))
}

/// Whether debug events reach the subscriber.
pub fn debug_enabled() -> bool {
    tracing::level_filters::LevelFilter::current() >= tracing::level_filters::LevelFilter::DEBUG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_writer_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("nestlink.log");

        let (_writer, guard) = file_writer(&path).unwrap();
        drop(guard);
        assert!(dir.path().join("logs").is_dir());
    }

    #[test]
    fn test_file_writer_rejects_directory_path() {
        assert!(file_writer(Path::new("/")).is_err());
    }
}
