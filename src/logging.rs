//! Tracing subscriber for the binary: console plus `info.log` in the run folder.

use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

pub const LOG_FILENAME: &str = "info.log";

/// `RUST_LOG` if set, otherwise `info`.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber. Creates `output_folder` if needed.
pub fn init(output_folder: &Path) -> io::Result<()> {
    fs::create_dir_all(output_folder)?;
    let file = File::create(output_folder.join(LOG_FILENAME))?;

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(false))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .map_err(io::Error::other)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_creates_log_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let run = dir.path().join("runs/default/2026-01-01_00-00-00");

        // Another test may already own the global subscriber.
        let _ = init(&run);
        assert!(run.join(LOG_FILENAME).is_file());
    }
}
