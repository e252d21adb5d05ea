use std::{fs::File, io, path::Path, sync::Mutex};

use tracing_subscriber::EnvFilter;

/// Where the terminal UI modes write their logs.
pub const LOG_FILE: &str = "snakedqn.log";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn init_stdout_logging() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .try_init()
        .map_err(io::Error::other)
}

/// The alternate screen owns stdout, so the UI modes log to a file.
pub fn init_file_logging(path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init()
        .map_err(io::Error::other)
}
