use crate::config;
use crate::core::{Command, PlaylogCore};
use anyhow::Result;
use std::io::{self, Write};
use std::path::PathBuf;
use time::OffsetDateTime;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppStartupOptions {
    pub music_folder: Option<PathBuf>,
    pub fallback_duration_seconds: Option<u32>,
    pub command: Command,
}

/// Loads state, runs one command against it, and saves when anything changed.
pub fn run_with_startup(options: AppStartupOptions) -> Result<()> {
    let state = config::load_state()?;
    let mut core = PlaylogCore::from_persisted(state);
    if let Some(folder) = options.music_folder {
        core.set_music_folder(folder);
    }
    if let Some(seconds) = options.fallback_duration_seconds {
        core.set_fallback_duration(seconds);
    }

    let now = local_now();
    debug!(command = ?options.command, %now, "running command");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    core.execute(&options.command, now, &mut out)?;
    out.flush()?;

    if core.dirty {
        config::save_state(&core.persisted_state())?;
    }
    Ok(())
}

pub fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}
