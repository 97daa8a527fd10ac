use crate::library::Library;
use crate::model::PersistedState;
use crate::tracker::{FAVORITE_THRESHOLD, PlayLogTracker, format_duration};
use anyhow::{Context, Result};
use std::io::Write;
use std::path::PathBuf;
use time::OffsetDateTime;
use time::macros::format_description;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Play(String),
    Stats,
    Log,
    AddFavorite(String),
    RemoveFavorite(String),
    Reset,
}

#[derive(Debug)]
pub struct PlaylogCore {
    pub music_folder: PathBuf,
    pub fallback_duration_seconds: u32,
    pub tracker: PlayLogTracker,
    pub dirty: bool,
}

impl PlaylogCore {
    pub fn from_persisted(state: PersistedState) -> Self {
        Self {
            music_folder: state.music_folder,
            fallback_duration_seconds: state.fallback_duration_seconds,
            tracker: PlayLogTracker::from_snapshot(state.tracker),
            dirty: false,
        }
    }

    pub fn persisted_state(&self) -> PersistedState {
        PersistedState {
            music_folder: self.music_folder.clone(),
            fallback_duration_seconds: self.fallback_duration_seconds,
            tracker: self.tracker.snapshot(),
        }
    }

    pub fn set_music_folder(&mut self, folder: PathBuf) {
        if self.music_folder != folder {
            self.music_folder = folder;
            self.dirty = true;
        }
    }

    pub fn set_fallback_duration(&mut self, seconds: u32) {
        if self.fallback_duration_seconds != seconds {
            self.fallback_duration_seconds = seconds;
            self.dirty = true;
        }
    }

    pub fn execute(
        &mut self,
        command: &Command,
        now: OffsetDateTime,
        out: &mut impl Write,
    ) -> Result<()> {
        match command {
            Command::List => self.list(now, out),
            Command::Play(track_id) => self.play(track_id, now, out),
            Command::Stats => self.stats(out),
            Command::Log => self.log(now, out),
            Command::AddFavorite(track_id) => {
                if self.tracker.add_favorite(track_id)? {
                    self.dirty = true;
                    writeln!(out, "Added {track_id} to favorites")?;
                } else {
                    writeln!(out, "{track_id} is already a favorite")?;
                }
                Ok(())
            }
            Command::RemoveFavorite(track_id) => {
                if self.tracker.remove_favorite(track_id) {
                    self.dirty = true;
                    writeln!(out, "Removed {track_id} from favorites")?;
                } else {
                    writeln!(out, "{track_id} is not a favorite")?;
                }
                Ok(())
            }
            Command::Reset => {
                self.tracker.reset();
                self.dirty = true;
                writeln!(
                    out,
                    "Cleared play history, favorites and total listening time"
                )?;
                Ok(())
            }
        }
    }

    fn open_library(&self) -> Result<Library> {
        Library::open(&self.music_folder, self.fallback_duration_seconds)
    }

    fn list(&self, now: OffsetDateTime, out: &mut impl Write) -> Result<()> {
        let mut library = self.open_library()?;
        let tracks = library.tracks().to_vec();
        if tracks.is_empty() {
            writeln!(
                out,
                "No audio files found in {}",
                library.root().display()
            )?;
            return Ok(());
        }

        for track in &tracks {
            let duration = library.duration_seconds(track);
            let marker = if self.tracker.is_favorite(&track.id) {
                '*'
            } else {
                ' '
            };
            writeln!(
                out,
                "{marker} {}  {}  ({} in 24h)",
                track.id,
                format_duration(u64::from(duration)),
                self.tracker.recent_play_count(&track.id, now)
            )?;
        }
        Ok(())
    }

    fn play(&mut self, track_id: &str, now: OffsetDateTime, out: &mut impl Write) -> Result<()> {
        let mut library = self.open_library()?;
        let Some(track) = library.find(track_id).cloned() else {
            anyhow::bail!(
                "{track_id} is not in {}",
                self.music_folder.display()
            );
        };

        let duration = library.duration_seconds(&track);
        let outcome = self
            .tracker
            .record_play(&track.id, now, i64::from(duration))?;
        self.dirty = true;

        writeln!(out, "Recorded play for {} (+{duration} sec)", track.id)?;
        writeln!(out, "{} play(s) in the last 24 hours", outcome.recent_plays)?;
        if outcome.promoted {
            writeln!(
                out,
                "Added {} to favorites ({FAVORITE_THRESHOLD}+ plays within 24 hours)",
                track.id
            )?;
        }
        Ok(())
    }

    fn stats(&self, out: &mut impl Write) -> Result<()> {
        writeln!(
            out,
            "Total listening time: {}",
            format_duration(self.tracker.total_listen_seconds())
        )?;

        let favorites = self.tracker.favorites();
        if favorites.is_empty() {
            writeln!(
                out,
                "No favorites yet. Play any song {FAVORITE_THRESHOLD}+ times within 24 hours to add it automatically."
            )?;
            return Ok(());
        }

        writeln!(out, "Favorites:")?;
        for track_id in favorites {
            writeln!(out, "- {track_id}")?;
        }
        Ok(())
    }

    fn log(&mut self, now: OffsetDateTime, out: &mut impl Write) -> Result<()> {
        if self.tracker.prune_expired(now) > 0 {
            self.dirty = true;
        }

        let rows = self.tracker.tracks();
        if rows.is_empty() {
            writeln!(out, "No plays in the last 24 hours")?;
            return Ok(());
        }

        let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
        for (track_id, events) in rows {
            writeln!(out, "{track_id} ({})", events.len())?;
            for event in events {
                let stamp = event
                    .at()
                    .format(format)
                    .context("failed to format play timestamp")?;
                writeln!(out, "  {stamp}")?;
            }
        }
        Ok(())
    }
}
