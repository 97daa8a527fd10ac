use crate::model::Track;
use anyhow::{Context, Result};
use lofty::file::AudioFile;
use lofty::probe::Probe;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "ogg", "m4a", "aac", "opus"];

/// The music folder's tracks plus a per-track duration cache.
#[derive(Debug)]
pub struct Library {
    root: PathBuf,
    tracks: Vec<Track>,
    fallback_duration_seconds: u32,
    durations: HashMap<String, u32>,
}

impl Library {
    pub fn open(root: &Path, fallback_duration_seconds: u32) -> Result<Self> {
        let tracks = scan_folder(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            tracks,
            fallback_duration_seconds,
            durations: HashMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn find(&self, track_id: &str) -> Option<&Track> {
        self.tracks.iter().find(|track| track.id == track_id)
    }

    /// Exact duration when the container reports one, else the fallback.
    pub fn duration_seconds(&mut self, track: &Track) -> u32 {
        if let Some(cached) = self.durations.get(&track.id) {
            return *cached;
        }
        let seconds = probe_duration_seconds(&track.path).unwrap_or_else(|| {
            warn!(
                track_id = %track.id,
                fallback = self.fallback_duration_seconds,
                "duration unavailable, using estimate"
            );
            self.fallback_duration_seconds
        });
        self.durations.insert(track.id.clone(), seconds);
        seconds
    }
}

pub fn scan_folder(root: &Path) -> Result<Vec<Track>> {
    if !root.is_dir() {
        anyhow::bail!("music folder {} does not exist", root.display());
    }

    let mut tracks = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
    {
        let path = entry.path();
        if !entry.file_type().is_file() || !is_audio(path) {
            continue;
        }
        let relative = path
            .strip_prefix(root)
            .with_context(|| format!("{} is outside {}", path.display(), root.display()))?;
        tracks.push(Track {
            id: track_id_for(relative),
            path: PathBuf::from(path),
        });
    }

    tracks.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(tracks)
}

pub fn probe_duration_seconds(path: &Path) -> Option<u32> {
    let tagged_file = Probe::open(path).and_then(|probe| probe.read()).ok()?;
    let seconds = tagged_file.properties().duration().as_secs();
    (seconds > 0).then(|| u32::try_from(seconds).unwrap_or(u32::MAX))
}

fn track_id_for(relative: &Path) -> String {
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn is_audio(path: &Path) -> bool {
    let ext = path.extension().and_then(OsStr::to_str).unwrap_or_default();
    AUDIO_EXTENSIONS
        .iter()
        .any(|supported| ext.eq_ignore_ascii_case(supported))
}
