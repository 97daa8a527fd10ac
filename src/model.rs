use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::PathBuf;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub const DEFAULT_MUSIC_FOLDER: &str = "music";
pub const ESTIMATED_SONG_LENGTH_SECONDS: u32 = 180;

/// The instant a play was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlayEvent(OffsetDateTime);

impl PlayEvent {
    pub fn at(self) -> OffsetDateTime {
        self.0
    }
}

impl From<OffsetDateTime> for PlayEvent {
    fn from(value: OffsetDateTime) -> Self {
        Self(value)
    }
}

impl Serialize for PlayEvent {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let text = self
            .0
            .format(&Rfc3339)
            .map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&text)
    }
}

impl<'de> Deserialize<'de> for PlayEvent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        OffsetDateTime::parse(value.trim(), &Rfc3339)
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}

/// Everything the tracker owns, in the shape the persistence layer stores.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct TrackerSnapshot {
    #[serde(default)]
    pub play_log: BTreeMap<String, Vec<PlayEvent>>,
    #[serde(default)]
    pub favorites: Vec<String>,
    #[serde(default)]
    pub total_listen_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Track {
    pub id: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistedState {
    #[serde(default = "default_music_folder")]
    pub music_folder: PathBuf,
    #[serde(default = "default_fallback_duration_seconds")]
    pub fallback_duration_seconds: u32,
    #[serde(default)]
    pub tracker: TrackerSnapshot,
}

fn default_music_folder() -> PathBuf {
    PathBuf::from(DEFAULT_MUSIC_FOLDER)
}

fn default_fallback_duration_seconds() -> u32 {
    ESTIMATED_SONG_LENGTH_SECONDS
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            music_folder: default_music_folder(),
            fallback_duration_seconds: default_fallback_duration_seconds(),
            tracker: TrackerSnapshot::default(),
        }
    }
}
