//! Catalog records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::Platform;

/// Origin of a track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSource {
    pub url: String,
    pub platform: Platform,
}

/// Cover art carried inside the audio file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artwork {
    pub embedded: bool,
    pub mime_type: String,
}

impl Default for Artwork {
    fn default() -> Self {
        Self {
            embedded: true,
            mime_type: "image/jpeg".to_string(),
        }
    }
}

/// A finished, playable track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Seconds.
    pub duration: u64,
    /// kbps.
    pub bitrate: u64,
    pub format: String,
    pub source: TrackSource,
    #[serde(default)]
    pub artwork: Artwork,
    pub file_path: String,
    pub created_at: DateTime<Utc>,
}

impl Track {
    /// Case-insensitive substring match over title, artist and album.
    ///
    /// `needle` must already be lower-cased.
    pub fn matches(&self, needle: &str) -> bool {
        [&self.title, &self.artist, &self.album]
            .iter()
            .any(|field| field.to_lowercase().contains(needle))
    }
}
