//! JSON-file track catalog.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::models::Track;
use crate::utils::fs;
use crate::{Error, Result};

/// Store of committed tracks.
#[async_trait]
pub trait TrackCatalog: Send + Sync {
    /// Insert `track` durably. A rejected write leaves the catalog unchanged.
    async fn add_track(&self, track: Track) -> Result<Track>;

    fn get_track(&self, id: &str) -> Option<Track>;

    fn list_tracks(&self) -> Vec<Track>;

    /// Remove a track, returning it if it existed.
    async fn delete_track(&self, id: &str) -> Option<Track>;

    /// Tracks whose title, artist or album contains `query`, ignoring case.
    fn search(&self, query: &str) -> Vec<Track> {
        let needle = query.to_lowercase();
        self.list_tracks()
            .into_iter()
            .filter(|track| track.matches(&needle))
            .collect()
    }
}

const LIBRARY_VERSION: u32 = 1;

fn default_version() -> u32 {
    LIBRARY_VERSION
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LibraryData {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default = "Utc::now")]
    updated_at: DateTime<Utc>,
    #[serde(default)]
    tracks: BTreeMap<String, Track>,
}

impl Default for LibraryData {
    fn default() -> Self {
        Self {
            version: LIBRARY_VERSION,
            updated_at: Utc::now(),
            tracks: BTreeMap::new(),
        }
    }
}

/// Catalog persisted as `{ version, updatedAt, tracks: { [id]: Track } }`.
pub struct LibraryManager {
    path: PathBuf,
    data: Mutex<LibraryData>,
    /// Held across a mutation and its write.
    write_lock: tokio::sync::Mutex<()>,
}

impl LibraryManager {
    /// Open the catalog at `path`. A missing or unreadable file yields an
    /// empty catalog.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<LibraryData>(&bytes) {
                Ok(data) => {
                    info!(tracks = data.tracks.len(), "Library loaded");
                    data
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Failed to parse library, starting empty");
                    LibraryData::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => LibraryData::default(),
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to read library, starting empty");
                LibraryData::default()
            }
        };

        Self {
            path,
            data: Mutex::new(data),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.data.lock().tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn save(&self) -> Result<()> {
        let json = {
            let mut data = self.data.lock();
            data.updated_at = Utc::now();
            serde_json::to_vec_pretty(&*data)?
        };
        fs::write_atomic(&self.path, &json).await
    }
}

#[async_trait]
impl TrackCatalog for LibraryManager {
    async fn add_track(&self, track: Track) -> Result<Track> {
        let _guard = self.write_lock.lock().await;
        let previous = self
            .data
            .lock()
            .tracks
            .insert(track.id.clone(), track.clone());

        if let Err(e) = self.save().await {
            let mut data = self.data.lock();
            match previous {
                Some(previous) => data.tracks.insert(track.id.clone(), previous),
                None => data.tracks.remove(&track.id),
            };
            return Err(Error::Commit(format!("could not store track {}: {}", track.id, e)));
        }

        info!(track_id = %track.id, title = %track.title, "Track added to library");
        Ok(track)
    }

    fn get_track(&self, id: &str) -> Option<Track> {
        self.data.lock().tracks.get(id).cloned()
    }

    fn list_tracks(&self) -> Vec<Track> {
        self.data.lock().tracks.values().cloned().collect()
    }

    async fn delete_track(&self, id: &str) -> Option<Track> {
        let _guard = self.write_lock.lock().await;
        let removed = self.data.lock().tracks.remove(id)?;

        if let Err(e) = self.save().await {
            error!(track_id = %id, error = %e, "Failed to persist library after delete");
        }
        info!(track_id = %id, "Track deleted from library");
        Some(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::models::{Artwork, TrackSource};
    use crate::pipeline::Platform;

    fn track(id: &str, title: &str, artist: &str, album: &str) -> Track {
        Track {
            id: id.to_string(),
            title: title.to_string(),
            artist: artist.to_string(),
            album: album.to_string(),
            duration: 200,
            bitrate: 256,
            format: "mp3".to_string(),
            source: TrackSource {
                url: "https://soundcloud.com/a/b".to_string(),
                platform: Platform::Soundcloud,
            },
            artwork: Artwork::default(),
            file_path: "/tmp/a.mp3".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_add_get_list_and_reload() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("state/library.json");
        let library = LibraryManager::load(&path).await;
        assert!(library.is_empty());

        library
            .add_track(track("track_1", "Song", "Artist", "Album"))
            .await
            .unwrap();
        assert_eq!(library.get_track("track_1").unwrap().title, "Song");
        assert_eq!(library.list_tracks().len(), 1);
        assert!(library.get_track("track_2").is_none());

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["version"], 1);
        assert_eq!(raw["tracks"]["track_1"]["artist"], "Artist");

        let reloaded = LibraryManager::load(&path).await;
        assert_eq!(reloaded.len(), 1);
    }

    #[tokio::test]
    async fn test_search() {
        let temp = tempfile::tempdir().unwrap();
        let library = LibraryManager::load(temp.path().join("library.json")).await;
        library
            .add_track(track("track_1", "Blue Monday", "New Order", "Power"))
            .await
            .unwrap();
        library
            .add_track(track("track_2", "Teardrop", "Massive Attack", "Mezzanine"))
            .await
            .unwrap();

        assert_eq!(library.search("ORDER").len(), 1);
        assert_eq!(library.search("mezz")[0].id, "track_2");
        assert_eq!(library.search("e").len(), 2);
        assert!(library.search("zzz").is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("library.json");
        let library = LibraryManager::load(&path).await;
        library
            .add_track(track("track_1", "Song", "Artist", "Album"))
            .await
            .unwrap();

        assert_eq!(library.delete_track("track_1").await.unwrap().id, "track_1");
        assert!(library.delete_track("track_1").await.is_none());
        assert!(LibraryManager::load(&path).await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_rolls_back_add() {
        let temp = tempfile::tempdir().unwrap();
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let library = LibraryManager::load(blocker.join("library.json")).await;
        let err = library
            .add_track(track("track_1", "Song", "Artist", "Album"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Commit(_)));
        assert!(library.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_loads_empty() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("library.json");
        std::fs::write(&path, b"[1, 2").unwrap();
        assert!(LibraryManager::load(&path).await.is_empty());
    }
}
