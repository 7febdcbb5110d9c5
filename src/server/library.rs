// ABOUTME: Track library on disk
// ABOUTME: Metadata read/write and enumeration of ingested per-channel artifacts

use crate::error::Error;
use crate::protocol::messages::{ChannelRole, TrackEntry};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Per-channel artifact URLs, served under the library prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackFiles {
    /// Left mono artifact
    pub left: String,
    /// Right mono artifact
    pub right: String,
    /// Full-mix artifact (reserved; not produced by v1 ingestion)
    pub stereo: String,
}

impl TrackFiles {
    /// Build the canonical artifact URLs for a track id.
    pub fn for_track(id: &str) -> Self {
        Self {
            left: format!("/audio/{id}/left.mp3"),
            right: format!("/audio/{id}/right.mp3"),
            stereo: format!("/audio/{id}/stereo.mp3"),
        }
    }

    /// The artifact URL matching a channel role.
    pub fn for_channel(&self, channel: ChannelRole) -> &str {
        match channel {
            ChannelRole::Left => &self.left,
            ChannelRole::Right => &self.right,
            ChannelRole::Stereo => &self.stereo,
        }
    }
}

/// A fully ingested audio source with per-channel artifacts.
///
/// Immutable once its metadata file has been written; tracks are append-only
/// and never overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Opaque 10-character token, unique across the library
    pub id: String,
    /// Human-readable title from the source probe
    pub title: String,
    /// Duration in seconds from the source probe
    pub duration: f64,
    /// Per-channel artifact URLs
    pub files: TrackFiles,
    /// The URL the track was ingested from
    pub original_url: String,
    /// Creation time in milliseconds since the Unix epoch
    pub created_at: f64,
}

impl Track {
    /// Summary entry for `track_list` broadcasts.
    pub fn entry(&self) -> TrackEntry {
        TrackEntry {
            id: self.id.clone(),
            title: self.title.clone(),
            duration: self.duration,
        }
    }
}

/// Generate a fresh 10-character alphanumeric track id.
pub fn new_track_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect()
}

/// Directory holding a track's artifacts.
pub fn track_dir(root: &Path, id: &str) -> PathBuf {
    root.join(id)
}

/// Write a track's metadata file atomically (temp file then rename), so a
/// concurrent library scan never observes a partial document.
pub fn write_metadata(root: &Path, track: &Track) -> crate::Result<()> {
    let dir = track_dir(root, &track.id);
    let json = serde_json::to_string_pretty(track)
        .map_err(|e| Error::Persist(e.to_string()))?;

    let tmp = dir.join("metadata.json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, dir.join("metadata.json"))?;
    Ok(())
}

/// Read one track's metadata by id.
pub fn read_metadata(root: &Path, id: &str) -> crate::Result<Track> {
    let path = track_dir(root, id).join("metadata.json");
    let data = fs::read_to_string(&path).map_err(|_| Error::TrackNotFound(id.to_string()))?;
    serde_json::from_str(&data).map_err(|_| Error::TrackNotFound(id.to_string()))
}

/// Enumerate the library, newest first.
///
/// Subdirectories without a parseable metadata file are partial or corrupted
/// ingestions and are skipped.
pub fn enumerate(root: &Path) -> Vec<Track> {
    let mut tracks = Vec::new();

    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(_) => return tracks,
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let meta = path.join("metadata.json");
        let Ok(data) = fs::read_to_string(&meta) else {
            continue;
        };
        match serde_json::from_str::<Track>(&data) {
            Ok(track) => tracks.push(track),
            Err(e) => {
                log::debug!("Skipping {} during library scan: {}", meta.display(), e);
            }
        }
    }

    tracks.sort_by(|a, b| {
        b.created_at
            .partial_cmp(&a.created_at)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    tracks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_track(id: &str, created_at: f64) -> Track {
        Track {
            id: id.to_string(),
            title: format!("Track {id}"),
            duration: 180.0,
            files: TrackFiles::for_track(id),
            original_url: "https://youtu.be/abc".to_string(),
            created_at,
        }
    }

    #[test]
    fn test_track_id_shape() {
        let id = new_track_id();
        assert_eq!(id.len(), 10);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_files_for_channel() {
        let files = TrackFiles::for_track("abc123defg");
        assert_eq!(files.for_channel(ChannelRole::Left), "/audio/abc123defg/left.mp3");
        assert_eq!(files.for_channel(ChannelRole::Right), "/audio/abc123defg/right.mp3");
        assert_eq!(files.for_channel(ChannelRole::Stereo), "/audio/abc123defg/stereo.mp3");
    }

    #[test]
    fn test_metadata_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let track = make_track("aaaaaaaaaa", 1000.0);

        fs::create_dir_all(track_dir(dir.path(), &track.id)).unwrap();
        write_metadata(dir.path(), &track).unwrap();

        let read = read_metadata(dir.path(), "aaaaaaaaaa").unwrap();
        assert_eq!(read, track);
    }

    #[test]
    fn test_metadata_uses_camel_case() {
        let track = make_track("aaaaaaaaaa", 1000.0);
        let json = serde_json::to_value(&track).unwrap();
        assert!(json.get("originalUrl").is_some());
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn test_read_unknown_track() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_metadata(dir.path(), "zzzzzzzzzz"),
            Err(Error::TrackNotFound(_))
        ));
    }

    #[test]
    fn test_enumerate_skips_partial_and_sorts_newest_first() {
        let dir = tempfile::tempdir().unwrap();

        for (id, created) in [("aaaaaaaaaa", 1000.0), ("bbbbbbbbbb", 2000.0)] {
            let track = make_track(id, created);
            fs::create_dir_all(track_dir(dir.path(), id)).unwrap();
            write_metadata(dir.path(), &track).unwrap();
        }

        // Partial ingestion: directory without metadata
        fs::create_dir_all(track_dir(dir.path(), "cccccccccc")).unwrap();
        // Corrupted metadata
        fs::create_dir_all(track_dir(dir.path(), "dddddddddd")).unwrap();
        fs::write(
            track_dir(dir.path(), "dddddddddd").join("metadata.json"),
            "{broken",
        )
        .unwrap();

        let tracks = enumerate(dir.path());
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].id, "bbbbbbbbbb");
        assert_eq!(tracks[1].id, "aaaaaaaaaa");
    }
}
