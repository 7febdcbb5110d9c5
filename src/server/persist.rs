// ABOUTME: Crash-safe persistence of session↔track bindings
// ABOUTME: Read-merge-write of a single JSON document, written temp-then-rename

use crate::error::Error;
use crate::server::library::Track;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// The durable part of a session: its identity and track binding.
///
/// Ephemeral fields (clients, playback state) are never written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    /// Session id
    pub id: String,
    /// Session creation time in milliseconds since the Unix epoch
    pub created_at: f64,
    /// The bound track
    pub audio_source: Track,
}

/// The on-disk document at the configured state path.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StateDocument {
    /// Track-bound sessions by id
    pub sessions: HashMap<String, PersistedSession>,
}

/// Load the persisted state. A missing file is an empty document; an
/// unreadable one is logged and treated as empty (the library itself is
/// untouched, so only bindings are lost).
pub fn load(path: &Path) -> StateDocument {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(_) => return StateDocument::default(),
    };

    match serde_json::from_str(&data) {
        Ok(doc) => doc,
        Err(e) => {
            log::warn!("Discarding unreadable state file {}: {}", path.display(), e);
            StateDocument::default()
        }
    }
}

/// Merge the given sessions into the on-disk document and write it back
/// atomically. Sessions present on disk but not in memory are preserved.
pub fn save_merge(path: &Path, entries: &[PersistedSession]) -> crate::Result<()> {
    let mut doc = load(path);
    for entry in entries {
        doc.sessions.insert(entry.id.clone(), entry.clone());
    }

    let json = serde_json::to_string_pretty(&doc).map_err(|e| Error::Persist(e.to_string()))?;

    let tmp = path.with_extension("json.tmp");
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::library::TrackFiles;

    fn persisted(id: &str, track_id: &str) -> PersistedSession {
        PersistedSession {
            id: id.to_string(),
            created_at: 1000.0,
            audio_source: Track {
                id: track_id.to_string(),
                title: "A Song".to_string(),
                duration: 200.0,
                files: TrackFiles::for_track(track_id),
                original_url: "https://youtu.be/xyz".to_string(),
                created_at: 900.0,
            },
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let doc = load(&dir.path().join("sessions.json"));
        assert!(doc.sessions.is_empty());
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");

        save_merge(&path, &[persisted("x", "aaaaaaaaaa")]).unwrap();

        let doc = load(&path);
        assert_eq!(doc.sessions.len(), 1);
        assert_eq!(doc.sessions["x"].audio_source.id, "aaaaaaaaaa");
    }

    #[test]
    fn test_merge_preserves_sessions_not_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");

        save_merge(&path, &[persisted("x", "aaaaaaaaaa")]).unwrap();
        // A later process that only knows about "y" must not drop "x".
        save_merge(&path, &[persisted("y", "bbbbbbbbbb")]).unwrap();

        let doc = load(&path);
        assert_eq!(doc.sessions.len(), 2);
        assert!(doc.sessions.contains_key("x"));
        assert!(doc.sessions.contains_key("y"));
    }

    #[test]
    fn test_corrupted_file_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        fs::write(&path, "{broken").unwrap();

        assert!(load(&path).sessions.is_empty());
        // And saving over it recovers.
        save_merge(&path, &[persisted("x", "aaaaaaaaaa")]).unwrap();
        assert_eq!(load(&path).sessions.len(), 1);
    }
}
