use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::Document;

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Case-insensitive text equality used for every name/artist/genre match.
pub fn same_text(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub dj_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub location: String,
    pub active: bool,
    #[serde(default)]
    pub qr_code_text: String,
    #[serde(default)]
    pub music_config: PlaylistConfig,
}

impl Event {
    pub fn playlist(&self) -> &[PlaylistEntry] {
        &self.music_config.music_playlist
    }

    pub fn is_dj(&self, caller: &str) -> bool {
        self.dj_id == caller
    }

    /// Case-insensitive lookup on (name, artist).
    pub fn find_track(&self, name: &str, artist: &str) -> Option<usize> {
        self.playlist().iter().position(|e| e.matches(name, artist))
    }

    pub fn find_track_by_id(&self, track_id: &str) -> Option<usize> {
        self.playlist().iter().position(|e| e.id == track_id)
    }

    /// Index of the entry holding the caller's vote, if any.
    pub fn voted_track(&self, caller: &str) -> Option<usize> {
        self.playlist().iter().position(|e| e.has_voter(caller))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistConfig {
    #[serde(default)]
    pub enable_user_recommendation: bool,
    #[serde(default)]
    pub music_playlist: Vec<PlaylistEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistEntry {
    pub id: String,
    pub name: String,
    pub artist: String,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub votes: u32,
    #[serde(default)]
    pub voter_ids: Vec<String>,
    #[serde(default)]
    pub is_user_recommendation: bool,
    #[serde(default)]
    pub recommender_id: String,
    /// Skip votes are tallied apart from ranking votes.
    #[serde(default)]
    pub skip_votes: u32,
    #[serde(default)]
    pub skip_voter_ids: Vec<String>,
}

fn default_visible() -> bool {
    true
}

impl PlaylistEntry {
    pub fn matches(&self, name: &str, artist: &str) -> bool {
        same_text(&self.name, name) && same_text(&self.artist, artist)
    }

    pub fn has_voter(&self, caller: &str) -> bool {
        self.voter_ids.iter().any(|v| v == caller)
    }

    /// Records a vote from `caller`. Returns false if the caller already voted here.
    pub fn add_voter(&mut self, caller: &str) -> bool {
        if self.has_voter(caller) {
            return false;
        }
        self.voter_ids.push(caller.to_string());
        self.votes += 1;
        true
    }

    pub fn remove_voter(&mut self, caller: &str) -> bool {
        let before = self.voter_ids.len();
        self.voter_ids.retain(|v| v != caller);
        if self.voter_ids.len() == before {
            return false;
        }
        self.votes = self.votes.saturating_sub(1);
        true
    }

    /// Records a skip vote. Returns false if the caller already asked to skip this track.
    pub fn add_skip_voter(&mut self, caller: &str) -> bool {
        if self.skip_voter_ids.iter().any(|v| v == caller) {
            return false;
        }
        self.skip_voter_ids.push(caller.to_string());
        self.skip_votes += 1;
        true
    }

    /// Genre with blank values treated as missing.
    pub fn genre(&self) -> Option<&str> {
        self.genre.as_deref().map(str::trim).filter(|g| !g.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SongCatalogEntry {
    pub id: String,
    pub name: String,
    pub artist: String,
    #[serde(default)]
    pub genre: Option<String>,
    pub added_at: DateTime<Utc>,
}

impl SongCatalogEntry {
    pub fn matches(&self, name: &str, artist: &str) -> bool {
        same_text(&self.name, name) && same_text(&self.artist, artist)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayRecord {
    pub id: String,
    pub song_id: String,
    pub played_at: DateTime<Utc>,
}

/// Only the fields the active-user count needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub id: String,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Award {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub song_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub music_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub music_artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub votes: Option<u32>,
}

impl Document for Event {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Document for SongCatalogEntry {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Document for PlayRecord {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Document for UserAccount {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Payload for creating an event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub enable_user_recommendation: bool,
}

/// Track data supplied when adding music to an event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackData {
    pub name: String,
    pub artist: String,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

/// Identifies a playlist entry by (name, artist).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackMatch {
    pub name: String,
    pub artist: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSong {
    pub name: String,
    pub artist: String,
    #[serde(default)]
    pub genre: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, artist: &str) -> PlaylistEntry {
        PlaylistEntry {
            id: new_id(),
            name: name.to_string(),
            artist: artist.to_string(),
            genre: None,
            visible: true,
            votes: 0,
            voter_ids: Vec::new(),
            is_user_recommendation: false,
            recommender_id: "dj".to_string(),
            skip_votes: 0,
            skip_voter_ids: Vec::new(),
        }
    }

    #[test]
    fn voter_set_keeps_count_in_step() {
        let mut e = entry("Song", "Band");
        assert!(e.add_voter("u1"));
        assert!(!e.add_voter("u1"));
        assert!(e.add_voter("u2"));
        assert_eq!(e.votes, 2);
        assert!(e.remove_voter("u1"));
        assert!(!e.remove_voter("u1"));
        assert_eq!(e.votes as usize, e.voter_ids.len());
    }

    #[test]
    fn matching_ignores_case() {
        let e = entry("Blue Monday", "New Order");
        assert!(e.matches("blue monday", "NEW ORDER"));
        assert!(!e.matches("blue monday", "Joy Division"));
    }

    #[test]
    fn event_document_uses_camel_case() {
        let json = serde_json::json!({
            "id": "e1",
            "djId": "dj",
            "name": "Party",
            "date": "2026-01-01T20:00:00Z",
            "active": true,
            "musicConfig": {
                "enableUserRecommendation": true,
                "musicPlaylist": [{
                    "id": "t1", "name": "A", "artist": "B", "votes": 1, "voterIds": ["u"]
                }]
            }
        });
        let event: Event = serde_json::from_value(json).unwrap();
        assert!(event.music_config.enable_user_recommendation);
        assert_eq!(event.playlist()[0].voter_ids, vec!["u".to_string()]);
        assert!(event.playlist()[0].visible);
    }
}
