use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{Event, SongCatalogEntry};
use crate::repository::{PlayRepository, SongRepository};

pub const DEFAULT_TOP_N: usize = 10;
const UNKNOWN_GENRE: &str = "Unknown";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenrePopularity {
    pub genre: String,
    pub total_votes: u64,
    pub song_count: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserContribution {
    pub user_id: String,
    pub recommendations: u64,
    pub votes: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventPerformance {
    pub event_id: String,
    pub event_name: String,
    pub total_songs: u64,
    pub total_votes: u64,
    pub average_votes_per_song: f64,
}

/// Genre totals across every playlist, most voted first.
pub fn genre_popularity(events: &[Event]) -> Vec<GenrePopularity> {
    let mut by_genre: HashMap<&str, (u64, u64)> = HashMap::new();
    for entry in events.iter().flat_map(|e| e.playlist()) {
        let (votes, songs) = by_genre.entry(entry.genre().unwrap_or(UNKNOWN_GENRE)).or_default();
        *votes += u64::from(entry.votes);
        *songs += 1;
    }

    let mut genres: Vec<GenrePopularity> = by_genre
        .into_iter()
        .map(|(genre, (total_votes, song_count))| GenrePopularity {
            genre: genre.to_string(),
            total_votes,
            song_count,
        })
        .collect();
    // genre name breaks ties so the output doesn't depend on hash order
    genres.sort_by(|a, b| b.total_votes.cmp(&a.total_votes).then_with(|| a.genre.cmp(&b.genre)));
    genres
}

pub fn top_songs(events: &[Event], top_n: usize) -> Vec<GenrePopularity> {
    let mut genres = genre_popularity(events);
    genres.truncate(top_n);
    genres
}

pub fn user_contributions(events: &[Event]) -> Vec<UserContribution> {
    let mut by_user: HashMap<&str, (u64, u64)> = HashMap::new();
    for entry in events.iter().flat_map(|e| e.playlist()) {
        let (recommendations, votes) = by_user.entry(entry.recommender_id.as_str()).or_default();
        if entry.is_user_recommendation {
            *recommendations += 1;
        }
        *votes += u64::from(entry.votes);
    }

    let mut users: Vec<UserContribution> = by_user
        .into_iter()
        .map(|(user_id, (recommendations, votes))| UserContribution {
            user_id: user_id.to_string(),
            recommendations,
            votes,
        })
        .collect();
    users.sort_by(|a, b| b.votes.cmp(&a.votes).then_with(|| a.user_id.cmp(&b.user_id)));
    users
}

pub fn event_performance(events: &[Event]) -> Vec<EventPerformance> {
    events
        .iter()
        .map(|event| {
            let total_songs = event.playlist().len() as u64;
            let total_votes: u64 = event.playlist().iter().map(|e| u64::from(e.votes)).sum();
            let average_votes_per_song = if total_songs == 0 {
                0.0
            } else {
                total_votes as f64 / total_songs as f64
            };
            EventPerformance {
                event_id: event.id.clone(),
                event_name: event.name.clone(),
                total_songs,
                total_votes,
                average_votes_per_song,
            }
        })
        .collect()
}

/// Song with the most recorded plays, resolved through the catalog.
pub async fn most_played_song(
    plays: &PlayRepository,
    songs: &SongRepository,
) -> Result<Option<(SongCatalogEntry, u64)>> {
    let counts = plays.counts_by_song().await?;
    // ties go to the smallest song id
    let Some((song_id, count)) = counts
        .into_iter()
        .max_by(|(a_id, a), (b_id, b)| a.cmp(b).then_with(|| b_id.cmp(a_id)))
    else {
        return Ok(None);
    };

    match songs.get(&song_id).await? {
        Some(song) => Ok(Some((song, count))),
        None => {
            tracing::warn!(song_id = %song_id, "most played song is missing from the catalog");
            Ok(None)
        }
    }
}
