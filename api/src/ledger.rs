//! Playlist vote ledger.
//!
//! Every command that changes a playlist runs its checks and its edit inside a
//! single atomic store update, so concurrent commands on one event cannot lose
//! each other's votes and the one-ranking-vote-per-event rule holds under load.

use std::sync::Arc;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::{new_id, Event, NewEvent, PlaylistConfig, PlaylistEntry, TrackData, TrackMatch};
use crate::repository::{EventRepository, SongRepository};
use crate::users::{required_skip_votes, ActiveUsers};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VoteOutcome {
    pub track_id: String,
    pub votes: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UnlistedOutcome {
    pub entry: PlaylistEntry,
    /// False when the caller already held a ranking vote elsewhere in the event.
    pub vote_recorded: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SkipOutcome {
    pub track_id: String,
    pub votes: u32,
    pub votes_needed: u64,
    pub should_skip: bool,
}

#[derive(Clone)]
pub struct PlaylistLedger {
    events: EventRepository,
    songs: SongRepository,
    users: Arc<dyn ActiveUsers>,
}

fn entry_from(
    name: &str,
    artist: &str,
    genre: Option<String>,
    visible: bool,
    event: &Event,
    caller: &str,
) -> PlaylistEntry {
    PlaylistEntry {
        id: new_id(),
        name: name.to_string(),
        artist: artist.to_string(),
        genre,
        visible,
        votes: 0,
        voter_ids: Vec::new(),
        is_user_recommendation: !event.is_dj(caller),
        recommender_id: caller.to_string(),
        skip_votes: 0,
        skip_voter_ids: Vec::new(),
    }
}

fn ensure_can_add(event: &Event, caller: &str) -> Result<()> {
    if event.is_dj(caller) || event.music_config.enable_user_recommendation {
        Ok(())
    } else {
        Err(Error::Forbidden(
            "only the DJ can add songs to this event".to_string(),
        ))
    }
}

fn ensure_dj(event: &Event, caller: &str) -> Result<()> {
    if event.is_dj(caller) {
        Ok(())
    } else {
        Err(Error::Forbidden("only the DJ can change this event".to_string()))
    }
}

impl PlaylistLedger {
    pub fn new(
        events: EventRepository,
        songs: SongRepository,
        users: Arc<dyn ActiveUsers>,
    ) -> Self {
        Self {
            events,
            songs,
            users,
        }
    }

    pub fn events(&self) -> &EventRepository {
        &self.events
    }

    pub fn songs(&self) -> &SongRepository {
        &self.songs
    }

    pub async fn create_event(&self, caller: &str, data: NewEvent) -> Result<Event> {
        if data.name.trim().is_empty() {
            return Err(Error::InvalidInput("event name is required".to_string()));
        }
        let id = new_id();
        let event = Event {
            qr_code_text: id.clone(),
            id,
            dj_id: caller.to_string(),
            name: data.name,
            description: data.description,
            date: data.date,
            location: data.location,
            active: data.active,
            music_config: PlaylistConfig {
                enable_user_recommendation: data.enable_user_recommendation,
                music_playlist: Vec::new(),
            },
        };
        self.events.create(&event).await?;
        Ok(event)
    }

    pub async fn delete_event(&self, event_id: &str, caller: &str) -> Result<()> {
        let event = self.events.require(event_id).await?;
        ensure_dj(&event, caller)?;
        self.events.delete(event_id).await
    }

    pub async fn set_recommendations(
        &self,
        event_id: &str,
        caller: &str,
        enabled: bool,
    ) -> Result<()> {
        self.events
            .update(event_id, |event| {
                ensure_dj(event, caller)?;
                event.music_config.enable_user_recommendation = enabled;
                Ok(())
            })
            .await?;
        tracing::info!(event_id, enabled, "user recommendations toggled");
        Ok(())
    }

    pub async fn set_active(&self, event_id: &str, caller: &str, active: bool) -> Result<()> {
        self.events
            .update(event_id, |event| {
                ensure_dj(event, caller)?;
                event.active = active;
                Ok(())
            })
            .await?;
        tracing::info!(event_id, active, "event activity changed");
        Ok(())
    }

    /// Replaces the text the event's QR code encodes. Blank text is rejected.
    pub async fn set_qr_code_text(&self, event_id: &str, caller: &str, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidInput("qr code text is required".to_string()));
        }
        self.events
            .update(event_id, |event| {
                ensure_dj(event, caller)?;
                event.qr_code_text = text.to_string();
                Ok(())
            })
            .await?;
        tracing::info!(event_id, "qr code text changed");
        Ok(())
    }

    pub async fn playlist(&self, event_id: &str) -> Result<Vec<PlaylistEntry>> {
        Ok(self.events.require(event_id).await?.music_config.music_playlist)
    }

    /// Appends a track, creating its catalog entry first if the catalog lacks it.
    pub async fn add_track(
        &self,
        event_id: &str,
        caller: &str,
        track: TrackData,
    ) -> Result<PlaylistEntry> {
        let event = self.events.require(event_id).await?;
        ensure_can_add(&event, caller)?;

        self.songs
            .ensure(&track.name, &track.artist, track.genre.clone())
            .await?;

        let entry = self
            .events
            .update(event_id, |event| {
                // permissions may have changed since the cached read
                ensure_can_add(event, caller)?;
                let entry = entry_from(
                    &track.name,
                    &track.artist,
                    track.genre.clone(),
                    track.visible,
                    event,
                    caller,
                );
                event.music_config.music_playlist.push(entry.clone());
                Ok(entry)
            })
            .await?;

        tracing::info!(event_id, caller, track_id = %entry.id, name = %entry.name, "track added");
        Ok(entry)
    }

    /// Adds a catalog song to the playlist with the caller's vote already on it.
    pub async fn add_unlisted_song(
        &self,
        event_id: &str,
        caller: &str,
        song_id: &str,
    ) -> Result<UnlistedOutcome> {
        let song = self.songs.get(song_id).await?.ok_or(Error::NotFound("song"))?;

        let outcome = self
            .events
            .update(event_id, |event| {
                if event.find_track(&song.name, &song.artist).is_some() {
                    return Err(Error::AlreadyPresent);
                }
                let genre = song.genre.clone();
                let mut entry = entry_from(&song.name, &song.artist, genre, true, event, caller);
                let vote_recorded =
                    event.voted_track(caller).is_none() && entry.add_voter(caller);
                event.music_config.music_playlist.push(entry.clone());
                Ok(UnlistedOutcome {
                    entry,
                    vote_recorded,
                })
            })
            .await?;

        tracing::info!(
            event_id,
            caller,
            song_id,
            vote_recorded = outcome.vote_recorded,
            "unlisted song added"
        );
        Ok(outcome)
    }

    pub async fn cast_ranking_vote(
        &self,
        event_id: &str,
        caller: &str,
        track: &TrackMatch,
    ) -> Result<VoteOutcome> {
        let outcome = self
            .events
            .update(event_id, |event| {
                let index = event
                    .find_track(&track.name, &track.artist)
                    .ok_or(Error::NotFound("track"))?;
                if !event.active {
                    return Err(Error::EventNotActive);
                }
                // one ranking vote per identity across the whole playlist
                if event.voted_track(caller).is_some() {
                    return Err(Error::AlreadyVoted);
                }
                let entry = &mut event.music_config.music_playlist[index];
                entry.add_voter(caller);
                Ok(VoteOutcome {
                    track_id: entry.id.clone(),
                    votes: entry.votes,
                })
            })
            .await?;

        tracing::info!(
            event_id,
            caller,
            track_id = %outcome.track_id,
            votes = outcome.votes,
            "ranking vote cast"
        );
        Ok(outcome)
    }

    pub async fn retract_vote(&self, event_id: &str, caller: &str) -> Result<VoteOutcome> {
        let outcome = self
            .events
            .update(event_id, |event| {
                let index = event.voted_track(caller).ok_or(Error::NothingToRetract)?;
                let entry = &mut event.music_config.music_playlist[index];
                entry.remove_voter(caller);
                Ok(VoteOutcome {
                    track_id: entry.id.clone(),
                    votes: entry.votes,
                })
            })
            .await?;

        tracing::info!(event_id, caller, track_id = %outcome.track_id, "ranking vote retracted");
        Ok(outcome)
    }

    /// Drops a track outright, discarding any votes on it.
    pub async fn remove_track(
        &self,
        event_id: &str,
        caller: &str,
        track: &TrackMatch,
    ) -> Result<PlaylistEntry> {
        let removed = self
            .events
            .update(event_id, |event| {
                let index = event
                    .find_track(&track.name, &track.artist)
                    .ok_or(Error::NotFound("track"))?;
                Ok(event.music_config.music_playlist.remove(index))
            })
            .await?;

        tracing::info!(event_id, caller, track_id = %removed.id, "track removed");
        Ok(removed)
    }

    /// Registers a skip vote; the track leaves the playlist once a majority asks.
    pub async fn cast_skip_vote(
        &self,
        event_id: &str,
        caller: &str,
        track_id: &str,
    ) -> Result<SkipOutcome> {
        let votes_needed = required_skip_votes(self.users.active_user_count().await?);

        let outcome = self
            .events
            .update(event_id, |event| {
                if !event.active {
                    return Err(Error::EventNotActive);
                }
                let index = event.find_track_by_id(track_id).ok_or(Error::NotFound("track"))?;
                let entry = &mut event.music_config.music_playlist[index];
                if !entry.add_skip_voter(caller) {
                    return Err(Error::AlreadyVoted);
                }
                let votes = entry.skip_votes;
                let should_skip = u64::from(votes) >= votes_needed;
                if should_skip {
                    event.music_config.music_playlist.remove(index);
                }
                Ok(SkipOutcome {
                    track_id: track_id.to_string(),
                    votes,
                    votes_needed,
                    should_skip,
                })
            })
            .await?;

        if outcome.should_skip {
            tracing::info!(
                event_id,
                track_id,
                votes = outcome.votes,
                "skip threshold reached, track skipped"
            );
        } else {
            tracing::info!(
                event_id,
                track_id,
                votes = outcome.votes,
                votes_needed = outcome.votes_needed,
                "skip vote recorded"
            );
        }
        Ok(outcome)
    }

    pub async fn skip_status(&self, event_id: &str, track_id: &str) -> Result<SkipOutcome> {
        let event = self.events.require(event_id).await?;
        let index = event.find_track_by_id(track_id).ok_or(Error::NotFound("track"))?;
        let votes = event.playlist()[index].skip_votes;
        let votes_needed = required_skip_votes(self.users.active_user_count().await?);

        Ok(SkipOutcome {
            track_id: track_id.to_string(),
            votes,
            votes_needed,
            should_skip: u64::from(votes) >= votes_needed,
        })
    }
}
