//! Cached repositories.
//!
//! Every mutation invalidates the entity's own key, the "all" listing, any
//! derived listing it appears in, and sweeps the entity's pagination family.
//! Coarse, but a completed write is never followed by a stale read.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use crate::cache::Cache;
use crate::error::{Error, Result};
use crate::models::{new_id, Event, PlayRecord, SongCatalogEntry};
use crate::store::{Collection, DocumentStore, Filter, EVENTS, PLAYS, SONGS};

const ALL_EVENTS: &str = "all_events";
const EVENT_PAGES: &str = "events";
const ALL_SONGS: &str = "all_songs";
const SONG_PAGES: &str = "songs";

fn event_key(id: &str) -> String {
    format!("event_{id}")
}

fn events_by_dj_key(dj_id: &str) -> String {
    format!("events_by_dj_{dj_id}")
}

fn song_key(id: &str) -> String {
    format!("song_{id}")
}

fn page_key(family: &str, page: u32, page_size: u32) -> String {
    format!("{family}_page_{page}_size_{page_size}")
}

fn check_page(page: u32, page_size: u32) -> Result<()> {
    if page < 1 || page_size < 1 {
        return Err(Error::InvalidInput(
            "page and pageSize must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

#[derive(Clone)]
pub struct EventRepository {
    events: Collection<Event>,
    cache: Arc<Cache>,
}

impl EventRepository {
    pub fn new(store: Arc<dyn DocumentStore>, cache: Arc<Cache>) -> Self {
        Self {
            events: Collection::new(store, EVENTS),
            cache,
        }
    }

    pub async fn get(&self, id: &str) -> Result<Option<Event>> {
        let events = &self.events;
        self.cache
            .get_or_load_some(&event_key(id), || async move { events.get(id).await })
            .await
            .map_err(Error::from)
    }

    /// Like [`EventRepository::get`] but absence is an error.
    pub async fn require(&self, id: &str) -> Result<Event> {
        self.get(id).await?.ok_or(Error::NotFound("event"))
    }

    pub async fn all(&self) -> Result<Vec<Event>> {
        let events = &self.events;
        self.cache
            .get_or_load(ALL_EVENTS, || async move { events.find(&Filter::All).await })
            .await
            .map_err(Error::from)
    }

    pub async fn by_dj(&self, dj_id: &str) -> Result<Vec<Event>> {
        let events = &self.events;
        let filter = Filter::Matches(serde_json::json!({ "djId": dj_id }));
        self.cache
            .get_or_load(&events_by_dj_key(dj_id), || async move {
                events.find(&filter).await
            })
            .await
            .map_err(Error::from)
    }

    pub async fn page(&self, page: u32, page_size: u32) -> Result<Vec<Event>> {
        check_page(page, page_size)?;
        let key = page_key(EVENT_PAGES, page, page_size);
        let events = &self.events;
        self.cache
            .load_page(EVENT_PAGES, &key, || async move {
                events.paginate(page, page_size).await
            })
            .await
            .map_err(Error::from)
    }

    pub async fn create(&self, event: &Event) -> Result<()> {
        self.events.insert(event).await?;
        tracing::info!(event_id = %event.id, dj_id = %event.dj_id, "event created");
        self.invalidate(&event.id, &event.dj_id);
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let event = self
            .events
            .get(id)
            .await?
            .ok_or(Error::NotFound("event"))?;
        self.events.delete(id).await?;
        tracing::info!(event_id = %id, "event deleted");
        self.invalidate(id, &event.dj_id);
        Ok(())
    }

    /// Applies `f` to the stored event in one atomic update, then invalidates.
    ///
    /// Nothing is written and nothing is invalidated when `f` rejects the command.
    pub async fn update<R, F>(&self, id: &str, f: F) -> Result<R>
    where
        F: FnOnce(&mut Event) -> Result<R> + Send,
        R: Send,
    {
        let mut dj_id = None;
        let outcome = self
            .events
            .update(id, |event: &mut Event| {
                let result = f(event);
                dj_id = Some(event.dj_id.clone());
                result
            })
            .await;
        let outcome = outcome?.ok_or(Error::NotFound("event"))?;
        if let Some(dj_id) = dj_id {
            self.invalidate(id, &dj_id);
        }
        Ok(outcome)
    }

    fn invalidate(&self, id: &str, dj_id: &str) {
        self.cache.invalidate_all([
            event_key(id),
            ALL_EVENTS.to_string(),
            events_by_dj_key(dj_id),
        ]);
        self.cache.sweep_pagination_keys(EVENT_PAGES);
    }
}

#[derive(Clone)]
pub struct SongRepository {
    songs: Collection<SongCatalogEntry>,
    cache: Arc<Cache>,
}

impl SongRepository {
    pub fn new(store: Arc<dyn DocumentStore>, cache: Arc<Cache>) -> Self {
        Self {
            songs: Collection::new(store, SONGS),
            cache,
        }
    }

    pub async fn get(&self, id: &str) -> Result<Option<SongCatalogEntry>> {
        let songs = &self.songs;
        self.cache
            .get_or_load_some(&song_key(id), || async move { songs.get(id).await })
            .await
            .map_err(Error::from)
    }

    pub async fn all(&self) -> Result<Vec<SongCatalogEntry>> {
        let songs = &self.songs;
        self.cache
            .get_or_load(ALL_SONGS, || async move { songs.find(&Filter::All).await })
            .await
            .map_err(Error::from)
    }

    pub async fn page(&self, page: u32, page_size: u32) -> Result<Vec<SongCatalogEntry>> {
        check_page(page, page_size)?;
        let key = page_key(SONG_PAGES, page, page_size);
        let songs = &self.songs;
        self.cache
            .load_page(SONG_PAGES, &key, || async move {
                songs.paginate(page, page_size).await
            })
            .await
            .map_err(Error::from)
    }

    pub async fn find_by_name_and_artist(
        &self,
        name: &str,
        artist: &str,
    ) -> Result<Option<SongCatalogEntry>> {
        Ok(self
            .all()
            .await?
            .into_iter()
            .find(|song| song.matches(name, artist)))
    }

    pub async fn create(
        &self,
        name: &str,
        artist: &str,
        genre: Option<String>,
    ) -> Result<SongCatalogEntry> {
        let song = SongCatalogEntry {
            id: new_id(),
            name: name.to_string(),
            artist: artist.to_string(),
            genre,
            added_at: Utc::now(),
        };
        self.songs.insert(&song).await?;
        tracing::info!(
            song_id = %song.id,
            name = %song.name,
            artist = %song.artist,
            "song added to catalog"
        );
        self.invalidate(&song.id);
        Ok(song)
    }

    /// Returns the catalog entry for (name, artist), creating it if missing.
    pub async fn ensure(
        &self,
        name: &str,
        artist: &str,
        genre: Option<String>,
    ) -> Result<SongCatalogEntry> {
        match self.find_by_name_and_artist(name, artist).await? {
            Some(existing) => Ok(existing),
            None => self.create(name, artist, genre).await,
        }
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        if self.songs.delete(id).await? == 0 {
            return Err(Error::NotFound("song"));
        }
        tracing::info!(song_id = %id, "song removed from catalog");
        self.invalidate(id);
        Ok(())
    }

    fn invalidate(&self, id: &str) {
        self.cache
            .invalidate_all([song_key(id), ALL_SONGS.to_string()]);
        self.cache.sweep_pagination_keys(SONG_PAGES);
    }
}

/// Append-only play log. Not cached; only read by the most-played aggregation.
#[derive(Clone)]
pub struct PlayRepository {
    plays: Collection<PlayRecord>,
}

impl PlayRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            plays: Collection::new(store, PLAYS),
        }
    }

    pub async fn record(&self, song_id: &str) -> Result<PlayRecord> {
        let play = PlayRecord {
            id: new_id(),
            song_id: song_id.to_string(),
            played_at: Utc::now(),
        };
        self.plays.insert(&play).await?;
        tracing::debug!(song_id, "play recorded");
        Ok(play)
    }

    pub async fn counts_by_song(&self) -> Result<HashMap<String, u64>> {
        Ok(self.plays.group_count("songId").await?)
    }
}
