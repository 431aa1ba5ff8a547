use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::Json,
};
use serde::{Deserialize, Serialize};

use crate::analytics::{self, EventPerformance, GenrePopularity, UserContribution};
use crate::awards::{self, LeaderboardRow};
use crate::error::{Error, Result};
use crate::ledger::{SkipOutcome, UnlistedOutcome, VoteOutcome};
use crate::models::{
    Award, Event, NewEvent, NewSong, PlayRecord, PlaylistEntry, SongCatalogEntry, TrackData,
    TrackMatch,
};
use crate::similarity;
use crate::AppState;

pub const CALLER_HEADER: &str = "x-user-id";

const DEFAULT_PAGE_SIZE: u32 = 10;

/// Identity of the caller, already authenticated upstream.
#[derive(Debug, Clone)]
pub struct Caller(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .headers
            .get(CALLER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Caller(v.to_string()))
            .ok_or(Error::Unauthorized)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    page: Option<u32>,
    page_size: Option<u32>,
}

impl PageQuery {
    fn resolve(&self) -> (u32, u32) {
        (self.page.unwrap_or(1), self.page_size.unwrap_or(DEFAULT_PAGE_SIZE))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopQuery {
    top_n: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct EnabledBody {
    enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct ActiveBody {
    active: bool,
}

#[derive(Debug, Deserialize)]
pub struct QrCodeBody {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MostPlayed {
    pub song: SongCatalogEntry,
    pub plays: u64,
}

pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn create_event(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(data): Json<NewEvent>,
) -> Result<(StatusCode, Json<Event>)> {
    let event = state.ledger.create_event(&caller, data).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Event>> {
    Ok(Json(state.ledger.events().require(&id).await?))
}

pub async fn delete_event(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.ledger.delete_event(&id, &caller).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<Event>>> {
    let (page, page_size) = query.resolve();
    Ok(Json(state.ledger.events().page(page, page_size).await?))
}

pub async fn my_events(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<Json<Vec<Event>>> {
    Ok(Json(state.ledger.events().by_dj(&caller).await?))
}

pub async fn set_recommendations(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    Json(body): Json<EnabledBody>,
) -> Result<StatusCode> {
    state.ledger.set_recommendations(&id, &caller, body.enabled).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_active(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    Json(body): Json<ActiveBody>,
) -> Result<StatusCode> {
    state.ledger.set_active(&id, &caller, body.active).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_qr_code_text(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    Json(body): Json<QrCodeBody>,
) -> Result<StatusCode> {
    state.ledger.set_qr_code_text(&id, &caller, &body.text).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_playlist(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<PlaylistEntry>>> {
    Ok(Json(state.ledger.playlist(&id).await?))
}

pub async fn add_track(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    Json(track): Json<TrackData>,
) -> Result<(StatusCode, Json<PlaylistEntry>)> {
    if track.name.trim().is_empty() || track.artist.trim().is_empty() {
        return Err(Error::InvalidInput("name and artist are required".to_string()));
    }
    let entry = state.ledger.add_track(&id, &caller, track).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn remove_track(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    Json(track): Json<TrackMatch>,
) -> Result<Json<PlaylistEntry>> {
    Ok(Json(state.ledger.remove_track(&id, &caller, &track).await?))
}

pub async fn add_unlisted_song(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path((id, song_id)): Path<(String, String)>,
) -> Result<(StatusCode, Json<UnlistedOutcome>)> {
    let outcome = state.ledger.add_unlisted_song(&id, &caller, &song_id).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn cast_vote(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    Json(track): Json<TrackMatch>,
) -> Result<Json<VoteOutcome>> {
    Ok(Json(state.ledger.cast_ranking_vote(&id, &caller, &track).await?))
}

pub async fn retract_vote(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<Json<VoteOutcome>> {
    Ok(Json(state.ledger.retract_vote(&id, &caller).await?))
}

pub async fn cast_skip_vote(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path((id, track_id)): Path<(String, String)>,
) -> Result<Json<SkipOutcome>> {
    Ok(Json(state.ledger.cast_skip_vote(&id, &caller, &track_id).await?))
}

pub async fn skip_status(
    State(state): State<AppState>,
    Path((id, track_id)): Path<(String, String)>,
) -> Result<Json<SkipOutcome>> {
    Ok(Json(state.ledger.skip_status(&id, &track_id).await?))
}

pub async fn get_leaderboard(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<LeaderboardRow>>> {
    let playlist = state.ledger.playlist(&id).await?;
    Ok(Json(awards::leaderboard(&playlist)))
}

pub async fn get_awards(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Award>>> {
    let playlist = state.ledger.playlist(&id).await?;
    Ok(Json(awards::awards(&playlist)))
}

pub async fn get_similar(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<SongCatalogEntry>>> {
    let songs = similarity::similar_songs(state.ledger.events(), state.ledger.songs(), &id).await?;
    Ok(Json(songs))
}

/// Catalog edits need a caller but no particular role.
pub async fn create_song(
    State(state): State<AppState>,
    _caller: Caller,
    Json(song): Json<NewSong>,
) -> Result<(StatusCode, Json<SongCatalogEntry>)> {
    if song.name.trim().is_empty() || song.artist.trim().is_empty() {
        return Err(Error::InvalidInput("name and artist are required".to_string()));
    }
    let created = state
        .ledger
        .songs()
        .create(&song.name, &song.artist, song.genre)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_song(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SongCatalogEntry>> {
    let song = state.ledger.songs().get(&id).await?.ok_or(Error::NotFound("song"))?;
    Ok(Json(song))
}

pub async fn delete_song(
    State(state): State<AppState>,
    _caller: Caller,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.ledger.songs().delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_songs(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<SongCatalogEntry>>> {
    let (page, page_size) = query.resolve();
    Ok(Json(state.ledger.songs().page(page, page_size).await?))
}

pub async fn record_play(
    State(state): State<AppState>,
    Path(song_id): Path<String>,
) -> Result<(StatusCode, Json<PlayRecord>)> {
    if state.ledger.songs().get(&song_id).await?.is_none() {
        return Err(Error::NotFound("song"));
    }
    let play = state.plays.record(&song_id).await?;
    Ok((StatusCode::CREATED, Json(play)))
}

pub async fn most_played(State(state): State<AppState>) -> Result<Json<Option<MostPlayed>>> {
    let most = analytics::most_played_song(&state.plays, state.ledger.songs()).await?;
    Ok(Json(most.map(|(song, plays)| MostPlayed { song, plays })))
}

pub async fn top_songs(
    State(state): State<AppState>,
    Query(query): Query<TopQuery>,
) -> Result<Json<Vec<GenrePopularity>>> {
    let events = state.ledger.events().all().await?;
    let top_n = query.top_n.unwrap_or(analytics::DEFAULT_TOP_N);
    Ok(Json(analytics::top_songs(&events, top_n)))
}

pub async fn genre_popularity(State(state): State<AppState>) -> Result<Json<Vec<GenrePopularity>>> {
    let events = state.ledger.events().all().await?;
    Ok(Json(analytics::genre_popularity(&events)))
}

pub async fn user_contributions(
    State(state): State<AppState>,
) -> Result<Json<Vec<UserContribution>>> {
    let events = state.ledger.events().all().await?;
    Ok(Json(analytics::user_contributions(&events)))
}

pub async fn event_performance(
    State(state): State<AppState>,
) -> Result<Json<Vec<EventPerformance>>> {
    let events = state.ledger.events().all().await?;
    Ok(Json(analytics::event_performance(&events)))
}
