use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod analytics;
pub mod awards;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod memory;
pub mod models;
pub mod repository;
pub mod similarity;
pub mod store;
pub mod users;

use cache::Cache;
use config::Config;
use ledger::PlaylistLedger;
use memory::MemoryStore;
use repository::{EventRepository, PlayRepository, SongRepository};
use store::DocumentStore;
use users::{ActiveUsers, StoreActiveUsers};

#[derive(Clone)]
pub struct AppState {
    pub ledger: PlaylistLedger,
    pub plays: PlayRepository,
    pub cache: Arc<Cache>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        users: Arc<dyn ActiveUsers>,
        cache_ttl: Duration,
    ) -> Self {
        let cache = Arc::new(Cache::new(cache_ttl));
        let events = EventRepository::new(store.clone(), cache.clone());
        let songs = SongRepository::new(store.clone(), cache.clone());
        Self {
            ledger: PlaylistLedger::new(events, songs, users),
            plays: PlayRepository::new(store),
            cache,
        }
    }
}

pub fn app(state: AppState) -> Router {
    use handlers::*;

    Router::new()
        .route("/health", get(health_check))
        .route("/api/events", get(list_events).post(create_event))
        .route("/api/events/mine", get(my_events))
        .route("/api/events/:id", get(get_event).delete(delete_event))
        .route("/api/events/:id/recommendations", put(set_recommendations))
        .route("/api/events/:id/active", put(set_active))
        .route("/api/events/:id/qr-code", put(set_qr_code_text))
        .route(
            "/api/events/:id/music",
            get(get_playlist).post(add_track).delete(remove_track),
        )
        .route("/api/events/:id/unlisted/:song_id", post(add_unlisted_song))
        .route("/api/events/:id/vote", post(cast_vote).delete(retract_vote))
        .route(
            "/api/events/:id/skip/:track_id",
            get(skip_status).post(cast_skip_vote),
        )
        .route("/api/events/:id/leaderboard", get(get_leaderboard))
        .route("/api/events/:id/awards", get(get_awards))
        .route("/api/events/:id/similar", get(get_similar))
        .route("/api/songs", get(list_songs).post(create_song))
        .route("/api/songs/:id", get(get_song).delete(delete_song))
        .route("/api/analytics/play/:song_id", post(record_play))
        .route("/api/analytics/most-played", get(most_played))
        .route("/api/analytics/top-songs", get(top_songs))
        .route("/api/analytics/genre-popularity", get(genre_popularity))
        .route("/api/analytics/user-contributions", get(user_contributions))
        .route("/api/analytics/event-performance", get(event_performance))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Drops expired cache entries on a fixed interval until the process exits.
fn spawn_cache_purger(cache: Arc<Cache>) {
    let period = (cache.ttl() / 2).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let purged = cache.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "expired cache entries dropped");
            }
        }
    });
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "djvote_api=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn DocumentStore> = match &config.database_url {
        Some(_) => {
            let pool = db::init_db(&config).await?;
            tracing::info!("database initialized");
            Arc::new(db::PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let users: Arc<dyn ActiveUsers> = Arc::new(StoreActiveUsers::new(store.clone()));
    let state = AppState::new(store, users, config.cache_ttl);
    spawn_cache_purger(state.cache.clone());

    let app = app(state);

    tracing::info!("listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
