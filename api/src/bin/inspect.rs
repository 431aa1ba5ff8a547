use std::sync::Arc;

use anyhow::{bail, Result};
use djvote_api::config::Config;
use djvote_api::store::DocumentStore;
use djvote_api::users::StoreActiveUsers;
use djvote_api::{analytics, awards, db, AppState};
use sqlx::postgres::PgPool;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("inspect=debug,djvote_api=info")
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        return Ok(());
    }

    let config = Config::from_env()?;
    if config.database_url.is_none() {
        bail!("DATABASE_URL must be set to inspect a database");
    }
    let pool = db::init_db(&config).await?;
    let store: Arc<dyn DocumentStore> = Arc::new(db::PgStore::new(pool.clone()));
    let users = Arc::new(StoreActiveUsers::new(store.clone()));
    let state = AppState::new(store, users, config.cache_ttl);

    match args[1].as_str() {
        "stats" => {
            show_stats(&pool).await?;
        }
        "event" => {
            let Some(id) = args.get(2) else {
                println!("usage: inspect event <event-id>");
                return Ok(());
            };
            show_event(&state, id).await?;
        }
        "leaderboard" => {
            let Some(id) = args.get(2) else {
                println!("usage: inspect leaderboard <event-id>");
                return Ok(());
            };
            show_leaderboard(&state, id).await?;
        }
        "genres" => {
            show_genres(&state).await?;
        }
        "contributors" => {
            show_contributors(&state).await?;
        }
        _ => {
            print_usage();
        }
    }

    Ok(())
}

fn print_usage() {
    println!("djvote database inspector");
    println!();
    println!("usage:");
    println!("  inspect stats                  - document counts per collection");
    println!("  inspect event <id>             - show an event and its playlist");
    println!("  inspect leaderboard <id>       - ranked playlist and awards");
    println!("  inspect genres                 - genre popularity across events");
    println!("  inspect contributors           - per-user recommendations and votes");
}

async fn show_stats(pool: &PgPool) -> Result<()> {
    let counts: Vec<(String, i64)> = sqlx::query_as(
        "SELECT collection, COUNT(*) FROM documents GROUP BY collection ORDER BY collection",
    )
    .fetch_all(pool)
    .await?;

    println!("documents:");
    if counts.is_empty() {
        println!("  (empty)");
    }
    for (collection, count) in counts {
        println!("  {}: {}", collection, count);
    }

    Ok(())
}

async fn show_event(state: &AppState, id: &str) -> Result<()> {
    let Some(event) = state.ledger.events().get(id).await? else {
        println!("no event with id {}", id);
        return Ok(());
    };

    println!("{} ({})", event.name, event.id);
    println!("  dj: {}", event.dj_id);
    println!("  date: {}", event.date.format("%Y-%m-%d %H:%M"));
    if !event.location.is_empty() {
        println!("  location: {}", event.location);
    }
    println!("  active: {}", event.active);
    println!(
        "  guest recommendations: {}",
        event.music_config.enable_user_recommendation
    );
    println!();
    println!("playlist ({} tracks):", event.playlist().len());
    for entry in event.playlist() {
        let tag = if entry.is_user_recommendation { " [guest]" } else { "" };
        println!(
            "  {} - {} | {} votes, {} skips{}",
            entry.artist, entry.name, entry.votes, entry.skip_votes, tag
        );
    }

    Ok(())
}

async fn show_leaderboard(state: &AppState, id: &str) -> Result<()> {
    let playlist = state.ledger.playlist(id).await?;

    println!("leaderboard:");
    for row in awards::leaderboard(&playlist) {
        println!(
            "  {:>2}. {} - {} ({} votes)",
            row.rank, row.artist, row.music_name, row.votes
        );
    }

    println!();
    println!("awards:");
    for award in awards::awards(&playlist) {
        let subject = match (&award.music_name, &award.music_artist) {
            (Some(name), Some(artist)) => format!("{} - {}", artist, name),
            (None, Some(artist)) => artist.clone(),
            _ => "-".to_string(),
        };
        println!("  {}: {}", award.name, subject);
    }

    Ok(())
}

async fn show_genres(state: &AppState) -> Result<()> {
    let events = state.ledger.events().all().await?;

    println!("genre popularity:");
    for genre in analytics::genre_popularity(&events) {
        println!(
            "  {} - {} votes across {} songs",
            genre.genre, genre.total_votes, genre.song_count
        );
    }

    Ok(())
}

async fn show_contributors(state: &AppState) -> Result<()> {
    let events = state.ledger.events().all().await?;

    println!("contributors:");
    for user in analytics::user_contributions(&events) {
        println!(
            "  {} - {} recommendations, {} votes",
            user.user_id, user.recommendations, user.votes
        );
    }

    Ok(())
}
