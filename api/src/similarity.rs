use rand::seq::SliceRandom;

use crate::error::Result;
use crate::models::{same_text, PlaylistEntry, SongCatalogEntry};
use crate::repository::{EventRepository, SongRepository};

pub const SUGGESTION_LIMIT: usize = 10;

/// Most frequent genre in the playlist. Ties go to the genre seen first.
pub fn dominant_genre(playlist: &[PlaylistEntry]) -> Option<&str> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for genre in playlist.iter().filter_map(PlaylistEntry::genre) {
        match counts.iter_mut().find(|(seen, _)| same_text(seen, genre)) {
            Some((_, count)) => *count += 1,
            None => counts.push((genre, 1)),
        }
    }

    counts
        .into_iter()
        .fold(None, |best: Option<(&str, usize)>, (genre, count)| match best {
            Some((_, top)) if top >= count => best,
            _ => Some((genre, count)),
        })
        .map(|(genre, _)| genre)
}

fn random_sample(catalog: &[SongCatalogEntry]) -> Vec<SongCatalogEntry> {
    catalog
        .choose_multiple(&mut rand::thread_rng(), SUGGESTION_LIMIT)
        .cloned()
        .collect()
}

/// Catalog songs that fit an event's playlist.
pub fn suggest(playlist: &[PlaylistEntry], catalog: &[SongCatalogEntry]) -> Vec<SongCatalogEntry> {
    let Some(genre) = dominant_genre(playlist) else {
        return random_sample(catalog);
    };

    catalog
        .iter()
        .filter(|song| {
            song.genre
                .as_deref()
                .is_some_and(|g| same_text(g.trim(), genre))
        })
        .filter(|song| !playlist.iter().any(|entry| same_text(&entry.name, &song.name)))
        .take(SUGGESTION_LIMIT)
        .cloned()
        .collect()
}

pub async fn similar_songs(
    events: &EventRepository,
    songs: &SongRepository,
    event_id: &str,
) -> Result<Vec<SongCatalogEntry>> {
    let event = events.require(event_id).await?;
    let catalog = songs.all().await?;
    let suggestions = suggest(event.playlist(), &catalog);
    tracing::debug!(
        event_id,
        genre = dominant_genre(event.playlist()).unwrap_or("none"),
        count = suggestions.len(),
        "similar songs computed"
    );
    Ok(suggestions)
}
