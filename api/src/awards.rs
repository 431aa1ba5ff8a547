use serde::Serialize;

use crate::models::{Award, PlaylistEntry};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardRow {
    pub rank: usize,
    pub track_id: String,
    pub music_name: String,
    pub artist: String,
    pub votes: u32,
    pub is_user_recommendation: bool,
}

/// Ranks entries by votes, highest first. Ties keep playlist order.
pub fn leaderboard(playlist: &[PlaylistEntry]) -> Vec<LeaderboardRow> {
    let mut ranked: Vec<&PlaylistEntry> = playlist.iter().collect();
    // sort_by is stable
    ranked.sort_by(|a, b| b.votes.cmp(&a.votes));
    ranked
        .into_iter()
        .enumerate()
        .map(|(i, entry)| LeaderboardRow {
            rank: i + 1,
            track_id: entry.id.clone(),
            music_name: entry.name.clone(),
            artist: entry.artist.clone(),
            votes: entry.votes,
            is_user_recommendation: entry.is_user_recommendation,
        })
        .collect()
}

/// First entry with the highest key, so ties go to the earlier track.
fn first_max_by_key<'a, I, K>(
    entries: I,
    key: impl Fn(&PlaylistEntry) -> K,
) -> Option<&'a PlaylistEntry>
where
    I: IntoIterator<Item = &'a PlaylistEntry>,
    K: Ord,
{
    entries.into_iter().fold(None, |best, entry| match best {
        Some(current) if key(current) >= key(entry) => Some(current),
        _ => Some(entry),
    })
}

fn song_award(name: &str, description: &str, entry: &PlaylistEntry) -> Award {
    Award {
        name: name.to_string(),
        description: description.to_string(),
        song_id: Some(entry.id.clone()),
        music_name: Some(entry.name.clone()),
        music_artist: Some(entry.artist.clone()),
        votes: Some(entry.votes),
    }
}

/// Derives up to four awards. Awards with no candidate are left out.
pub fn awards(playlist: &[PlaylistEntry]) -> Vec<Award> {
    let mut awards = Vec::new();

    if let Some(top) = first_max_by_key(playlist, |e| e.votes) {
        awards.push(song_award(
            "Top Voted Song",
            "The song with the most votes.",
            top,
        ));
    }

    let recommended = playlist.iter().filter(|e| e.is_user_recommendation);
    if let Some(favorite) = first_max_by_key(recommended, |e| e.voter_ids.len()) {
        awards.push(song_award(
            "Most Recommended Song",
            "The guest recommendation with the most voters.",
            favorite,
        ));
        awards.push(Award {
            name: "Crowd Favorite Artist".to_string(),
            description: format!(
                "{} drew the most voters among guest recommendations.",
                favorite.artist
            ),
            song_id: None,
            music_name: None,
            music_artist: Some(favorite.artist.clone()),
            votes: Some(favorite.votes),
        });
    }

    if let Some(pick) = playlist.iter().find(|e| !e.is_user_recommendation) {
        awards.push(song_award(
            "DJ's Choice",
            "The first song the DJ put on the playlist.",
            pick,
        ));
    }

    awards
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, votes: u32, recommended: bool) -> PlaylistEntry {
        PlaylistEntry {
            id: format!("id-{name}"),
            name: name.to_string(),
            artist: format!("{name} artist"),
            genre: None,
            visible: true,
            votes,
            voter_ids: (0..votes).map(|n| format!("{name}-voter-{n}")).collect(),
            is_user_recommendation: recommended,
            recommender_id: if recommended { "guest".into() } else { "dj".into() },
            skip_votes: 0,
            skip_voter_ids: Vec::new(),
        }
    }

    #[test]
    fn leaderboard_orders_by_votes() {
        let playlist = vec![entry("Song A", 2, false), entry("Song B", 5, false)];
        let board = leaderboard(&playlist);
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[0].music_name, "Song B");
        assert_eq!(board[1].rank, 2);
        assert_eq!(board[1].music_name, "Song A");

        let awards = awards(&playlist);
        assert_eq!(awards[0].name, "Top Voted Song");
        assert_eq!(awards[0].music_name.as_deref(), Some("Song B"));
    }

    #[test]
    fn leaderboard_ties_keep_insertion_order() {
        let playlist = vec![
            entry("first", 1, false),
            entry("second", 3, false),
            entry("third", 1, false),
        ];
        let names: Vec<_> = leaderboard(&playlist).into_iter().map(|r| r.music_name).collect();
        assert_eq!(names, ["second", "first", "third"]);
    }

    #[test]
    fn recommendation_awards_need_guest_tracks() {
        let playlist = vec![entry("dj pick", 1, false), entry("other", 4, false)];
        let names: Vec<_> = awards(&playlist).into_iter().map(|a| a.name).collect();
        assert_eq!(names, ["Top Voted Song", "DJ's Choice"]);
    }

    #[test]
    fn all_four_awards_when_candidates_exist() {
        let playlist = vec![
            entry("guest low", 1, true),
            entry("dj pick", 0, false),
            entry("guest high", 3, true),
        ];
        let awards = awards(&playlist);
        assert_eq!(awards.len(), 4);
        assert_eq!(awards[1].music_name.as_deref(), Some("guest high"));
        assert_eq!(awards[2].music_artist.as_deref(), Some("guest high artist"));
        assert!(awards[2].song_id.is_none());
        assert_eq!(awards[3].music_name.as_deref(), Some("dj pick"));
    }

    #[test]
    fn empty_playlist_has_no_awards() {
        assert!(awards(&[]).is_empty());
        assert!(leaderboard(&[]).is_empty());
    }
}
