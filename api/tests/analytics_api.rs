mod common;

use axum::http::StatusCode;
use common::{add_track, body_json, build_test_app, create_event, get, post_empty, post_json, DJ};
use serde_json::{json, Value};

async fn seed(app: &axum::Router) -> String {
    let id = create_event(app, true, true).await;
    add_track(app, &id, "One", "A", "Rock").await;
    add_track(app, &id, "Two", "B", "Rock").await;
    add_track(app, &id, "Three", "C", "Pop").await;
    let guest_track = json!({ "name": "Four", "artist": "D" });
    post_json(app, &format!("/api/events/{id}/music"), "guest", guest_track).await;
    let votes = [
        ("u1", "One", "A"),
        ("u2", "Three", "C"),
        ("u3", "Three", "C"),
        ("u4", "Four", "D"),
    ];
    for (user, name, artist) in votes {
        let vote = json!({ "name": name, "artist": artist });
        let response = post_json(app, &format!("/api/events/{id}/vote"), user, vote).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    id
}

#[tokio::test]
async fn genre_popularity_and_top_songs() {
    let app = build_test_app(3);
    seed(&app).await;

    let genres = body_json(get(&app, "/api/analytics/genre-popularity").await).await;
    assert_eq!(
        genres,
        json!([
            { "genre": "Pop", "totalVotes": 2, "songCount": 1 },
            { "genre": "Rock", "totalVotes": 1, "songCount": 2 },
            { "genre": "Unknown", "totalVotes": 1, "songCount": 1 },
        ])
    );

    let top = body_json(get(&app, "/api/analytics/top-songs?topN=1").await).await;
    assert_eq!(top.as_array().unwrap().len(), 1);
    assert_eq!(top[0]["genre"], "Pop");
}

#[tokio::test]
async fn contributions_and_event_performance() {
    let app = build_test_app(3);
    let id = seed(&app).await;
    create_event(&app, true, false).await;

    let users = body_json(get(&app, "/api/analytics/user-contributions").await).await;
    let by_id = |user: &str| -> Value {
        users.as_array().unwrap().iter().find(|u| u["userId"] == user).cloned().unwrap()
    };
    assert_eq!(by_id(DJ)["recommendations"], 0);
    assert_eq!(by_id(DJ)["votes"], 3);
    assert_eq!(by_id("guest")["recommendations"], 1);
    assert_eq!(by_id("guest")["votes"], 1);

    let perf = body_json(get(&app, "/api/analytics/event-performance").await).await;
    let seeded = perf.as_array().unwrap().iter().find(|e| e["eventId"] == id.as_str()).unwrap();
    assert_eq!(seeded["totalSongs"], 4);
    assert_eq!(seeded["totalVotes"], 4);
    assert_eq!(seeded["averageVotesPerSong"], 1.0);
    let empty = perf.as_array().unwrap().iter().find(|e| e["eventId"] != id.as_str()).unwrap();
    assert_eq!(empty["averageVotesPerSong"], 0.0);
}

#[tokio::test]
async fn most_played_counts_recorded_plays() {
    let app = build_test_app(3);
    let most = body_json(get(&app, "/api/analytics/most-played").await).await;
    assert!(most.is_null());

    let one = json!({ "name": "One", "artist": "A" });
    let one = body_json(post_json(&app, "/api/songs", DJ, one).await).await;
    let two = json!({ "name": "Two", "artist": "B" });
    let two = body_json(post_json(&app, "/api/songs", DJ, two).await).await;
    let one_id = one["id"].as_str().unwrap();
    let two_id = two["id"].as_str().unwrap();

    for song in [one_id, two_id, two_id] {
        let response = post_empty(&app, &format!("/api/analytics/play/{song}"), DJ).await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }
    let response = post_empty(&app, "/api/analytics/play/missing", DJ).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let most = body_json(get(&app, "/api/analytics/most-played").await).await;
    assert_eq!(most["song"]["id"], two_id);
    assert_eq!(most["plays"], 2);
}

#[tokio::test]
async fn similar_songs_follow_the_dominant_genre() {
    let app = build_test_app(3);
    let id = seed(&app).await;
    for (name, genre) in [("Five", "Rock"), ("Six", "rock"), ("Seven", "Pop")] {
        let song = json!({ "name": name, "artist": "Z", "genre": genre });
        post_json(&app, "/api/songs", DJ, song).await;
    }

    let similar = body_json(get(&app, &format!("/api/events/{id}/similar")).await).await;
    let mut names: Vec<_> = similar
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    names.sort();
    assert_eq!(names, ["Five", "Six"]);
}

#[tokio::test]
async fn similar_songs_for_an_empty_playlist_sample_the_catalog() {
    let app = build_test_app(3);
    let id = create_event(&app, true, false).await;
    for n in 0..12 {
        let song = json!({ "name": format!("song {n}"), "artist": "Z" });
        post_json(&app, "/api/songs", DJ, song).await;
    }
    let similar = body_json(get(&app, &format!("/api/events/{id}/similar")).await).await;
    assert_eq!(similar.as_array().unwrap().len(), 10);
}
