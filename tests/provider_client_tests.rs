//! Client behavior tests against a mock provider: caching (positive and
//! negative), not-found handling, token refresh, and rate-limit retries.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use jazz_discography_pipeline::services::clients::types::ArtworkLookup;
use jazz_discography_pipeline::{
    CoverArtClient, ItunesClient, JazzStandardsClient, MemoryCache, MusicBrainzClient,
    RetryPolicy, SpotifyClient, SpotifyCredentials,
};

fn fast() -> Duration {
    Duration::from_millis(1)
}

fn no_backoff() -> RetryPolicy {
    RetryPolicy::new(1, Duration::from_millis(5))
}

#[tokio::test]
async fn musicbrainz_recording_detail_hits_network_once() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/recording/rec-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "rec-1",
            "title": "Take Five",
            "first-release-date": "1959-09-21",
            "artist-credit": [
                {"name": "The Dave Brubeck Quartet", "artist": {"id": "g-1"}}
            ],
            "releases": [
                {"id": "rel-1", "title": "Time Out", "date": "1959"}
            ],
            "relations": [
                {"type": "instrument", "artist": {"id": "a-1", "name": "Paul Desmond"},
                 "attributes": ["alto saxophone"]}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = MusicBrainzClient::new(Arc::new(MemoryCache::new()))
        .with_base_url(server.uri())
        .with_tuning(fast(), no_backoff());

    // Two lookups, one network call: the second is served from cache.
    let first = client.recording_detail("rec-1").await.unwrap().unwrap();
    let second = client.recording_detail("rec-1").await.unwrap().unwrap();

    assert_eq!(first.title, "Take Five");
    assert_eq!(second.releases.len(), 1);
    assert_eq!(second.relations[0].attributes, vec!["alto saxophone"]);
}

#[tokio::test]
async fn musicbrainz_404_is_cached_negatively() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/recording/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = MusicBrainzClient::new(Arc::new(MemoryCache::new()))
        .with_base_url(server.uri())
        .with_tuning(fast(), no_backoff());

    // A 404, then an immediate re-request: exactly one network call.
    assert!(client.recording_detail("gone").await.unwrap().is_none());
    assert!(client.recording_detail("gone").await.unwrap().is_none());
}

#[tokio::test]
async fn musicbrainz_work_search_falls_back_to_unquoted_query() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/work/"))
        .and(query_param("query", "work:\"Take Five\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"works": []})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/work/"))
        .and(query_param("query", "Take Five"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "works": [
                {"id": "w-2", "title": "Take Ten"},
                {"id": "w-1", "title": "Take Five"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = MusicBrainzClient::new(Arc::new(MemoryCache::new()))
        .with_base_url(server.uri())
        .with_tuning(fast(), no_backoff());

    let work = client.search_work("Take Five", None).await.unwrap().unwrap();
    assert_eq!(work.id, "w-1");

    // The resolved match is cached; no further requests.
    let again = client.search_work("Take Five", None).await.unwrap().unwrap();
    assert_eq!(again.id, "w-1");
}

#[tokio::test]
async fn cover_art_404_is_a_negative_poll_result() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/release/no-art/"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = CoverArtClient::new(Arc::new(MemoryCache::new()))
        .with_base_url(server.uri())
        .with_tuning(fast(), no_backoff());

    assert!(matches!(
        client.release_artwork("no-art").await.unwrap(),
        ArtworkLookup::NoArtwork
    ));
    // Second poll comes from the negative cache.
    assert!(matches!(
        client.release_artwork("no-art").await.unwrap(),
        ArtworkLookup::NoArtwork
    ));
}

#[tokio::test]
async fn cover_art_images_are_normalized() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/release/has-art/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "images": [
                {"id": 42, "types": ["Front"],
                 "image": "http://caa.example/42.jpg",
                 "thumbnails": {"250": "http://caa.example/42-250.jpg",
                                 "500": "http://caa.example/42-500.jpg",
                                 "1200": "http://caa.example/42-1200.jpg"}}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = CoverArtClient::new(Arc::new(MemoryCache::new()))
        .with_base_url(server.uri())
        .with_tuning(fast(), no_backoff());

    let ArtworkLookup::Found(images) = client.release_artwork("has-art").await.unwrap() else {
        panic!("expected artwork");
    };
    assert_eq!(images.len(), 1);
    assert_eq!(
        images[0].large_url.as_deref(),
        Some("https://caa.example/42-1200.jpg")
    );
    assert_eq!(images[0].source_id.as_deref(), Some("42"));
}

#[tokio::test]
async fn spotify_refreshes_token_on_401() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh-token",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .expect(2)
        .mount(&server)
        .await;

    // First search is rejected with 401 (expired server-side), the retry
    // after re-auth succeeds.
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tracks": {"items": [
                {"id": "t-1", "name": "Take Five",
                 "artists": [{"name": "The Dave Brubeck Quartet"}],
                 "album": {"id": "al-1", "name": "Time Out"},
                 "external_urls": {"spotify": "https://open.spotify.com/track/t-1"}}
            ]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let credentials = SpotifyCredentials {
        client_id: "id".to_string(),
        client_secret: "secret".to_string(),
    };
    let client = SpotifyClient::new(credentials, Arc::new(MemoryCache::new()))
        .with_base_url(server.uri())
        .with_auth_url(format!("{}/api/token", server.uri()))
        .with_tuning(fast(), no_backoff());

    let hit = client
        .search_track("Take Five", Some("Time Out"), Some("Dave Brubeck"), Some(1959))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(hit.id, "t-1");
    assert_eq!(hit.album_id.as_deref(), Some("al-1"));
}

#[tokio::test]
async fn itunes_retries_on_403_rate_limit_signal() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(403))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resultCount": 1,
            "results": [
                {"collectionId": 7, "artistName": "Miles Davis",
                 "collectionName": "Kind of Blue",
                 "releaseDate": "1959-08-17T07:00:00Z",
                 "artworkUrl100": "https://is1.example/100x100bb.jpg",
                 "collectionViewUrl": "https://music.example/album/7"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ItunesClient::new(Arc::new(MemoryCache::new()))
        .with_base_url(server.uri())
        .with_tuning(fast(), no_backoff());

    let albums = client
        .search_albums("Miles Davis", Some("Kind of Blue"))
        .await
        .unwrap();

    assert_eq!(albums.len(), 1);
    assert_eq!(albums[0].id, "7");
    assert_eq!(albums[0].year, Some(1959));
}

#[tokio::test]
async fn editorial_song_page_tries_url_patterns_in_order() {
    let server = MockServer::start().await;

    // First pattern (compositions-t) is missing; second pattern hits.
    Mock::given(method("GET"))
        .and(path("/compositions-t/takefive.htm"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/compositions/takefive.htm"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body>
              <p>Music by Paul Desmond, introduced in 1959 by the quartet. This
              paragraph needs to run long enough to be picked up as the song
              description, well past one hundred characters of text.</p>
              <h3>Recommendations for this Tune</h3>
              <p>Dave Brubeck - Time Out (1959)</p>
            </body></html>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let client = JazzStandardsClient::new(Arc::new(MemoryCache::new()))
        .with_base_url(server.uri())
        .with_tuning(fast(), no_backoff());

    let page = client.song_page("Take Five").await.unwrap().unwrap();
    assert_eq!(page.composer.as_deref(), Some("Paul Desmond"));
    assert_eq!(page.year, Some(1959));
    assert_eq!(page.recommended_recordings.len(), 1);
    assert_eq!(page.recommended_recordings[0].album, "Time Out");

    // Both outcomes are cached: a second scrape makes no further requests.
    let again = client.song_page("Take Five").await.unwrap().unwrap();
    assert_eq!(again.composer.as_deref(), Some("Paul Desmond"));
}
