use std::time::Duration;

use tubesync::{
    CatalogSource, ChannelId, EntityKind, PageToken, PageWalker, PlaylistId, SourceError, VideoId,
};
use tubesync_youtube::{YouTubeSource, YouTubeSourceConfig};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn source_for(server: &MockServer) -> YouTubeSource {
    YouTubeSource::new(YouTubeSourceConfig {
        api_key: "test-key".into(),
        api_base_url: Some(server.uri()),
        page_size: 2,
    })
}

fn json(fixture: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(fixture, "application/json")
}

#[tokio::test]
async fn get_channel_normalizes_the_only_result() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/channels"))
        .and(query_param("id", "UC1cnByKe24JjTv38tH_7BYw"))
        .and(query_param("part", "contentDetails,snippet"))
        .and(query_param("key", "test-key"))
        .respond_with(json(include_str!("fixtures/channels.json")))
        .expect(1)
        .mount(&server)
        .await;

    let source = source_for(&server);
    let channel = source
        .get_channel(&ChannelId::new("UC1cnByKe24JjTv38tH_7BYw"))
        .await
        .unwrap();

    assert_eq!(channel.id.as_str(), "UC1cnByKe24JjTv38tH_7BYw");
    assert_eq!(channel.handle.as_str(), "@izuho_omi");
    assert_eq!(channel.uploads_playlist_id.as_str(), "UU1cnByKe24JjTv38tH_7BYw");
}

#[tokio::test]
async fn uploads_playlist_is_derived_from_the_channel() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/channels"))
        .respond_with(json(include_str!("fixtures/channels.json")))
        .mount(&server)
        .await;

    let source = source_for(&server);
    let uploads = source
        .get_uploads_playlist(&ChannelId::new("UC1cnByKe24JjTv38tH_7BYw"))
        .await
        .unwrap();

    assert_eq!(uploads.id.as_str(), "UU1cnByKe24JjTv38tH_7BYw");
    assert!(uploads.is_uploads);
    assert_eq!(uploads.title, None);
}

#[tokio::test]
async fn get_channel_with_no_items_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/channels"))
        .respond_with(json(include_str!("fixtures/channels_empty.json")))
        .mount(&server)
        .await;

    let result = source_for(&server)
        .get_channel(&ChannelId::new("UCnobody"))
        .await;

    assert!(matches!(
        result,
        Err(SourceError::NotFound {
            kind: EntityKind::Channel,
            ..
        })
    ));
}

#[tokio::test]
async fn get_channel_with_two_items_is_ambiguous() {
    let server = MockServer::start().await;
    let body = r#"{
        "pageInfo": {"totalResults": 2},
        "items": [
            {"id": "UCa", "snippet": {"customUrl": "@a"}, "contentDetails": {"relatedPlaylists": {"uploads": "UUa"}}},
            {"id": "UCa", "snippet": {"customUrl": "@b"}, "contentDetails": {"relatedPlaylists": {"uploads": "UUb"}}}
        ]
    }"#;

    Mock::given(method("GET"))
        .and(path("/channels"))
        .respond_with(json(body))
        .mount(&server)
        .await;

    let result = source_for(&server).get_channel(&ChannelId::new("UCa")).await;

    assert!(matches!(result, Err(SourceError::Ambiguous { count: 2, .. })));
}

#[tokio::test]
async fn channel_without_uploads_playlist_fails_conversion() {
    let server = MockServer::start().await;
    let body = r#"{"items": [{"id": "UCa", "snippet": {"customUrl": "@a"}}]}"#;

    Mock::given(method("GET"))
        .and(path("/channels"))
        .respond_with(json(body))
        .mount(&server)
        .await;

    let result = source_for(&server).get_channel(&ChannelId::new("UCa")).await;

    assert!(matches!(
        result,
        Err(SourceError::Conversion {
            kind: EntityKind::Channel,
            ..
        })
    ));
}

#[tokio::test]
async fn playlist_items_follow_page_tokens() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/playlistItems"))
        .and(query_param("playlistId", "UU1"))
        .and(query_param("maxResults", "2"))
        .and(query_param("pageToken", "EAAaBlBUOkNBSQ"))
        .respond_with(json(include_str!("fixtures/playlist_items_page2.json")))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/playlistItems"))
        .and(query_param("playlistId", "UU1"))
        .and(query_param("maxResults", "2"))
        .respond_with(json(include_str!("fixtures/playlist_items_page1.json")))
        .expect(1)
        .mount(&server)
        .await;

    let source = source_for(&server);
    let playlist_id = PlaylistId::new("UU1");
    let ids = PageWalker::new()
        .collect("playlist items", |token: Option<PageToken>| {
            let source = &source;
            let playlist_id = &playlist_id;
            async move { source.list_video_ids(playlist_id, token.as_ref()).await }
        })
        .await
        .unwrap();

    assert_eq!(
        ids,
        vec![
            VideoId::new("vid00000001"),
            VideoId::new("vid00000002"),
            VideoId::new("vid00000003"),
        ]
    );
}

#[tokio::test]
async fn first_page_reports_total_and_next_token() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/playlistItems"))
        .respond_with(json(include_str!("fixtures/playlist_items_page1.json")))
        .mount(&server)
        .await;

    let page = source_for(&server)
        .list_video_ids(&PlaylistId::new("UU1"), None)
        .await
        .unwrap();

    assert_eq!(page.items.len(), 2);
    assert_eq!(page.total_results, 3);
    assert_eq!(page.next_page_token, Some(PageToken::new("EAAaBlBUOkNBSQ")));
}

#[tokio::test]
async fn list_playlists_keeps_titles() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/playlists"))
        .and(query_param("channelId", "UC1"))
        .and(query_param("part", "snippet"))
        .respond_with(json(include_str!("fixtures/playlists.json")))
        .mount(&server)
        .await;

    let page = source_for(&server)
        .list_playlists(&ChannelId::new("UC1"), None)
        .await
        .unwrap();

    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].title.as_deref(), Some("Singing streams"));
    assert!(!page.items[0].is_uploads);
    assert_eq!(page.next_page_token, None);
}

#[tokio::test]
async fn list_videos_requests_all_parts_for_the_batch() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/videos"))
        .and(query_param("id", "vid00000001,vid00000002"))
        .and(query_param("part", "contentDetails,snippet,liveStreamingDetails"))
        .respond_with(json(include_str!("fixtures/videos.json")))
        .expect(1)
        .mount(&server)
        .await;

    let ids = vec![VideoId::new("vid00000001"), VideoId::new("vid00000002")];
    let page = source_for(&server).list_videos(&ids, None).await.unwrap();

    let [cover, stream] = page.items.as_slice() else {
        panic!("expected two videos, got {}", page.items.len());
    };
    assert_eq!(cover.duration, Duration::from_secs(253));
    assert!(cover.thumbnails.default.is_some());
    assert!(cover.thumbnails.maxres.is_some());
    assert!(cover.thumbnails.medium.is_none());
    assert!(cover.live_streaming_details.is_none());

    assert_eq!(stream.duration, Duration::from_secs(7260));
    let details = stream.live_streaming_details.as_ref().unwrap();
    assert_eq!(
        details.actual_end_time.to_rfc3339(),
        "2024-05-02T22:02:30+00:00"
    );
}

#[tokio::test]
async fn list_videos_rejects_oversized_batch_without_a_request() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(json(include_str!("fixtures/videos.json")))
        .expect(0)
        .mount(&server)
        .await;

    let ids: Vec<VideoId> = (0..51).map(|i| VideoId::new(format!("v{i}"))).collect();
    let result = source_for(&server).list_videos(&ids, None).await;

    assert!(matches!(result, Err(SourceError::InvalidArgument(_))));
}

#[tokio::test]
async fn unconvertible_video_fails_the_page() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/videos"))
        .respond_with(json(include_str!("fixtures/videos_bad_duration.json")))
        .mount(&server)
        .await;

    let result = source_for(&server)
        .list_videos(&[VideoId::new("vid00000009")], None)
        .await;

    match result {
        Err(SourceError::Conversion { kind, id, error }) => {
            assert_eq!(kind, EntityKind::Video);
            assert_eq!(id, "vid00000009");
            assert_eq!(error.value, "P1Y");
        }
        other => panic!("expected a conversion error, got {other:?}"),
    }
}

#[tokio::test]
async fn http_404_maps_to_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/playlistItems"))
        .respond_with(ResponseTemplate::new(404).set_body_string("playlistNotFound"))
        .mount(&server)
        .await;

    let result = source_for(&server)
        .list_video_ids(&PlaylistId::new("PLmissing"), None)
        .await;

    assert!(matches!(
        result,
        Err(SourceError::NotFound {
            kind: EntityKind::Playlist,
            ref id,
        }) if id == "PLmissing"
    ));
}

#[tokio::test]
async fn server_error_maps_to_retryable_transport() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/videos"))
        .respond_with(ResponseTemplate::new(503).set_body_string("backend unavailable"))
        .mount(&server)
        .await;

    let err = source_for(&server)
        .list_videos(&[VideoId::new("vid00000001")], None)
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    let SourceError::Transport(message) = err else {
        panic!("expected a transport error, got {err:?}");
    };
    assert!(message.contains("503"));
    assert!(message.contains("backend unavailable"));
}

#[tokio::test]
async fn quota_error_maps_to_transport() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/channels"))
        .respond_with(ResponseTemplate::new(403).set_body_string("quotaExceeded"))
        .mount(&server)
        .await;

    let result = source_for(&server).get_channel(&ChannelId::new("UC1")).await;

    assert!(matches!(result, Err(SourceError::Transport(_))));
}

#[tokio::test]
async fn malformed_body_maps_to_protocol() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/channels"))
        .respond_with(json("{not json"))
        .mount(&server)
        .await;

    let result = source_for(&server).get_channel(&ChannelId::new("UC1")).await;

    assert!(matches!(result, Err(SourceError::Protocol(_))));
}

#[tokio::test]
async fn unreachable_host_maps_to_transport() {
    let source = YouTubeSource::new(YouTubeSourceConfig {
        api_base_url: Some("http://127.0.0.1:1".into()),
        ..YouTubeSourceConfig::new("test-key")
    });

    let result = source.get_channel(&ChannelId::new("UC1")).await;

    assert!(matches!(result, Err(SourceError::Transport(_))));
}
