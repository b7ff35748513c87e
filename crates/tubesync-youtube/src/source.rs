use serde::de::DeserializeOwned;
use tubesync::normalize::{self, RawChannel, RawPlaylist, RawPlaylistItem, RawVideo};
use tubesync::{
    CatalogSource, Channel, ChannelId, EntityKind, MAX_PAGE_SIZE, Page, PageToken, Playlist,
    PlaylistId, SourceError, Video, VideoId,
};
use url::Url;

use crate::response::ListResponse;

const DEFAULT_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

const CHANNEL_PARTS: &str = "contentDetails,snippet";
const PLAYLIST_PARTS: &str = "snippet";
const PLAYLIST_ITEM_PARTS: &str = "snippet";
const VIDEO_PARTS: &str = "contentDetails,snippet,liveStreamingDetails";

/// Configuration for the YouTube Data API source.
#[derive(Debug, Clone)]
pub struct YouTubeSourceConfig {
    pub api_key: String,
    pub api_base_url: Option<String>,
    /// `maxResults` for paged listings. Clamped to `1..=50`.
    pub page_size: usize,
}

impl YouTubeSourceConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base_url: None,
            page_size: MAX_PAGE_SIZE,
        }
    }
}

/// Reads channels, playlists and videos from the YouTube Data API v3.
pub struct YouTubeSource {
    config: YouTubeSourceConfig,
    client: reqwest::Client,
}

impl YouTubeSource {
    pub fn new(config: YouTubeSourceConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn api_base(&self) -> &str {
        self.config
            .api_base_url
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE)
    }

    fn page_size(&self) -> usize {
        self.config.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    fn build_url(&self, resource: &str, params: &[(&str, &str)]) -> Result<Url, SourceError> {
        let base = self.api_base().trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}/{resource}")).map_err(|e| {
            SourceError::InvalidArgument(format!("invalid API base url {base}: {e}"))
        })?;

        url.query_pairs_mut()
            .extend_pairs(params)
            .append_pair("key", &self.config.api_key);

        Ok(url)
    }

    /// Issue one `list` call. A 404 becomes `NotFound` for `missing`.
    async fn list<T: DeserializeOwned>(
        &self,
        resource: &str,
        params: &[(&str, &str)],
        missing: (EntityKind, &str),
    ) -> Result<ListResponse<T>, SourceError> {
        let url = self.build_url(resource, params)?;

        tracing::debug!(resource, ?params, "youtube request");

        let response = self
            .client
            .get(url)
            .header("User-Agent", "tubesync")
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        if response.status().as_u16() == 404 {
            let (kind, id) = missing;
            return Err(SourceError::not_found(kind, id));
        }

        if !response.status().is_success() {
            return Err(SourceError::Transport(format!(
                "HTTP {}: {}",
                response.status(),
                response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".into())
            )));
        }

        response
            .json()
            .await
            .map_err(|e| SourceError::Protocol(format!("undecodable {resource} response: {e}")))
    }

    fn page<T>(items: Vec<T>, response_token: Option<String>, total: u64) -> Page<T> {
        let next = response_token
            .filter(|t| !t.is_empty())
            .map(PageToken::new);
        Page::new(items, total, next)
    }
}

#[async_trait::async_trait]
impl CatalogSource for YouTubeSource {
    async fn get_channel(&self, channel_id: &ChannelId) -> Result<Channel, SourceError> {
        let response: ListResponse<RawChannel> = self
            .list(
                "channels",
                &[("part", CHANNEL_PARTS), ("id", channel_id.as_str())],
                (EntityKind::Channel, channel_id.as_str()),
            )
            .await?;

        let raw = tubesync::source::expect_single(
            response.items,
            EntityKind::Channel,
            channel_id.as_str(),
        )?;

        normalize::channel(&raw).map_err(|error| SourceError::Conversion {
            kind: EntityKind::Channel,
            id: raw.id.clone(),
            error,
        })
    }

    async fn get_playlist(&self, playlist_id: &PlaylistId) -> Result<Playlist, SourceError> {
        let response: ListResponse<RawPlaylist> = self
            .list(
                "playlists",
                &[("part", PLAYLIST_PARTS), ("id", playlist_id.as_str())],
                (EntityKind::Playlist, playlist_id.as_str()),
            )
            .await?;

        let raw = tubesync::source::expect_single(
            response.items,
            EntityKind::Playlist,
            playlist_id.as_str(),
        )?;

        Ok(normalize::playlist(&raw))
    }

    async fn list_playlists(
        &self,
        channel_id: &ChannelId,
        page_token: Option<&PageToken>,
    ) -> Result<Page<Playlist>, SourceError> {
        let max_results = self.page_size().to_string();
        let mut params = vec![
            ("part", PLAYLIST_PARTS),
            ("channelId", channel_id.as_str()),
            ("maxResults", max_results.as_str()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token.as_str()));
        }

        let response: ListResponse<RawPlaylist> = self
            .list(
                "playlists",
                &params,
                (EntityKind::Channel, channel_id.as_str()),
            )
            .await?;

        let playlists = response.items.iter().map(normalize::playlist).collect();
        Ok(Self::page(
            playlists,
            response.next_page_token,
            response.page_info.total_results,
        ))
    }

    async fn list_video_ids(
        &self,
        playlist_id: &PlaylistId,
        page_token: Option<&PageToken>,
    ) -> Result<Page<VideoId>, SourceError> {
        let max_results = self.page_size().to_string();
        let mut params = vec![
            ("part", PLAYLIST_ITEM_PARTS),
            ("playlistId", playlist_id.as_str()),
            ("maxResults", max_results.as_str()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token.as_str()));
        }

        let response: ListResponse<RawPlaylistItem> = self
            .list(
                "playlistItems",
                &params,
                (EntityKind::Playlist, playlist_id.as_str()),
            )
            .await?;

        let video_ids = response
            .items
            .iter()
            .map(|item| {
                normalize::playlist_item_video_id(item).map_err(|error| {
                    SourceError::Conversion {
                        kind: EntityKind::PlaylistVideo,
                        id: format!("{playlist_id}/{}", item.id),
                        error,
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::page(
            video_ids,
            response.next_page_token,
            response.page_info.total_results,
        ))
    }

    async fn list_videos(
        &self,
        video_ids: &[VideoId],
        page_token: Option<&PageToken>,
    ) -> Result<Page<Video>, SourceError> {
        tubesync::source::check_video_batch(video_ids)?;
        if video_ids.is_empty() {
            return Ok(Page::last(Vec::new()));
        }

        let ids = video_ids
            .iter()
            .map(VideoId::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let mut params = vec![("part", VIDEO_PARTS), ("id", ids.as_str())];
        if let Some(token) = page_token {
            params.push(("pageToken", token.as_str()));
        }

        let response: ListResponse<RawVideo> = self
            .list("videos", &params, (EntityKind::Video, ids.as_str()))
            .await?;

        let videos = response
            .items
            .iter()
            .map(|raw| {
                normalize::video(raw).map_err(|error| SourceError::Conversion {
                    kind: EntityKind::Video,
                    id: raw.id.clone(),
                    error,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if videos.len() < video_ids.len() && page_token.is_none() {
            tracing::debug!(
                requested = video_ids.len(),
                returned = videos.len(),
                "some requested videos were not returned"
            );
        }

        Ok(Self::page(
            videos,
            response.next_page_token,
            response.page_info.total_results,
        ))
    }
}
