use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{TimeZone, Utc};

use crate::model::{
    Channel, ChannelHandle, ChannelId, EntityKind, LiveStreamingDetails, Page, PageToken,
    Playlist, PlaylistId, Thumbnails, Video, VideoId,
};
use crate::normalize::ConversionError;
use crate::sink::{CatalogSink, SinkError};
use crate::source::{CatalogSource, MAX_PAGE_SIZE, SourceError, check_video_batch};
use crate::sync::PersistCounts;

/// A plain video fixture with a deterministic publish time.
pub fn sample_video(id: &str) -> Video {
    Video {
        id: VideoId::new(id),
        title: format!("Video {id}"),
        description: format!("Description of {id}"),
        duration: Duration::from_secs(300),
        thumbnails: Thumbnails {
            default: url::Url::parse(&format!("https://i.ytimg.com/vi/{id}/default.jpg")).ok(),
            ..Thumbnails::default()
        },
        live_streaming_details: None,
        published_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    }
}

/// A video of a broadcast that has ended.
pub fn sample_live_video(id: &str) -> Video {
    Video {
        live_streaming_details: Some(LiveStreamingDetails {
            actual_start_time: Utc.with_ymd_and_hms(2024, 1, 1, 20, 1, 0).unwrap(),
            actual_end_time: Utc.with_ymd_and_hms(2024, 1, 1, 22, 0, 0).unwrap(),
            scheduled_start_time: Utc.with_ymd_and_hms(2024, 1, 1, 20, 0, 0).unwrap(),
        }),
        ..sample_video(id)
    }
}

pub fn sample_channel(id: &str) -> Channel {
    Channel {
        id: ChannelId::new(id),
        handle: ChannelHandle::new(format!("@{}", id.to_lowercase())),
        uploads_playlist_id: PlaylistId::new(format!("UU{id}")),
    }
}

/// Call counters of an [`InMemorySource`].
#[derive(Debug, Default)]
pub struct SourceCalls {
    pub get_channel: AtomicUsize,
    pub get_playlist: AtomicUsize,
    pub list_playlists: AtomicUsize,
    pub list_video_ids: AtomicUsize,
    pub list_videos: AtomicUsize,
}

impl SourceCalls {
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// In-memory source for testing. Pages are cut at `page_size` items and
/// continuation tokens encode the offset of the next page.
pub struct InMemorySource {
    channels: Vec<Channel>,
    playlists: HashMap<ChannelId, Vec<Playlist>>,
    playlist_items: HashMap<PlaylistId, Vec<VideoId>>,
    videos: HashMap<VideoId, Video>,
    page_size: usize,
    cyclic_playlists: Vec<PlaylistId>,
    broken_videos: Vec<VideoId>,
    offline: bool,
    calls: SourceCalls,
    video_batches: Mutex<Vec<usize>>,
}

impl Default for InMemorySource {
    fn default() -> Self {
        Self {
            channels: Vec::new(),
            playlists: HashMap::new(),
            playlist_items: HashMap::new(),
            videos: HashMap::new(),
            page_size: MAX_PAGE_SIZE,
            cyclic_playlists: Vec::new(),
            broken_videos: Vec::new(),
            offline: false,
            calls: SourceCalls::default(),
            video_batches: Mutex::new(Vec::new()),
        }
    }
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Add a channel whose uploads playlist holds `videos`, in order.
    pub fn add_channel(&mut self, channel: Channel, videos: Vec<Video>) {
        let ids = videos.iter().map(|v| v.id.clone()).collect();
        self.playlist_items
            .insert(channel.uploads_playlist_id.clone(), ids);
        for video in videos {
            self.videos.insert(video.id.clone(), video);
        }
        self.channels.push(channel);
    }

    /// Add a second channel record with an existing id.
    pub fn add_duplicate_channel(&mut self, channel: Channel) {
        self.channels.push(channel);
    }

    pub fn add_playlist(&mut self, channel_id: &ChannelId, playlist: Playlist, items: Vec<VideoId>) {
        self.playlist_items.insert(playlist.id.clone(), items);
        self.playlists
            .entry(channel_id.clone())
            .or_default()
            .push(playlist);
    }

    /// Make a playlist hand back the token it was called with.
    pub fn make_cyclic(&mut self, playlist_id: &PlaylistId) {
        self.cyclic_playlists.push(playlist_id.clone());
    }

    /// Make any `list_videos` page containing this video fail conversion.
    pub fn break_video(&mut self, video_id: &VideoId) {
        self.broken_videos.push(video_id.clone());
    }

    /// Fail every call with a transport error.
    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    pub fn calls(&self) -> &SourceCalls {
        &self.calls
    }

    /// Sizes of the id batches passed to `list_videos` (first page of each walk).
    pub fn video_batches(&self) -> Vec<usize> {
        self.video_batches.lock().unwrap().clone()
    }

    fn check_online(&self) -> Result<(), SourceError> {
        if self.offline {
            return Err(SourceError::Transport("source is offline".into()));
        }
        Ok(())
    }

    fn page_of<T: Clone>(&self, all: &[T], token: Option<&PageToken>) -> Result<Page<T>, SourceError> {
        let offset = match token {
            None => 0,
            Some(token) => token
                .as_str()
                .strip_prefix("offset:")
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| SourceError::InvalidArgument(format!("unknown page token {token}")))?,
        };
        let end = (offset + self.page_size).min(all.len());
        let items = all.get(offset..end).unwrap_or_default().to_vec();
        let next = (end < all.len()).then(|| PageToken::new(format!("offset:{end}")));
        Ok(Page::new(items, all.len() as u64, next))
    }
}

#[async_trait::async_trait]
impl CatalogSource for InMemorySource {
    async fn get_channel(&self, channel_id: &ChannelId) -> Result<Channel, SourceError> {
        self.calls.get_channel.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;

        let matches: Vec<Channel> = self
            .channels
            .iter()
            .filter(|c| &c.id == channel_id)
            .cloned()
            .collect();
        crate::source::expect_single(matches, EntityKind::Channel, channel_id.as_str())
    }

    async fn get_playlist(&self, playlist_id: &PlaylistId) -> Result<Playlist, SourceError> {
        self.calls.get_playlist.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;

        let matches: Vec<Playlist> = self
            .playlists
            .values()
            .flatten()
            .filter(|p| &p.id == playlist_id)
            .cloned()
            .collect();
        crate::source::expect_single(matches, EntityKind::Playlist, playlist_id.as_str())
    }

    async fn list_playlists(
        &self,
        channel_id: &ChannelId,
        page_token: Option<&PageToken>,
    ) -> Result<Page<Playlist>, SourceError> {
        self.calls.list_playlists.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;

        let all = self.playlists.get(channel_id).cloned().unwrap_or_default();
        self.page_of(&all, page_token)
    }

    async fn list_video_ids(
        &self,
        playlist_id: &PlaylistId,
        page_token: Option<&PageToken>,
    ) -> Result<Page<VideoId>, SourceError> {
        self.calls.list_video_ids.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;

        let all = self
            .playlist_items
            .get(playlist_id)
            .ok_or_else(|| SourceError::not_found(EntityKind::Playlist, playlist_id.as_str()))?;

        if self.cyclic_playlists.contains(playlist_id) {
            let token = page_token
                .cloned()
                .unwrap_or_else(|| PageToken::new("offset:0"));
            let page = self.page_of(all, page_token)?;
            return Ok(Page::new(page.items, page.total_results, Some(token)));
        }

        self.page_of(all, page_token)
    }

    async fn list_videos(
        &self,
        video_ids: &[VideoId],
        page_token: Option<&PageToken>,
    ) -> Result<Page<Video>, SourceError> {
        check_video_batch(video_ids)?;
        self.calls.list_videos.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        if page_token.is_none() {
            self.video_batches.lock().unwrap().push(video_ids.len());
        }

        let found: Vec<Video> = video_ids
            .iter()
            .filter_map(|id| self.videos.get(id).cloned())
            .collect();
        let page = self.page_of(&found, page_token)?;

        if let Some(broken) = page.items.iter().find(|v| self.broken_videos.contains(&v.id)) {
            return Err(SourceError::Conversion {
                kind: EntityKind::Video,
                id: broken.id.to_string(),
                error: ConversionError {
                    field: "duration",
                    value: "forever".into(),
                    reason: "not an ISO-8601 duration".into(),
                },
            });
        }

        Ok(page)
    }
}

#[derive(Debug, Default)]
struct SinkState {
    channels: Vec<Channel>,
    playlists: Vec<(ChannelId, Playlist)>,
    videos: Vec<Video>,
    playlist_videos: Vec<(PlaylistId, VideoId)>,
    live_streaming_details: Vec<(VideoId, LiveStreamingDetails)>,
}

/// In-memory sink for testing. Enforces primary keys and references the
/// same way the SQLite store does.
#[derive(Debug, Default)]
pub struct InMemorySink {
    state: Mutex<SinkState>,
    failing_kind: Mutex<Option<EntityKind>>,
    writes: AtomicUsize,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write of `kind` fail with a database error.
    pub fn fail_writes_of(&self, kind: EntityKind) {
        *self.failing_kind.lock().unwrap() = Some(kind);
    }

    pub fn heal(&self) {
        *self.failing_kind.lock().unwrap() = None;
    }

    /// Successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Rows currently stored, per kind.
    pub fn row_counts(&self) -> PersistCounts {
        let state = self.state.lock().unwrap();
        PersistCounts {
            channels: state.channels.len() as u64,
            playlists: state.playlists.len() as u64,
            videos: state.videos.len() as u64,
            playlist_videos: state.playlist_videos.len() as u64,
            live_streaming_details: state.live_streaming_details.len() as u64,
        }
    }

    fn check_failure(&self, kind: EntityKind) -> Result<(), SinkError> {
        if *self.failing_kind.lock().unwrap() == Some(kind) {
            return Err(SinkError::Database(format!("injected failure writing {kind}")));
        }
        Ok(())
    }

    fn written(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

fn missing_reference(kind: EntityKind, id: &str) -> SinkError {
    SinkError::Database(format!("FOREIGN KEY constraint failed: {kind} {id}"))
}

impl SinkState {
    fn video(&self, video_id: &VideoId) -> Option<Video> {
        let mut video = self.videos.iter().find(|v| &v.id == video_id)?.clone();
        video.live_streaming_details = self
            .live_streaming_details
            .iter()
            .find(|(id, _)| id == video_id)
            .map(|(_, d)| d.clone());
        Some(video)
    }
}

#[async_trait::async_trait]
impl CatalogSink for InMemorySink {
    async fn create_channel(&self, channel: &Channel) -> Result<(), SinkError> {
        self.check_failure(EntityKind::Channel)?;
        let mut state = self.state.lock().unwrap();
        if state.channels.iter().any(|c| c.id == channel.id) {
            return Err(SinkError::conflict(EntityKind::Channel, channel.id.as_str()));
        }
        state.channels.push(channel.clone());
        self.written();
        Ok(())
    }

    async fn get_channel(&self, channel_id: &ChannelId) -> Result<Channel, SinkError> {
        let state = self.state.lock().unwrap();
        state
            .channels
            .iter()
            .find(|c| &c.id == channel_id)
            .cloned()
            .ok_or_else(|| SinkError::not_found(EntityKind::Channel, channel_id.as_str()))
    }

    async fn get_channel_by_handle(&self, handle: &ChannelHandle) -> Result<Channel, SinkError> {
        let state = self.state.lock().unwrap();
        state
            .channels
            .iter()
            .find(|c| &c.handle == handle)
            .cloned()
            .ok_or_else(|| SinkError::not_found(EntityKind::Channel, handle.as_str()))
    }

    async fn create_playlist(
        &self,
        channel_id: &ChannelId,
        playlist: &Playlist,
    ) -> Result<(), SinkError> {
        self.check_failure(EntityKind::Playlist)?;
        let mut state = self.state.lock().unwrap();
        if state.playlists.iter().any(|(_, p)| p.id == playlist.id) {
            return Err(SinkError::conflict(EntityKind::Playlist, playlist.id.as_str()));
        }
        if !state.channels.iter().any(|c| &c.id == channel_id) {
            return Err(missing_reference(EntityKind::Channel, channel_id.as_str()));
        }
        state.playlists.push((channel_id.clone(), playlist.clone()));
        self.written();
        Ok(())
    }

    async fn get_playlist(&self, playlist_id: &PlaylistId) -> Result<Playlist, SinkError> {
        let state = self.state.lock().unwrap();
        state
            .playlists
            .iter()
            .find(|(_, p)| &p.id == playlist_id)
            .map(|(_, p)| p.clone())
            .ok_or_else(|| SinkError::not_found(EntityKind::Playlist, playlist_id.as_str()))
    }

    async fn get_uploads_playlist(&self, channel_id: &ChannelId) -> Result<Playlist, SinkError> {
        let state = self.state.lock().unwrap();
        state
            .playlists
            .iter()
            .find(|(c, p)| c == channel_id && p.is_uploads)
            .map(|(_, p)| p.clone())
            .ok_or_else(|| SinkError::not_found(EntityKind::Playlist, channel_id.as_str()))
    }

    async fn list_playlists(&self, channel_id: &ChannelId) -> Result<Vec<Playlist>, SinkError> {
        let state = self.state.lock().unwrap();
        if !state.channels.iter().any(|c| &c.id == channel_id) {
            return Err(SinkError::not_found(EntityKind::Channel, channel_id.as_str()));
        }
        Ok(state
            .playlists
            .iter()
            .filter(|(c, _)| c == channel_id)
            .map(|(_, p)| p.clone())
            .collect())
    }

    async fn create_video(&self, video: &Video) -> Result<(), SinkError> {
        self.check_failure(EntityKind::Video)?;
        let mut state = self.state.lock().unwrap();
        if state.videos.iter().any(|v| v.id == video.id) {
            return Err(SinkError::conflict(EntityKind::Video, video.id.as_str()));
        }
        if let Some(details) = &video.live_streaming_details {
            self.check_failure(EntityKind::LiveStreamingDetails)?;
            state
                .live_streaming_details
                .push((video.id.clone(), details.clone()));
        }
        state.videos.push(Video {
            live_streaming_details: None,
            ..video.clone()
        });
        self.written();
        Ok(())
    }

    async fn get_video(&self, video_id: &VideoId) -> Result<Video, SinkError> {
        let state = self.state.lock().unwrap();
        state
            .video(video_id)
            .ok_or_else(|| SinkError::not_found(EntityKind::Video, video_id.as_str()))
    }

    async fn list_videos(&self, video_ids: &[VideoId]) -> Result<Vec<Video>, SinkError> {
        let state = self.state.lock().unwrap();
        Ok(video_ids.iter().filter_map(|id| state.video(id)).collect())
    }

    async fn create_playlist_video(
        &self,
        playlist_id: &PlaylistId,
        video_id: &VideoId,
    ) -> Result<(), SinkError> {
        self.check_failure(EntityKind::PlaylistVideo)?;
        let mut state = self.state.lock().unwrap();
        if state
            .playlist_videos
            .iter()
            .any(|(p, v)| p == playlist_id && v == video_id)
        {
            return Err(SinkError::conflict(
                EntityKind::PlaylistVideo,
                format!("{playlist_id}/{video_id}"),
            ));
        }
        if !state.playlists.iter().any(|(_, p)| &p.id == playlist_id) {
            return Err(missing_reference(EntityKind::Playlist, playlist_id.as_str()));
        }
        if !state.videos.iter().any(|v| &v.id == video_id) {
            return Err(missing_reference(EntityKind::Video, video_id.as_str()));
        }
        state
            .playlist_videos
            .push((playlist_id.clone(), video_id.clone()));
        self.written();
        Ok(())
    }

    async fn list_video_ids_by_playlist(
        &self,
        playlist_id: &PlaylistId,
    ) -> Result<Vec<VideoId>, SinkError> {
        let state = self.state.lock().unwrap();
        if !state.playlists.iter().any(|(_, p)| &p.id == playlist_id) {
            return Err(SinkError::not_found(EntityKind::Playlist, playlist_id.as_str()));
        }
        Ok(state
            .playlist_videos
            .iter()
            .filter(|(p, _)| p == playlist_id)
            .map(|(_, v)| v.clone())
            .collect())
    }

    async fn create_live_streaming_details(
        &self,
        video_id: &VideoId,
        details: &LiveStreamingDetails,
    ) -> Result<(), SinkError> {
        self.check_failure(EntityKind::LiveStreamingDetails)?;
        let mut state = self.state.lock().unwrap();
        if state.live_streaming_details.iter().any(|(v, _)| v == video_id) {
            return Err(SinkError::conflict(
                EntityKind::LiveStreamingDetails,
                video_id.as_str(),
            ));
        }
        if !state.videos.iter().any(|v| &v.id == video_id) {
            return Err(missing_reference(EntityKind::Video, video_id.as_str()));
        }
        state
            .live_streaming_details
            .push((video_id.clone(), details.clone()));
        self.written();
        Ok(())
    }

    async fn get_live_streaming_details(
        &self,
        video_id: &VideoId,
    ) -> Result<LiveStreamingDetails, SinkError> {
        let state = self.state.lock().unwrap();
        state
            .live_streaming_details
            .iter()
            .find(|(v, _)| v == video_id)
            .map(|(_, d)| d.clone())
            .ok_or_else(|| {
                SinkError::not_found(EntityKind::LiveStreamingDetails, video_id.as_str())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn source_pages_video_ids_at_page_size() {
        let mut source = InMemorySource::new().with_page_size(2);
        let videos = (0..5).map(|i| sample_video(&format!("v{i}"))).collect();
        source.add_channel(sample_channel("C1"), videos);
        let uploads = PlaylistId::new("UUC1");

        let first = source.list_video_ids(&uploads, None).await.unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.total_results, 5);

        let second = source
            .list_video_ids(&uploads, first.next_page_token.as_ref())
            .await
            .unwrap();
        assert_eq!(second.items[0].as_str(), "v2");
    }

    #[tokio::test]
    async fn source_reports_ambiguous_channel() {
        let mut source = InMemorySource::new();
        source.add_channel(sample_channel("C1"), vec![]);
        source.add_duplicate_channel(sample_channel("C1"));

        let result = source.get_channel(&ChannelId::new("C1")).await;
        assert!(matches!(result, Err(SourceError::Ambiguous { count: 2, .. })));
    }

    #[tokio::test]
    async fn source_rejects_oversized_batch_without_counting_a_call() {
        let source = InMemorySource::new();
        let ids: Vec<VideoId> = (0..51).map(|i| VideoId::new(format!("v{i}"))).collect();

        let result = source.list_videos(&ids, None).await;
        assert!(matches!(result, Err(SourceError::InvalidArgument(_))));
        assert_eq!(SourceCalls::count(&source.calls().list_videos), 0);
    }

    #[tokio::test]
    async fn sink_rejects_duplicate_channel() {
        let sink = InMemorySink::new();
        sink.create_channel(&sample_channel("C1")).await.unwrap();

        let result = sink.create_channel(&sample_channel("C1")).await;
        assert!(matches!(result, Err(SinkError::Conflict { .. })));
    }

    #[tokio::test]
    async fn sink_requires_referenced_rows() {
        let sink = InMemorySink::new();
        let result = sink
            .create_playlist_video(&PlaylistId::new("PL1"), &VideoId::new("v1"))
            .await;
        assert!(matches!(result, Err(SinkError::Database(_))));
    }

    #[tokio::test]
    async fn sink_lists_under_unknown_parent_are_not_found() {
        let sink = InMemorySink::new();
        let channel = sample_channel("C1");
        sink.create_channel(&channel).await.unwrap();

        assert!(sink.list_playlists(&channel.id).await.unwrap().is_empty());
        assert!(matches!(
            sink.list_playlists(&ChannelId::new("nobody")).await,
            Err(SinkError::NotFound {
                kind: EntityKind::Channel,
                ..
            })
        ));
        assert!(matches!(
            sink.list_video_ids_by_playlist(&PlaylistId::new("PL1")).await,
            Err(SinkError::NotFound {
                kind: EntityKind::Playlist,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn sink_round_trips_live_details_with_video() {
        let sink = InMemorySink::new();
        let video = sample_live_video("live1");
        sink.create_video(&video).await.unwrap();

        assert_eq!(sink.get_video(&video.id).await.unwrap(), video);
        assert_eq!(sink.row_counts().live_streaming_details, 1);
    }
}
