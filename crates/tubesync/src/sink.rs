use std::sync::Arc;

use crate::model::{
    Channel, ChannelHandle, ChannelId, EntityKind, LiveStreamingDetails, Playlist, PlaylistId,
    Video, VideoId,
};

/// Errors that can occur when reading from or writing to a catalog sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("{kind} already exists: {id}")]
    Conflict { kind: EntityKind, id: String },

    #[error("stored value could not be converted: {0}")]
    Conversion(String),

    #[error("database error: {0}")]
    Database(String),
}

impl SinkError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn conflict(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::Conflict {
            kind,
            id: id.into(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Persistent storage for the catalog.
///
/// Entities are append-only: every `create_*` fails with
/// [`SinkError::Conflict`] when the key already exists, and there is no
/// update. Listings return children in insertion order.
#[async_trait::async_trait]
pub trait CatalogSink: Send + Sync {
    async fn create_channel(&self, channel: &Channel) -> Result<(), SinkError>;

    async fn get_channel(&self, channel_id: &ChannelId) -> Result<Channel, SinkError>;

    async fn get_channel_by_handle(&self, handle: &ChannelHandle) -> Result<Channel, SinkError>;

    async fn create_playlist(
        &self,
        channel_id: &ChannelId,
        playlist: &Playlist,
    ) -> Result<(), SinkError>;

    async fn get_playlist(&self, playlist_id: &PlaylistId) -> Result<Playlist, SinkError>;

    async fn get_uploads_playlist(&self, channel_id: &ChannelId) -> Result<Playlist, SinkError>;

    async fn list_playlists(&self, channel_id: &ChannelId) -> Result<Vec<Playlist>, SinkError>;

    /// Store a video together with its live streaming details, if any.
    /// Either both are written or neither is.
    async fn create_video(&self, video: &Video) -> Result<(), SinkError>;

    async fn get_video(&self, video_id: &VideoId) -> Result<Video, SinkError>;

    /// Stored videos among `video_ids`, in the order given. Unknown ids are skipped.
    async fn list_videos(&self, video_ids: &[VideoId]) -> Result<Vec<Video>, SinkError>;

    async fn create_playlist_video(
        &self,
        playlist_id: &PlaylistId,
        video_id: &VideoId,
    ) -> Result<(), SinkError>;

    /// Video ids of a playlist in the order they were added.
    async fn list_video_ids_by_playlist(
        &self,
        playlist_id: &PlaylistId,
    ) -> Result<Vec<VideoId>, SinkError>;

    async fn create_live_streaming_details(
        &self,
        video_id: &VideoId,
        details: &LiveStreamingDetails,
    ) -> Result<(), SinkError>;

    async fn get_live_streaming_details(
        &self,
        video_id: &VideoId,
    ) -> Result<LiveStreamingDetails, SinkError>;
}

#[async_trait::async_trait]
impl<T: CatalogSink + ?Sized> CatalogSink for Arc<T> {
    async fn create_channel(&self, channel: &Channel) -> Result<(), SinkError> {
        (**self).create_channel(channel).await
    }

    async fn get_channel(&self, channel_id: &ChannelId) -> Result<Channel, SinkError> {
        (**self).get_channel(channel_id).await
    }

    async fn get_channel_by_handle(&self, handle: &ChannelHandle) -> Result<Channel, SinkError> {
        (**self).get_channel_by_handle(handle).await
    }

    async fn create_playlist(
        &self,
        channel_id: &ChannelId,
        playlist: &Playlist,
    ) -> Result<(), SinkError> {
        (**self).create_playlist(channel_id, playlist).await
    }

    async fn get_playlist(&self, playlist_id: &PlaylistId) -> Result<Playlist, SinkError> {
        (**self).get_playlist(playlist_id).await
    }

    async fn get_uploads_playlist(&self, channel_id: &ChannelId) -> Result<Playlist, SinkError> {
        (**self).get_uploads_playlist(channel_id).await
    }

    async fn list_playlists(&self, channel_id: &ChannelId) -> Result<Vec<Playlist>, SinkError> {
        (**self).list_playlists(channel_id).await
    }

    async fn create_video(&self, video: &Video) -> Result<(), SinkError> {
        (**self).create_video(video).await
    }

    async fn get_video(&self, video_id: &VideoId) -> Result<Video, SinkError> {
        (**self).get_video(video_id).await
    }

    async fn list_videos(&self, video_ids: &[VideoId]) -> Result<Vec<Video>, SinkError> {
        (**self).list_videos(video_ids).await
    }

    async fn create_playlist_video(
        &self,
        playlist_id: &PlaylistId,
        video_id: &VideoId,
    ) -> Result<(), SinkError> {
        (**self).create_playlist_video(playlist_id, video_id).await
    }

    async fn list_video_ids_by_playlist(
        &self,
        playlist_id: &PlaylistId,
    ) -> Result<Vec<VideoId>, SinkError> {
        (**self).list_video_ids_by_playlist(playlist_id).await
    }

    async fn create_live_streaming_details(
        &self,
        video_id: &VideoId,
        details: &LiveStreamingDetails,
    ) -> Result<(), SinkError> {
        (**self).create_live_streaming_details(video_id, details).await
    }

    async fn get_live_streaming_details(
        &self,
        video_id: &VideoId,
    ) -> Result<LiveStreamingDetails, SinkError> {
        (**self).get_live_streaming_details(video_id).await
    }
}
