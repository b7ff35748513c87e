use std::sync::Arc;

use crate::model::{
    Channel, ChannelId, EntityKind, Page, PageToken, Playlist, PlaylistId, Video, VideoId,
};
use crate::normalize::ConversionError;

/// Largest page the remote source hands out, and the largest batch of video
/// ids a single `list_videos` call accepts.
pub const MAX_PAGE_SIZE: usize = 50;

/// Errors that can occur when reading from a catalog source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("lookup of {kind} {id} returned {count} results")]
    Ambiguous {
        kind: EntityKind,
        id: String,
        count: usize,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("failed to convert {kind} {id}: {error}")]
    Conversion {
        kind: EntityKind,
        id: String,
        #[source]
        error: ConversionError,
    },

    #[error("transport error: {0}")]
    Transport(String),
}

impl SourceError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Whether repeating the same request could succeed.
    /// Only transport failures (network, quota, 5xx) qualify.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Read access to a remote video catalog.
///
/// Point lookups fail with [`SourceError::NotFound`] when nothing matches and
/// [`SourceError::Ambiguous`] when more than one item does. Listings are paged;
/// drive them through [`crate::page::PageWalker`] to enumerate everything.
#[async_trait::async_trait]
pub trait CatalogSource: Send + Sync {
    async fn get_channel(&self, channel_id: &ChannelId) -> Result<Channel, SourceError>;

    async fn get_playlist(&self, playlist_id: &PlaylistId) -> Result<Playlist, SourceError>;

    /// The uploads playlist of a channel.
    /// Default implementation derives it from the channel, without a title.
    async fn get_uploads_playlist(&self, channel_id: &ChannelId) -> Result<Playlist, SourceError> {
        let channel = self.get_channel(channel_id).await?;
        Ok(Playlist::uploads_of(&channel))
    }

    async fn list_playlists(
        &self,
        channel_id: &ChannelId,
        page_token: Option<&PageToken>,
    ) -> Result<Page<Playlist>, SourceError>;

    /// Video ids of a playlist, in playlist order.
    async fn list_video_ids(
        &self,
        playlist_id: &PlaylistId,
        page_token: Option<&PageToken>,
    ) -> Result<Page<VideoId>, SourceError>;

    /// Full videos for at most [`MAX_PAGE_SIZE`] ids.
    async fn list_videos(
        &self,
        video_ids: &[VideoId],
        page_token: Option<&PageToken>,
    ) -> Result<Page<Video>, SourceError>;
}

#[async_trait::async_trait]
impl<T: CatalogSource + ?Sized> CatalogSource for Arc<T> {
    async fn get_channel(&self, channel_id: &ChannelId) -> Result<Channel, SourceError> {
        (**self).get_channel(channel_id).await
    }

    async fn get_playlist(&self, playlist_id: &PlaylistId) -> Result<Playlist, SourceError> {
        (**self).get_playlist(playlist_id).await
    }

    async fn get_uploads_playlist(&self, channel_id: &ChannelId) -> Result<Playlist, SourceError> {
        (**self).get_uploads_playlist(channel_id).await
    }

    async fn list_playlists(
        &self,
        channel_id: &ChannelId,
        page_token: Option<&PageToken>,
    ) -> Result<Page<Playlist>, SourceError> {
        (**self).list_playlists(channel_id, page_token).await
    }

    async fn list_video_ids(
        &self,
        playlist_id: &PlaylistId,
        page_token: Option<&PageToken>,
    ) -> Result<Page<VideoId>, SourceError> {
        (**self).list_video_ids(playlist_id, page_token).await
    }

    async fn list_videos(
        &self,
        video_ids: &[VideoId],
        page_token: Option<&PageToken>,
    ) -> Result<Page<Video>, SourceError> {
        (**self).list_videos(video_ids, page_token).await
    }
}

/// Check the `list_videos` batch-size precondition.
pub fn check_video_batch(video_ids: &[VideoId]) -> Result<(), SourceError> {
    if video_ids.len() > MAX_PAGE_SIZE {
        return Err(SourceError::InvalidArgument(format!(
            "at most {MAX_PAGE_SIZE} video ids per request, got {}",
            video_ids.len()
        )));
    }
    Ok(())
}

/// Reduce a point-lookup result to exactly one item.
pub fn expect_single<T>(
    mut items: Vec<T>,
    kind: EntityKind,
    id: &str,
) -> Result<T, SourceError> {
    match items.len() {
        0 => Err(SourceError::not_found(kind, id)),
        1 => Ok(items.remove(0)),
        count => Err(SourceError::Ambiguous {
            kind,
            id: id.to_owned(),
            count,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expect_single_returns_the_only_item() {
        let item = expect_single(vec!["a"], EntityKind::Channel, "UC1").unwrap();
        assert_eq!(item, "a");
    }

    #[test]
    fn expect_single_reports_not_found() {
        let result = expect_single(Vec::<&str>::new(), EntityKind::Channel, "UC1");
        assert!(matches!(
            result,
            Err(SourceError::NotFound { kind: EntityKind::Channel, ref id }) if id == "UC1"
        ));
    }

    #[test]
    fn expect_single_reports_ambiguous() {
        let result = expect_single(vec!["a", "b"], EntityKind::Playlist, "PL1");
        assert!(matches!(result, Err(SourceError::Ambiguous { count: 2, .. })));
    }

    #[test]
    fn batch_of_fifty_is_accepted() {
        let ids: Vec<VideoId> = (0..50).map(|i| VideoId::new(format!("v{i}"))).collect();
        assert!(check_video_batch(&ids).is_ok());
    }

    #[test]
    fn batch_of_fifty_one_is_rejected() {
        let ids: Vec<VideoId> = (0..51).map(|i| VideoId::new(format!("v{i}"))).collect();
        assert!(matches!(
            check_video_batch(&ids),
            Err(SourceError::InvalidArgument(_))
        ));
    }

    #[test]
    fn only_transport_errors_are_retryable() {
        assert!(SourceError::Transport("HTTP 503".into()).is_retryable());
        assert!(!SourceError::Protocol("cycle".into()).is_retryable());
        assert!(!SourceError::not_found(EntityKind::Video, "v1").is_retryable());
    }
}
