use anyhow::Result;
use tubesync::{CatalogSink, PlaylistId};

use super::format;

pub async fn run(sink: &dyn CatalogSink, playlist_id: &str, limit: Option<usize>) -> Result<()> {
    let playlist_id = PlaylistId::new(playlist_id);
    let playlist = sink.get_playlist(&playlist_id).await?;

    let mut video_ids = sink.list_video_ids_by_playlist(&playlist.id).await?;
    if let Some(limit) = limit {
        video_ids.truncate(limit);
    }

    let videos = sink.list_videos(&video_ids).await?;
    format::print_video_table(&videos);
    Ok(())
}
