use anyhow::Result;
use tubesync::{CatalogSink, Channel, ChannelHandle, ChannelId, SinkError, VideoId};

/// Look a stored channel up by id, or by handle when the argument starts with `@`.
pub async fn run(sink: &dyn CatalogSink, id_or_handle: &str) -> Result<()> {
    let channel = find(sink, id_or_handle).await?;
    let playlists = sink.list_playlists(&channel.id).await?;
    let uploads = uploaded_video_ids(sink, &channel).await?;

    println!("Id:        {}", channel.id);
    println!("Handle:    {}", channel.handle);
    println!("Uploads:   {}", channel.uploads_playlist_id);
    println!("Playlists: {}", playlists.len());
    println!("Videos:    {}", uploads.len());

    Ok(())
}

/// A sync interrupted after the channel row leaves no uploads playlist yet.
async fn uploaded_video_ids(sink: &dyn CatalogSink, channel: &Channel) -> Result<Vec<VideoId>> {
    match sink
        .list_video_ids_by_playlist(&channel.uploads_playlist_id)
        .await
    {
        Ok(ids) => Ok(ids),
        Err(SinkError::NotFound { .. }) => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

async fn find(sink: &dyn CatalogSink, id_or_handle: &str) -> Result<Channel> {
    let channel = if id_or_handle.starts_with('@') {
        sink.get_channel_by_handle(&ChannelHandle::new(id_or_handle))
            .await?
    } else {
        sink.get_channel(&ChannelId::new(id_or_handle)).await?
    };
    Ok(channel)
}
