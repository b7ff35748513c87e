use anyhow::{Result, bail};
use tubesync::{CatalogSink, ChannelId, SinkError};

use super::format;

pub async fn run(sink: &dyn CatalogSink, channel_id: &str) -> Result<()> {
    let channel_id = ChannelId::new(channel_id);
    let playlists = match sink.list_playlists(&channel_id).await {
        Ok(playlists) => playlists,
        Err(SinkError::NotFound { .. }) => {
            bail!("channel {channel_id} is not stored; run `tubesync sync --channel {channel_id}` first")
        }
        Err(e) => return Err(e.into()),
    };

    format::print_playlist_table(&playlists);
    Ok(())
}
