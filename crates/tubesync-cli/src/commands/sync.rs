use anyhow::Result;
use tubesync::{CatalogSink, CatalogSource, ChannelId, SyncReport, Synchronizer};

/// Run one sync and print the outcome to stdout.
pub async fn run<S, K>(sync: &Synchronizer<S, K>, channel_id: &ChannelId) -> Result<SyncReport>
where
    S: CatalogSource,
    K: CatalogSink,
{
    println!("Syncing channel {channel_id}...");

    let report = sync.run(channel_id).await?;
    print_report(&report);

    Ok(report)
}

pub fn print_report(report: &SyncReport) {
    println!(
        "Enumerated {} videos from {} in {} batches.",
        report.video_ids, report.uploads_playlist_id, report.video_batches
    );
    println!("Created: {}", report.created);
    println!("Already stored: {}", report.existing);
    if report.skipped_playlist_videos > 0 {
        println!(
            "Skipped {} playlist entries pointing outside the channel's uploads.",
            report.skipped_playlist_videos
        );
    }
}
