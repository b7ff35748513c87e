use std::time::Duration;

use tubesync::{PersistCounts, Playlist, Video};

const MAX_TITLE_WIDTH: usize = 60;

pub fn print_video_table(videos: &[Video]) {
    if videos.is_empty() {
        println!("No videos.");
        return;
    }

    for video in videos {
        let live = if video.live_streaming_details.is_some() {
            "live"
        } else {
            ""
        };
        println!(
            "  {}  {}  {:>8}  {:<4}  {}",
            video.id,
            video.published_at.format("%Y-%m-%d"),
            format_duration(video.duration),
            live,
            truncate(&video.title, MAX_TITLE_WIDTH)
        );
    }

    println!("\n{} videos", videos.len());
}

pub fn print_playlist_table(playlists: &[Playlist]) {
    for playlist in playlists {
        let title = match (&playlist.title, playlist.is_uploads) {
            (Some(title), _) => truncate(title, MAX_TITLE_WIDTH),
            (None, true) => "(uploads)".to_owned(),
            (None, false) => String::new(),
        };
        println!("  {}  {}", playlist.id, title);
    }

    println!("\n{} playlists", playlists.len());
}

pub fn print_counts(counts: &PersistCounts) {
    println!("Channels:               {}", counts.channels);
    println!("Playlists:              {}", counts.playlists);
    println!("Videos:                 {}", counts.videos);
    println!("Playlist videos:        {}", counts.playlist_videos);
    println!("Live streaming details: {}", counts.live_streaming_details);
}

/// `H:MM:SS`, or `M:SS` under an hour.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, total / 60 % 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_owned()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(1)).collect();
        format!("{truncated}…")
    }
}
