use rusqlite_migration::{M, Migrations};

pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(
        "CREATE TABLE channels (
            id                   TEXT PRIMARY KEY,
            handle               TEXT NOT NULL,
            uploads_playlist_id  TEXT NOT NULL
        );

        CREATE TABLE playlists (
            id          TEXT PRIMARY KEY,
            channel_id  TEXT NOT NULL,
            is_uploads  INTEGER NOT NULL DEFAULT 0,
            title       TEXT,
            FOREIGN KEY (channel_id) REFERENCES channels(id)
        );

        CREATE TABLE videos (
            id                  TEXT PRIMARY KEY,
            title               TEXT NOT NULL,
            description         TEXT NOT NULL,
            duration_ms         INTEGER NOT NULL,
            thumbnail_default   TEXT,
            thumbnail_medium    TEXT,
            thumbnail_high      TEXT,
            thumbnail_standard  TEXT,
            thumbnail_maxres    TEXT,
            published_at        TEXT NOT NULL
        );

        CREATE TABLE playlist_videos (
            playlist_id  TEXT NOT NULL,
            video_id     TEXT NOT NULL,
            PRIMARY KEY (playlist_id, video_id),
            FOREIGN KEY (playlist_id) REFERENCES playlists(id),
            FOREIGN KEY (video_id) REFERENCES videos(id)
        );

        CREATE TABLE live_streaming_details (
            video_id              TEXT PRIMARY KEY,
            actual_start_time     TEXT NOT NULL,
            actual_end_time       TEXT NOT NULL,
            scheduled_start_time  TEXT NOT NULL,
            FOREIGN KEY (video_id) REFERENCES videos(id)
        );

        CREATE INDEX idx_channels_handle ON channels(handle);
        CREATE INDEX idx_playlists_channel_id ON playlists(channel_id);",
    )])
}
