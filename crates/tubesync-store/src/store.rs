use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use tubesync::{
    CatalogSink, Channel, ChannelHandle, ChannelId, EntityKind, LiveStreamingDetails,
    PersistCounts, Playlist, PlaylistId, SinkError, Thumbnails, Video, VideoId,
};
use url::Url;

use crate::schema;

/// A SQLite-backed catalog that implements `CatalogSink`.
///
/// Rows are append-only. A second insert of the same key fails with
/// [`SinkError::Conflict`]; references to missing rows fail with
/// [`SinkError::Database`].
pub struct CatalogStore {
    conn: Mutex<Connection>,
}

impl CatalogStore {
    /// Open a store backed by a file on disk, creating it if needed.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::Database(e.to_string()))?;
        tracing::debug!(path = %path.display(), "opened catalog store");
        Self::with_connection(conn)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| StoreError::Database(e.to_string()))?;
        Self::with_connection(conn)
    }

    fn with_connection(mut conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| StoreError::Database(e.to_string()))?;
        schema::migrations()
            .to_latest(&mut conn)
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, SinkError> {
        self.conn
            .lock()
            .map_err(|_| SinkError::Database("connection lock poisoned".into()))
    }

    /// Number of stored rows per entity kind.
    pub fn row_counts(&self) -> Result<PersistCounts, SinkError> {
        let conn = self.conn()?;
        let count = |table: &str| -> Result<u64, SinkError> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as u64)
            .map_err(db_error)
        };

        Ok(PersistCounts {
            channels: count("channels")?,
            playlists: count("playlists")?,
            videos: count("videos")?,
            playlist_videos: count("playlist_videos")?,
            live_streaming_details: count("live_streaming_details")?,
        })
    }

    /// Channels in insertion order.
    pub fn list_channels(&self) -> Result<Vec<Channel>, SinkError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT id, handle, uploads_playlist_id FROM channels ORDER BY rowid")
            .map_err(db_error)?;

        stmt.query_map([], row_to_channel)
            .map_err(db_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_error)
    }

    fn query_channel(&self, column: &str, value: &str) -> Result<Channel, SinkError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT id, handle, uploads_playlist_id FROM channels WHERE {column} = ?1"),
            [value],
            row_to_channel,
        )
        .optional()
        .map_err(db_error)?
        .ok_or_else(|| SinkError::not_found(EntityKind::Channel, value))
    }
}

/// Errors opening or migrating the store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("migration error: {0}")]
    Migration(String),
}

fn db_error(e: rusqlite::Error) -> SinkError {
    SinkError::Database(e.to_string())
}

/// Map an insert failure. Duplicate keys become `Conflict`; foreign key
/// violations and everything else stay database errors.
fn insert_error(kind: EntityKind, id: &str, e: rusqlite::Error) -> SinkError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            SinkError::conflict(kind, id)
        }
        _ => db_error(e),
    }
}

fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_time(column: &str, value: &str) -> Result<DateTime<Utc>, SinkError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| SinkError::Conversion(format!("{column} {value:?}: {e}")))
}

fn parse_url(column: &str, value: Option<String>) -> Result<Option<Url>, SinkError> {
    value
        .map(|v| Url::parse(&v).map_err(|e| SinkError::Conversion(format!("{column} {v:?}: {e}"))))
        .transpose()
}

fn duration_millis(duration: Duration) -> Result<i64, SinkError> {
    if duration.subsec_nanos() % 1_000_000 != 0 {
        return Err(SinkError::Conversion(format!(
            "duration {duration:?} is finer than a millisecond"
        )));
    }
    i64::try_from(duration.as_millis())
        .map_err(|_| SinkError::Conversion(format!("duration {duration:?} out of range")))
}

/// `NotFound` unless `table` has a row with primary key `id`.
fn ensure_exists(
    conn: &Connection,
    table: &str,
    kind: EntityKind,
    id: &str,
) -> Result<(), SinkError> {
    conn.query_row(&format!("SELECT 1 FROM {table} WHERE id = ?1"), [id], |_| Ok(()))
        .optional()
        .map_err(db_error)?
        .ok_or_else(|| SinkError::not_found(kind, id))
}

fn row_to_channel(row: &rusqlite::Row) -> rusqlite::Result<Channel> {
    Ok(Channel {
        id: ChannelId::new(row.get::<_, String>(0)?),
        handle: ChannelHandle::new(row.get::<_, String>(1)?),
        uploads_playlist_id: PlaylistId::new(row.get::<_, String>(2)?),
    })
}

fn row_to_playlist(row: &rusqlite::Row) -> rusqlite::Result<Playlist> {
    Ok(Playlist {
        id: PlaylistId::new(row.get::<_, String>(0)?),
        is_uploads: row.get(1)?,
        title: row.get(2)?,
    })
}

/// A `videos` row joined with its live details, before conversion.
struct VideoRow {
    id: String,
    title: String,
    description: String,
    duration_ms: i64,
    thumbnails: [Option<String>; 5],
    published_at: String,
    live: Option<[String; 3]>,
}

const VIDEO_SELECT: &str = "
    SELECT v.id, v.title, v.description, v.duration_ms,
           v.thumbnail_default, v.thumbnail_medium, v.thumbnail_high,
           v.thumbnail_standard, v.thumbnail_maxres, v.published_at,
           l.actual_start_time, l.actual_end_time, l.scheduled_start_time
    FROM videos v
    LEFT JOIN live_streaming_details l ON l.video_id = v.id
    WHERE v.id = ?1";

impl VideoRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        let start: Option<String> = row.get(10)?;
        let end: Option<String> = row.get(11)?;
        let scheduled: Option<String> = row.get(12)?;

        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            duration_ms: row.get(3)?,
            thumbnails: [row.get(4)?, row.get(5)?, row.get(6)?, row.get(7)?, row.get(8)?],
            published_at: row.get(9)?,
            live: match (start, end, scheduled) {
                (Some(start), Some(end), Some(scheduled)) => Some([start, end, scheduled]),
                _ => None,
            },
        })
    }

    fn into_video(self) -> Result<Video, SinkError> {
        let duration_ms = u64::try_from(self.duration_ms).map_err(|_| {
            SinkError::Conversion(format!("negative duration_ms {}", self.duration_ms))
        })?;
        let [default, medium, high, standard, maxres] = self.thumbnails;

        let live_streaming_details = self
            .live
            .map(|[start, end, scheduled]| -> Result<_, SinkError> {
                Ok(LiveStreamingDetails {
                    actual_start_time: parse_time("actual_start_time", &start)?,
                    actual_end_time: parse_time("actual_end_time", &end)?,
                    scheduled_start_time: parse_time("scheduled_start_time", &scheduled)?,
                })
            })
            .transpose()?;

        Ok(Video {
            id: VideoId::new(self.id),
            title: self.title,
            description: self.description,
            duration: Duration::from_millis(duration_ms),
            thumbnails: Thumbnails {
                default: parse_url("thumbnail_default", default)?,
                medium: parse_url("thumbnail_medium", medium)?,
                high: parse_url("thumbnail_high", high)?,
                standard: parse_url("thumbnail_standard", standard)?,
                maxres: parse_url("thumbnail_maxres", maxres)?,
            },
            live_streaming_details,
            published_at: parse_time("published_at", &self.published_at)?,
        })
    }
}

fn select_video(conn: &Connection, video_id: &VideoId) -> Result<Option<Video>, SinkError> {
    conn.query_row(VIDEO_SELECT, [video_id.as_str()], VideoRow::from_row)
        .optional()
        .map_err(db_error)?
        .map(VideoRow::into_video)
        .transpose()
}

fn insert_live_streaming_details(
    conn: &Connection,
    video_id: &VideoId,
    details: &LiveStreamingDetails,
) -> Result<(), SinkError> {
    conn.execute(
        "INSERT INTO live_streaming_details
            (video_id, actual_start_time, actual_end_time, scheduled_start_time)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            video_id.as_str(),
            format_time(&details.actual_start_time),
            format_time(&details.actual_end_time),
            format_time(&details.scheduled_start_time),
        ],
    )
    .map_err(|e| insert_error(EntityKind::LiveStreamingDetails, video_id.as_str(), e))?;
    Ok(())
}

#[async_trait::async_trait]
impl CatalogSink for CatalogStore {
    async fn create_channel(&self, channel: &Channel) -> Result<(), SinkError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO channels (id, handle, uploads_playlist_id) VALUES (?1, ?2, ?3)",
            rusqlite::params![
                channel.id.as_str(),
                channel.handle.as_str(),
                channel.uploads_playlist_id.as_str(),
            ],
        )
        .map_err(|e| insert_error(EntityKind::Channel, channel.id.as_str(), e))?;
        Ok(())
    }

    async fn get_channel(&self, channel_id: &ChannelId) -> Result<Channel, SinkError> {
        self.query_channel("id", channel_id.as_str())
    }

    async fn get_channel_by_handle(&self, handle: &ChannelHandle) -> Result<Channel, SinkError> {
        self.query_channel("handle", handle.as_str())
    }

    async fn create_playlist(
        &self,
        channel_id: &ChannelId,
        playlist: &Playlist,
    ) -> Result<(), SinkError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO playlists (id, channel_id, is_uploads, title) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                playlist.id.as_str(),
                channel_id.as_str(),
                playlist.is_uploads,
                playlist.title,
            ],
        )
        .map_err(|e| insert_error(EntityKind::Playlist, playlist.id.as_str(), e))?;
        Ok(())
    }

    async fn get_playlist(&self, playlist_id: &PlaylistId) -> Result<Playlist, SinkError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, is_uploads, title FROM playlists WHERE id = ?1",
            [playlist_id.as_str()],
            row_to_playlist,
        )
        .optional()
        .map_err(db_error)?
        .ok_or_else(|| SinkError::not_found(EntityKind::Playlist, playlist_id.as_str()))
    }

    async fn get_uploads_playlist(&self, channel_id: &ChannelId) -> Result<Playlist, SinkError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, is_uploads, title FROM playlists
             WHERE channel_id = ?1 AND is_uploads = 1",
            [channel_id.as_str()],
            row_to_playlist,
        )
        .optional()
        .map_err(db_error)?
        .ok_or_else(|| SinkError::not_found(EntityKind::Playlist, channel_id.as_str()))
    }

    async fn list_playlists(&self, channel_id: &ChannelId) -> Result<Vec<Playlist>, SinkError> {
        let conn = self.conn()?;
        ensure_exists(&conn, "channels", EntityKind::Channel, channel_id.as_str())?;
        let mut stmt = conn
            .prepare(
                "SELECT id, is_uploads, title FROM playlists
                 WHERE channel_id = ?1
                 ORDER BY rowid",
            )
            .map_err(db_error)?;

        stmt.query_map([channel_id.as_str()], row_to_playlist)
            .map_err(db_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_error)
    }

    async fn create_video(&self, video: &Video) -> Result<(), SinkError> {
        let duration_ms = duration_millis(video.duration)?;
        let thumbnail = |url: &Option<Url>| url.as_ref().map(Url::as_str).map(str::to_owned);

        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_error)?;

        tx.execute(
            "INSERT INTO videos
                (id, title, description, duration_ms,
                 thumbnail_default, thumbnail_medium, thumbnail_high,
                 thumbnail_standard, thumbnail_maxres, published_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
                video.id.as_str(),
                video.title,
                video.description,
                duration_ms,
                thumbnail(&video.thumbnails.default),
                thumbnail(&video.thumbnails.medium),
                thumbnail(&video.thumbnails.high),
                thumbnail(&video.thumbnails.standard),
                thumbnail(&video.thumbnails.maxres),
                format_time(&video.published_at),
            ],
        )
        .map_err(|e| insert_error(EntityKind::Video, video.id.as_str(), e))?;

        if let Some(details) = &video.live_streaming_details {
            insert_live_streaming_details(&tx, &video.id, details)?;
        }

        tx.commit().map_err(db_error)
    }

    async fn get_video(&self, video_id: &VideoId) -> Result<Video, SinkError> {
        let conn = self.conn()?;
        select_video(&conn, video_id)?
            .ok_or_else(|| SinkError::not_found(EntityKind::Video, video_id.as_str()))
    }

    async fn list_videos(&self, video_ids: &[VideoId]) -> Result<Vec<Video>, SinkError> {
        let conn = self.conn()?;
        let mut videos = Vec::with_capacity(video_ids.len());
        for video_id in video_ids {
            if let Some(video) = select_video(&conn, video_id)? {
                videos.push(video);
            }
        }
        Ok(videos)
    }

    async fn create_playlist_video(
        &self,
        playlist_id: &PlaylistId,
        video_id: &VideoId,
    ) -> Result<(), SinkError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO playlist_videos (playlist_id, video_id) VALUES (?1, ?2)",
            [playlist_id.as_str(), video_id.as_str()],
        )
        .map_err(|e| {
            insert_error(
                EntityKind::PlaylistVideo,
                &format!("{playlist_id}/{video_id}"),
                e,
            )
        })?;
        Ok(())
    }

    async fn list_video_ids_by_playlist(
        &self,
        playlist_id: &PlaylistId,
    ) -> Result<Vec<VideoId>, SinkError> {
        let conn = self.conn()?;
        ensure_exists(&conn, "playlists", EntityKind::Playlist, playlist_id.as_str())?;
        let mut stmt = conn
            .prepare(
                "SELECT video_id FROM playlist_videos
                 WHERE playlist_id = ?1
                 ORDER BY rowid",
            )
            .map_err(db_error)?;

        stmt.query_map([playlist_id.as_str()], |row| {
            row.get::<_, String>(0).map(VideoId::new)
        })
        .map_err(db_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(db_error)
    }

    async fn create_live_streaming_details(
        &self,
        video_id: &VideoId,
        details: &LiveStreamingDetails,
    ) -> Result<(), SinkError> {
        let conn = self.conn()?;
        insert_live_streaming_details(&conn, video_id, details)
    }

    async fn get_live_streaming_details(
        &self,
        video_id: &VideoId,
    ) -> Result<LiveStreamingDetails, SinkError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT actual_start_time, actual_end_time, scheduled_start_time
                 FROM live_streaming_details
                 WHERE video_id = ?1",
                [video_id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(db_error)?
            .ok_or_else(|| {
                SinkError::not_found(EntityKind::LiveStreamingDetails, video_id.as_str())
            })?;

        Ok(LiveStreamingDetails {
            actual_start_time: parse_time("actual_start_time", &row.0)?,
            actual_end_time: parse_time("actual_end_time", &row.1)?,
            scheduled_start_time: parse_time("scheduled_start_time", &row.2)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn times_keep_subsecond_precision() {
        let time = DateTime::parse_from_rfc3339("2024-05-02T20:01:30.250Z")
            .unwrap()
            .with_timezone(&Utc);
        let stored = format_time(&time);

        assert_eq!(stored, "2024-05-02T20:01:30.250Z");
        assert_eq!(parse_time("t", &stored).unwrap(), time);
    }

    #[test]
    fn unparseable_time_is_a_conversion_error() {
        assert!(matches!(
            parse_time("published_at", "yesterday"),
            Err(SinkError::Conversion(_))
        ));
    }

    #[test]
    fn foreign_keys_are_enforced() {
        let store = CatalogStore::open_in_memory().unwrap();
        let enabled: i64 = store
            .conn()
            .unwrap()
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }
}
