use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }
    };
}

string_id! {
    /// Source-assigned channel identifier (e.g. `UC1cnByKe24JjTv38tH_7BYw`).
    ChannelId
}

string_id! {
    /// Display handle of a channel (e.g. `@izuho_omi`). Not guaranteed unique.
    ChannelHandle
}

string_id! {
    /// Source-assigned playlist identifier.
    PlaylistId
}

string_id! {
    /// Source-assigned video identifier.
    VideoId
}

string_id! {
    /// Opaque continuation cursor returned by a paged listing.
    /// Only meaningful within the enumeration that produced it.
    PageToken
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub handle: ChannelHandle,
    pub uploads_playlist_id: PlaylistId,
}

/// A playlist owned by a channel.
///
/// `title` is `None` for the uploads playlist when it was derived from its
/// channel rather than looked up directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: PlaylistId,
    pub is_uploads: bool,
    pub title: Option<String>,
}

impl Playlist {
    /// The implicit uploads playlist of a channel.
    pub fn uploads_of(channel: &Channel) -> Self {
        Self {
            id: channel.uploads_playlist_id.clone(),
            is_uploads: true,
            title: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Video {
    pub id: VideoId,
    pub title: String,
    pub description: String,
    pub duration: Duration,
    pub thumbnails: Thumbnails,
    pub live_streaming_details: Option<LiveStreamingDetails>,
    pub published_at: DateTime<Utc>,
}

/// Thumbnail URLs per resolution tier. Every tier is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnails {
    pub default: Option<Url>,
    pub medium: Option<Url>,
    pub high: Option<Url>,
    pub standard: Option<Url>,
    pub maxres: Option<Url>,
}

/// Timing of a concluded live broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveStreamingDetails {
    pub actual_start_time: DateTime<Utc>,
    pub actual_end_time: DateTime<Utc>,
    pub scheduled_start_time: DateTime<Utc>,
}

/// The kinds of entity the catalog stores. Used to give errors context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Channel,
    Playlist,
    Video,
    PlaylistVideo,
    LiveStreamingDetails,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel => write!(f, "channel"),
            Self::Playlist => write!(f, "playlist"),
            Self::Video => write!(f, "video"),
            Self::PlaylistVideo => write!(f, "playlist video"),
            Self::LiveStreamingDetails => write!(f, "live streaming details"),
        }
    }
}

/// A reference to one stored entity: its kind plus its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn channel(id: &ChannelId) -> Self {
        Self::new(EntityKind::Channel, id.as_str())
    }

    pub fn playlist(id: &PlaylistId) -> Self {
        Self::new(EntityKind::Playlist, id.as_str())
    }

    pub fn video(id: &VideoId) -> Self {
        Self::new(EntityKind::Video, id.as_str())
    }

    pub fn playlist_video(playlist_id: &PlaylistId, video_id: &VideoId) -> Self {
        Self::new(EntityKind::PlaylistVideo, format!("{playlist_id}/{video_id}"))
    }

    pub fn live_streaming_details(id: &VideoId) -> Self {
        Self::new(EntityKind::LiveStreamingDetails, id.as_str())
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// One page of a paged listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total number of results across all pages, as reported by the source.
    pub total_results: u64,
    pub next_page_token: Option<PageToken>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total_results: u64, next_page_token: Option<PageToken>) -> Self {
        Self {
            items,
            total_results,
            next_page_token,
        }
    }

    /// A single page that ends the enumeration.
    pub fn last(items: Vec<T>) -> Self {
        let total_results = items.len() as u64;
        Self::new(items, total_results, None)
    }
}
