//! Conversion of raw remote records into catalog entities.
//!
//! The `Raw*` types mirror the JSON resources of the YouTube Data API v3,
//! restricted to the parts the catalog reads. Conversion is pure: the same raw
//! record always yields the same entity, and a record that fails any check
//! yields an error rather than a partially filled entity.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use url::Url;

use crate::model::{
    Channel, ChannelHandle, ChannelId, LiveStreamingDetails, Playlist, PlaylistId, Thumbnails,
    Video, VideoId,
};

/// Duration literal the API reports for videos without a duration
/// (upcoming broadcasts, for instance).
pub const NO_DURATION: &str = "P0D";

/// A field of a raw record that could not be converted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {field} {value:?}: {reason}")]
pub struct ConversionError {
    pub field: &'static str,
    pub value: String,
    pub reason: String,
}

impl ConversionError {
    fn new(field: &'static str, value: &str, reason: impl Into<String>) -> Self {
        Self {
            field,
            value: value.to_owned(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawChannel {
    pub id: String,
    #[serde(default)]
    pub snippet: RawChannelSnippet,
    #[serde(default)]
    pub content_details: RawChannelContentDetails,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawChannelSnippet {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub custom_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawChannelContentDetails {
    #[serde(default)]
    pub related_playlists: RawRelatedPlaylists,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRelatedPlaylists {
    #[serde(default)]
    pub uploads: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPlaylist {
    pub id: String,
    #[serde(default)]
    pub snippet: RawPlaylistSnippet,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPlaylistSnippet {
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPlaylistItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub snippet: RawPlaylistItemSnippet,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPlaylistItemSnippet {
    #[serde(default)]
    pub resource_id: RawResourceId,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawResourceId {
    pub video_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawVideo {
    pub id: String,
    #[serde(default)]
    pub snippet: RawVideoSnippet,
    #[serde(default)]
    pub content_details: RawVideoContentDetails,
    pub live_streaming_details: Option<RawLiveStreamingDetails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawVideoSnippet {
    #[serde(default)]
    pub published_at: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub thumbnails: RawThumbnails,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawVideoContentDetails {
    #[serde(default)]
    pub duration: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawThumbnails {
    pub default: Option<RawThumbnail>,
    pub medium: Option<RawThumbnail>,
    pub high: Option<RawThumbnail>,
    pub standard: Option<RawThumbnail>,
    pub maxres: Option<RawThumbnail>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawThumbnail {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLiveStreamingDetails {
    pub actual_start_time: Option<String>,
    pub actual_end_time: Option<String>,
    pub scheduled_start_time: Option<String>,
}

pub fn channel(raw: &RawChannel) -> Result<Channel, ConversionError> {
    let uploads = &raw.content_details.related_playlists.uploads;
    if uploads.is_empty() {
        return Err(ConversionError::new(
            "uploads playlist id",
            uploads,
            "channel has no uploads playlist",
        ));
    }

    Ok(Channel {
        id: ChannelId::new(&raw.id),
        handle: ChannelHandle::new(&raw.snippet.custom_url),
        uploads_playlist_id: PlaylistId::new(uploads),
    })
}

pub fn playlist(raw: &RawPlaylist) -> Playlist {
    Playlist {
        id: PlaylistId::new(&raw.id),
        is_uploads: false,
        title: raw.snippet.title.clone(),
    }
}

pub fn playlist_item_video_id(raw: &RawPlaylistItem) -> Result<VideoId, ConversionError> {
    match raw.snippet.resource_id.video_id.as_deref() {
        Some(id) if !id.is_empty() => Ok(VideoId::new(id)),
        _ => Err(ConversionError::new(
            "resource video id",
            &raw.id,
            "playlist item does not reference a video",
        )),
    }
}

pub fn video(raw: &RawVideo) -> Result<Video, ConversionError> {
    let duration = duration(&raw.content_details.duration)?;
    let thumbnails = thumbnails(&raw.snippet.thumbnails)?;
    let live_streaming_details = match &raw.live_streaming_details {
        Some(details) => live_streaming_details(details)?,
        None => None,
    };
    let published_at = timestamp("published at", &raw.snippet.published_at)?;

    Ok(Video {
        id: VideoId::new(&raw.id),
        title: raw.snippet.title.clone(),
        description: raw.snippet.description.clone(),
        duration,
        thumbnails,
        live_streaming_details,
        published_at,
    })
}

/// Parse an ISO-8601 duration of the form `P[nD][T[nH][nM][n[.f]S]]`.
///
/// Years, months and weeks are rejected: their length is calendar-dependent.
pub fn duration(value: &str) -> Result<Duration, ConversionError> {
    if value == NO_DURATION {
        return Ok(Duration::ZERO);
    }

    let invalid = |reason: &str| ConversionError::new("duration", value, reason);

    let rest = value
        .strip_prefix('P')
        .ok_or_else(|| invalid("missing P designator"))?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((date, time)) => {
            if time.is_empty() {
                return Err(invalid("empty time part"));
            }
            (date, Some(time))
        }
        None => (rest, None),
    };
    if date_part.is_empty() && time_part.is_none() {
        return Err(invalid("no components"));
    }

    let mut total = Duration::ZERO;

    for (number, unit) in components(date_part).map_err(|r| invalid(&r))? {
        match unit {
            'D' => {
                let days = whole_units(number, 86_400).map_err(|r| invalid(&r))?;
                total = total
                    .checked_add(days)
                    .ok_or_else(|| invalid("duration overflows"))?;
            }
            other => return Err(invalid(&format!("unsupported date unit {other}"))),
        }
    }

    if let Some(time_part) = time_part {
        let mut last_rank = 0;
        for (number, unit) in components(time_part).map_err(|r| invalid(&r))? {
            let rank = match unit {
                'H' => 1,
                'M' => 2,
                'S' => 3,
                other => return Err(invalid(&format!("unsupported time unit {other}"))),
            };
            if rank <= last_rank {
                return Err(invalid("time units out of order"));
            }
            last_rank = rank;

            let part = match unit {
                'H' => whole_units(number, 3_600),
                'M' => whole_units(number, 60),
                _ => seconds(number),
            }
            .map_err(|r| invalid(&r))?;
            total = total
                .checked_add(part)
                .ok_or_else(|| invalid("duration overflows"))?;
        }
    }

    Ok(total)
}

/// Split `12H3M4.5S` into `[("12", 'H'), ("3", 'M'), ("4.5", 'S')]`.
fn components(part: &str) -> Result<Vec<(&str, char)>, String> {
    let mut out = Vec::new();
    let mut start = 0;

    for (index, c) in part.char_indices() {
        if c.is_ascii_digit() || c == '.' {
            continue;
        }
        let number = &part[start..index];
        if number.is_empty() {
            return Err(format!("unit {c} has no value"));
        }
        out.push((number, c));
        start = index + c.len_utf8();
    }

    if start != part.len() {
        return Err("trailing value without unit".into());
    }

    Ok(out)
}

fn whole_units(number: &str, unit_secs: u64) -> Result<Duration, String> {
    let n: u64 = number
        .parse()
        .map_err(|_| format!("{number} is not a whole number"))?;
    n.checked_mul(unit_secs)
        .map(Duration::from_secs)
        .ok_or_else(|| "duration overflows".into())
}

fn seconds(number: &str) -> Result<Duration, String> {
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    let secs: u64 = whole
        .parse()
        .map_err(|_| format!("{number} is not a number of seconds"))?;
    if fraction.is_empty() {
        return Ok(Duration::from_secs(secs));
    }
    // Stored as whole milliseconds.
    if fraction.len() > 3 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("{number} has an invalid fraction"));
    }
    let millis: u64 = format!("{fraction:0<3}")
        .parse()
        .map_err(|_| format!("{number} has an invalid fraction"))?;
    Ok(Duration::from_secs(secs) + Duration::from_millis(millis))
}

/// Parse an RFC 3339 timestamp into UTC.
pub fn timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>, ConversionError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ConversionError::new(field, value, e.to_string()))
}

fn thumbnails(raw: &RawThumbnails) -> Result<Thumbnails, ConversionError> {
    Ok(Thumbnails {
        default: thumbnail_url("default thumbnail", raw.default.as_ref())?,
        medium: thumbnail_url("medium thumbnail", raw.medium.as_ref())?,
        high: thumbnail_url("high thumbnail", raw.high.as_ref())?,
        standard: thumbnail_url("standard thumbnail", raw.standard.as_ref())?,
        maxres: thumbnail_url("maxres thumbnail", raw.maxres.as_ref())?,
    })
}

fn thumbnail_url(
    field: &'static str,
    thumbnail: Option<&RawThumbnail>,
) -> Result<Option<Url>, ConversionError> {
    thumbnail
        .map(|t| Url::parse(&t.url).map_err(|e| ConversionError::new(field, &t.url, e.to_string())))
        .transpose()
}

/// Live details are kept only for broadcasts that have ended.
/// Upcoming and in-progress broadcasts yield `None`.
fn live_streaming_details(
    raw: &RawLiveStreamingDetails,
) -> Result<Option<LiveStreamingDetails>, ConversionError> {
    let actual_end_time = match raw.actual_end_time.as_deref() {
        Some(end) if !end.is_empty() => end,
        _ => return Ok(None),
    };

    Ok(Some(LiveStreamingDetails {
        actual_start_time: timestamp(
            "actual start time",
            raw.actual_start_time.as_deref().unwrap_or_default(),
        )?,
        actual_end_time: timestamp("actual end time", actual_end_time)?,
        scheduled_start_time: timestamp(
            "scheduled start time",
            raw.scheduled_start_time.as_deref().unwrap_or_default(),
        )?,
    }))
}
