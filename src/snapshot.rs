use base64::Engine as _;
use serde::Serialize;

use crate::color::{self, AccentColor};

pub const IDLE_TITLE: &str = "No Media Playing";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    Playing,
    Paused,
    Stopped,
    /// Transitional or unreported states (opening, changing, closed).
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Timeline {
    pub position_secs: f64,
    pub duration_secs: f64,
}

#[derive(Debug, Clone, Default)]
pub struct RawMetadata {
    pub title: String,
    pub artist: String,
    pub album_artist: String,
    pub album_title: String,
}

/// One reading of the platform session, before normalization.
#[derive(Debug, Clone)]
pub struct RawSession {
    pub metadata: RawMetadata,
    pub status: PlaybackStatus,
    pub timeline: Option<Timeline>,
    pub thumbnail: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Snapshot {
    Active(MediaSnapshot),
    Idle(IdleSnapshot),
}

/// Normalized "nothing is playing" record. Consumers key off
/// `status == "idle"` rather than a missing body.
#[derive(Debug, Clone, Serialize)]
pub struct IdleSnapshot {
    status: &'static str,
    title: &'static str,
    artist: &'static str,
}

impl Default for IdleSnapshot {
    fn default() -> Self {
        Self {
            status: "idle",
            title: IDLE_TITLE,
            artist: "",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album_artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<AccentColor>,
    pub status: PlaybackStatus,
    pub position: f64,
    pub duration: f64,
}

/// Normalize one raw session reading into the wire snapshot.
///
/// The thumbnail ships as a data URI whenever bytes arrived, independent of
/// whether color extraction succeeded on them.
pub fn assemble(raw: Option<RawSession>) -> Snapshot {
    let Some(raw) = raw else {
        return Snapshot::Idle(IdleSnapshot::default());
    };

    let color = raw.thumbnail.as_deref().and_then(color::extract_accent_color);
    let thumbnail = raw.thumbnail.as_deref().map(thumbnail_data_uri);
    let timeline = raw.timeline.unwrap_or_default();

    Snapshot::Active(MediaSnapshot {
        title: non_empty(raw.metadata.title),
        artist: non_empty(raw.metadata.artist),
        album_artist: non_empty(raw.metadata.album_artist),
        album_title: non_empty(raw.metadata.album_title),
        thumbnail,
        color,
        status: raw.status,
        position: timeline.position_secs.max(0.0),
        duration: timeline.duration_secs.max(0.0),
    })
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Consumers expect a JPEG data URI; the media type stays fixed regardless of
/// the actual thumbnail encoding.
fn thumbnail_data_uri(bytes: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    format!("data:image/jpeg;base64,{encoded}")
}
