//! Common types shared by the playback core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ErrorKind;

/// Transport kind, selected from the shape of the source descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Segmented-HTTP adaptive stream (manifest + media segments)
    Segmented,
    /// Real-time low-latency channel (published audio/video tracks)
    Realtime,
}

/// Live-stream source descriptor handed in by the UI layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    /// Segmented-HTTP manifest URL. May be empty when no broadcast is configured.
    Manifest { url: String },
    /// Real-time channel id with an optional join token
    Channel {
        channel_id: String,
        token: Option<String>,
    },
}

impl SourceDescriptor {
    /// Transport kind implied by this descriptor's shape
    #[must_use]
    pub const fn transport_kind(&self) -> TransportKind {
        match self {
            Self::Manifest { .. } => TransportKind::Segmented,
            Self::Channel { .. } => TransportKind::Realtime,
        }
    }

    /// True when the descriptor carries no usable source
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Manifest { url } => url.is_empty(),
            Self::Channel { channel_id, .. } => channel_id.is_empty(),
        }
    }
}

/// Normalized playback status, one contract for both transports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackStatus {
    Loading,
    Playing,
    Reconnecting,
    WaitingForSource,
    Error,
    Offline,
}

/// One status observation delivered to the UI layer
#[derive(Debug, Clone, Serialize)]
pub struct StatusUpdate {
    pub status: PlaybackStatus,

    /// Human-readable reason for the current status
    pub reason: String,

    /// Reconnect attempts consumed in the current session
    pub reconnect_attempts: u32,

    /// Waiting-for-source attempts in the current session
    pub waiting_attempts: u32,

    /// Classified error behind an Error / Reconnecting status, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ErrorKind>,

    pub changed_at: DateTime<Utc>,
}

impl StatusUpdate {
    #[must_use]
    pub fn new(status: PlaybackStatus, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            reconnect_attempts: 0,
            waiting_attempts: 0,
            last_error: None,
            changed_at: Utc::now(),
        }
    }
}

/// Caller-supplied options for a playback session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Whether absence of data means "waiting" rather than "intentionally offline"
    pub is_broadcast_expected: bool,

    /// Force a load attempt even when no broadcast is expected (preview mode)
    pub preview: bool,

    /// Operator/admin override: mute without ever prompting for a gesture
    pub suppress_audio: bool,

    /// Upstream signal that a user gesture was already satisfied
    /// (e.g. the player was opened from a click)
    pub interaction_already_granted: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            is_broadcast_expected: true,
            preview: false,
            suppress_audio: false,
            interaction_already_granted: false,
        }
    }
}

/// Unique identifier for a remote participant on a real-time channel
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ParticipantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Media track kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

/// Published video quality tier.
///
/// Ordered so that `Ord::max` / `iter().max()` yields the highest tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    Medium,
    High,
}

impl QualityTier {
    /// Pick the highest tier out of what a participant published.
    /// Falls back to High when the client did not report tiers.
    #[must_use]
    pub fn highest_available(tiers: &[Self]) -> Self {
        tiers.iter().copied().max().unwrap_or(Self::High)
    }
}
