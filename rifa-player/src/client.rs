//! Transport client abstractions.
//!
//! The playback core wraps an existing segmented-stream client and an existing
//! real-time media client as black boxes; these traits are that seam. Clients
//! surface lifecycle events over an mpsc channel and report raw failures as
//! `anyhow::Error`; the adapters classify them into the crate's error
//! taxonomy, so nothing above this layer sees a transport library error.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::types::{ParticipantId, QualityTier, TrackKind};

/// Outcome of a playback attempt against the platform autoplay policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// Playback is running
    Started,
    /// The platform rejected the play call outright
    BlockedByAutoplay,
    /// play() resolved but the element ended up paused anyway
    PausedAfterStart,
}

/// Error classes a segmented-stream client distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamErrorClass {
    Network,
    Media,
    Other,
}

/// Lifecycle events surfaced by a segmented-stream client
#[derive(Debug, Clone)]
pub enum SegmentedEvent {
    /// Manifest parsed and enough segments buffered; playback can start
    Ready,
    /// Data stopped arriving mid-playback
    Stalled,
    /// Transport-level error report
    Error {
        class: StreamErrorClass,
        fatal: bool,
        message: String,
    },
}

/// Events surfaced by a real-time media client
#[derive(Debug, Clone)]
pub enum RealtimeEvent {
    /// Channel join completed
    Joined,
    /// A participant published a track
    ParticipantPublished {
        id: ParticipantId,
        kind: TrackKind,
        /// Quality tiers available for a video track (empty when unreported)
        tiers: Vec<QualityTier>,
    },
    /// A participant stopped publishing a track
    ParticipantUnpublished { id: ParticipantId, kind: TrackKind },
    /// The decoder threw while rendering this participant's video
    DecodeException { id: ParticipantId, message: String },
    /// The channel connection dropped
    ConnectionLost { message: String },
}

/// Play/mute/volume controls both transport clients expose
#[async_trait]
pub trait PlaybackControl: Send {
    /// Attempt playback, muted or unmuted. Never panics on autoplay denial;
    /// the denial comes back as a `PlayOutcome`.
    async fn play(&mut self, muted: bool) -> anyhow::Result<PlayOutcome>;

    async fn set_muted(&mut self, muted: bool) -> anyhow::Result<()>;

    /// Volume in `0.0..=1.0`
    async fn set_volume(&mut self, volume: f32) -> anyhow::Result<()>;
}

/// Segmented-HTTP adaptive stream client bound to one manifest URL
#[async_trait]
pub trait SegmentedClient: PlaybackControl {
    /// Begin (or re-begin) loading the bound manifest URL
    async fn load(&mut self) -> anyhow::Result<()>;

    /// In-place recovery for media-class fatal errors, without a full reload
    async fn recover_media_error(&mut self) -> anyhow::Result<()>;

    /// Tear down the client instance. Safe to call more than once.
    async fn destroy(&mut self);

    /// Take the event stream. Yields `None` if already taken.
    fn take_events(&mut self) -> Option<mpsc::Receiver<SegmentedEvent>>;
}

/// Real-time media client bound to one channel
#[async_trait]
pub trait RealtimeClient: PlaybackControl {
    /// Join the bound channel. Viewers always join receive-only.
    async fn join(&mut self) -> anyhow::Result<()>;

    /// Subscribe to a participant's video at the given tier.
    /// `allow_fallback=false` pins the tier instead of degrading with
    /// bandwidth.
    async fn subscribe_video(
        &mut self,
        id: &ParticipantId,
        tier: QualityTier,
        allow_fallback: bool,
    ) -> anyhow::Result<()>;

    /// Bind the participant's video track to the rendering surface.
    /// Resolves once the track is actually rendering.
    async fn bind_video(&mut self, id: &ParticipantId) -> anyhow::Result<()>;

    /// Start a participant's audio at the given volume. `low_latency`
    /// requests the smallest buffering the client supports.
    async fn play_audio(
        &mut self,
        id: &ParticipantId,
        volume: f32,
        low_latency: bool,
    ) -> anyhow::Result<PlayOutcome>;

    /// Unsubscribe everything and leave the channel. Idempotent; safe to call
    /// even if the join never completed.
    async fn leave(&mut self);

    /// Take the event stream. Yields `None` if already taken.
    fn take_events(&mut self) -> Option<mpsc::Receiver<RealtimeEvent>>;
}

/// Creates transport clients bound to a source descriptor.
///
/// The session controller injects one factory; each playback session gets a
/// fresh client instance so a manual retry always starts from a clean slate.
pub trait ClientFactory: Send + Sync {
    fn create_segmented(&self, manifest_url: &str) -> anyhow::Result<Box<dyn SegmentedClient>>;

    fn create_realtime(
        &self,
        channel_id: &str,
        token: Option<&str>,
    ) -> anyhow::Result<Box<dyn RealtimeClient>>;
}
