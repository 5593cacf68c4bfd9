//! Real-time transport player adapter.
//!
//! Event-driven on a persistent channel connection; there is no polling and
//! no reload loop. The adapter joins receive-only, adopts the first published
//! video track, subscribes at the highest reported quality tier with
//! automatic fallback pinned off, and binds the track to the media surface.
//!
//! Failure handling keeps the last rendered frame wherever possible:
//! - decode exception on the active track: re-bind the same track after a
//!   short delay, without touching the surface; only when the re-bind itself
//!   fails is the surface rebuilt from scratch, and only when that fails too
//!   is the error terminal
//! - connection lost: budgeted rejoin after established playback, unbounded
//!   tiered waiting before it
//!
//! One pending timer action at most (a rejoin or a re-bind); it dies with
//! the session's cancellation token.

use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::{PlayOutcome, RealtimeClient, RealtimeEvent};
use crate::config::RetryConfig;
use crate::error::{ErrorKind, PlayerError};
use crate::gate::InteractionGate;
use crate::retry::RetryBudget;
use crate::session::AdapterCommand;
use crate::surface::SurfaceWriter;
use crate::types::{
    ParticipantId, PlaybackStatus, QualityTier, SessionOptions, StatusUpdate, TrackKind,
};

/// One remote publisher in the joined channel
#[derive(Debug, Clone)]
pub struct RemoteParticipant {
    pub id: ParticipantId,
    pub has_video_track: bool,
    pub has_audio_track: bool,
    /// Tier the adapter subscribed at, once a subscription exists
    pub video_quality_tier: Option<QualityTier>,
    /// Tiers the publisher reported as available (empty when unreported)
    pub available_tiers: Vec<QualityTier>,
}

impl RemoteParticipant {
    fn new(id: ParticipantId) -> Self {
        Self {
            id,
            has_video_track: false,
            has_audio_track: false,
            video_quality_tier: None,
            available_tiers: Vec::new(),
        }
    }
}

/// Deferred action scheduled behind the single pending timer
#[derive(Debug, Clone)]
enum PendingAction {
    Rejoin,
    Rebind(ParticipantId),
}

type ActionSlot = Option<(Pin<Box<tokio::time::Sleep>>, PendingAction)>;

/// Awaits the pending action's timer, or forever when none is scheduled
async fn action_due(slot: &mut ActionSlot) -> PendingAction {
    if let Some((sleep, _)) = slot.as_mut() {
        sleep.as_mut().await;
    } else {
        std::future::pending::<()>().await;
    }
    match slot.take() {
        Some((_, action)) => action,
        None => std::future::pending().await,
    }
}

pub(crate) struct RealtimeAdapter {
    session_id: String,
    channel_id: String,
    options: SessionOptions,
    client: Box<dyn RealtimeClient>,
    budget: RetryBudget,
    gate: Arc<InteractionGate>,
    writer: SurfaceWriter,
    status_tx: watch::Sender<StatusUpdate>,
    cancel: CancellationToken,

    /// Remote publishers, shared read-only with the session controller
    participants: Arc<DashMap<ParticipantId, RemoteParticipant>>,

    /// The participant whose video is bound to the surface, shared read-only
    /// with the session controller
    active_video: Arc<RwLock<Option<ParticipantId>>>,

    reached_playing: bool,
    terminal: bool,
}

impl RealtimeAdapter {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        session_id: String,
        channel_id: String,
        options: SessionOptions,
        client: Box<dyn RealtimeClient>,
        config: RetryConfig,
        gate: Arc<InteractionGate>,
        writer: SurfaceWriter,
        status_tx: watch::Sender<StatusUpdate>,
        cancel: CancellationToken,
        participants: Arc<DashMap<ParticipantId, RemoteParticipant>>,
        active_video: Arc<RwLock<Option<ParticipantId>>>,
    ) -> Self {
        Self {
            session_id,
            channel_id,
            options,
            client,
            budget: RetryBudget::new(config),
            gate,
            writer,
            status_tx,
            cancel,
            participants,
            active_video,
            reached_playing: false,
            terminal: false,
        }
    }

    pub(crate) async fn run(mut self, mut commands: mpsc::Receiver<AdapterCommand>) {
        let cancel = self.cancel.clone();

        if self.channel_id.is_empty()
            || (!self.options.is_broadcast_expected && !self.options.preview)
        {
            self.publish(PlaybackStatus::Offline, "broadcast is offline");
            cancel.cancelled().await;
            self.client.leave().await;
            return;
        }

        let Some(mut events) = self.client.take_events() else {
            self.publish_error(PlayerError::Fatal(
                "channel client event stream unavailable".to_string(),
            ));
            self.client.leave().await;
            return;
        };

        let mut pending: ActionSlot = None;

        self.writer.attach_output();
        self.publish(PlaybackStatus::Loading, "joining channel");
        if let Err(e) = self.client.join().await {
            self.handle_connect_failure(&e.to_string(), &mut pending);
        }

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                Some(cmd) = commands.recv() => self.handle_command(cmd).await,
                ev = events.recv() => match ev {
                    Some(ev) => self.handle_event(ev, &mut pending).await,
                    None => {
                        if !self.terminal && !cancel.is_cancelled() {
                            self.publish_error(PlayerError::Fatal(
                                "channel client closed unexpectedly".to_string(),
                            ));
                        }
                        break;
                    }
                },
                action = action_due(&mut pending) => {
                    self.handle_action(action, &mut pending).await;
                }
            }
        }

        // Unsubscribes everything and leaves; safe even if the join never
        // completed
        self.client.leave().await;
        debug!(session_id = %self.session_id, "realtime adapter stopped");
    }

    async fn handle_command(&mut self, cmd: AdapterCommand) {
        match cmd {
            AdapterCommand::GrantInteraction => {
                if let Err(e) = self.gate.apply_grant(self.client.as_mut()).await {
                    warn!(
                        session_id = %self.session_id,
                        "failed to apply interaction grant: {e}"
                    );
                }
            }
        }
    }

    async fn handle_event(&mut self, event: RealtimeEvent, pending: &mut ActionSlot) {
        if self.terminal {
            return;
        }
        match event {
            RealtimeEvent::Joined => {
                debug!(session_id = %self.session_id, channel_id = %self.channel_id, "channel joined");
                // Connected but nothing published yet: the broadcast has not
                // started. Publishes arrive as events; nothing to poll.
                if !self.has_published_video() && self.active_video.read().is_none() {
                    self.publish(PlaybackStatus::WaitingForSource, "waiting for broadcast");
                }
            }
            RealtimeEvent::ParticipantPublished { id, kind, tiers } => {
                self.handle_published(id, kind, tiers, pending).await;
            }
            RealtimeEvent::ParticipantUnpublished { id, kind } => {
                self.handle_unpublished(id, kind, pending).await;
            }
            RealtimeEvent::DecodeException { id, message } => {
                let is_active = self.active_video.read().as_ref() == Some(&id);
                if is_active {
                    warn!(
                        session_id = %self.session_id,
                        participant = %id,
                        "decode exception on active track, re-bind scheduled: {message}"
                    );
                    // The surface keeps its frame across the re-bind
                    *pending = Some((
                        Box::pin(tokio::time::sleep(self.budget.rebind_delay())),
                        PendingAction::Rebind(id),
                    ));
                } else {
                    debug!(
                        session_id = %self.session_id,
                        participant = %id,
                        "decode exception on inactive track ignored"
                    );
                }
            }
            RealtimeEvent::ConnectionLost { message } => {
                // Publishers re-announce themselves after a rejoin
                self.participants.clear();
                self.active_video.write().take();
                self.handle_connect_failure(&message, pending);
            }
        }
    }

    async fn handle_published(
        &mut self,
        id: ParticipantId,
        kind: TrackKind,
        tiers: Vec<QualityTier>,
        pending: &mut ActionSlot,
    ) {
        {
            let mut entry = self
                .participants
                .entry(id.clone())
                .or_insert_with(|| RemoteParticipant::new(id.clone()));
            match kind {
                TrackKind::Video => {
                    entry.has_video_track = true;
                    entry.available_tiers = tiers;
                }
                TrackKind::Audio => entry.has_audio_track = true,
            }
        }
        match kind {
            TrackKind::Video => {
                if self.active_video.read().is_none() {
                    self.adopt_video(id, pending).await;
                }
            }
            TrackKind::Audio => self.start_audio(id).await,
        }
    }

    async fn handle_unpublished(
        &mut self,
        id: ParticipantId,
        kind: TrackKind,
        pending: &mut ActionSlot,
    ) {
        let mut orphaned = false;
        if let Some(mut entry) = self.participants.get_mut(&id) {
            match kind {
                TrackKind::Video => {
                    entry.has_video_track = false;
                    entry.video_quality_tier = None;
                }
                TrackKind::Audio => entry.has_audio_track = false,
            }
            orphaned = !entry.has_video_track && !entry.has_audio_track;
        }
        // A participant with nothing published left the broadcast; a later
        // publish recreates the entry
        if orphaned {
            self.participants.remove(&id);
        }
        if kind != TrackKind::Video {
            return;
        }
        let was_active = self.active_video.read().as_ref() == Some(&id);
        if !was_active {
            return;
        }
        // Only the reference is cleared; the surface keeps its last frame so
        // the next publish is a fresh bind over retained content
        self.active_video.write().take();
        info!(session_id = %self.session_id, participant = %id, "active video unpublished");

        // Another publisher may already have video up
        let next = self
            .participants
            .iter()
            .find(|p| p.has_video_track)
            .map(|p| p.id.clone());
        if let Some(next) = next {
            self.adopt_video(next, pending).await;
        } else {
            self.publish(PlaybackStatus::WaitingForSource, "waiting for broadcast");
        }
    }

    /// Subscribe and bind a publisher's video. Tier is the highest the
    /// publisher reported, pinned: automatic quality fallback stays off so
    /// the raffle draw is never silently degraded.
    async fn adopt_video(&mut self, id: ParticipantId, pending: &mut ActionSlot) {
        let tiers = self
            .participants
            .get(&id)
            .map(|p| p.available_tiers.clone())
            .unwrap_or_default();
        let tier = QualityTier::highest_available(&tiers);

        if let Err(e) = self.client.subscribe_video(&id, tier, false).await {
            warn!(
                session_id = %self.session_id,
                participant = %id,
                "video subscribe failed: {e}"
            );
            self.publish(PlaybackStatus::WaitingForSource, "waiting for broadcast");
            return;
        }
        if let Some(mut entry) = self.participants.get_mut(&id) {
            entry.video_quality_tier = Some(tier);
        }

        match self.client.bind_video(&id).await {
            Ok(()) => {
                *self.active_video.write() = Some(id.clone());
                self.enter_playing();
                if let Err(e) = self.gate.attempt_playback(self.client.as_mut()).await {
                    warn!(session_id = %self.session_id, "playback attempt failed: {e}");
                }
            }
            Err(e) => {
                // Same recovery path as a decode exception; the frame stays up
                warn!(
                    session_id = %self.session_id,
                    participant = %id,
                    "initial bind failed, re-bind scheduled: {e}"
                );
                *self.active_video.write() = Some(id.clone());
                *pending = Some((
                    Box::pin(tokio::time::sleep(self.budget.rebind_delay())),
                    PendingAction::Rebind(id),
                ));
            }
        }
    }

    /// Audio plays immediately at full volume with the lowest-latency
    /// configuration; suppressed sessions play at volume zero and never see
    /// the gesture prompt.
    async fn start_audio(&mut self, id: ParticipantId) {
        let volume = if self.gate.suppressed() { 0.0 } else { 1.0 };
        match self.client.play_audio(&id, volume, true).await {
            Ok(PlayOutcome::Started) => {}
            Ok(_) => self.gate.mark_blocked(),
            Err(e) => warn!(
                session_id = %self.session_id,
                participant = %id,
                "audio playback failed: {e}"
            ),
        }
    }

    async fn handle_action(&mut self, action: PendingAction, pending: &mut ActionSlot) {
        if self.terminal {
            return;
        }
        match action {
            PendingAction::Rejoin => {
                debug!(session_id = %self.session_id, "rejoining channel");
                if let Err(e) = self.client.join().await {
                    self.handle_connect_failure(&e.to_string(), pending);
                }
            }
            PendingAction::Rebind(id) => self.rebind(id).await,
        }
    }

    /// Re-bind the active track after a decode exception. The surface is
    /// rebuilt only when the plain re-bind fails, and the error is terminal
    /// only when the bind fails again over the rebuilt surface.
    async fn rebind(&mut self, id: ParticipantId) {
        if let Err(first) = self.client.bind_video(&id).await {
            warn!(
                session_id = %self.session_id,
                participant = %id,
                "re-bind failed, rebuilding surface: {first}"
            );
            self.writer.rebuild();
            self.writer.attach_output();
            if let Err(second) = self.client.bind_video(&id).await {
                self.publish_error(PlayerError::MediaDecode(format!(
                    "video re-bind failed: {second}"
                )));
                return;
            }
        }
        self.enter_playing();
    }

    fn enter_playing(&mut self) {
        self.reached_playing = true;
        self.budget.reset();
        self.writer.commit_frame();
        self.publish(PlaybackStatus::Playing, "live");
    }

    /// Join failure or dropped connection. Budgeted rejoin after established
    /// playback; unbounded tiered waiting before it.
    fn handle_connect_failure(&mut self, message: &str, pending: &mut ActionSlot) {
        if self.reached_playing {
            if !self.budget.should_retry_reconnect() {
                self.publish_error(PlayerError::TransientNetwork(
                    "could not reconnect to the channel".to_string(),
                ));
                return;
            }
            let attempt = self.budget.record_reconnect_attempt();
            let max = self.budget.max_reconnect_attempts();
            warn!(
                session_id = %self.session_id,
                attempt,
                max,
                "channel connection lost, rejoining: {message}"
            );
            self.publish_with(
                PlaybackStatus::Reconnecting,
                format!("reconnecting (attempt {attempt}/{max})"),
                Some(ErrorKind::TransientNetwork),
            );
            *pending = Some((
                Box::pin(tokio::time::sleep(self.budget.reconnect_delay())),
                PendingAction::Rejoin,
            ));
        } else {
            let attempt = self.budget.record_waiting_attempt();
            let delay = self.budget.waiting_delay();
            let reason = if self.budget.waiting_exceeded() {
                "broadcast has not started"
            } else {
                "waiting for broadcast"
            };
            debug!(
                session_id = %self.session_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "channel not joinable yet, rejoin scheduled: {message}"
            );
            self.publish_with(
                PlaybackStatus::WaitingForSource,
                reason,
                Some(ErrorKind::SourceNotReady),
            );
            *pending = Some((Box::pin(tokio::time::sleep(delay)), PendingAction::Rejoin));
        }
    }

    fn has_published_video(&self) -> bool {
        self.participants.iter().any(|p| p.has_video_track)
    }

    fn publish(&self, status: PlaybackStatus, reason: impl Into<String>) {
        self.publish_with(status, reason, None);
    }

    fn publish_with(
        &self,
        status: PlaybackStatus,
        reason: impl Into<String>,
        last_error: Option<ErrorKind>,
    ) {
        let update = StatusUpdate {
            status,
            reason: reason.into(),
            reconnect_attempts: self.budget.reconnect_attempts(),
            waiting_attempts: self.budget.waiting_attempts(),
            last_error,
            changed_at: Utc::now(),
        };
        debug!(
            session_id = %self.session_id,
            status = ?update.status,
            reason = %update.reason,
            "status change"
        );
        self.status_tx.send_replace(update);
    }

    fn publish_error(&mut self, err: PlayerError) {
        self.terminal = true;
        error!(session_id = %self.session_id, kind = ?err.kind(), "terminal playback error: {err}");
        self.writer.show_error(err.message());
        self.publish_with(PlaybackStatus::Error, err.message().to_string(), Some(err.kind()));
    }
}
