//! Segmented-HTTP stream player adapter.
//!
//! Drives one segmented-stream client bound to one manifest URL through the
//! normalized status machine:
//!
//! Loading → Playing → (Reconnecting | WaitingForSource | Error) → Playing | Offline
//!
//! Two failure paths with very different shapes:
//! - Source not ready (broadcast expected, nothing served yet): reload on a
//!   two-tier delay schedule, forever. Never terminal, never an "error" to
//!   the user.
//! - Network failure after playback was established: reload on a fixed delay,
//!   bounded by the retry budget. Exhaustion is terminal until a manual
//!   retry.
//!
//! The adapter runs as a single `select!` task over client events, at most
//! one pending reload timer, the command channel, and the session's
//! cancellation token. The timer dies with the token, so a reload can never
//! outlive its session.

use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::client::{SegmentedClient, SegmentedEvent, StreamErrorClass};
use crate::config::RetryConfig;
use crate::error::{ErrorKind, PlayerError};
use crate::gate::InteractionGate;
use crate::retry::RetryBudget;
use crate::session::AdapterCommand;
use crate::surface::SurfaceWriter;
use crate::types::{PlaybackStatus, SessionOptions, StatusUpdate};

/// Slot for the single pending reload timer
type ReloadSlot = Option<Pin<Box<tokio::time::Sleep>>>;

/// Awaits the pending reload, or forever when none is scheduled
async fn reload_due(slot: &mut ReloadSlot) {
    match slot.as_mut() {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

pub(crate) struct SegmentedAdapter {
    session_id: String,
    manifest_url: String,
    options: SessionOptions,
    client: Box<dyn SegmentedClient>,
    budget: RetryBudget,
    gate: Arc<InteractionGate>,
    writer: SurfaceWriter,
    status_tx: watch::Sender<StatusUpdate>,
    cancel: CancellationToken,

    /// Whether Playing was ever reached in this session; decides between the
    /// waiting path and the reconnect path on network-class failures
    reached_playing: bool,

    /// In-place media recovery is attempted at most once per Playing stretch
    media_recovery_attempted: bool,

    /// Terminal error published; further events are ignored
    terminal: bool,
}

impl SegmentedAdapter {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        session_id: String,
        manifest_url: String,
        options: SessionOptions,
        client: Box<dyn SegmentedClient>,
        config: RetryConfig,
        gate: Arc<InteractionGate>,
        writer: SurfaceWriter,
        status_tx: watch::Sender<StatusUpdate>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session_id,
            manifest_url,
            options,
            client,
            budget: RetryBudget::new(config),
            gate,
            writer,
            status_tx,
            cancel,
            reached_playing: false,
            media_recovery_attempted: false,
            terminal: false,
        }
    }

    pub(crate) async fn run(mut self, mut commands: mpsc::Receiver<AdapterCommand>) {
        let cancel = self.cancel.clone();

        // No usable source, or nothing scheduled: offline, no load attempted
        if self.manifest_url.is_empty()
            || (!self.options.is_broadcast_expected && !self.options.preview)
        {
            self.publish(PlaybackStatus::Offline, "broadcast is offline");
            cancel.cancelled().await;
            self.client.destroy().await;
            return;
        }

        let Some(mut events) = self.client.take_events() else {
            self.publish_error(PlayerError::Fatal(
                "stream client event channel unavailable".to_string(),
            ));
            self.client.destroy().await;
            return;
        };

        let mut reload_at: ReloadSlot = None;

        self.writer.attach_output();
        self.publish(PlaybackStatus::Loading, "loading stream");
        if let Err(e) = self.client.load().await {
            self.handle_load_failure(&e.to_string(), &mut reload_at);
        }

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                Some(cmd) = commands.recv() => self.handle_command(cmd).await,
                ev = events.recv() => match ev {
                    Some(ev) => self.handle_event(ev, &mut reload_at).await,
                    None => {
                        if !self.terminal && !cancel.is_cancelled() {
                            self.publish_error(PlayerError::Fatal(
                                "stream client closed unexpectedly".to_string(),
                            ));
                        }
                        break;
                    }
                },
                () = reload_due(&mut reload_at) => {
                    reload_at = None;
                    self.reload(&mut reload_at).await;
                }
            }
        }

        self.client.destroy().await;
        debug!(session_id = %self.session_id, "segmented adapter stopped");
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

    async fn handle_event(&mut self, event: SegmentedEvent, reload_at: &mut ReloadSlot) {
        if self.terminal {
            return;
        }
        match event {
            SegmentedEvent::Ready => {
                self.reached_playing = true;
                self.media_recovery_attempted = false;
                self.budget.reset();
                self.writer.commit_frame();
                self.publish(PlaybackStatus::Playing, "live");
                if let Err(e) = self.gate.attempt_playback(self.client.as_mut()).await {
                    warn!(session_id = %self.session_id, "playback attempt failed: {e}");
                }
            }
            SegmentedEvent::Stalled => {
                // Stalling on this transport usually shares a cause with
                // network errors; take the same reconnect path
                if self.reached_playing {
                    self.enter_reconnecting("stream stalled", reload_at);
                }
            }
            SegmentedEvent::Error {
                class,
                fatal,
                message,
            } => self.handle_stream_error(class, fatal, message, reload_at).await,
        }
    }

    async fn handle_stream_error(
        &mut self,
        class: StreamErrorClass,
        fatal: bool,
        message: String,
        reload_at: &mut ReloadSlot,
    ) {
        match class {
            StreamErrorClass::Network => {
                if self.reached_playing {
                    self.enter_reconnecting(&message, reload_at);
                } else {
                    self.enter_waiting(reload_at);
                }
            }
            StreamErrorClass::Media => {
                if fatal && !self.media_recovery_attempted {
                    self.media_recovery_attempted = true;
                    warn!(
                        session_id = %self.session_id,
                        "media error, attempting in-place recovery: {message}"
                    );
                    if let Err(e) = self.client.recover_media_error().await {
                        self.publish_error(PlayerError::MediaDecode(format!(
                            "media recovery failed: {e}"
                        )));
                    }
                } else {
                    // Aborts and decode failures are not fixed by reloading
                    // the same source
                    self.publish_error(PlayerError::MediaDecode(message));
                }
            }
            StreamErrorClass::Other => {
                if fatal || self.reached_playing {
                    self.client.destroy().await;
                    self.publish_error(PlayerError::Fatal(message));
                } else {
                    // Unsupported-source noise before playback established
                    // behaves like an absent source
                    self.enter_waiting(reload_at);
                }
            }
        }
    }

    fn handle_load_failure(&mut self, message: &str, reload_at: &mut ReloadSlot) {
        if self.reached_playing {
            self.enter_reconnecting(message, reload_at);
        } else {
            self.enter_waiting(reload_at);
        }
    }

    async fn reload(&mut self, reload_at: &mut ReloadSlot) {
        if self.terminal {
            return;
        }
        debug!(session_id = %self.session_id, "reloading stream");
        if let Err(e) = self.client.load().await {
            self.handle_load_failure(&e.to_string(), reload_at);
        }
    }

    /// Source not ready: schedule a reload on the tiered delay. Never
    /// terminal; after the threshold only the message and the tier change.
    fn enter_waiting(&mut self, reload_at: &mut ReloadSlot) {
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
            "source not ready, reload scheduled"
        );
        self.publish_with(
            PlaybackStatus::WaitingForSource,
            reason,
            Some(ErrorKind::SourceNotReady),
        );
        *reload_at = Some(Box::pin(tokio::time::sleep(delay)));
    }

    /// Network failure after established playback: budgeted reconnect, or
    /// terminal when the budget is spent.
    fn enter_reconnecting(&mut self, message: &str, reload_at: &mut ReloadSlot) {
        if !self.budget.should_retry_reconnect() {
            self.publish_error(PlayerError::TransientNetwork(
                "could not reconnect to the broadcast".to_string(),
            ));
            return;
        }
        let attempt = self.budget.record_reconnect_attempt();
        let max = self.budget.max_reconnect_attempts();
        warn!(
            session_id = %self.session_id,
            attempt,
            max,
            "network failure, reconnecting: {message}"
        );
        self.publish_with(
            PlaybackStatus::Reconnecting,
            format!("reconnecting (attempt {attempt}/{max})"),
            Some(ErrorKind::TransientNetwork),
        );
        *reload_at = Some(Box::pin(tokio::time::sleep(self.budget.reconnect_delay())));
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

    /// Terminal classification: error affordance on the surface (the last
    /// frame itself is retained), Error status, events ignored from here on.
    /// Only a manual retry, which recreates the session, continues.
    fn publish_error(&mut self, err: PlayerError) {
        self.terminal = true;
        error!(session_id = %self.session_id, kind = ?err.kind(), "terminal playback error: {err}");
        self.writer.show_error(err.message());
        self.publish_with(PlaybackStatus::Error, err.message().to_string(), Some(err.kind()));
    }
}
