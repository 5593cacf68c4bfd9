//! Playback session controller.
//!
//! One controller per player instance. It owns the media surface, picks the
//! adapter from the shape of the source descriptor, and exposes a single
//! normalized status channel regardless of transport.
//!
//! Descriptor switches are generation-fenced: the controller bumps the
//! surface's active generation and cancels the previous session before
//! spawning the next adapter, so a late timer, event, or status update from
//! a replaced session can neither touch the surface nor leak into the
//! controller's status channel. Two adapters never write to the same surface
//! concurrently.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use nanoid::nanoid;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::ClientFactory;
use crate::config::RetryConfig;
use crate::gate::InteractionGate;
use crate::realtime::{RealtimeAdapter, RemoteParticipant};
use crate::segmented::SegmentedAdapter;
use crate::surface::MediaSurface;
use crate::types::{
    ParticipantId, PlaybackStatus, SessionOptions, SourceDescriptor, StatusUpdate,
};

const COMMAND_BUFFER: usize = 8;
const SESSION_ID_LEN: usize = 10;

/// Commands the controller sends to the active adapter task
#[derive(Debug, Clone)]
pub(crate) enum AdapterCommand {
    GrantInteraction,
}

struct ActiveSession {
    id: String,
    generation: u64,
    descriptor: SourceDescriptor,
    options: SessionOptions,
    gate: Arc<InteractionGate>,
    commands: mpsc::Sender<AdapterCommand>,
    cancel: CancellationToken,
    participants: Arc<DashMap<ParticipantId, RemoteParticipant>>,
    active_video: Arc<RwLock<Option<ParticipantId>>>,
}

/// Live playback controller: one active session at a time, one surface,
/// one status contract.
pub struct PlaybackController {
    factory: Arc<dyn ClientFactory>,
    config: RetryConfig,
    surface: Arc<MediaSurface>,
    generation: Arc<AtomicU64>,
    session: Mutex<Option<ActiveSession>>,
    status_tx: watch::Sender<StatusUpdate>,
    status_rx: watch::Receiver<StatusUpdate>,
}

impl PlaybackController {
    #[must_use]
    pub fn new(factory: Arc<dyn ClientFactory>, config: RetryConfig) -> Self {
        let (status_tx, status_rx) =
            watch::channel(StatusUpdate::new(PlaybackStatus::Offline, "no source"));
        Self {
            factory,
            config,
            surface: Arc::new(MediaSurface::new()),
            generation: Arc::new(AtomicU64::new(0)),
            session: Mutex::new(None),
            status_tx,
            status_rx,
        }
    }

    /// Start playing `descriptor`, replacing any current session. The adapter
    /// is selected from the descriptor's shape. Must be called from within a
    /// tokio runtime.
    pub fn set_source(
        &self,
        descriptor: SourceDescriptor,
        options: SessionOptions,
    ) -> anyhow::Result<String> {
        self.teardown_current();

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let session_id = nanoid!(SESSION_ID_LEN);

        // Revokes every writer of the previous session before the new
        // adapter gets one
        self.surface.set_active_generation(generation);
        let writer = self.surface.writer(generation);

        let gate = Arc::new(InteractionGate::new(&options));
        let cancel = CancellationToken::new();
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let (adapter_tx, adapter_rx) =
            watch::channel(StatusUpdate::new(PlaybackStatus::Loading, "starting session"));
        let participants = Arc::new(DashMap::new());
        let active_video = Arc::new(RwLock::new(None));

        match &descriptor {
            SourceDescriptor::Manifest { url } => {
                let client = self.factory.create_segmented(url)?;
                let adapter = SegmentedAdapter::new(
                    session_id.clone(),
                    url.clone(),
                    options.clone(),
                    client,
                    self.config.clone(),
                    Arc::clone(&gate),
                    writer,
                    adapter_tx,
                    cancel.clone(),
                );
                tokio::spawn(adapter.run(cmd_rx));
            }
            SourceDescriptor::Channel { channel_id, token } => {
                let client = self.factory.create_realtime(channel_id, token.as_deref())?;
                let adapter = RealtimeAdapter::new(
                    session_id.clone(),
                    channel_id.clone(),
                    options.clone(),
                    client,
                    self.config.clone(),
                    Arc::clone(&gate),
                    writer,
                    adapter_tx,
                    cancel.clone(),
                    Arc::clone(&participants),
                    Arc::clone(&active_video),
                );
                tokio::spawn(adapter.run(cmd_rx));
            }
        }

        self.spawn_forwarder(generation, adapter_rx, cancel.clone());

        info!(
            session_id = %session_id,
            generation,
            transport = ?descriptor.transport_kind(),
            "playback session started"
        );

        *self.session.lock() = Some(ActiveSession {
            id: session_id.clone(),
            generation,
            descriptor,
            options,
            gate,
            commands: cmd_tx,
            cancel,
            participants,
            active_video,
        });
        Ok(session_id)
    }

    /// Stop playback and release the current session. The surface keeps its
    /// content; writers of the stopped session are revoked.
    pub fn stop(&self) {
        let taken = self.session.lock().take();
        if let Some(session) = taken {
            session.cancel.cancel();
            let next = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            self.surface.set_active_generation(next);
            self.status_tx
                .send_replace(StatusUpdate::new(PlaybackStatus::Offline, "playback stopped"));
            info!(session_id = %session.id, "playback session stopped");
        }
    }

    /// Manual retry: recreate the session from scratch with a fresh client,
    /// fresh budget, and a new generation. An already-granted interaction
    /// carries over so the user is not prompted twice.
    pub fn retry_now(&self) -> anyhow::Result<Option<String>> {
        let current = self.session.lock().as_ref().map(|session| {
            (
                session.descriptor.clone(),
                session.options.clone(),
                session.gate.granted(),
            )
        });
        match current {
            Some((descriptor, mut options, granted)) => {
                options.interaction_already_granted =
                    options.interaction_already_granted || granted;
                self.set_source(descriptor, options).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Report a user gesture: flips the gate immediately and tells the
    /// adapter to unmute at full volume.
    pub fn grant_interaction(&self) {
        let session = self.session.lock();
        if let Some(session) = session.as_ref() {
            session.gate.grant();
            if session
                .commands
                .try_send(AdapterCommand::GrantInteraction)
                .is_err()
            {
                warn!(session_id = %session.id, "interaction grant command dropped");
            }
        }
    }

    /// Whether the UI should show the tap-for-audio affordance
    #[must_use]
    pub fn needs_gesture(&self) -> bool {
        self.session
            .lock()
            .as_ref()
            .is_some_and(|session| session.gate.needs_gesture())
    }

    #[must_use]
    pub fn status(&self) -> StatusUpdate {
        self.status_rx.borrow().clone()
    }

    /// Normalized status channel, identical for both transports
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<StatusUpdate> {
        self.status_rx.clone()
    }

    #[must_use]
    pub fn surface(&self) -> &Arc<MediaSurface> {
        &self.surface
    }

    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.session.lock().as_ref().map(|session| session.id.clone())
    }

    /// Snapshot of the remote participants of the current real-time session
    /// (empty for segmented sessions)
    #[must_use]
    pub fn participants(&self) -> Vec<RemoteParticipant> {
        self.session
            .lock()
            .as_ref()
            .map(|session| {
                session
                    .participants
                    .iter()
                    .map(|entry| entry.value().clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The participant whose video is currently bound to the surface
    #[must_use]
    pub fn active_participant(&self) -> Option<ParticipantId> {
        self.session
            .lock()
            .as_ref()
            .and_then(|session| session.active_video.read().clone())
    }

    fn teardown_current(&self) {
        if let Some(session) = self.session.lock().take() {
            debug!(
                session_id = %session.id,
                generation = session.generation,
                "replacing playback session"
            );
            session.cancel.cancel();
        }
    }

    /// Forward adapter status into the controller channel while the adapter's
    /// generation is still the active one; stale updates are discarded.
    fn spawn_forwarder(
        &self,
        generation: u64,
        mut adapter_rx: watch::Receiver<StatusUpdate>,
        cancel: CancellationToken,
    ) {
        let active = Arc::clone(&self.generation);
        let tx = self.status_tx.clone();
        tokio::spawn(async move {
            // The initial value counts as an update too
            let first = adapter_rx.borrow_and_update().clone();
            if active.load(Ordering::SeqCst) == generation {
                tx.send_replace(first);
            }
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    changed = adapter_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let update = adapter_rx.borrow_and_update().clone();
                        if active.load(Ordering::SeqCst) == generation {
                            tx.send_replace(update);
                        }
                    }
                }
            }
        });
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.cancel.cancel();
        }
    }
}
