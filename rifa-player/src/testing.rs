//! Scripted transport clients and probes for tests.
//!
//! The scripted clients answer `load()`/`join()` from a pre-loaded script and
//! expose an injection sender so tests can fire events mid-playback. Handles
//! are cheaply cloneable views onto the shared counters and call logs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use crate::client::{
    ClientFactory, PlayOutcome, PlaybackControl, RealtimeClient, RealtimeEvent, SegmentedClient,
    SegmentedEvent,
};
use crate::types::{ParticipantId, QualityTier, StatusUpdate};

/// Install a fmt subscriber honoring `RUST_LOG` so adapter traces show up
/// when a scenario fails. Safe to call from every test; only the first
/// installation wins.
pub(crate) fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_test_writer()
        .try_init();
}

/// Collect every status update from a watch channel into a shared vec.
/// The collector task exits when the sender side is dropped.
pub(crate) fn watch_statuses(
    mut rx: watch::Receiver<StatusUpdate>,
) -> Arc<Mutex<Vec<StatusUpdate>>> {
    let history = Arc::new(Mutex::new(vec![rx.borrow().clone()]));
    let collected = Arc::clone(&history);
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let update = rx.borrow_and_update().clone();
            collected.lock().push(update);
        }
    });
    history
}

/// Minimal `PlaybackControl` probe recording every call it receives
pub(crate) struct ControlProbe {
    outcome: PlayOutcome,
    pub play_calls: Vec<bool>,
    pub muted_calls: Vec<bool>,
    pub volumes: Vec<f32>,
}

impl ControlProbe {
    pub fn new(outcome: PlayOutcome) -> Self {
        Self {
            outcome,
            play_calls: Vec::new(),
            muted_calls: Vec::new(),
            volumes: Vec::new(),
        }
    }
}

#[async_trait]
impl PlaybackControl for ControlProbe {
    async fn play(&mut self, muted: bool) -> Result<PlayOutcome> {
        self.play_calls.push(muted);
        Ok(self.outcome)
    }

    async fn set_muted(&mut self, muted: bool) -> Result<()> {
        self.muted_calls.push(muted);
        Ok(())
    }

    async fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.volumes.push(volume);
        Ok(())
    }
}

/// Script for a segmented client: one event is emitted per `load()` call,
/// in order; an empty queue means the load goes silent.
pub(crate) struct SegmentedScript {
    pub on_load: VecDeque<SegmentedEvent>,
    pub fail_recovery: bool,
    pub play_outcome: PlayOutcome,
}

impl Default for SegmentedScript {
    fn default() -> Self {
        Self {
            on_load: VecDeque::new(),
            fail_recovery: false,
            play_outcome: PlayOutcome::Started,
        }
    }
}

impl SegmentedScript {
    pub fn on_load(events: Vec<SegmentedEvent>) -> Self {
        Self {
            on_load: events.into(),
            ..Self::default()
        }
    }
}

#[derive(Clone)]
pub(crate) struct SegmentedHandle {
    events: mpsc::Sender<SegmentedEvent>,
    recovery_events: Arc<Mutex<VecDeque<SegmentedEvent>>>,
    pub load_calls: Arc<AtomicU32>,
    pub recover_calls: Arc<AtomicU32>,
    pub destroyed: Arc<AtomicBool>,
    pub play_calls: Arc<Mutex<Vec<bool>>>,
    pub muted_calls: Arc<Mutex<Vec<bool>>>,
    pub volumes: Arc<Mutex<Vec<f32>>>,
}

impl SegmentedHandle {
    /// Fire an event as if the underlying stream client raised it
    pub async fn inject(&self, event: SegmentedEvent) {
        let _ = self.events.send(event).await;
    }

    /// Queue an event to be emitted by the next `recover_media_error()` call
    pub fn queue_recovery_event(&self, event: SegmentedEvent) {
        self.recovery_events.lock().push_back(event);
    }
}

pub(crate) struct ScriptedSegmentedClient {
    script: Arc<Mutex<VecDeque<SegmentedEvent>>>,
    recovery_events: Arc<Mutex<VecDeque<SegmentedEvent>>>,
    fail_recovery: bool,
    play_outcome: PlayOutcome,
    events_tx: mpsc::Sender<SegmentedEvent>,
    events_rx: Option<mpsc::Receiver<SegmentedEvent>>,
    load_calls: Arc<AtomicU32>,
    recover_calls: Arc<AtomicU32>,
    destroyed: Arc<AtomicBool>,
    play_calls: Arc<Mutex<Vec<bool>>>,
    muted_calls: Arc<Mutex<Vec<bool>>>,
    volumes: Arc<Mutex<Vec<f32>>>,
}

pub(crate) fn scripted_segmented(
    script: SegmentedScript,
) -> (ScriptedSegmentedClient, SegmentedHandle) {
    let (events_tx, events_rx) = mpsc::channel(32);
    let client = ScriptedSegmentedClient {
        script: Arc::new(Mutex::new(script.on_load)),
        recovery_events: Arc::new(Mutex::new(VecDeque::new())),
        fail_recovery: script.fail_recovery,
        play_outcome: script.play_outcome,
        events_tx: events_tx.clone(),
        events_rx: Some(events_rx),
        load_calls: Arc::new(AtomicU32::new(0)),
        recover_calls: Arc::new(AtomicU32::new(0)),
        destroyed: Arc::new(AtomicBool::new(false)),
        play_calls: Arc::new(Mutex::new(Vec::new())),
        muted_calls: Arc::new(Mutex::new(Vec::new())),
        volumes: Arc::new(Mutex::new(Vec::new())),
    };
    let handle = SegmentedHandle {
        events: events_tx,
        recovery_events: Arc::clone(&client.recovery_events),
        load_calls: Arc::clone(&client.load_calls),
        recover_calls: Arc::clone(&client.recover_calls),
        destroyed: Arc::clone(&client.destroyed),
        play_calls: Arc::clone(&client.play_calls),
        muted_calls: Arc::clone(&client.muted_calls),
        volumes: Arc::clone(&client.volumes),
    };
    (client, handle)
}

#[async_trait]
impl PlaybackControl for ScriptedSegmentedClient {
    async fn play(&mut self, muted: bool) -> Result<PlayOutcome> {
        self.play_calls.lock().push(muted);
        Ok(self.play_outcome)
    }

    async fn set_muted(&mut self, muted: bool) -> Result<()> {
        self.muted_calls.lock().push(muted);
        Ok(())
    }

    async fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.volumes.lock().push(volume);
        Ok(())
    }
}

#[async_trait]
impl SegmentedClient for ScriptedSegmentedClient {
    async fn load(&mut self) -> Result<()> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().pop_front();
        if let Some(event) = next {
            let _ = self.events_tx.send(event).await;
        }
        Ok(())
    }

    async fn recover_media_error(&mut self) -> Result<()> {
        self.recover_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_recovery {
            return Err(anyhow!("scripted recovery failure"));
        }
        let next = self.recovery_events.lock().pop_front();
        if let Some(event) = next {
            let _ = self.events_tx.send(event).await;
        }
        Ok(())
    }

    async fn destroy(&mut self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }

    fn take_events(&mut self) -> Option<mpsc::Receiver<SegmentedEvent>> {
        self.events_rx.take()
    }
}

/// Script for a realtime client. `join_results` answers successive `join()`
/// calls (exhausted means success); each successful join emits `Joined` plus
/// the next `on_join` batch. `bind_results` answers successive `bind_video()`
/// calls the same way.
#[derive(Default)]
pub(crate) struct RealtimeScript {
    pub join_results: VecDeque<Result<()>>,
    pub on_join: VecDeque<Vec<RealtimeEvent>>,
    pub bind_results: VecDeque<Result<()>>,
}

impl RealtimeScript {
    pub fn on_join(batches: Vec<Vec<RealtimeEvent>>) -> Self {
        Self {
            on_join: batches.into(),
            ..Self::default()
        }
    }
}

#[derive(Clone)]
pub(crate) struct RealtimeHandle {
    events: mpsc::Sender<RealtimeEvent>,
    bind_results: Arc<Mutex<VecDeque<Result<()>>>>,
    pub join_calls: Arc<AtomicU32>,
    pub leave_calls: Arc<AtomicU32>,
    pub subscriptions: Arc<Mutex<Vec<(ParticipantId, QualityTier, bool)>>>,
    pub bind_calls: Arc<Mutex<Vec<ParticipantId>>>,
    pub audio_plays: Arc<Mutex<Vec<(ParticipantId, f32, bool)>>>,
    pub play_calls: Arc<Mutex<Vec<bool>>>,
    pub muted_calls: Arc<Mutex<Vec<bool>>>,
    pub volumes: Arc<Mutex<Vec<f32>>>,
}

impl RealtimeHandle {
    pub async fn inject(&self, event: RealtimeEvent) {
        let _ = self.events.send(event).await;
    }

    /// Queue the result for the next `bind_video()` call
    pub fn queue_bind_result(&self, result: Result<()>) {
        self.bind_results.lock().push_back(result);
    }
}

pub(crate) struct ScriptedRealtimeClient {
    join_results: Arc<Mutex<VecDeque<Result<()>>>>,
    on_join: Arc<Mutex<VecDeque<Vec<RealtimeEvent>>>>,
    bind_results: Arc<Mutex<VecDeque<Result<()>>>>,
    events_tx: mpsc::Sender<RealtimeEvent>,
    events_rx: Option<mpsc::Receiver<RealtimeEvent>>,
    join_calls: Arc<AtomicU32>,
    leave_calls: Arc<AtomicU32>,
    subscriptions: Arc<Mutex<Vec<(ParticipantId, QualityTier, bool)>>>,
    bind_calls: Arc<Mutex<Vec<ParticipantId>>>,
    audio_plays: Arc<Mutex<Vec<(ParticipantId, f32, bool)>>>,
    play_calls: Arc<Mutex<Vec<bool>>>,
    muted_calls: Arc<Mutex<Vec<bool>>>,
    volumes: Arc<Mutex<Vec<f32>>>,
}

pub(crate) fn scripted_realtime(
    script: RealtimeScript,
) -> (ScriptedRealtimeClient, RealtimeHandle) {
    let (events_tx, events_rx) = mpsc::channel(32);
    let client = ScriptedRealtimeClient {
        join_results: Arc::new(Mutex::new(script.join_results)),
        on_join: Arc::new(Mutex::new(script.on_join)),
        bind_results: Arc::new(Mutex::new(script.bind_results)),
        events_tx: events_tx.clone(),
        events_rx: Some(events_rx),
        join_calls: Arc::new(AtomicU32::new(0)),
        leave_calls: Arc::new(AtomicU32::new(0)),
        subscriptions: Arc::new(Mutex::new(Vec::new())),
        bind_calls: Arc::new(Mutex::new(Vec::new())),
        audio_plays: Arc::new(Mutex::new(Vec::new())),
        play_calls: Arc::new(Mutex::new(Vec::new())),
        muted_calls: Arc::new(Mutex::new(Vec::new())),
        volumes: Arc::new(Mutex::new(Vec::new())),
    };
    let handle = RealtimeHandle {
        events: events_tx,
        bind_results: Arc::clone(&client.bind_results),
        join_calls: Arc::clone(&client.join_calls),
        leave_calls: Arc::clone(&client.leave_calls),
        subscriptions: Arc::clone(&client.subscriptions),
        bind_calls: Arc::clone(&client.bind_calls),
        audio_plays: Arc::clone(&client.audio_plays),
        play_calls: Arc::clone(&client.play_calls),
        muted_calls: Arc::clone(&client.muted_calls),
        volumes: Arc::clone(&client.volumes),
    };
    (client, handle)
}

#[async_trait]
impl PlaybackControl for ScriptedRealtimeClient {
    async fn play(&mut self, muted: bool) -> Result<PlayOutcome> {
        self.play_calls.lock().push(muted);
        Ok(PlayOutcome::Started)
    }

    async fn set_muted(&mut self, muted: bool) -> Result<()> {
        self.muted_calls.lock().push(muted);
        Ok(())
    }

    async fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.volumes.lock().push(volume);
        Ok(())
    }
}

#[async_trait]
impl RealtimeClient for ScriptedRealtimeClient {
    async fn join(&mut self) -> Result<()> {
        self.join_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(result) = self.join_results.lock().pop_front() {
            result?;
        }
        let _ = self.events_tx.send(RealtimeEvent::Joined).await;
        let batch = self.on_join.lock().pop_front().unwrap_or_default();
        for event in batch {
            let _ = self.events_tx.send(event).await;
        }
        Ok(())
    }

    async fn subscribe_video(
        &mut self,
        id: &ParticipantId,
        tier: QualityTier,
        allow_fallback: bool,
    ) -> Result<()> {
        self.subscriptions.lock().push((id.clone(), tier, allow_fallback));
        Ok(())
    }

    async fn bind_video(&mut self, id: &ParticipantId) -> Result<()> {
        self.bind_calls.lock().push(id.clone());
        match self.bind_results.lock().pop_front() {
            Some(result) => result,
            None => Ok(()),
        }
    }

    async fn play_audio(
        &mut self,
        id: &ParticipantId,
        volume: f32,
        low_latency: bool,
    ) -> Result<PlayOutcome> {
        self.audio_plays.lock().push((id.clone(), volume, low_latency));
        Ok(PlayOutcome::Started)
    }

    async fn leave(&mut self) {
        self.leave_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn take_events(&mut self) -> Option<mpsc::Receiver<RealtimeEvent>> {
        self.events_rx.take()
    }
}

/// Factory handing out scripted clients in queue order; defaults to a client
/// that reports ready immediately when no script was queued.
#[derive(Default)]
pub(crate) struct MockFactory {
    segmented_scripts: Mutex<VecDeque<SegmentedScript>>,
    realtime_scripts: Mutex<VecDeque<RealtimeScript>>,
    pub segmented_handles: Mutex<Vec<SegmentedHandle>>,
    pub realtime_handles: Mutex<Vec<RealtimeHandle>>,
    pub segmented_urls: Mutex<Vec<String>>,
    pub realtime_channels: Mutex<Vec<(String, Option<String>)>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_segmented(&self, script: SegmentedScript) {
        self.segmented_scripts.lock().push_back(script);
    }

    pub fn push_realtime(&self, script: RealtimeScript) {
        self.realtime_scripts.lock().push_back(script);
    }
}

impl ClientFactory for MockFactory {
    fn create_segmented(&self, manifest_url: &str) -> Result<Box<dyn SegmentedClient>> {
        let script = self
            .segmented_scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| SegmentedScript::on_load(vec![SegmentedEvent::Ready]));
        let (client, handle) = scripted_segmented(script);
        self.segmented_urls.lock().push(manifest_url.to_string());
        self.segmented_handles.lock().push(handle);
        Ok(Box::new(client))
    }

    fn create_realtime(
        &self,
        channel_id: &str,
        token: Option<&str>,
    ) -> Result<Box<dyn RealtimeClient>> {
        let script = self.realtime_scripts.lock().pop_front().unwrap_or_default();
        let (client, handle) = scripted_realtime(script);
        self.realtime_channels
            .lock()
            .push((channel_id.to_string(), token.map(str::to_string)));
        self.realtime_handles.lock().push(handle);
        Ok(Box::new(client))
    }
}
