//! Rifa live playback core
//!
//! Playback and resilience controller for watching live raffle draws. The UI
//! layer hands in a source descriptor and gets back one normalized status
//! stream; everything between — transport selection, retries, autoplay
//! policy, frame retention — lives here.
//!
//! ## Architecture
//!
//! - **`PlaybackController`**: one active session at a time; selects the
//!   adapter from the descriptor shape and fences session switches by
//!   surface generation
//! - **`SegmentedAdapter`** / **`RealtimeAdapter`** (internal): per-transport
//!   state machines over wrapped black-box clients
//! - **`MediaSurface`**: single rendering target with frame retention and
//!   generation-scoped writers
//! - **`RetryBudget`**: bounded reconnects, unbounded two-tier waiting
//! - **`InteractionGate`**: autoplay-policy tracking for unmuted playback
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rifa_player::{PlaybackController, RetryConfig, SessionOptions, SourceDescriptor};
//!
//! let controller = PlaybackController::new(client_factory, RetryConfig::default());
//! controller.set_source(
//!     SourceDescriptor::Manifest { url: manifest_url },
//!     SessionOptions::default(),
//! )?;
//!
//! let mut status = controller.subscribe();
//! while status.changed().await.is_ok() {
//!     render(&status.borrow());
//! }
//! ```

mod client;
mod config;
mod error;
mod gate;
mod realtime;
mod retry;
mod segmented;
mod session;
mod surface;
mod types;

#[cfg(test)]
mod testing;

pub use client::{
    ClientFactory, PlayOutcome, PlaybackControl, RealtimeClient, RealtimeEvent, SegmentedClient,
    SegmentedEvent, StreamErrorClass,
};
pub use config::RetryConfig;
pub use error::{ErrorKind, PlayerError};
pub use gate::InteractionGate;
pub use realtime::RemoteParticipant;
pub use retry::RetryBudget;
pub use session::PlaybackController;
pub use surface::{MediaSurface, OutputId, SurfaceWriter};
pub use types::{
    ParticipantId, PlaybackStatus, QualityTier, SessionOptions, SourceDescriptor, StatusUpdate,
    TrackKind, TransportKind,
};
