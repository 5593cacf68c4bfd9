//! Interaction gate: autoplay-policy tracking for unmuted playback.
//!
//! Browsers refuse unmuted audio until a real user gesture has occurred. The
//! gate records whether that gesture is still needed and whether it has been
//! granted; `granted` is monotonic within a session (false→true only). A new
//! session resets it to the caller-computed initial value, which may already
//! be true when the player was opened from a click.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use tracing::{debug, warn};

use crate::client::{PlayOutcome, PlaybackControl};
use crate::types::SessionOptions;

#[derive(Debug)]
pub struct InteractionGate {
    needs_gesture: AtomicBool,
    granted: AtomicBool,
    suppress_audio: bool,
}

impl InteractionGate {
    #[must_use]
    pub fn new(options: &SessionOptions) -> Self {
        Self {
            needs_gesture: AtomicBool::new(false),
            granted: AtomicBool::new(options.interaction_already_granted),
            suppress_audio: options.suppress_audio,
        }
    }

    /// UI should show a "tap to enable audio" affordance while true
    #[must_use]
    pub fn needs_gesture(&self) -> bool {
        self.needs_gesture.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn granted(&self) -> bool {
        self.granted.load(Ordering::SeqCst)
    }

    /// Operator/admin sessions force volume to zero and never prompt
    #[must_use]
    pub const fn suppressed(&self) -> bool {
        self.suppress_audio
    }

    /// Record that the platform blocked unmuted playback
    pub fn mark_blocked(&self) {
        if !self.suppress_audio {
            self.needs_gesture.store(true, Ordering::SeqCst);
        }
    }

    /// Attempt playback through the autoplay policy.
    ///
    /// Suppressed sessions play muted at zero volume and skip the gate
    /// entirely. Otherwise the attempt is unmuted when a gesture was already
    /// granted, muted when not; a blocked or silently-paused outcome marks
    /// the gesture as needed and falls back to muted playback so video keeps
    /// rendering.
    pub async fn attempt_playback(&self, client: &mut dyn PlaybackControl) -> Result<()> {
        if self.suppress_audio {
            client.set_volume(0.0).await?;
            let _ = client.play(true).await?;
            return Ok(());
        }

        let muted = !self.granted();
        match client.play(muted).await? {
            PlayOutcome::Started => {
                if muted {
                    // Video runs; audio still needs the gesture
                    self.mark_blocked();
                }
            }
            PlayOutcome::BlockedByAutoplay | PlayOutcome::PausedAfterStart => {
                self.mark_blocked();
                if !muted {
                    // Keep the video rendering while the prompt is shown
                    if let Err(e) = client.play(true).await {
                        warn!("muted fallback playback failed: {e}");
                    }
                }
            }
        }
        Ok(())
    }

    /// Apply an explicit user gesture: unmute, full volume, `granted` flips
    /// permanently for this session. The platform guarantees this is only
    /// reachable from a real gesture; the gate just exposes the call path.
    pub async fn apply_grant(&self, client: &mut dyn PlaybackControl) -> Result<()> {
        if self.suppress_audio {
            debug!("interaction grant ignored for audio-suppressed session");
            return Ok(());
        }
        client.set_muted(false).await?;
        client.set_volume(1.0).await?;
        self.grant();
        Ok(())
    }

    /// Flip `granted` true. Monotonic: nothing ever flips it back within a
    /// session.
    pub fn grant(&self) {
        if self.suppress_audio {
            return;
        }
        self.granted.store(true, Ordering::SeqCst);
        self.needs_gesture.store(false, Ordering::SeqCst);
    }
}
