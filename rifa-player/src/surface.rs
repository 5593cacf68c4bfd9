//! Media surface with frame retention and generation-scoped write access.
//!
//! The surface is the single shared rendering target. It keeps its last
//! committed frame until a replacement has actually rendered; transient errors
//! never clear it. Only the currently-active adapter may write to it: the
//! session controller bumps the active generation before attaching a new
//! adapter, which silently revokes every writer issued for an older
//! generation. A stale timer or late callback therefore cannot touch the
//! surface of the session that replaced it.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Identifier of one attached rendering output (video element or equivalent)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputId(u64);

#[derive(Debug, Default)]
struct SurfaceState {
    /// Whether the surface currently shows a committed frame
    has_content: bool,

    /// Attached rendering outputs, oldest first. More than one accumulates
    /// only briefly during a transport swap.
    outputs: Vec<OutputId>,

    /// Explicit error affordance, set only on fatal unrecoverable failures
    error_affordance: Option<String>,

    next_output: u64,

    /// Number of times committed content was dropped (rebuilds). Transient
    /// errors must never increase this.
    clears: u64,
}

/// The single rendering target shared by all sessions of one player instance
#[derive(Debug, Default)]
pub struct MediaSurface {
    state: RwLock<SurfaceState>,
    active_generation: AtomicU64,
}

impl MediaSurface {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant write access for `generation`, revoking all older writers.
    pub fn set_active_generation(&self, generation: u64) {
        self.active_generation.store(generation, Ordering::SeqCst);
    }

    /// Issue a write capability scoped to `generation`. Writes are accepted
    /// only while that generation is the active one.
    #[must_use]
    pub fn writer(self: &Arc<Self>, generation: u64) -> SurfaceWriter {
        SurfaceWriter {
            surface: Arc::clone(self),
            generation,
        }
    }

    #[must_use]
    pub fn has_content(&self) -> bool {
        self.state.read().has_content
    }

    #[must_use]
    pub fn error_affordance(&self) -> Option<String> {
        self.state.read().error_affordance.clone()
    }

    #[must_use]
    pub fn output_count(&self) -> usize {
        self.state.read().outputs.len()
    }

    /// How many times committed content was dropped. Used to verify frame
    /// retention: stays at zero across transient failures.
    #[must_use]
    pub fn clear_count(&self) -> u64 {
        self.state.read().clears
    }

    fn is_active(&self, generation: u64) -> bool {
        self.active_generation.load(Ordering::SeqCst) == generation
    }
}

/// Generation-scoped write capability for the media surface.
///
/// Every mutating call returns whether it was accepted; calls from a writer
/// whose generation has been revoked are no-ops.
#[derive(Debug, Clone)]
pub struct SurfaceWriter {
    surface: Arc<MediaSurface>,
    generation: u64,
}

impl SurfaceWriter {
    /// Attach a new rendering output. The previous output stays attached (and
    /// keeps its frame) until the new one has rendered.
    pub fn attach_output(&self) -> Option<OutputId> {
        if !self.surface.is_active(self.generation) {
            return None;
        }
        let mut state = self.surface.state.write();
        state.next_output += 1;
        let id = OutputId(state.next_output);
        state.outputs.push(id);
        Some(id)
    }

    /// Record that a frame has rendered on the most recent output. Clears any
    /// error affordance and prunes the outputs that the new frame replaces.
    pub fn commit_frame(&self) -> bool {
        if !self.surface.is_active(self.generation) {
            return false;
        }
        let mut state = self.surface.state.write();
        state.has_content = true;
        state.error_affordance = None;
        // All but the most recently attached output are now stale
        if state.outputs.len() > 1 {
            let newest = state.outputs[state.outputs.len() - 1];
            debug!(pruned = state.outputs.len() - 1, "pruning stale outputs");
            state.outputs = vec![newest];
        }
        true
    }

    /// Drop committed content so the surface can be rebuilt from scratch.
    /// Last-resort path only: a re-bind attempt must have already failed.
    pub fn rebuild(&self) -> bool {
        if !self.surface.is_active(self.generation) {
            return false;
        }
        let mut state = self.surface.state.write();
        if state.has_content {
            state.clears += 1;
        }
        state.has_content = false;
        state.outputs.clear();
        true
    }

    /// Replace the surface content with an explicit error affordance.
    /// Permitted only after the retry budget is exhausted or a terminal
    /// classification is reached; the last frame itself is retained.
    pub fn show_error(&self, message: impl Into<String>) -> bool {
        if !self.surface.is_active(self.generation) {
            return false;
        }
        self.surface.state.write().error_affordance = Some(message.into());
        true
    }

    #[must_use]
    pub fn surface(&self) -> &Arc<MediaSurface> {
        &self.surface
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}
