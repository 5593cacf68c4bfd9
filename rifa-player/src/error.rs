//! Error taxonomy for the playback core.
//!
//! Adapters classify raw transport-client errors into this taxonomy and report
//! only the kind + message upward; the session controller never inspects raw
//! client error objects.

use serde::Serialize;
use thiserror::Error;

/// Classified playback error
#[derive(Debug, Clone, Error)]
pub enum PlayerError {
    /// The broadcast has not started yet. Recoverable, retried indefinitely,
    /// never surfaced to the user as an error.
    #[error("source not ready: {0}")]
    SourceNotReady(String),

    /// Network failure during an established session. Recoverable within the
    /// retry budget; surfaced as "reconnecting".
    #[error("network failure: {0}")]
    TransientNetwork(String),

    /// Decode/media failure. Not retried by reloading the same source; at most
    /// one in-place recovery attempt.
    #[error("media decode failure: {0}")]
    MediaDecode(String),

    /// Unsupported source or fatal client failure. Terminal; destroys the
    /// adapter's client instance.
    #[error("fatal player error: {0}")]
    Fatal(String),
}

/// Error classification exposed to the UI layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SourceNotReady,
    TransientNetwork,
    MediaDecode,
    Fatal,
}

impl PlayerError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::SourceNotReady(_) => ErrorKind::SourceNotReady,
            Self::TransientNetwork(_) => ErrorKind::TransientNetwork,
            Self::MediaDecode(_) => ErrorKind::MediaDecode,
            Self::Fatal(_) => ErrorKind::Fatal,
        }
    }

    /// True for errors the adapter recovers from on its own (by waiting or
    /// reconnecting), false for terminal classifications.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::SourceNotReady(_) | Self::TransientNetwork(_))
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::SourceNotReady(m)
            | Self::TransientNetwork(m)
            | Self::MediaDecode(m)
            | Self::Fatal(m) => m,
        }
    }
}
