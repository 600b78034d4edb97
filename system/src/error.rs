use crate::SessionKind;

/// Nothing in here is fatal to the process. The worst outcome is degraded or
/// lost synchronization, which callers surface as a notification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The relay or the sync channel isn't open. The operation was applied
    /// locally but not propagated.
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    /// A description or candidate was applied out of order.
    #[error("invalid {kind} session state: {reason}")]
    InvalidSessionState { kind: SessionKind, reason: String },

    #[error("room is full")]
    RoomFull,

    /// Capture failed. The media session proceeds without local tracks.
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The single message is dropped, the connection stays up.
    #[error("malformed message: {0}")]
    MalformedMessage(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::MalformedMessage(e.to_string())
    }
}
