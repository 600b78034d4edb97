//! The seam between session negotiation and whatever actually moves bytes.
//!
//! A `TransportFactory` produces one `TransportSession` per negotiated
//! session. Sessions report back asynchronously through the event sender in
//! their `SessionContext`; every event is tagged with the session kind and the
//! generation it was created for, so events from a discarded session can be
//! told apart from the live one.

use async_trait::async_trait;
use sketchpair_system::{Error, IceCandidate, SessionDescription, SessionKind};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

pub type Generation = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTrack {
    pub id: String,
    pub kind: TrackKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub id: String,
    pub kind: TrackKind,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The operation isn't valid yet, e.g. a candidate before the remote
    /// description.
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("closed")]
    Closed,
    #[error("{0}")]
    Backend(String),
}

impl TransportError {
    pub fn into_error(self, kind: SessionKind) -> Error {
        match self {
            TransportError::InvalidState(reason) | TransportError::Rejected(reason) => {
                Error::InvalidSessionState { kind, reason }
            }
            TransportError::Closed => Error::TransportUnavailable(format!("{} session closed", kind)),
            TransportError::Backend(reason) => Error::TransportUnavailable(reason),
        }
    }
}

#[derive(Debug)]
pub enum TransportEventKind {
    LocalCandidate(IceCandidate),
    StateChanged(TransportState),
    ChannelOpen(Arc<dyn DataChannel>),
    ChannelMessage(String),
    ChannelClosed,
    RemoteTrack(RemoteTrack),
}

#[derive(Debug)]
pub struct TransportEvent {
    pub kind: SessionKind,
    pub generation: Generation,
    pub event: TransportEventKind,
}

/// Everything a transport needs to know about the session it backs.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub kind: SessionKind,
    pub generation: Generation,
    /// Initiating data sessions create the sync channel; responders receive it.
    pub initiator: bool,
    pub data_channel_label: String,
    events: UnboundedSender<TransportEvent>,
}

impl SessionContext {
    pub fn new(
        kind: SessionKind,
        generation: Generation,
        initiator: bool,
        data_channel_label: impl Into<String>,
        events: UnboundedSender<TransportEvent>,
    ) -> Self {
        Self {
            kind,
            generation,
            initiator,
            data_channel_label: data_channel_label.into(),
            events,
        }
    }

    pub fn emit(&self, event: TransportEventKind) {
        let event = TransportEvent {
            kind: self.kind,
            generation: self.generation,
            event,
        };
        if self.events.send(event).is_err() {
            log::debug!("{} session {} outlived its peer", self.kind, self.generation);
        }
    }
}

#[async_trait]
pub trait DataChannel: Send + Sync + fmt::Debug {
    fn label(&self) -> &str;
    fn is_open(&self) -> bool;
    async fn send_text(&self, text: String) -> Result<(), TransportError>;
}

#[async_trait]
pub trait TransportSession: Send + Sync {
    /// Creates an offer and installs it as the local description.
    async fn create_offer(&self) -> Result<SessionDescription, TransportError>;
    /// Creates an answer to the remote offer and installs it as the local
    /// description.
    async fn create_answer(&self) -> Result<SessionDescription, TransportError>;
    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), TransportError>;
    /// Fails with `InvalidState` while no remote description is set.
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError>;
    async fn add_track(&self, track: &LocalTrack) -> Result<(), TransportError>;
    async fn close(&self);
}

#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create_session(
        &self,
        context: SessionContext,
    ) -> Result<Arc<dyn TransportSession>, TransportError>;
}
