//! An in-process transport. Descriptions and candidates are opaque strings
//! naming the endpoint that produced them, so a full offer/answer exchange has
//! to travel through the relay exactly as it would with a real transport.
//! The connection comes up when the offerer applies the answer.

use async_trait::async_trait;
use sketchpair_system::{IceCandidate, SdpType, SessionDescription, SessionKind};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::transport::{
    DataChannel, LocalTrack, RemoteTrack, SessionContext, TransportError, TransportEventKind,
    TransportFactory, TransportSession, TransportState,
};

type EndpointId = u64;

const ENDPOINT_ATTRIBUTE: &str = "a=loopback-endpoint:";
const CANDIDATE_PREFIX: &str = "candidate:";

#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    registry: Arc<Mutex<Registry>>,
}

#[derive(Default)]
struct Registry {
    next_id: EndpointId,
    endpoints: HashMap<EndpointId, Endpoint>,
}

struct Endpoint {
    context: SessionContext,
    local: Option<SdpType>,
    remote: Option<EndpointId>,
    remote_candidates: Vec<IceCandidate>,
    tracks: Vec<LocalTrack>,
    connected: bool,
    closed: bool,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn factory(&self) -> Arc<dyn TransportFactory> {
        Arc::new(LoopbackFactory {
            network: self.clone(),
        })
    }

    /// Sessions created so far, closed ones included.
    pub fn session_count(&self) -> usize {
        self.lock().endpoints.len()
    }

    pub fn open_session_count(&self) -> usize {
        self.lock().endpoints.values().filter(|e| !e.closed).count()
    }

    pub fn connected_session_count(&self) -> usize {
        self.lock().endpoints.values().filter(|e| e.connected).count()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Registry {
    fn endpoint_mut(&mut self, id: EndpointId) -> Result<&mut Endpoint, TransportError> {
        match self.endpoints.get_mut(&id) {
            Some(endpoint) if !endpoint.closed => Ok(endpoint),
            _ => Err(TransportError::Closed),
        }
    }

    fn is_live(&self, id: EndpointId) -> bool {
        self.endpoints
            .get(&id)
            .map(|e| e.connected && !e.closed)
            .unwrap_or(false)
    }

    fn establish(&mut self, network: &LoopbackNetwork, offerer: EndpointId, answerer: EndpointId) {
        let paired = self
            .endpoints
            .get(&answerer)
            .map(|e| e.remote == Some(offerer) && e.local == Some(SdpType::Answer) && !e.closed)
            .unwrap_or(false);
        if !paired {
            log::warn!("Endpoint {} answered by a stranger {}", offerer, answerer);
            if let Some(endpoint) = self.endpoints.get(&offerer) {
                endpoint
                    .context
                    .emit(TransportEventKind::StateChanged(TransportState::Failed));
            }
            return;
        }

        for id in [offerer, answerer] {
            if let Some(endpoint) = self.endpoints.get_mut(&id) {
                endpoint.connected = true;
            }
        }

        for (local, remote) in [(offerer, answerer), (answerer, offerer)] {
            let tracks = self
                .endpoints
                .get(&remote)
                .map(|e| e.tracks.clone())
                .unwrap_or_default();
            if let Some(endpoint) = self.endpoints.get(&local) {
                let context = &endpoint.context;
                context.emit(TransportEventKind::StateChanged(TransportState::Connected));
                if context.kind == SessionKind::Data {
                    context.emit(TransportEventKind::ChannelOpen(Arc::new(LoopbackChannel {
                        network: network.clone(),
                        from: local,
                        to: remote,
                        label: context.data_channel_label.clone(),
                    })));
                }
                for track in tracks {
                    context.emit(TransportEventKind::RemoteTrack(RemoteTrack {
                        id: track.id,
                        kind: track.kind,
                    }));
                }
            }
        }
    }
}

fn description_sdp(id: EndpointId, kind: SessionKind) -> String {
    format!("v=0\r\n{}{}\r\na=loopback-kind:{}\r\n", ENDPOINT_ATTRIBUTE, id, kind)
}

fn endpoint_of_description(sdp: &str) -> Option<EndpointId> {
    sdp.lines()
        .find_map(|line| line.strip_prefix(ENDPOINT_ATTRIBUTE))
        .and_then(|id| id.trim().parse().ok())
}

fn local_candidate(id: EndpointId) -> IceCandidate {
    IceCandidate {
        candidate: format!("{}{} 1 udp 2130706431 127.0.0.1 9 typ host", CANDIDATE_PREFIX, id),
        sdp_mid: Some("0".to_string()),
        sdp_m_line_index: Some(0),
        username_fragment: None,
    }
}

fn endpoint_of_candidate(candidate: &str) -> Option<EndpointId> {
    candidate
        .strip_prefix(CANDIDATE_PREFIX)?
        .split_whitespace()
        .next()?
        .parse()
        .ok()
}

struct LoopbackFactory {
    network: LoopbackNetwork,
}

#[async_trait]
impl TransportFactory for LoopbackFactory {
    async fn create_session(
        &self,
        context: SessionContext,
    ) -> Result<Arc<dyn TransportSession>, TransportError> {
        let mut registry = self.network.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        log::debug!("Loopback endpoint {} for {} session", id, context.kind);
        registry.endpoints.insert(
            id,
            Endpoint {
                context,
                local: None,
                remote: None,
                remote_candidates: Vec::new(),
                tracks: Vec::new(),
                connected: false,
                closed: false,
            },
        );
        Ok(Arc::new(LoopbackSession {
            network: self.network.clone(),
            id,
        }))
    }
}

struct LoopbackSession {
    network: LoopbackNetwork,
    id: EndpointId,
}

#[async_trait]
impl TransportSession for LoopbackSession {
    async fn create_offer(&self) -> Result<SessionDescription, TransportError> {
        let mut registry = self.network.lock();
        let endpoint = registry.endpoint_mut(self.id)?;
        if endpoint.local.is_some() || endpoint.remote.is_some() {
            return Err(TransportError::InvalidState(
                "descriptions already exchanged".to_string(),
            ));
        }
        endpoint.local = Some(SdpType::Offer);
        endpoint
            .context
            .emit(TransportEventKind::LocalCandidate(local_candidate(self.id)));
        Ok(SessionDescription::offer(description_sdp(
            self.id,
            endpoint.context.kind,
        )))
    }

    async fn create_answer(&self) -> Result<SessionDescription, TransportError> {
        let mut registry = self.network.lock();
        let endpoint = registry.endpoint_mut(self.id)?;
        if endpoint.remote.is_none() || endpoint.local.is_some() {
            return Err(TransportError::InvalidState(
                "no remote offer to answer".to_string(),
            ));
        }
        endpoint.local = Some(SdpType::Answer);
        endpoint
            .context
            .emit(TransportEventKind::LocalCandidate(local_candidate(self.id)));
        Ok(SessionDescription::answer(description_sdp(
            self.id,
            endpoint.context.kind,
        )))
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), TransportError> {
        let remote_id = endpoint_of_description(&description.sdp)
            .ok_or_else(|| TransportError::Rejected("not a loopback description".to_string()))?;
        let mut registry = self.network.lock();
        if !registry.endpoints.contains_key(&remote_id) {
            return Err(TransportError::Rejected(format!(
                "unknown endpoint {}",
                remote_id
            )));
        }
        let endpoint = registry.endpoint_mut(self.id)?;
        if endpoint.remote.is_some() {
            return Err(TransportError::InvalidState(
                "remote description already set".to_string(),
            ));
        }
        match description.sdp_type {
            SdpType::Offer => {
                if endpoint.local.is_some() {
                    return Err(TransportError::InvalidState(
                        "offer received while holding a local offer".to_string(),
                    ));
                }
                endpoint.remote = Some(remote_id);
            }
            SdpType::Answer => {
                if endpoint.local != Some(SdpType::Offer) {
                    return Err(TransportError::InvalidState(
                        "answer without a local offer".to_string(),
                    ));
                }
                endpoint.remote = Some(remote_id);
                let network = self.network.clone();
                registry.establish(&network, self.id, remote_id);
            }
        }
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError> {
        let mut registry = self.network.lock();
        let endpoint = registry.endpoint_mut(self.id)?;
        let remote = endpoint.remote.ok_or_else(|| {
            TransportError::InvalidState("remote description not set".to_string())
        })?;
        let from = endpoint_of_candidate(&candidate.candidate)
            .ok_or_else(|| TransportError::Rejected("not a loopback candidate".to_string()))?;
        if from != remote {
            return Err(TransportError::Rejected(format!(
                "candidate of endpoint {} does not belong to this session",
                from
            )));
        }
        endpoint.remote_candidates.push(candidate);
        Ok(())
    }

    async fn add_track(&self, track: &LocalTrack) -> Result<(), TransportError> {
        let mut registry = self.network.lock();
        let endpoint = registry.endpoint_mut(self.id)?;
        endpoint.tracks.push(track.clone());
        let remote = if endpoint.connected {
            endpoint.remote
        } else {
            None
        };
        if let Some(remote) = remote.and_then(|id| registry.endpoints.get(&id)) {
            remote.context.emit(TransportEventKind::RemoteTrack(RemoteTrack {
                id: track.id.clone(),
                kind: track.kind,
            }));
        }
        Ok(())
    }

    async fn close(&self) {
        let mut registry = self.network.lock();
        let Ok(endpoint) = registry.endpoint_mut(self.id) else {
            return;
        };
        let was_connected = endpoint.connected;
        endpoint.closed = true;
        endpoint.connected = false;
        endpoint
            .context
            .emit(TransportEventKind::StateChanged(TransportState::Closed));
        let remote = endpoint.remote;

        if !was_connected {
            return;
        }
        if let Some(remote) = remote.and_then(|id| registry.endpoints.get_mut(&id)) {
            remote.connected = false;
            if remote.context.kind == SessionKind::Data {
                remote.context.emit(TransportEventKind::ChannelClosed);
            }
            remote
                .context
                .emit(TransportEventKind::StateChanged(TransportState::Disconnected));
        }
    }
}

#[derive(Debug)]
struct LoopbackChannel {
    network: LoopbackNetwork,
    from: EndpointId,
    to: EndpointId,
    label: String,
}

impl std::fmt::Debug for LoopbackNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackNetwork").finish_non_exhaustive()
    }
}

#[async_trait]
impl DataChannel for LoopbackChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn is_open(&self) -> bool {
        self.network.lock().is_live(self.from)
    }

    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        let registry = self.network.lock();
        if !registry.is_live(self.from) || !registry.is_live(self.to) {
            return Err(TransportError::Closed);
        }
        match registry.endpoints.get(&self.to) {
            Some(endpoint) => {
                endpoint
                    .context
                    .emit(TransportEventKind::ChannelMessage(text));
                Ok(())
            }
            None => Err(TransportError::Closed),
        }
    }
}
