//! Transport backed by the `webrtc` crate.

use async_trait::async_trait;
use sketchpair_system::{IceCandidate, SdpType, SessionDescription, SessionKind};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::{APIBuilder, API};
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::config::PeerConfig;
use crate::transport::{
    DataChannel, LocalTrack, RemoteTrack, SessionContext, TrackKind, TransportError,
    TransportEventKind, TransportFactory, TransportSession, TransportState,
};

const STREAM_ID: &str = "sketchpair";

type LocalTracks = Arc<Mutex<HashMap<String, Arc<TrackLocalStaticSample>>>>;

fn backend(e: webrtc::Error) -> TransportError {
    TransportError::Backend(e.to_string())
}

pub struct WebRtcTransportFactory {
    api: API,
    ice_servers: Vec<String>,
    local_tracks: LocalTracks,
}

impl WebRtcTransportFactory {
    pub fn new(config: &PeerConfig) -> Result<Self, TransportError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs().map_err(backend)?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(backend)?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();
        Ok(Self {
            api,
            ice_servers: config.ice_servers.clone(),
            local_tracks: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// The sample sink for an attached local track. Capture code writes
    /// encoded media into it.
    pub fn local_track(&self, id: &str) -> Option<Arc<TrackLocalStaticSample>> {
        self.local_tracks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }
}

#[async_trait]
impl TransportFactory for WebRtcTransportFactory {
    async fn create_session(
        &self,
        context: SessionContext,
    ) -> Result<Arc<dyn TransportSession>, TransportError> {
        let pc = Arc::new(
            self.api
                .new_peer_connection(RTCConfiguration {
                    ice_servers: vec![RTCIceServer {
                        urls: self.ice_servers.clone(),
                        ..Default::default()
                    }],
                    ..Default::default()
                })
                .await
                .map_err(backend)?,
        );

        let candidate_context = context.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let context = candidate_context.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else { return };
                match candidate.to_json() {
                    Ok(init) => context.emit(TransportEventKind::LocalCandidate(IceCandidate {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_m_line_index: init.sdp_mline_index,
                        username_fragment: init.username_fragment,
                    })),
                    Err(e) => log::warn!("Cannot serialize local candidate: {}", e),
                }
            })
        }));

        let state_context = context.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let state = match state {
                RTCPeerConnectionState::New => Some(TransportState::New),
                RTCPeerConnectionState::Connecting => Some(TransportState::Connecting),
                RTCPeerConnectionState::Connected => Some(TransportState::Connected),
                RTCPeerConnectionState::Disconnected => Some(TransportState::Disconnected),
                RTCPeerConnectionState::Failed => Some(TransportState::Failed),
                RTCPeerConnectionState::Closed => Some(TransportState::Closed),
                _ => None,
            };
            if let Some(state) = state {
                state_context.emit(TransportEventKind::StateChanged(state));
            }
            Box::pin(async {})
        }));

        match context.kind {
            SessionKind::Data if context.initiator => {
                let channel = pc
                    .create_data_channel(&context.data_channel_label, None)
                    .await
                    .map_err(backend)?;
                wire_channel(channel, context.clone());
            }
            SessionKind::Data => {
                let channel_context = context.clone();
                pc.on_data_channel(Box::new(move |channel: Arc<RTCDataChannel>| {
                    wire_channel(channel, channel_context.clone());
                    Box::pin(async {})
                }));
            }
            SessionKind::Media => {
                let track_context = context.clone();
                pc.on_track(Box::new(move |track: Arc<TrackRemote>, _, _| {
                    let kind = match track.kind() {
                        RTPCodecType::Audio => TrackKind::Audio,
                        _ => TrackKind::Video,
                    };
                    track_context.emit(TransportEventKind::RemoteTrack(RemoteTrack {
                        id: track.id(),
                        kind,
                    }));
                    Box::pin(async {})
                }));
            }
        }

        Ok(Arc::new(WebRtcSession {
            pc,
            local_tracks: self.local_tracks.clone(),
        }))
    }
}

fn wire_channel(channel: Arc<RTCDataChannel>, context: SessionContext) {
    let open_context = context.clone();
    let open_channel = channel.clone();
    channel.on_open(Box::new(move || {
        open_context.emit(TransportEventKind::ChannelOpen(Arc::new(WebRtcDataChannel {
            inner: open_channel.clone(),
        })));
        Box::pin(async {})
    }));

    let message_context = context.clone();
    channel.on_message(Box::new(move |message: DataChannelMessage| {
        match String::from_utf8(message.data.to_vec()) {
            Ok(text) => message_context.emit(TransportEventKind::ChannelMessage(text)),
            Err(_) => log::warn!("Dropping binary sync frame of {} bytes", message.data.len()),
        }
        Box::pin(async {})
    }));

    channel.on_close(Box::new(move || {
        context.emit(TransportEventKind::ChannelClosed);
        Box::pin(async {})
    }));
}

struct WebRtcDataChannel {
    inner: Arc<RTCDataChannel>,
}

impl fmt::Debug for WebRtcDataChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebRtcDataChannel")
            .field("label", &self.inner.label())
            .finish()
    }
}

#[async_trait]
impl DataChannel for WebRtcDataChannel {
    fn label(&self) -> &str {
        self.inner.label()
    }

    fn is_open(&self) -> bool {
        self.inner.ready_state() == RTCDataChannelState::Open
    }

    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.inner.send_text(text).await.map(|_| ()).map_err(backend)
    }
}

struct WebRtcSession {
    pc: Arc<RTCPeerConnection>,
    local_tracks: LocalTracks,
}

#[async_trait]
impl TransportSession for WebRtcSession {
    async fn create_offer(&self) -> Result<SessionDescription, TransportError> {
        let offer = self.pc.create_offer(None).await.map_err(backend)?;
        self.pc
            .set_local_description(offer.clone())
            .await
            .map_err(backend)?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription, TransportError> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| TransportError::InvalidState(e.to_string()))?;
        self.pc
            .set_local_description(answer.clone())
            .await
            .map_err(backend)?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), TransportError> {
        let description = match description.sdp_type {
            SdpType::Offer => RTCSessionDescription::offer(description.sdp),
            SdpType::Answer => RTCSessionDescription::answer(description.sdp),
        }
        .map_err(|e| TransportError::Rejected(e.to_string()))?;
        self.pc
            .set_remote_description(description)
            .await
            .map_err(|e| TransportError::InvalidState(e.to_string()))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError> {
        if self.pc.remote_description().await.is_none() {
            return Err(TransportError::InvalidState(
                "remote description not set".to_string(),
            ));
        }
        self.pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_m_line_index,
                username_fragment: candidate.username_fragment,
            })
            .await
            .map_err(|e| TransportError::Rejected(e.to_string()))
    }

    async fn add_track(&self, track: &LocalTrack) -> Result<(), TransportError> {
        let mime_type = match track.kind {
            TrackKind::Audio => MIME_TYPE_OPUS,
            TrackKind::Video => MIME_TYPE_VP8,
        };
        let local = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: mime_type.to_owned(),
                ..Default::default()
            },
            track.id.clone(),
            STREAM_ID.to_owned(),
        ));
        self.pc
            .add_track(Arc::clone(&local) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(backend)?;
        self.local_tracks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(track.id.clone(), local);
        Ok(())
    }

    async fn close(&self) {
        if let Err(e) = self.pc.close().await {
            log::warn!("Closing peer connection failed: {}", e);
        }
    }
}
