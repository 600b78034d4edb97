use sketchpair_system::{
    Error, IceCandidate, Negotiation, ParticipantId, RelayMessage, SessionDescription,
    SessionKind,
};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

use crate::config::PeerConfig;
use crate::media::MediaSession;
use crate::peer::PeerNotice;
use crate::relay_client::{RelayEvent, RelayLink};
use crate::transport::{
    Generation, LocalTrack, SessionContext, TransportError, TransportEvent, TransportEventKind,
    TransportFactory, TransportSession, TransportState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Idle,
    HaveLocalOffer,
    HaveRemoteOffer,
    Connected,
    Closed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiatorPhase {
    Active,
    /// Terminal. The relay refused us; nothing is negotiated any more.
    RoomFull,
    RelayClosed,
}

// A candidate the transport refused as out of order gets one more try.
const MAX_CANDIDATE_ATTEMPTS: u8 = 2;

#[derive(Debug)]
struct PendingCandidate {
    candidate: IceCandidate,
    attempts: u8,
}

struct SessionSlot {
    kind: SessionKind,
    state: NegotiationState,
    role: Option<Role>,
    generation: Generation,
    session: Option<Arc<dyn TransportSession>>,
    remote_description_set: bool,
    pending_candidates: Vec<PendingCandidate>,
}

impl SessionSlot {
    fn new(kind: SessionKind) -> Self {
        Self {
            kind,
            state: NegotiationState::Idle,
            role: None,
            generation: 0,
            session: None,
            remote_description_set: false,
            pending_candidates: Vec::new(),
        }
    }

    fn is_fresh(&self) -> bool {
        self.state == NegotiationState::Idle && self.session.is_none()
    }

    fn is_finished(&self) -> bool {
        matches!(
            self.state,
            NegotiationState::Closed | NegotiationState::Failed
        )
    }
}

/// Bootstraps the data and media sessions with the other participant.
///
/// Both sessions follow the same offer/answer/candidate exchange over the
/// relay, each in its own slot. Whoever sees the other's `join` initiates.
/// When both sides offer at once, the lexicographically smaller participant
/// id keeps its offer and the other side answers it.
pub struct SessionNegotiator<L> {
    relay: L,
    factory: Arc<dyn TransportFactory>,
    transport_events: UnboundedSender<TransportEvent>,
    notices: UnboundedSender<PeerNotice>,
    data_channel_label: String,
    phase: NegotiatorPhase,
    remote_id: Option<ParticipantId>,
    data: SessionSlot,
    media_slot: SessionSlot,
    media: MediaSession,
    next_generation: Generation,
}

impl<L: RelayLink> SessionNegotiator<L> {
    pub fn new(
        relay: L,
        factory: Arc<dyn TransportFactory>,
        config: &PeerConfig,
        transport_events: UnboundedSender<TransportEvent>,
        notices: UnboundedSender<PeerNotice>,
    ) -> Self {
        Self {
            relay,
            factory,
            transport_events,
            notices,
            data_channel_label: config.data_channel_label.clone(),
            phase: NegotiatorPhase::Active,
            remote_id: None,
            data: SessionSlot::new(SessionKind::Data),
            media_slot: SessionSlot::new(SessionKind::Media),
            media: MediaSession::new(),
            next_generation: 0,
        }
    }

    pub fn self_id(&self) -> &ParticipantId {
        self.relay.self_id()
    }

    pub fn relay(&self) -> &L {
        &self.relay
    }

    pub fn phase(&self) -> NegotiatorPhase {
        self.phase
    }

    pub fn remote_id(&self) -> Option<&ParticipantId> {
        self.remote_id.as_ref()
    }

    pub fn state(&self, kind: SessionKind) -> NegotiationState {
        self.slot(kind).state
    }

    pub fn role(&self, kind: SessionKind) -> Option<Role> {
        self.slot(kind).role
    }

    pub fn generation(&self, kind: SessionKind) -> Generation {
        self.slot(kind).generation
    }

    pub fn pending_candidates(&self, kind: SessionKind) -> usize {
        self.slot(kind).pending_candidates.len()
    }

    pub fn media(&self) -> &MediaSession {
        &self.media
    }

    pub async fn handle_relay_event(&mut self, event: RelayEvent) {
        let envelope = match event {
            RelayEvent::Message(envelope) => envelope,
            RelayEvent::Closed => return self.on_relay_closed().await,
        };
        if envelope.is_from(self.self_id()) {
            return;
        }
        let sender = envelope.sender_id;
        match envelope.message {
            RelayMessage::Full => self.on_room_full(),
            RelayMessage::Join => match sender {
                Some(sender) => self.on_join(sender).await,
                None => log::warn!("Ignoring join without sender"),
            },
            RelayMessage::Unknown => log::warn!("Ignoring unknown relay message"),
            message => {
                if let Some((kind, negotiation)) = message.into_negotiation() {
                    self.on_negotiation(kind, negotiation, sender).await;
                }
            }
        }
    }

    /// Handles events about the negotiation itself. Data channel events of
    /// the live session are handed back to the caller.
    pub async fn handle_transport_event(
        &mut self,
        event: TransportEvent,
    ) -> Option<TransportEventKind> {
        let TransportEvent {
            kind,
            generation,
            event,
        } = event;
        let slot = self.slot(kind);
        if slot.session.is_none() || slot.generation != generation {
            log::debug!(
                "Ignoring {:?} from discarded {} session {}",
                event,
                kind,
                generation
            );
            return None;
        }

        match event {
            TransportEventKind::LocalCandidate(candidate) => {
                if let Err(e) = self.relay.send(RelayMessage::candidate(kind, candidate)) {
                    log::warn!("Cannot relay {} candidate: {}", kind, e);
                }
                None
            }
            TransportEventKind::StateChanged(state) => {
                self.on_transport_state(kind, state).await;
                None
            }
            TransportEventKind::RemoteTrack(track) => {
                self.media.on_remote_track(track.clone());
                self.notify(PeerNotice::RemoteTrack(track));
                None
            }
            channel_event => Some(channel_event),
        }
    }

    pub async fn capture_ready(&mut self, tracks: Vec<LocalTrack>) {
        self.media.capture_ready(tracks);
        if self.media_slot.is_finished() {
            return;
        }
        if let Some(session) = self.media_slot.session.clone() {
            self.attach_media(&session).await;
        }
    }

    pub fn capture_failed(&mut self, reason: String) {
        let error = self.media.capture_failed(reason);
        self.notify(PeerNotice::Warning(error));
    }

    /// Closes both sessions. Used when leaving the room.
    pub async fn close(&mut self) {
        for kind in SessionKind::ALL {
            let session = self.slot_mut(kind).session.take();
            if let Some(session) = session {
                session.close().await;
                if !self.slot(kind).is_finished() {
                    self.set_state(kind, NegotiationState::Closed);
                }
            }
        }
    }

    async fn on_join(&mut self, sender: ParticipantId) {
        if self.phase != NegotiatorPhase::Active {
            log::debug!("Ignoring join from {} in {:?}", sender, self.phase);
            return;
        }
        if !(self.data.is_fresh() && self.media_slot.is_fresh()) {
            log::debug!("Ignoring join from {}, already negotiating", sender);
            return;
        }
        log::info!("{} joined, initiating sessions", sender);
        self.remote_id = Some(sender);
        for kind in SessionKind::ALL {
            self.start_offer(kind).await;
        }
    }

    async fn on_negotiation(
        &mut self,
        kind: SessionKind,
        negotiation: Negotiation,
        sender: Option<ParticipantId>,
    ) {
        if self.phase != NegotiatorPhase::Active {
            log::debug!("Ignoring {} negotiation in {:?}", kind, self.phase);
            return;
        }
        match negotiation {
            Negotiation::Offer(offer) => match sender {
                Some(sender) => self.on_offer(kind, offer, sender).await,
                None => log::warn!("Ignoring {} offer without sender", kind),
            },
            Negotiation::Answer(answer) => self.on_answer(kind, answer).await,
            Negotiation::Candidate(candidate) => self.on_candidate(kind, candidate).await,
        }
    }

    async fn on_offer(&mut self, kind: SessionKind, offer: SessionDescription, sender: ParticipantId) {
        match self.slot(kind).state {
            NegotiationState::Idle => {}
            NegotiationState::HaveLocalOffer => {
                if self.self_id() < &sender {
                    log::info!("Glare on {} session, keeping our offer over {}'s", kind, sender);
                    return;
                }
                log::info!("Glare on {} session, answering {} instead", kind, sender);
                self.discard_session(kind).await;
            }
            state => {
                log::warn!("Ignoring {} offer from {} in {:?}", kind, sender, state);
                return;
            }
        }
        self.remote_id = Some(sender);
        self.answer_offer(kind, offer).await;
    }

    async fn answer_offer(&mut self, kind: SessionKind, offer: SessionDescription) {
        let Some(session) = self.create_session(kind, Role::Responder).await else {
            return;
        };
        if let Err(e) = session.set_remote_description(offer).await {
            return self.fail(kind, e.into_error(kind)).await;
        }
        self.slot_mut(kind).remote_description_set = true;
        self.set_state(kind, NegotiationState::HaveRemoteOffer);
        self.flush_candidates(kind, &session).await;
        if kind == SessionKind::Media {
            self.attach_media(&session).await;
        }
        match session.create_answer().await {
            Ok(answer) => {
                if let Err(e) = self.relay.send(RelayMessage::answer(kind, answer)) {
                    self.fail(kind, e).await;
                }
            }
            Err(e) => self.fail(kind, e.into_error(kind)).await,
        }
    }

    async fn start_offer(&mut self, kind: SessionKind) {
        let Some(session) = self.create_session(kind, Role::Initiator).await else {
            return;
        };
        if kind == SessionKind::Media {
            self.attach_media(&session).await;
        }
        let offer = match session.create_offer().await {
            Ok(offer) => offer,
            Err(e) => return self.fail(kind, e.into_error(kind)).await,
        };
        self.set_state(kind, NegotiationState::HaveLocalOffer);
        if let Err(e) = self.relay.send(RelayMessage::offer(kind, offer)) {
            self.fail(kind, e).await;
        }
    }

    async fn on_answer(&mut self, kind: SessionKind, answer: SessionDescription) {
        let slot = self.slot(kind);
        if slot.state != NegotiationState::HaveLocalOffer || slot.remote_description_set {
            log::warn!("Ignoring {} answer in {:?}", kind, slot.state);
            return;
        }
        let Some(session) = slot.session.clone() else {
            return;
        };
        if let Err(e) = session.set_remote_description(answer).await {
            return self.fail(kind, e.into_error(kind)).await;
        }
        self.slot_mut(kind).remote_description_set = true;
        self.flush_candidates(kind, &session).await;
    }

    async fn on_candidate(&mut self, kind: SessionKind, candidate: IceCandidate) {
        let slot = self.slot_mut(kind);
        if slot.is_finished() {
            log::debug!("Dropping {} candidate for a finished session", kind);
            return;
        }
        let pending = PendingCandidate {
            candidate,
            attempts: 0,
        };
        let ready = slot.remote_description_set;
        match slot.session.clone() {
            Some(session) if ready => self.apply_candidate(kind, &session, pending).await,
            _ => {
                log::debug!("Queueing {} candidate until the remote description", kind);
                slot.pending_candidates.push(pending);
            }
        }
    }

    async fn apply_candidate(
        &mut self,
        kind: SessionKind,
        session: &Arc<dyn TransportSession>,
        pending: PendingCandidate,
    ) {
        match session.add_ice_candidate(pending.candidate.clone()).await {
            Ok(()) => {}
            Err(TransportError::InvalidState(reason)) => {
                let attempts = pending.attempts + 1;
                if attempts < MAX_CANDIDATE_ATTEMPTS {
                    log::debug!("Requeueing {} candidate: {}", kind, reason);
                    self.slot_mut(kind).pending_candidates.push(PendingCandidate {
                        candidate: pending.candidate,
                        attempts,
                    });
                } else {
                    log::warn!("Dropping {} candidate after {} attempts", kind, attempts);
                    self.notify(PeerNotice::Warning(Error::InvalidSessionState {
                        kind,
                        reason,
                    }));
                }
            }
            Err(e) => log::warn!("{} candidate refused: {}", kind, e),
        }
    }

    async fn flush_candidates(&mut self, kind: SessionKind, session: &Arc<dyn TransportSession>) {
        let pending = std::mem::take(&mut self.slot_mut(kind).pending_candidates);
        if !pending.is_empty() {
            log::debug!("Applying {} queued {} candidate(s)", pending.len(), kind);
        }
        for candidate in pending {
            self.apply_candidate(kind, session, candidate).await;
        }
    }

    async fn on_transport_state(&mut self, kind: SessionKind, state: TransportState) {
        match state {
            TransportState::Connected => {
                self.set_state(kind, NegotiationState::Connected);
                if let Some(session) = self.slot(kind).session.clone() {
                    self.flush_candidates(kind, &session).await;
                }
            }
            TransportState::Failed => self.set_state(kind, NegotiationState::Failed),
            TransportState::Closed => self.set_state(kind, NegotiationState::Closed),
            TransportState::Disconnected => log::warn!("{} session disconnected", kind),
            TransportState::New | TransportState::Connecting => {
                log::debug!("{} session {:?}", kind, state)
            }
        }
    }

    fn on_room_full(&mut self) {
        if self.phase == NegotiatorPhase::RoomFull {
            return;
        }
        log::warn!("Room is full");
        self.phase = NegotiatorPhase::RoomFull;
        self.notify(PeerNotice::RoomFull);
    }

    async fn on_relay_closed(&mut self) {
        if self.phase == NegotiatorPhase::Active {
            self.phase = NegotiatorPhase::RelayClosed;
        }
        log::warn!("Relay connection closed");
        for kind in SessionKind::ALL {
            if matches!(
                self.slot(kind).state,
                NegotiationState::HaveLocalOffer | NegotiationState::HaveRemoteOffer
            ) {
                let reason = format!("relay closed before the {} session connected", kind);
                self.fail(kind, Error::TransportUnavailable(reason)).await;
            }
        }
        self.notify(PeerNotice::RelayClosed);
    }

    async fn create_session(
        &mut self,
        kind: SessionKind,
        role: Role,
    ) -> Option<Arc<dyn TransportSession>> {
        self.next_generation += 1;
        let generation = self.next_generation;
        let context = SessionContext::new(
            kind,
            generation,
            role == Role::Initiator,
            self.data_channel_label.clone(),
            self.transport_events.clone(),
        );
        match self.factory.create_session(context).await {
            Ok(session) => {
                log::debug!("Created {} session {} as {:?}", kind, generation, role);
                let slot = self.slot_mut(kind);
                slot.session = Some(session.clone());
                slot.generation = generation;
                slot.role = Some(role);
                slot.remote_description_set = false;
                Some(session)
            }
            Err(e) => {
                self.fail(kind, e.into_error(kind)).await;
                None
            }
        }
    }

    // Queued candidates survive; they may belong to the offer we answer next.
    async fn discard_session(&mut self, kind: SessionKind) {
        let slot = self.slot_mut(kind);
        let session = slot.session.take();
        slot.state = NegotiationState::Idle;
        slot.role = None;
        slot.remote_description_set = false;
        if let Some(session) = session {
            session.close().await;
        }
    }

    async fn attach_media(&mut self, session: &Arc<dyn TransportSession>) {
        let generation = self.media_slot.generation;
        if let Err(e) = self.media.attach(session.as_ref(), generation).await {
            log::warn!("Cannot attach local tracks: {}", e);
            self.notify(PeerNotice::Warning(e));
        }
    }

    async fn fail(&mut self, kind: SessionKind, error: Error) {
        log::warn!("{} session failed: {}", kind, error);
        let session = self.slot_mut(kind).session.clone();
        self.set_state(kind, NegotiationState::Failed);
        if let Some(session) = session {
            session.close().await;
        }
        self.notify(PeerNotice::Warning(error));
    }

    fn set_state(&mut self, kind: SessionKind, state: NegotiationState) {
        let slot = self.slot_mut(kind);
        if slot.state == state {
            return;
        }
        log::info!("{} session {:?} -> {:?}", slot.kind, slot.state, state);
        slot.state = state;
        self.notify(PeerNotice::SessionState { kind, state });
    }

    fn notify(&self, notice: PeerNotice) {
        if self.notices.send(notice).is_err() {
            log::debug!("Nobody listens for notices");
        }
    }

    fn slot(&self, kind: SessionKind) -> &SessionSlot {
        match kind {
            SessionKind::Data => &self.data,
            SessionKind::Media => &self.media_slot,
        }
    }

    fn slot_mut(&mut self, kind: SessionKind) -> &mut SessionSlot {
        match kind {
            SessionKind::Data => &mut self.data,
            SessionKind::Media => &mut self.media_slot,
        }
    }
}
