use sketchpair_system::{
    new_room_id, BuilderOutput, Color, Error, LogChange, ParticipantId, Point, PointerEvent,
    RoomId, SessionKind, Stroke, StrokeBuilder, StrokeLog, SyncMessage, Tool,
};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::config::PeerConfig;
use crate::negotiator::{NegotiationState, SessionNegotiator};
use crate::relay_client::{RelayClient, RelayEvent, RelayLink};
use crate::sync_channel::SyncChannel;
use crate::transport::{
    LocalTrack, RemoteTrack, TransportEvent, TransportEventKind, TransportFactory,
};

pub trait Renderer: Send {
    /// Redraws the whole canvas. Called with the same history twice, it
    /// must produce the same picture.
    fn render(&mut self, strokes: &[Stroke]);
    fn render_incremental(&mut self, stroke: &Stroke);
}

/// What the UI needs to hear about.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerNotice {
    RoomFull,
    RelayClosed,
    SessionState {
        kind: SessionKind,
        state: NegotiationState,
    },
    SyncChannelOpen,
    /// Drawing continues locally but is no longer shared.
    SyncChannelClosed,
    RemoteTrack(RemoteTrack),
    /// The text tool was clicked here; answer with `PeerCommand::CommitText`.
    TextRequested(Point),
    Warning(Error),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PeerCommand {
    Pointer(PointerEvent),
    SetTool(Tool),
    SetColor(Color),
    SetWidth(f32),
    CommitText { text: String, at: Point },
    AddStroke(Stroke),
    Undo,
    Redo,
    Clear,
    CaptureReady(Vec<LocalTrack>),
    CaptureFailed(String),
    Leave,
}

pub struct PeerChannels {
    pub transport_events: UnboundedReceiver<TransportEvent>,
    pub notices: UnboundedReceiver<PeerNotice>,
}

pub struct PeerHandle {
    pub self_id: ParticipantId,
    pub commands: UnboundedSender<PeerCommand>,
    pub notices: UnboundedReceiver<PeerNotice>,
    pub task: JoinHandle<()>,
}

/// One participant of a drawing session.
///
/// Relay events, transport events and local commands are handled one at a
/// time through `&mut self`, so the stroke log and the negotiation state are
/// never shared.
pub struct Peer<L> {
    negotiator: SessionNegotiator<L>,
    stroke_log: StrokeLog,
    builder: StrokeBuilder,
    sync: SyncChannel,
    renderer: Box<dyn Renderer>,
    notices: UnboundedSender<PeerNotice>,
}

impl<L: RelayLink> Peer<L> {
    pub fn new(
        relay: L,
        factory: Arc<dyn TransportFactory>,
        config: &PeerConfig,
        renderer: Box<dyn Renderer>,
    ) -> (Self, PeerChannels) {
        let (transport_tx, transport_events) = unbounded_channel();
        let (notices_tx, notices) = unbounded_channel();
        let peer = Self {
            negotiator: SessionNegotiator::new(
                relay,
                factory,
                config,
                transport_tx,
                notices_tx.clone(),
            ),
            stroke_log: StrokeLog::new(),
            builder: StrokeBuilder::new(),
            sync: SyncChannel::new(),
            renderer,
            notices: notices_tx,
        };
        (
            peer,
            PeerChannels {
                transport_events,
                notices,
            },
        )
    }

    pub fn negotiator(&self) -> &SessionNegotiator<L> {
        &self.negotiator
    }

    pub fn stroke_log(&self) -> &StrokeLog {
        &self.stroke_log
    }

    pub fn builder(&self) -> &StrokeBuilder {
        &self.builder
    }

    pub fn sync_channel(&self) -> &SyncChannel {
        &self.sync
    }

    pub async fn handle_relay_event(&mut self, event: RelayEvent) {
        self.negotiator.handle_relay_event(event).await;
    }

    pub async fn handle_transport_event(&mut self, event: TransportEvent) {
        let Some(event) = self.negotiator.handle_transport_event(event).await else {
            return;
        };
        match event {
            TransportEventKind::ChannelOpen(channel) => {
                if self.sync.attach(channel) {
                    self.notify(PeerNotice::SyncChannelOpen);
                }
            }
            TransportEventKind::ChannelMessage(text) => {
                if let Some(message) = self.sync.receive(&text) {
                    let change = self.stroke_log.apply(message);
                    self.render_change(change);
                }
            }
            TransportEventKind::ChannelClosed => {
                self.sync.mark_closed();
                self.notify(PeerNotice::SyncChannelClosed);
            }
            other => log::debug!("Unhandled transport event {:?}", other),
        }
    }

    /// Returns false once the peer has left the room.
    pub async fn handle_command(&mut self, command: PeerCommand) -> bool {
        match command {
            PeerCommand::Pointer(event) => self.on_pointer(event).await,
            PeerCommand::SetTool(tool) => self.builder.set_tool(tool),
            PeerCommand::SetColor(color) => self.builder.set_color(color),
            PeerCommand::SetWidth(width) => self.builder.set_width(width),
            PeerCommand::CommitText { text, at } => {
                if let Some(stroke) = self.builder.commit_text(&text, at) {
                    self.add_stroke(stroke).await;
                }
            }
            PeerCommand::AddStroke(stroke) => self.add_stroke(stroke).await,
            PeerCommand::Undo => {
                if let Some(message) = self.stroke_log.undo_local() {
                    self.renderer.render(self.stroke_log.history());
                    self.broadcast(message).await;
                }
            }
            PeerCommand::Redo => {
                if let Some(message) = self.stroke_log.redo_local() {
                    if let SyncMessage::Stroke(stroke) = &message {
                        self.renderer.render_incremental(stroke);
                    }
                    self.broadcast(message).await;
                }
            }
            PeerCommand::Clear => {
                let message = self.stroke_log.clear();
                self.renderer.render(&[]);
                self.broadcast(message).await;
            }
            PeerCommand::CaptureReady(tracks) => self.negotiator.capture_ready(tracks).await,
            PeerCommand::CaptureFailed(reason) => self.negotiator.capture_failed(reason),
            PeerCommand::Leave => {
                log::info!("Leaving the room");
                self.negotiator.close().await;
                return false;
            }
        }
        true
    }

    pub async fn run(
        mut self,
        mut relay_events: UnboundedReceiver<RelayEvent>,
        mut transport_events: UnboundedReceiver<TransportEvent>,
        mut commands: UnboundedReceiver<PeerCommand>,
    ) {
        log::debug!("peer loop - started");
        loop {
            tokio::select! {
                Some(event) = relay_events.recv() => self.handle_relay_event(event).await,
                Some(event) = transport_events.recv() => self.handle_transport_event(event).await,
                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command).await {
                            break;
                        }
                    }
                    None => {
                        self.negotiator.close().await;
                        break;
                    }
                },
            }
        }
        log::debug!("peer loop - terminated");
    }

    async fn on_pointer(&mut self, event: PointerEvent) {
        match self.builder.handle(event) {
            BuilderOutput::Nothing => {}
            BuilderOutput::Preview {
                stroke,
                redraw_history,
            } => {
                if redraw_history {
                    self.renderer.render(self.stroke_log.history());
                }
                self.renderer.render_incremental(&stroke);
            }
            BuilderOutput::Finished(stroke) => self.add_stroke(stroke).await,
            BuilderOutput::TextRequested(at) => self.notify(PeerNotice::TextRequested(at)),
        }
    }

    async fn add_stroke(&mut self, stroke: Stroke) {
        if let Some(message) = self.stroke_log.add_local(stroke.clone()) {
            self.renderer.render_incremental(&stroke);
            self.broadcast(message).await;
        }
    }

    // The operation is already applied locally; a send failure only means
    // the other side won't see it.
    async fn broadcast(&mut self, message: SyncMessage) {
        if let Err(e) = self.sync.broadcast(&message).await {
            log::warn!("Not shared with the other participant: {}", e);
            self.notify(PeerNotice::Warning(e));
        }
    }

    fn render_change(&mut self, change: LogChange) {
        match change {
            LogChange::Appended(stroke) => self.renderer.render_incremental(&stroke),
            LogChange::Removed => self.renderer.render(self.stroke_log.history()),
            LogChange::Unchanged => {}
        }
    }

    fn notify(&self, notice: PeerNotice) {
        if self.notices.send(notice).is_err() {
            log::debug!("Nobody listens for notices");
        }
    }
}

impl<L: RelayLink + 'static> Peer<L> {
    /// Runs the peer on its own task.
    pub fn spawn(
        relay: L,
        relay_events: UnboundedReceiver<RelayEvent>,
        factory: Arc<dyn TransportFactory>,
        config: &PeerConfig,
        renderer: Box<dyn Renderer>,
    ) -> PeerHandle {
        let self_id = relay.self_id().clone();
        let (peer, channels) = Peer::new(relay, factory, config, renderer);
        let (commands, commands_rx) = unbounded_channel();
        let task = tokio::spawn(peer.run(relay_events, channels.transport_events, commands_rx));
        PeerHandle {
            self_id,
            commands,
            notices: channels.notices,
            task,
        }
    }
}

/// Opens a new room and waits in it for the other participant.
pub async fn create_room(
    config: &PeerConfig,
    factory: Arc<dyn TransportFactory>,
    renderer: Box<dyn Renderer>,
) -> Result<(RoomId, PeerHandle), Error> {
    let room_id = new_room_id();
    log::info!("Created room {}", room_id);
    let handle = join_room(config, &room_id, factory, renderer).await?;
    Ok((room_id, handle))
}

/// Connects to the relay with a fresh participant id and starts a peer.
pub async fn join_room(
    config: &PeerConfig,
    room_id: &str,
    factory: Arc<dyn TransportFactory>,
    renderer: Box<dyn Renderer>,
) -> Result<PeerHandle, Error> {
    let self_id = ParticipantId::generate();
    log::info!("Joining room {} as {}", room_id, self_id);
    let (client, relay_events) = RelayClient::join(&config.relay_url, room_id, self_id).await?;
    Ok(Peer::spawn(client, relay_events, factory, config, renderer))
}
