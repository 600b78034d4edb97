use sketchpair_peer::sketchpair_system::{
    Color, Error, Point, PointerEvent, SessionKind, Shape, Stroke, StrokeKind, Tool,
};
use sketchpair_peer::{
    LocalTrack, LoopbackNetwork, MemoryRelay, MemoryRelayLink, NegotiationState, NegotiatorPhase,
    Peer, PeerCommand, PeerConfig, PeerNotice, RelayEvent, Renderer, TrackKind, TransportEvent,
};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Default)]
struct Frames {
    full: Vec<Vec<Stroke>>,
    incremental: Vec<Stroke>,
}

#[derive(Clone, Default)]
struct Canvas {
    frames: Arc<Mutex<Frames>>,
}

impl Renderer for Canvas {
    fn render(&mut self, strokes: &[Stroke]) {
        self.frames.lock().expect("").full.push(strokes.to_vec());
    }

    fn render_incremental(&mut self, stroke: &Stroke) {
        self.frames.lock().expect("").incremental.push(stroke.clone());
    }
}

struct TestPeer {
    peer: Peer<MemoryRelayLink>,
    relay_rx: UnboundedReceiver<RelayEvent>,
    transport_rx: UnboundedReceiver<TransportEvent>,
    notices_rx: UnboundedReceiver<PeerNotice>,
    canvas: Canvas,
}

impl TestPeer {
    fn join(relay: &MemoryRelay, network: &LoopbackNetwork, id: &str) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let (link, relay_rx) = relay.join("room", id.into());
        let canvas = Canvas::default();
        let (peer, channels) = Peer::new(
            link,
            network.factory(),
            &PeerConfig::default(),
            Box::new(canvas.clone()),
        );
        Self {
            peer,
            relay_rx,
            transport_rx: channels.transport_events,
            notices_rx: channels.notices,
            canvas,
        }
    }

    async fn pump(&mut self) -> bool {
        let mut progressed = false;
        while let Ok(event) = self.relay_rx.try_recv() {
            self.peer.handle_relay_event(event).await;
            progressed = true;
        }
        while let Ok(event) = self.transport_rx.try_recv() {
            self.peer.handle_transport_event(event).await;
            progressed = true;
        }
        progressed
    }

    async fn command(&mut self, command: PeerCommand) {
        self.peer.handle_command(command).await;
    }

    fn notices(&mut self) -> Vec<PeerNotice> {
        let mut notices = Vec::new();
        while let Ok(notice) = self.notices_rx.try_recv() {
            notices.push(notice);
        }
        notices
    }

    fn state(&self, kind: SessionKind) -> NegotiationState {
        self.peer.negotiator().state(kind)
    }
}

async fn settle(peers: &mut [&mut TestPeer]) {
    loop {
        let mut progressed = false;
        for peer in peers.iter_mut() {
            progressed |= peer.pump().await;
        }
        if !progressed {
            break;
        }
    }
}

async fn connected_pair(relay: &MemoryRelay, network: &LoopbackNetwork) -> (TestPeer, TestPeer) {
    let mut a = TestPeer::join(relay, network, "a");
    let mut b = TestPeer::join(relay, network, "b");
    settle(&mut [&mut a, &mut b]).await;
    assert!(a.peer.sync_channel().is_open());
    assert!(b.peer.sync_channel().is_open());
    (a, b)
}

fn freehand(y: f32) -> Stroke {
    Stroke::new(
        Shape::Freehand {
            points: vec![Point::new(0.1, y), Point::new(0.2, y), Point::new(0.3, y)],
        },
        Color::BLACK,
        2.0,
    )
}

#[tokio::test]
async fn it_shares_a_stroke_and_its_undo() {
    let relay = MemoryRelay::new();
    let network = LoopbackNetwork::new();
    let (mut a, mut b) = connected_pair(&relay, &network).await;

    let s1 = freehand(0.5);
    a.command(PeerCommand::AddStroke(s1.clone())).await;
    settle(&mut [&mut a, &mut b]).await;
    assert_eq!(b.peer.stroke_log().history(), &[s1.clone()][..]);
    assert_eq!(b.canvas.frames.lock().expect("").incremental, vec![s1.clone()]);

    a.command(PeerCommand::Undo).await;
    settle(&mut [&mut a, &mut b]).await;
    assert!(a.peer.stroke_log().history().is_empty());
    assert!(b.peer.stroke_log().history().is_empty());
    assert_eq!(b.peer.stroke_log().redo_stack(), &[s1][..]);
    assert_eq!(
        b.canvas.frames.lock().expect("").full.last(),
        Some(&Vec::new())
    );
}

#[tokio::test]
async fn it_redoes_as_a_plain_add_on_the_other_side() {
    let relay = MemoryRelay::new();
    let network = LoopbackNetwork::new();
    let (mut a, mut b) = connected_pair(&relay, &network).await;

    let s1 = freehand(0.2);
    a.command(PeerCommand::AddStroke(s1.clone())).await;
    a.command(PeerCommand::Undo).await;
    a.command(PeerCommand::Redo).await;
    settle(&mut [&mut a, &mut b]).await;

    assert_eq!(a.peer.stroke_log().history(), &[s1.clone()][..]);
    assert_eq!(b.peer.stroke_log().history(), &[s1][..]);
}

#[tokio::test]
async fn it_neither_draws_nor_sends_a_stroke_that_is_already_live() {
    let relay = MemoryRelay::new();
    let network = LoopbackNetwork::new();
    let (mut a, mut b) = connected_pair(&relay, &network).await;

    let s1 = freehand(0.3);
    a.command(PeerCommand::AddStroke(s1.clone())).await;
    a.command(PeerCommand::AddStroke(freehand(0.4))).await;
    a.command(PeerCommand::Undo).await;
    settle(&mut [&mut a, &mut b]).await;
    let b_draws = b.canvas.frames.lock().expect("").incremental.len();

    a.command(PeerCommand::AddStroke(s1.clone())).await;
    settle(&mut [&mut a, &mut b]).await;

    assert_eq!(a.canvas.frames.lock().expect("").incremental.len(), 2);
    assert_eq!(a.peer.stroke_log().redo_stack().len(), 1);
    assert_eq!(b.canvas.frames.lock().expect("").incremental.len(), b_draws);
    assert_eq!(b.peer.stroke_log().history(), &[s1][..]);
}

#[tokio::test]
async fn it_turns_the_third_participant_away() {
    let relay = MemoryRelay::new();
    let network = LoopbackNetwork::new();
    let (mut a, mut b) = connected_pair(&relay, &network).await;
    a.notices();

    let mut c = TestPeer::join(&relay, &network, "c");
    settle(&mut [&mut a, &mut b, &mut c]).await;

    let notices = c.notices();
    assert_eq!(notices.first(), Some(&PeerNotice::RoomFull));
    assert!(!notices.iter().any(|n| matches!(
        n,
        PeerNotice::SessionState {
            state: NegotiationState::Connected,
            ..
        }
    )));
    assert_eq!(c.peer.negotiator().phase(), NegotiatorPhase::RoomFull);
    for kind in SessionKind::ALL {
        assert_eq!(c.state(kind), NegotiationState::Idle);
        assert_eq!(a.state(kind), NegotiationState::Connected);
    }
    assert!(a.notices().is_empty());
}

#[tokio::test]
async fn it_converges_on_an_empty_canvas_after_simultaneous_clear() {
    let relay = MemoryRelay::new();
    let network = LoopbackNetwork::new();
    let (mut a, mut b) = connected_pair(&relay, &network).await;

    a.command(PeerCommand::AddStroke(freehand(0.1))).await;
    b.command(PeerCommand::AddStroke(freehand(0.2))).await;
    settle(&mut [&mut a, &mut b]).await;
    b.command(PeerCommand::Undo).await;
    settle(&mut [&mut a, &mut b]).await;

    a.command(PeerCommand::Clear).await;
    b.command(PeerCommand::Clear).await;
    settle(&mut [&mut a, &mut b]).await;

    for peer in [&a, &b] {
        assert!(peer.peer.stroke_log().history().is_empty());
        assert!(peer.peer.stroke_log().redo_stack().is_empty());
    }
}

#[tokio::test]
async fn it_builds_shapes_from_pointer_input() {
    let relay = MemoryRelay::new();
    let network = LoopbackNetwork::new();
    let (mut a, mut b) = connected_pair(&relay, &network).await;

    a.command(PeerCommand::SetTool(Tool::Rectangle)).await;
    a.command(PeerCommand::SetWidth(50.0)).await;
    a.command(PeerCommand::Pointer(PointerEvent::Down(Point::new(0.1, 0.1))))
        .await;
    a.command(PeerCommand::Pointer(PointerEvent::Move(Point::new(0.4, 0.3))))
        .await;
    a.command(PeerCommand::Pointer(PointerEvent::Up(Point::new(0.5, 0.5))))
        .await;
    settle(&mut [&mut a, &mut b]).await;

    let history = b.peer.stroke_log().history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind(), StrokeKind::Rectangle);
    assert_eq!(history[0].width, 20.0);
    assert!(!a.canvas.frames.lock().expect("").full.is_empty());
}

#[tokio::test]
async fn it_asks_for_text_and_shares_the_committed_text() {
    let relay = MemoryRelay::new();
    let network = LoopbackNetwork::new();
    let (mut a, mut b) = connected_pair(&relay, &network).await;
    a.notices();

    a.command(PeerCommand::SetTool(Tool::Text)).await;
    a.command(PeerCommand::Pointer(PointerEvent::Down(Point::new(0.3, 0.4))))
        .await;
    let at = match a.notices().pop() {
        Some(PeerNotice::TextRequested(at)) => at,
        other => panic!("unexpected notice: {:?}", other),
    };
    a.command(PeerCommand::CommitText {
        text: "hello".into(),
        at,
    })
    .await;
    settle(&mut [&mut a, &mut b]).await;

    match &b.peer.stroke_log().history()[0].shape {
        Shape::Text { text, .. } => assert_eq!(text, "hello"),
        other => panic!("unexpected shape: {:?}", other),
    }
}

#[tokio::test]
async fn it_keeps_drawing_locally_without_a_channel() {
    let relay = MemoryRelay::new();
    let network = LoopbackNetwork::new();
    let mut a = TestPeer::join(&relay, &network, "a");

    a.command(PeerCommand::AddStroke(freehand(0.5))).await;
    assert_eq!(a.peer.stroke_log().history().len(), 1);
    assert!(matches!(
        a.notices().as_slice(),
        [PeerNotice::Warning(Error::TransportUnavailable(_))]
    ));
}

#[tokio::test]
async fn it_reports_the_end_of_sync_when_the_other_side_leaves() {
    let relay = MemoryRelay::new();
    let network = LoopbackNetwork::new();
    let (mut a, mut b) = connected_pair(&relay, &network).await;
    b.notices();

    a.command(PeerCommand::Leave).await;
    settle(&mut [&mut a, &mut b]).await;
    assert!(b.notices().contains(&PeerNotice::SyncChannelClosed));

    b.command(PeerCommand::AddStroke(freehand(0.5))).await;
    assert_eq!(b.peer.stroke_log().history().len(), 1);
    assert!(b
        .notices()
        .iter()
        .any(|n| matches!(n, PeerNotice::Warning(Error::TransportUnavailable(_)))));
}

#[tokio::test]
async fn it_attaches_tracks_captured_before_the_session() {
    let relay = MemoryRelay::new();
    let network = LoopbackNetwork::new();
    let mut a = TestPeer::join(&relay, &network, "a");
    let mut b = TestPeer::join(&relay, &network, "b");

    b.command(PeerCommand::CaptureReady(vec![LocalTrack {
        id: "b-cam".into(),
        kind: TrackKind::Video,
    }]))
    .await;
    settle(&mut [&mut a, &mut b]).await;

    assert_eq!(a.state(SessionKind::Media), NegotiationState::Connected);
    assert!(a
        .notices()
        .iter()
        .any(|n| matches!(n, PeerNotice::RemoteTrack(t) if t.id == "b-cam")));
}

#[tokio::test]
async fn it_draws_on_when_capture_fails() {
    let relay = MemoryRelay::new();
    let network = LoopbackNetwork::new();
    let (mut a, mut b) = connected_pair(&relay, &network).await;
    a.notices();

    a.command(PeerCommand::CaptureFailed("camera busy".into()))
        .await;
    assert_eq!(
        a.notices(),
        vec![PeerNotice::Warning(Error::DeviceUnavailable(
            "camera busy".into()
        ))]
    );

    a.command(PeerCommand::AddStroke(freehand(0.5))).await;
    settle(&mut [&mut a, &mut b]).await;
    assert_eq!(b.peer.stroke_log().history().len(), 1);
    assert_eq!(a.state(SessionKind::Media), NegotiationState::Connected);
}

#[tokio::test]
async fn it_connects_after_glare() {
    let relay = MemoryRelay::new();
    let network = LoopbackNetwork::new();
    let mut b = TestPeer::join(&relay, &network, "b");
    let mut a = TestPeer::join(&relay, &network, "a");

    // b saw a's join; hand a the mirror image before anything is delivered
    let join_of_b = RelayEvent::Message(
        sketchpair_peer::sketchpair_system::RelayEnvelope::new(
            "b".into(),
            sketchpair_peer::sketchpair_system::RelayMessage::Join,
        ),
    );
    b.pump().await;
    a.peer.handle_relay_event(join_of_b).await;
    settle(&mut [&mut b, &mut a]).await;

    assert!(a.peer.sync_channel().is_open());
    assert!(b.peer.sync_channel().is_open());
    let s1 = freehand(0.4);
    b.command(PeerCommand::AddStroke(s1.clone())).await;
    settle(&mut [&mut a, &mut b]).await;
    assert_eq!(a.peer.stroke_log().history(), &[s1][..]);
}
