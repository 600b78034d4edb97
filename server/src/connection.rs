use actix::{Actor, ActorContext, AsyncContext, Handler, Message, Running, StreamHandler};
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use actix_web_actors::ws::{CloseCode, CloseReason};

use sketchpair_system::{RelayEnvelope, RoomId};
use tokio::sync::mpsc::Receiver;

use crate::connection_tx_storage::ConnectionTx;
use crate::room_state::ConnectionId;
use crate::server::ServerTx;

#[derive(Debug)]
pub enum ConnectionCommand {
    Connect { tx: ConnectionTx, room_id: RoomId },
    Disconnect { from: ConnectionId },
    Relay { from: ConnectionId, text: String },
}

#[derive(Debug)]
pub enum ConnectionEvent {
    Connected { connection_id: ConnectionId },
    Relayed(String),
    RoomFull,
}

#[derive(Message)]
#[rtype(result = "()")]
struct ConnectionActorMessage(ConnectionEvent);

enum ConnectionState {
    // Frames arriving before the server admits us are held back.
    Idle { pending: Vec<String> },
    Connected(ConnectionId),
    Rejected,
}

struct ConnectionActor {
    state: ConnectionState,
    srv_tx: ServerTx,
    room_id: RoomId,
}

impl ConnectionActor {
    fn forward(&self, from: ConnectionId, text: String) {
        if let Err(e) = self.srv_tx.try_send(ConnectionCommand::Relay { from, text }) {
            log::warn!("Dropping frame from {}: {}", from, e);
        }
    }
}

impl Actor for ConnectionActor {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let (tx, mut rx) = tokio::sync::mpsc::channel::<ConnectionEvent>(32);

        if let Err(e) = self.srv_tx.try_send(ConnectionCommand::Connect {
            tx,
            room_id: self.room_id.clone(),
        }) {
            log::warn!("Relay server unavailable: {}", e);
            ctx.stop();
            return;
        }

        let addr = ctx.address().recipient();
        let srv_tx = self.srv_tx.clone();

        tokio::spawn(async move {
            log::debug!("connection green thread - started");
            forward_events(rx, srv_tx, |msg| {
                addr.try_send(ConnectionActorMessage(msg)).is_ok()
            })
            .await;
            log::debug!("connection green thread - terminated");
        });
    }

    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        if let ConnectionState::Connected(id) = self.state {
            if let Err(e) = self
                .srv_tx
                .try_send(ConnectionCommand::Disconnect { from: id })
            {
                log::warn!("Cannot announce disconnect of {}: {}", id, e);
            }
        }

        Running::Stop
    }
}

// Hands server events to the actor until it is gone. An admission the actor
// never received is released again.
async fn forward_events<F>(mut rx: Receiver<ConnectionEvent>, srv_tx: ServerTx, deliver: F)
where
    F: Fn(ConnectionEvent) -> bool,
{
    while let Some(msg) = rx.recv().await {
        let admitted = match msg {
            ConnectionEvent::Connected { connection_id } => Some(connection_id),
            _ => None,
        };
        if deliver(msg) {
            continue;
        }
        if let Some(from) = admitted {
            log::info!("Connection {} went away while joining", from);
            if srv_tx.send(ConnectionCommand::Disconnect { from }).await.is_err() {
                log::warn!("Cannot release slot of {}", from);
            }
        }
        break;
    }
}

/// Ingress
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ConnectionActor {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => ctx.pong(&msg),
            Ok(ws::Message::Text(text)) => {
                log::debug!("Ingress size: {}", text.len());
                match &mut self.state {
                    ConnectionState::Connected(from) => {
                        let from = *from;
                        self.forward(from, text.to_string());
                    }
                    ConnectionState::Idle { pending } => pending.push(text.to_string()),
                    ConnectionState::Rejected => {}
                }
            }
            Ok(ws::Message::Binary(bin)) => {
                log::warn!("Ignoring binary frame of {} bytes", bin.len());
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                log::warn!("WebSocket protocol error: {}", e);
                ctx.stop();
            }
            _ => (),
        }
    }
}

/// Egress
impl Handler<ConnectionActorMessage> for ConnectionActor {
    type Result = ();

    fn handle(
        &mut self,
        msg: ConnectionActorMessage,
        ctx: &mut ws::WebsocketContext<Self>,
    ) -> Self::Result {
        let connection_event = msg.0;
        log::debug!("Egress {:?}", connection_event);
        match connection_event {
            ConnectionEvent::Connected { connection_id } => {
                let previous =
                    std::mem::replace(&mut self.state, ConnectionState::Connected(connection_id));
                if let ConnectionState::Idle { pending } = previous {
                    for text in pending {
                        self.forward(connection_id, text);
                    }
                }
            }
            ConnectionEvent::Relayed(text) => ctx.text(text),
            ConnectionEvent::RoomFull => {
                self.state = ConnectionState::Rejected;
                let full = RelayEnvelope::full()
                    .encode()
                    .unwrap_or_else(|_| r#"{"type":"full"}"#.to_string());
                ctx.text(full);
                ctx.close(Some(CloseReason {
                    code: CloseCode::Policy,
                    description: Some("room is full".into()),
                }));
                ctx.stop();
            }
        }
    }
}

pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    room_id: web::Path<String>,
    srv_tx: web::Data<ServerTx>,
) -> Result<HttpResponse, Error> {
    let room_id = room_id.into_inner();
    if room_id.trim().is_empty() {
        return Ok(HttpResponse::BadRequest().finish());
    }
    ws::start(
        ConnectionActor {
            srv_tx: srv_tx.get_ref().clone(),
            state: ConnectionState::Idle {
                pending: Vec::new(),
            },
            room_id,
        },
        &req,
        stream,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::channel;

    #[tokio::test]
    async fn it_releases_an_admission_the_actor_never_saw() {
        let (srv_tx, mut srv_rx) = channel(8);
        let (tx, rx) = channel(8);
        tx.send(ConnectionEvent::Connected { connection_id: 7 })
            .await
            .expect("");

        forward_events(rx, srv_tx, |_| false).await;

        match srv_rx.recv().await {
            Some(ConnectionCommand::Disconnect { from }) => assert_eq!(from, 7),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[tokio::test]
    async fn it_stops_quietly_when_a_relayed_frame_finds_no_actor() {
        let (srv_tx, mut srv_rx) = channel(8);
        let (tx, rx) = channel(8);
        tx.send(ConnectionEvent::Relayed("hi".into()))
            .await
            .expect("");

        forward_events(rx, srv_tx, |_| false).await;

        assert!(srv_rx.try_recv().is_err());
    }
}
