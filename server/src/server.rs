use tokio::sync::mpsc::{channel, Sender};

use super::connection::{ConnectionCommand, ConnectionEvent};
use crate::connection_tx_storage::ConnectionTxStorage;
use crate::room_state::{ConnectionId, RoomError, RoomState};

pub type ServerTx = Sender<ConnectionCommand>;

/// Owns every room. Connections talk to it only through `ServerTx`, so room
/// state is never shared between actors.
struct Server {
    room_state: RoomState,
    connections: ConnectionTxStorage,
}

impl Server {
    fn new() -> Self {
        Self {
            room_state: RoomState::new(),
            connections: ConnectionTxStorage::new(),
        }
    }

    async fn handle_connection_command(&mut self, command: ConnectionCommand) {
        match command {
            ConnectionCommand::Connect { tx, room_id } => {
                // A socket that closed before we got here must not take a slot.
                if tx.is_closed() {
                    log::info!("Connection to room {} closed before joining", room_id);
                    return;
                }
                match self.room_state.join_room(&room_id) {
                    Ok(connection_id) => {
                        self.connections.insert(connection_id, tx);
                        let delivered = self
                            .connections
                            .send(&connection_id, ConnectionEvent::Connected { connection_id })
                            .await;
                        if !delivered {
                            self.disconnect(&connection_id);
                        }
                    }
                    Err(RoomError::RoomFull) => {
                        if tx.send(ConnectionEvent::RoomFull).await.is_err() {
                            log::warn!("Rejected connection went away before hearing why");
                        }
                    }
                    Err(e) => log::warn!("Cannot join room {}: {:?}", room_id, e),
                }
            }
            ConnectionCommand::Disconnect { from } => self.disconnect(&from),
            ConnectionCommand::Relay { from, text } => self.relay(&from, text).await,
        }
    }

    fn disconnect(&mut self, connection_id: &ConnectionId) {
        self.room_state.leave_room(connection_id);
        self.connections.remove(connection_id);
    }

    // Text frames are forwarded verbatim; the relay never looks inside.
    async fn relay(&mut self, from: &ConnectionId, text: String) {
        match self.room_state.peers_of(from) {
            Ok(peers) => {
                log::debug!("Relay {} bytes from {} to {:?}", text.len(), from, peers);
                for peer in peers {
                    self.connections
                        .send(&peer, ConnectionEvent::Relayed(text.clone()))
                        .await;
                }
            }
            Err(e) => log::warn!("Dropping message from {}: {:?}", from, e),
        }
    }
}

pub fn spawn_server() -> ServerTx {
    let (srv_tx, mut srv_rx) = channel::<ConnectionCommand>(256);

    tokio::spawn(async move {
        let mut server = Box::new(Server::new());

        while let Some(command) = srv_rx.recv().await {
            server.handle_connection_command(command).await;
        }
    });

    srv_tx
}
