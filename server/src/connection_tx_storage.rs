use crate::connection::ConnectionEvent;
use crate::room_state::ConnectionId;
use std::collections::HashMap;

pub type ConnectionTx = tokio::sync::mpsc::Sender<ConnectionEvent>;

pub struct ConnectionTxStorage {
    connection_txs: HashMap<ConnectionId, ConnectionTx>,
}

impl ConnectionTxStorage {
    pub fn new() -> Self {
        Self {
            connection_txs: HashMap::new(),
        }
    }

    pub fn insert(&mut self, connection_id: ConnectionId, tx: ConnectionTx) {
        self.connection_txs.insert(connection_id, tx);
    }

    /// `false` when the connection is unknown or its actor has gone away.
    pub async fn send(&mut self, to: &ConnectionId, message: ConnectionEvent) -> bool {
        match self.connection_txs.get_mut(to) {
            Some(tx) => {
                let delivered = tx.send(message).await.is_ok();
                if !delivered {
                    log::warn!("Connection {} is gone, dropping event", to);
                }
                delivered
            }
            None => {
                log::warn!("No connection {}", to);
                false
            }
        }
    }

    pub fn remove(&mut self, connection_id: &ConnectionId) -> Option<ConnectionTx> {
        self.connection_txs.remove(connection_id)
    }
}
