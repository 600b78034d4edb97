use futures_util::{SinkExt, StreamExt};
use sketchpair_system::{Error, ParticipantId, RelayEnvelope, RelayMessage, RoomId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    Message(RelayEnvelope),
    /// Terminal. Nothing arrives after it.
    Closed,
}

/// Outbound half of a relay connection. Sending never waits on the network.
pub trait RelayLink: Send + Sync {
    fn self_id(&self) -> &ParticipantId;

    /// Stamps the message with our id and hands it to the relay.
    fn send(&self, message: RelayMessage) -> Result<(), Error>;
}

/// Decodes one inbound frame, dropping what must never reach the negotiator.
pub fn decode_frame(text: &str, self_id: &ParticipantId) -> Option<RelayEnvelope> {
    let envelope = match RelayEnvelope::decode(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            log::warn!("Dropping relay frame: {}", e);
            return None;
        }
    };
    if envelope.is_from(self_id) {
        log::debug!("Dropping echo of our own {}", envelope.message.type_tag());
        return None;
    }
    if envelope.message == RelayMessage::Unknown {
        log::warn!("Dropping relay message with unknown type");
        return None;
    }
    Some(envelope)
}

/// WebSocket connection to the relay for one room.
pub struct RelayClient {
    self_id: ParticipantId,
    room_id: RoomId,
    outgoing: UnboundedSender<String>,
    open: Arc<AtomicBool>,
}

impl RelayClient {
    /// Connects to `{relay_url}/{room_id}` and announces us with `join`.
    pub async fn join(
        relay_url: &str,
        room_id: &str,
        self_id: ParticipantId,
    ) -> Result<(Self, UnboundedReceiver<RelayEvent>), Error> {
        let url = format!("{}/{}", relay_url.trim_end_matches('/'), room_id);
        let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| Error::TransportUnavailable(format!("{}: {}", url, e)))?;
        log::info!("Connected to relay {}", url);

        let (mut writer, mut reader) = ws_stream.split();
        let (outgoing, mut outgoing_rx) = unbounded_channel::<String>();
        let (events_tx, events_rx) = unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));

        tokio::spawn(async move {
            while let Some(text) = outgoing_rx.recv().await {
                log::debug!("Relay egress size: {}", text.len());
                if let Err(e) = writer.send(Message::text(text)).await {
                    log::warn!("Relay write failed: {}", e);
                    break;
                }
            }
            let _ = writer.close().await;
        });

        let reader_open = open.clone();
        let reader_self_id = self_id.clone();
        tokio::spawn(async move {
            while let Some(frame) = reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        log::debug!("Relay ingress size: {}", text.len());
                        if let Some(envelope) = decode_frame(text.as_str(), &reader_self_id) {
                            if events_tx.send(RelayEvent::Message(envelope)).is_err() {
                                break;
                            }
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        log::warn!("Relay read failed: {}", e);
                        break;
                    }
                }
            }
            reader_open.store(false, Ordering::SeqCst);
            log::info!("Relay connection closed");
            let _ = events_tx.send(RelayEvent::Closed);
        });

        let client = Self {
            self_id,
            room_id: room_id.to_string(),
            outgoing,
            open,
        };
        client.send(RelayMessage::Join)?;
        Ok((client, events_rx))
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

impl RelayLink for RelayClient {
    fn self_id(&self) -> &ParticipantId {
        &self.self_id
    }

    fn send(&self, message: RelayMessage) -> Result<(), Error> {
        if !self.is_open() {
            return Err(Error::TransportUnavailable("relay closed".to_string()));
        }
        let text = RelayEnvelope::new(self.self_id.clone(), message).encode()?;
        self.outgoing
            .send(text)
            .map_err(|_| Error::TransportUnavailable("relay writer stopped".to_string()))
    }
}
