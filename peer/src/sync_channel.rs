use sketchpair_system::{Error, SyncMessage};
use std::sync::Arc;

use crate::transport::DataChannel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Pending,
    Open,
    /// Terminal for drawing sync. The relay and the media session stay up.
    Closed,
}

/// Drawing operations between the two peers, in delivery order, no acks.
#[derive(Debug)]
pub struct SyncChannel {
    state: ChannelState,
    channel: Option<Arc<dyn DataChannel>>,
}

impl Default for SyncChannel {
    fn default() -> Self {
        Self {
            state: ChannelState::Pending,
            channel: None,
        }
    }
}

impl SyncChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ChannelState::Open
            && self.channel.as_ref().map(|c| c.is_open()).unwrap_or(false)
    }

    /// Returns false if the channel was already closed for good.
    pub fn attach(&mut self, channel: Arc<dyn DataChannel>) -> bool {
        if self.state == ChannelState::Closed {
            log::warn!("Ignoring channel {} opened after sync ended", channel.label());
            return false;
        }
        log::info!("Sync channel {} open", channel.label());
        self.channel = Some(channel);
        self.state = ChannelState::Open;
        true
    }

    pub fn mark_closed(&mut self) {
        if self.state != ChannelState::Closed {
            log::warn!("Sync channel closed, drawing continues locally only");
        }
        self.state = ChannelState::Closed;
        self.channel = None;
    }

    pub async fn broadcast(&self, message: &SyncMessage) -> Result<(), Error> {
        let channel = match (&self.channel, self.state) {
            (Some(channel), ChannelState::Open) if channel.is_open() => channel,
            _ => {
                return Err(Error::TransportUnavailable(
                    "sync channel not open".to_string(),
                ))
            }
        };
        let text = message.encode()?;
        log::debug!("Sync egress size: {}", text.len());
        channel
            .send_text(text)
            .await
            .map_err(|e| Error::TransportUnavailable(e.to_string()))
    }

    /// Malformed messages are dropped; the channel stays usable.
    pub fn receive(&self, text: &str) -> Option<SyncMessage> {
        log::debug!("Sync ingress size: {}", text.len());
        match SyncMessage::decode(text) {
            Ok(message) => Some(message),
            Err(e) => {
                log::warn!("Dropping sync message: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct RecordingChannel {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DataChannel for RecordingChannel {
        fn label(&self) -> &str {
            "drawData"
        }
        fn is_open(&self) -> bool {
            true
        }
        async fn send_text(&self, text: String) -> Result<(), TransportError> {
            self.sent.lock().expect("").push(text);
            Ok(())
        }
    }

    #[tokio::test]
    async fn it_refuses_to_send_before_open() {
        let sync = SyncChannel::new();
        assert!(matches!(
            sync.broadcast(&SyncMessage::Clear).await,
            Err(Error::TransportUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn it_sends_encoded_messages_once_open() {
        let channel = Arc::new(RecordingChannel::default());
        let mut sync = SyncChannel::new();
        assert!(sync.attach(channel.clone()));
        sync.broadcast(&SyncMessage::Clear).await.expect("");
        assert_eq!(*channel.sent.lock().expect(""), vec![r#"{"type":"clear"}"#]);
    }

    #[tokio::test]
    async fn it_stays_closed_for_good() {
        let mut sync = SyncChannel::new();
        sync.attach(Arc::new(RecordingChannel::default()));
        sync.mark_closed();
        assert!(!sync.attach(Arc::new(RecordingChannel::default())));
        assert_eq!(sync.state(), ChannelState::Closed);
        assert!(sync.broadcast(&SyncMessage::Clear).await.is_err());
    }

    #[test]
    fn it_drops_malformed_messages() {
        let sync = SyncChannel::new();
        assert_eq!(sync.receive(r#"{"type":"teleport"}"#), None);
        assert_eq!(sync.receive(r#"{"type":"clear"}"#), Some(SyncMessage::Clear));
    }
}
