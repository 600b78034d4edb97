use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type RoomId = String;

/// A room is one drawing session between exactly two participants.
pub const ROOM_CAPACITY: usize = 2;

/// A fresh room id, shared out of band with whoever should join.
pub fn new_room_id() -> RoomId {
    uuid::Uuid::new_v4().to_string()
}

/// Ephemeral identity generated once per client instance. Ordered
/// lexicographically, which is what glare resolution relies on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ParticipantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Data,
    Media,
}

impl SessionKind {
    pub const ALL: [SessionKind; 2] = [SessionKind::Data, SessionKind::Media];
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKind::Data => f.write_str("data"),
            SessionKind::Media => f.write_str("media"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_m_line_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
            username_fragment: None,
        }
    }
}

/// Relay protocol messages. The media session keeps the `video` wire suffix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RelayMessage {
    Join,
    OfferData { offer: SessionDescription },
    AnswerData { answer: SessionDescription },
    IceCandidateData { candidate: IceCandidate },
    OfferVideo { offer: SessionDescription },
    AnswerVideo { answer: SessionDescription },
    IceCandidateVideo { candidate: IceCandidate },
    /// Relay-originated, no payload and no sender.
    Full,
    #[serde(other)]
    Unknown,
}

/// One step of offer/answer/candidate exchange, independent of session kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Negotiation {
    Offer(SessionDescription),
    Answer(SessionDescription),
    Candidate(IceCandidate),
}

impl RelayMessage {
    pub fn offer(kind: SessionKind, offer: SessionDescription) -> Self {
        match kind {
            SessionKind::Data => RelayMessage::OfferData { offer },
            SessionKind::Media => RelayMessage::OfferVideo { offer },
        }
    }

    pub fn answer(kind: SessionKind, answer: SessionDescription) -> Self {
        match kind {
            SessionKind::Data => RelayMessage::AnswerData { answer },
            SessionKind::Media => RelayMessage::AnswerVideo { answer },
        }
    }

    pub fn candidate(kind: SessionKind, candidate: IceCandidate) -> Self {
        match kind {
            SessionKind::Data => RelayMessage::IceCandidateData { candidate },
            SessionKind::Media => RelayMessage::IceCandidateVideo { candidate },
        }
    }

    pub fn into_negotiation(self) -> Option<(SessionKind, Negotiation)> {
        match self {
            RelayMessage::OfferData { offer } => {
                Some((SessionKind::Data, Negotiation::Offer(offer)))
            }
            RelayMessage::AnswerData { answer } => {
                Some((SessionKind::Data, Negotiation::Answer(answer)))
            }
            RelayMessage::IceCandidateData { candidate } => {
                Some((SessionKind::Data, Negotiation::Candidate(candidate)))
            }
            RelayMessage::OfferVideo { offer } => {
                Some((SessionKind::Media, Negotiation::Offer(offer)))
            }
            RelayMessage::AnswerVideo { answer } => {
                Some((SessionKind::Media, Negotiation::Answer(answer)))
            }
            RelayMessage::IceCandidateVideo { candidate } => {
                Some((SessionKind::Media, Negotiation::Candidate(candidate)))
            }
            RelayMessage::Join | RelayMessage::Full | RelayMessage::Unknown => None,
        }
    }

    pub fn type_tag(&self) -> &'static str {
        match self {
            RelayMessage::Join => "join",
            RelayMessage::OfferData { .. } => "offer-data",
            RelayMessage::AnswerData { .. } => "answer-data",
            RelayMessage::IceCandidateData { .. } => "ice-candidate-data",
            RelayMessage::OfferVideo { .. } => "offer-video",
            RelayMessage::AnswerVideo { .. } => "answer-video",
            RelayMessage::IceCandidateVideo { .. } => "ice-candidate-video",
            RelayMessage::Full => "full",
            RelayMessage::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayEnvelope {
    #[serde(rename = "senderId", default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<ParticipantId>,
    #[serde(flatten)]
    pub message: RelayMessage,
}

impl RelayEnvelope {
    pub fn new(sender_id: ParticipantId, message: RelayMessage) -> Self {
        Self {
            sender_id: Some(sender_id),
            message,
        }
    }

    pub fn full() -> Self {
        Self {
            sender_id: None,
            message: RelayMessage::Full,
        }
    }

    pub fn is_from(&self, participant_id: &ParticipantId) -> bool {
        self.sender_id.as_ref() == Some(participant_id)
    }

    pub fn encode(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(text)?)
    }
}
