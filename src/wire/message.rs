use crate::logstore::LogId;
use crate::replica::NodeRole;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

/// MessageKind is the `head` field of every frame. Wire values are part of
/// the protocol and must not be renumbered.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum MessageKind {
    Response,
    Failed,
    DataSet,
    DataRemove,
    UncommittedLogEntry,
    AppendLogEntry,
    DataUpdateCheck,
    DataIncrementalUpdate,
    PeersUpdate,
    ConfigFromFollower,
    ServiceSet,
    ServiceRemove,
    ServiceCompletelyUpdate,
}

impl From<MessageKind> for u8 {
    fn from(kind: MessageKind) -> u8 {
        match kind {
            MessageKind::Response => 1,
            MessageKind::Failed => 2,
            MessageKind::DataSet => 10,
            MessageKind::DataRemove => 11,
            MessageKind::UncommittedLogEntry => 12,
            MessageKind::AppendLogEntry => 13,
            MessageKind::DataUpdateCheck => 14,
            MessageKind::DataIncrementalUpdate => 15,
            MessageKind::PeersUpdate => 20,
            MessageKind::ConfigFromFollower => 21,
            MessageKind::ServiceSet => 30,
            MessageKind::ServiceRemove => 31,
            MessageKind::ServiceCompletelyUpdate => 32,
        }
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = String;

    fn try_from(head: u8) -> Result<Self, Self::Error> {
        match head {
            1 => Ok(MessageKind::Response),
            2 => Ok(MessageKind::Failed),
            10 => Ok(MessageKind::DataSet),
            11 => Ok(MessageKind::DataRemove),
            12 => Ok(MessageKind::UncommittedLogEntry),
            13 => Ok(MessageKind::AppendLogEntry),
            14 => Ok(MessageKind::DataUpdateCheck),
            15 => Ok(MessageKind::DataIncrementalUpdate),
            20 => Ok(MessageKind::PeersUpdate),
            21 => Ok(MessageKind::ConfigFromFollower),
            30 => Ok(MessageKind::ServiceSet),
            31 => Ok(MessageKind::ServiceRemove),
            32 => Ok(MessageKind::ServiceCompletelyUpdate),
            other => Err(format!("unknown message head {}", other)),
        }
    }
}

/// Envelope metadata carried by every message, populated from the sender's
/// view of itself at send time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub group: String,
    pub id: String,
    /// Advertised replication address of the sender, `host:port`.
    pub ip: String,
    pub name: String,
    pub role: NodeRole,
    pub last_log_id: LogId,
    pub last_service_log_id: u64,
}

/// One framed request or response. `body` holds the JSON-encoded payload for
/// kinds that carry one, empty otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub head: MessageKind,
    pub body: String,
    pub info: Envelope,
}

impl Message {
    pub fn new(head: MessageKind, body: String, info: Envelope) -> Self {
        Message { head, body, info }
    }

    /// A bodyless message, used for responses and probe requests.
    pub fn empty(head: MessageKind, info: Envelope) -> Self {
        Message {
            head,
            body: String::new(),
            info,
        }
    }

    pub fn with_payload<T: Serialize>(
        head: MessageKind,
        payload: &T,
        info: Envelope,
    ) -> Result<Self, serde_json::Error> {
        Ok(Message {
            head,
            body: serde_json::to_string(payload)?,
            info,
        })
    }

    pub fn decode_body<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }

    pub fn is_response(&self) -> bool {
        self.head == MessageKind::Response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logstore::{LogEntry, Mutation};
    use std::collections::HashMap;
    use std::convert::TryFrom;

    fn envelope() -> Envelope {
        Envelope {
            group: "g1".to_string(),
            id: "node-1".to_string(),
            ip: "127.0.0.1:7101".to_string(),
            name: "node-1".to_string(),
            role: NodeRole::Server,
            last_log_id: LogId::new(42),
            last_service_log_id: 7,
        }
    }

    #[test]
    fn kind_round_trips_through_wire_value() {
        let kinds = [
            MessageKind::Response,
            MessageKind::Failed,
            MessageKind::DataSet,
            MessageKind::DataRemove,
            MessageKind::UncommittedLogEntry,
            MessageKind::AppendLogEntry,
            MessageKind::DataUpdateCheck,
            MessageKind::DataIncrementalUpdate,
            MessageKind::PeersUpdate,
            MessageKind::ConfigFromFollower,
            MessageKind::ServiceSet,
            MessageKind::ServiceRemove,
            MessageKind::ServiceCompletelyUpdate,
        ];
        for kind in kinds {
            assert_eq!(kind, MessageKind::try_from(u8::from(kind)).unwrap());
        }
    }

    #[test]
    fn unknown_head_is_rejected() {
        assert!(MessageKind::try_from(0).is_err());
        assert!(MessageKind::try_from(99).is_err());
    }

    #[test]
    fn log_entry_encode_decode_is_identity() {
        let mut items = HashMap::new();
        items.insert("k".to_string(), "v".to_string());
        let entry = LogEntry::new(LogId::new(100), Mutation::Set(items));

        let msg = Message::with_payload(MessageKind::UncommittedLogEntry, &entry, envelope()).unwrap();
        let decoded: LogEntry = msg.decode_body().unwrap();

        assert_eq!(entry, decoded);
    }

    #[test]
    fn message_json_shape_is_stable() {
        let msg = Message::empty(MessageKind::Response, envelope());
        let json = serde_json::to_string(&msg).unwrap();

        // `head` must serialize as the small-integer wire value.
        assert!(json.contains("\"head\":1"), "unexpected encoding: {}", json);

        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.head, MessageKind::Response);
        assert_eq!(back.info, msg.info);
    }
}
