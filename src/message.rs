//! Protocol messages exchanged between stores.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Envelope tag used by the newline-framed sample transport.
pub const ENVELOPE_TYPE: &str = "Entangld_Message";

/// Discriminant for the small store-to-store protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Get,
    Set,
    Push,
    Value,
    Subscribe,
    Unsubscribe,
    Event,
}

/// One protocol message.
///
/// `path` is always the path on the recipient's side: the sender peels its
/// namespace before transmitting. `uuid` correlates `get`/`value` pairs
/// and identifies subscriptions; it stays empty for fire-and-forget
/// `set`/`push`. `value` is `Null` for message kinds that carry none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub path: String,
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub value: Value,
}

impl Message {
    /// Wrap this message in the sample-transport envelope:
    /// `{"type":"Entangld_Message","data":{type,path,value,uuid}}`.
    ///
    /// The envelope is a transport convention, not a core requirement;
    /// embedders with their own framing can serialize [`Message`]
    /// directly.
    pub fn to_envelope(&self) -> Value {
        json!({
            "type": ENVELOPE_TYPE,
            "data": {
                "type": self.kind,
                "path": self.path,
                "value": self.value,
                "uuid": self.uuid,
            }
        })
    }

    /// Parse a message out of the sample-transport envelope. Returns
    /// `None` when the tag or payload doesn't match.
    pub fn from_envelope(envelope: &Value) -> Option<Message> {
        if envelope.get("type")?.as_str()? != ENVELOPE_TYPE {
            return None;
        }
        serde_json::from_value(envelope.get("data")?.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_is_lowercase_on_the_wire() {
        assert_eq!(
            serde_json::to_value(MessageKind::Unsubscribe).unwrap(),
            json!("unsubscribe")
        );
        assert_eq!(
            serde_json::from_value::<MessageKind>(json!("event")).unwrap(),
            MessageKind::Event
        );
    }

    #[test]
    fn test_serde_round_trip() {
        let msg = Message {
            kind: MessageKind::Value,
            path: "users.alfred".to_string(),
            uuid: "abc-123".to_string(),
            value: json!({"role": "butler"}),
        };
        let encoded = serde_json::to_string(&msg).unwrap();
        let decoded: Message = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_missing_uuid_and_value_default() {
        let decoded: Message =
            serde_json::from_value(json!({"type": "set", "path": "a.b"})).unwrap();
        assert_eq!(decoded.kind, MessageKind::Set);
        assert_eq!(decoded.uuid, "");
        assert_eq!(decoded.value, Value::Null);
    }

    #[test]
    fn test_envelope_round_trip() {
        let msg = Message {
            kind: MessageKind::Event,
            path: "name".to_string(),
            uuid: "u-1".to_string(),
            value: json!("Bruce"),
        };
        let envelope = msg.to_envelope();
        assert_eq!(envelope["type"], json!(ENVELOPE_TYPE));
        assert_eq!(envelope["data"]["type"], json!("event"));
        assert_eq!(Message::from_envelope(&envelope), Some(msg));
    }

    #[test]
    fn test_foreign_envelope_rejected() {
        assert_eq!(
            Message::from_envelope(&json!({"type": "Other", "data": {}})),
            None
        );
        assert_eq!(Message::from_envelope(&json!(42)), None);
    }
}
