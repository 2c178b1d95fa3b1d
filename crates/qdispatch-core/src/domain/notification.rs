//! Notification - バス上を流れる起床シグナル
//!
//! payload は `{"task_id": "<id>"}`（UTF-8 JSON）のみ。
//! 状態や circuit は含まない（正本は TaskStore）。

use serde::{Deserialize, Serialize};

use super::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub task_id: TaskId,
}

/// Why a bus message could not be turned into a `Notification`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedMessage {
    #[error("payload is not UTF-8 JSON: {0}")]
    NotJson(String),

    #[error("payload has no task_id")]
    MissingTaskId,

    #[error("task_id is not valid: {0}")]
    BadTaskId(String),
}

#[derive(Deserialize)]
struct RawNotification {
    task_id: Option<serde_json::Value>,
}

impl Notification {
    pub fn new(task_id: TaskId) -> Self {
        Self { task_id }
    }

    /// Wire bytes. Built from a `Value` so there is no fallible encode step.
    pub fn encode(&self) -> Vec<u8> {
        serde_json::json!({ "task_id": self.task_id.to_string() })
            .to_string()
            .into_bytes()
    }

    /// Decode a raw bus payload.
    pub fn decode(payload: &[u8]) -> Result<Self, MalformedMessage> {
        let raw: RawNotification = serde_json::from_slice(payload)
            .map_err(|e| MalformedMessage::NotJson(e.to_string()))?;
        let value = match raw.task_id {
            None | Some(serde_json::Value::Null) => return Err(MalformedMessage::MissingTaskId),
            Some(value) => value,
        };
        let text = value
            .as_str()
            .ok_or_else(|| MalformedMessage::BadTaskId(value.to_string()))?;
        if text.is_empty() {
            return Err(MalformedMessage::MissingTaskId);
        }
        let task_id = text
            .parse()
            .map_err(|e: super::ids::ParseTaskIdError| MalformedMessage::BadTaskId(e.to_string()))?;
        Ok(Self { task_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use ulid::Ulid;

    #[test]
    fn encoded_payload_is_task_id_object() {
        let id = TaskId::from_ulid(Ulid::new());
        let bytes = Notification::new(id).encode();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value, serde_json::json!({ "task_id": id.to_string() }));
        assert_eq!(Notification::decode(&bytes).unwrap().task_id, id);
    }

    #[test]
    fn encoded_payload_is_never_empty() {
        let bytes = Notification::new(TaskId::from_ulid(Ulid::nil())).encode();
        assert!(!bytes.is_empty());
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            format!(r#"{{"task_id":"task-{}"}}"#, Ulid::nil())
        );
    }

    #[rstest]
    #[case(br#"{}"#.as_slice())]
    #[case(br#"{"task_id": null}"#.as_slice())]
    #[case(br#"{"task_id": ""}"#.as_slice())]
    #[case(br#"{"other": "x"}"#.as_slice())]
    fn missing_task_id_is_malformed(#[case] payload: &[u8]) {
        assert_eq!(
            Notification::decode(payload).unwrap_err(),
            MalformedMessage::MissingTaskId
        );
    }

    #[rstest]
    #[case(b"not json".as_slice())]
    #[case(&[0xff, 0xfe, 0x00])]
    fn garbage_is_not_json(#[case] payload: &[u8]) {
        assert!(matches!(
            Notification::decode(payload),
            Err(MalformedMessage::NotJson(_))
        ));
    }

    #[test]
    fn non_string_task_id_is_rejected() {
        assert!(matches!(
            Notification::decode(br#"{"task_id": 42}"#),
            Err(MalformedMessage::BadTaskId(_))
        ));
    }
}
