use serde::{Deserialize, Serialize};

/// Tag byte of a binary sync frame.
pub const BINARY_SYNC_TAG: u8 = 0x01;
/// Tag byte of a binary awareness frame.
pub const BINARY_AWARENESS_TAG: u8 = 0x02;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncMessage {
    pub data: Vec<u8>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AwarenessMessage {
    pub data: Vec<u8>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NoteUpdateMessage {
    pub note_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PeerMessage {
    pub user_id: String,
    pub timestamp: i64,
}

/// Frames a client may send.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ReceivedMessage {
    #[serde(rename = "sync")]
    Sync(SyncMessage),
    #[serde(rename = "awareness")]
    Awareness(AwarenessMessage),
    #[serde(rename = "note-update")]
    NoteUpdate(NoteUpdateMessage),
}

/// Frames the relay sends.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum SendMessage {
    #[serde(rename = "sync")]
    Sync(SyncMessage),
    #[serde(rename = "awareness")]
    Awareness(AwarenessMessage),
    #[serde(rename = "note-update")]
    NoteUpdate(NoteUpdateMessage),
    #[serde(rename = "user-joined")]
    UserJoined(PeerMessage),
    #[serde(rename = "user-left")]
    UserLeft(PeerMessage),
}

#[derive(Deserialize)]
struct FrameHeader {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("unrecognized frame type '{0}'")]
    UnknownType(String),
    #[error("frame type '{0}' is server-to-client only")]
    ServerOnly(String),
    #[error("binary frame too short")]
    EmptyBinary,
    #[error("unrecognized binary frame tag {0:#04x}")]
    UnknownTag(u8),
}

/// Decode a JSON text frame.
pub fn decode_text_frame(text: &str) -> Result<ReceivedMessage, FrameError> {
    match serde_json::from_str::<ReceivedMessage>(text) {
        Ok(msg) => Ok(msg),
        Err(e) => match serde_json::from_str::<FrameHeader>(text) {
            Ok(header) => match header.kind.as_str() {
                "user-joined" | "user-left" => Err(FrameError::ServerOnly(header.kind)),
                "sync" | "awareness" | "note-update" => Err(FrameError::Malformed(e)),
                _ => Err(FrameError::UnknownType(header.kind)),
            },
            Err(_) => Err(FrameError::Malformed(e)),
        },
    }
}

/// Decode a binary frame: one tag byte followed by the raw update.
pub fn decode_binary_frame(bytes: &[u8]) -> Result<ReceivedMessage, FrameError> {
    let (tag, payload) = bytes.split_first().ok_or(FrameError::EmptyBinary)?;
    match *tag {
        BINARY_SYNC_TAG => Ok(ReceivedMessage::Sync(SyncMessage { data: payload.to_vec() })),
        BINARY_AWARENESS_TAG => Ok(ReceivedMessage::Awareness(AwarenessMessage {
            data: payload.to_vec(),
        })),
        other => Err(FrameError::UnknownTag(other)),
    }
}

pub fn encode_binary_frame(tag: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 1);
    frame.push(tag);
    frame.extend_from_slice(payload);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_data_is_a_json_byte_array() {
        let msg = decode_text_frame(r#"{"type":"sync","data":[1,2,255]}"#).unwrap();
        assert_eq!(msg, ReceivedMessage::Sync(SyncMessage { data: vec![1, 2, 255] }));
    }

    #[test]
    fn note_update_uses_camel_case_fields() {
        let msg = decode_text_frame(r#"{"type":"note-update","noteId":"n1","content":"hi"}"#).unwrap();
        let ReceivedMessage::NoteUpdate(note) = msg else {
            panic!("expected note-update");
        };
        assert_eq!(note.note_id, "n1");
        assert_eq!(note.user_id, None);

        let out = SendMessage::NoteUpdate(NoteUpdateMessage {
            user_id: Some("alice".into()),
            timestamp: Some(42),
            ..note
        });
        let json: serde_json::Value = serde_json::to_value(&out).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type":"note-update","noteId":"n1","content":"hi","userId":"alice","timestamp":42})
        );
    }

    #[test]
    fn peer_notifications_serialize_with_type_tag() {
        let joined = SendMessage::UserJoined(PeerMessage { user_id: "bob".into(), timestamp: 7 });
        assert_eq!(
            serde_json::to_string(&joined).unwrap(),
            r#"{"type":"user-joined","userId":"bob","timestamp":7}"#
        );
    }

    #[test]
    fn classifies_bad_frames() {
        assert!(matches!(decode_text_frame("not json"), Err(FrameError::Malformed(_))));
        assert!(matches!(
            decode_text_frame(r#"{"type":"sync","data":"oops"}"#),
            Err(FrameError::Malformed(_))
        ));
        assert!(matches!(
            decode_text_frame(r#"{"type":"cursor"}"#),
            Err(FrameError::UnknownType(kind)) if kind == "cursor"
        ));
        assert!(matches!(
            decode_text_frame(r#"{"type":"user-left","userId":"x","timestamp":1}"#),
            Err(FrameError::ServerOnly(_))
        ));
    }

    #[test]
    fn binary_frames_carry_a_tag_byte() {
        let frame = encode_binary_frame(BINARY_AWARENESS_TAG, &[9, 8]);
        assert_eq!(frame, vec![0x02, 9, 8]);
        assert_eq!(
            decode_binary_frame(&frame).unwrap(),
            ReceivedMessage::Awareness(AwarenessMessage { data: vec![9, 8] })
        );
        assert!(matches!(decode_binary_frame(&[]), Err(FrameError::EmptyBinary)));
        assert!(matches!(decode_binary_frame(&[0x7f, 1]), Err(FrameError::UnknownTag(0x7f))));
    }
}
