//! Wire protocol message types for daemon IPC.
//!
//! All messages are MessagePack-encoded maps with at minimum `type` and `id`
//! fields. Unsolicited frames (daemon → presenter) always carry `id: 0`.

use serde::{Deserialize, Serialize};

use crate::model::{ChallengeKind, LockStatus, ScreenPower};

/// All wire protocol messages.
///
/// Serialized as a tagged union on the `type` field via MessagePack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Message {
    // -- Handshake --
    #[serde(rename = "hello")]
    Hello { id: u32, version: u32, role: Role },

    #[serde(rename = "hello_ack")]
    HelloAck {
        id: u32,
        status: Status,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    // -- Persistence feed --
    /// Full replacement of the protected set.
    #[serde(rename = "protected_apps")]
    ProtectedApps { id: u32, apps: Vec<String> },

    #[serde(rename = "stored_pattern")]
    StoredPattern {
        id: u32,
        #[serde(with = "serde_bytes")]
        pattern: Vec<u8>,
    },

    #[serde(rename = "preferences")]
    Preferences { id: u32, strong_challenge: bool },

    #[serde(rename = "permissions")]
    Permissions {
        id: u32,
        overlay: bool,
        usage_access: bool,
    },

    // -- Power broadcast --
    #[serde(rename = "power")]
    Power { id: u32, state: ScreenPower },

    // -- Challenge outcomes --
    #[serde(rename = "validation")]
    Validation { id: u32, success: bool },

    #[serde(rename = "drawn_pattern")]
    DrawnPattern {
        id: u32,
        #[serde(with = "serde_bytes")]
        pattern: Vec<u8>,
    },

    // -- Query --
    #[serde(rename = "status")]
    Status { id: u32 },

    // -- Unsolicited commands (daemon → presenter) --
    #[serde(rename = "present")]
    Present {
        id: u32,
        session: String,
        app: String,
        kind: ChallengeKind,
    },

    #[serde(rename = "dismiss")]
    Dismiss { id: u32, session: String },

    #[serde(rename = "notify")]
    Notify { id: u32, permission_needed: bool },

    // -- Generic response --
    #[serde(rename = "response")]
    Response {
        id: u32,
        status: Status,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lock: Option<LockStatus>,
        /// Comparison outcome for `drawn_pattern`. Absent while the
        /// attempt is held for a stored pattern.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        matched: Option<bool>,
    },
}

/// Peer role in the handshake.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Challenge surface; receives `present` / `dismiss` / `notify`.
    Presenter,
    Client,
}

/// Response status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum payload size (1 MiB). Nothing on this wire is large.
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Minimal envelope for extracting `{type, id}` from unknown messages.
///
/// Used as a fallback when [`Message`] deserialization fails so the
/// error response can echo the request `id`.
#[derive(Debug, Deserialize)]
pub struct RawEnvelope {
    #[serde(rename = "type")]
    #[allow(dead_code)]
    pub msg_type: String,
    pub id: u32,
}

impl Message {
    /// Request id carried by any variant.
    pub fn id(&self) -> u32 {
        match self {
            Message::Hello { id, .. }
            | Message::HelloAck { id, .. }
            | Message::ProtectedApps { id, .. }
            | Message::StoredPattern { id, .. }
            | Message::Preferences { id, .. }
            | Message::Permissions { id, .. }
            | Message::Power { id, .. }
            | Message::Validation { id, .. }
            | Message::DrawnPattern { id, .. }
            | Message::Status { id }
            | Message::Present { id, .. }
            | Message::Dismiss { id, .. }
            | Message::Notify { id, .. }
            | Message::Response { id, .. } => *id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SessionPhase;

    fn round_trip(msg: &Message) -> Message {
        let encoded = rmp_serde::to_vec_named(msg).unwrap();
        rmp_serde::from_slice(&encoded).unwrap()
    }

    #[test]
    fn hello_round_trip() {
        let msg = Message::Hello {
            id: 0,
            version: PROTOCOL_VERSION,
            role: Role::Presenter,
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn hello_ack_error_round_trip() {
        let msg = Message::HelloAck {
            id: 0,
            status: Status::Error,
            error: Some("version_mismatch".into()),
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn power_uses_lowercase_state() {
        #[derive(serde::Serialize)]
        struct RawPower {
            #[serde(rename = "type")]
            msg_type: &'static str,
            id: u32,
            state: &'static str,
        }
        let encoded = rmp_serde::to_vec_named(&RawPower {
            msg_type: "power",
            id: 3,
            state: "off",
        })
        .unwrap();
        let decoded: Message = rmp_serde::from_slice(&encoded).unwrap();
        assert_eq!(
            decoded,
            Message::Power {
                id: 3,
                state: ScreenPower::Off
            }
        );
    }

    #[test]
    fn pattern_bytes_survive() {
        let msg = Message::DrawnPattern {
            id: 4,
            pattern: vec![0, 1, 2, 5, 8],
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn present_round_trip() {
        let msg = Message::Present {
            id: 0,
            session: "6f1c".into(),
            app: "org.bank".into(),
            kind: ChallengeKind::FullScreenChallenge,
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn response_with_lock_status_round_trip() {
        let msg = Message::Response {
            id: 9,
            status: Status::Ok,
            error: None,
            lock: Some(LockStatus {
                phase: SessionPhase::Pending,
                app: Some("org.bank".into()),
                session: Some("6f1c".into()),
                kind: Some(ChallengeKind::Overlay),
                protected: 3,
                sampling: true,
            }),
            matched: None,
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn bare_response_omits_optional_fields() {
        let msg = Message::Response {
            id: 1,
            status: Status::Ok,
            error: None,
            lock: None,
            matched: None,
        };
        let encoded = rmp_serde::to_vec_named(&msg).unwrap();
        let contains = |key: &[u8]| encoded.windows(key.len()).any(|w| w == key);
        assert!(!contains(b"lock"));
        assert!(!contains(b"matched"));
        assert!(!contains(b"error"));
    }

    #[test]
    fn unknown_type_falls_back_to_envelope() {
        #[derive(serde::Serialize)]
        struct Fake {
            #[serde(rename = "type")]
            msg_type: &'static str,
            id: u32,
        }
        let encoded = rmp_serde::to_vec_named(&Fake {
            msg_type: "frobnicate",
            id: 42,
        })
        .unwrap();
        assert!(rmp_serde::from_slice::<Message>(&encoded).is_err());
        let env: RawEnvelope = rmp_serde::from_slice(&encoded).unwrap();
        assert_eq!(env.id, 42);
    }

    #[test]
    fn id_accessor() {
        assert_eq!(Message::Status { id: 7 }.id(), 7);
        assert_eq!(
            Message::Notify {
                id: 0,
                permission_needed: true
            }
            .id(),
            0
        );
    }

    #[test]
    fn role_serialization() {
        let presenter = rmp_serde::to_vec_named(&Role::Presenter).unwrap();
        let decoded: Role = rmp_serde::from_slice(&presenter).unwrap();
        assert_eq!(decoded, Role::Presenter);
    }
}
