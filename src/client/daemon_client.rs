//! Daemon client for the CLI client.
//!
//! Connects to the daemon, performs the handshake, and provides one
//! method per control operation. `watch` connects as a presenter and
//! yields the unsolicited frames the daemon pushes.

use std::path::Path;

use futures::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio_util::codec::Framed;

use crate::ipc::codec::LengthPrefixedCodec;
use crate::ipc::protocol::{Message, PROTOCOL_VERSION, Role, Status};
use crate::model::{LockStatus, ScreenPower};

use super::ClientError;

/// Payload of a successful response.
#[derive(Debug, Default)]
pub struct Reply {
    pub lock: Option<LockStatus>,
    pub matched: Option<bool>,
}

pub struct DaemonClient {
    framed: Framed<UnixStream, LengthPrefixedCodec>,
    next_id: u32,
}

impl DaemonClient {
    /// Connect to the daemon and perform the handshake.
    pub async fn connect(socket_path: &Path, role: Role) -> Result<Self, ClientError> {
        let stream = UnixStream::connect(socket_path)
            .await
            .map_err(|e| ClientError::Daemon(format!("connect failed: {e}")))?;
        let mut framed = Framed::new(stream, LengthPrefixedCodec::new());

        framed
            .send(Message::Hello {
                id: 0,
                version: PROTOCOL_VERSION,
                role,
            })
            .await
            .map_err(|e| ClientError::Daemon(format!("send hello: {e}")))?;

        match framed.next().await {
            Some(Ok(Message::HelloAck {
                status: Status::Ok, ..
            })) => {}
            Some(Ok(Message::HelloAck {
                status: Status::Error,
                error,
                ..
            })) => {
                return Err(ClientError::Daemon(format!(
                    "handshake rejected: {}",
                    error.unwrap_or_default()
                )));
            }
            other => {
                return Err(ClientError::Daemon(format!(
                    "unexpected handshake response: {other:?}"
                )));
            }
        }

        Ok(Self {
            framed,
            next_id: 1, // 0 = Hello
        })
    }

    pub async fn status(&mut self) -> Result<LockStatus, ClientError> {
        self.request("status", |id| Message::Status { id })
            .await?
            .lock
            .ok_or_else(|| ClientError::Daemon("status response without lock state".into()))
    }

    pub async fn protect(&mut self, apps: Vec<String>) -> Result<(), ClientError> {
        self.request("protected_apps", |id| Message::ProtectedApps { id, apps })
            .await
            .map(drop)
    }

    pub async fn power(&mut self, state: ScreenPower) -> Result<(), ClientError> {
        self.request("power", |id| Message::Power { id, state })
            .await
            .map(drop)
    }

    pub async fn report(&mut self, success: bool) -> Result<(), ClientError> {
        self.request("validation", |id| Message::Validation { id, success })
            .await
            .map(drop)
    }

    pub async fn set_pattern(&mut self, pattern: Vec<u8>) -> Result<(), ClientError> {
        self.request("stored_pattern", |id| Message::StoredPattern { id, pattern })
            .await
            .map(drop)
    }

    /// Submit a drawn pattern. `None` means it is held until a stored
    /// pattern is known.
    pub async fn draw_pattern(&mut self, pattern: Vec<u8>) -> Result<Option<bool>, ClientError> {
        Ok(self
            .request("drawn_pattern", |id| Message::DrawnPattern { id, pattern })
            .await?
            .matched)
    }

    pub async fn preferences(&mut self, strong_challenge: bool) -> Result<(), ClientError> {
        self.request("preferences", |id| Message::Preferences {
            id,
            strong_challenge,
        })
        .await
        .map(drop)
    }

    pub async fn permissions(&mut self, overlay: bool, usage_access: bool) -> Result<(), ClientError> {
        self.request("permissions", |id| Message::Permissions {
            id,
            overlay,
            usage_access,
        })
        .await
        .map(drop)
    }

    /// Next unsolicited frame. `None` once the daemon closed the connection.
    pub async fn next_event(&mut self) -> Result<Option<Message>, ClientError> {
        match self.framed.next().await {
            Some(Ok(msg)) => Ok(Some(msg)),
            Some(Err(e)) => Err(ClientError::Daemon(format!("receive: {e}"))),
            None => Ok(None),
        }
    }

    async fn request(
        &mut self,
        op: &str,
        build: impl FnOnce(u32) -> Message,
    ) -> Result<Reply, ClientError> {
        let id = self.next_id;
        self.next_id += 1;

        self.framed
            .send(build(id))
            .await
            .map_err(|e| ClientError::Daemon(format!("send {op}: {e}")))?;

        match self.framed.next().await {
            Some(Ok(Message::Response {
                status: Status::Ok,
                lock,
                matched,
                ..
            })) => Ok(Reply { lock, matched }),
            Some(Ok(Message::Response { error, .. })) => Err(ClientError::Daemon(format!(
                "{op} failed: {}",
                error.unwrap_or_default()
            ))),
            other => Err(ClientError::Daemon(format!(
                "unexpected {op} response: {other:?}"
            ))),
        }
    }
}
