//! IPC codec and wire protocol: MessagePack framing over the control socket.

pub mod codec;
pub mod protocol;
