//! X11 foreground source: `_NET_ACTIVE_WINDOW` → `WM_CLASS`.
//!
//! The window class is the preferred identifier. Windows without a
//! class fall back to `_NET_WM_PID` → `/proc/<pid>/comm`.

use std::sync::Arc;

use x11rb::connection::Connection;
use x11rb::protocol::xproto::{self, Atom, AtomEnum, Window};
use x11rb::rust_connection::RustConnection;

use super::{ForegroundSource, SourceError};

/// X11 implementation of [`ForegroundSource`].
pub struct X11ForegroundSource {
    conn: Arc<RustConnection>,
    root: Window,
    net_active_window: Atom,
    net_wm_pid: Atom,
}

impl X11ForegroundSource {
    /// Connect to the display named by `$DISPLAY` and intern atoms.
    pub fn connect() -> Result<Self, SourceError> {
        let (conn, screen_num) = RustConnection::connect(None)
            .map_err(|e| SourceError::Display(format!("X11 connect failed: {e}")))?;

        let root = conn.setup().roots[screen_num].root;
        let net_active_window = intern(&conn, b"_NET_ACTIVE_WINDOW")?;
        let net_wm_pid = intern(&conn, b"_NET_WM_PID")?;

        tracing::debug!(screen = screen_num, "X11 foreground source connected");

        Ok(Self {
            conn: Arc::new(conn),
            root,
            net_active_window,
            net_wm_pid,
        })
    }

    fn active_window(&self) -> Result<Option<Window>, SourceError> {
        let value = self.property_u32(self.root, self.net_active_window, AtomEnum::WINDOW)?;
        Ok(value.filter(|&w| w != 0))
    }

    /// Class part of `WM_CLASS` ("instance\0class\0"), lowercased.
    fn window_class(&self, window: Window) -> Result<Option<String>, SourceError> {
        let reply = xproto::get_property(
            &*self.conn,
            false,
            window,
            AtomEnum::WM_CLASS,
            AtomEnum::STRING,
            0,
            256,
        )
        .map_err(|e| SourceError::Display(format!("get_property WM_CLASS: {e}")))?
        .reply()
        .map_err(|e| SourceError::Display(format!("get_property reply: {e}")))?;

        Ok(parse_wm_class(&reply.value))
    }

    fn window_pid(&self, window: Window) -> Result<Option<u32>, SourceError> {
        self.property_u32(window, self.net_wm_pid, AtomEnum::CARDINAL)
    }

    fn property_u32(
        &self,
        window: Window,
        property: Atom,
        kind: AtomEnum,
    ) -> Result<Option<u32>, SourceError> {
        let reply = xproto::get_property(&*self.conn, false, window, property, kind, 0, 1)
            .map_err(|e| SourceError::Display(format!("get_property: {e}")))?
            .reply()
            .map_err(|e| SourceError::Display(format!("get_property reply: {e}")))?;

        if reply.format != 32 || reply.value.len() < 4 {
            return Ok(None);
        }

        Ok(Some(u32::from_ne_bytes([
            reply.value[0],
            reply.value[1],
            reply.value[2],
            reply.value[3],
        ])))
    }
}

impl ForegroundSource for X11ForegroundSource {
    fn current(&self) -> Result<Option<String>, SourceError> {
        let Some(window) = self.active_window()? else {
            return Ok(None);
        };

        if let Some(class) = self.window_class(window)? {
            return Ok(Some(class));
        }

        match self.window_pid(window)? {
            Some(pid) => process_name(pid),
            None => Ok(None),
        }
    }
}

fn intern(conn: &RustConnection, name: &[u8]) -> Result<Atom, SourceError> {
    Ok(xproto::intern_atom(conn, false, name)
        .map_err(|e| SourceError::Display(format!("intern_atom: {e}")))?
        .reply()
        .map_err(|e| SourceError::Display(format!("intern_atom reply: {e}")))?
        .atom)
}

/// Parse a raw `WM_CLASS` value. Prefers the class over the instance.
fn parse_wm_class(raw: &[u8]) -> Option<String> {
    let mut parts = raw
        .split(|&b| b == 0)
        .map(|p| String::from_utf8_lossy(p).trim().to_lowercase())
        .filter(|p| !p.is_empty());
    let instance = parts.next();
    parts.next().or(instance)
}

/// Read `/proc/<pid>/comm`. A vanished process is an empty answer.
fn process_name(pid: u32) -> Result<Option<String>, SourceError> {
    match std::fs::read_to_string(format!("/proc/{pid}/comm")) {
        Ok(name) => {
            let name = name.trim();
            Ok((!name.is_empty()).then(|| name.to_string()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SourceError::Process(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wm_class_prefers_class() {
        assert_eq!(
            parse_wm_class(b"Navigator\0Firefox\0"),
            Some("firefox".to_string())
        );
    }

    #[test]
    fn wm_class_falls_back_to_instance() {
        assert_eq!(parse_wm_class(b"xterm\0"), Some("xterm".to_string()));
    }

    #[test]
    fn wm_class_empty() {
        assert_eq!(parse_wm_class(b""), None);
        assert_eq!(parse_wm_class(b"\0\0"), None);
    }

    #[test]
    fn process_name_of_self() {
        let name = process_name(std::process::id()).unwrap();
        assert!(name.is_some_and(|n| !n.is_empty()));
    }

    #[test]
    fn process_name_of_missing_pid() {
        assert_eq!(process_name(u32::MAX).unwrap(), None);
    }
}
