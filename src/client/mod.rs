//! CLI client for daemon operations.
//!
//! One-shot commands connect to the daemon, perform a single request,
//! print the result, and exit. `watch` stays attached as a presenter
//! and prints every pushed effect until the daemon goes away.

mod daemon_client;
mod format;

use std::path::PathBuf;

use crate::cli::{ClientAction, PatternAction};
use crate::ipc::protocol::Role;
use daemon_client::DaemonClient;

/// Client error type.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("daemon: {0}")]
    Daemon(String),
    #[error("invalid pattern: {0}")]
    Pattern(String),
}

/// Run the client command. Called from `main.rs` for `Command::Client`.
pub async fn run(action: ClientAction) -> Result<(), ClientError> {
    let socket_path = resolve_socket_path()?;

    let role = match action {
        ClientAction::Watch => Role::Presenter,
        _ => Role::Client,
    };
    let mut daemon = DaemonClient::connect(&socket_path, role).await?;

    match action {
        ClientAction::Status => {
            let status = daemon.status().await?;
            format::print_status(&status);
        }
        ClientAction::Protect { apps } => {
            let count = apps.len();
            daemon.protect(apps).await?;
            format::print_done(&format!("Protected set replaced ({count} apps)"));
        }
        ClientAction::Power { state } => {
            daemon.power(state.into()).await?;
            format::print_done("Power state sent");
        }
        ClientAction::Report { outcome } => {
            daemon.report(outcome.is_success()).await?;
            format::print_done("Validation result sent");
        }
        ClientAction::Pattern { action } => match action {
            PatternAction::Set { dots } => {
                daemon.set_pattern(parse_dots(&dots)?).await?;
                format::print_done("Stored pattern updated");
            }
            PatternAction::Draw { dots } => {
                let matched = daemon.draw_pattern(parse_dots(&dots)?).await?;
                format::print_match(matched);
            }
        },
        ClientAction::Prefs { strong_challenge } => {
            daemon.preferences(strong_challenge).await?;
            format::print_done("Preferences updated");
        }
        ClientAction::Permissions {
            overlay,
            usage_access,
        } => {
            daemon.permissions(overlay, usage_access).await?;
            format::print_done("Permissions updated");
        }
        ClientAction::Watch => watch(&mut daemon).await?,
    }

    Ok(())
}

/// Print pushed frames until the daemon closes the connection.
async fn watch(daemon: &mut DaemonClient) -> Result<(), ClientError> {
    while let Some(msg) = daemon.next_event().await? {
        if !format::print_event(&msg) {
            tracing::debug!(?msg, "ignoring unexpected frame");
        }
    }
    Ok(())
}

/// Parse a pattern written as dot indices, e.g. `0-1-2-5-8`.
///
/// Dots are numbered 0..=8 on a 3x3 grid; a dot may be used once.
fn parse_dots(input: &str) -> Result<Vec<u8>, ClientError> {
    let mut dots = Vec::new();
    for part in input.split(['-', ',']).map(str::trim) {
        let dot: u8 = part
            .parse()
            .map_err(|_| ClientError::Pattern(format!("not a dot index: {part:?}")))?;
        if dot > 8 {
            return Err(ClientError::Pattern(format!("dot {dot} out of range 0-8")));
        }
        if dots.contains(&dot) {
            return Err(ClientError::Pattern(format!("dot {dot} used twice")));
        }
        dots.push(dot);
    }
    Ok(dots)
}

/// Resolve the daemon socket path from `$XDG_RUNTIME_DIR`.
fn resolve_socket_path() -> Result<PathBuf, ClientError> {
    crate::daemon::resolve_socket_path()
        .map_err(|_| ClientError::Daemon("$XDG_RUNTIME_DIR not set".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_dots_dash_separated() {
        assert_eq!(parse_dots("0-1-2-5-8").unwrap(), vec![0, 1, 2, 5, 8]);
    }

    #[test]
    fn parse_dots_comma_separated() {
        assert_eq!(parse_dots("6, 4, 2").unwrap(), vec![6, 4, 2]);
    }

    #[test]
    fn parse_dots_out_of_range() {
        let err = parse_dots("0-9").unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn parse_dots_repeated_dot() {
        let err = parse_dots("1-2-1").unwrap_err();
        assert!(err.to_string().contains("used twice"));
    }

    #[test]
    fn parse_dots_garbage() {
        assert!(parse_dots("").is_err());
        assert!(parse_dots("a-b").is_err());
    }
}
