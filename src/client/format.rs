//! Output formatting for CLI client commands.
//!
//! Human-readable status lines on stdout. `watch` prints one line per
//! pushed frame so the output can be piped.

use crate::ipc::protocol::Message;
use crate::model::LockStatus;

/// Print the lock status block.
pub fn print_status(status: &LockStatus) {
    println!("Phase:     {}", phase_label(status));
    if let Some(app) = &status.app {
        println!("App:       {app}");
    }
    if let Some(session) = &status.session {
        println!("Session:   {session}");
    }
    if let Some(kind) = status.kind {
        println!("Challenge: {kind}");
    }
    println!("Protected: {}", status.protected);
    println!(
        "Sampling:  {}",
        if status.sampling { "running" } else { "stopped" }
    );
}

/// Print the outcome of a drawn-pattern submission.
pub fn print_match(matched: Option<bool>) {
    match matched {
        Some(true) => println!("Pattern matched"),
        Some(false) => println!("Pattern did not match"),
        None => println!("No stored pattern yet; attempt held"),
    }
}

pub fn print_done(what: &str) {
    println!("{what}");
}

/// Print one pushed frame. Returns `false` for frames `watch` does not
/// expect.
pub fn print_event(msg: &Message) -> bool {
    match event_line(msg) {
        Some(line) => {
            println!("{line}");
            true
        }
        None => false,
    }
}

fn event_line(msg: &Message) -> Option<String> {
    match msg {
        Message::Present {
            session, app, kind, ..
        } => Some(format!("present  {session} {app} ({kind})")),
        Message::Dismiss { session, .. } => Some(format!("dismiss  {session}")),
        Message::Notify {
            permission_needed, ..
        } => Some(format!(
            "notify   {}",
            if *permission_needed {
                "permission needed"
            } else {
                "permissions granted"
            }
        )),
        _ => None,
    }
}

fn phase_label(status: &LockStatus) -> String {
    format!("{:?}", status.phase).to_lowercase()
}
