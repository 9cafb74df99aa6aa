use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use crate::config::LockConfig;
use crate::model::ScreenPower;

#[derive(Parser)]
#[command(name = "applockd", about = "Foreground app lock daemon")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the lock daemon
    Daemon(DaemonArgs),

    /// Talk to a running daemon
    Client {
        #[command(subcommand)]
        action: ClientAction,
    },
}

/// Timing and identity options for the daemon. Durations in milliseconds.
#[derive(Args)]
pub struct DaemonArgs {
    /// Foreground sampling period
    #[arg(long, default_value_t = 2000)]
    pub sample_period_ms: u64,

    /// Per-query timeout (clamped to the sampling period)
    #[arg(long, default_value_t = 1500)]
    pub query_timeout_ms: u64,

    /// Quiet window before a foreground change is reported
    #[arg(long, default_value_t = 300)]
    pub debounce_ms: u64,

    /// Minimum spacing between reported foreground changes
    #[arg(long, default_value_t = 500)]
    pub min_emit_spacing_ms: u64,

    /// Lifetime of an unanswered challenge
    #[arg(long, default_value_t = 10_000)]
    pub session_timeout_ms: u64,

    /// Suppression window after a session expires
    #[arg(long, default_value_t = 3000)]
    pub cooldown_ms: u64,

    /// Delay before sampling resumes after screen-on
    #[arg(long, default_value_t = 1000)]
    pub settle_ms: u64,

    /// Identifier of the controlling app (never locked)
    #[arg(long, default_value = "applockd")]
    pub self_id: String,

    /// Identifier of the challenge surface (never reported)
    #[arg(long, default_value = "applockd-challenge")]
    pub challenge_surface_id: String,

    /// Extra shell/launcher identifier to ignore (repeatable)
    #[arg(long = "shell-id")]
    pub shell_ids: Vec<String>,

    /// Extra case-insensitive shell pattern to ignore (repeatable)
    #[arg(long = "shell-pattern")]
    pub shell_patterns: Vec<String>,

    /// Extra always-protected identifier (repeatable)
    #[arg(long = "pinned")]
    pub pinned_apps: Vec<String>,
}

impl DaemonArgs {
    /// Build the daemon configuration. Extra identifiers and patterns
    /// extend the built-in lists.
    pub fn into_config(self) -> LockConfig {
        let mut config = LockConfig {
            sample_period: Duration::from_millis(self.sample_period_ms),
            query_timeout: Duration::from_millis(self.query_timeout_ms),
            debounce: Duration::from_millis(self.debounce_ms),
            min_emit_spacing: Duration::from_millis(self.min_emit_spacing_ms),
            session_timeout: Duration::from_millis(self.session_timeout_ms),
            cooldown: Duration::from_millis(self.cooldown_ms),
            settle_delay: Duration::from_millis(self.settle_ms),
            self_id: self.self_id,
            challenge_surface_id: self.challenge_surface_id,
            ..LockConfig::default()
        };
        config.shell_ids.extend(self.shell_ids);
        config.shell_patterns.extend(self.shell_patterns);
        config.pinned_apps.extend(self.pinned_apps);
        config
    }
}

#[derive(Subcommand)]
pub enum ClientAction {
    /// Show the lock state
    Status,

    /// Replace the protected app set
    Protect {
        /// App identifiers; none clears the set
        apps: Vec<String>,
    },

    /// Broadcast a screen power change
    Power {
        #[arg(value_enum)]
        state: PowerState,
    },

    /// Report the outcome of the presented challenge
    Report {
        #[arg(value_enum)]
        outcome: Outcome,
    },

    /// Stored pattern and drawn attempts
    Pattern {
        #[command(subcommand)]
        action: PatternAction,
    },

    /// Update preferences
    Prefs {
        /// Always use the full-screen challenge
        #[arg(long, action = ArgAction::Set)]
        strong_challenge: bool,
    },

    /// Update permission grants
    Permissions {
        #[arg(long, action = ArgAction::Set)]
        overlay: bool,
        #[arg(long, action = ArgAction::Set)]
        usage_access: bool,
    },

    /// Attach as a presenter and print present/dismiss/notify frames
    Watch,
}

#[derive(Subcommand)]
pub enum PatternAction {
    /// Set the stored pattern, e.g. `0-1-2-5-8`
    Set { dots: String },
    /// Submit a drawn attempt, e.g. `0-1-2-5-8`
    Draw { dots: String },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum PowerState {
    On,
    Off,
}

impl From<PowerState> for ScreenPower {
    fn from(state: PowerState) -> Self {
        match state {
            PowerState::On => ScreenPower::On,
            PowerState::Off => ScreenPower::Off,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn is_success(self) -> bool {
        matches!(self, Outcome::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daemon_defaults_match_config_defaults() {
        let cli = Cli::try_parse_from(["applockd", "daemon"]).unwrap();
        let Command::Daemon(args) = cli.command else {
            panic!("expected daemon command");
        };
        let config = args.into_config();
        let defaults = LockConfig::default();
        assert_eq!(config.sample_period, defaults.sample_period);
        assert_eq!(config.session_timeout, defaults.session_timeout);
        assert_eq!(config.cooldown, defaults.cooldown);
        assert_eq!(config.settle_delay, defaults.settle_delay);
        assert_eq!(config.shell_ids, defaults.shell_ids);
    }

    #[test]
    fn daemon_extra_lists_extend_defaults() {
        let cli = Cli::try_parse_from([
            "applockd",
            "daemon",
            "--shell-id",
            "my-dock",
            "--pinned",
            "org.vault",
            "--cooldown-ms",
            "50",
        ])
        .unwrap();
        let Command::Daemon(args) = cli.command else {
            panic!("expected daemon command");
        };
        let config = args.into_config();
        assert!(config.shell_ids.iter().any(|s| s == "my-dock"));
        assert!(config.shell_ids.len() > 1);
        assert!(config.pinned_apps.iter().any(|s| s == "org.vault"));
        assert_eq!(config.cooldown, Duration::from_millis(50));
    }

    #[test]
    fn client_permissions_take_explicit_bools() {
        let cli = Cli::try_parse_from([
            "applockd",
            "client",
            "permissions",
            "--overlay",
            "false",
            "--usage-access",
            "true",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Client {
                action: ClientAction::Permissions {
                    overlay: false,
                    usage_access: true
                }
            }
        ));
    }

    #[test]
    fn client_power_parses_state() {
        let cli = Cli::try_parse_from(["applockd", "client", "power", "off"]).unwrap();
        match cli.command {
            Command::Client {
                action: ClientAction::Power { state },
            } => assert_eq!(ScreenPower::from(state), ScreenPower::Off),
            _ => panic!("expected power action"),
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
