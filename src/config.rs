//! Daemon configuration: timing constants and identity lists.
//!
//! Every timing value is tunable. Defaults follow the converged
//! behaviour: 2 s sampling, 300 ms debounce, 10 s session window,
//! 3 s post-expiry cooldown, 1 s settle after screen-on.

use std::time::Duration;

/// Configuration errors, reported before the daemon starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("invalid shell pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },
    #[error("own identifier must not be empty")]
    EmptySelfId,
}

/// Identifiers that are never reported as foreground changes.
pub const DEFAULT_SHELL_IDS: &[&str] = &[
    "gnome-shell",
    "plasmashell",
    "xfdesktop",
    "xfce4-panel",
    "desktop_window",
    "org.gnome.shell.extensions",
];

/// Substring heuristics for shell, launcher, and system-UI surfaces.
pub const DEFAULT_SHELL_PATTERNS: &[&str] = &["launcher", "systemui", "lockscreen"];

/// Identifiers that stay protected regardless of the persisted list.
pub const DEFAULT_PINNED_APPS: &[&str] = &["gnome-control-center", "systemsettings"];

/// Full daemon configuration.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Interval between foreground queries.
    pub sample_period: Duration,
    /// Upper bound on a single foreground query. Clamped to `sample_period`.
    pub query_timeout: Duration,
    /// Trailing debounce applied to a changed foreground identifier.
    pub debounce: Duration,
    /// Minimum spacing between two sampler emissions.
    pub min_emit_spacing: Duration,
    /// How long a pending session suppresses re-triggers for its app.
    pub session_timeout: Duration,
    /// Suppression window after a session expires unresolved.
    pub cooldown: Duration,
    /// Delay between screen-on and resumed sampling.
    pub settle_delay: Duration,
    /// Identifier of the controlling application itself.
    pub self_id: String,
    /// Identifier of the challenge-presentation surface.
    pub challenge_surface_id: String,
    /// Exact shell identifiers dropped by the sampler.
    pub shell_ids: Vec<String>,
    /// Substring patterns (regex) for shell identifiers.
    pub shell_patterns: Vec<String>,
    /// Always-protected identifiers, re-added after every replace.
    pub pinned_apps: Vec<String>,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            sample_period: Duration::from_millis(2000),
            query_timeout: Duration::from_millis(1500),
            debounce: Duration::from_millis(300),
            min_emit_spacing: Duration::from_millis(500),
            session_timeout: Duration::from_millis(10_000),
            cooldown: Duration::from_millis(3000),
            settle_delay: Duration::from_millis(1000),
            self_id: "applockd".into(),
            challenge_surface_id: "applockd-challenge".into(),
            shell_ids: DEFAULT_SHELL_IDS.iter().map(|s| s.to_string()).collect(),
            shell_patterns: DEFAULT_SHELL_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            pinned_apps: DEFAULT_PINNED_APPS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl LockConfig {
    /// Check values and normalize derived ones.
    ///
    /// The query timeout never exceeds the sample period, so a slow
    /// query cannot starve the next tick.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        if self.sample_period.is_zero() {
            return Err(ConfigError::ZeroDuration("sample period"));
        }
        if self.session_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("session timeout"));
        }
        if self.query_timeout.is_zero() || self.query_timeout > self.sample_period {
            self.query_timeout = self.sample_period;
        }
        if self.self_id.trim().is_empty() {
            return Err(ConfigError::EmptySelfId);
        }
        for pattern in &self.shell_patterns {
            regex::Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = LockConfig::default().validate().unwrap();
        assert!(config.query_timeout <= config.sample_period);
        assert_eq!(config.session_timeout, Duration::from_secs(10));
        assert_eq!(config.cooldown, Duration::from_secs(3));
    }

    #[test]
    fn query_timeout_clamped_to_period() {
        let config = LockConfig {
            sample_period: Duration::from_millis(500),
            query_timeout: Duration::from_secs(5),
            ..LockConfig::default()
        }
        .validate()
        .unwrap();
        assert_eq!(config.query_timeout, Duration::from_millis(500));
    }

    #[test]
    fn zero_period_rejected() {
        let err = LockConfig {
            sample_period: Duration::ZERO,
            ..LockConfig::default()
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, ConfigError::ZeroDuration("sample period")));
    }

    #[test]
    fn bad_pattern_rejected() {
        let err = LockConfig {
            shell_patterns: vec!["(unclosed".into()],
            ..LockConfig::default()
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }

    #[test]
    fn empty_self_id_rejected() {
        let err = LockConfig {
            self_id: "  ".into(),
            ..LockConfig::default()
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, ConfigError::EmptySelfId));
    }
}
