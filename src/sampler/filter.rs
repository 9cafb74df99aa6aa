//! Foreground filtering: noise rejection, dedupe, debounce, spacing.
//!
//! Pure logic, no I/O. [`ForegroundFilter`] decides whether a raw
//! identifier is worth reporting at all; [`Debouncer`] decides when an
//! admitted identifier is emitted.

use std::collections::HashSet;
use std::time::Duration;

use regex::Regex;
use tokio::time::Instant;

use crate::config::LockConfig;
use crate::model::{AppId, ForegroundEvent};

/// Stateless admission check for raw foreground identifiers.
#[derive(Debug)]
pub struct ForegroundFilter {
    shell_ids: HashSet<String>,
    shell_pattern: Option<Regex>,
    surface_id: String,
}

impl ForegroundFilter {
    /// Build from config. Shell patterns are joined into one
    /// case-insensitive alternation.
    pub fn new(config: &LockConfig) -> Result<Self, regex::Error> {
        let shell_pattern = if config.shell_patterns.is_empty() {
            None
        } else {
            let joined = config
                .shell_patterns
                .iter()
                .map(|p| format!("(?:{p})"))
                .collect::<Vec<_>>()
                .join("|");
            Some(Regex::new(&format!("(?i){joined}"))?)
        };

        Ok(Self {
            shell_ids: config.shell_ids.iter().cloned().collect(),
            shell_pattern,
            surface_id: config.challenge_surface_id.clone(),
        })
    }

    /// Apply the admission rules in order:
    ///
    /// 1. empty or unresolved identifiers are dropped;
    /// 2. shell identifiers (exact or by pattern) are dropped;
    /// 3. the challenge surface itself is dropped.
    pub fn admit(&self, raw: &str) -> Option<AppId> {
        let id = raw.trim();
        if id.is_empty() {
            return None;
        }
        if self.is_shell(id) {
            tracing::trace!(app = id, "shell identifier dropped");
            return None;
        }
        if id == self.surface_id {
            tracing::trace!(app = id, "challenge surface dropped");
            return None;
        }
        Some(AppId::new(id))
    }

    fn is_shell(&self, id: &str) -> bool {
        self.shell_ids.contains(id) || self.shell_pattern.as_ref().is_some_and(|re| re.is_match(id))
    }
}

/// Collapses consecutive duplicates and rate-limits emission.
///
/// A changed identifier becomes a pending candidate. It is emitted
/// once it has been the latest candidate for the debounce window and
/// at least `spacing` has passed since the previous emission. If the
/// foreground flips back to the last emitted identifier first, the
/// candidate is discarded.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    spacing: Duration,
    last_emitted: Option<AppId>,
    last_emit_at: Option<Instant>,
    pending: Option<(AppId, Instant)>,
}

impl Debouncer {
    pub fn new(window: Duration, spacing: Duration) -> Self {
        Self {
            window,
            spacing,
            last_emitted: None,
            last_emit_at: None,
            pending: None,
        }
    }

    /// Offer an admitted identifier observed at `now`.
    pub fn offer(&mut self, app: AppId, now: Instant) {
        if self.last_emitted.as_ref() == Some(&app) {
            if let Some((flicker, _)) = self.pending.take() {
                tracing::debug!(app = %flicker, "flicker absorbed");
            }
            return;
        }
        match &self.pending {
            // Same candidate seen again: keep the original observation time.
            Some((candidate, _)) if *candidate == app => {}
            _ => self.pending = Some((app, now)),
        }
    }

    /// When the pending candidate becomes eligible, if there is one.
    pub fn deadline(&self) -> Option<Instant> {
        let (_, seen_at) = self.pending.as_ref()?;
        let settled = *seen_at + self.window;
        Some(match self.last_emit_at {
            Some(at) => settled.max(at + self.spacing),
            None => settled,
        })
    }

    /// Emit the pending candidate if its deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<ForegroundEvent> {
        if self.deadline()? > now {
            return None;
        }
        let (app, observed_at) = self.pending.take()?;
        self.last_emitted = Some(app.clone());
        self.last_emit_at = Some(now);
        Some(ForegroundEvent { app, observed_at })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> ForegroundFilter {
        ForegroundFilter::new(&LockConfig::default()).unwrap()
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    // -- Admission --

    #[test]
    fn empty_identifier_dropped() {
        let f = filter();
        assert_eq!(f.admit(""), None);
        assert_eq!(f.admit("   "), None);
    }

    #[test]
    fn exact_shell_identifier_dropped() {
        assert_eq!(filter().admit("gnome-shell"), None);
    }

    #[test]
    fn shell_substring_heuristics() {
        let f = filter();
        assert_eq!(f.admit("com.android.launcher3"), None);
        assert_eq!(f.admit("com.android.systemui"), None);
        assert_eq!(f.admit("Ulauncher"), None);
    }

    #[test]
    fn challenge_surface_dropped() {
        assert_eq!(filter().admit("applockd-challenge"), None);
    }

    #[test]
    fn ordinary_app_admitted_and_trimmed() {
        assert_eq!(filter().admit(" firefox\n"), Some(AppId::from("firefox")));
    }

    #[test]
    fn own_identifier_is_not_filtered() {
        // The controlling app is a real foreground change; only the
        // challenge surface is hidden from the lock loop.
        assert_eq!(filter().admit("applockd"), Some(AppId::from("applockd")));
    }

    #[test]
    fn no_patterns_means_exact_only() {
        let config = LockConfig {
            shell_patterns: Vec::new(),
            ..LockConfig::default()
        };
        let f = ForegroundFilter::new(&config).unwrap();
        assert_eq!(f.admit("my-launcher"), Some(AppId::from("my-launcher")));
    }

    // -- Debounce --

    #[test]
    fn first_candidate_waits_for_window() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(ms(300), ms(0));
        d.offer("a".into(), t0);
        assert!(d.poll(t0 + ms(100)).is_none());
        let event = d.poll(t0 + ms(300)).unwrap();
        assert_eq!(event.app, AppId::from("a"));
        assert_eq!(event.observed_at, t0);
    }

    #[test]
    fn consecutive_duplicates_collapse() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(ms(0), ms(0));
        d.offer("a".into(), t0);
        assert!(d.poll(t0).is_some());
        d.offer("a".into(), t0 + ms(10));
        assert!(d.deadline().is_none());
        assert!(d.poll(t0 + ms(1000)).is_none());
    }

    #[test]
    fn flicker_back_to_last_emitted_is_absorbed() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(ms(300), ms(0));
        d.offer("a".into(), t0);
        d.poll(t0 + ms(300)).unwrap();

        d.offer("launcher-frame".into(), t0 + ms(400));
        d.offer("a".into(), t0 + ms(500));
        assert!(d.poll(t0 + ms(2000)).is_none());
    }

    #[test]
    fn newer_candidate_replaces_pending() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(ms(300), ms(0));
        d.offer("a".into(), t0);
        d.offer("b".into(), t0 + ms(200));
        assert!(d.poll(t0 + ms(300)).is_none());
        let event = d.poll(t0 + ms(500)).unwrap();
        assert_eq!(event.app, AppId::from("b"));
    }

    #[test]
    fn repeated_candidate_keeps_first_observation() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(ms(300), ms(0));
        d.offer("a".into(), t0);
        d.offer("a".into(), t0 + ms(200));
        assert_eq!(d.deadline(), Some(t0 + ms(300)));
    }

    #[test]
    fn spacing_delays_but_never_drops() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(ms(0), ms(1000));
        d.offer("a".into(), t0);
        d.poll(t0).unwrap();

        d.offer("b".into(), t0 + ms(100));
        assert!(d.poll(t0 + ms(500)).is_none());
        let event = d.poll(t0 + ms(1000)).unwrap();
        assert_eq!(event.app, AppId::from("b"));
    }

    #[test]
    fn emission_order_is_monotonic() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(ms(50), ms(0));
        let mut last = None;
        for (i, app) in ["a", "b", "c", "a"].into_iter().enumerate() {
            let at = t0 + ms(100 * i as u64);
            d.offer(app.into(), at);
            let event = d.poll(at + ms(50)).unwrap();
            if let Some(prev) = last {
                assert!(event.observed_at >= prev);
            }
            last = Some(event.observed_at);
        }
    }
}
