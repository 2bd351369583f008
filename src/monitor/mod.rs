// Copyright 2026 rdvwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! The monitoring loop: observe, classify, decide, act, wait.
//!
//! One tick runs fully before the next begins. The loop owns its browser
//! session exclusively and is the only place side effects happen; the
//! decision logic lives in the pure transition table in [`state`].
//! Cancellation is cooperative: the shutdown `Notify` is raced against
//! each tick, and the session is torn down exactly once on the way out.

pub mod classifier;
pub mod heuristic;
pub mod scheduler;
pub mod state;

pub use classifier::{classify, AvailabilityDetails, PageClassification, PageKind};
pub use scheduler::Scheduler;
pub use state::{format_duration, Action, Machine, MonitorState, Stats};

use std::hash::Hasher;
use std::sync::Arc;

use anyhow::Result;
use fnv::FnvHasher;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::browser::{BrowserSession, PageObservation};
use crate::config::Config;
use crate::notify::{NotificationSink, SoundCategory};

/// Texts the entry-page click looks for, most specific first.
const CLICK_KEYWORDS: &[&str] = &[
    "prendre un rendez-vous",
    "prendre rendez-vous",
    "prendre un rdv",
    "prendre rdv",
    "rendez-vous",
    "rdv",
];

/// The monitoring loop and everything it owns.
pub struct Monitor {
    session: Box<dyn BrowserSession>,
    machine: Machine,
    scheduler: Scheduler,
    sink: Arc<dyn NotificationSink>,
    config: Config,
    shutdown: Arc<Notify>,
    last_fingerprint: Option<u64>,
}

impl Monitor {
    pub fn new(
        session: Box<dyn BrowserSession>,
        config: Config,
        sink: Arc<dyn NotificationSink>,
        shutdown: Arc<Notify>,
    ) -> Self {
        let scheduler = Scheduler::new(config.anti_detection.clone());
        Self {
            session,
            machine: Machine::new(),
            scheduler,
            sink,
            config,
            shutdown,
            last_fingerprint: None,
        }
    }

    /// Run until the shutdown handle fires. Only session launch failures
    /// are fatal, and those happen before this is called; every per-tick
    /// failure is logged and retried on the next cycle.
    pub async fn run(mut self) -> Result<()> {
        info!(
            url = %self.config.monitoring.url,
            base_interval_secs = self.config.anti_detection.base_interval_secs,
            random_delays = self.config.anti_detection.random_delays_enabled,
            rotation_threshold = self.config.anti_detection.rotation_request_threshold,
            "starting appointment watcher"
        );

        self.session
            .set_page_load_timeout(self.config.monitoring.page_load_timeout_secs);

        let entry = self.config.monitoring.url.clone();
        self.apply(Action::Navigate(entry)).await;

        let shutdown = Arc::clone(&self.shutdown);
        loop {
            tokio::select! {
                _ = shutdown.notified() => break,
                _ = self.tick() => {}
            }
        }

        let stats = self.machine.stats();
        info!(
            checks = stats.checks,
            uptime = %format_duration(stats.uptime),
            checks_per_minute = format!("{:.1}", stats.checks_per_minute),
            state = stats.state,
            "watcher stopped"
        );

        let Monitor { session, .. } = self;
        session
            .close()
            .await
            .map_err(|e| anyhow::anyhow!("session teardown failed: {e}"))?;
        Ok(())
    }

    /// One full cycle: pre-tick side effects, observe, classify, act, wait.
    async fn tick(&mut self) {
        let rotation_due = self
            .scheduler
            .should_rotate(self.machine.counters().request_count);

        for action in self.machine.pre_tick(rotation_due) {
            if !self.apply(action).await {
                // Aborted tick: no state change, retry after a normal delay.
                tokio::time::sleep(self.scheduler.next_delay()).await;
                return;
            }
        }

        let obs = match self.session.observe().await {
            Ok(obs) => obs,
            Err(e) => {
                warn!("observation failed: {e}; skipping tick");
                tokio::time::sleep(self.scheduler.next_delay()).await;
                return;
            }
        };

        let classification = classify(&obs);
        self.log_observation(&obs, &classification);

        match self.machine.observe(classification.kind) {
            Some(Action::Wait(backoff)) => {
                debug!(backoff_secs = backoff.as_secs(), "backing off");
                tokio::time::sleep(backoff).await;
                return;
            }
            Some(action) => {
                if action == Action::AlertAvailable {
                    self.log_availability(&classification);
                }
                self.apply(action).await;
            }
            None => {}
        }

        let delay = self
            .machine
            .delay_override()
            .unwrap_or_else(|| self.scheduler.next_delay());
        tokio::time::sleep(delay).await;
    }

    /// Execute one action. Returns `false` when the tick should abort.
    async fn apply(&mut self, action: Action) -> bool {
        match action {
            Action::Wait(d) => {
                tokio::time::sleep(d).await;
                true
            }
            // A refresh can fail when the page never loaded (a startup
            // navigation that errored leaves the session blank). Falling
            // back to the entry page keeps the loop from spinning on a
            // session with nothing to reload.
            Action::Refresh => match self.session.refresh().await {
                Ok(()) => {
                    self.machine.record_request();
                    true
                }
                Err(e) => {
                    warn!("refresh failed: {e}; loading the entry page instead");
                    match self.session.navigate(&self.config.monitoring.url).await {
                        Ok(()) => {
                            self.machine.record_request();
                            true
                        }
                        Err(e) => {
                            warn!("entry page load failed: {e}");
                            false
                        }
                    }
                }
            },
            Action::Navigate(url) => match self.session.navigate(&url).await {
                Ok(()) => {
                    self.machine.record_request();
                    true
                }
                Err(e) => {
                    warn!("navigation to {url} failed: {e}");
                    false
                }
            },
            Action::RotateSession => match self.session.rotate().await {
                Ok(()) => {
                    info!(
                        requests_served = self.machine.counters().request_count,
                        "rotated browser session"
                    );
                    self.machine.session_rotated();
                    match self.session.navigate(&self.config.monitoring.url).await {
                        Ok(()) => {
                            self.machine.record_request();
                            true
                        }
                        Err(e) => {
                            warn!("navigation to entry page failed after rotation: {e}");
                            false
                        }
                    }
                }
                Err(e) => {
                    warn!("session rotation failed: {e}; keeping current session");
                    false
                }
            },
            Action::ClickAndAdvance => {
                match self.session.click(CLICK_KEYWORDS).await {
                    Ok(true) => {
                        info!("clicked through the entry page");
                        self.machine.record_request();
                    }
                    Ok(false) => {
                        warn!("entry button not found; retrying next tick");
                        self.machine.click_failed();
                    }
                    Err(e) => {
                        warn!("entry click failed: {e}; retrying next tick");
                        self.machine.click_failed();
                    }
                }
                true
            }
            Action::AlertCaptcha => {
                warn!("CAPTCHA detected; solve it in the browser window, polling until it clears");
                self.sink.play_sound(1, SoundCategory::Captcha);
                self.sink.show_notification(
                    "rdvwatch: CAPTCHA",
                    "Manual intervention required. Solve the captcha in the browser window.",
                );
                true
            }
            Action::AlertAvailable => {
                self.sink.play_sound(3, SoundCategory::Availability);
                self.sink.show_notification(
                    "rdvwatch: slots available!",
                    &format!(
                        "Open the browser window to book. Detected at {}.",
                        chrono::Local::now().format("%H:%M:%S")
                    ),
                );
                true
            }
            Action::AlertAvailableReminder => {
                info!("slot still looks available; reminder nudge");
                self.sink.play_sound(1, SoundCategory::Availability);
                true
            }
        }
    }

    fn log_observation(&mut self, obs: &PageObservation, classification: &PageClassification) {
        let check = self.machine.counters().check_count + 1;
        debug!(
            check,
            kind = classification.kind.as_str(),
            url = %obs.url,
            title = %obs.title,
            "page classified"
        );

        match classification.kind {
            PageKind::Blocked | PageKind::Maintenance | PageKind::Error => {
                warn!(check, "{}", classification.description);
            }
            PageKind::Unknown => {
                info!(check, url = %obs.url, title = %obs.title, "unrecognized page, no action taken");
            }
            _ => {}
        }

        // Change tracking is log-only; the fingerprint is the only thing
        // kept across ticks.
        let fp = fingerprint(&obs.dom_text);
        if self.machine.state() == MonitorState::Monitoring {
            if let Some(prev) = self.last_fingerprint {
                if prev != fp {
                    info!(check, "page content changed");
                }
            }
        }
        self.last_fingerprint = Some(fp);
    }

    fn log_availability(&self, classification: &PageClassification) {
        info!("slots available: {}", classification.description);
        if let Some(details) = &classification.availability {
            if !details.buttons.is_empty() {
                info!(buttons = details.buttons.join(", "), "booking buttons");
            }
            if !details.links.is_empty() {
                info!(links = details.links.join(", "), "booking links");
            }
        }
    }
}

/// Order-stable fingerprint of the captured page text, with digits and
/// whitespace runs dropped so clocks and counters don't register as
/// changes.
pub fn fingerprint(dom_text: &str) -> u64 {
    let mut hasher = FnvHasher::default();
    let mut last_was_space = false;
    for ch in dom_text.chars() {
        if ch.is_ascii_digit() {
            continue;
        }
        if ch.is_whitespace() {
            if !last_was_space {
                hasher.write_u8(b' ');
                last_was_space = true;
            }
            continue;
        }
        last_was_space = false;
        let mut buf = [0u8; 4];
        hasher.write(ch.to_lowercase().next().unwrap_or(ch).encode_utf8(&mut buf).as_bytes());
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_ignores_timestamps_and_spacing() {
        let a = fingerprint("Prochain créneau:  09:30\ndernière mise à jour 12:00:01");
        let b = fingerprint("Prochain créneau: 11:45 dernière mise à jour 12:00:02");
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_sees_real_content_changes() {
        let a = fingerprint("Aucun créneau disponible");
        let b = fingerprint("Choisissez votre créneau");
        assert_ne!(a, b);
    }
}
