// Copyright 2026 rdvwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Monitor state machine.
//!
//! The decision logic is a pure transition function
//! `(state, classification) -> (next state, action)` so it can be unit
//! tested without a live browser. The `Machine` wrapper owns the
//! process-lifetime counters and the state value; the driver loop in
//! `monitor` executes the returned actions and applies the delay policy.
//!
//! The machine starts in `Monitoring` because a restart may land mid-flow;
//! it self-corrects to `Navigating` as soon as the entry page is
//! classified. There is no terminal state. Any (state, kind) pair not
//! covered by an explicit rule leaves the state unchanged and emits no
//! action, which the driver turns into a plain scheduler delay.

use std::time::{Duration, Instant};

use super::classifier::PageKind;

/// Backoff after an anti-bot block page.
pub const BLOCKED_BACKOFF: Duration = Duration::from_secs(30);
/// Backoff while the portal is in maintenance.
pub const MAINTENANCE_BACKOFF: Duration = Duration::from_secs(60);
/// Backoff after a generic error page.
pub const ERROR_BACKOFF: Duration = Duration::from_secs(45);
/// Backoff while the page is still rendering.
pub const LOADING_BACKOFF: Duration = Duration::from_secs(5);
/// Poll interval while waiting for the operator to solve a CAPTCHA.
pub const CAPTCHA_POLL: Duration = Duration::from_secs(1);
/// Reminder cadence once a slot has been found. Coarser than the normal
/// cadence: the goal is met, the alarm just needs to stay audible.
pub const AVAILABLE_REMINDER_EVERY: Duration = Duration::from_secs(30);

/// Where the watcher believes it is in the booking flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Initial,
    Navigating,
    CaptchaWait,
    Monitoring,
    Available,
}

impl MonitorState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Navigating => "navigating",
            Self::CaptchaWait => "captcha_wait",
            Self::Monitoring => "monitoring",
            Self::Available => "available",
        }
    }
}

/// An intention the driver loop executes. The machine itself never blocks
/// and never touches the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Sleep for a fixed backoff instead of the scheduler delay.
    Wait(Duration),
    /// Reload the current page.
    Refresh,
    /// Navigate to a URL (after a rotation, back to the entry page).
    Navigate(String),
    /// Click through the entry page toward the slot page.
    ClickAndAdvance,
    /// A CAPTCHA appeared; wake the operator. Fired once per challenge.
    AlertCaptcha,
    /// A slot opened; fire the full alarm.
    AlertAvailable,
    /// Periodic nudge while the slot page stays positive.
    AlertAvailableReminder,
    /// Replace the browser identity.
    RotateSession,
}

/// Pure transition table: current state plus the classification of the
/// page just observed. Returns the next state and at most one action.
pub fn transition(state: MonitorState, kind: PageKind) -> (MonitorState, Option<Action>) {
    use MonitorState::*;

    match kind {
        // Defense and failure pages back off without touching the flow
        // position, whatever state we are in.
        PageKind::Blocked => (state, Some(Action::Wait(BLOCKED_BACKOFF))),
        PageKind::Maintenance => (state, Some(Action::Wait(MAINTENANCE_BACKOFF))),
        PageKind::Error => (state, Some(Action::Wait(ERROR_BACKOFF))),
        PageKind::Loading => (state, Some(Action::Wait(LOADING_BACKOFF))),

        PageKind::Captcha => match state {
            // Already parked: keep polling quietly, never re-alert.
            CaptchaWait => (CaptchaWait, Some(Action::Wait(CAPTCHA_POLL))),
            Monitoring | Navigating | Initial => (CaptchaWait, Some(Action::AlertCaptcha)),
            Available => (Available, None),
        },

        // Any non-CAPTCHA page while parked means the operator solved it.
        // The wrapper resets the check counter on this edge.
        _ if state == CaptchaWait => (Monitoring, None),

        PageKind::Initial => match state {
            Available => (Available, None),
            // Optimistic: the driver reports a failed click via
            // `Machine::click_failed`, which drops back to `Initial`.
            _ => (Navigating, Some(Action::ClickAndAdvance)),
        },

        PageKind::Available => match state {
            Monitoring => (Available, Some(Action::AlertAvailable)),
            Available => (Available, Some(Action::AlertAvailableReminder)),
            _ => (state, None),
        },

        PageKind::Unavailable => match state {
            Navigating | Monitoring => (Monitoring, None),
            // Slot gone again: stand down without ceremony.
            Available => (Monitoring, None),
            _ => (state, None),
        },

        PageKind::Unknown => (state, None),
    }
}

/// Process-lifetime counters. Not persisted.
#[derive(Debug, Clone, Copy)]
pub struct SessionCounters {
    /// Observations classified since start (reset once per solved CAPTCHA).
    pub check_count: u64,
    /// Requests made by the current browser identity (drives rotation).
    pub request_count: u64,
    /// When the watcher started.
    pub start_time: Instant,
}

/// Run statistics, logged on shutdown.
#[derive(Debug, Clone)]
pub struct Stats {
    pub checks: u64,
    pub uptime: Duration,
    pub checks_per_minute: f64,
    pub state: &'static str,
}

/// The state machine plus its counters.
#[derive(Debug, Clone)]
pub struct Machine {
    state: MonitorState,
    counters: SessionCounters,
}

impl Machine {
    pub fn new() -> Self {
        Self {
            state: MonitorState::Monitoring,
            counters: SessionCounters {
                check_count: 0,
                request_count: 0,
                start_time: Instant::now(),
            },
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn counters(&self) -> &SessionCounters {
        &self.counters
    }

    /// Feed one classification through the transition table.
    pub fn observe(&mut self, kind: PageKind) -> Option<Action> {
        self.counters.check_count += 1;
        let (next, action) = transition(self.state, kind);
        if self.state == MonitorState::CaptchaWait && next == MonitorState::Monitoring {
            // Solved CAPTCHA: the count restarts so post-challenge logs
            // start from check #1.
            self.counters.check_count = 0;
        }
        self.state = next;
        action
    }

    /// The entry-page click did not land; fall back and retry next tick.
    pub fn click_failed(&mut self) {
        if self.state == MonitorState::Navigating {
            self.state = MonitorState::Initial;
        }
    }

    /// Side-effect actions to run before observing, in order. Rotation and
    /// refresh are both suspended while parked on a CAPTCHA, and the found
    /// page is never reloaded out from under the operator.
    pub fn pre_tick(&self, rotation_due: bool) -> Vec<Action> {
        use MonitorState::*;
        if matches!(self.state, CaptchaWait | Available) {
            return Vec::new();
        }
        let mut actions = vec![Action::Refresh];
        if rotation_due {
            actions.push(Action::RotateSession);
        }
        actions
    }

    /// A page request went out (navigation, refresh, or post-click load).
    pub fn record_request(&mut self) {
        self.counters.request_count += 1;
    }

    /// A rotation succeeded: new identity, back to the entry page.
    pub fn session_rotated(&mut self) {
        self.counters.request_count = 0;
        self.state = MonitorState::Initial;
    }

    /// Fixed delay override for the current state, if any. `None` means
    /// the scheduler picks the delay.
    pub fn delay_override(&self) -> Option<Duration> {
        match self.state {
            MonitorState::CaptchaWait => Some(CAPTCHA_POLL),
            MonitorState::Available => Some(AVAILABLE_REMINDER_EVERY),
            _ => None,
        }
    }

    pub fn stats(&self) -> Stats {
        let uptime = self.counters.start_time.elapsed();
        let minutes = uptime.as_secs_f64() / 60.0;
        Stats {
            checks: self.counters.check_count,
            uptime,
            checks_per_minute: if minutes > 0.0 {
                self.counters.check_count as f64 / minutes
            } else {
                0.0
            },
            state: self.state.as_str(),
        }
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a duration the way humans read uptimes: `42.0s`, `3.5m`, `1.2h`.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{secs:.1}s")
    } else if secs < 3600.0 {
        format!("{:.1}m", secs / 60.0)
    } else {
        format!("{:.1}h", secs / 3600.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use MonitorState::*;

    const ALL_STATES: [MonitorState; 5] =
        [Initial, Navigating, CaptchaWait, Monitoring, Available];

    #[test]
    fn test_backoff_kinds_never_change_state() {
        let cases = [
            (PageKind::Blocked, BLOCKED_BACKOFF),
            (PageKind::Maintenance, MAINTENANCE_BACKOFF),
            (PageKind::Error, ERROR_BACKOFF),
            (PageKind::Loading, LOADING_BACKOFF),
        ];
        for state in ALL_STATES {
            for (kind, backoff) in cases {
                let (next, action) = transition(state, kind);
                assert_eq!(next, state, "{kind:?} moved state from {state:?}");
                assert_eq!(action, Some(Action::Wait(backoff)));
            }
        }
    }

    #[test]
    fn test_blocked_while_monitoring_waits_30s_state_unchanged() {
        let (next, action) = transition(Monitoring, PageKind::Blocked);
        assert_eq!(next, Monitoring);
        assert_eq!(action, Some(Action::Wait(Duration::from_secs(30))));
    }

    #[test]
    fn test_captcha_entry_alerts_exactly_once() {
        for state in [Monitoring, Navigating, Initial] {
            let (next, action) = transition(state, PageKind::Captcha);
            assert_eq!(next, CaptchaWait);
            assert_eq!(action, Some(Action::AlertCaptcha));
        }
        // Repeated captcha while parked polls quietly, no second alert.
        let (next, action) = transition(CaptchaWait, PageKind::Captcha);
        assert_eq!(next, CaptchaWait);
        assert_eq!(action, Some(Action::Wait(CAPTCHA_POLL)));
    }

    #[test]
    fn test_captcha_while_available_is_ignored() {
        let (next, action) = transition(Available, PageKind::Captcha);
        assert_eq!(next, Available);
        assert_eq!(action, None);
    }

    #[test]
    fn test_captcha_completion_resumes_monitoring() {
        for kind in [
            PageKind::Initial,
            PageKind::Available,
            PageKind::Unavailable,
            PageKind::Unknown,
        ] {
            let (next, action) = transition(CaptchaWait, kind);
            assert_eq!(next, Monitoring, "CaptchaWait x {kind:?}");
            assert_eq!(action, None);
        }
    }

    #[test]
    fn test_post_captcha_reset_clears_check_count() {
        let mut machine = Machine::new();
        for _ in 0..7 {
            machine.observe(PageKind::Unavailable);
        }
        machine.observe(PageKind::Captcha);
        assert_eq!(machine.state(), CaptchaWait);
        assert!(machine.counters().check_count >= 8);

        machine.observe(PageKind::Unavailable);
        assert_eq!(machine.state(), Monitoring);
        assert_eq!(machine.counters().check_count, 0);

        // No earlier value leaks into subsequent counts.
        machine.observe(PageKind::Unavailable);
        assert_eq!(machine.counters().check_count, 1);
    }

    #[test]
    fn test_entry_page_triggers_click_and_advance() {
        for state in [Initial, Navigating, Monitoring] {
            let (next, action) = transition(state, PageKind::Initial);
            assert_eq!(next, Navigating);
            assert_eq!(action, Some(Action::ClickAndAdvance));
        }
        // Never while the found page is up.
        let (next, action) = transition(Available, PageKind::Initial);
        assert_eq!(next, Available);
        assert_eq!(action, None);
    }

    #[test]
    fn test_click_failure_falls_back_to_initial() {
        let mut machine = Machine::new();
        machine.observe(PageKind::Initial);
        assert_eq!(machine.state(), Navigating);
        machine.click_failed();
        assert_eq!(machine.state(), Initial);
        // Retry next tick goes through the same edge.
        assert_eq!(
            machine.observe(PageKind::Initial),
            Some(Action::ClickAndAdvance)
        );
    }

    #[test]
    fn test_availability_found_then_reminder_then_stand_down() {
        let mut machine = Machine::new();
        assert_eq!(
            machine.observe(PageKind::Available),
            Some(Action::AlertAvailable)
        );
        assert_eq!(machine.state(), Available);
        assert_eq!(
            machine.observe(PageKind::Available),
            Some(Action::AlertAvailableReminder)
        );
        assert_eq!(machine.delay_override(), Some(AVAILABLE_REMINDER_EVERY));
        assert_eq!(machine.observe(PageKind::Unavailable), None);
        assert_eq!(machine.state(), Monitoring);
    }

    #[test]
    fn test_navigating_unavailable_lands_in_monitoring() {
        let (next, action) = transition(Navigating, PageKind::Unavailable);
        assert_eq!(next, Monitoring);
        assert_eq!(action, None);
    }

    #[test]
    fn test_unknown_is_a_no_op_everywhere() {
        for state in [Initial, Navigating, Monitoring, Available] {
            let (next, action) = transition(state, PageKind::Unknown);
            assert_eq!(next, state);
            assert_eq!(action, None);
        }
    }

    #[test]
    fn test_untabulated_pairs_leave_state_unchanged() {
        for (state, kind) in [
            (Initial, PageKind::Unavailable),
            (Available, PageKind::Initial),
            (Available, PageKind::Captcha),
            (Navigating, PageKind::Available),
        ] {
            let (next, action) = transition(state, kind);
            assert_eq!(next, state, "{state:?} x {kind:?}");
            assert!(
                action.is_none() || matches!(action, Some(Action::Wait(_))),
                "{state:?} x {kind:?} produced {action:?}"
            );
        }
    }

    #[test]
    fn test_pre_tick_suspended_while_parked_on_captcha() {
        let mut machine = Machine::new();
        machine.observe(PageKind::Captcha);
        assert_eq!(machine.state(), CaptchaWait);
        // Rotation exclusion: even an overdue rotation is suppressed.
        assert!(machine.pre_tick(true).is_empty());
    }

    #[test]
    fn test_pre_tick_never_reloads_the_found_page() {
        let mut machine = Machine::new();
        machine.observe(PageKind::Available);
        assert_eq!(machine.state(), Available);
        assert!(machine.pre_tick(true).is_empty());
    }

    #[test]
    fn test_pre_tick_refresh_then_rotate() {
        let machine = Machine::new();
        assert_eq!(machine.pre_tick(false), vec![Action::Refresh]);
        assert_eq!(
            machine.pre_tick(true),
            vec![Action::Refresh, Action::RotateSession]
        );
    }

    #[test]
    fn test_rotation_resets_request_count_and_restarts_flow() {
        let mut machine = Machine::new();
        for _ in 0..10 {
            machine.record_request();
        }
        assert_eq!(machine.counters().request_count, 10);
        machine.session_rotated();
        assert_eq!(machine.counters().request_count, 0);
        assert_eq!(machine.state(), Initial);
    }

    #[test]
    fn test_delay_override_only_for_captcha_and_available() {
        let mut machine = Machine::new();
        assert_eq!(machine.delay_override(), None);
        machine.observe(PageKind::Captcha);
        assert_eq!(machine.delay_override(), Some(CAPTCHA_POLL));
        machine.observe(PageKind::Unavailable);
        assert_eq!(machine.delay_override(), None);
    }

    #[test]
    fn test_format_duration_units() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42.0s");
        assert_eq!(format_duration(Duration::from_secs(210)), "3.5m");
        assert_eq!(format_duration(Duration::from_secs(4320)), "1.2h");
    }
}
