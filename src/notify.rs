// Copyright 2026 rdvwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Desktop notification and sound sinks.
//!
//! Everything here is fire-and-forget: alerts are spawned as subprocesses
//! and failures are logged at debug, never propagated. A missing
//! notifier tool must not take the watcher down.

use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::debug;

/// What a sound is announcing. Picks the tone per platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundCategory {
    Availability,
    Captcha,
    Default,
}

/// Outbound alert channel for the monitoring loop.
pub trait NotificationSink: Send + Sync {
    /// Play a sound `times` times. Non-blocking.
    fn play_sound(&self, times: u32, category: SoundCategory);
    /// Show a desktop notification. Non-blocking.
    fn show_notification(&self, title: &str, body: &str);
}

/// Subprocess-backed sink: `afplay`/`osascript` on macOS,
/// `paplay`/`notify-send` on Linux.
pub struct DesktopNotifier;

impl NotificationSink for DesktopNotifier {
    fn play_sound(&self, times: u32, category: SoundCategory) {
        // Repeats need gaps between them, so push the work onto a thread.
        std::thread::spawn(move || {
            for i in 0..times {
                run_quiet(sound_command(category));
                if i + 1 < times {
                    std::thread::sleep(Duration::from_millis(300));
                }
            }
        });
    }

    fn show_notification(&self, title: &str, body: &str) {
        let cmd = if cfg!(target_os = "macos") {
            let script = format!(
                "display notification \"{}\" with title \"{}\"",
                body.replace('"', "'"),
                title.replace('"', "'")
            );
            ("osascript", vec!["-e".to_string(), script])
        } else {
            (
                "notify-send",
                vec![title.to_string(), body.to_string()],
            )
        };
        spawn_quiet(cmd);
    }
}

fn sound_command(category: SoundCategory) -> (&'static str, Vec<String>) {
    if cfg!(target_os = "macos") {
        let file = match category {
            SoundCategory::Availability => "/System/Library/Sounds/Glass.aiff",
            SoundCategory::Captcha => "/System/Library/Sounds/Sosumi.aiff",
            SoundCategory::Default => "/System/Library/Sounds/Ping.aiff",
        };
        ("afplay", vec![file.to_string()])
    } else {
        let file = match category {
            SoundCategory::Availability => "/usr/share/sounds/freedesktop/stereo/complete.oga",
            SoundCategory::Captcha => "/usr/share/sounds/freedesktop/stereo/dialog-warning.oga",
            SoundCategory::Default => "/usr/share/sounds/freedesktop/stereo/bell.oga",
        };
        ("paplay", vec![file.to_string()])
    }
}

/// Run a command and wait, swallowing all output. Used for sounds so the
/// repeat gap starts when playback ends.
fn run_quiet((program, args): (&str, Vec<String>)) {
    let result = Command::new(program)
        .args(&args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if let Err(e) = result {
        debug!("could not run {program}: {e}");
    }
}

/// Spawn a command without waiting.
fn spawn_quiet((program, args): (&str, Vec<String>)) {
    let result = Command::new(program)
        .args(&args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();
    if let Err(e) = result {
        debug!("could not spawn {program}: {e}");
    }
}

/// Sink that drops everything. Used by tests and `--silent` runs.
pub struct NullSink;

impl NotificationSink for NullSink {
    fn play_sound(&self, _times: u32, _category: SoundCategory) {}
    fn show_notification(&self, _title: &str, _body: &str) {}
}
