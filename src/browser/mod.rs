// Copyright 2026 rdvwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Browser session abstraction.
//!
//! Defines the `BrowserSession` trait the monitoring loop drives
//! (currently Chromium via chromiumoxide). The loop owns its session
//! exclusively; every operation returns a typed `SessionError` so the
//! state machine can pick a per-kind recovery instead of a catch-all.

pub mod chromium;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors a browser session operation can produce.
///
/// Only `Launch` at startup is fatal to the watcher; everything else is
/// "skip this tick, retry on the next one".
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to launch browser: {0}")]
    Launch(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("script evaluation failed: {0}")]
    Evaluation(String),
    #[error("session rotation failed: {0}")]
    Rotation(String),
}

/// Immutable snapshot of the current page.
///
/// `dom_text` is a simplified visible-text capture. Interactive elements
/// are emitted as `link: ...` / `button: ...` lines so the classifier can
/// report availability details without another round-trip to the browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageObservation {
    pub url: String,
    pub title: String,
    pub dom_text: String,
}

/// A live browser session owned by the monitoring loop.
#[async_trait]
pub trait BrowserSession: Send {
    /// Navigate to a URL. An elapsed page load timeout is not an error.
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError>;

    /// Reload the current page.
    async fn refresh(&mut self) -> Result<(), SessionError>;

    /// Snapshot the current page.
    async fn observe(&mut self) -> Result<PageObservation, SessionError>;

    /// Best-effort click on the first visible link or button whose text
    /// contains one of `keywords`. Returns `false` when nothing matched.
    async fn click(&mut self, keywords: &[&str]) -> Result<bool, SessionError>;

    /// Replace the browser identity: fresh process, next user agent from
    /// the pool, empty cookie jar. The caller re-navigates afterwards.
    async fn rotate(&mut self) -> Result<(), SessionError>;

    /// Set the page load timeout applied by `navigate` and `refresh`.
    fn set_page_load_timeout(&mut self, secs: u64);

    /// Tear the session down. Called exactly once, on loop exit.
    async fn close(self: Box<Self>) -> Result<(), SessionError>;
}
