// Copyright 2026 rdvwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Chromium-based browser session using chromiumoxide.

use super::{BrowserSession, PageObservation, SessionError};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use crate::config::ChromeConfig;

/// Cap on the captured page text. Booking pages are small; anything past
/// this is noise (cookie banners, footers).
const DOM_TEXT_MAX_CHARS: usize = 20_000;

/// Settle time after a navigation or click so client-side rendering can
/// finish before the page is observed.
const SETTLE_AFTER_NAV: Duration = Duration::from_millis(1500);

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. RDVWATCH_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("RDVWATCH_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. System PATH
    for name in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 3. Common macOS location
    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// JavaScript injected into the page to produce a simplified visible-text
/// capture. Non-destructive: reads the DOM without touching layout.
///
/// Interactive elements come out as `link: ...` / `button: ...` lines;
/// leaf text nodes as plain lines. The classifier matches keywords against
/// the whole capture and parses the prefixed lines for availability details.
const CAPTURE_JS: &str = r#"
(() => {
  const SKIP = new Set(['SCRIPT','STYLE','NOSCRIPT','SVG','LINK','META']);
  const lines = [];
  const seen = new Set();

  function isVisible(el) {
    if (el.offsetParent === null && el.tagName !== 'BODY' && el.tagName !== 'HTML') return false;
    const s = getComputedStyle(el);
    return s.display !== 'none' && s.visibility !== 'hidden';
  }

  function push(line) {
    if (line && !seen.has(line)) { seen.add(line); lines.push(line); }
  }

  function walk(node, depth) {
    if (depth > 15) return;
    for (const child of node.children) {
      if (SKIP.has(child.tagName)) continue;
      if (!isVisible(child)) continue;
      const tag = child.tagName.toLowerCase();
      const text = (child.textContent || '').trim().replace(/\s+/g, ' ');
      if (tag === 'a') {
        push('link: ' + text.slice(0, 120));
      } else if (tag === 'button') {
        push('button: ' + text.slice(0, 120));
      } else if (child.children.length === 0 && text.length > 1) {
        push(text.slice(0, 200));
      }
      walk(child, depth + 1);
    }
  }

  if (document.body) walk(document.body, 0);
  return lines.join('\n');
})()
"#;

/// A single owned Chromium session.
///
/// Holds the browser process and one page. `rotate` replaces both with a
/// fresh identity (new process, next user agent, empty cookie jar).
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    chrome: ChromeConfig,
    ua_index: usize,
    page_load_timeout: Duration,
}

impl ChromiumSession {
    /// Launch a visible Chromium instance. The window stays headful so the
    /// operator can solve CAPTCHAs in it.
    pub async fn launch(chrome: ChromeConfig) -> Result<Self, SessionError> {
        let (browser, page) = launch_browser(&chrome, 0).await?;
        Ok(Self {
            browser,
            page,
            chrome,
            ua_index: 0,
            page_load_timeout: Duration::from_secs(30),
        })
    }

    async fn goto_with_timeout(&self, url: &str) -> Result<(), SessionError> {
        let result = tokio::time::timeout(self.page_load_timeout, self.page.goto(url)).await;

        match result {
            Ok(Ok(_)) => {
                let _ = tokio::time::timeout(
                    self.page_load_timeout,
                    self.page.wait_for_navigation(),
                )
                .await;
                tokio::time::sleep(SETTLE_AFTER_NAV).await;
                Ok(())
            }
            Ok(Err(e)) => Err(SessionError::Navigation(e.to_string())),
            // Slow loads are expected on this portal; classify whatever
            // rendered instead of failing the tick.
            Err(_) => {
                debug!("page load exceeded {:?}, proceeding anyway", self.page_load_timeout);
                Ok(())
            }
        }
    }

    async fn eval_string(&self, script: &str) -> Result<String, SessionError> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| SessionError::Evaluation(e.to_string()))?;
        result
            .into_value::<String>()
            .map_err(|e| SessionError::Evaluation(format!("{e:?}")))
    }

    async fn current_url(&self) -> Result<String, SessionError> {
        Ok(self
            .page
            .url()
            .await
            .map_err(|e| SessionError::Evaluation(e.to_string()))?
            .map(|u| u.to_string())
            .unwrap_or_default())
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        self.goto_with_timeout(url).await
    }

    async fn refresh(&mut self) -> Result<(), SessionError> {
        let url = self.current_url().await?;
        if url.is_empty() || url == "about:blank" {
            return Err(SessionError::Navigation("no page to refresh".into()));
        }
        self.goto_with_timeout(&url).await
    }

    async fn observe(&mut self) -> Result<PageObservation, SessionError> {
        let url = self.current_url().await?;
        let title = self.eval_string("document.title").await?;
        let mut dom_text = self.eval_string(CAPTURE_JS).await?;
        if dom_text.len() > DOM_TEXT_MAX_CHARS {
            let mut cut = DOM_TEXT_MAX_CHARS;
            while !dom_text.is_char_boundary(cut) {
                cut -= 1;
            }
            dom_text.truncate(cut);
        }
        Ok(PageObservation { url, title, dom_text })
    }

    async fn click(&mut self, keywords: &[&str]) -> Result<bool, SessionError> {
        let needles: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
        let script = format!(
            r#"
(() => {{
  const keywords = {};
  const nodes = Array.from(document.querySelectorAll('a, button'));
  for (const el of nodes) {{
    const text = (el.textContent || '').trim().toLowerCase();
    if (!text) continue;
    if (keywords.some(k => text.includes(k))) {{
      el.scrollIntoView({{ block: 'center' }});
      el.click();
      return true;
    }}
  }}
  return false;
}})()
"#,
            serde_json::to_string(&needles).unwrap_or_else(|_| "[]".into())
        );

        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| SessionError::Evaluation(e.to_string()))?;
        let clicked = result
            .into_value::<bool>()
            .map_err(|e| SessionError::Evaluation(format!("{e:?}")))?;

        if clicked {
            // The click usually triggers a navigation, but not always.
            let _ = tokio::time::timeout(
                Duration::from_secs(5),
                self.page.wait_for_navigation(),
            )
            .await;
            tokio::time::sleep(SETTLE_AFTER_NAV).await;
        }
        Ok(clicked)
    }

    async fn rotate(&mut self) -> Result<(), SessionError> {
        let next_index = if self.chrome.user_agents.is_empty() {
            0
        } else {
            (self.ua_index + 1) % self.chrome.user_agents.len()
        };

        // Bring the replacement up before tearing the old identity down so
        // a failed launch leaves the current session usable.
        let (browser, page) = launch_browser(&self.chrome, next_index)
            .await
            .map_err(|e| SessionError::Rotation(e.to_string()))?;

        let old_page = std::mem::replace(&mut self.page, page);
        let mut old_browser = std::mem::replace(&mut self.browser, browser);
        self.ua_index = next_index;

        let _ = old_page.close().await;
        let _ = old_browser.close().await;
        let _ = old_browser.wait().await;

        debug!(ua_index = self.ua_index, "browser session rotated");
        Ok(())
    }

    fn set_page_load_timeout(&mut self, secs: u64) {
        self.page_load_timeout = Duration::from_secs(secs);
    }

    async fn close(self: Box<Self>) -> Result<(), SessionError> {
        let mut browser = self.browser;
        let _ = self.page.close().await;
        let _ = browser.close().await;
        let _ = browser.wait().await;
        Ok(())
    }
}

/// Launch one Chromium process and open a blank page in it.
async fn launch_browser(
    chrome: &ChromeConfig,
    ua_index: usize,
) -> Result<(Browser, Page), SessionError> {
    let chrome_path = find_chromium().ok_or_else(|| {
        SessionError::Launch("Chromium not found; run `rdvwatch doctor` for hints".into())
    })?;

    let mut builder = BrowserConfig::builder()
        .chrome_executable(chrome_path)
        // Headful on purpose: the operator solves CAPTCHAs in this window.
        .with_head()
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-infobars")
        .arg(format!("--window-size={}", chrome.window_size));

    if chrome.disable_images {
        builder = builder.arg("--blink-settings=imagesEnabled=false");
    }
    if let Some(ua) = chrome.user_agents.get(ua_index) {
        builder = builder.arg(format!("--user-agent={ua}"));
    }

    let config = builder
        .build()
        .map_err(|e| SessionError::Launch(format!("failed to build browser config: {e}")))?;

    let (browser, mut handler) = Browser::launch(config)
        .await
        .map_err(|e| SessionError::Launch(e.to_string()))?;

    // Drive the CDP event stream; it ends when the browser goes away.
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            let _ = event;
        }
    });

    let page = browser
        .new_page("about:blank")
        .await
        .map_err(|e| SessionError::Launch(format!("failed to create page: {e}")))?;

    Ok((browser, page))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_launch_observe_and_click() {
        let mut session = ChromiumSession::launch(ChromeConfig::default())
            .await
            .expect("failed to launch session");
        session.set_page_load_timeout(10);

        session
            .navigate("data:text/html,<h1>Bonjour</h1><button>Prendre un rendez-vous</button>")
            .await
            .expect("navigation failed");

        let obs = session.observe().await.expect("observe failed");
        assert!(obs.dom_text.contains("Bonjour"));
        assert!(obs.dom_text.contains("button: Prendre un rendez-vous"));

        let clicked = session
            .click(&["prendre un rendez-vous"])
            .await
            .expect("click failed");
        assert!(clicked);

        let missed = session.click(&["no such text"]).await.expect("click failed");
        assert!(!missed);

        Box::new(session).close().await.expect("close failed");
    }
}
