//! Browser-backed feed driving a live page through chromiumoxide.

use crate::extract::RawItem;
use crate::feed::Feed;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// Pause between the backward and forward half of a nudge.
const NUDGE_PAUSE: Duration = Duration::from_millis(200);

/// How often `await_ready` re-probes for the feed container.
const READY_POLL: Duration = Duration::from_millis(250);

/// CSS selectors locating feed rows and their text fields. The defaults
/// match the ASN transaction overview markup the tool was built against;
/// other hosts can supply their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSelectors {
    /// One rendered row.
    pub item: String,
    /// The group element enclosing rows that share a date header.
    pub group: String,
    /// Date header, resolved against the enclosing group.
    pub date: String,
    /// Description text, resolved within the row.
    pub description: String,
    /// Amount text, resolved within the row.
    pub amount: String,
}

impl Default for FeedSelectors {
    fn default() -> Self {
        Self {
            item: r#"[data-testid="transaction-item"]"#.to_string(),
            group: ".ap-transaction-overview".to_string(),
            date: r#"[data-bb="ap-transaction-overview__date"]"#.to_string(),
            description: r#"[data-testid="title"]"#.to_string(),
            amount: r#"[data-testid="display-value"]"#.to_string(),
        }
    }
}

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. DREDGE_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("DREDGE_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.dredge/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".dredge/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".dredge/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".dredge/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".dredge/chromium/chrome-linux64/chrome"),
                home.join(".dredge/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Collect the rendered rows as raw text triples. The date header lives on
/// the enclosing group, not the row itself.
const SNAPSHOT_JS: &str = r#"
(function() {
    var rows = [];
    document.querySelectorAll(__ITEM__).forEach(function(item) {
        var group = item.closest(__GROUP__);
        var dateEl = group ? group.querySelector(__DATE__) : null;
        var titleEl = item.querySelector(__TITLE__);
        var amountEl = item.querySelector(__AMOUNT__);
        rows.push({
            date: dateEl ? dateEl.textContent.trim() : null,
            description: titleEl ? titleEl.textContent.trim() : null,
            amount: amountEl ? amountEl.textContent.trim() : null
        });
    });
    return rows;
})()
"#;

/// Ancestor walk for the scrollable element hosting the rows. Re-resolved
/// on every call: single-page hosts replace the node on re-render, and a
/// cached reference would observe a detached subtree.
const FIND_CONTAINER_JS: &str = r#"
    function findScrollContainer() {
        var sample = document.querySelector(__ITEM__);
        if (!sample) return window;
        var el = sample.parentElement;
        while (el && el !== document.body) {
            var style = window.getComputedStyle(el);
            if (style.overflowY === 'auto' || style.overflowY === 'scroll') return el;
            el = el.parentElement;
        }
        return window;
    }
"#;

const ADVANCE_JS: &str = r#"
(function() {
    __FIND_CONTAINER__
    var c = findScrollContainer();
    if (c === window) {
        window.scrollTo(0, document.body.scrollHeight || document.documentElement.scrollHeight);
    } else {
        c.scrollTop = c.scrollHeight;
    }
    return true;
})()
"#;

const NUDGE_BACK_JS: &str = r#"
(function() {
    __FIND_CONTAINER__
    var c = findScrollContainer();
    if (c === window) {
        window.scrollBy(0, -60);
    } else {
        c.scrollTop = Math.max(0, c.scrollTop - 60);
    }
    return true;
})()
"#;

const NUDGE_FORWARD_JS: &str = r#"
(function() {
    __FIND_CONTAINER__
    var c = findScrollContainer();
    if (c === window) {
        window.scrollBy(0, 120);
    } else {
        c.scrollTop = c.scrollHeight;
    }
    return true;
})()
"#;

/// Resolve `true` on the first mutation batch under the scroll container,
/// `false` once the in-page deadline passes. The observer is disconnected
/// on both paths.
const OBSERVE_JS: &str = r#"
(function() {
    __FIND_CONTAINER__
    var c = findScrollContainer();
    var target = (c === window) ? document.body : c;
    return new Promise(function(resolve) {
        var resolved = false;
        var observer = new MutationObserver(function(mutations) {
            if (mutations && mutations.length > 0 && !resolved) {
                resolved = true;
                observer.disconnect();
                resolve(true);
            }
        });
        try {
            observer.observe(target, { childList: true, subtree: true, characterData: true });
        } catch (e) { }
        setTimeout(function() {
            if (!resolved) {
                resolved = true;
                observer.disconnect();
                resolve(false);
            }
        }, __TIMEOUT_MS__);
    });
})()
"#;

fn js_string(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

fn render_script(template: &str, selectors: &FeedSelectors) -> String {
    template
        .replace("__FIND_CONTAINER__", FIND_CONTAINER_JS)
        .replace("__ITEM__", &js_string(&selectors.item))
        .replace("__GROUP__", &js_string(&selectors.group))
        .replace("__DATE__", &js_string(&selectors.date))
        .replace("__TITLE__", &js_string(&selectors.description))
        .replace("__AMOUNT__", &js_string(&selectors.amount))
}

/// Feed over a real page in a launched Chromium instance.
pub struct ChromiumFeed {
    browser: Browser,
    page: Page,
    selectors: FeedSelectors,
    url: String,
}

impl ChromiumFeed {
    /// Launch Chromium and navigate to `url`. The feed is not usable until
    /// [`await_ready`](Self::await_ready) has seen the row markup; hosts
    /// behind a login render it only after the user signs in.
    pub async fn open(url: &str, selectors: FeedSelectors, headless: bool) -> Result<Self> {
        let chrome_path = find_chromium().context(
            "Chromium not found. Set DREDGE_CHROMIUM_PATH or install google-chrome.",
        )?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking");
        if headless {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        // Spawn the handler task
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = browser
            .new_page(url)
            .await
            .context("failed to open feed page")?;
        let _ = page.wait_for_navigation().await;

        Ok(Self {
            browser,
            page,
            selectors,
            url: url.to_string(),
        })
    }

    /// Poll until at least one feed row is rendered, or `timeout` passes.
    pub async fn await_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.rows_present().await {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                bail!(
                    "no feed rows matching {:?} appeared on {} within {}s",
                    self.selectors.item,
                    self.url,
                    timeout.as_secs()
                );
            }
            tokio::time::sleep(READY_POLL).await;
        }
    }

    async fn rows_present(&self) -> bool {
        let probe = format!(
            "document.querySelector({}) !== null",
            js_string(&self.selectors.item)
        );
        match self.page.evaluate(probe).await {
            Ok(value) => value.into_value::<bool>().unwrap_or(false),
            Err(e) => {
                debug!("row probe failed: {e}");
                false
            }
        }
    }

    fn script(&self, template: &str) -> String {
        render_script(template, &self.selectors)
    }

    /// Close the page and shut the browser down.
    pub async fn close(self) -> Result<()> {
        let ChromiumFeed {
            mut browser, page, ..
        } = self;
        let _ = page.close().await;
        let _ = browser.close().await;
        Ok(())
    }
}

#[async_trait]
impl Feed for ChromiumFeed {
    fn describe(&self) -> String {
        format!("chromium({})", self.url)
    }

    async fn snapshot(&mut self) -> Result<Vec<RawItem>> {
        let value = self
            .page
            .evaluate(self.script(SNAPSHOT_JS))
            .await
            .context("snapshot script failed")?;
        value
            .into_value()
            .map_err(|e| anyhow::anyhow!("unexpected snapshot payload: {e:?}"))
    }

    async fn request_more(&mut self) -> Result<()> {
        self.page
            .evaluate(self.script(ADVANCE_JS))
            .await
            .context("scroll to bottom failed")?;
        Ok(())
    }

    async fn nudge(&mut self) -> Result<()> {
        self.page
            .evaluate(self.script(NUDGE_BACK_JS))
            .await
            .context("backward nudge failed")?;
        tokio::time::sleep(NUDGE_PAUSE).await;
        self.page
            .evaluate(self.script(NUDGE_FORWARD_JS))
            .await
            .context("forward nudge failed")?;
        Ok(())
    }

    async fn await_change(&mut self, timeout: Duration) -> Result<bool> {
        let script = self
            .script(OBSERVE_JS)
            .replace("__TIMEOUT_MS__", &timeout.as_millis().to_string());
        // The in-page timer is authoritative; the outer deadline only
        // covers a wedged evaluate call.
        let grace = timeout + Duration::from_secs(1);
        match tokio::time::timeout(grace, self.page.evaluate(script)).await {
            Ok(Ok(value)) => Ok(value.into_value::<bool>().unwrap_or(false)),
            Ok(Err(e)) => {
                warn!("mutation wait failed: {e}");
                Ok(false)
            }
            Err(_) => {
                warn!("mutation wait exceeded its in-page deadline");
                Ok(false)
            }
        }
    }
}
