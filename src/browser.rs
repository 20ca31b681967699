//! Headless Chrome rendering for pages that build their content client-side.
//!
//! Everything here blocks, callers run it on the blocking pool. The Chrome
//! process lives as long as its [`Browser`] handle and each page is read from
//! a tab that is closed when its guard drops, so neither outlives the fetch
//! on any exit path.

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use headless_chrome::util::Timeout;
use headless_chrome::{LaunchOptions, Tab};
use tracing::{debug, warn};

pub(crate) use headless_chrome::Browser;

use crate::{Error, Result};

pub(crate) struct RenderOptions {
    pub wait: Duration,
    pub wait_for: Option<String>,
    pub timeout: Duration,
    pub user_agent: String,
}

/// Slack on top of the expected quiet time before Chrome's idle reaper kicks in.
const IDLE_MARGIN: Duration = Duration::from_secs(30);

/// How long a browser may sit without events: one render plus the pause
/// before the next item, for browsers kept across a whole run.
pub(crate) fn idle_timeout(render_timeout: Duration, delay: Duration) -> Duration {
    render_timeout
        .saturating_add(delay)
        .saturating_add(IDLE_MARGIN)
}

/// Starts a headless Chrome. Dropping the last handle kills the process.
pub(crate) fn launch(idle: Duration) -> Result<Browser> {
    let args = [
        OsStr::new("--no-sandbox"),
        OsStr::new("--disable-dev-shm-usage"),
        OsStr::new("--disable-extensions"),
        OsStr::new("--no-first-run"),
    ];
    let options = LaunchOptions::default_builder()
        .headless(true)
        .sandbox(false)
        .idle_browser_timeout(idle)
        .args(args.to_vec())
        .build()
        .map_err(|e| Error::Browser(e.to_string()))?;

    debug!("launching headless browser");
    Browser::new(options).map_err(|e| Error::Browser(e.to_string()))
}

/// Renders `url` in a browser started for this call alone.
pub(crate) fn render_isolated(url: &str, opts: &RenderOptions) -> Result<String> {
    let browser = launch(idle_timeout(opts.timeout, Duration::ZERO))?;
    render_page(&browser, url, opts)
}

/// Renders `url` in a fresh tab of an already running browser.
pub(crate) fn render_page(browser: &Browser, url: &str, opts: &RenderOptions) -> Result<String> {
    let tab = TabGuard(browser.new_tab().map_err(|e| Error::Browser(e.to_string()))?);
    tab.0.set_default_timeout(opts.timeout);
    tab.0
        .set_user_agent(&opts.user_agent, None, None)
        .map_err(|e| Error::Browser(e.to_string()))?;

    tab.0
        .navigate_to(url)
        .and_then(|t| t.wait_until_navigated())
        .map_err(|e| render_error(&*e, opts.timeout))?;

    match &opts.wait_for {
        Some(selector) => {
            tab.0
                .wait_for_element_with_custom_timeout(selector, opts.timeout)
                .map_err(|e| render_error(&*e, opts.timeout))?;
        }
        None => std::thread::sleep(opts.wait),
    }

    tab.0.get_content().map_err(|e| Error::Browser(e.to_string()))
}

/// Only a wait that ran out is a render timeout, anything else (DNS,
/// refused connection, crashed tab) is reported as it is.
fn render_error(e: &(dyn std::error::Error + Send + Sync + 'static), timeout: Duration) -> Error {
    if e.is::<Timeout>() {
        Error::RenderTimeout(timeout.as_secs())
    } else {
        Error::Browser(e.to_string())
    }
}

struct TabGuard(Arc<Tab>);

impl Drop for TabGuard {
    fn drop(&mut self) {
        if let Err(e) = self.0.close(true) {
            warn!("couldn't close browser tab: {e}");
        }
    }
}
