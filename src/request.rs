use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Response};
use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::{Error, Result};

/// How a page's markup is obtained.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Plain GET, the server response is the markup.
    #[default]
    Direct,
    /// Load the page in a headless browser and read the DOM after client-side rendering.
    Rendered {
        /// Fixed pause before reading the DOM, used when `wait_for` is `None`.
        wait: Duration,
        /// Selector to wait for instead of sleeping, bounded by the render timeout.
        wait_for: Option<String>,
    },
}

#[async_trait]
pub trait Fetch: Send + Sync {
    /// Returns the markup for `url`.
    async fn fetch(&self, url: &str, mode: &FetchMode) -> Result<String>;

    /// GETs a JSON document, e.g. a source listing endpoint.
    async fn fetch_json(&self, url: &str, query: &[(&'static str, String)]) -> Result<Value>;
}

pub struct HttpFetcher {
    client: Client,
    auth_token: String,
    cookies: Option<String>,
    #[cfg(feature = "browser")]
    render_timeout: Duration,
    #[cfg(feature = "browser")]
    user_agent: String,
    #[cfg(feature = "browser")]
    delay: Duration,
    #[cfg(feature = "browser")]
    shared_browser: Option<tokio::sync::OnceCell<crate::browser::Browser>>,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            auth_token: config.auth_token.clone(),
            cookies: config.source_cookies.clone(),
            #[cfg(feature = "browser")]
            render_timeout: config.render_timeout,
            #[cfg(feature = "browser")]
            user_agent: config.user_agent.clone(),
            #[cfg(feature = "browser")]
            delay: config.delay,
            #[cfg(feature = "browser")]
            shared_browser: config.browser_per_run.then(tokio::sync::OnceCell::new),
        })
    }

    async fn fetch_direct(&self, url: &str) -> Result<String> {
        let mut req = self.client.get(url);
        if let Some(cookies) = &self.cookies {
            req = req.header(header::COOKIE, cookies);
        }
        let res = ensure_success(url, req.send().await?)?;
        Ok(res.text().await?)
    }

    #[cfg(feature = "browser")]
    async fn fetch_rendered(&self, url: &str, wait: Duration, wait_for: Option<String>) -> Result<String> {
        use crate::browser;

        let opts = browser::RenderOptions {
            wait,
            wait_for,
            timeout: self.render_timeout,
            user_agent: self.user_agent.clone(),
        };
        let url = url.to_string();

        match &self.shared_browser {
            Some(cell) => {
                let idle = browser::idle_timeout(self.render_timeout, self.delay);
                let shared = cell
                    .get_or_try_init(|| async move {
                        let launched = tokio::task::spawn_blocking(move || browser::launch(idle)).await??;
                        Ok::<_, Error>(launched)
                    })
                    .await?
                    .clone();
                tokio::task::spawn_blocking(move || browser::render_page(&shared, &url, &opts)).await?
            }
            None => tokio::task::spawn_blocking(move || browser::render_isolated(&url, &opts)).await?,
        }
    }

    #[cfg(not(feature = "browser"))]
    async fn fetch_rendered(&self, _url: &str, _wait: Duration, _wait_for: Option<String>) -> Result<String> {
        Err(Error::BrowserUnavailable)
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str, mode: &FetchMode) -> Result<String> {
        debug!(url, ?mode, "fetching page");
        match mode {
            FetchMode::Direct => self.fetch_direct(url).await,
            FetchMode::Rendered { wait, wait_for } => {
                self.fetch_rendered(url, *wait, wait_for.clone()).await
            }
        }
    }

    async fn fetch_json(&self, url: &str, query: &[(&'static str, String)]) -> Result<Value> {
        debug!(url, ?query, "fetching listing");
        let res = self
            .client
            .get(url)
            .query(query)
            .bearer_auth(&self.auth_token)
            .send()
            .await?;
        let res = ensure_success(url, res)?;
        Ok(res.json().await?)
    }
}

fn ensure_success(url: &str, res: Response) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        Ok(res)
    } else {
        Err(Error::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}
