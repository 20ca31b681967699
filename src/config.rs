//! Process-wide settings, read once from the environment (and `.env`).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT};

/// Default page size requested from the listing endpoint.
pub const DEFAULT_LIST_LIMIT: u32 = 100;
const DEFAULT_DELAY_SECS: f64 = 1.0;
const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 30;

/// Query sent to the source listing endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingQuery {
    pub page: u32,
    pub limit: u32,
    pub sort_by: String,
    pub sort_order: String,
    /// Optional filter flag, sent as `filter=<value>`.
    pub filter: Option<String>,
}

impl Default for ListingQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_LIST_LIMIT,
            sort_by: "symbol".to_string(),
            sort_order: "asc".to_string(),
            filter: None,
        }
    }
}

impl ListingQuery {
    pub fn as_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("page", self.page.to_string()),
            ("limit", self.limit.to_string()),
            ("sortBy", self.sort_by.clone()),
            ("sortOrder", self.sort_order.clone()),
        ];
        if let Some(filter) = &self.filter {
            pairs.push(("filter", filter.clone()));
        }
        pairs
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Bearer token sent to the destination API (and the listing endpoint).
    pub auth_token: String,

    pub source_api: Option<String>,
    pub source_url: Option<String>,
    pub detail_url_template: Option<String>,
    pub post_api_template: Option<String>,
    pub dest_api: Option<String>,

    /// Raw `Cookie` header value for sources that need a logged in session.
    pub source_cookies: Option<String>,
    pub selectors_file: Option<PathBuf>,

    pub user_agent: String,
    pub delay: Duration,
    pub request_timeout: Duration,
    pub render_timeout: Duration,
    pub render: bool,
    pub browser_per_run: bool,

    pub listing: ListingQuery,
}

impl Config {
    /// Loads `.env` if present and builds the config from the environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let auth_token = get("AUTH_TOKEN")
            .ok_or_else(|| Error::Config("AUTH_TOKEN is not set".to_string()))?;

        let delay_secs: f64 = parse_or("DELAY", get("DELAY"), DEFAULT_DELAY_SECS)?;
        let delay = Duration::try_from_secs_f64(delay_secs).map_err(|_| {
            Error::Config(format!("DELAY must be a non-negative number of seconds, got {delay_secs}"))
        })?;

        let defaults = ListingQuery::default();
        let listing = ListingQuery {
            page: parse_or("LIST_PAGE", get("LIST_PAGE"), defaults.page)?,
            limit: parse_or("LIST_LIMIT", get("LIST_LIMIT"), defaults.limit)?,
            sort_by: get("LIST_SORT_BY").unwrap_or(defaults.sort_by),
            sort_order: get("LIST_SORT_ORDER").unwrap_or(defaults.sort_order),
            filter: get("LIST_FILTER"),
        };

        Ok(Self {
            auth_token,
            source_api: get("SOURCE_API"),
            source_url: get("SOURCE_URL"),
            detail_url_template: get("DETAIL_URL_TEMPLATE"),
            post_api_template: get("POST_API_TEMPLATE"),
            dest_api: get("DEST_API"),
            source_cookies: get("SOURCE_COOKIES"),
            selectors_file: get("SELECTORS_FILE").map(PathBuf::from),
            user_agent: get("USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            delay,
            request_timeout: Duration::from_secs(parse_or(
                "REQUEST_TIMEOUT",
                get("REQUEST_TIMEOUT"),
                DEFAULT_TIMEOUT_SECS,
            )?),
            render_timeout: Duration::from_secs(parse_or(
                "RENDER_TIMEOUT",
                get("RENDER_TIMEOUT"),
                DEFAULT_RENDER_TIMEOUT_SECS,
            )?),
            render: parse_flag("RENDER", get("RENDER"))?,
            browser_per_run: parse_flag("BROWSER_PER_RUN", get("BROWSER_PER_RUN"))?,
            listing,
        })
    }

    /// Returns the value of an optional setting a scraper can't run without.
    pub fn require<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
        value
            .as_deref()
            .ok_or_else(|| Error::Config(format!("{name} is not set")))
    }
}

fn parse_or<T: FromStr>(name: &str, raw: Option<String>, default: T) -> Result<T> {
    match raw {
        Some(raw) => raw
            .parse()
            .map_err(|_| Error::Config(format!("{name} has an invalid value: {raw:?}"))),
        None => Ok(default),
    }
}

fn parse_flag(name: &str, raw: Option<String>) -> Result<bool> {
    match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("0" | "false" | "no" | "off") => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some(other) => Err(Error::Config(format!("{name} must be a boolean, got {other:?}"))),
    }
}
