//! Selector-driven scrapers: fetch a page, pull flat records out of it with
//! CSS selectors and POST every record to a destination API.

#[cfg(feature = "browser")]
mod browser;
pub mod config;
mod error;
pub mod forward;
mod macros;
pub mod parse;
pub mod process;
pub mod request;
pub mod selector;
pub mod sites;
#[cfg(test)]
mod test_server;

pub use error::{Error, Result};

/// One extracted record, keys in selector map order.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Reserved selector map key naming the group selector.
pub const GROUP_KEY: &str = "group";
/// Separator used for multi-valued fields.
pub const JOIN_DELIMITER: &str = " / ";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0";
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;
