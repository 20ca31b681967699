//! The built-in scrapers, selectable by name on the command line.

use std::time::Duration;

use clap::ValueEnum;

use crate::config::Config;
use crate::process::{ListingSource, PageSource, SourceDescriptor};
use crate::request::FetchMode;
use crate::selector::{FieldSpec, KeyedMap, SelectorMap};
use crate::Result;

pub const DEFAULT_DETAIL_URL: &str = "https://www.screener.in/company/{symbol}/";
pub const DEFAULT_POST_API: &str = "http://localhost:3000/api/admin/stock-details/{symbol}/ratios";
pub const DEFAULT_DYNAMIC_URL: &str = "https://example.com/dynamic_page";
pub const DEFAULT_ROWS_URL: &str = "https://another.com/data";

const DYNAMIC_RENDER_WAIT: Duration = Duration::from_secs(3);
const CUSTOM_RENDER_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Site {
    /// Stock listing from SOURCE_API, top ratios scraped per symbol and posted to POST_API_TEMPLATE.
    StockRatios,
    /// Client-side rendered item page at SOURCE_URL, posted to DEST_API.
    Dynamic,
    /// Static row table at SOURCE_URL, posted to DEST_API.
    Rows,
    /// Page at SOURCE_URL with the selector map from SELECTORS_FILE, posted to DEST_API.
    Custom,
}

impl Site {
    /// Describes the site's source, failing early if a setting it needs is missing.
    pub fn source(self, config: &Config) -> Result<SourceDescriptor> {
        let source = match self {
            Site::StockRatios => SourceDescriptor::Listing(ListingSource {
                url: Config::require(&config.source_api, "SOURCE_API")?.to_string(),
                query: config.listing.clone(),
                items_pointer: "/data/stocks".to_string(),
                id_field: "symbol".to_string(),
                detail_url: or_default(&config.detail_url_template, DEFAULT_DETAIL_URL),
                detail_mode: FetchMode::Direct,
                detail: KeyedMap {
                    group: "#top-ratios li.flex.flex-space-between".to_string(),
                    key: "span.name".to_string(),
                    value: FieldSpec::new("span.number").multi().numeric(),
                },
                destination: or_default(&config.post_api_template, DEFAULT_POST_API),
                envelope: Some("ratios".to_string()),
            }),
            Site::Dynamic => SourceDescriptor::Page(PageSource {
                url: or_default(&config.source_url, DEFAULT_DYNAMIC_URL),
                mode: FetchMode::Rendered {
                    wait: DYNAMIC_RENDER_WAIT,
                    wait_for: None,
                },
                selectors: SelectorMap::from_pairs([
                    ("group", ".item"),
                    ("id", ".id"),
                    ("title", ".title"),
                    ("value", ".value"),
                ])?,
                destination: Config::require(&config.dest_api, "DEST_API")?.to_string(),
            }),
            Site::Rows => SourceDescriptor::Page(PageSource {
                url: or_default(&config.source_url, DEFAULT_ROWS_URL),
                mode: FetchMode::Direct,
                selectors: SelectorMap::from_pairs([
                    ("group", ".row"),
                    ("name", ".name"),
                    ("price", ".price"),
                ])?,
                destination: Config::require(&config.dest_api, "DEST_API")?.to_string(),
            }),
            Site::Custom => {
                let path = config.selectors_file.as_ref().ok_or_else(|| {
                    crate::Error::Config("SELECTORS_FILE is not set".to_string())
                })?;
                let selectors = SelectorMap::from_json(&std::fs::read_to_string(path)?)?;
                let mode = if config.render {
                    FetchMode::Rendered {
                        wait: CUSTOM_RENDER_WAIT,
                        wait_for: Some(selectors.group.clone()),
                    }
                } else {
                    FetchMode::Direct
                };
                SourceDescriptor::Page(PageSource {
                    url: Config::require(&config.source_url, "SOURCE_URL")?.to_string(),
                    mode,
                    selectors,
                    destination: Config::require(&config.dest_api, "DEST_API")?.to_string(),
                })
            }
        };
        Ok(source)
    }
}

fn or_default(value: &Option<String>, default: &str) -> String {
    value.clone().unwrap_or_else(|| default.to_string())
}
