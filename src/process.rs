use std::fmt;
use std::time::Duration;

use chrono::Local;
use serde_json::Value;
use tokio::task::spawn_blocking;
use tracing::{error, info, warn};

use crate::config::ListingQuery;
use crate::forward::{Forward, Outcome};
use crate::parse::{extract, extract_keyed};
use crate::request::{Fetch, FetchMode};
use crate::selector::{KeyedMap, SelectorMap};
use crate::{info_time, Record, Result};

/// Placeholder replaced with the (url-encoded) item id in url templates.
pub const ID_PLACEHOLDER: &str = "{symbol}";

/// Where the items of one run come from and where they go.
#[derive(Debug, Clone)]
pub enum SourceDescriptor {
    /// A JSON listing of item ids, one detail page per id.
    Listing(ListingSource),
    /// A single page holding all the records.
    Page(PageSource),
}

#[derive(Debug, Clone)]
pub struct ListingSource {
    pub url: String,
    pub query: ListingQuery,
    /// JSON pointer to the item array in the listing response.
    pub items_pointer: String,
    pub id_field: String,
    /// Detail page url, `{symbol}` is replaced with the item id.
    pub detail_url: String,
    pub detail_mode: FetchMode,
    pub detail: KeyedMap,
    /// Destination url, `{symbol}` is replaced with the item id.
    pub destination: String,
    /// Wraps the record as `{ envelope: record }` when set.
    pub envelope: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PageSource {
    pub url: String,
    pub mode: FetchMode,
    pub selectors: SelectorMap,
    pub destination: String,
}

/// Success/failure counters of a single run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed
    }

    fn count(&mut self, saved: bool) {
        if saved {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Completed: {} success, {} failed", self.succeeded, self.failed)
    }
}

/// Runs one source to completion.
///
/// Only the listing request can fail the run. A page source whose page can't
/// be fetched or parsed counts as one failed item. Every other failure is
/// logged and counted against the item it belongs to, and the loop carries on
/// with the next item after `delay`.
pub async fn run<F, W>(
    source: &SourceDescriptor,
    fetcher: &F,
    forwarder: &W,
    delay: Duration,
) -> Result<RunSummary>
where
    F: Fetch + ?Sized,
    W: Forward + ?Sized,
{
    let start_time = Local::now();
    info_time!("Started scraping");

    let summary = match source {
        SourceDescriptor::Listing(listing) => run_listing(listing, fetcher, forwarder, delay).await?,
        SourceDescriptor::Page(page) => run_page(page, fetcher, forwarder, delay).await?,
    };

    info_time!(start_time, "{}", summary);
    Ok(summary)
}

async fn run_listing<F, W>(
    source: &ListingSource,
    fetcher: &F,
    forwarder: &W,
    delay: Duration,
) -> Result<RunSummary>
where
    F: Fetch + ?Sized,
    W: Forward + ?Sized,
{
    let listing = fetcher.fetch_json(&source.url, &source.query.as_pairs()).await?;
    let items = listing_items(&listing, &source.items_pointer);
    info!("Total items fetched: {}", items.len());

    let mut summary = RunSummary::default();
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            tokio::time::sleep(delay).await;
        }

        let Some(id) = item_id(item, &source.id_field) else {
            error!("[ERROR] item #{} has no `{}` field", idx + 1, source.id_field);
            summary.count(false);
            continue;
        };

        let res = scrape_and_send(source, &id, fetcher, forwarder).await;
        summary.count(log_outcome(&id, res));
    }

    Ok(summary)
}

async fn scrape_and_send<F, W>(
    source: &ListingSource,
    id: &str,
    fetcher: &F,
    forwarder: &W,
) -> Result<Outcome>
where
    F: Fetch + ?Sized,
    W: Forward + ?Sized,
{
    let markup = fetcher
        .fetch(&fill_template(&source.detail_url, id), &source.detail_mode)
        .await?;

    let map = source.detail.clone();
    let record = spawn_blocking(move || extract_keyed(&markup, &map)).await??;

    let body = match &source.envelope {
        Some(key) => {
            let mut wrapped = Record::new();
            wrapped.insert(key.clone(), Value::Object(record));
            Value::Object(wrapped)
        }
        None => Value::Object(record),
    };
    Ok(forwarder
        .send(&fill_template(&source.destination, id), &body)
        .await)
}

async fn run_page<F, W>(
    source: &PageSource,
    fetcher: &F,
    forwarder: &W,
    delay: Duration,
) -> Result<RunSummary>
where
    F: Fetch + ?Sized,
    W: Forward + ?Sized,
{
    let mut summary = RunSummary::default();
    let records = match fetch_records(source, fetcher).await {
        Ok(records) => records,
        Err(e) => {
            error!("[ERROR] {}: {e}", source.url);
            summary.count(false);
            return Ok(summary);
        }
    };
    info!("Total records extracted: {}", records.len());

    for (idx, record) in records.into_iter().enumerate() {
        if idx > 0 {
            tokio::time::sleep(delay).await;
        }
        let label = format!("record #{}", idx + 1);
        let outcome = forwarder
            .send(&source.destination, &Value::Object(record))
            .await;
        summary.count(log_outcome(&label, Ok(outcome)));
    }

    Ok(summary)
}

async fn fetch_records<F>(source: &PageSource, fetcher: &F) -> Result<Vec<Record>>
where
    F: Fetch + ?Sized,
{
    let markup = fetcher.fetch(&source.url, &source.mode).await?;
    let map = source.selectors.clone();
    spawn_blocking(move || extract(&markup, &map)).await?
}

/// Logs the item's outcome with its tag and returns whether it was saved.
fn log_outcome(label: &str, res: Result<Outcome>) -> bool {
    match res {
        Ok(Outcome::Saved) => {
            info!("[SUCCESS] {label} saved");
            true
        }
        Ok(outcome) => {
            warn!("[FAILED] {label} not saved, {outcome}");
            false
        }
        Err(e) => {
            error!("[ERROR] {label}: {e}");
            false
        }
    }
}

/// Items at `pointer`; a missing or non-array value means there is nothing to do.
fn listing_items<'a>(listing: &'a Value, pointer: &str) -> &'a [Value] {
    match listing.pointer(pointer) {
        Some(Value::Array(items)) => items.as_slice(),
        Some(other) => {
            warn!("listing value at {pointer} is not an array: {other}");
            &[]
        }
        None => &[],
    }
}

fn item_id(item: &Value, field: &str) -> Option<String> {
    match item.get(field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn fill_template(template: &str, id: &str) -> String {
    template.replace(ID_PLACEHOLDER, &urlencoding::encode(id))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::selector::FieldSpec;
    use crate::Error;

    const LISTING_URL: &str = "http://src.test/api/admin/stocks";

    enum Page {
        Html(&'static str),
        Timeout,
    }

    struct FakeFetcher {
        listing: Value,
        pages: HashMap<String, Page>,
        fetched: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        fn new(listing: Value, pages: Vec<(&str, Page)>) -> Self {
            Self {
                listing,
                pages: pages.into_iter().map(|(u, p)| (u.to_string(), p)).collect(),
                fetched: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Fetch for FakeFetcher {
        async fn fetch(&self, url: &str, _mode: &FetchMode) -> Result<String> {
            self.fetched.lock().unwrap().push(url.to_string());
            match self.pages.get(url) {
                Some(Page::Html(html)) => Ok(html.to_string()),
                Some(Page::Timeout) => Err(Error::RenderTimeout(15)),
                None => Err(Error::HttpStatus {
                    url: url.to_string(),
                    status: 404,
                }),
            }
        }

        async fn fetch_json(&self, url: &str, query: &[(&'static str, String)]) -> Result<Value> {
            assert_eq!(url, LISTING_URL);
            assert!(query.contains(&("sortBy", "symbol".to_string())));
            Ok(self.listing.clone())
        }
    }

    /// Answers every POST with the status configured for its url (200 by default).
    #[derive(Default)]
    struct FakeForwarder {
        statuses: HashMap<String, u16>,
        down: bool,
        sent: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl Forward for FakeForwarder {
        async fn send(&self, url: &str, body: &Value) -> Outcome {
            self.sent.lock().unwrap().push((url.to_string(), body.clone()));
            if self.down {
                return Outcome::TransportFailed("connection refused".into());
            }
            let status = self.statuses.get(url).copied().unwrap_or(200);
            Outcome::from_response(status, String::new())
        }
    }

    const RATIOS_PAGE: &str = r#"
        <ul id="top-ratios">
          <li class="flex flex-space-between"><span class="name">P/E</span><span class="number">15.2</span></li>
        </ul>
    "#;

    fn listing_source() -> SourceDescriptor {
        SourceDescriptor::Listing(ListingSource {
            url: LISTING_URL.to_string(),
            query: ListingQuery::default(),
            items_pointer: "/data/stocks".to_string(),
            id_field: "symbol".to_string(),
            detail_url: "http://detail.test/company/{symbol}/".to_string(),
            detail_mode: FetchMode::Direct,
            detail: KeyedMap {
                group: "#top-ratios li.flex.flex-space-between".to_string(),
                key: "span.name".to_string(),
                value: FieldSpec::new("span.number").multi().numeric(),
            },
            destination: "http://dest.test/stock-details/{symbol}/ratios".to_string(),
            envelope: Some("ratios".to_string()),
        })
    }

    fn stocks(symbols: &[&str]) -> Value {
        let stocks: Vec<_> = symbols.iter().map(|s| json!({ "symbol": s })).collect();
        json!({ "data": { "stocks": stocks } })
    }

    #[tokio::test]
    async fn one_saved_one_timed_out() {
        let fetcher = FakeFetcher::new(
            stocks(&["AAA", "BBB"]),
            vec![
                ("http://detail.test/company/AAA/", Page::Html(RATIOS_PAGE)),
                ("http://detail.test/company/BBB/", Page::Timeout),
            ],
        );
        let forwarder = FakeForwarder::default();

        let summary = run(&listing_source(), &fetcher, &forwarder, Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(summary, RunSummary { succeeded: 1, failed: 1 });
        assert_eq!(summary.attempted(), 2);

        let sent = forwarder.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "http://dest.test/stock-details/AAA/ratios");
        assert_eq!(sent[0].1, json!({ "ratios": { "P/E": 15.2 } }));
    }

    #[tokio::test]
    async fn rejections_and_transport_failures_count_as_failed() {
        let pages = vec![
            ("http://detail.test/company/AAA/", Page::Html(RATIOS_PAGE)),
            ("http://detail.test/company/BBB/", Page::Html(RATIOS_PAGE)),
        ];

        let mut forwarder = FakeForwarder::default();
        forwarder
            .statuses
            .insert("http://dest.test/stock-details/BBB/ratios".to_string(), 201);
        let fetcher = FakeFetcher::new(stocks(&["AAA", "BBB"]), pages);
        let summary = run(&listing_source(), &fetcher, &forwarder, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(summary, RunSummary { succeeded: 1, failed: 1 });

        let forwarder = FakeForwarder {
            down: true,
            ..Default::default()
        };
        let fetcher = FakeFetcher::new(
            stocks(&["AAA"]),
            vec![("http://detail.test/company/AAA/", Page::Html(RATIOS_PAGE))],
        );
        let summary = run(&listing_source(), &fetcher, &forwarder, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(summary, RunSummary { succeeded: 0, failed: 1 });
    }

    #[tokio::test]
    async fn items_without_id_are_counted_and_skipped() {
        let listing = json!({ "data": { "stocks": [ { "name": "no symbol" }, { "symbol": "AAA" } ] } });
        let fetcher = FakeFetcher::new(
            listing,
            vec![("http://detail.test/company/AAA/", Page::Html(RATIOS_PAGE))],
        );
        let forwarder = FakeForwarder::default();

        let summary = run(&listing_source(), &fetcher, &forwarder, Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(summary, RunSummary { succeeded: 1, failed: 1 });
        assert_eq!(fetcher.fetched.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_or_odd_listing_runs_nothing() {
        let forwarder = FakeForwarder::default();
        for listing in [json!({}), json!({ "data": { "stocks": "nope" } })] {
            let fetcher = FakeFetcher::new(listing, vec![]);
            let summary = run(&listing_source(), &fetcher, &forwarder, Duration::ZERO)
                .await
                .unwrap();
            assert_eq!(summary, RunSummary::default());
        }
    }

    #[tokio::test]
    async fn page_source_forwards_every_record() {
        let html = r#"
            <div class="row"><span class="name">A</span><span class="price">1</span></div>
            <div class="row"><span class="name">B</span><span class="price">2</span></div>
            <div class="row"><span class="name">C</span></div>
        "#;
        let source = SourceDescriptor::Page(PageSource {
            url: "http://rows.test/data".to_string(),
            mode: FetchMode::Direct,
            selectors: SelectorMap::from_pairs([("group", ".row"), ("name", ".name"), ("price", ".price")])
                .unwrap(),
            destination: "http://dest.test/items".to_string(),
        });
        let fetcher = FakeFetcher::new(json!({}), vec![("http://rows.test/data", Page::Html(html))]);
        let forwarder = FakeForwarder::default();

        let summary = run(&source, &fetcher, &forwarder, Duration::ZERO).await.unwrap();

        assert_eq!(summary, RunSummary { succeeded: 3, failed: 0 });
        let sent = forwarder.sent.lock().unwrap();
        assert_eq!(sent[2].1, json!({ "name": "C", "price": null }));
    }

    #[tokio::test]
    async fn unreadable_page_counts_as_one_failure() {
        let fetcher = FakeFetcher::new(
            json!({}),
            vec![("http://items.test/dynamic", Page::Timeout)],
        );
        let forwarder = FakeForwarder::default();

        for (url, mode) in [
            (
                "http://items.test/dynamic",
                FetchMode::Rendered {
                    wait: Duration::from_secs(3),
                    wait_for: None,
                },
            ),
            ("http://rows.test/missing", FetchMode::Direct),
        ] {
            let source = SourceDescriptor::Page(PageSource {
                url: url.to_string(),
                mode,
                selectors: SelectorMap::new(".item"),
                destination: "http://dest.test/items".to_string(),
            });

            let summary = run(&source, &fetcher, &forwarder, Duration::ZERO).await.unwrap();
            assert_eq!(summary, RunSummary { succeeded: 0, failed: 1 });
        }
        assert!(forwarder.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_listing_ends_the_run() {
        struct DownListing;

        #[async_trait]
        impl Fetch for DownListing {
            async fn fetch(&self, url: &str, _mode: &FetchMode) -> Result<String> {
                panic!("no detail page should be fetched, got {url}");
            }

            async fn fetch_json(&self, url: &str, _query: &[(&'static str, String)]) -> Result<Value> {
                Err(Error::HttpStatus {
                    url: url.to_string(),
                    status: 503,
                })
            }
        }

        let err = run(&listing_source(), &DownListing, &FakeForwarder::default(), Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::HttpStatus { status: 503, .. }));
    }

    #[test]
    fn templates_encode_ids() {
        assert_eq!(
            fill_template("http://x.test/company/{symbol}/", "M&M"),
            "http://x.test/company/M%26M/"
        );
        assert_eq!(item_id(&json!({ "symbol": 42 }), "symbol").as_deref(), Some("42"));
        assert_eq!(item_id(&json!({ "symbol": "  " }), "symbol"), None);
    }

    #[test]
    fn summary_line() {
        let summary = RunSummary { succeeded: 3, failed: 2 };
        assert_eq!(summary.to_string(), "Completed: 3 success, 2 failed");
    }
}
