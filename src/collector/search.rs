//! Weibo search collaborator.
//!
//! [`SearchSource`] is the narrow contract the collector depends on: one
//! request per (keyword, window, page). [`WeiboSearch`] implements it against
//! `s.weibo.com` and parses the result page's feed cards.

use crate::agent::retry::{retry_with_backoff, Retriable};
use crate::collector::window::TimeWindow;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("search returned status {status}")]
    Status { status: u16 },
}

impl Retriable for SearchError {
    fn is_retriable(&self) -> bool {
        match self {
            SearchError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            SearchError::Status { status } => *status == 429 || *status >= 500,
        }
    }
}

/// One feed card from a result page, before any filtering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchItem {
    pub author: String,
    /// Raw "time 来自 source" blob.
    pub from_text: String,
    /// Full text when the card had a "see full text" variant.
    pub body: String,
    pub reposts: String,
    pub comments: String,
    pub likes: String,
}

#[async_trait]
pub trait SearchSource: Send + Sync {
    async fn fetch_page(
        &self,
        keyword: &str,
        window: &TimeWindow,
        page: u32,
    ) -> Result<Vec<SearchItem>, SearchError>;
}

/// Settings for [`WeiboSearch`].
#[derive(Debug, Clone)]
pub struct WeiboSearchConfig {
    pub search_url: String,
    pub cookie: Option<String>,
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub retries: u32,
    pub backoff_base_ms: u64,
}

/// HTTP search client for `s.weibo.com`.
pub struct WeiboSearch {
    config: WeiboSearchConfig,
    http_client: reqwest::Client,
}

impl WeiboSearch {
    pub fn new(config: WeiboSearchConfig) -> Result<Self, SearchError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            config,
            http_client,
        })
    }

    async fn fetch_once(
        &self,
        keyword: &str,
        timescope: &str,
        page: u32,
    ) -> Result<String, SearchError> {
        let page = page.to_string();
        let mut request = self
            .http_client
            .get(&self.config.search_url)
            .query(&[
                ("q", keyword),
                ("typeall", "1"),
                ("suball", "1"),
                ("timescope", timescope),
                ("Refer", "g"),
                ("page", page.as_str()),
            ])
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header(reqwest::header::ACCEPT_LANGUAGE, "zh-CN,zh;q=0.9,en;q=0.8");

        if let Some(ref cookie) = self.config.cookie {
            request = request.header(reqwest::header::COOKIE, cookie);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status {
                status: status.as_u16(),
            });
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl SearchSource for WeiboSearch {
    async fn fetch_page(
        &self,
        keyword: &str,
        window: &TimeWindow,
        page: u32,
    ) -> Result<Vec<SearchItem>, SearchError> {
        let timescope = window.timescope();
        let html = retry_with_backoff(
            self.config.retries,
            self.config.backoff_base_ms,
            "weibo search",
            || self.fetch_once(keyword, &timescope, page),
        )
        .await?;

        let items = parse_search_page(&html);
        debug!(page, items = items.len(), "parsed search page");
        Ok(items)
    }
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid CSS selector")
}

static FEED_ITEM: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"div[action-type="feed_list_item"]"#));
static CONTENT: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"p[node-type="feed_list_content"]"#));
static CONTENT_FULL: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"p[node-type="feed_list_content_full"]"#));
static FROM: LazyLock<Selector> = LazyLock::new(|| selector("div.from"));
static CARD_ACTIONS: LazyLock<Selector> = LazyLock::new(|| selector("div.card-act li"));

/// Extract feed cards from a search result page.
///
/// Cards without a content paragraph are skipped.
pub fn parse_search_page(html: &str) -> Vec<SearchItem> {
    let document = Html::parse_document(html);

    document
        .select(&FEED_ITEM)
        .filter_map(|card| {
            let content = card.select(&CONTENT).next()?;
            let author = content.value().attr("nick-name").unwrap_or("").to_string();

            let body = card
                .select(&CONTENT_FULL)
                .next()
                .map(element_text)
                .unwrap_or_else(|| element_text(content));

            let from_text = card.select(&FROM).next().map(element_text).unwrap_or_default();

            let counters: Vec<String> = card.select(&CARD_ACTIONS).map(element_text).collect();
            let counter = |i: usize| counters.get(i).cloned().unwrap_or_default();

            Some(SearchItem {
                author,
                from_text,
                body,
                reposts: counter(0),
                comments: counter(1),
                likes: counter(2),
            })
        })
        .collect()
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}
