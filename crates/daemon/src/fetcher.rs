//! Source of feed items.

use std::time::Duration;

use async_trait::async_trait;
use recent_actions_core::{FeedItem, MediaRef};
use reqwest::{Client, StatusCode};
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("page returned status {0}")]
    Status(StatusCode),
    #[error("page could not be parsed: {0}")]
    Parse(String),
}

/// Produces the current feed, most recent first.
///
/// Implementations must not modify anything on the source side; the cache
/// may call `fetch` as often as it likes.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self) -> Result<Vec<FeedItem>, FetchError>;
}

/// Downloads the site front page and reads its recent-actions sidebar.
pub struct HtmlFetcher {
    client: Client,
    page_url: String,
}

impl HtmlFetcher {
    pub fn new(page_url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("recent-actions-daemon/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            page_url: page_url.into(),
        })
    }
}

#[async_trait]
impl Fetcher for HtmlFetcher {
    async fn fetch(&self) -> Result<Vec<FeedItem>, FetchError> {
        let resp = self.client.get(&self.page_url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        let body = resp.text().await?;
        parse_recent_actions(&body)
    }
}

fn selector(css: &str) -> Result<Selector, FetchError> {
    Selector::parse(css).map_err(|e| FetchError::Parse(format!("selector {css:?}: {e}")))
}

/// Extracts feed items from the front page HTML.
///
/// Every `li` in `div.recent-actions` that has a rated-user link and a second
/// link (the blog entry) becomes one item. Entries missing either are skipped.
/// A page without the sidebar yields an empty list.
pub fn parse_recent_actions(html: &str) -> Result<Vec<FeedItem>, FetchError> {
    let container_sel = selector("div.recent-actions")?;
    let entry_sel = selector("li")?;
    let link_sel = selector("a")?;
    let user_sel = selector("a.rated-user")?;
    let img_sel = selector("img")?;

    let doc = Html::parse_document(html);
    let Some(container) = doc.select(&container_sel).next() else {
        return Ok(Vec::new());
    };

    let mut items = Vec::new();
    for entry in container.select(&entry_sel) {
        let Some(user) = entry.select(&user_sel).next() else {
            continue;
        };
        let Some(blog) = entry.select(&link_sel).nth(1) else {
            continue;
        };
        let (Some(user_profile), Some(blog_link)) = (user.value().attr("href"), blog.value().attr("href")) else {
            continue;
        };

        let user_color = user
            .value()
            .classes()
            .find_map(|c| c.strip_prefix("user-"))
            .map(str::to_owned);

        let images: Vec<ElementRef<'_>> = entry.select(&img_sel).collect();
        let img = images.first().map(|el| MediaRef {
            alt: el.value().attr("alt").map(str::to_owned),
            image: el.value().attr("src").map(str::to_owned),
        });
        let other_img = images
            .iter()
            .skip(1)
            .filter_map(|el| {
                el.value().attr("src").map(|src| MediaRef {
                    alt: el.value().attr("alt").map(str::to_owned),
                    image: Some(src.to_owned()),
                })
            })
            .collect();

        items.push(FeedItem {
            user: stripped_text(user),
            user_profile: user_profile.to_owned(),
            user_color,
            blog_title: stripped_text(blog),
            blog_link: blog_link.to_owned(),
            img,
            other_img,
        });
    }
    Ok(items)
}

fn stripped_text(el: ElementRef<'_>) -> String {
    el.text().map(str::trim).filter(|s| !s.is_empty()).collect()
}
