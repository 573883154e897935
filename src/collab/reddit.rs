//! Reddit access via the public JSON API, plus OAuth for replies.
//!
//! Reddit serves JSON for most pages by appending `.json`:
//!
//! - `/r/<sub>/new.json?limit=N`: newest submissions
//! - `/by_id/<fullname>.json`: one submission's current state
//! - `<permalink>.json?depth=1`: submission + top-level comments
//!
//! Replies go through `https://oauth.reddit.com/api/comment` with a bearer
//! token supplied by the operator.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::IgnoredAny;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{CollabError, CommentHistory, ItemMetadata, Publisher, Result, SubmissionSource};
use crate::queue::QueueItem;

const WWW: &str = "https://www.reddit.com";
const OAUTH: &str = "https://oauth.reddit.com";

/// Reddit client implementing the stream, comment and publish collaborators.
pub struct RedditClient {
    http: Client,
    subreddit: String,
    listing_size: u32,
    comment_scan_limit: u32,
    token: String,
}

impl RedditClient {
    #[must_use]
    pub fn new(http: Client, subreddit: impl Into<String>) -> Self {
        Self {
            http,
            subreddit: subreddit.into(),
            listing_size: 25,
            comment_scan_limit: 100,
            token: String::new(),
        }
    }

    #[must_use]
    pub fn with_listing_size(mut self, size: u32) -> Self {
        self.listing_size = size;
        self
    }

    #[must_use]
    pub fn with_comment_scan_limit(mut self, limit: u32) -> Self {
        self.comment_scan_limit = limit;
        self
    }

    /// Bearer token used for posting replies
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!("Fetching from Reddit: {}", url);
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CollabError::Status {
                service: "reddit",
                status,
            });
        }
        response.json().await.map_err(|e| CollabError::Malformed {
            service: "reddit",
            detail: e.to_string(),
        })
    }
}

#[async_trait]
impl SubmissionSource for RedditClient {
    #[instrument(skip(self), fields(subreddit = %self.subreddit))]
    async fn latest(&self) -> Result<Vec<QueueItem>> {
        let url = listing_url(&self.subreddit, self.listing_size);
        let listing: Listing<RedditPost> = self.get_json(&url).await?;
        Ok(listing.into_items().map(RedditPost::into_item).collect())
    }

    async fn refresh(&self, item: &QueueItem) -> Result<ItemMetadata> {
        let url = format!("{WWW}/by_id/{}.json", item.fullname);
        let listing: Listing<RedditPost> = self.get_json(&url).await?;
        let post = listing
            .into_items()
            .next()
            .ok_or_else(|| CollabError::Malformed {
                service: "reddit",
                detail: format!("no submission for {}", item.fullname),
            })?;
        Ok(ItemMetadata {
            view_count: post.view_count.unwrap_or(0),
        })
    }
}

#[async_trait]
impl CommentHistory for RedditClient {
    async fn has_commented(&self, item: &QueueItem, author: &str) -> Result<bool> {
        // Comment listings are rate limited hard; top level only.
        let url = format!(
            "{WWW}{}.json?limit={}&depth=1",
            item.permalink.trim_end_matches('/'),
            self.comment_scan_limit
        );
        let (_post, comments): (IgnoredAny, Listing<RedditComment>) = self.get_json(&url).await?;
        Ok(comments
            .into_items()
            .any(|c| c.author.as_deref() == Some(author)))
    }
}

#[async_trait]
impl Publisher for RedditClient {
    #[instrument(skip(self, body), fields(item = %item.id))]
    async fn reply(&self, item: &QueueItem, body: &str) -> Result<()> {
        if self.token.is_empty() {
            return Err(CollabError::MissingCredential("reddit token"));
        }

        let response = self
            .http
            .post(format!("{OAUTH}/api/comment"))
            .bearer_auth(&self.token)
            .form(&[
                ("api_type", "json"),
                ("thing_id", item.fullname.as_str()),
                ("text", body),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollabError::Status {
                service: "reddit",
                status,
            });
        }
        Ok(())
    }
}

/// Markdown body of the reply linking the translated image.
#[must_use]
pub fn reply_body(link: &url::Url) -> String {
    format!("[Translated version]({link})")
}

fn listing_url(subreddit: &str, limit: u32) -> String {
    format!("{WWW}/r/{subreddit}/new.json?limit={limit}")
}

/// Parse one page of `/new.json` output.
pub fn parse_listing(json: &str) -> anyhow::Result<Vec<QueueItem>> {
    let listing: Listing<RedditPost> =
        serde_json::from_str(json).context("Failed to parse Reddit listing")?;
    Ok(listing.into_items().map(RedditPost::into_item).collect())
}

// ============================================================================
// Reddit API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct Listing<T> {
    data: ListingData<T>,
}

#[derive(Debug, Deserialize)]
struct ListingData<T> {
    children: Vec<Child<T>>,
}

#[derive(Debug, Deserialize)]
struct Child<T> {
    data: T,
}

impl<T> Listing<T> {
    fn into_items(self) -> impl Iterator<Item = T> {
        self.data.children.into_iter().map(|c| c.data)
    }
}

#[derive(Debug, Deserialize)]
struct RedditPost {
    id: String,
    name: String,
    created_utc: f64,
    #[serde(default)]
    url: String,
    permalink: String,
    view_count: Option<u64>,
}

impl RedditPost {
    fn into_item(self) -> QueueItem {
        QueueItem {
            id: self.id,
            fullname: self.name,
            created_utc: self.created_utc as i64,
            view_count: self.view_count.unwrap_or(0),
            url: self.url,
            permalink: self.permalink,
        }
    }
}

/// Comment children; `more` stubs have no author.
#[derive(Debug, Deserialize)]
struct RedditComment {
    #[serde(default)]
    author: Option<String>,
}
