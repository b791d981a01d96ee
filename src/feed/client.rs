//! HTTP client for the release-plans feed.
//!
//! Page 1 is the bare feed URL; later pages add `?page=N`. The client keeps
//! requesting pages while the feed reports `morerecords`, up to a page limit.
//! Retry policy is left to the caller.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use thiserror::Error;

use super::{parse_document, RawPage};
use crate::config::FeedConfig;

/// HTTP client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed responded {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Feed page {page} is not JSON: {reason}")]
    Decode { page: u32, reason: String },
}

/// Raw pages retrieved from the feed.
#[derive(Debug, Clone, Default)]
pub struct FetchedPages {
    pub pages: Vec<RawPage>,
    /// Set when fetching stopped early after at least one good page.
    pub truncated: Option<String>,
    /// At least one page had to be salvaged from invalid JSON.
    pub salvaged: bool,
}

/// HTTP client for the release-plans feed.
#[derive(Debug, Clone)]
pub struct FeedClient {
    url: String,
    max_pages: u32,
    client: Client,
}

impl FeedClient {
    /// Create with explicit configuration.
    pub fn new(
        url: impl Into<String>,
        max_pages: u32,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            url: url.into(),
            max_pages: max_pages.max(1),
            client,
        })
    }

    pub fn from_config(config: &FeedConfig) -> Result<Self, ClientError> {
        Self::new(
            config.url.clone(),
            config.max_pages,
            Duration::from_secs(config.timeout_secs),
            &config.user_agent,
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn page_url(&self, page: u32) -> String {
        if page <= 1 {
            self.url.clone()
        } else if self.url.contains('?') {
            format!("{}&page={}", self.url, page)
        } else {
            format!("{}?page={}", self.url, page)
        }
    }

    /// Fetch one page body as text.
    pub async fn fetch_page_text(&self, page: u32) -> Result<String, ClientError> {
        let response = self
            .client
            .get(self.page_url(page))
            .header(reqwest::header::ACCEPT, "*/*")
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(response.text().await?)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ClientError::Status { status, body })
        }
    }

    /// Fetch every page of the feed.
    ///
    /// Fails only if the first page cannot be retrieved; a failure on a later
    /// page keeps what was already fetched and records why in
    /// [`FetchedPages::truncated`].
    pub async fn fetch_pages(&self) -> Result<FetchedPages, ClientError> {
        let mut fetched = FetchedPages::default();

        for page in 1..=self.max_pages {
            let result = match self.fetch_page_text(page).await {
                Ok(text) => parse_document(&text).map_err(|e| ClientError::Decode {
                    page,
                    reason: e.to_string(),
                }),
                Err(e) => Err(e),
            };

            let document = match result {
                Ok(document) => document,
                Err(e) if fetched.pages.is_empty() => return Err(e),
                Err(e) => {
                    tracing::warn!("Stopped fetching at page {}: {}", page, e);
                    fetched.truncated = Some(e.to_string());
                    break;
                }
            };

            let has_more = document.pages.last().is_some_and(RawPage::has_more);
            fetched.pages.extend(document.pages);
            tracing::debug!("Fetched feed page {}", page);

            // Salvaged pages carry no reliable pagination info.
            if document.salvaged {
                tracing::warn!("Feed page {} was not valid JSON, salvaged entries", page);
                fetched.salvaged = true;
                break;
            }
            if !has_more {
                break;
            }
            if page == self.max_pages {
                tracing::warn!("Feed still reports more records after {} pages", page);
                fetched.truncated = Some(format!("page limit {} reached", page));
            }
        }

        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(url: &str) -> FeedClient {
        FeedClient::new(url, 10, Duration::from_secs(5), "test-agent").unwrap()
    }

    #[test]
    fn first_page_uses_bare_url() {
        let c = client("https://example.com/plans/");
        assert_eq!(c.page_url(1), "https://example.com/plans/");
        assert_eq!(c.page_url(3), "https://example.com/plans/?page=3");
    }

    #[test]
    fn page_param_appends_to_existing_query() {
        let c = client("https://example.com/plans?lang=en");
        assert_eq!(c.page_url(2), "https://example.com/plans?lang=en&page=2");
    }

    #[test]
    fn page_limit_is_at_least_one() {
        let c = FeedClient::new("http://x", 0, Duration::from_secs(1), "ua").unwrap();
        assert_eq!(c.max_pages, 1);
    }
}
