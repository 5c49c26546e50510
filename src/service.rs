//! The remote directory service the browser queries.

use crate::error::Result;
use crate::model::{Detail, SearchEnvelope, SearchQuery};
use async_trait::async_trait;
use std::sync::Arc;

/// Search and detail lookups against the place-name registry.
#[async_trait]
pub trait DirectoryService: Send + Sync + 'static {
    /// Runs a criteria search. Envelope-level failures (a non-zero code) are
    /// reported inside the envelope; `Err` is reserved for transport failures.
    async fn search(&self, query: &SearchQuery) -> Result<SearchEnvelope>;

    /// Fetches one entry, failing with `NotFound` when the registry has none.
    async fn get_detail(&self, sys_id: &str) -> Result<Detail>;
}

#[async_trait]
impl<T: DirectoryService + ?Sized> DirectoryService for Arc<T> {
    async fn search(&self, query: &SearchQuery) -> Result<SearchEnvelope> {
        (**self).search(query).await
    }

    async fn get_detail(&self, sys_id: &str) -> Result<Detail> {
        (**self).get_detail(sys_id).await
    }
}

#[cfg(feature = "http")]
pub use http::HttpDirectory;

#[cfg(feature = "http")]
mod http {
    use super::DirectoryService;
    use crate::config::BrowserConfig;
    use crate::error::{BrowseError, Result};
    use crate::model::{Detail, SearchEnvelope, SearchQuery};
    use async_trait::async_trait;
    use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
    use reqwest::{Client, StatusCode};
    use serde_json::Value;
    use tracing::{debug, warn};

    /// JSON-over-HTTP client for the registry gateway.
    #[derive(Clone)]
    pub struct HttpDirectory {
        client: Client,
        endpoint: String,
    }

    impl HttpDirectory {
        pub fn new(config: &BrowserConfig) -> Result<Self> {
            let mut builder = Client::builder();
            if let Some(timeout) = config.timeout() {
                builder = builder.timeout(timeout);
            }
            let client = builder
                .build()
                .map_err(|err| BrowseError::service(format!("failed to build HTTP client: {err}")))?;
            Ok(Self {
                client,
                endpoint: config.endpoint.trim_end_matches('/').to_string(),
            })
        }

        fn search_url(&self) -> String {
            format!("{}/placename", self.endpoint)
        }

        fn detail_url(&self, sys_id: &str) -> String {
            format!(
                "{}/placename/json/{}",
                self.endpoint,
                utf8_percent_encode(sys_id, NON_ALPHANUMERIC)
            )
        }
    }

    #[async_trait]
    impl DirectoryService for HttpDirectory {
        async fn search(&self, query: &SearchQuery) -> Result<SearchEnvelope> {
            debug!(page = ?query.page, limit = ?query.limit, "POST search");
            let response = self
                .client
                .post(self.search_url())
                .json(query)
                .send()
                .await
                .map_err(|err| BrowseError::service(format!("network request failed: {err}")))?;

            let status = response.status();
            if !status.is_success() {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<unreadable response body>".to_string());
                warn!(%status, "search request rejected");
                return Err(BrowseError::service(format!("search failed ({status}): {body}")));
            }

            response
                .json::<SearchEnvelope>()
                .await
                .map_err(|err| BrowseError::service(format!("failed to parse response: {err}")))
        }

        async fn get_detail(&self, sys_id: &str) -> Result<Detail> {
            let sys_id = sys_id.trim();
            if sys_id.is_empty() {
                return Err(BrowseError::MissingKey);
            }
            debug!(sys_id, "GET detail");
            let response = self
                .client
                .get(self.detail_url(sys_id))
                .send()
                .await
                .map_err(|err| BrowseError::service(format!("network request failed: {err}")))?;

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                return Err(BrowseError::NotFound(sys_id.to_string()));
            }
            if !status.is_success() {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<unreadable response body>".to_string());
                warn!(%status, sys_id, "detail request rejected");
                return Err(BrowseError::service(format!(
                    "failed to fetch detail ({status}): {body}"
                )));
            }

            let value = response
                .json::<Value>()
                .await
                .map_err(|err| BrowseError::service(format!("failed to parse response: {err}")))?;
            if !value.is_object() {
                return Err(BrowseError::NotFound(sys_id.to_string()));
            }
            Detail::from_json(value)
                .map_err(|err| BrowseError::service(format!("malformed detail: {err}")))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn detail_urls_escape_the_identifier() {
            let config = BrowserConfig {
                endpoint: "http://registry.test/api/".to_string(),
                ..BrowserConfig::default()
            };
            let directory = HttpDirectory::new(&config).unwrap();
            assert_eq!(directory.search_url(), "http://registry.test/api/placename");
            assert_eq!(
                directory.detail_url("PN 1/2"),
                "http://registry.test/api/placename/json/PN%201%2F2"
            );
        }
    }
}
