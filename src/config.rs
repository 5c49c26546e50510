use crate::paging::DEFAULT_PAGE_SIZE;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str =
    "http://timespace-china.fudan.edu.cn/gateway/geom-name/placename-object/home";

/// Settings shared by every front-end that drives a [`crate::Browser`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Base URL of the registry gateway.
    pub endpoint: String,
    /// Page size used until the user changes it.
    pub default_page_size: u32,
    /// Transport timeout in seconds; `None` leaves requests unbounded.
    pub timeout_secs: Option<u64>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            default_page_size: DEFAULT_PAGE_SIZE,
            timeout_secs: None,
        }
    }
}

impl BrowserConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs)
    }

    pub fn page_size(&self) -> u32 {
        self.default_page_size.max(1)
    }
}
