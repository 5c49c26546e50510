//! Browsing controller for a historical place-name registry.
//!
//! A [`Browser`] owns one session: criteria search or direct lookup by
//! sysId, server-reconciled pagination, a deduplicating detail cache and the
//! active detail view with its three display modes. Front-ends drive it
//! through intents and draw from [`Browser::snapshot`].

pub mod browser;
pub mod cache;
pub mod config;
pub mod error;
pub mod format;
pub mod model;
pub mod paging;
pub mod search;
pub mod service;
pub mod view;

#[cfg(feature = "web")]
pub mod web;

pub use browser::{Browser, IntentOutcome, LocationSummary, SessionView, StatusKind, StatusLine};
pub use cache::DetailCache;
pub use config::BrowserConfig;
pub use error::{BrowseError, InputField, Result};
pub use format::{PanelContent, SummaryView};
pub use model::{Detail, Record, SearchCriteria, SearchEnvelope, SearchPage, SearchQuery};
pub use paging::{PageSizeChange, PaginationState, StepDirection};
pub use search::{SearchForm, SearchMode};
#[cfg(feature = "http")]
pub use service::HttpDirectory;
pub use service::DirectoryService;
pub use view::{DisplayMode, PanelState};
