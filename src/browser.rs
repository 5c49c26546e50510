//! The browsing session: search state, the detail view and the detail cache
//! behind one handle.
//!
//! Every intent locks the session only for its synchronous parts. Fetches run
//! unlocked, and their outcomes are applied through the tickets issued by
//! [`SearchSession`] and [`ViewCoordinator`], so a response that lost the race
//! to a newer request is dropped instead of applied.

use crate::cache::DetailCache;
use crate::config::BrowserConfig;
use crate::error::{BrowseError, InputField, Result};
use crate::format::{self, PanelContent};
use crate::model::{Detail, Record, SearchCriteria, SearchEnvelope, SearchPage};
use crate::paging::{PageSizeChange, PaginationState};
use crate::search::{
    LookupTicket, ResultSet, SearchApplied, SearchForm, SearchMode, SearchSession, SearchTicket,
};
use crate::service::DirectoryService;
use crate::view::{DisplayMode, PanelState, ViewApplied, ViewCoordinator, ViewPhase};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

const SEARCHING: &str = "Searching…";
const LOOKUP_SUCCEEDED: &str = "Lookup succeeded.";

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StatusKind {
    Info,
    Error,
    Success,
}

/// The single user-facing status message.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct StatusLine {
    pub kind: StatusKind,
    pub message: String,
}

/// What an asynchronous intent ended up doing.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum IntentOutcome {
    Applied,
    /// Superseded by a newer request or a mode switch before completing.
    Stale,
    /// Nothing to do, e.g. a record without a sysId or a page out of range.
    Ignored,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSizeUpdate {
    #[serde(skip)]
    pub change: PageSizeChange,
    pub page_size: u32,
    pub outcome: IntentOutcome,
}

/// Result of an opportunistic location lookup for a results row.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "state", content = "text")]
pub enum LocationSummary {
    Known(String),
    Unknown,
    /// The result set changed while the detail was being fetched.
    Superseded,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct PanelView {
    pub mode: DisplayMode,
    pub state: PanelState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailView {
    pub mode: DisplayMode,
    /// sysId of the detail being loaded, if any.
    pub loading: Option<String>,
    pub active: Option<Record>,
    pub panels: Vec<PanelView>,
}

/// Everything a presentation layer needs to draw the session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub search_mode: SearchMode,
    pub criteria: Option<SearchCriteria>,
    pub identifier: String,
    pub focus: Option<InputField>,
    pub pagination: PaginationState,
    pub display_page: u32,
    pub has_previous: bool,
    pub has_next: bool,
    pub results: ResultSet,
    pub detail: DetailView,
    pub status: Option<StatusLine>,
}

struct BrowserState {
    search: SearchSession,
    view: ViewCoordinator,
    status: Option<StatusLine>,
}

impl BrowserState {
    fn set_status(&mut self, kind: StatusKind, message: impl Into<String>) {
        self.status = Some(StatusLine {
            kind,
            message: message.into(),
        });
    }

    fn report(&mut self, err: &BrowseError) {
        self.set_status(StatusKind::Error, err.to_string());
    }

    fn clear_status_if(&mut self, message: &str) {
        if self
            .status
            .as_ref()
            .is_some_and(|status| status.message == message)
        {
            self.status = None;
        }
    }
}

enum Submission {
    Search(SearchTicket),
    Lookup(LookupTicket),
}

/// One browsing session against a directory service.
pub struct Browser<S> {
    directory: Arc<S>,
    cache: DetailCache,
    config: BrowserConfig,
    state: Mutex<BrowserState>,
}

impl<S: DirectoryService> Browser<S> {
    pub fn new(directory: S, config: BrowserConfig) -> Self {
        let state = BrowserState {
            search: SearchSession::new(config.page_size()),
            view: ViewCoordinator::new(),
            status: None,
        };
        Self {
            directory: Arc::new(directory),
            cache: DetailCache::new(),
            config,
            state: Mutex::new(state),
        }
    }

    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }

    pub fn cache(&self) -> &DetailCache {
        &self.cache
    }

    pub fn directory(&self) -> &S {
        &self.directory
    }

    /// Submits the form in the current search mode: a criteria search from
    /// page zero, or a direct lookup of `form.sys_id`.
    pub async fn submit_search(&self, form: SearchForm) -> Result<IntentOutcome> {
        let submission = {
            let mut state = self.state.lock();
            let submission = match state.search.mode() {
                SearchMode::Criteria => Submission::Search(state.search.begin_criteria(&form)),
                SearchMode::Direct => match state.search.begin_lookup(form.sys_id.as_deref()) {
                    Ok(ticket) => Submission::Lookup(ticket),
                    Err(err) => {
                        state.report(&err);
                        return Err(err);
                    }
                },
            };
            match &submission {
                Submission::Search(_) => state.set_status(StatusKind::Info, SEARCHING),
                Submission::Lookup(ticket) => state.set_status(
                    StatusKind::Info,
                    format!("Looking up sysId {}…", ticket.sys_id),
                ),
            }
            submission
        };
        match submission {
            Submission::Search(ticket) => self.run_search(ticket).await,
            Submission::Lookup(ticket) => self.run_lookup(ticket).await,
        }
    }

    /// Loads `record`'s detail into display mode `mode`.
    pub async fn select_record(&self, record: &Record, mode: DisplayMode) -> Result<IntentOutcome> {
        let (ticket, loading_message) = {
            let mut state = self.state.lock();
            let Some(ticket) = state.view.select(record, mode) else {
                debug!("ignoring selection of a record without a sysId");
                return Ok(IntentOutcome::Ignored);
            };
            let message = format!("Loading {} {}…", record.display_label(), mode.label());
            state.set_status(StatusKind::Info, message.clone());
            (ticket, message)
        };

        let outcome = self.fetch_detail(&ticket.sys_id).await;

        let mut guard = self.state.lock();
        let state = &mut *guard;
        match state.view.complete(&ticket, outcome) {
            ViewApplied::Ready => {
                state.clear_status_if(&loading_message);
                Ok(IntentOutcome::Applied)
            }
            ViewApplied::RolledBack(err) | ViewApplied::Cleared(err) => {
                warn!(sys_id = %ticket.sys_id, error = %err, "detail load failed");
                state.report(&err);
                Err(err)
            }
            ViewApplied::Stale => Ok(IntentOutcome::Stale),
        }
    }

    /// Selects a record of the current result set by sysId.
    pub async fn select_by_id(&self, sys_id: &str, mode: DisplayMode) -> Result<IntentOutcome> {
        let record = self.state.lock().search.results().find(sys_id).cloned();
        match record {
            Some(record) => self.select_record(&record, mode).await,
            None => Err(BrowseError::NotFound(sys_id.trim().to_string())),
        }
    }

    /// Shows another display mode of the active detail. Never fetches.
    pub fn change_display_mode(&self, mode: DisplayMode) {
        let mut state = self.state.lock();
        let was_loading = state.view.is_loading();
        state.view.change_mode(mode);
        if was_loading
            && state
                .status
                .as_ref()
                .is_some_and(|status| status.kind == StatusKind::Info)
        {
            state.status = None;
        }
    }

    /// Moves `delta` pages through the current criteria search.
    pub async fn change_page(&self, delta: i64) -> Result<IntentOutcome> {
        let ticket = {
            let mut state = self.state.lock();
            let Some(ticket) = state.search.begin_page_change(delta) else {
                return Ok(IntentOutcome::Ignored);
            };
            state.set_status(StatusKind::Info, SEARCHING);
            ticket
        };
        self.run_search(ticket).await
    }

    /// Applies a page-size edit. Rejected input leaves everything as it was
    /// and reports the size the field should revert to.
    pub async fn change_page_size(&self, raw: &str, is_stepper_event: bool) -> Result<PageSizeUpdate> {
        let (change, ticket) = {
            let mut state = self.state.lock();
            let (change, ticket) = state.search.begin_page_size_change(raw, is_stepper_event);
            if ticket.is_some() {
                state.set_status(StatusKind::Info, SEARCHING);
            }
            (change, ticket)
        };
        let outcome = match ticket {
            Some(ticket) => self.run_search(ticket).await?,
            None if change.target().is_some() => IntentOutcome::Applied,
            None => IntentOutcome::Ignored,
        };
        let page_size = match change {
            PageSizeChange::Rejected { revert_to } => revert_to,
            _ => self.state.lock().search.pagination().page_size,
        };
        Ok(PageSizeUpdate {
            change,
            page_size,
            outcome,
        })
    }

    /// Switches between criteria and direct search. Requests still in flight
    /// complete as stale.
    pub fn switch_search_mode(&self, mode: SearchMode) -> bool {
        let mut state = self.state.lock();
        let switched = state.search.switch_mode(mode);
        state.status = None;
        switched
    }

    /// Looks up a related entry exactly as if its sysId had been typed into
    /// direct mode.
    pub async fn follow_relation(&self, sys_id: &str) -> Result<IntentOutcome> {
        self.switch_search_mode(SearchMode::Direct);
        let form = SearchForm {
            sys_id: Some(sys_id.to_string()),
            ..SearchForm::default()
        };
        self.submit_search(form).await
    }

    /// Present-day locations for a results row, fetching the detail through
    /// the cache when the record carries none of its own.
    pub async fn location_summary(&self, record: &Record) -> LocationSummary {
        if let Some(summary) = format::location_summary(record, None) {
            return LocationSummary::Known(summary);
        }
        let Some(key) = record.key() else {
            return LocationSummary::Unknown;
        };
        let issued = {
            let state = self.state.lock();
            (state.search.latest_seq(), state.search.mode())
        };

        let outcome = self.fetch_detail(key).await;

        let current = {
            let state = self.state.lock();
            (state.search.latest_seq(), state.search.mode())
        };
        if current != issued {
            debug!(sys_id = %key, "dropping location summary for a replaced result set");
            return LocationSummary::Superseded;
        }
        match outcome {
            Ok(detail) => format::location_summary(record, Some(&detail))
                .map_or(LocationSummary::Unknown, LocationSummary::Known),
            Err(err) => {
                debug!(sys_id = %key, error = %err, "location summary unavailable");
                LocationSummary::Unknown
            }
        }
    }

    pub fn snapshot(&self) -> SessionView {
        let state = self.state.lock();
        let pagination = state.search.pagination();
        let loading = match state.view.phase() {
            ViewPhase::Loading { sys_id, .. } => Some(sys_id.to_string()),
            _ => None,
        };
        SessionView {
            search_mode: state.search.mode(),
            criteria: state.search.criteria().cloned(),
            identifier: state.search.identifier().to_string(),
            focus: state.search.focus(),
            pagination,
            display_page: pagination.display_page(),
            has_previous: pagination.has_previous(),
            has_next: pagination.has_next(),
            results: state.search.results().clone(),
            detail: DetailView {
                mode: state.view.mode(),
                loading,
                active: state.view.active().map(|active| active.record.clone()),
                panels: DisplayMode::ALL
                    .iter()
                    .map(|&mode| PanelView {
                        mode,
                        state: state.view.panel(mode).clone(),
                    })
                    .collect(),
            },
            status: state.status.clone(),
        }
    }

    /// Content of the visible panel, or `None` while it shows a placeholder.
    pub fn panel(&self) -> Option<PanelContent> {
        let state = self.state.lock();
        let mode = state.view.mode();
        let active = state.view.active()?;
        match state.view.panel(mode) {
            PanelState::Ready { .. } => Some(PanelContent::render(mode, &active.record, &active.detail)),
            PanelState::Placeholder | PanelState::Loading => None,
        }
    }

    pub fn active_detail(&self) -> Option<Arc<Detail>> {
        self.state
            .lock()
            .view
            .active()
            .map(|active| Arc::clone(&active.detail))
    }

    pub fn status(&self) -> Option<StatusLine> {
        self.state.lock().status.clone()
    }

    async fn run_search(&self, ticket: SearchTicket) -> Result<IntentOutcome> {
        let outcome = match self.directory.search(&ticket.query()).await {
            Ok(envelope) => page_from_envelope(envelope),
            Err(err) => Err(err),
        };

        let mut guard = self.state.lock();
        let state = &mut *guard;
        match state.search.complete_search(&ticket, outcome) {
            SearchApplied::Applied => {
                state.view.reset();
                state.clear_status_if(SEARCHING);
                Ok(IntentOutcome::Applied)
            }
            SearchApplied::Failed(err) => {
                warn!(seq = ticket.seq(), error = %err, "search failed");
                state.view.reset();
                state.report(&err);
                Err(err)
            }
            SearchApplied::Stale => Ok(IntentOutcome::Stale),
        }
    }

    async fn run_lookup(&self, ticket: LookupTicket) -> Result<IntentOutcome> {
        let outcome = self.fetch_detail(&ticket.sys_id).await;

        let mut guard = self.state.lock();
        let state = &mut *guard;
        let applied = state
            .search
            .complete_lookup(&ticket, outcome.as_deref().map_err(Clone::clone));
        match applied {
            SearchApplied::Applied => {
                state.view.reset();
                if let Ok(detail) = &outcome {
                    let record = detail.to_record();
                    if let Some(view_ticket) = state.view.select(&record, DisplayMode::Summary) {
                        state.view.complete(&view_ticket, Ok(Arc::clone(detail)));
                    }
                }
                state.set_status(StatusKind::Success, LOOKUP_SUCCEEDED);
                Ok(IntentOutcome::Applied)
            }
            SearchApplied::Failed(err) => {
                warn!(sys_id = %ticket.sys_id, error = %err, "direct lookup failed");
                state.view.reset();
                state.report(&err);
                Err(err)
            }
            SearchApplied::Stale => Ok(IntentOutcome::Stale),
        }
    }

    async fn fetch_detail(&self, sys_id: &str) -> Result<Arc<Detail>> {
        let directory = Arc::clone(&self.directory);
        self.cache
            .get_or_fetch(sys_id, move |key| async move { directory.get_detail(&key).await })
            .await
    }
}

/// Unwraps a search envelope. A missing code counts as success.
pub fn page_from_envelope(envelope: SearchEnvelope) -> Result<SearchPage> {
    if envelope.resp_code.unwrap_or(0) != 0 {
        let message = envelope
            .resp_msg
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| "search failed".to_string());
        return Err(BrowseError::Service(message));
    }
    envelope
        .datas
        .ok_or_else(|| BrowseError::service("service returned no data"))
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::error::{BrowseError, Result};
    use crate::model::{Detail, Record, SearchEnvelope, SearchPage, SearchQuery};
    use crate::service::DirectoryService;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Scripted in-memory directory. Fetches for a key with a gate wait
    /// until the gate is released.
    #[derive(Default)]
    pub struct FakeDirectory {
        details: Mutex<HashMap<String, Value>>,
        pages: Mutex<HashMap<String, SearchEnvelope>>,
        gates: Mutex<HashMap<String, Arc<Notify>>>,
        queries: Mutex<Vec<SearchQuery>>,
        detail_calls: AtomicUsize,
    }

    impl FakeDirectory {
        pub fn with_detail(self, sys_id: &str, value: Value) -> Self {
            self.details.lock().insert(sys_id.to_string(), value);
            self
        }

        /// Answers searches whose name is `name`.
        pub fn with_page(self, name: &str, envelope: SearchEnvelope) -> Self {
            self.pages.lock().insert(name.to_string(), envelope);
            self
        }

        /// Holds fetches for `key` until [`FakeDirectory::release`]. Searches
        /// are keyed as `search:<name>`.
        pub fn gate(&self, key: &str) -> Arc<Notify> {
            Arc::clone(self.gates.lock().entry(key.to_string()).or_default())
        }

        pub fn release(&self, key: &str) {
            self.gate(key).notify_one();
        }

        pub fn detail_calls(&self) -> usize {
            self.detail_calls.load(Ordering::SeqCst)
        }

        pub fn queries(&self) -> Vec<SearchQuery> {
            self.queries.lock().clone()
        }

        async fn wait(&self, key: &str) {
            let gate = self.gates.lock().get(key).cloned();
            if let Some(gate) = gate {
                gate.notified().await;
            }
        }
    }

    #[async_trait]
    impl DirectoryService for FakeDirectory {
        async fn search(&self, query: &SearchQuery) -> Result<SearchEnvelope> {
            self.queries.lock().push(query.clone());
            let name = query.name.clone().unwrap_or_default();
            self.wait(&format!("search:{name}")).await;
            let envelope = self.pages.lock().get(&name).cloned();
            envelope.ok_or_else(|| BrowseError::service("connection refused"))
        }

        async fn get_detail(&self, sys_id: &str) -> Result<Detail> {
            self.detail_calls.fetch_add(1, Ordering::SeqCst);
            self.wait(sys_id).await;
            let value = self.details.lock().get(sys_id).cloned();
            match value {
                Some(value) => Detail::from_json(value)
                    .map_err(|err| BrowseError::service(format!("malformed detail: {err}"))),
                None => Err(BrowseError::NotFound(sys_id.to_string())),
            }
        }
    }

    pub fn envelope(
        total: i64,
        size: i64,
        pages: Option<i64>,
        current: Option<i64>,
        ids: &[&str],
    ) -> SearchEnvelope {
        SearchEnvelope {
            resp_code: Some(0),
            resp_msg: Some("ok".to_string()),
            datas: Some(SearchPage {
                total: Some(total),
                size: Some(size),
                pages,
                current,
                records: ids.iter().map(|id| record(id)).collect(),
            }),
        }
    }

    pub fn record(sys_id: &str) -> Record {
        Record {
            sys_id: Some(sys_id.to_string()),
            name_vn: Some(format!("Place {sys_id}")),
            ..Record::default()
        }
    }
}
