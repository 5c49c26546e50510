//! Search-mode selection, criteria, pagination and the current result set.
//!
//! Every request is split into a synchronous `begin_*` that issues a ticket
//! and a `complete_*` that applies the outcome. Tickets carry the sequence
//! number and mode epoch they were issued under; a completion whose ticket is
//! no longer current is reported as stale and changes nothing.

use crate::error::{BrowseError, InputField, Result};
use crate::model::{Detail, Record, SearchCriteria, SearchPage, SearchQuery};
use crate::paging::{self, PageReport, PageSizeChange, PaginationState};
use serde::Serialize;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchMode {
    #[default]
    Criteria,
    Direct,
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchMode::Criteria => write!(f, "criteria"),
            SearchMode::Direct => write!(f, "direct"),
        }
    }
}

impl std::str::FromStr for SearchMode {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "criteria" => Ok(SearchMode::Criteria),
            "direct" | "sysid" | "id" => Ok(SearchMode::Direct),
            other => Err(format!("unknown search mode {other:?}")),
        }
    }
}

/// Raw form inputs, exactly as typed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchForm {
    pub name: Option<String>,
    pub year: Option<String>,
    pub kind: Option<String>,
    pub sys_id: Option<String>,
}

/// Trims a form value; blank input means "unset".
pub fn sanitize_input(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

/// Parses an optional year. Blank or non-numeric input counts as unset.
pub fn parse_year(value: Option<&str>) -> Option<i32> {
    let text = sanitize_input(value)?;
    if let Ok(year) = text.parse::<i32>() {
        return Some(year);
    }
    text.parse::<f64>()
        .ok()
        .filter(|year| year.is_finite() && year.fract() == 0.0)
        .filter(|year| *year >= f64::from(i32::MIN) && *year <= f64::from(i32::MAX))
        .map(|year| year as i32)
}

impl SearchCriteria {
    pub fn from_form(form: &SearchForm) -> Self {
        Self {
            name: sanitize_input(form.name.as_deref()),
            year: parse_year(form.year.as_deref()),
            kind: sanitize_input(form.kind.as_deref()),
        }
    }
}

/// Where the current result set came from.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResultOrigin {
    #[default]
    None,
    Criteria,
    Direct,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSet {
    pub origin: ResultOrigin,
    pub total: u64,
    pub records: Vec<Record>,
}

impl ResultSet {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn find(&self, sys_id: &str) -> Option<&Record> {
        let sys_id = sys_id.trim();
        self.records.iter().find(|record| record.key() == Some(sys_id))
    }
}

/// A criteria search that has been issued but not yet applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTicket {
    seq: u64,
    epoch: u64,
    pub page: u32,
    pub page_size: u32,
    pub criteria: SearchCriteria,
}

impl SearchTicket {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn query(&self) -> SearchQuery {
        SearchQuery::new(&self.criteria, self.page, self.page_size)
    }
}

/// A direct lookup that has been issued but not yet applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupTicket {
    seq: u64,
    epoch: u64,
    pub sys_id: String,
}

impl LookupTicket {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// What a completion did to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchApplied {
    /// The outcome became the current result set.
    Applied,
    /// The request failed; results were cleared and pagination kept.
    Failed(BrowseError),
    /// A newer request or a mode switch superseded this one.
    Stale,
}

#[derive(Debug, Clone)]
pub struct SearchSession {
    mode: SearchMode,
    epoch: u64,
    latest_seq: u64,
    criteria: Option<SearchCriteria>,
    pagination: PaginationState,
    results: ResultSet,
    identifier: String,
    focus: Option<InputField>,
}

impl SearchSession {
    pub fn new(page_size: u32) -> Self {
        Self {
            mode: SearchMode::Criteria,
            epoch: 0,
            latest_seq: 0,
            criteria: None,
            pagination: PaginationState::empty(page_size),
            results: ResultSet::default(),
            identifier: String::new(),
            focus: None,
        }
    }

    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    pub fn criteria(&self) -> Option<&SearchCriteria> {
        self.criteria.as_ref()
    }

    pub fn pagination(&self) -> PaginationState {
        self.pagination
    }

    pub fn results(&self) -> &ResultSet {
        &self.results
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn focus(&self) -> Option<InputField> {
        self.focus
    }

    /// Sequence number of the most recently issued request.
    pub fn latest_seq(&self) -> u64 {
        self.latest_seq
    }

    pub fn set_identifier(&mut self, value: impl Into<String>) {
        self.identifier = value.into();
    }

    /// Switches search mode. Returns `false` when already in `mode`.
    ///
    /// In-flight requests keep running but their results will be stale.
    pub fn switch_mode(&mut self, mode: SearchMode) -> bool {
        if mode == self.mode {
            return false;
        }
        self.mode = mode;
        self.epoch += 1;
        self.pagination = PaginationState::empty(self.pagination.page_size);
        match mode {
            SearchMode::Direct => {
                self.criteria = None;
                self.focus = Some(InputField::SysId);
            }
            SearchMode::Criteria => {
                self.identifier.clear();
                self.focus = None;
            }
        }
        debug!(%mode, epoch = self.epoch, "search mode switched");
        true
    }

    /// Starts a fresh criteria search from page zero.
    pub fn begin_criteria(&mut self, form: &SearchForm) -> SearchTicket {
        let criteria = SearchCriteria::from_form(form);
        self.criteria = Some(criteria.clone());
        self.pagination.page = 0;
        self.focus = None;
        self.issue(criteria, 0, self.pagination.page_size)
    }

    /// Moves `delta` pages from the current one. `None` when there is no
    /// criteria search to page through or the target is out of range.
    pub fn begin_page_change(&mut self, delta: i64) -> Option<SearchTicket> {
        if self.mode != SearchMode::Criteria || delta == 0 {
            return None;
        }
        let criteria = self.criteria.clone()?;
        let target = i64::from(self.pagination.page).checked_add(delta)?;
        if target < 0 || target >= i64::from(self.pagination.page_count.max(1)) {
            return None;
        }
        Some(self.issue(criteria, target as u32, self.pagination.page_size))
    }

    /// Interprets a page-size edit and, when it changes the size, re-issues
    /// the current criteria from page zero. Without a criteria search there
    /// is no request to wait for and the size is taken immediately.
    pub fn begin_page_size_change(
        &mut self,
        raw: &str,
        is_stepper_event: bool,
    ) -> (PageSizeChange, Option<SearchTicket>) {
        let change = paging::resolve_page_size(self.pagination.page_size, raw, is_stepper_event);
        let Some(size) = change.target() else {
            return (change, None);
        };
        let ticket = match self.criteria.clone() {
            Some(criteria) if self.mode == SearchMode::Criteria => {
                Some(self.issue(criteria, 0, size))
            }
            _ => {
                self.pagination.page_size = size;
                None
            }
        };
        (change, ticket)
    }

    /// Validates the identifier field and starts a direct lookup.
    pub fn begin_lookup(&mut self, raw_sys_id: Option<&str>) -> Result<LookupTicket> {
        if let Some(raw) = raw_sys_id {
            self.identifier = raw.to_string();
        }
        let Some(sys_id) = sanitize_input(Some(&self.identifier)) else {
            self.focus = Some(InputField::SysId);
            return Err(BrowseError::validation(InputField::SysId, "Enter a sysId."));
        };
        self.latest_seq += 1;
        self.focus = None;
        debug!(seq = self.latest_seq, sys_id = %sys_id, "direct lookup issued");
        Ok(LookupTicket {
            seq: self.latest_seq,
            epoch: self.epoch,
            sys_id,
        })
    }

    pub fn complete_search(
        &mut self,
        ticket: &SearchTicket,
        outcome: Result<SearchPage>,
    ) -> SearchApplied {
        if !self.is_current(ticket.seq, ticket.epoch) {
            debug!(seq = ticket.seq, latest = self.latest_seq, "dropping stale search response");
            return SearchApplied::Stale;
        }
        match outcome {
            Ok(page) => {
                self.pagination =
                    paging::reconcile(ticket.page, ticket.page_size, &PageReport::from(&page));
                self.results = ResultSet {
                    origin: ResultOrigin::Criteria,
                    total: self.pagination.total,
                    records: page.records,
                };
                SearchApplied::Applied
            }
            Err(err) => self.fail(err),
        }
    }

    pub fn complete_lookup(
        &mut self,
        ticket: &LookupTicket,
        outcome: Result<&Detail>,
    ) -> SearchApplied {
        if !self.is_current(ticket.seq, ticket.epoch) {
            debug!(seq = ticket.seq, latest = self.latest_seq, "dropping stale lookup response");
            return SearchApplied::Stale;
        }
        match outcome {
            Ok(detail) => {
                self.pagination = PaginationState {
                    page: 0,
                    page_size: self.pagination.page_size,
                    total: 1,
                    page_count: 1,
                };
                self.results = ResultSet {
                    origin: ResultOrigin::Direct,
                    total: 1,
                    records: vec![detail.to_record()],
                };
                SearchApplied::Applied
            }
            Err(err) => self.fail(err),
        }
    }

    fn issue(&mut self, criteria: SearchCriteria, page: u32, page_size: u32) -> SearchTicket {
        self.latest_seq += 1;
        debug!(seq = self.latest_seq, page, page_size, "criteria search issued");
        SearchTicket {
            seq: self.latest_seq,
            epoch: self.epoch,
            page,
            page_size,
            criteria,
        }
    }

    fn is_current(&self, seq: u64, epoch: u64) -> bool {
        seq == self.latest_seq && epoch == self.epoch
    }

    fn fail(&mut self, err: BrowseError) -> SearchApplied {
        self.results = ResultSet::default();
        SearchApplied::Failed(err)
    }
}

impl Default for SearchSession {
    fn default() -> Self {
        Self::new(paging::DEFAULT_PAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn form(name: &str, year: &str) -> SearchForm {
        SearchForm {
            name: Some(name.to_string()),
            year: Some(year.to_string()),
            ..SearchForm::default()
        }
    }

    fn page(total: i64, size: i64, pages: Option<i64>, current: Option<i64>, n: usize) -> SearchPage {
        SearchPage {
            total: Some(total),
            size: Some(size),
            pages,
            current,
            records: (0..n)
                .map(|i| Record {
                    sys_id: Some(format!("PN-{i}")),
                    ..Record::default()
                })
                .collect(),
        }
    }

    #[test]
    fn blank_inputs_are_unset() {
        let criteria = SearchCriteria::from_form(&form("   ", " 1800 "));
        assert_eq!(criteria.name, None);
        assert_eq!(criteria.year, Some(1800));
        assert_eq!(parse_year(Some("abc")), None);
        assert_eq!(parse_year(Some("-221")), Some(-221));
        assert_eq!(parse_year(Some("")), None);
    }

    #[test]
    fn criteria_search_reconciles_pagination() {
        let mut session = SearchSession::new(10);
        let ticket = session.begin_criteria(&form("Hanoi", "1800"));
        assert_eq!(ticket.query().page, Some(1));
        assert_eq!(ticket.query().limit, Some(10));

        let applied = session.complete_search(&ticket, Ok(page(23, 10, Some(3), Some(1), 10)));
        assert_eq!(applied, SearchApplied::Applied);
        assert_eq!(
            session.pagination(),
            PaginationState {
                page: 0,
                page_size: 10,
                total: 23,
                page_count: 3
            }
        );
        assert_eq!(session.results().records.len(), 10);
        assert_eq!(session.results().origin, ResultOrigin::Criteria);
    }

    #[test]
    fn paging_only_moves_on_success() {
        let mut session = SearchSession::new(10);
        let ticket = session.begin_criteria(&form("Hanoi", ""));
        session.complete_search(&ticket, Ok(page(23, 10, Some(3), Some(1), 10)));

        let next = session.begin_page_change(1).unwrap();
        assert_eq!(next.page, 1);
        assert_eq!(session.pagination().page, 0);

        let failed = session.complete_search(&next, Err(BrowseError::service("boom")));
        assert_eq!(failed, SearchApplied::Failed(BrowseError::service("boom")));
        assert_eq!(session.pagination().page, 0);
        assert_eq!(session.pagination().total, 23);
        assert!(session.results().is_empty());

        let next = session.begin_page_change(1).unwrap();
        session.complete_search(&next, Ok(page(23, 10, Some(3), Some(2), 10)));
        assert_eq!(session.pagination().page, 1);

        assert!(session.begin_page_change(-2).is_none());
        assert!(session.begin_page_change(2).is_none());
    }

    #[test]
    fn superseded_responses_are_stale() {
        let mut session = SearchSession::new(10);
        let slow = session.begin_criteria(&form("Hanoi", ""));
        let fast = session.begin_criteria(&form("Hue", ""));
        assert_eq!(
            session.complete_search(&fast, Ok(page(5, 10, None, None, 5))),
            SearchApplied::Applied
        );
        assert_eq!(
            session.complete_search(&slow, Ok(page(90, 10, None, None, 10))),
            SearchApplied::Stale
        );
        assert_eq!(session.pagination().total, 5);
        assert_eq!(session.criteria().unwrap().name.as_deref(), Some("Hue"));
    }

    #[test]
    fn mode_switch_discards_in_flight_results() {
        let mut session = SearchSession::new(10);
        let ticket = session.begin_criteria(&form("Hanoi", ""));
        assert!(session.switch_mode(SearchMode::Direct));
        assert_eq!(session.focus(), Some(InputField::SysId));
        assert_eq!(
            session.complete_search(&ticket, Ok(page(5, 10, None, None, 5))),
            SearchApplied::Stale
        );
        assert!(session.results().is_empty());
        assert!(session.criteria().is_none());
        assert_eq!(session.pagination(), PaginationState::empty(10));
        assert!(session.begin_page_change(1).is_none());

        session.set_identifier("PN-9");
        assert!(session.switch_mode(SearchMode::Criteria));
        assert_eq!(session.identifier(), "");
        assert!(!session.switch_mode(SearchMode::Criteria));
    }

    #[test]
    fn page_size_changes_restart_from_first_page() {
        let mut session = SearchSession::new(10);
        let ticket = session.begin_criteria(&form("Hanoi", ""));
        session.complete_search(&ticket, Ok(page(95, 10, None, Some(1), 10)));
        let next = session.begin_page_change(1).unwrap();
        session.complete_search(&next, Ok(page(95, 10, None, Some(2), 10)));

        let (change, ticket) = session.begin_page_size_change("11", false);
        assert_eq!(change, PageSizeChange::Stepped(20));
        let ticket = ticket.unwrap();
        assert_eq!((ticket.page, ticket.page_size), (0, 20));
        assert_eq!(session.pagination().page_size, 10);

        session.complete_search(&ticket, Ok(page(95, 20, None, Some(1), 20)));
        assert_eq!(session.pagination().page_size, 20);
        assert_eq!(session.pagination().page_count, 5);

        let (change, ticket) = session.begin_page_size_change("-3", false);
        assert_eq!(change, PageSizeChange::Rejected { revert_to: 20 });
        assert!(ticket.is_none());
    }

    #[test]
    fn direct_lookup_requires_an_identifier() {
        let mut session = SearchSession::new(10);
        session.switch_mode(SearchMode::Direct);
        let err = session.begin_lookup(Some("  ")).unwrap_err();
        assert_eq!(err.field(), Some(InputField::SysId));
        assert_eq!(session.focus(), Some(InputField::SysId));

        let ticket = session.begin_lookup(Some(" PN-7 ")).unwrap();
        assert_eq!(ticket.sys_id, "PN-7");
        let detail = Detail::from_json(json!({"sysId": "PN-7", "nameVn": "Giao Chỉ"})).unwrap();
        assert_eq!(
            session.complete_lookup(&ticket, Ok(&detail)),
            SearchApplied::Applied
        );
        assert_eq!(session.results().total, 1);
        assert_eq!(session.results().origin, ResultOrigin::Direct);
        assert!(session.results().find("PN-7").is_some());
        assert_eq!(
            session.pagination(),
            PaginationState {
                page: 0,
                page_size: 10,
                total: 1,
                page_count: 1
            }
        );
    }

    #[test]
    fn leaving_criteria_mode_drops_its_pagination() {
        let mut session = SearchSession::new(10);
        let ticket = session.begin_criteria(&form("Hanoi", ""));
        session.complete_search(&ticket, Ok(page(23, 10, Some(3), Some(1), 10)));
        assert_eq!(session.pagination().page_count, 3);

        session.switch_mode(SearchMode::Direct);
        assert_eq!(session.pagination(), PaginationState::empty(10));
        assert!(!session.pagination().has_next());

        session.switch_mode(SearchMode::Criteria);
        assert_eq!(session.pagination(), PaginationState::empty(10));
        assert!(session.begin_page_change(1).is_none());
    }
}
