//! Page-size stepping and reconciliation of server page metadata.

use crate::model::SearchPage;
use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
const DECADE: u32 = 10;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum StepDirection {
    Increase,
    Decrease,
}

/// Next page size for a stepper action, snapping to multiples of ten:
/// 1 → 10 → 20 → 30 on the way up, and back down to 1.
pub fn step_page_size(current: u32, direction: StepDirection) -> u32 {
    match direction {
        StepDirection::Increase if current < DECADE => DECADE,
        StepDirection::Increase => (current / DECADE)
            .saturating_mul(DECADE)
            .saturating_add(DECADE),
        StepDirection::Decrease if current <= DECADE => 1,
        StepDirection::Decrease => (current.div_ceil(DECADE) - 1) * DECADE,
    }
}

/// How a page-size edit was interpreted.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PageSizeChange {
    Unchanged,
    /// A stepper event or a ±1 nudge, replaced by the snapped transition.
    Stepped(u32),
    /// A typed value, taken as is.
    Typed(u32),
    /// Unusable input; the field goes back to `revert_to`.
    Rejected { revert_to: u32 },
}

impl PageSizeChange {
    /// The page size to request, when the edit changes anything.
    pub fn target(self) -> Option<u32> {
        match self {
            PageSizeChange::Stepped(size) | PageSizeChange::Typed(size) => Some(size),
            PageSizeChange::Unchanged | PageSizeChange::Rejected { .. } => None,
        }
    }
}

/// Interprets a raw page-size field value against the current size.
///
/// Native number inputs report their increment buttons as a literal ±1 edit;
/// those are recognized and snapped like an explicit stepper event. Non-finite,
/// fractional or non-positive input is rejected.
pub fn resolve_page_size(current: u32, raw: &str, is_stepper_event: bool) -> PageSizeChange {
    let current = current.max(1);
    let Ok(value) = raw.trim().parse::<f64>() else {
        return PageSizeChange::Rejected { revert_to: current };
    };
    if !value.is_finite() || value <= 0.0 || value.fract() != 0.0 || value > f64::from(u32::MAX) {
        return PageSizeChange::Rejected { revert_to: current };
    }
    let delta = value - f64::from(current);
    if delta == 0.0 {
        return PageSizeChange::Unchanged;
    }
    if is_stepper_event || delta.abs() == 1.0 {
        let direction = if delta > 0.0 {
            StepDirection::Increase
        } else {
            StepDirection::Decrease
        };
        let next = step_page_size(current, direction);
        return if next == current {
            PageSizeChange::Unchanged
        } else {
            PageSizeChange::Stepped(next)
        };
    }
    PageSizeChange::Typed(value as u32)
}

/// Consistent page position for a result set.
///
/// Whenever `total > 0`, `page < page_count`; when `total == 0` the page is
/// pinned to zero.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationState {
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub page_count: u32,
}

impl Default for PaginationState {
    fn default() -> Self {
        Self::empty(DEFAULT_PAGE_SIZE)
    }
}

impl PaginationState {
    pub fn empty(page_size: u32) -> Self {
        Self {
            page: 0,
            page_size: page_size.max(1),
            total: 0,
            page_count: 1,
        }
    }

    /// 1-based page number for display, 0 for an empty result set.
    pub fn display_page(&self) -> u32 {
        if self.total == 0 { 0 } else { self.page + 1 }
    }

    pub fn has_previous(&self) -> bool {
        self.total > 0 && self.page > 0
    }

    pub fn has_next(&self) -> bool {
        self.total > 0 && self.page + 1 < self.page_count.max(1)
    }
}

/// Page metadata as reported by the service; any field may be missing.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct PageReport {
    pub total: Option<i64>,
    pub size: Option<i64>,
    pub pages: Option<i64>,
    pub current: Option<i64>,
}

impl From<&SearchPage> for PageReport {
    fn from(page: &SearchPage) -> Self {
        Self {
            total: page.total,
            size: page.size,
            pages: page.pages,
            current: page.current,
        }
    }
}

/// Reconciles the requested position with whatever the service reported.
pub fn reconcile(requested_page: u32, requested_size: u32, report: &PageReport) -> PaginationState {
    let total = report.total.unwrap_or(0).max(0) as u64;
    let page_size = report
        .size
        .filter(|&size| size > 0)
        .map(|size| size.min(i64::from(u32::MAX)) as u32)
        .unwrap_or(requested_size)
        .max(1);
    let page_count = report
        .pages
        .filter(|&pages| pages > 0)
        .map(|pages| pages.min(i64::from(u32::MAX)) as u32)
        .unwrap_or_else(|| derived_page_count(total, page_size));
    let page = if total == 0 {
        0
    } else {
        let requested = normalize_current(report.current, requested_page);
        requested.min(page_count.saturating_sub(1))
    };
    PaginationState {
        page,
        page_size,
        total,
        page_count,
    }
}

fn derived_page_count(total: u64, page_size: u32) -> u32 {
    let pages = total.div_ceil(u64::from(page_size.max(1)));
    pages.clamp(1, u64::from(u32::MAX)) as u32
}

// The service does not document whether `current` is 0- or 1-based; values
// of at least one are read as 1-based and zero as already 0-based.
fn normalize_current(current: Option<i64>, requested_page: u32) -> u32 {
    match current {
        Some(value) if value >= 1 => (value - 1).min(i64::from(u32::MAX)) as u32,
        Some(0) => 0,
        _ => requested_page,
    }
}
