//! Active record/detail pair, display mode and per-panel placeholders.

use crate::error::BrowseError;
use crate::model::{Detail, Record};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DisplayMode {
    #[default]
    Summary,
    SourceNote,
    Raw,
}

impl DisplayMode {
    pub const ALL: [DisplayMode; 3] = [DisplayMode::Summary, DisplayMode::SourceNote, DisplayMode::Raw];

    pub fn label(self) -> &'static str {
        match self {
            DisplayMode::Summary => "details",
            DisplayMode::SourceNote => "source note",
            DisplayMode::Raw => "raw record",
        }
    }

    fn index(self) -> usize {
        match self {
            DisplayMode::Summary => 0,
            DisplayMode::SourceNote => 1,
            DisplayMode::Raw => 2,
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayMode::Summary => write!(f, "summary"),
            DisplayMode::SourceNote => write!(f, "source"),
            DisplayMode::Raw => write!(f, "raw"),
        }
    }
}

impl std::str::FromStr for DisplayMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "summary" | "basic" | "details" => Ok(DisplayMode::Summary),
            "source" | "source-note" | "sourcenote" => Ok(DisplayMode::SourceNote),
            "raw" | "json" => Ok(DisplayMode::Raw),
            other => Err(format!("unknown display mode {other:?}")),
        }
    }
}

/// What one display surface currently shows. Exactly one variant at a time.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum PanelState {
    #[default]
    Placeholder,
    Loading,
    /// Content rendered from the detail of `sys_id`.
    Ready { sys_id: String },
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
struct Panels([PanelState; 3]);

impl Panels {
    fn get(&self, mode: DisplayMode) -> &PanelState {
        &self.0[mode.index()]
    }

    fn set(&mut self, mode: DisplayMode, state: PanelState) {
        self.0[mode.index()] = state;
    }
}

/// The record and the detail fetched for it, always replaced together.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveView {
    pub record: Record,
    pub detail: Arc<Detail>,
}

impl ActiveView {
    pub fn sys_id(&self) -> &str {
        self.record.key().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ReadySnapshot {
    active: ActiveView,
    mode: DisplayMode,
    panels: Panels,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LoadTarget {
    generation: u64,
    sys_id: String,
    mode: DisplayMode,
}

/// A detail load that has been started but not yet applied.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailTicket {
    generation: u64,
    pub record: Record,
    pub sys_id: String,
    pub mode: DisplayMode,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "phase")]
pub enum ViewPhase<'a> {
    Empty,
    Loading { sys_id: &'a str, mode: DisplayMode },
    Ready { sys_id: &'a str, mode: DisplayMode },
}

/// Result of applying a detail-load outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewApplied {
    Ready,
    /// The load failed and the last ready view was restored.
    RolledBack(BrowseError),
    /// The load failed with nothing to fall back to.
    Cleared(BrowseError),
    /// The user moved on; the outcome was dropped.
    Stale,
}

#[derive(Debug, Clone, Default)]
pub struct ViewCoordinator {
    active: Option<ActiveView>,
    mode: DisplayMode,
    panels: Panels,
    last_ready: Option<ReadySnapshot>,
    target: Option<LoadTarget>,
    generation: u64,
}

impl ViewCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    pub fn active(&self) -> Option<&ActiveView> {
        self.active.as_ref()
    }

    pub fn panel(&self, mode: DisplayMode) -> &PanelState {
        self.panels.get(mode)
    }

    pub fn phase(&self) -> ViewPhase<'_> {
        if let Some(target) = &self.target {
            return ViewPhase::Loading {
                sys_id: &target.sys_id,
                mode: target.mode,
            };
        }
        match &self.active {
            Some(active) => ViewPhase::Ready {
                sys_id: active.sys_id(),
                mode: self.mode,
            },
            None => ViewPhase::Empty,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.target.is_some()
    }

    /// Starts loading `record` into `mode`. Records without a sysId are
    /// ignored. Only the target panel shows a loading placeholder; the
    /// others keep their content.
    pub fn select(&mut self, record: &Record, mode: DisplayMode) -> Option<DetailTicket> {
        let sys_id = record.key()?.to_string();
        self.generation += 1;
        self.mode = mode;
        self.panels.set(mode, PanelState::Loading);
        self.target = Some(LoadTarget {
            generation: self.generation,
            sys_id: sys_id.clone(),
            mode,
        });
        debug!(generation = self.generation, sys_id = %sys_id, %mode, "detail load started");
        Some(DetailTicket {
            generation: self.generation,
            record: record.clone(),
            sys_id,
            mode,
        })
    }

    /// Applies a load outcome if `ticket` is still the current target.
    pub fn complete(
        &mut self,
        ticket: &DetailTicket,
        outcome: Result<Arc<Detail>, BrowseError>,
    ) -> ViewApplied {
        let is_current = self
            .target
            .as_ref()
            .is_some_and(|target| target.generation == ticket.generation);
        if !is_current {
            debug!(
                generation = ticket.generation,
                sys_id = %ticket.sys_id,
                "dropping stale detail response"
            );
            return ViewApplied::Stale;
        }
        self.target = None;

        match outcome {
            Ok(detail) => {
                self.active = Some(ActiveView {
                    record: ticket.record.clone(),
                    detail,
                });
                self.mode = ticket.mode;
                self.panels.set(
                    ticket.mode,
                    PanelState::Ready {
                        sys_id: ticket.sys_id.clone(),
                    },
                );
                self.remember_ready();
                ViewApplied::Ready
            }
            Err(err) => match self.last_ready.clone() {
                Some(snapshot) => {
                    self.active = Some(snapshot.active);
                    self.mode = snapshot.mode;
                    self.panels = snapshot.panels;
                    ViewApplied::RolledBack(err)
                }
                None => {
                    self.reset();
                    ViewApplied::Cleared(err)
                }
            },
        }
    }

    /// Shows another display mode without fetching. Abandons any load in
    /// flight; its detail still lands in the cache.
    pub fn change_mode(&mut self, mode: DisplayMode) {
        if let Some(target) = self.target.take() {
            debug!(generation = target.generation, "detail load abandoned by mode change");
            if let Some(snapshot) = self.last_ready.clone() {
                self.active = Some(snapshot.active);
                self.panels = snapshot.panels;
            } else {
                self.panels.set(target.mode, PanelState::Placeholder);
            }
        }
        self.mode = mode;
        let state = match &self.active {
            Some(active) => PanelState::Ready {
                sys_id: active.sys_id().to_string(),
            },
            None => PanelState::Placeholder,
        };
        self.panels.set(mode, state);
        if self.active.is_some() {
            self.remember_ready();
        }
    }

    /// Clears the active pair and every panel together.
    pub fn reset(&mut self) {
        if self.target.is_some() {
            debug!("detail load abandoned by reset");
        }
        self.active = None;
        self.last_ready = None;
        self.target = None;
        self.mode = DisplayMode::Summary;
        self.panels = Panels::default();
    }

    fn remember_ready(&mut self) {
        if let Some(active) = &self.active {
            self.last_ready = Some(ReadySnapshot {
                active: active.clone(),
                mode: self.mode,
                panels: self.panels.clone(),
            });
        }
    }
}
