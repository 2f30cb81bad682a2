//! Application state tree and the domain records stored in it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMember {
    pub id: u64,
    pub team_id: u64,
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Sprint window; dates are ISO-8601 calendar dates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sprint {
    pub id: u64,
    pub name: String,
    pub start_date: String,
    pub end_date: String,
    #[serde(default)]
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    Available,
    Partial,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub member_id: u64,
    pub date: String,
    pub status: WorkStatus,
    #[serde(default)]
    pub hours: f32,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSession {
    pub user_id: String,
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
    /// Epoch milliseconds.
    pub expires_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub read: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModalKind {
    TeamEditor,
    MemberEditor,
    SprintSettings,
    ScheduleEditor,
    Confirm,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    #[default]
    Dashboard,
    Teams,
    Schedule,
    Sprints,
    ExecutiveDashboard,
    Settings,
}

/// Data slices that carry their own loading flag and error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slice {
    Teams,
    Members,
    Sprints,
    Schedules,
    Dashboard,
    Global,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadingState {
    pub teams: bool,
    pub members: bool,
    pub sprints: bool,
    pub schedules: bool,
    pub dashboard: bool,
    pub global: bool,
}

impl LoadingState {
    pub fn get(&self, slice: Slice) -> bool {
        match slice {
            Slice::Teams => self.teams,
            Slice::Members => self.members,
            Slice::Sprints => self.sprints,
            Slice::Schedules => self.schedules,
            Slice::Dashboard => self.dashboard,
            Slice::Global => self.global,
        }
    }

    pub(crate) fn set(&mut self, slice: Slice, loading: bool) {
        let flag = match slice {
            Slice::Teams => &mut self.teams,
            Slice::Members => &mut self.members,
            Slice::Sprints => &mut self.sprints,
            Slice::Schedules => &mut self.schedules,
            Slice::Dashboard => &mut self.dashboard,
            Slice::Global => &mut self.global,
        };
        *flag = loading;
    }

    pub fn any(&self) -> bool {
        self.teams || self.members || self.sprints || self.schedules || self.dashboard || self.global
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorState {
    pub teams: Option<String>,
    pub members: Option<String>,
    pub sprints: Option<String>,
    pub schedules: Option<String>,
    pub dashboard: Option<String>,
    pub global: Option<String>,
}

impl ErrorState {
    pub fn get(&self, slice: Slice) -> Option<&str> {
        match slice {
            Slice::Teams => self.teams.as_deref(),
            Slice::Members => self.members.as_deref(),
            Slice::Sprints => self.sprints.as_deref(),
            Slice::Schedules => self.schedules.as_deref(),
            Slice::Dashboard => self.dashboard.as_deref(),
            Slice::Global => self.global.as_deref(),
        }
    }

    pub(crate) fn set(&mut self, slice: Slice, error: Option<String>) {
        let slot = match slice {
            Slice::Teams => &mut self.teams,
            Slice::Members => &mut self.members,
            Slice::Sprints => &mut self.sprints,
            Slice::Schedules => &mut self.schedules,
            Slice::Dashboard => &mut self.dashboard,
            Slice::Global => &mut self.global,
        };
        *slot = error;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NavigationState {
    pub current_view: View,
    pub selected_team_id: Option<u64>,
    pub selected_sprint_id: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataState {
    pub teams: Vec<Team>,
    /// Members keyed by team id.
    pub members: BTreeMap<u64, Vec<TeamMember>>,
    pub sprints: Vec<Sprint>,
    pub current_sprint: Option<Sprint>,
    /// Schedule entries keyed by the cache key they were fetched under.
    pub schedules: BTreeMap<String, Vec<ScheduleEntry>>,
    pub dashboard: Option<Value>,
}

/// Bookkeeping about cached data, mirrored for display.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheMeta {
    /// Epoch milliseconds of the last refresh, by cache key.
    pub last_updated: BTreeMap<String, u64>,
    pub stale: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AppState {
    pub loading: LoadingState,
    pub errors: ErrorState,
    pub modals: BTreeSet<ModalKind>,
    pub notifications: Vec<Notification>,
    pub navigation: NavigationState,
    pub data: DataState,
    pub session: Option<UserSession>,
    pub cache: CacheMeta,
}

fn default_true() -> bool {
    true
}
