//! Pure `(state, action) → state` transitions.

use serde_json::Value;

use crate::state::model::{
    AppState, ModalKind, Notification, ScheduleEntry, Slice, Sprint, Team, TeamMember, UserSession, View,
};

/// Every change the application can make to its state.
#[derive(Debug, Clone, PartialEq)]
pub enum AppAction {
    SetLoading { slice: Slice, loading: bool },
    SetError { slice: Slice, error: Option<String> },
    ClearErrors,

    OpenModal(ModalKind),
    CloseModal(ModalKind),
    CloseAllModals,

    AddNotification(Notification),
    MarkNotificationRead(String),
    DismissNotification(String),
    ClearNotifications,

    Navigate(View),
    SelectTeam(Option<u64>),
    SelectSprint(Option<u64>),

    SetTeams(Vec<Team>),
    UpsertTeam(Team),
    RemoveTeam(u64),
    SetTeamMembers { team_id: u64, members: Vec<TeamMember> },
    SetSprints(Vec<Sprint>),
    SetCurrentSprint(Option<Sprint>),
    SetSchedule { key: String, entries: Vec<ScheduleEntry> },
    SetDashboard(Option<Value>),

    SetSession(Option<UserSession>),
    SignOut,

    MarkCacheUpdated { key: String, at: u64 },
    MarkCacheStale(String),
    ClearCacheMeta,

    Reset,
}

impl AppAction {
    /// Variant name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            AppAction::SetLoading { .. } => "SetLoading",
            AppAction::SetError { .. } => "SetError",
            AppAction::ClearErrors => "ClearErrors",
            AppAction::OpenModal(_) => "OpenModal",
            AppAction::CloseModal(_) => "CloseModal",
            AppAction::CloseAllModals => "CloseAllModals",
            AppAction::AddNotification(_) => "AddNotification",
            AppAction::MarkNotificationRead(_) => "MarkNotificationRead",
            AppAction::DismissNotification(_) => "DismissNotification",
            AppAction::ClearNotifications => "ClearNotifications",
            AppAction::Navigate(_) => "Navigate",
            AppAction::SelectTeam(_) => "SelectTeam",
            AppAction::SelectSprint(_) => "SelectSprint",
            AppAction::SetTeams(_) => "SetTeams",
            AppAction::UpsertTeam(_) => "UpsertTeam",
            AppAction::RemoveTeam(_) => "RemoveTeam",
            AppAction::SetTeamMembers { .. } => "SetTeamMembers",
            AppAction::SetSprints(_) => "SetSprints",
            AppAction::SetCurrentSprint(_) => "SetCurrentSprint",
            AppAction::SetSchedule { .. } => "SetSchedule",
            AppAction::SetDashboard(_) => "SetDashboard",
            AppAction::SetSession(_) => "SetSession",
            AppAction::SignOut => "SignOut",
            AppAction::MarkCacheUpdated { .. } => "MarkCacheUpdated",
            AppAction::MarkCacheStale(_) => "MarkCacheStale",
            AppAction::ClearCacheMeta => "ClearCacheMeta",
            AppAction::Reset => "Reset",
        }
    }
}

/// Apply `action` to `state`, returning the next state.
///
/// Only the slice named by the action differs between input and output.
pub fn reduce(state: &AppState, action: AppAction) -> AppState {
    let mut next = state.clone();

    match action {
        AppAction::SetLoading { slice, loading } => next.loading.set(slice, loading),
        AppAction::SetError { slice, error } => next.errors.set(slice, error),
        AppAction::ClearErrors => next.errors = Default::default(),

        AppAction::OpenModal(kind) => {
            next.modals.insert(kind);
        }
        AppAction::CloseModal(kind) => {
            next.modals.remove(&kind);
        }
        AppAction::CloseAllModals => next.modals.clear(),

        AppAction::AddNotification(notification) => {
            next.notifications.retain(|n| n.id != notification.id);
            next.notifications.push(notification);
        }
        AppAction::MarkNotificationRead(id) => {
            if let Some(n) = next.notifications.iter_mut().find(|n| n.id == id) {
                n.read = true;
            }
        }
        AppAction::DismissNotification(id) => next.notifications.retain(|n| n.id != id),
        AppAction::ClearNotifications => next.notifications.clear(),

        AppAction::Navigate(view) => next.navigation.current_view = view,
        AppAction::SelectTeam(id) => next.navigation.selected_team_id = id,
        AppAction::SelectSprint(id) => next.navigation.selected_sprint_id = id,

        AppAction::SetTeams(teams) => next.data.teams = teams,
        AppAction::UpsertTeam(team) => match next.data.teams.iter_mut().find(|t| t.id == team.id) {
            Some(existing) => *existing = team,
            None => next.data.teams.push(team),
        },
        AppAction::RemoveTeam(id) => {
            next.data.teams.retain(|t| t.id != id);
            next.data.members.remove(&id);
        }
        AppAction::SetTeamMembers { team_id, members } => {
            next.data.members.insert(team_id, members);
        }
        AppAction::SetSprints(sprints) => next.data.sprints = sprints,
        AppAction::SetCurrentSprint(sprint) => next.data.current_sprint = sprint,
        AppAction::SetSchedule { key, entries } => {
            next.data.schedules.insert(key, entries);
        }
        AppAction::SetDashboard(dashboard) => next.data.dashboard = dashboard,

        AppAction::SetSession(session) => next.session = session,
        // Signing out drops everything fetched on the user's behalf.
        AppAction::SignOut => next = AppState::default(),

        AppAction::MarkCacheUpdated { key, at } => {
            next.cache.stale.remove(&key);
            next.cache.last_updated.insert(key, at);
        }
        AppAction::MarkCacheStale(key) => {
            next.cache.stale.insert(key);
        }
        AppAction::ClearCacheMeta => next.cache = Default::default(),

        AppAction::Reset => next = AppState::default(),
    }

    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::model::NotificationKind;

    fn team(id: u64, name: &str) -> Team {
        Team {
            id,
            name: name.to_string(),
            description: None,
            is_active: true,
        }
    }

    fn note(id: &str) -> Notification {
        Notification {
            id: id.to_string(),
            kind: NotificationKind::Info,
            title: "Saved".to_string(),
            message: "Schedule saved".to_string(),
            read: false,
        }
    }

    #[test]
    fn test_loading_touches_only_its_flag() {
        let state = AppState::default();
        let next = reduce(&state, AppAction::SetLoading { slice: Slice::Teams, loading: true });

        assert!(next.loading.teams);
        assert!(!next.loading.members);
        assert_eq!(next.errors, state.errors);
        assert_eq!(next.data, state.data);
        assert_eq!(state, AppState::default());
    }

    #[test]
    fn test_teams_slice() {
        let state = reduce(&AppState::default(), AppAction::SetTeams(vec![team(1, "Ops"), team(2, "Eng")]));
        let state = reduce(&state, AppAction::UpsertTeam(team(2, "Engineering")));
        let state = reduce(&state, AppAction::UpsertTeam(team(3, "Sales")));
        let state = reduce(
            &state,
            AppAction::SetTeamMembers {
                team_id: 1,
                members: vec![],
            },
        );
        let state = reduce(&state, AppAction::RemoveTeam(1));

        let names: Vec<_> = state.data.teams.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["Engineering", "Sales"]);
        assert!(state.data.members.is_empty());
    }

    #[test]
    fn test_notifications() {
        let state = reduce(&AppState::default(), AppAction::AddNotification(note("a")));
        let state = reduce(&state, AppAction::AddNotification(note("b")));
        let state = reduce(&state, AppAction::AddNotification(note("a")));
        assert_eq!(state.notifications.len(), 2);
        assert_eq!(state.notifications[1].id, "a");

        let state = reduce(&state, AppAction::MarkNotificationRead("b".into()));
        assert!(state.notifications[0].read);

        let state = reduce(&state, AppAction::DismissNotification("b".into()));
        assert_eq!(state.notifications.len(), 1);
    }

    #[test]
    fn test_modals() {
        let state = reduce(&AppState::default(), AppAction::OpenModal(ModalKind::TeamEditor));
        let state = reduce(&state, AppAction::OpenModal(ModalKind::Confirm));
        let state = reduce(&state, AppAction::CloseModal(ModalKind::TeamEditor));
        assert_eq!(state.modals.iter().collect::<Vec<_>>(), [&ModalKind::Confirm]);

        let state = reduce(&state, AppAction::CloseAllModals);
        assert!(state.modals.is_empty());
    }

    #[test]
    fn test_cache_meta() {
        let state = reduce(&AppState::default(), AppAction::MarkCacheStale("teams_all".into()));
        let state = reduce(
            &state,
            AppAction::MarkCacheUpdated {
                key: "teams_all".into(),
                at: 1_700_000_000_000,
            },
        );
        assert!(state.cache.stale.is_empty());
        assert_eq!(state.cache.last_updated.get("teams_all"), Some(&1_700_000_000_000));
    }

    #[test]
    fn test_sign_out_clears_everything() {
        let state = reduce(&AppState::default(), AppAction::SetTeams(vec![team(1, "Ops")]));
        let state = reduce(&state, AppAction::Navigate(View::Teams));
        let state = reduce(&state, AppAction::SignOut);
        assert_eq!(state, AppState::default());
    }
}
