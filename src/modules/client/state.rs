use serde::{Deserialize, Serialize};

use crate::modules::auth::{PublicUser, SessionToken};

/// Loading and error flags plus data for one fetch lifecycle
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Fetch<T> {
    pub loading: bool,
    pub error: bool,
    pub data: Option<T>,
}

impl<T> Default for Fetch<T> {
    fn default() -> Self {
        Self {
            loading: false,
            error: false,
            data: None,
        }
    }
}

impl<T> Fetch<T> {
    fn started(self) -> Self {
        Self {
            loading: true,
            error: false,
            data: self.data,
        }
    }

    fn succeeded(data: T) -> Self {
        Self {
            loading: false,
            error: false,
            data: Some(data),
        }
    }

    // A failure discards whatever was loaded before
    fn failed() -> Self {
        Self {
            loading: false,
            error: true,
            data: None,
        }
    }
}

/// Client-side session and UI state
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SessionState {
    pub token: Option<SessionToken>,
    pub user: Option<PublicUser>,
    pub users: Fetch<Vec<PublicUser>>,
    pub user_by_id: Fetch<PublicUser>,
    pub playing: bool,
    pub volume: u8,
    pub dropdown_open: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            token: None,
            user: None,
            users: Fetch::default(),
            user_by_id: Fetch::default(),
            playing: false,
            volume: 50,
            dropdown_open: false,
        }
    }
}

impl SessionState {
    pub fn is_signed_in(&self) -> bool {
        self.token.is_some()
    }
}

/// Every state transition the container understands
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SetToken(Option<SessionToken>),
    SetUser(Option<PublicUser>),
    SetUserAndToken {
        user: PublicUser,
        token: SessionToken,
    },
    SignOut,
    FetchUsersStarted,
    FetchUsersSucceeded(Vec<PublicUser>),
    FetchUsersFailed,
    FetchUserStarted,
    FetchUserSucceeded(PublicUser),
    FetchUserFailed,
    TogglePlay,
    SetVolume(u8),
    ToggleDropdown,
}

impl Action {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Action::SetToken(_) => "set_token",
            Action::SetUser(_) => "set_user",
            Action::SetUserAndToken { .. } => "set_user_and_token",
            Action::SignOut => "sign_out",
            Action::FetchUsersStarted => "fetch_users_started",
            Action::FetchUsersSucceeded(_) => "fetch_users_succeeded",
            Action::FetchUsersFailed => "fetch_users_failed",
            Action::FetchUserStarted => "fetch_user_started",
            Action::FetchUserSucceeded(_) => "fetch_user_succeeded",
            Action::FetchUserFailed => "fetch_user_failed",
            Action::TogglePlay => "toggle_play",
            Action::SetVolume(_) => "set_volume",
            Action::ToggleDropdown => "toggle_dropdown",
        }
    }
}

/// Produce the next state. Pure: the previous state is consumed and replaced.
pub fn reduce(state: SessionState, action: Action) -> SessionState {
    match action {
        Action::SetToken(token) => SessionState { token, ..state },
        Action::SetUser(user) => SessionState { user, ..state },
        Action::SetUserAndToken { user, token } => SessionState {
            user: Some(user),
            token: Some(token),
            ..state
        },
        Action::SignOut => SessionState {
            token: None,
            user: None,
            user_by_id: Fetch::default(),
            ..state
        },
        Action::FetchUsersStarted => SessionState {
            users: state.users.started(),
            ..state
        },
        Action::FetchUsersSucceeded(users) => SessionState {
            users: Fetch::succeeded(users),
            ..state
        },
        Action::FetchUsersFailed => SessionState {
            users: Fetch::failed(),
            ..state
        },
        Action::FetchUserStarted => SessionState {
            user_by_id: state.user_by_id.started(),
            ..state
        },
        Action::FetchUserSucceeded(user) => SessionState {
            user_by_id: Fetch::succeeded(user),
            ..state
        },
        Action::FetchUserFailed => SessionState {
            user_by_id: Fetch::failed(),
            ..state
        },
        Action::TogglePlay => SessionState {
            playing: !state.playing,
            ..state
        },
        Action::SetVolume(volume) => SessionState {
            volume: volume.min(100),
            ..state
        },
        Action::ToggleDropdown => SessionState {
            dropdown_open: !state.dropdown_open,
            ..state
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::auth::Profile;

    fn public_user(id: &str) -> PublicUser {
        PublicUser {
            id: id.to_string(),
            email: format!("{}@example.com", id),
            profile: Profile {
                name: id.to_string(),
                ..Profile::default()
            },
            profile_complete: true,
            verified: true,
            submission: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_sign_in_and_out() {
        let token = SessionToken::parse("p.s");
        let state = reduce(
            SessionState::default(),
            Action::SetUserAndToken {
                user: public_user("alice"),
                token: token.clone(),
            },
        );
        assert!(state.is_signed_in());
        assert_eq!(state.token, Some(token));
        assert_eq!(state.user.as_ref().unwrap().id, "alice");

        let state = reduce(state, Action::SignOut);
        assert!(!state.is_signed_in());
        assert!(state.user.is_none());
    }

    #[test]
    fn test_users_fetch_lifecycle() {
        let state = reduce(SessionState::default(), Action::FetchUsersStarted);
        assert!(state.users.loading);
        assert!(!state.users.error);

        let state = reduce(
            state,
            Action::FetchUsersSucceeded(vec![public_user("a"), public_user("b")]),
        );
        assert!(!state.users.loading);
        assert_eq!(state.users.data.as_ref().unwrap().len(), 2);

        // Refetch keeps the old data visible while loading
        let state = reduce(state, Action::FetchUsersStarted);
        assert!(state.users.loading);
        assert_eq!(state.users.data.as_ref().unwrap().len(), 2);

        // Failure clears it
        let state = reduce(state, Action::FetchUsersFailed);
        assert!(state.users.error);
        assert!(state.users.data.is_none());
    }

    #[test]
    fn test_fetch_lifecycles_are_independent() {
        let state = reduce(SessionState::default(), Action::FetchUsersSucceeded(vec![public_user("a")]));
        let state = reduce(state, Action::FetchUserStarted);
        let state = reduce(state, Action::FetchUserFailed);

        assert!(state.user_by_id.error);
        assert!(state.user_by_id.data.is_none());
        assert!(!state.users.error);
        assert_eq!(state.users.data.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_ui_flags() {
        let state = reduce(SessionState::default(), Action::TogglePlay);
        assert!(state.playing);
        let state = reduce(state, Action::TogglePlay);
        assert!(!state.playing);

        let state = reduce(state, Action::SetVolume(250));
        assert_eq!(state.volume, 100);

        let state = reduce(state, Action::ToggleDropdown);
        assert!(state.dropdown_open);
    }
}
