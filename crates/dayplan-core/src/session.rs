use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            full_name: None,
        }
    }

    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    SignedOut,
    Loading,
    SignedIn(User),
}

/// Current authentication state. Only a signed-in session exposes a user id;
/// the store treats anything else as "no data".
#[derive(Debug, Clone, Default)]
pub struct Session {
    state: SessionState,
}

impl Session {
    pub fn signed_in(user: User) -> Self {
        Self {
            state: SessionState::SignedIn(user),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn user(&self) -> Option<&User> {
        match &self.state {
            SessionState::SignedIn(user) => Some(user),
            SessionState::SignedOut | SessionState::Loading => None,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user().map(|user| user.id.as_str())
    }

    pub fn is_loading(&self) -> bool {
        self.state == SessionState::Loading
    }

    pub fn begin_loading(&mut self) {
        self.state = SessionState::Loading;
    }

    pub fn sign_in(&mut self, user: User) {
        self.state = SessionState::SignedIn(user);
    }

    pub fn sign_out(&mut self) {
        self.state = SessionState::SignedOut;
    }
}
