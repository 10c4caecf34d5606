use std::sync::RwLock;

/// The signed-in user as reported by the authentication controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub user_name: String,
    pub moderator: bool,
}

/// Capability every mutating operation consults before doing anything.
pub trait AuthProvider: Send + Sync {
    fn current_user(&self) -> Option<CurrentUser>;
    /// Session credential appended to write urls as `sid`.
    fn session_id(&self) -> Option<String>;

    fn is_logged_in(&self) -> bool {
        self.current_user().is_some()
    }
}

#[derive(Debug, Clone)]
struct Session {
    user: CurrentUser,
    sid: String,
}

/// In-process session holder, switched by login/logout notifications.
#[derive(Debug, Default)]
pub struct SessionAuth {
    session: RwLock<Option<Session>>,
}

impl SessionAuth {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn logged_in(user: CurrentUser, sid: impl Into<String>) -> Self {
        let auth = Self::default();
        auth.log_in(user, sid);
        auth
    }

    pub fn log_in(&self, user: CurrentUser, sid: impl Into<String>) {
        let session = Session {
            user,
            sid: sid.into(),
        };
        match self.session.write() {
            Ok(mut guard) => *guard = Some(session),
            Err(poisoned) => *poisoned.into_inner() = Some(session),
        }
    }

    pub fn log_out(&self) {
        match self.session.write() {
            Ok(mut guard) => *guard = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }

    fn read(&self) -> Option<Session> {
        match self.session.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AuthProvider for SessionAuth {
    fn current_user(&self) -> Option<CurrentUser> {
        self.read().map(|session| session.user)
    }

    fn session_id(&self) -> Option<String> {
        self.read().map(|session| session.sid)
    }
}
