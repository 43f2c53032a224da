use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// Auth and connectivity flags the routing policy reads. Connectivity
/// starts online; the host feeds it browser/network events.
pub struct Session {
    online: AtomicBool,
    user_id: RwLock<Option<String>>,
}

impl Default for Session {
    fn default() -> Self {
        Session {
            online: AtomicBool::new(true),
            user_id: RwLock::new(None),
        }
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Returns whether the flag actually flipped
    pub fn set_online(&self, online: bool) -> bool {
        self.online.swap(online, Ordering::SeqCst) != online
    }

    pub fn user_id(&self) -> Option<String> {
        self.user_id.read().expect("session lock poisoned").clone()
    }

    pub fn set_user(&self, user_id: &str) {
        *self.user_id.write().expect("session lock poisoned") = Some(user_id.to_string());
    }

    pub fn clear_user(&self) {
        *self.user_id.write().expect("session lock poisoned") = None;
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id().is_some()
    }
}

/// Session state changes published to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    AuthChanged { user_id: Option<String> },
    ConnectivityChanged { online: bool },
    ReplayFinished { applied: usize, failed: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_defaults() {
        let session = Session::new();
        assert!(session.is_online());
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_set_online_reports_transitions() {
        let session = Session::new();
        assert!(!session.set_online(true));
        assert!(session.set_online(false));
        assert!(!session.set_online(false));
        assert!(session.set_online(true));
    }

    #[test]
    fn test_user_lifecycle() {
        let session = Session::new();
        session.set_user("u1");
        assert!(session.is_authenticated());
        assert_eq!(session.user_id().as_deref(), Some("u1"));

        session.clear_user();
        assert!(!session.is_authenticated());
    }
}
