use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::api::{self, SessionRefresher};
use crate::auth::Flow as AuthFlow;
use crate::storage::{self, SessionRecord, KEY_ACCESS_TOKEN, KEY_USER_EMAIL};

/// Session facade for the rest of the app. Login state is derived from the
/// store so every reader sees the same answer, including after a forced
/// logout from a background thread.
pub struct Manager {
    store: Arc<storage::Store>,
    flow: Arc<AuthFlow>,
}

impl Manager {
    pub fn new(store: Arc<storage::Store>, flow: Arc<AuthFlow>) -> Self {
        Self { store, flow }
    }

    pub fn close(&self) {
        self.flow.close();
    }

    /// Restores a persisted session at startup, if any.
    pub fn load_existing(&self) -> Result<bool> {
        let resumed = self.flow.resume()?;
        if resumed {
            info!(email = ?self.user_email(), "resumed persisted session");
        }
        Ok(resumed)
    }

    pub fn is_logged_in(&self) -> bool {
        matches!(self.store.get_value(KEY_ACCESS_TOKEN), Ok(Some(_)))
    }

    pub fn user_email(&self) -> Option<String> {
        self.store.get_value(KEY_USER_EMAIL).ok().flatten()
    }

    pub fn active(&self) -> Option<SessionRecord> {
        self.store.load_session().ok().flatten()
    }

    pub fn login(&self, email: &str, password: &str) -> Result<SessionRecord, api::Error> {
        self.flow.login(email, password)
    }

    pub fn register(&self, email: &str, password: &str) -> Result<SessionRecord, api::Error> {
        self.flow.register(email, password)
    }

    pub fn logout(&self) {
        self.flow.logout();
    }
}

impl SessionRefresher for Manager {
    fn access_token(&self) -> Option<String> {
        self.store.get_value(KEY_ACCESS_TOKEN).ok().flatten()
    }

    fn refresh_access_token(&self) -> Result<String, api::Error> {
        self.flow.refresh_now()
    }

    fn force_logout(&self) {
        self.flow.force_logout();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Client, ClientConfig};
    use std::time::Duration;
    use tempfile::tempdir;

    fn manager(dir: &tempfile::TempDir) -> (Manager, Arc<storage::Store>) {
        let store = Arc::new(
            storage::Store::open(storage::Options {
                path: Some(dir.path().join("state.db")),
            })
            .unwrap(),
        );
        let client = Arc::new(
            Client::new(ClientConfig {
                user_agent: "cinefyra-test/0.1".into(),
                base_url: None,
                http_client: None,
                rate_limit_backoff: None,
            })
            .unwrap(),
        );
        let flow = Arc::new(AuthFlow::new(
            client,
            store.clone(),
            Duration::from_secs(60),
        ));
        (Manager::new(store.clone(), flow), store)
    }

    #[test]
    fn logged_out_by_default() {
        let dir = tempdir().unwrap();
        let (manager, _store) = manager(&dir);
        assert!(!manager.is_logged_in());
        assert_eq!(manager.user_email(), None);
        assert_eq!(manager.access_token(), None);
        manager.close();
    }

    #[test]
    fn reflects_the_stored_session() {
        let dir = tempdir().unwrap();
        let (manager, store) = manager(&dir);
        store
            .save_session(&SessionRecord {
                access_token: "acc".into(),
                refresh_token: "ref".into(),
                email: "user@example.com".into(),
            })
            .unwrap();
        assert!(manager.is_logged_in());
        assert_eq!(manager.user_email().as_deref(), Some("user@example.com"));
        assert_eq!(manager.access_token().as_deref(), Some("acc"));
        manager.close();
    }

    #[test]
    fn force_logout_clears_the_store() {
        let dir = tempdir().unwrap();
        let (manager, store) = manager(&dir);
        store
            .save_session(&SessionRecord {
                access_token: "acc".into(),
                refresh_token: "ref".into(),
                email: "user@example.com".into(),
            })
            .unwrap();
        manager.force_logout();
        assert!(!manager.is_logged_in());
        assert_eq!(store.load_session().unwrap(), None);
        manager.close();
    }
}
