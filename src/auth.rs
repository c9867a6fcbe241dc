use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use tracing::warn;

use crate::api;
use crate::storage::{self, SessionRecord};

/// Drives the token lifecycle: login/register persist a session, a single
/// background timer refreshes it ahead of expiry, logout tears it down.
pub struct Flow {
    client: Arc<api::Client>,
    store: Arc<storage::Store>,
    refresher: Mutex<Option<RefreshHandle>>,
    refresh_skew: Duration,
}

struct RefreshHandle {
    stop: Sender<()>,
    thread: thread::JoinHandle<()>,
}

impl Flow {
    pub fn new(
        client: Arc<api::Client>,
        store: Arc<storage::Store>,
        refresh_skew: Duration,
    ) -> Self {
        Self {
            client,
            store,
            refresher: Mutex::new(None),
            refresh_skew,
        }
    }

    pub fn login(&self, email: &str, password: &str) -> Result<SessionRecord, api::Error> {
        let pair = self.client.login_user(email, password)?;
        let record = SessionRecord {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            email: email.to_string(),
        };
        if let Err(err) = self.store.save_session(&record) {
            warn!("failed to persist session: {err:#}");
        }
        self.start_refresh(pair.expires_in);
        Ok(record)
    }

    /// Register then auto-login with the same credentials.
    pub fn register(&self, email: &str, password: &str) -> Result<SessionRecord, api::Error> {
        self.client.register_user(email, password)?;
        self.login(email, password)
    }

    /// Picks up a persisted session on startup. One refresh attempt renews
    /// the pair and arms the timer; a rejected refresh token clears the
    /// stale session instead.
    pub fn resume(&self) -> Result<bool> {
        if self
            .store
            .load_session()
            .context("auth: load session")?
            .is_none()
        {
            return Ok(false);
        }
        match self.refresh_now() {
            Ok(_) => Ok(true),
            Err(api::Error::SessionExpired) => Ok(false),
            Err(err) => {
                // Offline start keeps the stored session; the next 401 will
                // retry the refresh.
                warn!("session resume refresh failed: {err}");
                Ok(true)
            }
        }
    }

    /// Runs exactly one refresh attempt. A rejected refresh token is
    /// terminal: the local session is cleared before the error is returned.
    pub fn refresh_now(&self) -> Result<String, api::Error> {
        let record = match self.store.load_session() {
            Ok(Some(record)) => record,
            Ok(None) => return Err(api::Error::SessionExpired),
            Err(err) => {
                warn!("failed to read session: {err:#}");
                return Err(api::Error::SessionExpired);
            }
        };

        match self.client.refresh_session(&record.refresh_token) {
            Ok(pair) => {
                let renewed = SessionRecord {
                    access_token: pair.access_token.clone(),
                    refresh_token: pair.refresh_token,
                    email: record.email,
                };
                if let Err(err) = self.store.save_session(&renewed) {
                    warn!("failed to persist refreshed session: {err:#}");
                }
                self.start_refresh(pair.expires_in);
                Ok(pair.access_token)
            }
            Err(api::Error::SessionExpired) => {
                self.clear_local_session();
                Err(api::Error::SessionExpired)
            }
            Err(err) => Err(err),
        }
    }

    /// Best-effort server-side invalidation, then an unconditional local
    /// teardown. Never fails.
    pub fn logout(&self) {
        if let Ok(Some(record)) = self.store.load_session() {
            if let Err(err) = self.client.logout(&record.refresh_token) {
                warn!("server logout failed: {err}");
            }
        }
        self.clear_local_session();
    }

    /// Drops the local session without a server round trip. Used when the
    /// refresh token has already been rejected.
    pub fn force_logout(&self) {
        self.clear_local_session();
    }

    pub fn close(&self) {
        let handle = self.refresher.lock().take();
        if let Some(handle) = handle {
            let _ = handle.stop.send(());
            let _ = handle.thread.join();
        }
    }

    fn clear_local_session(&self) {
        if let Err(err) = self.store.clear_session() {
            warn!("failed to clear session: {err:#}");
        }
        self.cancel_refresh();
    }

    fn cancel_refresh(&self) {
        if let Some(handle) = self.refresher.lock().take() {
            let _ = handle.stop.send(());
        }
    }

    /// Arms the proactive refresh at `expires_in - skew` seconds. At most
    /// one timer exists; rescheduling stops the previous one first. A
    /// non-positive delay skips scheduling entirely.
    fn start_refresh(&self, expires_in: u64) {
        let mut refresher = self.refresher.lock();
        if let Some(existing) = refresher.take() {
            let _ = existing.stop.send(());
        }

        let skew = self.refresh_skew.as_secs();
        let delay = expires_in.saturating_sub(skew);
        if delay == 0 {
            return;
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let client = self.client.clone();
        let store = self.store.clone();

        let handle = thread::spawn(move || {
            let mut wait = Duration::from_secs(delay);
            loop {
                if stop_rx.recv_timeout(wait).is_ok() {
                    break;
                }
                match refresh_once(&client, &store) {
                    Ok(expires_in) => {
                        let next = expires_in.saturating_sub(skew);
                        if next == 0 {
                            break;
                        }
                        wait = Duration::from_secs(next);
                    }
                    Err(err) => {
                        warn!("scheduled token refresh failed: {err}");
                        if let Ok(Some(record)) = store.load_session() {
                            let _ = client.logout(&record.refresh_token);
                        }
                        if let Err(err) = store.clear_session() {
                            warn!("failed to clear session: {err:#}");
                        }
                        break;
                    }
                }
            }
        });

        *refresher = Some(RefreshHandle {
            stop: stop_tx,
            thread: handle,
        });
    }
}

fn refresh_once(client: &api::Client, store: &storage::Store) -> Result<u64, api::Error> {
    let record = store
        .load_session()
        .ok()
        .flatten()
        .ok_or(api::Error::SessionExpired)?;
    let pair = client.refresh_session(&record.refresh_token)?;
    let renewed = SessionRecord {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        email: record.email,
    };
    if let Err(err) = store.save_session(&renewed) {
        warn!("failed to persist refreshed session: {err:#}");
    }
    Ok(pair.expires_in)
}
