use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::models::user::User;
use crate::storage::{
    MemoryStorage, SessionStorage, StorageError, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY,
};
use crate::utils::jwt;

/// The client's authentication state. Owned by [`CredentialStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credential {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<User>,
}

impl Credential {
    fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.user.is_none()
    }
}

/// Single source of truth for the current session.
///
/// Reads are synchronous. Every mutation is applied in memory, written through to
/// the configured [`SessionStorage`], and announced on the user channel while the
/// state lock is held, so subscribers see changes in mutation order.
///
/// If persistence fails the store switches to a [`MemoryStorage`] holding the
/// current session and stays on it for the rest of its life.
pub struct CredentialStore {
    state: Mutex<Credential>,
    persistence: Mutex<Box<dyn SessionStorage>>,
    durable: AtomicBool,
    user_tx: watch::Sender<Option<User>>,
}

impl CredentialStore {
    /// A store that never touches durable storage.
    pub fn memory() -> Self {
        Self::from_parts(Credential::default(), Box::new(MemoryStorage::new()), false)
    }

    /// Restore whatever session `storage` holds and keep writing through to it.
    #[instrument(skip(storage))]
    pub fn load(storage: Box<dyn SessionStorage>) -> Self {
        match read_persisted(storage.as_ref()) {
            Ok(persisted) => {
                let credential = restore(persisted);
                let store = Self::from_parts(credential.clone(), storage, true);
                if credential.is_empty() {
                    // Leftovers that failed validation must not come back on the next start.
                    store.persist(&credential, clear_persisted);
                } else {
                    info!(user = ?credential.user.as_ref().map(|u| u.id), "Restored persisted session");
                    // Rewrite so a user recovered from token claims is stored too.
                    store.persist(&credential, |s| write_session(s, &credential));
                }
                store
            }
            Err(e) => {
                warn!(error = %e, "Session storage unavailable, keeping session in memory only");
                Self::memory()
            }
        }
    }

    fn from_parts(credential: Credential, storage: Box<dyn SessionStorage>, durable: bool) -> Self {
        let (user_tx, _) = watch::channel(credential.user.clone());
        Self {
            state: Mutex::new(credential),
            persistence: Mutex::new(storage),
            durable: AtomicBool::new(durable),
            user_tx,
        }
    }

    /* ---------- READS ---------- */

    pub fn access_token(&self) -> Option<String> {
        self.state().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.state().refresh_token.clone()
    }

    pub fn user(&self) -> Option<User> {
        self.state().user.clone()
    }

    pub fn snapshot(&self) -> Credential {
        self.state().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().access_token.is_some()
    }

    /// Whether durable storage is still in use.
    pub fn is_persistent(&self) -> bool {
        self.durable.load(Ordering::SeqCst)
    }

    /// Subscribe to the signed-in user. The first item is the current value.
    pub fn observe_user(&self) -> UserStream {
        UserStream {
            rx: self.user_tx.subscribe(),
            primed: false,
        }
    }

    /* ---------- MUTATIONS ---------- */

    /// Replace the whole session.
    #[instrument(skip_all, fields(user_id = %user.id))]
    pub fn set_session(&self, access_token: String, refresh_token: String, user: User) {
        let mut state = self.state();
        *state = Credential {
            access_token: Some(access_token),
            refresh_token: Some(refresh_token),
            user: Some(user),
        };
        let credential = state.clone();
        self.persist(&credential, |s| write_session(s, &credential));
        self.user_tx.send_replace(credential.user);
        info!("Session established");
    }

    /// Swap just the access token. Refresh token and user stay as they are.
    #[instrument(skip_all)]
    pub fn update_access_token(&self, access_token: String) {
        let mut state = self.state();
        state.access_token = Some(access_token.clone());
        self.persist(&state, |s| s.set(ACCESS_TOKEN_KEY, &access_token));
        self.user_tx.send_modify(|_| {});
    }

    /// Replace the stored user of the current session, e.g. after a profile fetch.
    /// Ignored when there is no session to attach it to.
    pub fn update_user(&self, user: User) -> bool {
        let mut state = self.state();
        if state.access_token.is_none() {
            return false;
        }
        state.user = Some(user.clone());
        self.persist(&state, |s| write_user(s, &user));
        self.user_tx.send_replace(Some(user));
        true
    }

    /// Drop the session. Clearing an empty store changes nothing and notifies no one.
    #[instrument(skip_all)]
    pub fn clear(&self) {
        let mut state = self.state();
        if state.is_empty() {
            return;
        }
        *state = Credential::default();
        self.persist(&state, clear_persisted);
        self.user_tx.send_replace(None);
        info!("Session cleared");
    }

    /// Apply a completed refresh exchange, unless the session it was made for is gone.
    ///
    /// A `rotated` refresh token replaces the old one in the same step, so no reader
    /// ever sees the new access token paired with a retired refresh token. Returns
    /// false and leaves the store alone when the refresh token has changed or been
    /// cleared since `exchanged` was read.
    pub(crate) fn apply_refresh(&self, exchanged: &str, access_token: String, rotated: Option<String>) -> bool {
        let mut state = self.state();
        if state.refresh_token.as_deref() != Some(exchanged) {
            return false;
        }
        state.access_token = Some(access_token.clone());
        if let Some(refresh_token) = rotated {
            state.refresh_token = Some(refresh_token);
        }
        let credential = state.clone();
        self.persist(&credential, |s| write_session(s, &credential));
        self.user_tx.send_modify(|_| {});
        true
    }

    /// Clear after a failed exchange, unless a different session has been set meanwhile.
    pub(crate) fn clear_if_refresh_token(&self, exchanged: &str) -> bool {
        let mut state = self.state();
        if state.refresh_token.as_deref() != Some(exchanged) {
            return false;
        }
        *state = Credential::default();
        self.persist(&state, clear_persisted);
        self.user_tx.send_replace(None);
        info!("Session cleared after failed refresh");
        true
    }

    /* ---------- PRIVATE HELPERS ---------- */

    fn state(&self) -> MutexGuard<'_, Credential> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persistence_slot(&self) -> MutexGuard<'_, Box<dyn SessionStorage>> {
        self.persistence.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `op` against the storage. `current` is the state after the mutation and
    /// seeds the in-memory replacement if the storage fails.
    fn persist<F>(&self, current: &Credential, op: F)
    where
        F: FnOnce(&dyn SessionStorage) -> Result<(), StorageError>,
    {
        let mut slot = self.persistence_slot();
        if let Err(e) = op(&**slot) {
            warn!(error = %e, "Session storage failed, continuing in memory only");
            let fallback = MemoryStorage::new();
            if let Err(e) = write_session(&fallback, current) {
                warn!(error = %e, "Could not seed in-memory session storage");
            }
            *slot = Box::new(fallback);
            self.durable.store(false, Ordering::SeqCst);
        }
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::memory()
    }
}

/// Replay-latest view of the signed-in user.
pub struct UserStream {
    rx: watch::Receiver<Option<User>>,
    primed: bool,
}

impl UserStream {
    /// The first call resolves immediately with the current user; later calls wait for
    /// the next change. Returns `None` only once the store itself has been dropped.
    pub async fn next(&mut self) -> Option<Option<User>> {
        if !self.primed {
            self.primed = true;
            return Some(self.rx.borrow_and_update().clone());
        }
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Current value without consuming a change.
    pub fn current(&self) -> Option<User> {
        self.rx.borrow().clone()
    }
}

struct Persisted {
    access_token: Option<String>,
    refresh_token: Option<String>,
    user: Option<String>,
}

fn read_persisted(storage: &dyn SessionStorage) -> Result<Persisted, StorageError> {
    Ok(Persisted {
        access_token: storage.get(ACCESS_TOKEN_KEY)?,
        refresh_token: storage.get(REFRESH_TOKEN_KEY)?,
        user: storage.get(USER_KEY)?,
    })
}

/// Rebuild a session from storage. Anything incomplete is dropped rather than half-restored.
fn restore(persisted: Persisted) -> Credential {
    let Some(access_token) = persisted.access_token.filter(|t| jwt::is_usable_token(t)) else {
        return Credential::default();
    };

    let stored_user = persisted.user.as_deref().and_then(|raw| match serde_json::from_str::<User>(raw) {
        Ok(user) => Some(user),
        Err(e) => {
            warn!(error = %e, "Discarding unreadable stored user");
            None
        }
    });
    let user = stored_user.or_else(|| jwt::peek_claims(&access_token).ok().and_then(|c| c.to_user()));

    match user {
        Some(user) => Credential {
            access_token: Some(access_token),
            refresh_token: persisted.refresh_token.filter(|t| jwt::is_usable_token(t)),
            user: Some(user),
        },
        None => {
            warn!("Stored access token has no recoverable user, discarding session");
            Credential::default()
        }
    }
}

fn write_user(storage: &dyn SessionStorage, user: &User) -> Result<(), StorageError> {
    storage.set(USER_KEY, &serde_json::to_string(user)?)
}

fn write_session(storage: &dyn SessionStorage, credential: &Credential) -> Result<(), StorageError> {
    match &credential.access_token {
        Some(token) => storage.set(ACCESS_TOKEN_KEY, token)?,
        None => storage.remove(ACCESS_TOKEN_KEY)?,
    }
    match &credential.refresh_token {
        Some(token) => storage.set(REFRESH_TOKEN_KEY, token)?,
        None => storage.remove(REFRESH_TOKEN_KEY)?,
    }
    match &credential.user {
        Some(user) => write_user(storage, user),
        None => storage.remove(USER_KEY),
    }
}

fn clear_persisted(storage: &dyn SessionStorage) -> Result<(), StorageError> {
    storage.remove(ACCESS_TOKEN_KEY)?;
    storage.remove(REFRESH_TOKEN_KEY)?;
    storage.remove(USER_KEY)
}
