use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::directory::{UserDirectory, UserRecord};
use crate::error::AccountError;
use crate::store::StoreService;

/// The stored session snapshot.
///
/// `claims` is the flattened user record minus the ignored properties,
/// plus whatever extra claims the login path supplied (social-login
/// metadata and the like). `id` and `auth` are protected: session updates
/// cannot overwrite them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSession {
    pub id: String,
    pub auth: bool,
    #[serde(flatten)]
    pub claims: Map<String, Value>,
}

/// Mint an opaque session identifier for a new browser session.
pub fn generate_session_id() -> String {
    Uuid::new_v4().to_string()
}

fn session_key(session_id: &str) -> String {
    format!("session:{}", session_id)
}

fn redirect_key(session_id: &str) -> String {
    format!("session:{}:redirect", session_id)
}

/// Owns the session records in the expiring store. No other component
/// writes session keys.
#[derive(Clone)]
pub struct SessionManager {
    store: StoreService,
    directory: Arc<dyn UserDirectory>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(
        store: StoreService,
        directory: Arc<dyn UserDirectory>,
        config: SessionConfig,
    ) -> Self {
        SessionManager {
            store,
            directory,
            config,
        }
    }

    /// Build and persist the snapshot for a user.
    ///
    /// Takes a flattened copy of the record, strips the ignored properties,
    /// normalizes the identifier to the scalar `id`, and merges
    /// `extra_claims` on top.
    pub async fn establish(
        &self,
        session_id: &str,
        user: &UserRecord,
        extra_claims: Map<String, Value>,
    ) -> Result<UserSession, AccountError> {
        let mut claims = match serde_json::to_value(user).map_err(|e| {
            AccountError::StoreUnavailable(format!("session serialize error: {}", e))
        })? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for ignored in &self.config.ignored_properties {
            claims.remove(ignored);
        }
        // The scalar `id` lives on the session itself.
        claims.remove("id");
        for (key, value) in extra_claims {
            claims.insert(key, value);
        }

        let session = UserSession {
            id: user.id.clone(),
            auth: true,
            claims,
        };
        self.store
            .set_json(&session_key(session_id), &session, self.config.ttl)
            .await?;
        debug!(user_id = %user.id, "session established");
        Ok(session)
    }

    /// Whether the session counts as logged in: `auth` set, an id present,
    /// and the backing account still resolving. A stale snapshot whose
    /// account was deleted is not logged in, whatever the blob says.
    pub async fn is_logged_in(&self, session_id: &str) -> Result<bool, AccountError> {
        let Some(session) = self.current(session_id).await? else {
            return Ok(false);
        };
        if !session.auth || session.id.is_empty() {
            return Ok(false);
        }
        Ok(self.directory.find_by_id(&session.id).await?.is_some())
    }

    /// The raw snapshot, without the directory re-check.
    pub async fn current(&self, session_id: &str) -> Result<Option<UserSession>, AccountError> {
        self.store.get_json(&session_key(session_id)).await
    }

    /// Merge fields into the snapshot without re-deriving it from the
    /// directory. `id` and `auth` cannot be overwritten this way.
    pub async fn update(
        &self,
        session_id: &str,
        partial: Map<String, Value>,
    ) -> Result<(), AccountError> {
        let Some(mut session) = self.current(session_id).await? else {
            return Err(AccountError::NotLoggedIn);
        };
        for (key, value) in partial {
            if key == "id" || key == "auth" {
                continue;
            }
            session.claims.insert(key, value);
        }
        self.store
            .set_json(&session_key(session_id), &session, self.config.ttl)
            .await
    }

    /// Clear the snapshot and any pending redirect.
    pub async fn destroy(&self, session_id: &str) -> Result<(), AccountError> {
        self.store.del(&session_key(session_id)).await?;
        self.store.del(&redirect_key(session_id)).await?;
        debug!(session_id, "session destroyed");
        Ok(())
    }

    /// Remember where to send the user once they have logged in.
    pub async fn set_pending_redirect(
        &self,
        session_id: &str,
        uri: &str,
    ) -> Result<(), AccountError> {
        self.store
            .set(&redirect_key(session_id), uri, self.config.ttl)
            .await
    }

    /// Take the pending redirect, falling back to the configured default.
    pub async fn consume_pending_redirect(
        &self,
        session_id: &str,
    ) -> Result<String, AccountError> {
        let key = redirect_key(session_id);
        match self.store.get(&key).await? {
            Some(uri) => {
                self.store.del(&key).await?;
                Ok(uri)
            }
            None => Ok(self.config.default_redirect.clone()),
        }
    }

    /// Drop the pending redirect without reading it.
    pub async fn clear_pending_redirect(&self, session_id: &str) -> Result<(), AccountError> {
        self.store.del(&redirect_key(session_id)).await?;
        Ok(())
    }
}
