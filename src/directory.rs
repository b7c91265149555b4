use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AccountError;

/// Account status flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountFlag {
    /// Created but awaiting email confirmation.
    Pending,
    Enabled,
    Disabled,
}

impl AccountFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountFlag::Pending => "pending",
            AccountFlag::Enabled => "enabled",
            AccountFlag::Disabled => "disabled",
        }
    }
}

impl std::fmt::Display for AccountFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user record as exposed by the backing directory.
///
/// `extra` carries provider-specific fields; they flatten into the session
/// snapshot alongside the named ones. The password hash never reaches a
/// snapshot: it sits on the session manager's ignored list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub flag: AccountFlag,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Fields for creating an account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: Option<String>,
    pub flag: AccountFlag,
}

/// The backing user storage this crate reads and writes accounts through.
///
/// Persistence belongs to the host: a database, an LDAP server, a remote
/// service. Lookup failures are `Ok(None)`; only transport problems map to
/// [`AccountError::StoreUnavailable`].
#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync {
    /// Find an account by email, optionally restricted to one flag.
    async fn find_by_email(
        &self,
        email: &str,
        flag: Option<AccountFlag>,
    ) -> Result<Option<UserRecord>, AccountError>;

    /// Find an account by id.
    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, AccountError>;

    /// Create an account and return the stored record.
    async fn create(&self, user: NewUser) -> Result<UserRecord, AccountError>;

    /// Merge profile fields into an account.
    async fn update(&self, id: &str, fields: Map<String, Value>) -> Result<(), AccountError>;

    /// Replace the password hash.
    async fn update_password_hash(&self, id: &str, hash: &str) -> Result<(), AccountError>;

    /// Move the account to a new status flag.
    async fn set_flag(&self, id: &str, flag: AccountFlag) -> Result<(), AccountError>;

    /// Record a successful login time.
    async fn stamp_last_login(&self, id: &str) -> Result<(), AccountError>;
}
