//! In-memory fakes and a ready-made flow harness for tests.
//!
//! ```rust,ignore
//! #[tokio::test]
//! async fn test_register() {
//!     let harness = TestFlow::new();
//!     let registered = harness
//!         .flow
//!         .register(RegisterInput { /* ... */ })
//!         .await
//!         .expect("register");
//!     assert_eq!(harness.mailer.sent().len(), 1);
//! }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Mutex;
use tokio::sync::RwLock;

use crate::auth::flow::AccountAuthFlow;
use crate::auth::password::Argon2Hasher;
use crate::captcha::CaptchaVerifier;
use crate::config::AccountConfig;
use crate::directory::{AccountFlag, NewUser, UserDirectory, UserRecord};
use crate::error::AccountError;
use crate::mailer::{MailTemplate, Mailer};
use crate::store::StoreService;

// ── Directory fake ──

/// In-memory [`UserDirectory`] with sequential ids.
#[derive(Default)]
pub struct MemoryDirectory {
    users: RwLock<HashMap<String, UserRecord>>,
    next_id: AtomicU64,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pre-built record, keyed by its id.
    pub async fn insert(&self, user: UserRecord) {
        self.users.write().await.insert(user.id.clone(), user);
    }

    /// Remove an account outright, as a host-side deletion would.
    pub async fn remove(&self, id: &str) -> Option<UserRecord> {
        self.users.write().await.remove(id)
    }

    pub async fn count(&self) -> usize {
        self.users.read().await.len()
    }
}

#[async_trait::async_trait]
impl UserDirectory for MemoryDirectory {
    async fn find_by_email(
        &self,
        email: &str,
        flag: Option<AccountFlag>,
    ) -> Result<Option<UserRecord>, AccountError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.email == email && flag.is_none_or(|f| u.flag == f))
            .cloned())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, AccountError> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn create(&self, user: NewUser) -> Result<UserRecord, AccountError> {
        let id = format!("{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let record = UserRecord {
            id: id.clone(),
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            flag: user.flag,
            password_hash: user.password_hash,
            created_at: Utc::now(),
            last_login: None,
            extra: Map::new(),
        };
        self.users.write().await.insert(id, record.clone());
        Ok(record)
    }

    async fn update(&self, id: &str, fields: Map<String, Value>) -> Result<(), AccountError> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(id) else {
            return Err(AccountError::AccountNotFound);
        };
        for (key, value) in fields {
            match (key.as_str(), &value) {
                ("first_name", Value::String(s)) => user.first_name = s.clone(),
                ("last_name", Value::String(s)) => user.last_name = s.clone(),
                ("email", Value::String(s)) => user.email = s.clone(),
                _ => {
                    user.extra.insert(key, value);
                }
            }
        }
        Ok(())
    }

    async fn update_password_hash(&self, id: &str, hash: &str) -> Result<(), AccountError> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(id) else {
            return Err(AccountError::AccountNotFound);
        };
        user.password_hash = Some(hash.to_string());
        Ok(())
    }

    async fn set_flag(&self, id: &str, flag: AccountFlag) -> Result<(), AccountError> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(id) else {
            return Err(AccountError::AccountNotFound);
        };
        user.flag = flag;
        Ok(())
    }

    async fn stamp_last_login(&self, id: &str) -> Result<(), AccountError> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(id) else {
            return Err(AccountError::AccountNotFound);
        };
        user.last_login = Some(Utc::now());
        Ok(())
    }
}

// ── Mailer fake ──

/// One delivered mail, as the fake recorded it.
#[derive(Debug, Clone)]
pub struct SentMail {
    pub template: MailTemplate,
    pub context: Value,
    pub recipient: String,
}

/// [`Mailer`] that records every send; can be flipped into a failing mode
/// to exercise the delivery-failure paths.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
    failing: AtomicBool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// All mails sent so far, oldest first.
    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().expect("mailer lock poisoned").clone()
    }

    /// Make every subsequent send fail with a transport error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }
}

#[async_trait::async_trait]
impl Mailer for RecordingMailer {
    async fn send(
        &self,
        template: MailTemplate,
        context: Value,
        recipient: &str,
    ) -> Result<(), AccountError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(AccountError::Mailer("smtp connection refused".to_string()));
        }
        self.sent.lock().expect("mailer lock poisoned").push(SentMail {
            template,
            context,
            recipient: recipient.to_string(),
        });
        Ok(())
    }
}

// ── Captcha fake ──

/// [`CaptchaVerifier`] with a fixed verdict.
pub struct StaticCaptcha {
    verdict: bool,
}

impl StaticCaptcha {
    pub fn passing() -> Self {
        StaticCaptcha { verdict: true }
    }

    pub fn failing() -> Self {
        StaticCaptcha { verdict: false }
    }
}

#[async_trait::async_trait]
impl CaptchaVerifier for StaticCaptcha {
    async fn verify(&self, _response_token: &str) -> Result<bool, AccountError> {
        Ok(self.verdict)
    }
}

// ── Flow harness ──

/// A fully wired [`AccountAuthFlow`] over the in-memory store and fakes,
/// with handles kept open so tests can inspect and manipulate the world
/// behind the flow.
pub struct TestFlow {
    pub flow: AccountAuthFlow,
    pub directory: Arc<MemoryDirectory>,
    pub mailer: Arc<RecordingMailer>,
    pub store: StoreService,
    pub config: AccountConfig,
}

impl TestFlow {
    /// Harness with the default configuration and a passing captcha.
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: AccountConfig) -> Self {
        Self::build(config, true)
    }

    /// Harness whose captcha always rejects.
    pub fn with_failing_captcha(config: AccountConfig) -> Self {
        Self::build(config, false)
    }

    fn build(config: AccountConfig, captcha_passes: bool) -> Self {
        let store = StoreService::in_memory();
        let directory = Arc::new(MemoryDirectory::new());
        let mailer = Arc::new(RecordingMailer::new());
        let captcha: Arc<dyn CaptchaVerifier> = if captcha_passes {
            Arc::new(StaticCaptcha::passing())
        } else {
            Arc::new(StaticCaptcha::failing())
        };

        let flow = AccountAuthFlow::new(
            config.clone(),
            store.clone(),
            directory.clone(),
            Arc::new(Argon2Hasher),
            mailer.clone(),
            captcha,
        );

        TestFlow {
            flow,
            directory,
            mailer,
            store,
            config,
        }
    }
}

impl Default for TestFlow {
    fn default() -> Self {
        Self::new()
    }
}

/// Default test configuration: fixed secret, local base URL.
pub fn test_config() -> AccountConfig {
    AccountConfig {
        secret: "test-secret-key-for-testing".to_string(),
        base_url: "http://localhost:3000".to_string(),
        ..AccountConfig::default()
    }
}
