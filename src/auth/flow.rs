use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};
use validator::Validate;

use crate::auth::codec::TokenCodec;
use crate::auth::lifecycle::TokenLifecycle;
use crate::auth::password::PasswordHasher;
use crate::auth::rate_limit::{Gate, RecoveryThrottle};
use crate::auth::session::{SessionManager, UserSession};
use crate::auth::token::TokenKind;
use crate::captcha::CaptchaVerifier;
use crate::config::{AccountConfig, Messages};
use crate::directory::{AccountFlag, NewUser, UserDirectory, UserRecord};
use crate::error::AccountError;
use crate::mailer::{MailTemplate, Mailer};
use crate::store::StoreService;

// ── Inputs ──

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterInput {
    #[validate(email)]
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileInput {
    pub first_name: String,
    pub last_name: String,
}

// ── Outcomes ──

/// Result of a successful registration.
#[derive(Debug)]
pub struct Registered {
    pub user: UserRecord,
    /// The emailed activation link. Hosts must not show it to the caller;
    /// it is exposed for logging and tests.
    pub activation_link: String,
    pub message: String,
}

/// Result of a successful login.
#[derive(Debug)]
pub struct LoggedIn {
    pub session: UserSession,
    /// Where to send the user: the pending redirect if one was set, the
    /// configured default otherwise.
    pub redirect_to: String,
}

/// Result of a successful account activation.
#[derive(Debug)]
pub struct Activated {
    pub session: UserSession,
    pub redirect_to: String,
    pub message: String,
}

/// Result of re-sending the activation link.
#[derive(Debug)]
pub struct ActivationResent {
    pub activation_link: String,
    pub message: String,
}

/// Result of a password-recovery request. The outcome is the same whether
/// or not the account exists, so callers cannot probe for registered
/// addresses.
#[derive(Debug)]
pub struct RecoveryRequested {
    /// Present only when an enabled account matched; never shown to the
    /// caller.
    pub recovery_link: Option<String>,
    pub message: String,
}

/// Result of setting a new password through a recovery link.
#[derive(Debug)]
pub struct PasswordSaved {
    pub session: UserSession,
    pub redirect_to: String,
    pub message: String,
}

/// Result of an authenticated password change.
#[derive(Debug)]
pub struct PasswordChanged {
    pub message: String,
}

/// Result of an authenticated profile update.
#[derive(Debug)]
pub struct ProfileSaved {
    pub user: UserRecord,
    pub message: String,
}

/// Result of issuing an email-link login token.
#[derive(Debug)]
pub struct AccessIssued {
    pub handle: String,
    pub link: String,
}

/// Callback invoked after a session snapshot has been persisted; hosts use
/// it for audit trails or cookie work. Injected explicitly instead of
/// being assumed on some enclosing type.
#[async_trait::async_trait]
pub trait SessionHook: Send + Sync {
    async fn on_session_established(&self, session_id: &str, session: &UserSession);
}

/// The login / registration / activation / password-recovery state machine.
///
/// Consumes [`TokenLifecycle`] and [`SessionManager`] and produces
/// user-facing outcomes. This is the only layer that knows the
/// [`Messages`] catalog; everything below returns typed errors.
pub struct AccountAuthFlow {
    config: AccountConfig,
    messages: Messages,
    directory: Arc<dyn UserDirectory>,
    hasher: Arc<dyn PasswordHasher>,
    mailer: Arc<dyn Mailer>,
    captcha: Arc<dyn CaptchaVerifier>,
    tokens: TokenLifecycle,
    sessions: SessionManager,
    throttle: RecoveryThrottle,
    hook: Option<Arc<dyn SessionHook>>,
}

impl AccountAuthFlow {
    pub fn new(
        config: AccountConfig,
        store: StoreService,
        directory: Arc<dyn UserDirectory>,
        hasher: Arc<dyn PasswordHasher>,
        mailer: Arc<dyn Mailer>,
        captcha: Arc<dyn CaptchaVerifier>,
    ) -> Self {
        let codec = TokenCodec::new(&config.secret);
        let tokens = TokenLifecycle::new(
            store.clone(),
            codec,
            config.token.clone(),
            config.base_url.clone(),
        );
        let sessions = SessionManager::new(store.clone(), directory.clone(), config.session.clone());
        let throttle = RecoveryThrottle::new(store, config.recovery.clone());

        AccountAuthFlow {
            messages: Messages::default(),
            config,
            directory,
            hasher,
            mailer,
            captcha,
            tokens,
            sessions,
            throttle,
            hook: None,
        }
    }

    /// Replace the user-facing copy (e.g. with localized text).
    pub fn with_messages(mut self, messages: Messages) -> Self {
        self.messages = messages;
        self
    }

    /// Install a callback fired after each session establishment.
    pub fn with_session_hook(mut self, hook: Arc<dyn SessionHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// The token lifecycle, for hosts that need to issue or inspect
    /// handles outside the canned flows.
    pub fn tokens(&self) -> &TokenLifecycle {
        &self.tokens
    }

    /// The session manager, for login checks and redirect bookkeeping in
    /// host middleware.
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn messages(&self) -> &Messages {
        &self.messages
    }

    /// Map an error to the copy a host should show.
    pub fn message_for<'a>(&'a self, err: &'a AccountError) -> &'a str {
        self.messages.for_error(err)
    }

    // ── Registration & activation ──

    /// Create a pending account and mail its activation link.
    ///
    /// Mail delivery is best effort: a failed send is logged but does not
    /// fail the registration, because the user can always ask for a
    /// resend.
    pub async fn register(&self, input: RegisterInput) -> Result<Registered, AccountError> {
        input
            .validate()
            .map_err(|e| AccountError::InvalidInput(e.to_string()))?;
        if input.password.chars().count() < self.config.min_password_length {
            return Err(AccountError::PasswordTooShort(self.config.min_password_length));
        }
        let first_name = normalize_optional_name(input.first_name.as_deref())?;
        let last_name = normalize_optional_name(input.last_name.as_deref())?;

        let email = input.email.trim().to_lowercase();
        if self.directory.find_by_email(&email, None).await?.is_some() {
            return Err(AccountError::EmailExists);
        }

        let password_hash = self.hasher.hash(&input.password)?;
        let user = self
            .directory
            .create(NewUser {
                email,
                first_name,
                last_name,
                password_hash: Some(password_hash),
                flag: AccountFlag::Pending,
            })
            .await?;
        info!(user_id = %user.id, "account registered, pending activation");

        let issued = self.tokens.issue_or_reuse(&user.id, TokenKind::Activation).await?;
        let link = self.tokens.link(&self.config.token.activation_uri, &issued.handle);
        if let Err(err) = self
            .mailer
            .send(
                MailTemplate::ActivationLink,
                json!({ "first_name": user.first_name, "link": link }),
                &user.email,
            )
            .await
        {
            error!(user_id = %user.id, %err, "activation mail delivery failed");
        }

        Ok(Registered {
            user,
            activation_link: link,
            message: self.messages.activation_pending.clone(),
        })
    }

    /// Confirm an account from an emailed activation handle, establish its
    /// session, and consume the token.
    pub async fn activate(
        &self,
        session_id: &str,
        handle: &str,
    ) -> Result<Activated, AccountError> {
        let decoded = self.tokens.validate(handle).await?;
        if decoded.kind != TokenKind::Activation {
            warn!(handle, kind = %decoded.kind, "wrong token kind on activation path");
            return Err(AccountError::TokenNotFound);
        }

        let mut user = self
            .directory
            .find_by_id(&decoded.user_id)
            .await?
            .ok_or(AccountError::TokenNotFound)?;
        if user.flag == AccountFlag::Disabled {
            return Err(AccountError::AccountDisabled);
        }

        self.directory.set_flag(&user.id, AccountFlag::Enabled).await?;
        user.flag = AccountFlag::Enabled;
        // The flag flip is durable; the token can go.
        self.tokens.consume(&user.id, TokenKind::Activation).await?;
        info!(user_id = %user.id, "account activated");

        let session = self.establish(session_id, &user, Map::new()).await?;
        let redirect_to = self.sessions.consume_pending_redirect(session_id).await?;
        Ok(Activated {
            session,
            redirect_to,
            message: self.messages.activation_success.clone(),
        })
    }

    /// Re-send the activation link for a pending account. Captcha-gated;
    /// here the mail is the whole point, so a send failure is an error.
    pub async fn resend_activation(
        &self,
        email: &str,
        captcha_response: &str,
    ) -> Result<ActivationResent, AccountError> {
        if !self.captcha.verify(captcha_response).await? {
            return Err(AccountError::CaptchaFailed);
        }

        let email = email.trim().to_lowercase();
        let user = self
            .directory
            .find_by_email(&email, Some(AccountFlag::Pending))
            .await?
            .ok_or(AccountError::AccountNotFound)?;

        let issued = self.tokens.issue_or_reuse(&user.id, TokenKind::Activation).await?;
        let link = self.tokens.link(&self.config.token.activation_uri, &issued.handle);
        self.mailer
            .send(
                MailTemplate::ActivationLink,
                json!({ "first_name": user.first_name, "link": link }),
                &user.email,
            )
            .await?;

        Ok(ActivationResent {
            activation_link: link,
            message: self.messages.activation_pending.clone(),
        })
    }

    // ── Login & logout ──

    /// Log a user in with email and password.
    ///
    /// Unknown email and wrong password are indistinguishable. The
    /// credential is verified before the account flag, so pending/disabled
    /// answers are only ever shown to callers who hold the password.
    pub async fn login(
        &self,
        session_id: &str,
        email: &str,
        password: &str,
    ) -> Result<LoggedIn, AccountError> {
        let email = email.trim().to_lowercase();
        let user = self
            .directory
            .find_by_email(&email, None)
            .await?
            .ok_or(AccountError::AuthFailed)?;
        let Some(digest) = user.password_hash.as_deref() else {
            return Err(AccountError::AuthFailed);
        };
        if !self.hasher.verify(password, digest) {
            debug!(user_id = %user.id, "password mismatch");
            return Err(AccountError::AuthFailed);
        }

        match user.flag {
            AccountFlag::Pending => return Err(AccountError::AccountPending),
            AccountFlag::Disabled => return Err(AccountError::AccountDisabled),
            AccountFlag::Enabled => {}
        }

        self.directory.stamp_last_login(&user.id).await?;
        let session = self.establish(session_id, &user, Map::new()).await?;
        let redirect_to = self.sessions.consume_pending_redirect(session_id).await?;
        info!(user_id = %user.id, "login");
        Ok(LoggedIn {
            session,
            redirect_to,
        })
    }

    /// Log a user in from an emailed access handle. Access tokens are
    /// single-use: the slot is consumed before the session is written.
    pub async fn login_with_handle(
        &self,
        session_id: &str,
        handle: &str,
    ) -> Result<LoggedIn, AccountError> {
        let decoded = self.tokens.validate(handle).await?;
        if decoded.kind != TokenKind::Access {
            warn!(handle, kind = %decoded.kind, "wrong token kind on access path");
            return Err(AccountError::TokenNotFound);
        }

        let user = self
            .directory
            .find_by_id(&decoded.user_id)
            .await?
            .ok_or(AccountError::TokenNotFound)?;
        match user.flag {
            AccountFlag::Pending => return Err(AccountError::AccountPending),
            AccountFlag::Disabled => return Err(AccountError::AccountDisabled),
            AccountFlag::Enabled => {}
        }

        self.tokens.consume(&user.id, TokenKind::Access).await?;
        self.directory.stamp_last_login(&user.id).await?;
        let session = self.establish(session_id, &user, Map::new()).await?;
        let redirect_to = self.sessions.consume_pending_redirect(session_id).await?;
        info!(user_id = %user.id, "login via access handle");
        Ok(LoggedIn {
            session,
            redirect_to,
        })
    }

    /// Issue (or reuse) an email-link login token for an enabled account.
    pub async fn issue_access_handle(&self, email: &str) -> Result<AccessIssued, AccountError> {
        let email = email.trim().to_lowercase();
        let user = self
            .directory
            .find_by_email(&email, Some(AccountFlag::Enabled))
            .await?
            .ok_or(AccountError::AccountNotFound)?;

        let issued = self.tokens.issue_or_reuse(&user.id, TokenKind::Access).await?;
        let link = self.tokens.link(&self.config.token.access_uri, &issued.handle);
        Ok(AccessIssued {
            handle: issued.handle,
            link,
        })
    }

    /// Destroy the session.
    pub async fn logout(&self, session_id: &str) -> Result<(), AccountError> {
        self.sessions.destroy(session_id).await
    }

    // ── Password recovery ──

    /// Request a password-recovery link.
    ///
    /// Throttled per email: after the free attempts a verified captcha is
    /// required, and past the hard cap the request is refused outright.
    /// The attempt is recorded and the outcome is the generic "sent"
    /// message whether or not an enabled account matched, so the endpoint
    /// cannot be used to enumerate addresses.
    pub async fn request_password_reset(
        &self,
        email: &str,
        captcha_response: Option<&str>,
    ) -> Result<RecoveryRequested, AccountError> {
        let email = email.trim().to_lowercase();

        match self.throttle.evaluate(&email).await? {
            Gate::Blocked => return Err(AccountError::RateLimited),
            Gate::CaptchaRequired => match captcha_response {
                Some(response) => {
                    if !self.captcha.verify(response).await? {
                        return Err(AccountError::CaptchaFailed);
                    }
                }
                None => return Err(AccountError::CaptchaRequired),
            },
            Gate::Allowed => {}
        }
        self.throttle.record(&email).await?;

        let Some(user) = self
            .directory
            .find_by_email(&email, Some(AccountFlag::Enabled))
            .await?
        else {
            debug!(%email, "recovery requested for unknown or inactive account");
            return Ok(RecoveryRequested {
                recovery_link: None,
                message: self.messages.recovery_mail_sent.clone(),
            });
        };

        let issued = self.tokens.issue_or_reuse(&user.id, TokenKind::Pass).await?;
        let link = self.tokens.link(&self.config.token.recovery_uri, &issued.handle);
        // A send failure here must not change the response shape, or it
        // would leak which addresses have accounts.
        if let Err(err) = self
            .mailer
            .send(
                MailTemplate::PasswordRecovery,
                json!({ "first_name": user.first_name, "link": link }),
                &user.email,
            )
            .await
        {
            error!(user_id = %user.id, %err, "recovery mail delivery failed");
        }

        Ok(RecoveryRequested {
            recovery_link: Some(link),
            message: self.messages.recovery_mail_sent.clone(),
        })
    }

    /// Set a new password from an emailed recovery handle, then establish
    /// the session. The token is consumed only after the new hash is
    /// durably stored, so a failed write leaves the link usable.
    pub async fn set_new_password(
        &self,
        session_id: &str,
        handle: &str,
        new_password: &str,
    ) -> Result<PasswordSaved, AccountError> {
        let decoded = self.tokens.validate(handle).await?;
        if decoded.kind != TokenKind::Pass {
            warn!(handle, kind = %decoded.kind, "wrong token kind on recovery path");
            return Err(AccountError::TokenNotFound);
        }
        if new_password.chars().count() < self.config.min_password_length {
            return Err(AccountError::PasswordTooShort(self.config.min_password_length));
        }

        let user = self
            .directory
            .find_by_id(&decoded.user_id)
            .await?
            .ok_or(AccountError::TokenNotFound)?;

        let digest = self.hasher.hash(new_password)?;
        self.directory.update_password_hash(&user.id, &digest).await?;
        self.tokens.consume(&user.id, TokenKind::Pass).await?;
        self.throttle.reset(&user.email).await?;
        info!(user_id = %user.id, "password reset completed");

        let session = self.establish(session_id, &user, Map::new()).await?;
        let redirect_to = self.sessions.consume_pending_redirect(session_id).await?;
        Ok(PasswordSaved {
            session,
            redirect_to,
            message: self.messages.new_pass_saved.clone(),
        })
    }

    /// Change the password of the logged-in user.
    ///
    /// The current password is verified before the new one is examined, so
    /// a wrong credential reveals nothing about whether the new password
    /// would have been accepted. Any outstanding recovery token is
    /// consumed along with the change.
    pub async fn change_password(
        &self,
        session_id: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<PasswordChanged, AccountError> {
        let user = self.require_user(session_id).await?;

        if current_password.is_empty() {
            return Err(AccountError::CurrentPasswordMissing);
        }
        let verified = user
            .password_hash
            .as_deref()
            .map(|digest| self.hasher.verify(current_password, digest))
            .unwrap_or(false);
        if !verified {
            return Err(AccountError::CurrentPasswordMismatch);
        }
        if new_password.chars().count() < self.config.min_password_length {
            return Err(AccountError::PasswordTooShort(self.config.min_password_length));
        }
        if new_password == current_password {
            return Err(AccountError::NewPasswordSameAsCurrent);
        }

        let digest = self.hasher.hash(new_password)?;
        self.directory.update_password_hash(&user.id, &digest).await?;
        // The old credential is gone; an outstanding recovery link must
        // not bring it back.
        self.tokens.consume(&user.id, TokenKind::Pass).await?;
        info!(user_id = %user.id, "password changed");

        Ok(PasswordChanged {
            message: self.messages.new_pass_saved.clone(),
        })
    }

    // ── Profile ──

    /// Update the logged-in user's names and merge them into the session
    /// snapshot without re-deriving it.
    pub async fn update_profile(
        &self,
        session_id: &str,
        input: ProfileInput,
    ) -> Result<ProfileSaved, AccountError> {
        let mut user = self.require_user(session_id).await?;

        let first_name = input.first_name.trim();
        let last_name = input.last_name.trim();
        if !valid_name(first_name) || !valid_name(last_name) {
            return Err(AccountError::InvalidName);
        }
        let first_name = title_case(first_name);
        let last_name = title_case(last_name);

        let mut fields = Map::new();
        fields.insert("first_name".to_string(), Value::String(first_name.clone()));
        fields.insert("last_name".to_string(), Value::String(last_name.clone()));
        self.directory.update(&user.id, fields.clone()).await?;
        self.sessions.update(session_id, fields).await?;

        user.first_name = first_name;
        user.last_name = last_name;
        Ok(ProfileSaved {
            user,
            message: self.messages.profile_saved.clone(),
        })
    }

    // ── Internals ──

    async fn establish(
        &self,
        session_id: &str,
        user: &UserRecord,
        extra_claims: Map<String, Value>,
    ) -> Result<UserSession, AccountError> {
        let session = self.sessions.establish(session_id, user, extra_claims).await?;
        if let Some(hook) = &self.hook {
            hook.on_session_established(session_id, &session).await;
        }
        Ok(session)
    }

    /// Resolve the logged-in user behind a session, re-checking that the
    /// account still exists.
    async fn require_user(&self, session_id: &str) -> Result<UserRecord, AccountError> {
        let session = self
            .sessions
            .current(session_id)
            .await?
            .ok_or(AccountError::NotLoggedIn)?;
        if !session.auth || session.id.is_empty() {
            return Err(AccountError::NotLoggedIn);
        }
        self.directory
            .find_by_id(&session.id)
            .await?
            .ok_or(AccountError::NotLoggedIn)
    }
}

/// Name policy: at least three characters, no digits.
fn valid_name(name: &str) -> bool {
    name.chars().count() >= 3 && !name.chars().any(|c| c.is_numeric())
}

/// Stored form of a name: first letter upper-cased, the rest lowered.
fn title_case(name: &str) -> String {
    let lower = name.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => lower,
    }
}

fn normalize_optional_name(raw: Option<&str>) -> Result<String, AccountError> {
    match raw.map(str::trim) {
        Some(name) if !name.is_empty() => {
            if !valid_name(name) {
                return Err(AccountError::InvalidName);
            }
            Ok(title_case(name))
        }
        _ => Ok(String::new()),
    }
}
