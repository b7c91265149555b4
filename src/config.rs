use std::time::Duration;

use crate::auth::token::TokenKind;
use crate::error::AccountError;

/// Library configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AccountConfig {
    /// Secret string the handle-encryption key is derived from. Must stay
    /// stable across the longest token lifetime or outstanding emailed
    /// links become unreadable.
    pub secret: String,

    /// Base URL prepended to emailed links (no trailing slash needed).
    pub base_url: String,

    /// Minimum accepted password length (default: 8).
    pub min_password_length: usize,

    /// Token issuance and expiry policy.
    pub token: TokenConfig,

    /// Session storage policy.
    pub session: SessionConfig,

    /// Password-recovery throttling policy.
    pub recovery: RecoveryConfig,
}

/// Per-kind token policy.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Validity window for activation tokens. `None` means they never
    /// expire; that is the default, so an activation link keeps working
    /// until the account is activated.
    pub activation_expiry: Option<Duration>,

    /// Validity window for password-recovery tokens (default: 1 day).
    pub pass_expiry: Option<Duration>,

    /// Validity window for access tokens (default: 30 days).
    pub access_expiry: Option<Duration>,

    /// Bytes of randomness in a token value; the stored value is the hex
    /// encoding, twice as many characters (default: 16 bytes).
    pub value_bytes: usize,

    /// URI segment for activation links (default: "activate").
    pub activation_uri: String,

    /// URI segment for password-recovery links (default: "recover-password").
    pub recovery_uri: String,

    /// URI segment for access links (default: "access").
    pub access_uri: String,
}

impl TokenConfig {
    /// The configured validity window for a token kind.
    pub fn expiry_for(&self, kind: TokenKind) -> Option<Duration> {
        match kind {
            TokenKind::Activation => self.activation_expiry,
            TokenKind::Pass => self.pass_expiry,
            TokenKind::Access => self.access_expiry,
        }
    }
}

/// Session storage policy.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a session snapshot lives in the store (default: 1 day;
    /// `None` keeps it until destroyed).
    pub ttl: Option<Duration>,

    /// Record fields that must never enter the session snapshot.
    pub ignored_properties: Vec<String>,

    /// Where to send a user after login when no redirect is pending
    /// (default: "account").
    pub default_redirect: String,
}

/// Password-recovery throttling policy.
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Attempts admitted without a captcha (default: 3).
    pub free_attempts: u32,

    /// Hard cap per window; beyond it no captcha helps (default: 10).
    pub max_attempts: u32,

    /// Counting window (default: 6 hours).
    pub window: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        TokenConfig {
            activation_expiry: None,
            pass_expiry: Some(Duration::from_secs(86_400)),
            access_expiry: Some(Duration::from_secs(2_592_000)),
            value_bytes: 16,
            activation_uri: "activate".to_string(),
            recovery_uri: "recover-password".to_string(),
            access_uri: "access".to_string(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            ttl: Some(Duration::from_secs(86_400)),
            ignored_properties: vec!["password_hash".to_string(), "password".to_string()],
            default_redirect: "account".to_string(),
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        RecoveryConfig {
            free_attempts: 3,
            max_attempts: 10,
            window: Duration::from_secs(21_600),
        }
    }
}

impl Default for AccountConfig {
    fn default() -> Self {
        AccountConfig {
            secret: "account-dev-secret-change-me".to_string(),
            base_url: "http://localhost:3000".to_string(),
            min_password_length: 8,
            token: TokenConfig::default(),
            session: SessionConfig::default(),
            recovery: RecoveryConfig::default(),
        }
    }
}

impl AccountConfig {
    /// Load configuration from environment variables (with .env support).
    ///
    /// Expiry values are given in seconds; `0` disables expiry for that
    /// kind (the default for activation tokens).
    pub fn from_env() -> Self {
        // Load .env file if present (ignore errors if missing)
        let _ = dotenvy::dotenv();

        AccountConfig {
            secret: std::env::var("ACCOUNT_SECRET")
                .unwrap_or_else(|_| "account-dev-secret-change-me".to_string()),
            base_url: std::env::var("ACCOUNT_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            min_password_length: std::env::var("ACCOUNT_MIN_PASSWORD_LENGTH")
                .unwrap_or_else(|_| "8".to_string())
                .parse()
                .unwrap_or(8),
            token: TokenConfig {
                activation_expiry: duration_opt(
                    std::env::var("ACCOUNT_ACTIVATION_EXPIRY_SECS")
                        .unwrap_or_else(|_| "0".to_string())
                        .parse()
                        .unwrap_or(0),
                ),
                pass_expiry: duration_opt(
                    std::env::var("ACCOUNT_PASS_EXPIRY_SECS")
                        .unwrap_or_else(|_| "86400".to_string())
                        .parse()
                        .unwrap_or(86_400),
                ),
                access_expiry: duration_opt(
                    std::env::var("ACCOUNT_ACCESS_EXPIRY_SECS")
                        .unwrap_or_else(|_| "2592000".to_string())
                        .parse()
                        .unwrap_or(2_592_000),
                ),
                value_bytes: std::env::var("ACCOUNT_TOKEN_VALUE_BYTES")
                    .unwrap_or_else(|_| "16".to_string())
                    .parse()
                    .unwrap_or(16),
                activation_uri: std::env::var("ACCOUNT_ACTIVATION_URI")
                    .unwrap_or_else(|_| "activate".to_string()),
                recovery_uri: std::env::var("ACCOUNT_RECOVERY_URI")
                    .unwrap_or_else(|_| "recover-password".to_string()),
                access_uri: std::env::var("ACCOUNT_ACCESS_URI")
                    .unwrap_or_else(|_| "access".to_string()),
            },
            session: SessionConfig {
                ttl: duration_opt(
                    std::env::var("ACCOUNT_SESSION_TTL_SECS")
                        .unwrap_or_else(|_| "86400".to_string())
                        .parse()
                        .unwrap_or(86_400),
                ),
                ignored_properties: std::env::var("ACCOUNT_IGNORED_PROPERTIES")
                    .unwrap_or_else(|_| "password_hash,password".to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                default_redirect: std::env::var("ACCOUNT_DEFAULT_REDIRECT")
                    .unwrap_or_else(|_| "account".to_string()),
            },
            recovery: RecoveryConfig {
                free_attempts: std::env::var("ACCOUNT_RECOVERY_FREE_ATTEMPTS")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()
                    .unwrap_or(3),
                max_attempts: std::env::var("ACCOUNT_RECOVERY_MAX_ATTEMPTS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
                window: Duration::from_secs(
                    std::env::var("ACCOUNT_RECOVERY_WINDOW_SECS")
                        .unwrap_or_else(|_| "21600".to_string())
                        .parse()
                        .unwrap_or(21_600),
                ),
            },
        }
    }
}

fn duration_opt(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// User-facing copy produced by the auth flow.
///
/// Kept apart from [`AccountConfig`] so hosts can swap in localized text.
/// The flow is the only layer that touches these strings; everything
/// beneath it returns typed errors.
#[derive(Debug, Clone)]
pub struct Messages {
    pub auth_failed: String,
    pub account_pending: String,
    pub account_disabled: String,
    pub account_not_found: String,
    pub email_exists: String,
    pub activation_success: String,
    pub activation_pending: String,
    pub link_expired: String,
    pub captcha_required: String,
    pub captcha_failed: String,
    pub rate_limited: String,
    pub pass_too_short: String,
    pub current_pass_missing: String,
    pub current_pass_mismatch: String,
    pub new_pass_equals: String,
    pub new_pass_saved: String,
    pub recovery_mail_sent: String,
    pub profile_saved: String,
    pub invalid_names: String,
    pub not_logged_in: String,
    pub service_unavailable: String,
}

impl Default for Messages {
    fn default() -> Self {
        Messages {
            auth_failed: "Wrong email or password.".to_string(),
            account_pending:
                "Your account has not been activated yet. Check your inbox for the activation link."
                    .to_string(),
            account_disabled: "Your account has been disabled. Contact support for details."
                .to_string(),
            account_not_found: "We could not find an account for that email address.".to_string(),
            email_exists: "An account with this email address already exists.".to_string(),
            activation_success: "Your account is now active. Welcome!".to_string(),
            activation_pending:
                "We sent you an activation link. Check your inbox to finish signing up."
                    .to_string(),
            link_expired: "That link is no longer valid. Please request a new one.".to_string(),
            captcha_required: "Please complete the captcha to continue.".to_string(),
            captcha_failed: "Captcha verification failed. Try again.".to_string(),
            rate_limited: "Too many recovery attempts. Try again later.".to_string(),
            pass_too_short: "The password is too short.".to_string(),
            current_pass_missing: "Enter your current password.".to_string(),
            current_pass_mismatch: "Your current password does not match.".to_string(),
            new_pass_equals: "The new password must be different from the current one."
                .to_string(),
            new_pass_saved: "Your new password has been saved.".to_string(),
            recovery_mail_sent:
                "If the email address belongs to an account, a recovery link is on its way."
                    .to_string(),
            profile_saved: "Your profile has been updated.".to_string(),
            invalid_names: "First and last name must be at least 3 letters and contain no digits."
                .to_string(),
            not_logged_in: "You need to sign in to do that.".to_string(),
            service_unavailable: "Something went wrong on our side. Please try again in a moment."
                .to_string(),
        }
    }
}

impl Messages {
    /// Map an error to the copy a host should show. Validation messages
    /// pass through verbatim; token errors all collapse into the expired
    /// link experience; infrastructure errors get the generic retry text.
    pub fn for_error<'a>(&'a self, err: &'a AccountError) -> &'a str {
        match err {
            AccountError::InvalidInput(msg) => msg,
            AccountError::PasswordTooShort(_) => &self.pass_too_short,
            AccountError::CurrentPasswordMissing => &self.current_pass_missing,
            AccountError::NewPasswordSameAsCurrent => &self.new_pass_equals,
            AccountError::InvalidName => &self.invalid_names,
            AccountError::EmailExists => &self.email_exists,
            AccountError::AuthFailed => &self.auth_failed,
            AccountError::AccountPending => &self.account_pending,
            AccountError::AccountDisabled => &self.account_disabled,
            AccountError::AccountNotFound => &self.account_not_found,
            AccountError::NotLoggedIn => &self.not_logged_in,
            AccountError::CurrentPasswordMismatch => &self.current_pass_mismatch,
            AccountError::CaptchaRequired => &self.captcha_required,
            AccountError::CaptchaFailed => &self.captcha_failed,
            AccountError::RateLimited => &self.rate_limited,
            AccountError::TokenNotFound
            | AccountError::TokenExpired
            | AccountError::Decode(_) => &self.link_expired,
            AccountError::Encode(_)
            | AccountError::StoreUnavailable(_)
            | AccountError::Mailer(_)
            | AccountError::CaptchaUnavailable(_)
            | AccountError::Hasher(_) => &self.service_unavailable,
        }
    }
}
