use thiserror::Error;

/// Standard error type for the account core.
///
/// Variants are grouped by [`ErrorKind`]: validation failures are surfaced
/// verbatim to the caller, auth failures are deliberately generic where
/// account existence must not leak, token failures all map to a "link
/// expired" experience, and infrastructure failures are the only ones a
/// caller should retry.
#[derive(Debug, Error)]
pub enum AccountError {
    // ── Validation ──
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Password must be at least {0} characters")]
    PasswordTooShort(usize),

    #[error("Current password is required")]
    CurrentPasswordMissing,

    #[error("New password must differ from the current one")]
    NewPasswordSameAsCurrent,

    #[error("Invalid first or last name")]
    InvalidName,

    #[error("An account with this email already exists")]
    EmailExists,

    // ── Auth ──
    #[error("Wrong email or password")]
    AuthFailed,

    #[error("Account is pending activation")]
    AccountPending,

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("Account not found")]
    AccountNotFound,

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Current password does not match")]
    CurrentPasswordMismatch,

    #[error("Captcha verification required")]
    CaptchaRequired,

    #[error("Captcha verification failed")]
    CaptchaFailed,

    #[error("Too many recovery attempts")]
    RateLimited,

    // ── Token ──
    #[error("Token not found")]
    TokenNotFound,

    #[error("Token expired")]
    TokenExpired,

    #[error("Handle decode failed: {0}")]
    Decode(String),

    #[error("Handle encode failed: {0}")]
    Encode(String),

    // ── Infrastructure ──
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Mail delivery failed: {0}")]
    Mailer(String),

    #[error("Captcha verification unavailable: {0}")]
    CaptchaUnavailable(String),

    #[error("Password hashing failed: {0}")]
    Hasher(String),
}

/// Broad classification used for logging policy and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Auth,
    Token,
    Infrastructure,
}

impl AccountError {
    /// Get the classification for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AccountError::InvalidInput(_)
            | AccountError::PasswordTooShort(_)
            | AccountError::CurrentPasswordMissing
            | AccountError::NewPasswordSameAsCurrent
            | AccountError::InvalidName
            | AccountError::EmailExists
            | AccountError::Encode(_) => ErrorKind::Validation,
            AccountError::AuthFailed
            | AccountError::AccountPending
            | AccountError::AccountDisabled
            | AccountError::AccountNotFound
            | AccountError::NotLoggedIn
            | AccountError::CurrentPasswordMismatch
            | AccountError::CaptchaRequired
            | AccountError::CaptchaFailed
            | AccountError::RateLimited => ErrorKind::Auth,
            AccountError::TokenNotFound | AccountError::TokenExpired | AccountError::Decode(_) => {
                ErrorKind::Token
            }
            AccountError::StoreUnavailable(_)
            | AccountError::Mailer(_)
            | AccountError::CaptchaUnavailable(_)
            | AccountError::Hasher(_) => ErrorKind::Infrastructure,
        }
    }

    /// Whether retrying the same request can succeed without user action.
    pub fn retryable(&self) -> bool {
        matches!(self, AccountError::StoreUnavailable(_))
    }

    /// Get the stable error code string for this error.
    pub fn code(&self) -> &'static str {
        match self {
            AccountError::InvalidInput(_) => "INVALID_INPUT",
            AccountError::PasswordTooShort(_) => "PASS_TOO_SHORT",
            AccountError::CurrentPasswordMissing => "CURRENT_PASS_EMPTY",
            AccountError::NewPasswordSameAsCurrent => "NEW_PASS_EQUALS",
            AccountError::InvalidName => "INVALID_NAMES",
            AccountError::EmailExists => "EMAIL_EXISTS",
            AccountError::AuthFailed => "AUTH_FAILED",
            AccountError::AccountPending => "STATE_PENDING",
            AccountError::AccountDisabled => "STATE_DISABLED",
            AccountError::AccountNotFound => "ACCOUNT_NOT_FOUND",
            AccountError::NotLoggedIn => "NOT_LOGGED_IN",
            AccountError::CurrentPasswordMismatch => "PASS_DONT_MATCH",
            AccountError::CaptchaRequired => "CAPTCHA_REQUIRED",
            AccountError::CaptchaFailed => "CAPTCHA_FAILED",
            AccountError::RateLimited => "RATE_LIMITED",
            AccountError::TokenNotFound => "TOKEN_NOT_FOUND",
            AccountError::TokenExpired => "TOKEN_EXPIRED",
            AccountError::Decode(_) => "DECODE_ERROR",
            AccountError::Encode(_) => "ENCODE_ERROR",
            AccountError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            AccountError::Mailer(_) => "MAILER_ERROR",
            AccountError::CaptchaUnavailable(_) => "CAPTCHA_UNAVAILABLE",
            AccountError::Hasher(_) => "HASHER_ERROR",
        }
    }
}
