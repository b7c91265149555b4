use crate::error::AccountError;

/// Captcha verification, implemented by the host (reCAPTCHA, hCaptcha, ...).
///
/// Gates repeated password-recovery requests and activation resends.
/// `Ok(false)` means the challenge failed; transport problems map to
/// [`AccountError::CaptchaUnavailable`].
#[async_trait::async_trait]
pub trait CaptchaVerifier: Send + Sync {
    async fn verify(&self, response_token: &str) -> Result<bool, AccountError>;
}
