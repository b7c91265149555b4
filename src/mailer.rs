use serde_json::Value;

use crate::error::AccountError;

/// Mail templates the auth flow sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailTemplate {
    /// Carries the activation link for a pending account.
    ActivationLink,
    /// Carries the password-recovery link.
    PasswordRecovery,
}

impl MailTemplate {
    pub fn name(&self) -> &'static str {
        match self {
            MailTemplate::ActivationLink => "activation_link",
            MailTemplate::PasswordRecovery => "password_recovery",
        }
    }
}

/// Outbound mail delivery, implemented by the host.
///
/// Delivery is fire-and-forget from the flow's perspective: where the user
/// can recover through an explicit resend action, send failures are logged
/// and swallowed; where the mail is the whole point of the request, they
/// surface as [`AccountError::Mailer`].
#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver a templated mail. `context` holds the template variables
    /// (recipient name, link, ...).
    async fn send(
        &self,
        template: MailTemplate,
        context: Value,
        recipient: &str,
    ) -> Result<(), AccountError>;
}
