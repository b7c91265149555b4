use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Purpose a token is issued for. At most one live token exists per
/// `(user, kind)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Email-confirmation token for a pending account.
    Activation,
    /// Password-recovery token.
    Pass,
    /// Email-link login token.
    Access,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Activation => "activation",
            TokenKind::Pass => "pass",
            TokenKind::Access => "access",
        }
    }

    /// Parse the wire form produced by [`TokenKind::as_str`].
    pub fn parse(s: &str) -> Option<TokenKind> {
        match s {
            "activation" => Some(TokenKind::Activation),
            "pass" => Some(TokenKind::Pass),
            "access" => Some(TokenKind::Access),
            _ => None,
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored token: the random secret plus its creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub value: String,
    pub created_at: DateTime<Utc>,
}

impl Token {
    /// Mint a token carrying `value_bytes` of randomness, hex-encoded.
    pub fn generate(value_bytes: usize) -> Self {
        let mut bytes = vec![0u8; value_bytes];
        rand::thread_rng().fill_bytes(&mut bytes);
        Token {
            value: hex::encode(bytes),
            created_at: Utc::now(),
        }
    }

    /// Whether the token is expired at `now` under the given threshold.
    ///
    /// `None` means the kind never expires. The boundary is inclusive: a
    /// token whose age equals the threshold exactly is still live; only
    /// `age > threshold` expires.
    pub fn is_expired(&self, threshold: Option<Duration>, now: DateTime<Utc>) -> bool {
        let Some(threshold) = threshold else {
            return false;
        };
        let threshold =
            chrono::Duration::from_std(threshold).unwrap_or(chrono::Duration::MAX);
        now.signed_duration_since(self.created_at) > threshold
    }
}

/// Storage key for the `(user, kind)` token slot.
pub fn storage_key(kind: TokenKind, user_id: &str) -> String {
    format!("token:{}:{}", kind.as_str(), user_id)
}
