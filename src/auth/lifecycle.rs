use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crate::auth::codec::{DecodedHandle, TokenCodec};
use crate::auth::token::{storage_key, Token, TokenKind};
use crate::config::TokenConfig;
use crate::error::AccountError;
use crate::store::StoreService;

/// Passes through the claim loop before a contended slot is given up on.
const ISSUE_ATTEMPTS: usize = 3;

/// A token slot as returned by issuance.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: Token,
    /// The encrypted URL-safe form for emailed links.
    pub handle: String,
    /// Whether an existing live token was returned instead of a fresh one.
    pub reused: bool,
}

/// Issues, validates, and consumes stored tokens.
///
/// This is the only writer of token records. Validation never deletes;
/// consumption is the caller's explicit commit once the dependent state
/// change (flag flip, password write) has been applied. Callers with no
/// separate commit point use [`TokenLifecycle::validate_and_consume`].
#[derive(Clone)]
pub struct TokenLifecycle {
    store: StoreService,
    codec: TokenCodec,
    config: TokenConfig,
    base_url: String,
}

impl TokenLifecycle {
    pub fn new(
        store: StoreService,
        codec: TokenCodec,
        config: TokenConfig,
        base_url: impl Into<String>,
    ) -> Self {
        TokenLifecycle {
            store,
            codec,
            config,
            base_url: base_url.into(),
        }
    }

    /// Return the live token for `(user_id, kind)`, minting one if the slot
    /// is empty or stale.
    ///
    /// Reuse keeps a previously emailed link valid: asking twice within the
    /// kind's validity window returns the same value. Replacement is a
    /// compare-and-delete of the exact record observed followed by an
    /// atomic set-if-absent, so concurrent issuers for the same slot
    /// converge on one token: a loser can never remove the winner's fresh
    /// claim, only adopt it on the next pass.
    pub async fn issue_or_reuse(
        &self,
        user_id: &str,
        kind: TokenKind,
    ) -> Result<IssuedToken, AccountError> {
        let key = storage_key(kind, user_id);
        let threshold = self.config.expiry_for(kind);

        for _ in 0..ISSUE_ATTEMPTS {
            // Raw read: the stored bytes double as the compare-and-delete
            // witness below.
            if let Some(raw) = self.store.get(&key).await? {
                let existing: Token = serde_json::from_str(&raw).map_err(|e| {
                    AccountError::StoreUnavailable(format!("store deserialize error: {}", e))
                })?;
                if !existing.is_expired(threshold, Utc::now()) {
                    let handle = self.codec.encode(user_id, kind, &existing.value)?;
                    debug!(user_id, kind = %kind, "reusing live token");
                    return Ok(IssuedToken {
                        token: existing,
                        handle,
                        reused: true,
                    });
                }
                // Clear the stale record only if it is still the one we
                // read; a concurrent issuer's fresh claim stays untouched.
                self.store.del_if_eq(&key, &raw).await?;
            }

            let fresh = Token::generate(self.config.value_bytes);
            if self
                .store
                .set_nx_json(&key, &fresh, retention(threshold))
                .await?
            {
                debug!(user_id, kind = %kind, "issued new token");
                let handle = self.codec.encode(user_id, kind, &fresh.value)?;
                return Ok(IssuedToken {
                    token: fresh,
                    handle,
                    reused: false,
                });
            }
            // Lost the claim; the next pass adopts whatever won the slot.
        }

        Err(AccountError::StoreUnavailable(format!(
            "token slot {} contended beyond retry budget",
            key
        )))
    }

    /// Decode a handle and check it against the stored token.
    ///
    /// Never deletes anything: retrying a failed downstream action keeps
    /// working until the caller consumes the slot. Token failures are
    /// logged here with the handle and decoded payload so operators can
    /// diagnose dead links without the user ever seeing the payload.
    pub async fn validate(&self, handle: &str) -> Result<DecodedHandle, AccountError> {
        let decoded = match self.codec.decode(handle) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!(handle, %err, "handle failed to decode");
                return Err(err);
            }
        };

        let key = storage_key(decoded.kind, &decoded.user_id);
        let Some(stored) = self.store.get_json::<Token>(&key).await? else {
            warn!(
                handle,
                user_id = %decoded.user_id,
                kind = %decoded.kind,
                value = %decoded.value,
                "no stored token for handle"
            );
            return Err(AccountError::TokenNotFound);
        };

        if stored.value != decoded.value {
            warn!(
                handle,
                user_id = %decoded.user_id,
                kind = %decoded.kind,
                value = %decoded.value,
                "handle does not match the stored token"
            );
            return Err(AccountError::TokenNotFound);
        }

        if stored.is_expired(self.config.expiry_for(decoded.kind), Utc::now()) {
            warn!(
                handle,
                user_id = %decoded.user_id,
                kind = %decoded.kind,
                created_at = %stored.created_at,
                "token expired"
            );
            return Err(AccountError::TokenExpired);
        }

        Ok(decoded)
    }

    /// Delete the token slot. Call after the dependent state change has
    /// been durably applied; replays of the handle then fail with
    /// [`AccountError::TokenNotFound`].
    pub async fn consume(&self, user_id: &str, kind: TokenKind) -> Result<(), AccountError> {
        self.store.del(&storage_key(kind, user_id)).await?;
        debug!(user_id, kind = %kind, "token consumed");
        Ok(())
    }

    /// Validate and immediately consume, closing the replay window between
    /// the two for callers whose only effect is the session itself.
    pub async fn validate_and_consume(
        &self,
        handle: &str,
    ) -> Result<DecodedHandle, AccountError> {
        let decoded = self.validate(handle).await?;
        self.consume(&decoded.user_id, decoded.kind).await?;
        Ok(decoded)
    }

    /// The emailed link for a handle: `{base_url}/{purpose_uri}/{handle}`.
    pub fn link(&self, purpose_uri: &str, handle: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            purpose_uri.trim_matches('/'),
            handle
        )
    }
}

/// Store TTL for a token slot: records are retained past the validity
/// threshold so a stale link fails with `TokenExpired` instead of the
/// indistinguishable `TokenNotFound`. Non-expiring kinds are kept until
/// consumed.
fn retention(threshold: Option<Duration>) -> Option<Duration> {
    threshold.map(|d| d.saturating_mul(2))
}
