use account_core::auth::codec::TokenCodec;
use account_core::auth::lifecycle::TokenLifecycle;
use account_core::auth::token::{Token, TokenKind};
use account_core::config::TokenConfig;
use account_core::error::AccountError;
use account_core::store::{ExpiringStore, InMemoryStore, StoreService};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

fn lifecycle(store: StoreService, config: TokenConfig) -> TokenLifecycle {
    TokenLifecycle::new(
        store,
        TokenCodec::new("test-secret"),
        config,
        "http://localhost:3000",
    )
}

fn short_lived_pass_config(millis: u64) -> TokenConfig {
    TokenConfig {
        pass_expiry: Some(Duration::from_millis(millis)),
        ..TokenConfig::default()
    }
}

#[tokio::test]
async fn test_issue_then_reuse_within_window() {
    let tokens = lifecycle(StoreService::in_memory(), TokenConfig::default());

    let first = tokens
        .issue_or_reuse("1", TokenKind::Pass)
        .await
        .expect("Failed to issue");
    assert!(!first.reused);

    let second = tokens
        .issue_or_reuse("1", TokenKind::Pass)
        .await
        .expect("Failed to reuse");
    assert!(second.reused);
    assert_eq!(first.token.value, second.token.value);
}

#[tokio::test]
async fn test_distinct_kinds_are_independent_slots() {
    let tokens = lifecycle(StoreService::in_memory(), TokenConfig::default());

    let pass = tokens.issue_or_reuse("1", TokenKind::Pass).await.unwrap();
    let access = tokens.issue_or_reuse("1", TokenKind::Access).await.unwrap();
    assert_ne!(pass.token.value, access.token.value);

    // Consuming one slot leaves the other intact.
    tokens.consume("1", TokenKind::Pass).await.unwrap();
    assert!(tokens.validate(&access.handle).await.is_ok());
}

#[tokio::test]
async fn test_stale_token_is_reissued() {
    let tokens = lifecycle(StoreService::in_memory(), short_lived_pass_config(100));

    let first = tokens.issue_or_reuse("1", TokenKind::Pass).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    let second = tokens.issue_or_reuse("1", TokenKind::Pass).await.unwrap();
    assert!(!second.reused);
    assert_ne!(first.token.value, second.token.value);
}

#[tokio::test]
async fn test_validate_returns_decoded_tuple() {
    let tokens = lifecycle(StoreService::in_memory(), TokenConfig::default());

    let issued = tokens.issue_or_reuse("42", TokenKind::Activation).await.unwrap();
    let decoded = tokens.validate(&issued.handle).await.expect("Failed to validate");

    assert_eq!(decoded.user_id, "42");
    assert_eq!(decoded.kind, TokenKind::Activation);
    assert_eq!(decoded.value, issued.token.value);
}

#[tokio::test]
async fn test_validate_does_not_consume() {
    let tokens = lifecycle(StoreService::in_memory(), TokenConfig::default());

    let issued = tokens.issue_or_reuse("1", TokenKind::Pass).await.unwrap();

    // Validation is repeatable until the caller consumes.
    tokens.validate(&issued.handle).await.expect("first validate");
    tokens.validate(&issued.handle).await.expect("second validate");
}

#[tokio::test]
async fn test_consumed_token_not_found() {
    let tokens = lifecycle(StoreService::in_memory(), TokenConfig::default());

    let issued = tokens.issue_or_reuse("1", TokenKind::Pass).await.unwrap();
    tokens.consume("1", TokenKind::Pass).await.expect("Failed to consume");

    let result = tokens.validate(&issued.handle).await;
    assert!(matches!(result, Err(AccountError::TokenNotFound)));
}

#[tokio::test]
async fn test_validate_and_consume_closes_replay_window() {
    let tokens = lifecycle(StoreService::in_memory(), TokenConfig::default());

    let issued = tokens.issue_or_reuse("1", TokenKind::Access).await.unwrap();

    let decoded = tokens
        .validate_and_consume(&issued.handle)
        .await
        .expect("Failed to validate and consume");
    assert_eq!(decoded.user_id, "1");

    let replay = tokens.validate(&issued.handle).await;
    assert!(matches!(replay, Err(AccountError::TokenNotFound)));
}

#[tokio::test]
async fn test_expired_token_reported_as_expired() {
    let tokens = lifecycle(StoreService::in_memory(), short_lived_pass_config(100));

    let issued = tokens.issue_or_reuse("1", TokenKind::Pass).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    // The record is retained past its validity window, so the failure is
    // TokenExpired rather than TokenNotFound.
    let result = tokens.validate(&issued.handle).await;
    assert!(matches!(result, Err(AccountError::TokenExpired)));
}

#[tokio::test]
async fn test_handle_for_superseded_token_not_found() {
    let store = StoreService::in_memory();
    let tokens = lifecycle(store.clone(), TokenConfig::default());

    let issued = tokens.issue_or_reuse("1", TokenKind::Pass).await.unwrap();

    // Replace the stored token behind the lifecycle's back.
    store
        .set_json("token:pass:1", &Token::generate(16), None)
        .await
        .unwrap();

    let result = tokens.validate(&issued.handle).await;
    assert!(matches!(result, Err(AccountError::TokenNotFound)));
}

#[tokio::test]
async fn test_garbage_handle_is_decode_error() {
    let tokens = lifecycle(StoreService::in_memory(), TokenConfig::default());
    let result = tokens.validate("definitely-not-a-handle").await;
    assert!(matches!(result, Err(AccountError::Decode(_))));
}

#[tokio::test]
async fn test_concurrent_issuance_converges() {
    let tokens = lifecycle(StoreService::in_memory(), TokenConfig::default());

    let mut handles = Vec::new();
    for _ in 0..16 {
        let tokens = tokens.clone();
        handles.push(tokio::spawn(async move {
            tokens.issue_or_reuse("1", TokenKind::Pass).await
        }));
    }

    let mut values = Vec::new();
    for handle in handles {
        values.push(handle.await.unwrap().expect("issuance failed").token.value);
    }
    values.sort();
    values.dedup();
    assert_eq!(values.len(), 1, "concurrent issuers must agree on one token");
}

/// Store wrapper that parks the next conditional delete until released,
/// to pin down a specific interleaving of two issuers.
struct HeldDeleteStore {
    inner: InMemoryStore,
    hold_next_delete: Arc<AtomicBool>,
    release: Arc<Notify>,
}

#[async_trait::async_trait]
impl ExpiringStore for HeldDeleteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AccountError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), AccountError> {
        self.inner.set(key, value, ttl).await
    }

    async fn set_nx(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, AccountError> {
        self.inner.set_nx(key, value, ttl).await
    }

    async fn del(&self, key: &str) -> Result<bool, AccountError> {
        self.inner.del(key).await
    }

    async fn del_if_eq(&self, key: &str, expected: &str) -> Result<bool, AccountError> {
        if self.hold_next_delete.swap(false, Ordering::SeqCst) {
            self.release.notified().await;
        }
        self.inner.del_if_eq(key, expected).await
    }

    async fn exists(&self, key: &str) -> Result<bool, AccountError> {
        self.inner.exists(key).await
    }

    async fn flush(&self) -> Result<(), AccountError> {
        self.inner.flush().await
    }
}

#[tokio::test]
async fn test_interleaved_stale_replacement_converges() {
    let hold_next_delete = Arc::new(AtomicBool::new(false));
    let release = Arc::new(Notify::new());
    let store = StoreService::new(HeldDeleteStore {
        inner: InMemoryStore::new(),
        hold_next_delete: hold_next_delete.clone(),
        release: release.clone(),
    });
    let tokens = lifecycle(store, short_lived_pass_config(200));

    // Seed the slot and let the token go stale (still within retention).
    let stale = tokens.issue_or_reuse("1", TokenKind::Pass).await.unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;

    // Issuer B reads the stale record, then parks just before deleting it.
    hold_next_delete.store(true, Ordering::SeqCst);
    let issuer_b = tokio::spawn({
        let tokens = tokens.clone();
        async move { tokens.issue_or_reuse("1", TokenKind::Pass).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Issuer A replaces the stale record and returns a fresh token.
    let issued_a = tokens
        .issue_or_reuse("1", TokenKind::Pass)
        .await
        .expect("issuer A failed");
    assert_ne!(issued_a.token.value, stale.token.value);

    // B wakes up: its delete must not clobber A's fresh claim.
    release.notify_one();
    let issued_b = issuer_b
        .await
        .expect("issuer B panicked")
        .expect("issuer B failed");

    assert_eq!(issued_a.token.value, issued_b.token.value);
    tokens.validate(&issued_a.handle).await.expect("handle A dead");
    tokens.validate(&issued_b.handle).await.expect("handle B dead");
}

#[tokio::test]
async fn test_link_format() {
    let tokens = lifecycle(StoreService::in_memory(), TokenConfig::default());

    assert_eq!(
        tokens.link("activate", "HANDLE"),
        "http://localhost:3000/activate/HANDLE"
    );
    // Stray slashes on either side collapse.
    assert_eq!(
        tokens.link("/recover-password/", "HANDLE"),
        "http://localhost:3000/recover-password/HANDLE"
    );
}
