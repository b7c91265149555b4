use account_core::config::Messages;
use account_core::error::{AccountError, ErrorKind};

#[test]
fn test_kind_classification() {
    assert_eq!(AccountError::EmailExists.kind(), ErrorKind::Validation);
    assert_eq!(
        AccountError::PasswordTooShort(8).kind(),
        ErrorKind::Validation
    );
    assert_eq!(AccountError::AuthFailed.kind(), ErrorKind::Auth);
    assert_eq!(AccountError::AccountPending.kind(), ErrorKind::Auth);
    assert_eq!(AccountError::RateLimited.kind(), ErrorKind::Auth);
    assert_eq!(AccountError::TokenNotFound.kind(), ErrorKind::Token);
    assert_eq!(AccountError::TokenExpired.kind(), ErrorKind::Token);
    assert_eq!(
        AccountError::Decode("bad".to_string()).kind(),
        ErrorKind::Token
    );
    assert_eq!(
        AccountError::StoreUnavailable("down".to_string()).kind(),
        ErrorKind::Infrastructure
    );
    assert_eq!(
        AccountError::Mailer("down".to_string()).kind(),
        ErrorKind::Infrastructure
    );
}

#[test]
fn test_only_store_outage_is_retryable() {
    assert!(AccountError::StoreUnavailable("down".to_string()).retryable());

    assert!(!AccountError::TokenNotFound.retryable());
    assert!(!AccountError::TokenExpired.retryable());
    assert!(!AccountError::AuthFailed.retryable());
    assert!(!AccountError::Mailer("down".to_string()).retryable());
}

#[test]
fn test_stable_codes() {
    assert_eq!(AccountError::NewPasswordSameAsCurrent.code(), "NEW_PASS_EQUALS");
    assert_eq!(AccountError::PasswordTooShort(8).code(), "PASS_TOO_SHORT");
    assert_eq!(AccountError::TokenExpired.code(), "TOKEN_EXPIRED");
    assert_eq!(
        AccountError::StoreUnavailable("down".to_string()).code(),
        "STORE_UNAVAILABLE"
    );
}

#[test]
fn test_token_errors_share_the_expired_link_copy() {
    let messages = Messages::default();

    let not_found = messages.for_error(&AccountError::TokenNotFound);
    let expired = messages.for_error(&AccountError::TokenExpired);
    let decode_err = AccountError::Decode("bit flip".to_string());
    let decode = messages.for_error(&decode_err);

    assert_eq!(not_found, expired);
    assert_eq!(not_found, decode);
    assert_eq!(not_found, &messages.link_expired);
}

#[test]
fn test_infrastructure_errors_get_generic_copy() {
    let messages = Messages::default();

    let store_err = AccountError::StoreUnavailable("down".to_string());
    let store = messages.for_error(&store_err);
    let mailer_err = AccountError::Mailer("down".to_string());
    let mailer = messages.for_error(&mailer_err);
    assert_eq!(store, &messages.service_unavailable);
    assert_eq!(mailer, &messages.service_unavailable);

    // Internal detail never reaches the user-facing copy.
    assert!(!store.contains("down"));
}

#[test]
fn test_validation_input_passes_through_verbatim() {
    let messages = Messages::default();
    let err = AccountError::InvalidInput("email: invalid format".to_string());
    assert_eq!(messages.for_error(&err), "email: invalid format");
}

#[test]
fn test_distinct_password_change_messages() {
    let messages = Messages::default();

    let same = messages.for_error(&AccountError::NewPasswordSameAsCurrent);
    let short = messages.for_error(&AccountError::PasswordTooShort(8));
    let mismatch = messages.for_error(&AccountError::CurrentPasswordMismatch);

    assert_ne!(same, short);
    assert_ne!(same, mismatch);
    assert_ne!(short, mismatch);
}
