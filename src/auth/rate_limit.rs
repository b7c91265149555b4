use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::RecoveryConfig;
use crate::error::AccountError;
use crate::store::StoreService;

/// Decision for one more recovery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Under the free quota.
    Allowed,
    /// Admitted only with a verified captcha.
    CaptchaRequired,
    /// Over the hard cap; nothing helps until the window resets.
    Blocked,
}

/// Fixed-window counter for one email address.
#[derive(Debug, Serialize, Deserialize)]
struct AttemptWindow {
    count: u32,
    window_started_at: DateTime<Utc>,
}

fn throttle_key(email: &str) -> String {
    format!("recovery:{}", email.to_lowercase())
}

/// Per-email throttle for password-recovery requests, kept in the same
/// expiring store as the tokens.
///
/// Evaluation and recording are separate so the flow can classify an
/// attempt (and demand a captcha) before doing any work for it.
#[derive(Clone)]
pub struct RecoveryThrottle {
    store: StoreService,
    config: RecoveryConfig,
}

impl RecoveryThrottle {
    pub fn new(store: StoreService, config: RecoveryConfig) -> Self {
        RecoveryThrottle { store, config }
    }

    /// Classify the next attempt without recording it.
    pub async fn evaluate(&self, email: &str) -> Result<Gate, AccountError> {
        let count = self.live_count(email).await?;
        Ok(if count >= self.config.max_attempts {
            Gate::Blocked
        } else if count >= self.config.free_attempts {
            Gate::CaptchaRequired
        } else {
            Gate::Allowed
        })
    }

    /// Count an attempt against the window. The window start is fixed at
    /// the first attempt; the counter resets once the window elapses.
    ///
    /// The read-modify-write is not atomic: concurrent attempts for the
    /// same address may count as one. The throttle tolerates that — it
    /// bounds abuse per window, it is not an exact ledger.
    pub async fn record(&self, email: &str) -> Result<(), AccountError> {
        let key = throttle_key(email);
        let now = Utc::now();
        let window = match self.store.get_json::<AttemptWindow>(&key).await? {
            Some(current) if !self.window_elapsed(&current, now) => AttemptWindow {
                count: current.count + 1,
                window_started_at: current.window_started_at,
            },
            _ => AttemptWindow {
                count: 1,
                window_started_at: now,
            },
        };
        self.store
            .set_json(&key, &window, Some(self.config.window))
            .await
    }

    /// Drop the counter, e.g. after a completed password recovery.
    pub async fn reset(&self, email: &str) -> Result<(), AccountError> {
        self.store.del(&throttle_key(email)).await?;
        Ok(())
    }

    async fn live_count(&self, email: &str) -> Result<u32, AccountError> {
        match self
            .store
            .get_json::<AttemptWindow>(&throttle_key(email))
            .await?
        {
            Some(window) if !self.window_elapsed(&window, Utc::now()) => Ok(window.count),
            _ => Ok(0),
        }
    }

    fn window_elapsed(&self, window: &AttemptWindow, now: DateTime<Utc>) -> bool {
        let span = chrono::Duration::from_std(self.config.window).unwrap_or(chrono::Duration::MAX);
        now.signed_duration_since(window.window_started_at) >= span
    }
}
