//! Short-lived one-time codes.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tracing::info;

use crate::error::Result;

pub const OTP_LENGTH: usize = 6;
pub const DEFAULT_OTP_TTL_SECS: i64 = 300;

#[derive(Debug, Clone)]
struct OtpEntry {
    code: String,
    expires_at: DateTime<Utc>,
}

/// Concurrency-safe map of key to one-time code.
///
/// Expiry is checked lazily on every read, so an entry past its deadline is
/// treated as absent even before [`OtpStore::sweep`] removes it. No
/// background task is involved.
#[derive(Debug)]
pub struct OtpStore {
    entries: Mutex<HashMap<String, OtpEntry>>,
    ttl: Duration,
}

impl OtpStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issues a fresh code for `key`, replacing any previous one.
    pub fn issue(&self, key: &str) -> String {
        self.issue_at(key, Utc::now())
    }

    pub fn issue_at(&self, key: &str, now: DateTime<Utc>) -> String {
        let code = generate_code();
        self.entries().insert(
            key.to_string(),
            OtpEntry {
                code: code.clone(),
                expires_at: now + self.ttl,
            },
        );
        code
    }

    /// Checks `code` against the live entry for `key`.
    ///
    /// A match consumes the entry. A wrong code leaves it in place; an expired
    /// entry is removed and never matches.
    pub fn validate(&self, key: &str, code: &str) -> bool {
        self.validate_at(key, code, Utc::now())
    }

    pub fn validate_at(&self, key: &str, code: &str, now: DateTime<Utc>) -> bool {
        let mut entries = self.entries();
        let Some(entry) = entries.get(key) else {
            return false;
        };
        if now >= entry.expires_at {
            entries.remove(key);
            return false;
        }
        if entry.code != code.trim() {
            return false;
        }
        entries.remove(key);
        true
    }

    /// Removes every expired entry and returns how many were dropped.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| now < entry.expires_at);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, OtpEntry>> {
        // Map stays consistent even if a holder panicked.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for OtpStore {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_OTP_TTL_SECS))
    }
}

fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..OTP_LENGTH)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// Delivers a one-time code to its owner.
#[async_trait]
pub trait OtpSender: Send + Sync {
    async fn send(&self, recipient: &str, code: &str) -> Result<()>;
}

/// Sender that only logs the code. Used where no mail relay is configured.
#[derive(Debug, Clone, Default)]
pub struct LogOtpSender;

#[async_trait]
impl OtpSender for LogOtpSender {
    async fn send(&self, recipient: &str, code: &str) -> Result<()> {
        info!(recipient, code, "Issued RFID registration code");
        Ok(())
    }
}
