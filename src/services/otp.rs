//! One-time password storage
//!
//! Six-digit OTPs keyed by account identifier, used for the email-style
//! verification path. Short TTL, single use.

use dashmap::DashMap;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct OtpEntry {
    code: String,
    expires_at: Instant,
}

/// Concurrent store of pending OTPs, keyed by identifier
pub struct OtpStore {
    entries: DashMap<String, OtpEntry>,
    ttl: Duration,
}

impl OtpStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Issue a fresh OTP for `identifier`, replacing any outstanding one
    pub fn issue(&self, identifier: &str) -> String {
        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32));
        let entry = OtpEntry {
            code: code.clone(),
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.insert(identifier.to_string(), entry);
        code
    }

    /// Verify and consume the OTP for `identifier`. A wrong code does not
    /// consume the stored one.
    pub fn verify(&self, identifier: &str, code: &str) -> bool {
        self.entries
            .remove_if(identifier, |_, entry| {
                entry.code == code && entry.expires_at > Instant::now()
            })
            .is_some()
    }

    /// Cleanup expired entries
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Spawn a background task to periodically cleanup expired OTPs
pub fn spawn_otp_cleanup_task(store: Arc<OtpStore>) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(60);
        loop {
            tokio::time::sleep(interval).await;
            let removed = store.cleanup();
            if removed > 0 {
                debug!("OTP cleanup: removed {} expired entries", removed);
            }
        }
    });
    info!("OTP cleanup task started");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_verify() {
        let store = OtpStore::new(Duration::from_secs(60));
        let code = store.issue("user@example.com");
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));

        assert!(store.verify("user@example.com", &code));
        // Single use
        assert!(!store.verify("user@example.com", &code));
    }

    #[test]
    fn test_wrong_code_does_not_consume() {
        let store = OtpStore::new(Duration::from_secs(60));
        let code = store.issue("user@example.com");
        assert!(!store.verify("user@example.com", "000000x"));
        assert!(store.verify("user@example.com", &code));
    }

    #[test]
    fn test_reissue_invalidates_previous() {
        let store = OtpStore::new(Duration::from_secs(60));
        let first = store.issue("user@example.com");
        let second = store.issue("user@example.com");
        if first != second {
            assert!(!store.verify("user@example.com", &first));
        }
        assert!(store.verify("user@example.com", &second));
    }

    #[test]
    fn test_expired_otp_rejected() {
        let store = OtpStore::new(Duration::from_millis(0));
        let code = store.issue("user@example.com");
        assert!(!store.verify("user@example.com", &code));
        assert_eq!(store.cleanup(), 1);
        assert_eq!(store.len(), 0);
    }
}
