//! Verification code storage
//!
//! In-memory storage for the verifier/subject code exchange with TTL
//! support. A level-0 user requests a code naming a verifier; the verifier
//! reads the code back out-of-band and submits it; a successful match
//! consumes the code and promotes the subject to level 1.

use bson::oid::ObjectId;
use dashmap::DashMap;
use rand::RngCore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Number of random bytes per code (hex-encoded to twice this length)
const CODE_BYTES: usize = 10;

/// A pending verification code
#[derive(Debug, Clone)]
struct CodeEntry {
    /// The level-0 user being verified
    subject: ObjectId,
    /// The verifier the subject named
    verifier: ObjectId,
    /// When this code expires (absolute time)
    expires_at: Instant,
}

/// Concurrent store of pending verification codes, keyed by code string
pub struct VerificationCodeStore {
    codes: DashMap<String, CodeEntry>,
    ttl: Duration,
}

impl VerificationCodeStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            codes: DashMap::new(),
            ttl,
        }
    }

    /// Mint a fresh code binding `subject` to `verifier`.
    ///
    /// Any previous code for the same pair is replaced, so a repeated
    /// request invalidates the old code rather than stacking codes.
    pub fn mint(&self, subject: ObjectId, verifier: ObjectId) -> String {
        self.remove_for(&subject, &verifier);

        let mut bytes = [0u8; CODE_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let code = hex::encode_upper(bytes);

        let entry = CodeEntry {
            subject,
            verifier,
            expires_at: Instant::now() + self.ttl,
        };
        self.codes.insert(code.clone(), entry);
        code
    }

    /// Look up the live code for a (subject, verifier) pair, if any
    pub fn find_for(&self, subject: &ObjectId, verifier: &ObjectId) -> Option<String> {
        let now = Instant::now();
        self.codes
            .iter()
            .find(|entry| {
                entry.subject == *subject && entry.verifier == *verifier && entry.expires_at > now
            })
            .map(|entry| entry.key().clone())
    }

    /// Inspect a live code without consuming it, returning its
    /// (subject, verifier) pair
    pub fn lookup(&self, code: &str) -> Option<(ObjectId, ObjectId)> {
        let entry = self.codes.get(code)?;
        (entry.expires_at > Instant::now()).then_some((entry.subject, entry.verifier))
    }

    /// Drop a code unconditionally
    pub fn remove(&self, code: &str) {
        self.codes.remove(code);
    }

    /// Consume a code submitted by `verifier`, returning the subject it was
    /// minted for. Expired, unknown, or wrong-verifier codes all answer
    /// `None` indistinguishably.
    pub fn consume(&self, code: &str, verifier: &ObjectId) -> Option<ObjectId> {
        let (_, entry) = self.codes.remove_if(code, |_, entry| {
            entry.verifier == *verifier && entry.expires_at > Instant::now()
        })?;
        Some(entry.subject)
    }

    /// Drop every code involving `user`, as subject or verifier. Called on
    /// account deletion.
    pub fn purge_user(&self, user: &ObjectId) {
        self.codes
            .retain(|_, entry| entry.subject != *user && entry.verifier != *user);
    }

    fn remove_for(&self, subject: &ObjectId, verifier: &ObjectId) {
        self.codes
            .retain(|_, entry| !(entry.subject == *subject && entry.verifier == *verifier));
    }

    /// Cleanup expired entries
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let before = self.codes.len();
        self.codes.retain(|_, entry| entry.expires_at > now);
        before - self.codes.len()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// Spawn a background task to periodically cleanup expired codes
pub fn spawn_code_cleanup_task(store: Arc<VerificationCodeStore>) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(60);
        loop {
            tokio::time::sleep(interval).await;
            let removed = store.cleanup();
            if removed > 0 {
                debug!("Code cleanup: removed {} expired codes", removed);
            }
        }
    });
    info!("Verification code cleanup task started");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> VerificationCodeStore {
        VerificationCodeStore::new(Duration::from_secs(60))
    }

    #[test]
    fn test_mint_and_consume() {
        let store = store();
        let subject = ObjectId::new();
        let verifier = ObjectId::new();

        let code = store.mint(subject, verifier);
        assert_eq!(code.len(), CODE_BYTES * 2);
        assert!(code.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(!code.chars().any(|c| c.is_ascii_lowercase()));

        assert_eq!(store.consume(&code, &verifier), Some(subject));
        // Single use
        assert_eq!(store.consume(&code, &verifier), None);
    }

    #[test]
    fn test_wrong_verifier_cannot_consume() {
        let store = store();
        let subject = ObjectId::new();
        let verifier = ObjectId::new();

        let code = store.mint(subject, verifier);
        assert_eq!(store.consume(&code, &ObjectId::new()), None);
        // The code survives a failed attempt
        assert_eq!(store.consume(&code, &verifier), Some(subject));
    }

    #[test]
    fn test_lookup_does_not_consume() {
        let store = store();
        let subject = ObjectId::new();
        let verifier = ObjectId::new();

        let code = store.mint(subject, verifier);
        assert_eq!(store.lookup(&code), Some((subject, verifier)));
        assert_eq!(store.lookup("FFFF"), None);
        assert_eq!(store.consume(&code, &verifier), Some(subject));
        assert_eq!(store.lookup(&code), None);
    }

    #[test]
    fn test_reissue_replaces_previous_code() {
        let store = store();
        let subject = ObjectId::new();
        let verifier = ObjectId::new();

        let first = store.mint(subject, verifier);
        let second = store.mint(subject, verifier);
        assert_ne!(first, second);
        assert_eq!(store.len(), 1);
        assert_eq!(store.consume(&first, &verifier), None);
        assert_eq!(store.consume(&second, &verifier), Some(subject));
    }

    #[test]
    fn test_find_for_pair() {
        let store = store();
        let subject = ObjectId::new();
        let verifier = ObjectId::new();

        assert_eq!(store.find_for(&subject, &verifier), None);
        let code = store.mint(subject, verifier);
        assert_eq!(store.find_for(&subject, &verifier), Some(code));
        assert_eq!(store.find_for(&subject, &ObjectId::new()), None);
    }

    #[test]
    fn test_expired_codes_cleaned_up() {
        let store = VerificationCodeStore::new(Duration::from_millis(0));
        let code = store.mint(ObjectId::new(), ObjectId::new());
        assert_eq!(store.consume(&code, &ObjectId::new()), None);
        assert_eq!(store.cleanup(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_purge_user_drops_both_roles() {
        let store = store();
        let user = ObjectId::new();
        store.mint(user, ObjectId::new());
        store.mint(ObjectId::new(), user);
        store.mint(ObjectId::new(), ObjectId::new());

        store.purge_user(&user);
        assert_eq!(store.len(), 1);
    }
}
