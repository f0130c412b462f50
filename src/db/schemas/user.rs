//! User document schema
//!
//! Stores credentials, the trust level that gates posting and moderation,
//! and the user's bookmark list.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::auth::TrustLevel;
use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for users
pub const USER_COLLECTION: &str = "users";

/// Required first character of a user handle
pub const HANDLE_SIGIL: char = '@';

/// User document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct UserDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// User identifier (email-style), unique
    pub identifier: String,

    /// Argon2 password hash
    pub password_hash: String,

    /// Optional unique handle, starts with '@', immutable once set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,

    /// Trust level 0-9, stored as a decimal string
    #[serde(default)]
    pub trust_level: TrustLevel,

    /// Bookmarked post references, owned by this user
    #[serde(default)]
    pub bookmarks: Vec<ObjectId>,
}

impl UserDoc {
    /// Create a new unverified (level 0) user
    pub fn new(identifier: String, password_hash: String) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            identifier,
            password_hash,
            handle: None,
            trust_level: TrustLevel::UNVERIFIED,
            bookmarks: Vec::new(),
        }
    }

    /// Validate a handle: must start with the sigil and have at least one
    /// character after it.
    pub fn is_valid_handle(handle: &str) -> bool {
        let mut chars = handle.chars();
        chars.next() == Some(HANDLE_SIGIL) && chars.next().is_some()
    }
}

impl IntoIndexes for UserDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Unique index on identifier
            (
                doc! { "identifier": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("identifier_unique".to_string())
                        .build(),
                ),
            ),
            // Unique sparse index on handle (optional field)
            (
                doc! { "handle": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .sparse(true)
                        .name("handle_unique".to_string())
                        .build(),
                ),
            ),
            // Trust level for tiered listings
            (
                doc! { "trust_level": 1 },
                Some(
                    IndexOptions::builder()
                        .name("trust_level_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for UserDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_starts_unverified() {
        let user = UserDoc::new("alice@example.com".into(), "$argon2id$...".into());
        assert_eq!(user.trust_level, TrustLevel::UNVERIFIED);
        assert!(user.handle.is_none());
        assert!(user.bookmarks.is_empty());
    }

    #[test]
    fn test_handle_validation() {
        assert!(UserDoc::is_valid_handle("@alice"));
        assert!(UserDoc::is_valid_handle("@a"));
        assert!(!UserDoc::is_valid_handle("alice"));
        assert!(!UserDoc::is_valid_handle("@"));
        assert!(!UserDoc::is_valid_handle(""));
    }

    #[test]
    fn test_trust_level_serializes_as_string() {
        let mut user = UserDoc::new("bob@example.com".into(), "hash".into());
        user.trust_level = TrustLevel::new(7).unwrap();

        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["trust_level"], serde_json::json!("7"));
    }
}
