//! Post document schema and lifecycle status codes
//!
//! Posts move through a staged visibility lifecycle:
//!
//! - `Draft` ("0") — author only, freshly created
//! - `Pending` ("1") — author only, edited and awaiting automatic publication
//! - `Published` ("2") — visible to everyone
//! - `Withdrawn` ("3") — retracted by the author; terminal and immutable
//!
//! Status codes are stored and transmitted as decimal strings for wire
//! compatibility. `created_at` is immutable creation provenance;
//! `status_entered_at` is the state-entry clock the publication sweep reads,
//! reset on every edit.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for posts
pub const POST_COLLECTION: &str = "posts";

/// Post lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum PostStatus {
    #[default]
    Draft,
    Pending,
    Published,
    Withdrawn,
}

impl PostStatus {
    /// Wire/storage code for this status
    pub fn code(&self) -> &'static str {
        match self {
            PostStatus::Draft => "0",
            PostStatus::Pending => "1",
            PostStatus::Published => "2",
            PostStatus::Withdrawn => "3",
        }
    }

    /// Parse a wire/storage code
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "0" => Some(PostStatus::Draft),
            "1" => Some(PostStatus::Pending),
            "2" => Some(PostStatus::Published),
            "3" => Some(PostStatus::Withdrawn),
            _ => None,
        }
    }

    /// Whether the content of a post in this status may still change
    pub fn is_editable(&self) -> bool {
        matches!(self, PostStatus::Draft | PostStatus::Pending)
    }

    /// Whether a post in this status is visible to everyone
    pub fn is_public(&self) -> bool {
        matches!(self, PostStatus::Published | PostStatus::Withdrawn)
    }
}

impl Serialize for PostStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for PostStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        PostStatus::from_code(&code)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid post status code: {}", code)))
    }
}

/// Post document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PostDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Text body, non-empty at creation
    pub content: String,

    /// Author reference, immutable after creation
    pub author: ObjectId,

    /// Creation time, never mutated
    pub created_at: DateTime,

    /// When the current status was entered; reset by edits, read by the sweep
    pub status_entered_at: DateTime,

    /// Lifecycle status, stored as "0".."3"
    #[serde(default)]
    pub status: PostStatus,
}

impl Default for PostDoc {
    fn default() -> Self {
        Self {
            _id: None,
            metadata: Metadata::default(),
            content: String::new(),
            author: ObjectId::new(),
            created_at: DateTime::now(),
            status_entered_at: DateTime::now(),
            status: PostStatus::Draft,
        }
    }
}

impl PostDoc {
    /// Create a new post in the author's chosen initial status
    pub fn new(content: String, author: ObjectId, status: PostStatus) -> Self {
        let now = DateTime::now();
        Self {
            _id: None,
            metadata: Metadata::new(),
            content,
            author,
            created_at: now,
            status_entered_at: now,
            status,
        }
    }

    /// Apply an edit: replace content, move to Pending, restart the
    /// publication clock. Callers must have checked `status.is_editable()`.
    pub fn apply_edit(&mut self, content: String, now: DateTime) {
        self.content = content;
        self.status = PostStatus::Pending;
        self.status_entered_at = now;
    }
}

impl IntoIndexes for PostDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Author feeds
            (
                doc! { "author": 1, "created_at": -1 },
                Some(
                    IndexOptions::builder()
                        .name("author_created_index".to_string())
                        .build(),
                ),
            ),
            // Publication sweep: status + state-entry clock
            (
                doc! { "status": 1, "status_entered_at": 1 },
                Some(
                    IndexOptions::builder()
                        .name("status_clock_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for PostDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_round_trip() {
        for status in [
            PostStatus::Draft,
            PostStatus::Pending,
            PostStatus::Published,
            PostStatus::Withdrawn,
        ] {
            assert_eq!(PostStatus::from_code(status.code()), Some(status));
        }
    }

    #[test]
    fn test_invalid_status_codes_rejected() {
        assert_eq!(PostStatus::from_code("4"), None);
        assert_eq!(PostStatus::from_code(""), None);
        assert_eq!(PostStatus::from_code("draft"), None);
        assert_eq!(PostStatus::from_code("01"), None);
    }

    #[test]
    fn test_status_serializes_as_string_code() {
        let json = serde_json::to_string(&PostStatus::Published).unwrap();
        assert_eq!(json, "\"2\"");

        let parsed: PostStatus = serde_json::from_str("\"3\"").unwrap();
        assert_eq!(parsed, PostStatus::Withdrawn);

        assert!(serde_json::from_str::<PostStatus>("\"9\"").is_err());
    }

    #[test]
    fn test_editable_and_public_are_disjoint() {
        for status in [
            PostStatus::Draft,
            PostStatus::Pending,
            PostStatus::Published,
            PostStatus::Withdrawn,
        ] {
            assert_ne!(status.is_editable(), status.is_public());
        }
    }

    #[test]
    fn test_apply_edit_resets_clock_and_sets_pending() {
        let author = ObjectId::new();

        for initial in [PostStatus::Draft, PostStatus::Pending] {
            let mut post = PostDoc::new("hello".into(), author, initial);
            let created_at = post.created_at;

            let later = DateTime::from_millis(post.status_entered_at.timestamp_millis() + 60_000);
            post.apply_edit("hello, edited".into(), later);

            assert_eq!(post.status, PostStatus::Pending);
            assert_eq!(post.status_entered_at, later);
            assert_eq!(post.content, "hello, edited");
            // Creation provenance is never touched
            assert_eq!(post.created_at, created_at);
        }
    }

    #[test]
    fn test_new_post_clock_matches_creation() {
        let post = PostDoc::new("hi".into(), ObjectId::new(), PostStatus::Draft);
        assert_eq!(post.created_at, post.status_entered_at);
    }
}
