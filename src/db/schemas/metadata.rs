//! Lifecycle metadata carried by every stored document
//!
//! Deletion is a soft flag here; the collection wrapper hides flagged
//! documents from every query, so routes never check it themselves.

use bson::DateTime;
use serde::{Deserialize, Serialize};

/// Timestamps and the soft-delete flag, embedded in each document
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Metadata {
    /// Soft-delete flag; hidden documents keep their data
    #[serde(default)]
    pub is_deleted: bool,

    /// When the soft-delete flag was set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime>,

    /// Last mutation time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,

    /// Insertion time, stamped once
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,
}

impl Metadata {
    /// Fresh metadata for a document about to be inserted
    pub fn new() -> Self {
        Self {
            is_deleted: false,
            deleted_at: None,
            updated_at: Some(DateTime::now()),
            created_at: Some(DateTime::now()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_metadata_is_live_and_stamped() {
        let metadata = Metadata::new();
        assert!(!metadata.is_deleted);
        assert!(metadata.deleted_at.is_none());
        assert!(metadata.created_at.is_some());
        assert!(metadata.updated_at.is_some());
    }
}
