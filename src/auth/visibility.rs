//! Post visibility rules
//!
//! Published and withdrawn posts are public; drafts and pending posts are
//! visible only to their author. The same rule is expressed twice: as a
//! predicate over a loaded document, and as a BSON filter pushed down into
//! the listing queries.

use bson::oid::ObjectId;
use bson::{doc, Document};

use crate::db::schemas::PostDoc;

/// Whether `viewer` (None for anonymous) may see `post`
pub fn can_view(viewer: Option<&ObjectId>, post: &PostDoc) -> bool {
    post.status.is_public() || viewer == Some(&post.author)
}

/// Listing filter for the global feed: everything public, plus the
/// viewer's own private posts when authenticated
pub fn list_filter(viewer: Option<&ObjectId>) -> Document {
    let public = doc! { "status": { "$in": ["2", "3"] } };

    match viewer {
        Some(id) => doc! {
            "$or": [
                public,
                { "author": id, "status": { "$in": ["0", "1"] } },
            ]
        },
        None => public,
    }
}

/// Listing filter for a single author's feed. When the viewer is the
/// author the filter collapses to authorship alone; anyone else sees only
/// what the author currently publishes, so withdrawn posts drop out here
/// even though they stay fetchable by id.
pub fn author_feed_filter(author: &ObjectId, viewer: Option<&ObjectId>) -> Document {
    if viewer == Some(author) {
        doc! { "author": author }
    } else {
        doc! { "author": author, "status": "2" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::PostStatus;

    fn post_with(author: ObjectId, status: PostStatus) -> PostDoc {
        let mut post = PostDoc::new("content".into(), author, PostStatus::Draft);
        post.status = status;
        post
    }

    #[test]
    fn test_public_statuses_visible_to_anyone() {
        let author = ObjectId::new();
        for status in [PostStatus::Published, PostStatus::Withdrawn] {
            let post = post_with(author, status);
            assert!(can_view(None, &post));
            assert!(can_view(Some(&ObjectId::new()), &post));
        }
    }

    #[test]
    fn test_private_statuses_author_only() {
        let author = ObjectId::new();
        for status in [PostStatus::Draft, PostStatus::Pending] {
            let post = post_with(author, status);
            assert!(can_view(Some(&author), &post));
            assert!(!can_view(None, &post));
            assert!(!can_view(Some(&ObjectId::new()), &post));
        }
    }

    #[test]
    fn test_anonymous_list_filter_has_no_author_clause() {
        let filter = list_filter(None);
        assert!(filter.get("$or").is_none());
        assert!(filter.get("status").is_some());
    }

    #[test]
    fn test_authenticated_list_filter_includes_own_private() {
        let viewer = ObjectId::new();
        let filter = list_filter(Some(&viewer));
        let branches = filter.get_array("$or").unwrap();
        assert_eq!(branches.len(), 2);
    }

    #[test]
    fn test_author_feed_collapses_for_self() {
        let author = ObjectId::new();
        let own = author_feed_filter(&author, Some(&author));
        assert!(own.get("status").is_none());
    }

    #[test]
    fn test_author_feed_shows_strangers_published_only() {
        let author = ObjectId::new();

        let stranger = author_feed_filter(&author, Some(&ObjectId::new()));
        assert_eq!(stranger.get_str("status"), Ok("2"));

        let anonymous = author_feed_filter(&author, None);
        assert_eq!(anonymous.get_str("status"), Ok("2"));
    }
}
