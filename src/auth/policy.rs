//! Trust levels and the tiered authorization policy
//!
//! Two independent policies live here:
//!
//! - **Post mutation**: who may edit, withdraw, or delete a post, keyed by
//!   authorship, the actor's trust level, and the post's lifecycle status.
//! - **Trust-level mutation**: which trust-level bands a moderator may see
//!   and edit. The bands are non-monotonic: level 8 moderates the 5-7 range
//!   but may not touch ordinary users, while 6 and 7 do the opposite.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use bson::oid::ObjectId;

use crate::db::schemas::{PostDoc, PostStatus};
use crate::types::AgoraError;

/// A user's trust level, 0-9.
///
/// Stored and transmitted as a decimal string ("0".."9"). Level 0 is an
/// unverified account; 1+ may author posts; 5+ may act as verifiers; 7+
/// carries admin rights over other users' posts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TrustLevel(u8);

impl TrustLevel {
    /// Freshly registered, not yet verified
    pub const UNVERIFIED: TrustLevel = TrustLevel(0);
    /// Verified via email OTP or peer code
    pub const VERIFIED: TrustLevel = TrustLevel(1);
    /// Highest assignable level
    pub const MAX: u8 = 9;

    /// Construct from an integer; `None` if out of the 0-9 range
    pub fn new(value: u8) -> Option<Self> {
        (value <= Self::MAX).then_some(Self(value))
    }

    /// Parse user-supplied input. Non-numeric or out-of-range values are a
    /// validation error, distinct from any authorization failure.
    pub fn parse(input: &str) -> Result<Self, AgoraError> {
        input
            .trim()
            .parse::<u8>()
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| {
                AgoraError::BadRequest("Invalid level provided. Must be between 0 and 9.".into())
            })
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Whether this user may author posts (level 0 is blocked)
    pub fn can_author_posts(self) -> bool {
        self.0 >= 1
    }

    /// Whether this user may verify level-0 users via code exchange
    pub fn is_verifier(self) -> bool {
        self.0 >= 5
    }

    /// Whether this user may delete other users' posts
    pub fn has_admin_rights(self) -> bool {
        self.0 >= 7
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for TrustLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TrustLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<u8>()
            .ok()
            .and_then(TrustLevel::new)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid trust level: {}", raw)))
    }
}

/// An inclusive trust-level range a moderator may act on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelBand {
    pub min: u8,
    pub max: u8,
}

impl LevelBand {
    pub fn contains(&self, level: TrustLevel) -> bool {
        level.value() >= self.min && level.value() <= self.max
    }

    /// BSON filter over the string-encoded trust_level field. Single-digit
    /// decimal strings compare in numeric order, so string range bounds are
    /// safe here.
    pub fn filter(&self) -> bson::Document {
        bson::doc! {
            "trust_level": {
                "$gte": self.min.to_string(),
                "$lte": self.max.to_string(),
            }
        }
    }
}

impl fmt::Display for LevelBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

/// The band of target levels an acting moderator may edit, which is also
/// the band of new levels they may assign. `None` means the actor holds no
/// moderation power at all.
pub fn level_edit_band(acting: TrustLevel) -> Option<LevelBand> {
    match acting.value() {
        6 => Some(LevelBand { min: 0, max: 5 }),
        7 => Some(LevelBand { min: 0, max: 6 }),
        8 => Some(LevelBand { min: 5, max: 7 }),
        9 => Some(LevelBand { min: 0, max: TrustLevel::MAX }),
        _ => None,
    }
}

/// The band of users an acting moderator may see in the user listing.
/// Mirrors the edit bands.
pub fn listing_band(acting: TrustLevel) -> Option<LevelBand> {
    level_edit_band(acting)
}

/// Check a trust-level edit against the tiered bands.
///
/// Violations are authorization errors naming the allowed band; they are
/// never conflated with the 400 returned for a malformed level value.
pub fn check_level_edit(
    acting: TrustLevel,
    target: TrustLevel,
    new_level: TrustLevel,
) -> Result<(), AgoraError> {
    let band = level_edit_band(acting).ok_or_else(|| {
        AgoraError::Forbidden("You are not authorized to edit user levels.".into())
    })?;

    if !band.contains(target) {
        return Err(AgoraError::Forbidden(format!(
            "You can only edit users with a level of {}.",
            band
        )));
    }

    if !band.contains(new_level) {
        return Err(AgoraError::Forbidden(format!(
            "You can only set a level between {}.",
            band
        )));
    }

    Ok(())
}

/// A mutation requested against a post
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostAction {
    Edit,
    Withdraw,
    Delete,
}

/// Decide whether `actor` may perform `action` on `post`.
///
/// The 400/403 split matters: a withdrawn post answers 400 to everything
/// (the state forbids it, regardless of who asks), while the wrong actor on
/// a mutable post answers 403.
pub fn authorize_post_action(
    actor_id: &ObjectId,
    actor_level: TrustLevel,
    post: &PostDoc,
    action: PostAction,
) -> Result<(), AgoraError> {
    let is_author = post.author == *actor_id;

    match action {
        PostAction::Edit => {
            if post.status == PostStatus::Withdrawn {
                return Err(AgoraError::BadRequest(
                    "Withdrawn posts cannot be edited.".into(),
                ));
            }
            if !is_author {
                return Err(AgoraError::Forbidden(
                    "You are not authorized to edit this post.".into(),
                ));
            }
            if !post.status.is_editable() {
                // Published content is immutable
                return Err(AgoraError::BadRequest(
                    "Only draft or pending posts can be edited.".into(),
                ));
            }
            Ok(())
        }

        PostAction::Withdraw => {
            if !is_author {
                return Err(AgoraError::Forbidden(
                    "You are not authorized to withdraw this post.".into(),
                ));
            }
            if post.status != PostStatus::Published {
                return Err(AgoraError::BadRequest(
                    "Only published posts can be withdrawn.".into(),
                ));
            }
            Ok(())
        }

        PostAction::Delete => {
            // Withdrawn posts are universally undeletable (reserved for a
            // future repost feature).
            if post.status == PostStatus::Withdrawn {
                return Err(AgoraError::BadRequest(
                    "Withdrawn posts cannot be deleted.".into(),
                ));
            }

            let author_may_delete = is_author && post.status.is_editable();
            let admin_may_delete = actor_level.has_admin_rights() && !is_author;

            if author_may_delete || admin_may_delete {
                Ok(())
            } else {
                Err(AgoraError::Forbidden(
                    "You are not authorized to delete this post.".into(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(v: u8) -> TrustLevel {
        TrustLevel::new(v).unwrap()
    }

    fn post_with(author: ObjectId, status: PostStatus) -> PostDoc {
        let mut post = PostDoc::new("content".into(), author, PostStatus::Draft);
        post.status = status;
        post
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(TrustLevel::parse("5").is_ok());
        assert!(TrustLevel::parse(" 9 ").is_ok());
        assert!(matches!(
            TrustLevel::parse("10"),
            Err(AgoraError::BadRequest(_))
        ));
        assert!(matches!(
            TrustLevel::parse("-1"),
            Err(AgoraError::BadRequest(_))
        ));
        assert!(matches!(
            TrustLevel::parse("seven"),
            Err(AgoraError::BadRequest(_))
        ));
        assert!(matches!(TrustLevel::parse(""), Err(AgoraError::BadRequest(_))));
    }

    #[test]
    fn test_level_capabilities() {
        assert!(!level(0).can_author_posts());
        assert!(level(1).can_author_posts());
        assert!(!level(4).is_verifier());
        assert!(level(5).is_verifier());
        assert!(!level(6).has_admin_rights());
        assert!(level(7).has_admin_rights());
    }

    #[test]
    fn test_edit_bands_per_acting_level() {
        assert_eq!(level_edit_band(level(6)), Some(LevelBand { min: 0, max: 5 }));
        assert_eq!(level_edit_band(level(7)), Some(LevelBand { min: 0, max: 6 }));
        assert_eq!(level_edit_band(level(8)), Some(LevelBand { min: 5, max: 7 }));
        assert_eq!(level_edit_band(level(9)), Some(LevelBand { min: 0, max: 9 }));
        assert_eq!(level_edit_band(level(5)), None);
        assert_eq!(level_edit_band(level(0)), None);
    }

    #[test]
    fn test_band_boundaries_enforced() {
        // Inside the band succeeds
        assert!(check_level_edit(level(6), level(5), level(0)).is_ok());
        assert!(check_level_edit(level(7), level(6), level(6)).is_ok());
        assert!(check_level_edit(level(8), level(5), level(7)).is_ok());
        assert!(check_level_edit(level(9), level(9), level(0)).is_ok());

        // Target outside the band is forbidden
        assert!(matches!(
            check_level_edit(level(6), level(6), level(3)),
            Err(AgoraError::Forbidden(_))
        ));
        assert!(matches!(
            check_level_edit(level(8), level(4), level(5)),
            Err(AgoraError::Forbidden(_))
        ));

        // New level outside the band is forbidden
        assert!(matches!(
            check_level_edit(level(6), level(3), level(6)),
            Err(AgoraError::Forbidden(_))
        ));
        assert!(matches!(
            check_level_edit(level(8), level(6), level(8)),
            Err(AgoraError::Forbidden(_))
        ));

        // Actors below 6 hold no band at all
        assert!(matches!(
            check_level_edit(level(5), level(0), level(1)),
            Err(AgoraError::Forbidden(_))
        ));
    }

    #[test]
    fn test_forbidden_names_the_band() {
        let err = check_level_edit(level(8), level(2), level(6)).unwrap_err();
        assert!(err.to_string().contains("5-7"));
    }

    #[test]
    fn test_edit_policy() {
        let author = ObjectId::new();
        let other = ObjectId::new();

        let draft = post_with(author, PostStatus::Draft);
        assert!(authorize_post_action(&author, level(1), &draft, PostAction::Edit).is_ok());
        assert!(matches!(
            authorize_post_action(&other, level(9), &draft, PostAction::Edit),
            Err(AgoraError::Forbidden(_))
        ));

        let withdrawn = post_with(author, PostStatus::Withdrawn);
        assert!(matches!(
            authorize_post_action(&author, level(1), &withdrawn, PostAction::Edit),
            Err(AgoraError::BadRequest(_))
        ));

        let published = post_with(author, PostStatus::Published);
        assert!(matches!(
            authorize_post_action(&author, level(1), &published, PostAction::Edit),
            Err(AgoraError::BadRequest(_))
        ));
    }

    #[test]
    fn test_withdraw_policy() {
        let author = ObjectId::new();
        let other = ObjectId::new();

        let published = post_with(author, PostStatus::Published);
        assert!(authorize_post_action(&author, level(1), &published, PostAction::Withdraw).is_ok());
        assert!(matches!(
            authorize_post_action(&other, level(9), &published, PostAction::Withdraw),
            Err(AgoraError::Forbidden(_))
        ));

        let pending = post_with(author, PostStatus::Pending);
        assert!(matches!(
            authorize_post_action(&author, level(1), &pending, PostAction::Withdraw),
            Err(AgoraError::BadRequest(_))
        ));
    }

    #[test]
    fn test_delete_policy() {
        let author = ObjectId::new();
        let admin = ObjectId::new();

        // Author may delete own draft/pending
        for status in [PostStatus::Draft, PostStatus::Pending] {
            let post = post_with(author, status);
            assert!(authorize_post_action(&author, level(1), &post, PostAction::Delete).is_ok());
        }

        // Author may not delete own published post
        let published = post_with(author, PostStatus::Published);
        assert!(matches!(
            authorize_post_action(&author, level(1), &published, PostAction::Delete),
            Err(AgoraError::Forbidden(_))
        ));

        // Admin may delete another user's published post
        assert!(authorize_post_action(&admin, level(7), &published, PostAction::Delete).is_ok());

        // Admin rights do not extend to one's own published post
        assert!(matches!(
            authorize_post_action(&author, level(8), &published, PostAction::Delete),
            Err(AgoraError::Forbidden(_))
        ));

        // Non-admin may not delete another user's post
        let pending = post_with(author, PostStatus::Pending);
        assert!(matches!(
            authorize_post_action(&admin, level(6), &pending, PostAction::Delete),
            Err(AgoraError::Forbidden(_))
        ));
    }

    #[test]
    fn test_withdrawn_undeletable_by_anyone() {
        let author = ObjectId::new();
        let admin = ObjectId::new();
        let withdrawn = post_with(author, PostStatus::Withdrawn);

        // Author gets 400, not 403
        assert!(matches!(
            authorize_post_action(&author, level(1), &withdrawn, PostAction::Delete),
            Err(AgoraError::BadRequest(_))
        ));

        // So does a level-8 admin
        assert!(matches!(
            authorize_post_action(&admin, level(8), &withdrawn, PostAction::Delete),
            Err(AgoraError::BadRequest(_))
        ));
    }
}
