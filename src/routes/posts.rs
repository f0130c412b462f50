//! HTTP routes for posts
//!
//! - POST   /posts                - Create a post (level 1+)
//! - GET    /posts                - Global feed, visibility-filtered
//! - GET    /posts/user/{id}      - A single author's feed
//! - GET    /posts/{id}           - Fetch one post
//! - PUT    /posts/{id}           - Edit content (draft/pending, author only)
//! - PUT    /posts/{id}/withdraw  - Withdraw a published post
//! - DELETE /posts/{id}           - Delete per the deletion policy
//!
//! The global feed and single fetch take optional auth: anonymous callers
//! see the public feed, authenticated callers additionally see their own
//! drafts. A post the caller may not see answers 404, never 403, so
//! private drafts do not leak their existence.

use bson::{doc, oid::ObjectId};
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::auth::{author_feed_filter, authorize_post_action, can_view, list_filter, PostAction};
use crate::db::schemas::{PostDoc, PostStatus, UserDoc, POST_COLLECTION, USER_COLLECTION};
use crate::routes::guards::{authenticate, optional_authenticate};
use crate::routes::{
    error_response, fail, json_response, parse_json_body, BoxBody, SuccessResponse,
};
use crate::server::AppState;
use crate::types::AgoraError;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub content: String,
    /// Initial status code, chosen explicitly; "0" (draft) or "1" (pending)
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EditPostRequest {
    pub content: String,
}

/// Minimal author info embedded in post responses
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorSummary {
    pub id: String,
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostResponse {
    pub id: String,
    pub content: String,
    /// None when the author's account has since been deleted
    pub author: Option<AuthorSummary>,
    pub status: PostStatus,
    pub created_at: String,
    pub status_entered_at: String,
}

#[derive(Debug, Serialize)]
pub struct PostListResponse {
    pub posts: Vec<PostResponse>,
    pub total: usize,
}

// =============================================================================
// Response Assembly
// =============================================================================

fn timestamp_string(dt: bson::DateTime) -> String {
    dt.try_to_rfc3339_string()
        .unwrap_or_else(|_| dt.timestamp_millis().to_string())
}

/// Resolve author summaries for a batch of posts with a single user query.
/// Soft-deleted authors drop out of the lookup and render as null.
pub async fn build_post_responses(
    state: &AppState,
    posts: Vec<PostDoc>,
) -> Result<Vec<PostResponse>, AgoraError> {
    let mut author_ids: Vec<ObjectId> = posts.iter().map(|p| p.author).collect();
    author_ids.sort();
    author_ids.dedup();

    let authors: HashMap<ObjectId, AuthorSummary> = if author_ids.is_empty() {
        HashMap::new()
    } else {
        let users = state.mongo.collection::<UserDoc>(USER_COLLECTION).await?;
        users
            .find_many(doc! { "_id": { "$in": author_ids } })
            .await?
            .into_iter()
            .filter_map(|u| {
                let id = u._id?;
                Some((
                    id,
                    AuthorSummary {
                        id: id.to_hex(),
                        identifier: u.identifier,
                        handle: u.handle,
                    },
                ))
            })
            .collect()
    };

    Ok(posts
        .into_iter()
        .map(|p| PostResponse {
            id: p._id.map(|id| id.to_hex()).unwrap_or_default(),
            content: p.content,
            author: authors.get(&p.author).cloned(),
            status: p.status,
            created_at: timestamp_string(p.created_at),
            status_entered_at: timestamp_string(p.status_entered_at),
        })
        .collect())
}

async fn build_single_response(
    state: &AppState,
    post: PostDoc,
) -> Result<PostResponse, AgoraError> {
    let mut responses = build_post_responses(state, vec![post]).await?;
    responses
        .pop()
        .ok_or_else(|| AgoraError::Internal("Post response assembly failed".into()))
}

// =============================================================================
// Route Handler
// =============================================================================

/// Main handler for /posts/* routes
pub async fn handle_posts_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    path: &str,
) -> Response<BoxBody> {
    let method = req.method().clone();
    let subpath = path.strip_prefix("/posts").unwrap_or("");

    match (method, subpath) {
        (Method::POST, "") | (Method::POST, "/") => handle_create(req, state).await,
        (Method::GET, "") | (Method::GET, "/") => handle_list(req, state).await,

        (Method::GET, p) if p.starts_with("/user/") => {
            let id = p.trim_start_matches("/user/");
            handle_author_feed(req, state, id).await
        }

        (Method::PUT, p) if p.ends_with("/withdraw") => {
            let id = p
                .strip_prefix('/')
                .and_then(|s| s.strip_suffix("/withdraw"))
                .unwrap_or("");
            handle_withdraw(req, state, id).await
        }

        (Method::GET, p) if p.matches('/').count() == 1 => {
            let id = p.trim_start_matches('/');
            handle_get(req, state, id).await
        }

        (Method::PUT, p) if p.matches('/').count() == 1 => {
            let id = p.trim_start_matches('/');
            handle_edit(req, state, id).await
        }

        (Method::DELETE, p) if p.matches('/').count() == 1 => {
            let id = p.trim_start_matches('/');
            handle_delete(req, state, id).await
        }

        _ => error_response(StatusCode::NOT_FOUND, "Not found", None),
    }
}

/// The initial status must be named by the author and lie in the private
/// range; there is no default.
fn parse_initial_status(raw: Option<&str>) -> Option<PostStatus> {
    let status = PostStatus::from_code(raw?)?;
    status.is_editable().then_some(status)
}

fn parse_object_id(raw: &str) -> Result<ObjectId, Response<BoxBody>> {
    ObjectId::parse_str(raw)
        .map_err(|_| error_response(StatusCode::BAD_REQUEST, "Invalid id", Some("INVALID_ID")))
}

/// Load a post, treating an invisible one as missing
async fn load_post(
    state: &AppState,
    id: ObjectId,
) -> Result<PostDoc, Response<BoxBody>> {
    let posts = match state.mongo.collection::<PostDoc>(POST_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return Err(fail(e)),
    };

    match posts.find_one(doc! { "_id": id }).await {
        Ok(Some(post)) => Ok(post),
        Ok(None) => Err(error_response(
            StatusCode::NOT_FOUND,
            "Post not found",
            Some("POST_NOT_FOUND"),
        )),
        Err(e) => Err(fail(e)),
    }
}

// =============================================================================
// Endpoint Handlers
// =============================================================================

/// POST /posts
async fn handle_create(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let caller = match authenticate(&req, &state).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    if !caller.doc.trust_level.can_author_posts() {
        return error_response(
            StatusCode::FORBIDDEN,
            "Unverified accounts cannot create posts",
            Some("UNVERIFIED"),
        );
    }

    let body: CreatePostRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return fail(e),
    };

    if body.content.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Post content cannot be empty",
            Some("EMPTY_CONTENT"),
        );
    }

    let status = match parse_initial_status(body.status.as_deref()) {
        Some(s) => s,
        None => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Initial status is required and must be \"0\" (draft) or \"1\" (pending)",
                Some("INVALID_STATUS"),
            )
        }
    };

    let posts = match state.mongo.collection::<PostDoc>(POST_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    let mut post = PostDoc::new(body.content, caller.id, status);
    let post_id = match posts.insert_one(post.clone()).await {
        Ok(id) => id,
        Err(e) => return fail(e),
    };
    post._id = Some(post_id);

    info!("Post {} created by {} as {:?}", post_id, caller.id, status);

    match build_single_response(&state, post).await {
        Ok(resp) => json_response(StatusCode::CREATED, &resp),
        Err(e) => fail(e),
    }
}

/// GET /posts
async fn handle_list(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let viewer = match optional_authenticate(&req, &state).await {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let posts = match state.mongo.collection::<PostDoc>(POST_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    let filter = list_filter(viewer.as_ref().map(|v| &v.id));
    let found = match posts
        .find_many_sorted(filter, doc! { "created_at": -1 })
        .await
    {
        Ok(found) => found,
        Err(e) => return fail(e),
    };

    match build_post_responses(&state, found).await {
        Ok(items) => json_response(
            StatusCode::OK,
            &PostListResponse {
                total: items.len(),
                posts: items,
            },
        ),
        Err(e) => fail(e),
    }
}

/// GET /posts/user/{id}
async fn handle_author_feed(
    req: Request<Incoming>,
    state: Arc<AppState>,
    raw_id: &str,
) -> Response<BoxBody> {
    let author_id = match parse_object_id(raw_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let caller = match authenticate(&req, &state).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    // A deleted or unknown author yields 404, not an empty feed
    let users = match state.mongo.collection::<UserDoc>(USER_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    match users.find_one(doc! { "_id": author_id }).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                "User not found",
                Some("USER_NOT_FOUND"),
            )
        }
        Err(e) => return fail(e),
    }

    let posts = match state.mongo.collection::<PostDoc>(POST_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    let filter = author_feed_filter(&author_id, Some(&caller.id));
    let found = match posts
        .find_many_sorted(filter, doc! { "created_at": -1 })
        .await
    {
        Ok(found) => found,
        Err(e) => return fail(e),
    };

    match build_post_responses(&state, found).await {
        Ok(items) => json_response(
            StatusCode::OK,
            &PostListResponse {
                total: items.len(),
                posts: items,
            },
        ),
        Err(e) => fail(e),
    }
}

/// GET /posts/{id}
async fn handle_get(req: Request<Incoming>, state: Arc<AppState>, raw_id: &str) -> Response<BoxBody> {
    let post_id = match parse_object_id(raw_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let viewer = match optional_authenticate(&req, &state).await {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let post = match load_post(&state, post_id).await {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    // Invisible posts 404 rather than 403 to hide their existence
    if !can_view(viewer.as_ref().map(|v| &v.id), &post) {
        return error_response(
            StatusCode::NOT_FOUND,
            "Post not found",
            Some("POST_NOT_FOUND"),
        );
    }

    match build_single_response(&state, post).await {
        Ok(resp) => json_response(StatusCode::OK, &resp),
        Err(e) => fail(e),
    }
}

/// PUT /posts/{id}
///
/// Replaces the content, moves the post to pending, and restarts the
/// publication clock. `created_at` is untouched.
async fn handle_edit(req: Request<Incoming>, state: Arc<AppState>, raw_id: &str) -> Response<BoxBody> {
    let post_id = match parse_object_id(raw_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let caller = match authenticate(&req, &state).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let body: EditPostRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return fail(e),
    };

    if body.content.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Post content cannot be empty",
            Some("EMPTY_CONTENT"),
        );
    }

    let mut post = match load_post(&state, post_id).await {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    if let Err(e) = authorize_post_action(&caller.id, caller.doc.trust_level, &post, PostAction::Edit)
    {
        return fail(e);
    }

    let now = bson::DateTime::now();
    post.apply_edit(body.content.clone(), now);

    let posts = match state.mongo.collection::<PostDoc>(POST_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    let update = doc! {
        "$set": {
            "content": &body.content,
            "status": PostStatus::Pending.code(),
            "status_entered_at": now,
            "metadata.updated_at": now,
        }
    };
    if let Err(e) = posts.update_one(doc! { "_id": post_id }, update).await {
        return fail(e);
    }

    info!("Post {} edited by {}", post_id, caller.id);

    match build_single_response(&state, post).await {
        Ok(resp) => json_response(StatusCode::OK, &resp),
        Err(e) => fail(e),
    }
}

/// PUT /posts/{id}/withdraw
async fn handle_withdraw(
    req: Request<Incoming>,
    state: Arc<AppState>,
    raw_id: &str,
) -> Response<BoxBody> {
    let post_id = match parse_object_id(raw_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let caller = match authenticate(&req, &state).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let mut post = match load_post(&state, post_id).await {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    if let Err(e) =
        authorize_post_action(&caller.id, caller.doc.trust_level, &post, PostAction::Withdraw)
    {
        return fail(e);
    }

    let now = bson::DateTime::now();
    post.status = PostStatus::Withdrawn;
    post.status_entered_at = now;

    let posts = match state.mongo.collection::<PostDoc>(POST_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    let update = doc! {
        "$set": {
            "status": PostStatus::Withdrawn.code(),
            "status_entered_at": now,
            "metadata.updated_at": now,
        }
    };
    if let Err(e) = posts.update_one(doc! { "_id": post_id }, update).await {
        return fail(e);
    }

    info!("Post {} withdrawn by {}", post_id, caller.id);

    match build_single_response(&state, post).await {
        Ok(resp) => json_response(StatusCode::OK, &resp),
        Err(e) => fail(e),
    }
}

/// DELETE /posts/{id}
///
/// Hard delete. Authors may delete their own private posts; admins (7+)
/// may delete other users' non-withdrawn posts; withdrawn posts are
/// permanent for everyone.
async fn handle_delete(
    req: Request<Incoming>,
    state: Arc<AppState>,
    raw_id: &str,
) -> Response<BoxBody> {
    let post_id = match parse_object_id(raw_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let caller = match authenticate(&req, &state).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let post = match load_post(&state, post_id).await {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    if let Err(e) =
        authorize_post_action(&caller.id, caller.doc.trust_level, &post, PostAction::Delete)
    {
        return fail(e);
    }

    let posts = match state.mongo.collection::<PostDoc>(POST_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    if let Err(e) = posts.delete_one(doc! { "_id": post_id }).await {
        return fail(e);
    }

    if post.author == caller.id {
        info!("Post {} deleted by its author", post_id);
    } else {
        info!(
            "Post {} deleted by admin {} (level {})",
            post_id,
            caller.id,
            caller.doc.trust_level
        );
    }

    json_response(
        StatusCode::OK,
        &SuccessResponse {
            success: true,
            message: "Post deleted".into(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_string_is_rfc3339() {
        let s = timestamp_string(bson::DateTime::from_millis(0));
        assert!(s.starts_with("1970-01-01T00:00:00"));
    }

    #[test]
    fn test_initial_status_must_be_named() {
        assert_eq!(parse_initial_status(None), None);
    }

    #[test]
    fn test_initial_status_private_range_only() {
        assert_eq!(parse_initial_status(Some("0")), Some(PostStatus::Draft));
        assert_eq!(parse_initial_status(Some("1")), Some(PostStatus::Pending));

        assert_eq!(parse_initial_status(Some("2")), None);
        assert_eq!(parse_initial_status(Some("3")), None);
        assert_eq!(parse_initial_status(Some("draft")), None);
        assert_eq!(parse_initial_status(Some("")), None);
    }

    #[test]
    fn test_create_request_tolerates_missing_status_field() {
        let body: CreatePostRequest = serde_json::from_str(r#"{"content":"hi"}"#).unwrap();
        assert!(body.status.is_none());
        assert_eq!(parse_initial_status(body.status.as_deref()), None);
    }
}
