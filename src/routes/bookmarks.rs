//! HTTP routes for bookmarks
//!
//! - POST   /bookmarks           - Bookmark a post
//! - GET    /bookmarks           - List bookmarked posts
//! - DELETE /bookmarks/{postId}  - Remove a bookmark
//!
//! Bookmarks live on the user document. A post the caller cannot see
//! cannot be bookmarked, and bookmarks whose posts have since been deleted
//! or hidden drop out of the listing silently.

use bson::{doc, oid::ObjectId};
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::auth::can_view;
use crate::db::schemas::{PostDoc, UserDoc, POST_COLLECTION, USER_COLLECTION};
use crate::routes::guards::authenticate;
use crate::routes::posts::{build_post_responses, PostResponse};
use crate::routes::{
    error_response, fail, json_response, parse_json_body, BoxBody, SuccessResponse,
};
use crate::server::AppState;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddBookmarkRequest {
    pub post_id: String,
}

#[derive(Debug, Serialize)]
pub struct BookmarkListResponse {
    pub posts: Vec<PostResponse>,
    pub total: usize,
}

// =============================================================================
// Route Handler
// =============================================================================

/// Main handler for /bookmarks/* routes
pub async fn handle_bookmarks_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    path: &str,
) -> Response<BoxBody> {
    let method = req.method().clone();
    let subpath = path.strip_prefix("/bookmarks").unwrap_or("");

    match (method, subpath) {
        (Method::POST, "") | (Method::POST, "/") => handle_add(req, state).await,
        (Method::GET, "") | (Method::GET, "/") => handle_list(req, state).await,

        (Method::DELETE, p) if p.matches('/').count() == 1 => {
            let id = p.trim_start_matches('/');
            handle_remove(req, state, id).await
        }

        _ => error_response(StatusCode::NOT_FOUND, "Not found", None),
    }
}

// =============================================================================
// Endpoint Handlers
// =============================================================================

/// POST /bookmarks
async fn handle_add(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let caller = match authenticate(&req, &state).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let body: AddBookmarkRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return fail(e),
    };

    let post_id = match ObjectId::parse_str(&body.post_id) {
        Ok(id) => id,
        Err(_) => {
            return error_response(StatusCode::BAD_REQUEST, "Invalid post id", Some("INVALID_ID"))
        }
    };

    let posts = match state.mongo.collection::<PostDoc>(POST_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    // Invisible posts 404 here too
    let post = match posts.find_one(doc! { "_id": post_id }).await {
        Ok(Some(p)) => p,
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                "Post not found",
                Some("POST_NOT_FOUND"),
            )
        }
        Err(e) => return fail(e),
    };

    if !can_view(Some(&caller.id), &post) {
        return error_response(
            StatusCode::NOT_FOUND,
            "Post not found",
            Some("POST_NOT_FOUND"),
        );
    }

    let users = match state.mongo.collection::<UserDoc>(USER_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    // $addToSet keeps the operation idempotent
    let update = doc! { "$addToSet": { "bookmarks": post_id } };
    if let Err(e) = users.update_one(doc! { "_id": caller.id }, update).await {
        return fail(e);
    }

    info!("User {} bookmarked post {}", caller.id, post_id);

    json_response(
        StatusCode::OK,
        &SuccessResponse {
            success: true,
            message: "Post bookmarked".into(),
        },
    )
}

/// GET /bookmarks
async fn handle_list(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let caller = match authenticate(&req, &state).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    if caller.doc.bookmarks.is_empty() {
        return json_response(
            StatusCode::OK,
            &BookmarkListResponse {
                posts: Vec::new(),
                total: 0,
            },
        );
    }

    let posts = match state.mongo.collection::<PostDoc>(POST_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    let found = match posts
        .find_many_sorted(
            doc! { "_id": { "$in": caller.doc.bookmarks.clone() } },
            doc! { "created_at": -1 },
        )
        .await
    {
        Ok(found) => found,
        Err(e) => return fail(e),
    };

    // Deleted posts vanish via the query; hidden ones are filtered here
    let visible: Vec<PostDoc> = found
        .into_iter()
        .filter(|p| can_view(Some(&caller.id), p))
        .collect();

    match build_post_responses(&state, visible).await {
        Ok(items) => json_response(
            StatusCode::OK,
            &BookmarkListResponse {
                total: items.len(),
                posts: items,
            },
        ),
        Err(e) => fail(e),
    }
}

/// DELETE /bookmarks/{postId}
async fn handle_remove(
    req: Request<Incoming>,
    state: Arc<AppState>,
    raw_id: &str,
) -> Response<BoxBody> {
    let post_id = match ObjectId::parse_str(raw_id) {
        Ok(id) => id,
        Err(_) => {
            return error_response(StatusCode::BAD_REQUEST, "Invalid post id", Some("INVALID_ID"))
        }
    };

    let caller = match authenticate(&req, &state).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let users = match state.mongo.collection::<UserDoc>(USER_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    let update = doc! { "$pull": { "bookmarks": post_id } };
    if let Err(e) = users.update_one(doc! { "_id": caller.id }, update).await {
        return fail(e);
    }

    json_response(
        StatusCode::OK,
        &SuccessResponse {
            success: true,
            message: "Bookmark removed".into(),
        },
    )
}
