//! HTTP routes for user listing and trust-level moderation
//!
//! - GET /users             - List users in the caller's moderation band
//! - GET /users/verifiers   - List users who can act as verifiers (5+)
//! - PUT /users/{id}/level  - Change a user's trust level
//!
//! The moderation bands are non-monotonic: level 6 sees 0-5, level 7 sees
//! 0-6, level 8 sees 5-7, level 9 sees everyone. Callers below 6 hold no
//! band and are refused outright.

use bson::{doc, oid::ObjectId};
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::auth::{check_level_edit, listing_band, TrustLevel};
use crate::db::schemas::{UserDoc, USER_COLLECTION};
use crate::routes::guards::authenticate;
use crate::routes::{error_response, fail, json_response, parse_json_body, BoxBody};
use crate::server::AppState;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    pub trust_level: TrustLevel,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<UserSummary>,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLevelRequest {
    pub level: String,
}

fn user_to_summary(user: UserDoc) -> UserSummary {
    UserSummary {
        id: user._id.map(|id| id.to_hex()).unwrap_or_default(),
        identifier: user.identifier,
        handle: user.handle,
        trust_level: user.trust_level,
    }
}

// =============================================================================
// Route Handler
// =============================================================================

/// Main handler for /users/* routes
pub async fn handle_users_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    path: &str,
) -> Response<BoxBody> {
    let method = req.method().clone();
    let subpath = path.strip_prefix("/users").unwrap_or("");

    match (method, subpath) {
        (Method::GET, "") | (Method::GET, "/") => handle_list_users(req, state).await,
        (Method::GET, "/verifiers") => handle_list_verifiers(req, state).await,

        (Method::PUT, p) if p.ends_with("/level") => {
            let id = p
                .strip_prefix('/')
                .and_then(|s| s.strip_suffix("/level"))
                .unwrap_or("");
            handle_update_level(req, state, id).await
        }

        _ => error_response(StatusCode::NOT_FOUND, "Not found", None),
    }
}

// =============================================================================
// Endpoint Handlers
// =============================================================================

/// GET /users
async fn handle_list_users(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let caller = match authenticate(&req, &state).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let band = match listing_band(caller.doc.trust_level) {
        Some(b) => b,
        None => {
            return error_response(
                StatusCode::FORBIDDEN,
                "You are not authorized to list users.",
                Some("FORBIDDEN"),
            )
        }
    };

    let collection = match state.mongo.collection::<UserDoc>(USER_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    // Callers never appear in their own listing
    let mut filter = band.filter();
    filter.insert("_id", doc! { "$ne": caller.id });

    let found = match collection
        .find_many_sorted(filter, doc! { "trust_level": -1, "identifier": 1 })
        .await
    {
        Ok(found) => found,
        Err(e) => return fail(e),
    };

    let users: Vec<UserSummary> = found.into_iter().map(user_to_summary).collect();

    json_response(
        StatusCode::OK,
        &UserListResponse {
            total: users.len(),
            users,
        },
    )
}

/// GET /users/verifiers
///
/// Any authenticated user may see who can verify them.
async fn handle_list_verifiers(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    if let Err(resp) = authenticate(&req, &state).await {
        return resp;
    }

    let collection = match state.mongo.collection::<UserDoc>(USER_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    // Single-digit string compare works for the 5..9 range
    let found = match collection
        .find_many_sorted(
            doc! { "trust_level": { "$gte": "5" } },
            doc! { "identifier": 1 },
        )
        .await
    {
        Ok(found) => found,
        Err(e) => return fail(e),
    };

    let users: Vec<UserSummary> = found.into_iter().map(user_to_summary).collect();

    json_response(
        StatusCode::OK,
        &UserListResponse {
            total: users.len(),
            users,
        },
    )
}

/// PUT /users/{id}/level
async fn handle_update_level(
    req: Request<Incoming>,
    state: Arc<AppState>,
    raw_id: &str,
) -> Response<BoxBody> {
    let target_id = match ObjectId::parse_str(raw_id) {
        Ok(id) => id,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "Invalid id", Some("INVALID_ID")),
    };

    let caller = match authenticate(&req, &state).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let body: UpdateLevelRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return fail(e),
    };

    // Malformed level values are a 400, band violations a 403
    let new_level = match TrustLevel::parse(&body.level) {
        Ok(l) => l,
        Err(e) => return fail(e),
    };

    let collection = match state.mongo.collection::<UserDoc>(USER_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    let target = match collection.find_one(doc! { "_id": target_id }).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                "User not found",
                Some("USER_NOT_FOUND"),
            )
        }
        Err(e) => return fail(e),
    };

    if let Err(e) = check_level_edit(caller.doc.trust_level, target.trust_level, new_level) {
        return fail(e);
    }

    let update = doc! {
        "$set": {
            "trust_level": new_level.to_string(),
            "metadata.updated_at": bson::DateTime::now(),
        }
    };
    if let Err(e) = collection.update_one(doc! { "_id": target_id }, update).await {
        return fail(e);
    }

    info!(
        "User {} level changed {} -> {} by {} (level {})",
        target_id, target.trust_level, new_level, caller.id, caller.doc.trust_level
    );

    json_response(
        StatusCode::OK,
        &UserSummary {
            id: target_id.to_hex(),
            identifier: target.identifier,
            handle: target.handle,
            trust_level: new_level,
        },
    )
}
