//! HTTP routes for the peer verification code exchange
//!
//! A level-0 user requests a code naming a verifier (level 5+). The code
//! travels out-of-band; the verifier presents it back. `check-code`
//! inspects a code without consuming it; `action` resolves the exchange,
//! consuming the code and, on verify, promoting the subject to level 1.

use bson::{doc, oid::ObjectId};
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::auth::TrustLevel;
use crate::db::schemas::{UserDoc, USER_COLLECTION};
use crate::routes::guards::{authenticate, AuthUser};
use crate::routes::users::UserSummary;
use crate::routes::{error_response, fail, json_response, parse_json_body, BoxBody};
use crate::server::AppState;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestCodeRequest {
    pub verifier_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeIssuedResponse {
    pub code: String,
    pub expires_in: u64,
}

#[derive(Debug, Deserialize)]
pub struct CheckCodeRequest {
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckCodeResponse {
    /// The user the code was minted for
    pub subject: UserSummary,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub user_id: String,
    /// "verify" or "reject"
    pub action: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    pub success: bool,
    pub action: String,
    /// The subject after the action was applied
    pub subject: UserSummary,
}

// =============================================================================
// Route Handler
// =============================================================================

/// Main handler for /verification/* routes
pub async fn handle_verification_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    path: &str,
) -> Response<BoxBody> {
    let method = req.method().clone();
    let subpath = path.strip_prefix("/verification").unwrap_or("");

    match (method, subpath) {
        (Method::POST, "/request") => handle_request_code(req, state).await,
        (Method::POST, "/check-code") => handle_check_code(req, state).await,
        (Method::POST, "/action") => handle_action(req, state).await,
        _ => error_response(StatusCode::NOT_FOUND, "Not found", None),
    }
}

/// Authenticate and require verifier standing (level 5+)
async fn require_verifier(
    req: &Request<Incoming>,
    state: &AppState,
) -> Result<AuthUser, Response<BoxBody>> {
    let caller = authenticate(req, state).await?;
    if !caller.doc.trust_level.is_verifier() {
        return Err(error_response(
            StatusCode::FORBIDDEN,
            "You are not authorized to verify users.",
            Some("FORBIDDEN"),
        ));
    }
    Ok(caller)
}

fn subject_summary(id: ObjectId, user: UserDoc) -> UserSummary {
    UserSummary {
        id: id.to_hex(),
        identifier: user.identifier,
        handle: user.handle,
        trust_level: user.trust_level,
    }
}

// =============================================================================
// Endpoint Handlers
// =============================================================================

/// POST /verification/request
///
/// The unverified caller names a verifier and receives a code to convey to
/// them out-of-band. Re-requesting replaces the previous code.
async fn handle_request_code(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let caller = match authenticate(&req, &state).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    if caller.doc.trust_level != TrustLevel::UNVERIFIED {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Account is already verified",
            Some("ALREADY_VERIFIED"),
        );
    }

    let body: RequestCodeRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return fail(e),
    };

    let verifier_id = match ObjectId::parse_str(&body.verifier_id) {
        Ok(id) => id,
        Err(_) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Invalid verifier id",
                Some("INVALID_ID"),
            )
        }
    };

    let collection = match state.mongo.collection::<UserDoc>(USER_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    // A named user below verifier standing is as good as absent
    let eligible = match collection.find_one(doc! { "_id": verifier_id }).await {
        Ok(Some(u)) => u.trust_level.is_verifier(),
        Ok(None) => false,
        Err(e) => return fail(e),
    };
    if !eligible {
        return error_response(
            StatusCode::NOT_FOUND,
            "Verifier not found",
            Some("VERIFIER_NOT_FOUND"),
        );
    }

    let code = state.codes.mint(caller.id, verifier_id);

    info!(
        "Verification code issued: subject {} named verifier {}",
        caller.id, verifier_id
    );

    json_response(
        StatusCode::OK,
        &CodeIssuedResponse {
            code,
            expires_in: state.args.code_ttl_seconds,
        },
    )
}

/// POST /verification/check-code
///
/// The verifier inspects a code handed to them without consuming it.
/// Unknown and expired codes answer the same 400; a live code addressed to
/// a different verifier answers 403.
async fn handle_check_code(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let caller = match require_verifier(&req, &state).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let body: CheckCodeRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return fail(e),
    };

    if body.code.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Missing required field: code",
            None,
        );
    }

    let (subject_id, verifier_id) = match state.codes.lookup(&body.code) {
        Some(pair) => pair,
        None => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Invalid or expired verification code",
                Some("INVALID_CODE"),
            )
        }
    };

    if verifier_id != caller.id {
        return error_response(
            StatusCode::FORBIDDEN,
            "This verification code was not addressed to you.",
            Some("WRONG_VERIFIER"),
        );
    }

    let collection = match state.mongo.collection::<UserDoc>(USER_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    // Subject deleted since the request: the code is dead, drop it
    let subject = match collection.find_one(doc! { "_id": subject_id }).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            state.codes.remove(&body.code);
            return error_response(
                StatusCode::NOT_FOUND,
                "User not found",
                Some("USER_NOT_FOUND"),
            );
        }
        Err(e) => return fail(e),
    };

    json_response(
        StatusCode::OK,
        &CheckCodeResponse {
            subject: subject_summary(subject_id, subject),
        },
    )
}

/// POST /verification/action
///
/// Resolve the exchange for a subject. A code minted by that subject for
/// this verifier must exist; verify promotes a still-unverified subject to
/// level 1, reject only burns the code.
async fn handle_action(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let caller = match require_verifier(&req, &state).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let body: ActionRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return fail(e),
    };

    let verify = match body.action.as_str() {
        "verify" => true,
        "reject" => false,
        _ => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Action must be \"verify\" or \"reject\"",
                Some("INVALID_ACTION"),
            )
        }
    };

    let subject_id = match ObjectId::parse_str(&body.user_id) {
        Ok(id) => id,
        Err(_) => {
            return error_response(StatusCode::BAD_REQUEST, "Invalid user id", Some("INVALID_ID"))
        }
    };

    let code = match state.codes.find_for(&subject_id, &caller.id) {
        Some(code) => code,
        None => {
            return error_response(
                StatusCode::FORBIDDEN,
                "No verification code from this user is addressed to you.",
                Some("CODE_NOT_OWNED"),
            )
        }
    };

    // Single use either way
    if state.codes.consume(&code, &caller.id).is_none() {
        return error_response(
            StatusCode::FORBIDDEN,
            "No verification code from this user is addressed to you.",
            Some("CODE_NOT_OWNED"),
        );
    }

    let collection = match state.mongo.collection::<UserDoc>(USER_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    let mut subject = match collection.find_one(doc! { "_id": subject_id }).await {
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

    if verify && subject.trust_level == TrustLevel::UNVERIFIED {
        let update = doc! {
            "$set": {
                "trust_level": TrustLevel::VERIFIED.to_string(),
                "metadata.updated_at": bson::DateTime::now(),
            }
        };
        if let Err(e) = collection.update_one(doc! { "_id": subject_id }, update).await {
            return fail(e);
        }
        subject.trust_level = TrustLevel::VERIFIED;
    }

    info!(
        "Verification {}: verifier {} resolved subject {}",
        body.action, caller.id, subject_id
    );

    json_response(
        StatusCode::OK,
        &ActionResponse {
            success: true,
            action: body.action,
            subject: subject_summary(subject_id, subject),
        },
    )
}
