//! HTTP routes for authentication and account management
//!
//! - POST   /auth/register   - Create an account, returns a JWT token
//! - POST   /auth/login      - Authenticate and get a JWT token
//! - GET    /auth/me         - Current account info from token
//! - POST   /auth/send-otp   - Issue a one-time password for self-verification
//! - POST   /auth/verify-otp - Redeem an OTP, promoting level 0 to level 1
//! - POST   /auth/set-handle - Claim an immutable public handle
//! - DELETE /auth/account    - Soft-delete the account

use bson::doc;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::{hash_password, verify_password, TokenInput, TrustLevel};
use crate::db::schemas::{UserDoc, USER_COLLECTION};
use crate::routes::guards::authenticate;
use crate::routes::{
    error_response, fail, json_response, parse_json_body, BoxBody, ErrorResponse, SuccessResponse,
};
use crate::server::AppState;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    pub user_id: String,
    pub identifier: String,
    pub trust_level: TrustLevel,
    pub expires_in: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user_id: String,
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    pub trust_level: TrustLevel,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpIssuedResponse {
    pub success: bool,
    pub message: String,
    /// Only populated in dev mode; production delivers out-of-band
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedResponse {
    pub success: bool,
    pub trust_level: TrustLevel,
}

#[derive(Debug, Deserialize)]
pub struct SetHandleRequest {
    pub handle: String,
}

// =============================================================================
// Route Handler
// =============================================================================

/// Main handler for /auth/* routes
pub async fn handle_auth_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    path: &str,
) -> Response<BoxBody> {
    let method = req.method().clone();
    let subpath = path.strip_prefix("/auth").unwrap_or("");

    match (method, subpath) {
        (Method::POST, "/register") => handle_register(req, state).await,
        (Method::POST, "/login") => handle_login(req, state).await,
        (Method::GET, "/me") => handle_me(req, state).await,
        (Method::POST, "/send-otp") => handle_send_otp(req, state).await,
        (Method::POST, "/verify-otp") => handle_verify_otp(req, state).await,
        (Method::POST, "/set-handle") => handle_set_handle(req, state).await,
        (Method::DELETE, "/account") => handle_delete_account(req, state).await,
        _ => error_response(StatusCode::NOT_FOUND, "Not found", None),
    }
}

// =============================================================================
// Endpoint Handlers
// =============================================================================

/// POST /auth/register
///
/// Create a new level-0 account and return a token for it.
async fn handle_register(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let body: RegisterRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return fail(e),
    };

    if body.identifier.is_empty() || body.password.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Missing required fields: identifier, password",
            None,
        );
    }

    if body.password.len() < 8 {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Password must be at least 8 characters",
            Some("WEAK_PASSWORD"),
        );
    }

    let collection = match state.mongo.collection::<UserDoc>(USER_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    match collection
        .find_one(doc! { "identifier": &body.identifier })
        .await
    {
        Ok(Some(_)) => {
            return error_response(
                StatusCode::CONFLICT,
                "An account with this identifier already exists",
                Some("USER_EXISTS"),
            )
        }
        Ok(None) => {}
        Err(e) => return fail(e),
    }

    let password_hash = match hash_password(&body.password) {
        Ok(h) => h,
        Err(e) => return fail(e),
    };

    let user = UserDoc::new(body.identifier.clone(), password_hash);

    let user_id = match collection.insert_one(user).await {
        Ok(id) => id,
        Err(e) => {
            // Unique index may fire under a registration race
            let error_str = e.to_string();
            if error_str.contains("duplicate key") || error_str.contains("E11000") {
                return error_response(
                    StatusCode::CONFLICT,
                    "An account with this identifier already exists",
                    Some("USER_EXISTS"),
                );
            }
            return fail(e);
        }
    };

    info!("Registered new user: {}", body.identifier);

    let token = match state.jwt.generate_token(TokenInput {
        user_id: user_id.to_hex(),
        identifier: body.identifier.clone(),
    }) {
        Ok(t) => t,
        Err(e) => return fail(e),
    };

    json_response(
        StatusCode::CREATED,
        &AuthResponse {
            token,
            user_id: user_id.to_hex(),
            identifier: body.identifier,
            trust_level: TrustLevel::UNVERIFIED,
            expires_in: state.args.jwt_expiry_seconds,
        },
    )
}

/// POST /auth/login
///
/// Unknown identifier and wrong password answer with the same generic 401
/// so that accounts cannot be enumerated.
async fn handle_login(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let body: LoginRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return fail(e),
    };

    if body.identifier.is_empty() || body.password.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Missing required fields: identifier, password",
            None,
        );
    }

    let collection = match state.mongo.collection::<UserDoc>(USER_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    let user = match collection
        .find_one(doc! { "identifier": &body.identifier })
        .await
    {
        Ok(Some(u)) => u,
        Ok(None) => {
            warn!("Login failed - user not found: {}", body.identifier);
            return json_response(
                StatusCode::UNAUTHORIZED,
                &ErrorResponse {
                    error: "Invalid credentials".into(),
                    code: Some("INVALID_CREDENTIALS".into()),
                },
            );
        }
        Err(e) => return fail(e),
    };

    let password_valid = match verify_password(&body.password, &user.password_hash) {
        Ok(valid) => valid,
        Err(e) => {
            warn!("Password verification error: {}", e);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Authentication error",
                Some("AUTH_ERROR"),
            );
        }
    };

    if !password_valid {
        warn!("Login failed - invalid password: {}", body.identifier);
        return error_response(
            StatusCode::UNAUTHORIZED,
            "Invalid credentials",
            Some("INVALID_CREDENTIALS"),
        );
    }

    let user_id = match user._id {
        Some(id) => id,
        None => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "User record is missing its id",
                Some("DB_ERROR"),
            )
        }
    };

    let token = match state.jwt.generate_token(TokenInput {
        user_id: user_id.to_hex(),
        identifier: user.identifier.clone(),
    }) {
        Ok(t) => t,
        Err(e) => return fail(e),
    };

    info!("Login successful: {}", body.identifier);

    json_response(
        StatusCode::OK,
        &AuthResponse {
            token,
            user_id: user_id.to_hex(),
            identifier: user.identifier,
            trust_level: user.trust_level,
            expires_in: state.args.jwt_expiry_seconds,
        },
    )
}

/// GET /auth/me
async fn handle_me(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let caller = match authenticate(&req, &state).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    json_response(
        StatusCode::OK,
        &MeResponse {
            user_id: caller.id.to_hex(),
            identifier: caller.doc.identifier,
            handle: caller.doc.handle,
            trust_level: caller.doc.trust_level,
        },
    )
}

/// POST /auth/send-otp
///
/// Issue an OTP for the caller's own account. Without a mail transport the
/// code is written to the log; dev mode also echoes it in the response.
async fn handle_send_otp(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
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

    let otp = state.otps.issue(&caller.doc.identifier);
    info!("Issued OTP for {}: {}", caller.doc.identifier, otp);

    let echoed = state.args.dev_mode.then_some(otp);

    json_response(
        StatusCode::OK,
        &OtpIssuedResponse {
            success: true,
            message: "One-time password issued".into(),
            otp: echoed,
        },
    )
}

/// POST /auth/verify-otp
///
/// Redeem an OTP; promotes a level-0 caller to level 1.
async fn handle_verify_otp(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let caller = match authenticate(&req, &state).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let body: VerifyOtpRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return fail(e),
    };

    if !state.otps.verify(&caller.doc.identifier, &body.code) {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Invalid or expired code",
            Some("INVALID_OTP"),
        );
    }

    let new_level = if caller.doc.trust_level == TrustLevel::UNVERIFIED {
        let collection = match state.mongo.collection::<UserDoc>(USER_COLLECTION).await {
            Ok(c) => c,
            Err(e) => return fail(e),
        };

        let update = doc! {
            "$set": {
                "trust_level": TrustLevel::VERIFIED.to_string(),
                "metadata.updated_at": bson::DateTime::now(),
            }
        };
        if let Err(e) = collection.update_one(doc! { "_id": caller.id }, update).await {
            return fail(e);
        }

        info!("User {} verified via OTP", caller.doc.identifier);
        TrustLevel::VERIFIED
    } else {
        caller.doc.trust_level
    };

    json_response(
        StatusCode::OK,
        &VerifiedResponse {
            success: true,
            trust_level: new_level,
        },
    )
}

/// POST /auth/set-handle
///
/// Claim a public handle. Handles are unique and immutable once set.
async fn handle_set_handle(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let caller = match authenticate(&req, &state).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let body: SetHandleRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return fail(e),
    };

    if !UserDoc::is_valid_handle(&body.handle) {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Handle must start with '@' followed by at least one character",
            Some("INVALID_HANDLE"),
        );
    }

    if caller.doc.handle.is_some() {
        return error_response(
            StatusCode::CONFLICT,
            "Handle is already set and cannot be changed",
            Some("HANDLE_IMMUTABLE"),
        );
    }

    let collection = match state.mongo.collection::<UserDoc>(USER_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    let update = doc! {
        "$set": {
            "handle": &body.handle,
            "metadata.updated_at": bson::DateTime::now(),
        }
    };
    if let Err(e) = collection.update_one(doc! { "_id": caller.id }, update).await {
        let error_str = e.to_string();
        if error_str.contains("duplicate key") || error_str.contains("E11000") {
            return error_response(
                StatusCode::CONFLICT,
                "This handle is already taken",
                Some("HANDLE_TAKEN"),
            );
        }
        return fail(e);
    }

    info!("User {} claimed handle {}", caller.doc.identifier, body.handle);

    json_response(
        StatusCode::OK,
        &SuccessResponse {
            success: true,
            message: format!("Handle {} claimed", body.handle),
        },
    )
}

/// DELETE /auth/account
///
/// Soft-delete the caller's account. The document stays in storage but is
/// invisible to every read path from this point on.
async fn handle_delete_account(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let caller = match authenticate(&req, &state).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let collection = match state.mongo.collection::<UserDoc>(USER_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    if let Err(e) = collection.soft_delete(doc! { "_id": caller.id }).await {
        return fail(e);
    }

    // Outstanding verification codes naming this account die with it
    state.codes.purge_user(&caller.id);

    info!("Account deleted: {}", caller.doc.identifier);

    json_response(
        StatusCode::OK,
        &SuccessResponse {
            success: true,
            message: "Account deleted".into(),
        },
    )
}
