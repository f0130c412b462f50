//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. Routing is by URL
//! prefix; each prefix hands off to its module's dispatcher.

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::auth::JwtValidator;
use crate::config::Args;
use crate::db::MongoClient;
use crate::routes::{self, BoxBody};
use crate::services::{OtpStore, VerificationCodeStore};
use crate::types::AgoraError;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub mongo: MongoClient,
    pub jwt: JwtValidator,
    /// Pending verification codes (peer verification)
    pub codes: Arc<VerificationCodeStore>,
    /// Pending one-time passwords (self verification)
    pub otps: Arc<OtpStore>,
    /// Server start time, for uptime reporting
    pub started: Instant,
}

impl AppState {
    pub fn new(args: Args, mongo: MongoClient, jwt: JwtValidator) -> Self {
        let codes = Arc::new(VerificationCodeStore::new(std::time::Duration::from_secs(
            args.code_ttl_seconds,
        )));
        let otps = Arc::new(OtpStore::new(std::time::Duration::from_secs(
            args.otp_ttl_seconds,
        )));

        Self {
            args,
            mongo,
            jwt,
            codes,
            otps,
            started: Instant::now(),
        }
    }
}

/// Run the HTTP server until the process is stopped
pub async fn run(state: Arc<AppState>) -> Result<(), AgoraError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Agora listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    if state.args.dev_mode {
        warn!("Development mode enabled - default JWT secret in use");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("{} {} from {}", method, path, addr);

    if method == Method::OPTIONS {
        return Ok(routes::cors_preflight());
    }

    let response = match path.as_str() {
        "/health" | "/healthz" => routes::health::handle_health(state),
        "/version" => routes::health::handle_version(),

        p if p == "/auth" || p.starts_with("/auth/") => {
            routes::auth_routes::handle_auth_request(req, state, &path).await
        }
        p if p == "/posts" || p.starts_with("/posts/") => {
            routes::posts::handle_posts_request(req, state, &path).await
        }
        p if p == "/users" || p.starts_with("/users/") => {
            routes::users::handle_users_request(req, state, &path).await
        }
        p if p == "/verification" || p.starts_with("/verification/") => {
            routes::verification::handle_verification_request(req, state, &path).await
        }
        p if p == "/bookmarks" || p.starts_with("/bookmarks/") => {
            routes::bookmarks::handle_bookmarks_request(req, state, &path).await
        }

        _ => routes::not_found(),
    };

    Ok(response)
}
