//! Agora - social posting backend with staged visibility

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agora::{
    auth::JwtValidator,
    config::Args,
    db::MongoClient,
    db::schemas::{PostDoc, POST_COLLECTION},
    scheduler, server,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("agora={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Agora - staged posting backend");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!(
        "Mode: {}",
        if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" }
    );
    info!("MongoDB: {}", args.mongodb_uri);
    info!(
        "Publication sweep: every {}s, threshold {}s",
        args.sweep_interval_seconds, args.publish_threshold_seconds
    );
    info!("======================================");

    // Connect to MongoDB
    let mongo = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => {
            info!("MongoDB connected successfully");
            client
        }
        Err(e) => {
            error!("MongoDB connection failed: {}", e);
            std::process::exit(1);
        }
    };

    // JWT validator, shared across all requests
    let jwt = if args.dev_mode && args.jwt_secret.is_none() {
        JwtValidator::new_dev()
    } else {
        match args.jwt_secret() {
            Some(secret) => match JwtValidator::new(secret, args.jwt_expiry_seconds) {
                Ok(j) => j,
                Err(e) => {
                    error!("JWT configuration error: {}", e);
                    std::process::exit(1);
                }
            },
            None => {
                error!("JWT_SECRET is required in production mode");
                std::process::exit(1);
            }
        }
    };

    let state = Arc::new(server::AppState::new(args.clone(), mongo.clone(), jwt));

    // Background publication sweep
    let posts = mongo.collection::<PostDoc>(POST_COLLECTION).await?;
    scheduler::spawn_sweep_task(
        posts,
        Duration::from_secs(args.sweep_interval_seconds),
        Duration::from_secs(args.publish_threshold_seconds),
    );

    // Ephemeral store expiry
    agora::services::spawn_code_cleanup_task(Arc::clone(&state.codes));
    agora::services::spawn_otp_cleanup_task(Arc::clone(&state.otps));

    server::run(state).await?;

    Ok(())
}
