use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{delete, get, patch, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use confab_api::auth::{self, AppState, AppStateInner};
use confab_api::middleware::{jwt_secret, require_auth};
use confab_api::policy::restrict_by_hour;
use confab_api::rate_limit::RateLimiter;
use confab_api::{conversations, history, messages, notifications, threads};

mod sweep;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "confab=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret = jwt_secret();
    let db_path = std::env::var("CONFAB_DB_PATH").unwrap_or_else(|_| "confab.db".into());
    let host = std::env::var("CONFAB_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("CONFAB_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let sweep_secs: u64 = std::env::var("CONFAB_LIMITER_SWEEP_SECS")
        .unwrap_or_else(|_| "300".into())
        .parse()?;

    // Init database
    let db = confab_db::Database::open(&PathBuf::from(&db_path))?;

    // Shared state; the limiter lives for the whole process and is never
    // persisted across restarts.
    let app_state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret,
        limiter: RateLimiter::new(),
    });

    tokio::spawn(sweep::run_sweep_loop(app_state.clone(), sweep_secs));

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(app_state.clone());

    let account_routes = Router::new()
        .route("/auth/account", delete(auth::delete_account))
        .route("/notifications", get(notifications::list_notifications))
        .route("/history", get(history::list_history))
        .layer(middleware::from_fn(require_auth))
        .with_state(app_state.clone());

    // The chat namespace is time-gated on top of auth. Layers run outermost
    // last-added, so require_auth is added after restrict_by_hour to keep
    // the identity check first in the pipeline; role and participation run
    // inside the handlers.
    let conversation_routes = Router::new()
        .route("/conversations", post(conversations::create_conversation))
        .route("/conversations", get(conversations::list_conversations))
        .route("/conversations/{conversation_id}", get(conversations::get_conversation))
        .route("/conversations/{conversation_id}", delete(conversations::delete_conversation))
        .route(
            "/conversations/{conversation_id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route(
            "/conversations/{conversation_id}/messages/{message_id}",
            patch(messages::edit_message).delete(messages::delete_message),
        )
        .route(
            "/conversations/{conversation_id}/messages/{message_id}/thread",
            get(threads::get_thread),
        )
        .layer(middleware::from_fn(restrict_by_hour))
        .layer(middleware::from_fn(require_auth))
        .with_state(app_state);

    let app = Router::new()
        .merge(public_routes)
        .merge(account_routes)
        .merge(conversation_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Confab server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
