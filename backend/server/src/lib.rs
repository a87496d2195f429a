//! Documentation of a contact form intake service.
//!
//!
//!
//! # General Infrastructure
//! - Static site posts its contact form as JSON to `/submit-contact`
//! - Reverse proxy in front sets `X-Forwarded-For`, which is the client identity
//! - One process, in-memory rate limiter, one outbound HTTP client shared by the sinks
//! - Store is either a PostgREST-style REST endpoint or Redis
//! - Owner gets a chat message per submission when a bot token and chat id are configured
//!
//!
//!
//! # Abuse Limits
//!
//! **Goal**: Keep a single client from flooding the store and the owner's chat.
//!
//! - Fixed window per client address, 5 submissions per hour by default
//! - Denied requests get a 429 with the seconds left in the window
//! - Limit is per process, running several instances multiplies it
//! - Window edges can admit up to twice the cap in a short span, accepted for O(1) state
//!
//!
//!
//! # Side Effects
//!
//! Notification and storage are independent. The notification goes first so the record can
//! carry its outcome (`telegram_sent`, `telegram_sent_at`).
//!
//! | Notification | Store | Response |
//! |---|---|---|
//! | sent / suppressed / failed | ok | 200, `notificationSent` reflects the outcome |
//! | any | failed | 500, a sent notification is not recalled |
//!
//! Nothing is retried. A client resubmitting after a 500 creates a new record.
//!
//!
//!
//! # Setup
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
//!
//! Run locally against a REST store.
//! ```sh
//! STORE_URL=http://localhost:54321 STORE_KEY=dev RUST_LOG=info cargo run -p intake
//! ```
//!
//! See [`config`] for every recognized variable.
use std::{any::Any, net::SocketAddr};

use axum::{
    Router,
    http::{
        HeaderValue,
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN,
        },
    },
    response::{IntoResponse, Response},
    routing::any,
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::{
    catch_panic::CatchPanicLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

pub mod config;
pub mod error;
pub mod limiter;
pub mod notify;
pub mod routes;
pub mod state;
pub mod store;
pub mod utils;
pub mod validate;

use config::Config;
use error::AppError;
use routes::contact_handler;
use state::State;

pub async fn start_server() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Loading config...");
    let config = Config::load()?;

    info!("Initializing state...");
    let state = State::new(&config).await?;

    info!("Starting server...");

    let address = format!("0.0.0.0:{}", config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server shut down");

    Ok(())
}

pub fn app(state: std::sync::Arc<State>) -> Router {
    Router::new()
        .route("/submit-contact", any(contact_handler))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("POST, OPTIONS"),
        ))
        .with_state(state)
}

fn handle_panic(_err: Box<dyn Any + Send + 'static>) -> Response {
    error!("Handler panicked");

    AppError::Internal.into_response()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
