//! Relay Gateway - One chat endpoint in front of several LLM providers.
//!
//! This crate provides:
//! - Per-session transcripts in Redis (or memory) with a 24h expiry
//! - Provider adapters for Gemini, Llama (Perplexity), Claude and ChatGPT
//! - Conversation assembly: seed, append, call, persist
//! - The HTTP router (`/chat`, `/chat/history`, `/health`)
//!
//! ## Architecture
//!
//! ```text
//! Client → Router → Assembler (store.get) → Provider → LLM API
//!                        ↓
//!                   store.set
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod assembler;
pub mod error;
pub mod message;
pub mod provider;
pub mod routes;
pub mod store;

pub use assembler::ConversationAssembler;
pub use error::{ErrorResponse, GatewayError};
pub use message::{Message, Role, Transcript};
pub use provider::{
    create_registry, AnthropicProvider, CompatibleProvider, GeminiProvider, Provider,
    ProviderError, ProviderRegistry,
};
pub use routes::AppState;
pub use store::{
    connect_store, MemorySessionStore, RedisSessionStore, SessionStore, StatelessStore,
    StoreError, SESSION_TTL,
};

use axum::http::{header, HeaderValue, Method};
use axum::middleware;
use axum::response::Response;
use axum::Router;
use relay_common::config::Config;
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;

/// Maximum accepted request body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Build the gateway router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .merge(routes::chat_routes(state.clone()))
        .merge(routes::health_routes(state))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors)
        .layer(middleware::map_response(permit_methods_and_headers))
}

/// `CorsLayer` only sets allow-methods/allow-headers on preflights; legacy
/// clients expect them on every response.
async fn permit_methods_and_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers
        .entry(header::ACCESS_CONTROL_ALLOW_METHODS)
        .or_insert(HeaderValue::from_static("POST, GET, OPTIONS"));
    headers
        .entry(header::ACCESS_CONTROL_ALLOW_HEADERS)
        .or_insert(HeaderValue::from_static("Content-Type"));
    response
}

/// Connect the configured store and build the router.
pub async fn build_app(config: &Config) -> anyhow::Result<Router> {
    let store = connect_store(&config.store).await?;
    Ok(build_router(AppState::new(config, store)))
}

/// Start the gateway server and run until Ctrl-C or SIGTERM.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let addr: SocketAddr = config.bind_address().parse()?;
    let router = build_app(config).await?;

    tracing::info!("Starting Relay Gateway on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Relay Gateway stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
