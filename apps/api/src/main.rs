mod backends;
mod config;
mod domain;
mod errors;
mod extraction;
mod llm_client;
mod merge;
mod routes;
mod schema;
mod session;
mod state;
mod xml;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::backends::{MockServiceAbsEinarbeiter, MockTardis};
use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::schema::FieldRegistry;
use crate::session::SessionStore;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter_directive(&config.rust_log))),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Antrag API v{}", env!("CARGO_PKG_VERSION"));

    // Immutable field schema, shared by all sessions
    let registry = Arc::new(FieldRegistry::kraftfahrt());
    info!("Field registry loaded ({} fields)", registry.fields().len());

    // Initialize LLM client
    let llm = LlmClient::new(config.anthropic_api_key.clone());
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    // Backend collaborators — mocks until the real services are wired up
    let persistence = Arc::new(MockServiceAbsEinarbeiter);
    let contracts = Arc::new(MockTardis);

    let state = AppState {
        registry,
        sessions: Arc::new(SessionStore::default()),
        llm,
        persistence,
        contracts,
        config: config.clone(),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Default filter when `RUST_LOG` is unset. Tracing targets use the module
/// path (`antrag_api::…`), so the package name needs its hyphens mapped to
/// underscores or the directive never matches and the service goes silent.
fn default_filter_directive(rust_log: &str) -> String {
    format!("{}={}", env!("CARGO_PKG_NAME").replace('-', "_"), rust_log)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_targets_module_path_not_package_name() {
        let directive = default_filter_directive("info");
        assert_eq!(directive, "antrag_api=info");
        assert!(!directive.contains('-'));
    }
}
