use std::sync::Arc;

use crate::backends::{AntragPersistence, ContractSource};
use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::schema::FieldRegistry;
use crate::session::SessionStore;

/// Shared application state injected into all route handlers via Axum
/// extractors. The registry is immutable and shared read-only; sessions are
/// owned by the store.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<FieldRegistry>,
    pub sessions: Arc<SessionStore>,
    pub llm: LlmClient,
    /// Persistence collaborator (ServiceABSEinarbeiter). Mock by default.
    pub persistence: Arc<dyn AntragPersistence>,
    /// Legacy contract system (Tardis) for product-tree hydration.
    pub contracts: Arc<dyn ContractSource>,
    /// Kept for handlers that will need runtime configuration later.
    #[allow(dead_code)]
    pub config: Config,
}
