//! Service wiring and HTTP serving.
//!
//! [`AppState`] constructs every component from an explicit config plus the
//! three collaborator handles (document index, inventory source, session
//! store) — no ambient global state. [`serve`] runs the axum router with
//! request tracing and ctrl-c graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::StratusConfig;
use crate::context::{ContextBuilder, GeneralContextService};
use crate::index::memory::InMemoryIndex;
use crate::index::DocumentIndex;
use crate::inventory::InventoryService;
use crate::memory::MemoryService;
use crate::provider::{FixtureSource, InventorySource};
use crate::reconcile::ReconcileService;
use crate::scope::ScopeLocks;
use crate::search::SearchCoordinator;
use crate::sessions::{InMemorySessionStore, SessionService, SessionStore};

/// Everything the API handlers need, cheaply cloneable.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<StratusConfig>,
    pub search: SearchCoordinator,
    pub memory: MemoryService,
    pub sessions: SessionService,
    pub inventory: InventoryService,
    pub reconcile: ReconcileService,
    pub context: ContextBuilder,
    pub general: GeneralContextService,
}

impl AppState {
    /// Wire all components over the given collaborators.
    pub fn new(
        config: StratusConfig,
        index: Arc<dyn DocumentIndex>,
        source: Arc<dyn InventorySource>,
        session_store: Arc<dyn SessionStore>,
    ) -> Self {
        let locks = ScopeLocks::new();
        let search = SearchCoordinator::new(
            index.clone(),
            Duration::from_millis(config.retrieval.group_timeout_ms),
        );
        let sessions = SessionService::new(
            session_store,
            locks.clone(),
            config.session.default_ttl_seconds,
        );
        let inventory = InventoryService::new(index.clone(), source, locks.clone());
        let reconcile = ReconcileService::new(index.clone(), inventory.clone(), locks.clone());
        let context = ContextBuilder::new(
            search.clone(),
            sessions.clone(),
            config.retrieval.context_retrieve_k,
        );
        let general = GeneralContextService::new(index.clone(), search.clone());
        let memory = MemoryService::new(index, search.clone(), locks);

        Self {
            config: Arc::new(config),
            search,
            memory,
            sessions,
            inventory,
            reconcile,
            context,
            general,
        }
    }

    /// State over the bundled in-process backends.
    pub fn in_process(config: StratusConfig) -> Self {
        Self::new(
            config,
            Arc::new(InMemoryIndex::new()),
            Arc::new(FixtureSource::new()),
            Arc::new(InMemorySessionStore::new()),
        )
    }
}

/// Start the HTTP server and block until shutdown.
pub async fn serve(config: StratusConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::in_process(config);

    let router = crate::api::router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "stratus listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to listen for ctrl-c");
            info!("shutting down");
        })
        .await?;

    Ok(())
}
