use std::path::PathBuf;
use std::sync::Arc;

use agentmesh_analytics::Analytics;
use agentmesh_bus::Bus;
use agentmesh_domain::config::Config;
use agentmesh_facade::MeshFacade;
use agentmesh_scheduler::Scheduler;
use agentmesh_store::Store;

/// Shared application state passed to all API handlers.
///
/// Fields are grouped by concern:
/// - **Core services** — config, the durable store, the event bus
/// - **Derived services** — analytics rollups, the heartbeat scheduler,
///   the unified mesh facade (all built on top of store/bus)
/// - **Security** — the admin token hash, computed once at startup
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub config_path: PathBuf,
    pub store: Arc<dyn Store>,
    pub bus: Arc<Bus>,

    // ── Derived services ──────────────────────────────────────────────
    pub analytics: Arc<Analytics>,
    pub scheduler: Arc<Scheduler>,
    pub facade: Arc<MeshFacade>,

    // ── Security (startup-computed) ───────────────────────────────────
    /// SHA-256 hash of the admin bearer token (read once at startup).
    /// `None` = dev mode (control surface accessible without auth).
    pub admin_token_hash: Option<Vec<u8>>,

    // ── Lifecycle ────────────────────────────────────────────────────
    pub shutdown_tx: Arc<tokio::sync::Notify>,
}
