use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use sha2::{Digest, Sha256};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use agentmesh_bus::Bus;
use agentmesh_domain::config::{Config, ConfigSeverity, StoreConfig};
use agentmesh_facade::MeshFacade;
use agentmesh_gateway::api;
use agentmesh_gateway::cli::{Cli, Command, ConfigCommand, SystemdCommand};
use agentmesh_gateway::state::AppState;
use agentmesh_gateway::webhook::WebhookAgentHandler;
use agentmesh_scheduler::Scheduler;
use agentmesh_store::memory::MemoryStore;
use agentmesh_store::{SqliteStore, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to serve when no subcommand is given.
        None | Some(Command::Serve) => {
            init_tracing();
            let (config, config_path) = agentmesh_gateway::cli::load_config()?;
            run_server(Arc::new(config), config_path).await
        }
        Some(Command::Doctor) => {
            let (config, config_path) = agentmesh_gateway::cli::load_config()?;
            let passed = agentmesh_gateway::cli::doctor::run(&config, &config_path).await?;
            if !passed {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = agentmesh_gateway::cli::load_config()?;
            let valid = agentmesh_gateway::cli::config::validate(&config, &config_path);
            if !valid {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _config_path) = agentmesh_gateway::cli::load_config()?;
            agentmesh_gateway::cli::config::show(&config);
            Ok(())
        }
        Some(Command::Systemd(SystemdCommand::Generate {
            user,
            working_dir,
            config,
        })) => {
            agentmesh_gateway::cli::systemd::generate(&user, working_dir.as_deref(), &config);
            Ok(())
        }
        Some(Command::Version) => {
            println!("agentmesh {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Initialize structured JSON tracing (only for the `serve` command).
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,agentmesh_gateway=debug")),
        )
        .json()
        .init();
}

/// Start the control-surface server with the given configuration.
async fn run_server(config: Arc<Config>, config_path: String) -> anyhow::Result<()> {
    tracing::info!("agentmesh starting");

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Durable store ─────────────────────────────────────────────────
    // Store-open failures exit with code 2 (distinct from the generic
    // config-error exit code 1), since the store is reachable-or-not
    // independent of whether the config itself parses cleanly.
    let store: Arc<dyn Store> = match &config.store {
        StoreConfig::Embedded(embedded) => {
            let path = Path::new(&embedded.path);
            if let Some(parent) = path.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    tracing::error!(error = %e, dir = %parent.display(), "creating store directory");
                    std::process::exit(2);
                }
            }
            match SqliteStore::open(path, embedded.busy_timeout_ms) {
                Ok(store) => {
                    tracing::info!(path = %embedded.path, "embedded store ready");
                    Arc::new(store)
                }
                Err(e) => {
                    tracing::error!(error = %e, path = %embedded.path, "opening embedded store");
                    std::process::exit(2);
                }
            }
        }
        StoreConfig::Clustered(clustered) => {
            tracing::warn!(
                endpoint = %clustered.endpoint,
                "clustered store profile selected but no strictly-serializable KV \
                 client is available in this workspace — falling back to an \
                 in-memory store. Do not run this profile in production."
            );
            Arc::new(MemoryStore::new())
        }
    };

    // ── Event bus ─────────────────────────────────────────────────────
    let bus = Arc::new(Bus::new(config.bus.shard_count));
    tracing::info!(shard_count = config.bus.shard_count, "event bus ready");

    // ── Analytics ─────────────────────────────────────────────────────
    let analytics = Arc::new(agentmesh_analytics::Analytics::new(
        config.analytics.retention_days,
    ));
    tracing::info!(
        retention_days = config.analytics.retention_days,
        "analytics ready"
    );

    // ── Heartbeat scheduler ──────────────────────────────────────────
    let agent_handler = Arc::new(WebhookAgentHandler::new(
        config.scheduler.agent_callback_url_template.clone(),
        std::time::Duration::from_millis(config.scheduler.agent_callback_timeout_ms),
    ));
    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        Some(bus.clone()),
        agent_handler,
        Some(analytics.clone()),
        config.scheduler.clone(),
    ));
    tracing::info!("heartbeat scheduler ready");

    // ── Unified mesh facade ──────────────────────────────────────────
    let facade = Arc::new(MeshFacade::new(
        "agentmesh-gateway",
        Some(store.clone()),
        Some(bus.clone()),
    ));
    tracing::info!("mesh facade ready");

    // ── Admin token (read once, hash for constant-time comparison) ──
    let admin_token_hash = match std::env::var(&config.admin.token_env) {
        Ok(token) if !token.is_empty() => {
            tracing::info!(env_var = %config.admin.token_env, "admin bearer-token auth enabled");
            Some(Sha256::digest(token.as_bytes()).to_vec())
        }
        _ => {
            tracing::warn!(
                env_var = %config.admin.token_env,
                "admin bearer-token auth DISABLED — set this env var to enable"
            );
            None
        }
    };

    // ── App state ─────────────────────────────────────────────────────
    let state = AppState {
        config: config.clone(),
        config_path: config_path.clone().into(),
        store,
        bus,
        analytics: analytics.clone(),
        scheduler: scheduler.clone(),
        facade,
        admin_token_hash,
        shutdown_tx: Arc::new(tokio::sync::Notify::new()),
    };

    // ── Heartbeat scheduler loop (hydration + tick) ──────────────────
    {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            scheduler.run().await;
        });
    }
    tracing::info!("heartbeat scheduler loop started");

    // ── Periodic analytics compaction ────────────────────────────────
    {
        let analytics = analytics.clone();
        let interval_ms = config.analytics.compaction_interval_ms;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
            loop {
                interval.tick().await;
                analytics.compact();
            }
        });
    }
    tracing::info!("analytics compaction loop started");

    // ── CORS layer (config-aware) ────────────────────────────────────
    let cors_layer = build_cors_layer(&config.server.cors);

    // ── Concurrency limit (backpressure protection) ─────────────────
    let max_concurrent = std::env::var("AGENTMESH_MAX_CONCURRENT_REQUESTS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(256);
    tracing::info!(max_concurrent, "concurrency limit set");

    // ── Rate-limit layer (per-IP token bucket via governor) ──────────
    let governor_layer = config.server.rate_limit.as_ref().map(|rl| {
        use tower_governor::governor::GovernorConfigBuilder;
        use tower_governor::GovernorLayer;

        let gov_config = GovernorConfigBuilder::default()
            .per_second(rl.requests_per_second)
            .burst_size(rl.burst_size)
            .finish()
            .expect("rate_limit: requests_per_second and burst_size must be > 0");

        tracing::info!(
            requests_per_second = rl.requests_per_second,
            burst_size = rl.burst_size,
            "per-IP rate limiting enabled"
        );

        GovernorLayer {
            config: std::sync::Arc::new(gov_config),
        }
    });
    if governor_layer.is_none() {
        tracing::info!("per-IP rate limiting disabled (no [server.rate_limit] in config)");
    }

    // ── Router ─────────────────────────────────────────────────────────
    let router = api::router(state.clone())
        .layer(cors_layer)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_concurrent));
    let app = if let Some(gov) = governor_layer {
        router.layer(gov).with_state(state)
    } else {
        router.with_state(state)
    };

    // ── Bind ───────────────────────────────────────────────────────────
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "agentmesh listening");

    axum::serve(listener, app).await.context("axum server error")?;

    Ok(())
}

/// Build a [`CorsLayer`] from the configured allowed origins.
///
/// Origins may contain a trailing `*` wildcard for the port segment
/// (e.g. `http://localhost:*`). These are expanded into a predicate that
/// matches any port on that host. A literal `"*"` allows all origins
/// (not recommended for production).
fn build_cors_layer(cors: &agentmesh_domain::config::CorsConfig) -> CorsLayer {
    use axum::http::header;

    // Special case: if the only entry is "*", use fully permissive CORS.
    // Note: allow_credentials is incompatible with wildcard origins.
    if cors.allowed_origins.len() == 1 && cors.allowed_origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard \"*\" — all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    // Partition into exact origins and wildcard-port patterns.
    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();

    for origin in &cors.allowed_origins {
        if origin.ends_with(":*") {
            // e.g. "http://localhost:*" -> prefix "http://localhost:"
            let prefix = origin.trim_end_matches('*').to_owned();
            wildcard_prefixes.push(prefix);
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            // Validate the remainder is digits only, to prevent a
            // prefix-based bypass (e.g. "http://localhost:3000.evil.com").
            wildcard_prefixes.iter().any(|prefix| {
                origin_str
                    .strip_prefix(prefix.as_str())
                    .map(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
                    .unwrap_or(false)
            })
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
