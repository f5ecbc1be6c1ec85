//! Service wiring: build each endpoint's router from configuration.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use weft_bus::{EventBusConfig, EventBusService};
use weft_context::{
    ContextStore, ContextToolConfig, ContextToolService, MemoryContextStore, SqliteContextStore,
    TelemetryHub,
};
use weft_cred::SigningKey;
use weft_registry::{RegistryConfig, RegistryService};
use weft_resilience::{TelemetrySink, TracingSink};
use weft_wire::RpcServer;

use crate::config::WeftConfig;
use crate::error::WeftResult;

/// Context key seeded in demo mode.
pub const DEMO_CONTEXT_KEY: &str = "inventory:prod_12345:stock_count";

/// Telemetry stream fed by the demo publisher.
pub const DEMO_TELEMETRY_STREAM: &str = "fleet123:engine_temp";

/// Resolve the signing key from configuration, generating a fresh one when
/// no secret is configured.
pub fn resolve_key(config: &WeftConfig) -> WeftResult<SigningKey> {
    if config.auth.shared_secret_hex.is_empty() {
        tracing::warn!("no shared secret configured; generating an ephemeral signing key");
        return Ok(SigningKey::generate());
    }
    Ok(SigningKey::from_hex(&config.auth.shared_secret_hex)?)
}

fn telemetry_sink() -> Arc<dyn TelemetrySink> {
    Arc::new(TracingSink)
}

/// Build the discovery registry endpoint.
pub fn build_registry(config: &WeftConfig, key: &SigningKey) -> (RpcServer, Arc<RegistryService>) {
    let service = Arc::new(RegistryService::new(
        RegistryConfig {
            server_name: config.registry.server_name.clone(),
            max_record_age: config.registry.max_record_age_secs.map(Duration::from_secs),
        },
        key.clone(),
        telemetry_sink(),
    ));
    let mut server = RpcServer::new();
    weft_registry::rpc::register_routes(&service, &mut server);
    (server, service)
}

/// Build the context/tool endpoint, choosing the store from configuration.
pub fn build_context(
    config: &WeftConfig,
    key: &SigningKey,
) -> WeftResult<(RpcServer, Arc<ContextToolService>)> {
    let store: Arc<dyn ContextStore> = match &config.context.store_path {
        Some(path) => Arc::new(SqliteContextStore::open(path)?),
        None => {
            let store = MemoryContextStore::new();
            if config.demo {
                seed_demo_context(&store);
            }
            Arc::new(store)
        }
    };

    let service = Arc::new(ContextToolService::new(
        ContextToolConfig {
            server_name: config.context.server_name.clone(),
            context_scope: config.context.context_scope.clone(),
            cache_ttl: Duration::from_secs(config.context.cache_ttl_secs),
            cache_max_entries: config.context.cache_max_entries,
            breaker_threshold: config.context.breaker_threshold,
            breaker_recovery: Duration::from_secs(config.context.breaker_recovery_secs),
            stream_queue_depth: config.context.stream_queue_depth,
        },
        key.clone(),
        store,
        telemetry_sink(),
    ));
    let mut server = RpcServer::new();
    weft_context::rpc::register_routes(&service, &mut server);
    Ok((server, service))
}

/// Build the event bus endpoint.
pub fn build_bus(config: &WeftConfig, key: &SigningKey) -> (RpcServer, Arc<EventBusService>) {
    let service = Arc::new(EventBusService::new(
        EventBusConfig {
            server_name: config.bus.server_name.clone(),
            queue_depth: config.bus.queue_depth,
        },
        key.clone(),
        telemetry_sink(),
    ));
    let mut server = RpcServer::new();
    weft_bus::rpc::register_routes(&service, &mut server);
    (server, service)
}

/// Seed the demo inventory entry.
pub fn seed_demo_context(store: &MemoryContextStore) {
    store.insert(DEMO_CONTEXT_KEY, b"42".to_vec(), Vec::new());
    tracing::info!(context_key = DEMO_CONTEXT_KEY, "seeded demo context entry");
}

/// Inject an engine-temperature frame into the demo telemetry stream every
/// five seconds.
pub fn spawn_demo_publisher(hub: TelemetryHub) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(5));
        loop {
            ticker.tick().await;
            let temp = 65 + (weft_core::Timestamp::now().seconds_since_epoch % 10);
            let payload = format!("{{\"engine_temp\":{}}}", temp);
            let delivered = hub.publish(DEMO_TELEMETRY_STREAM, payload.as_bytes());
            tracing::debug!(delivered, "demo telemetry frame published");
        }
    })
}

/// Bind and serve one endpoint, returning its task handle.
pub async fn spawn_endpoint(server: RpcServer, bind: &str) -> WeftResult<JoinHandle<()>> {
    let listener = TcpListener::bind(bind).await?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "endpoint listening");
    Ok(tokio::spawn(async move {
        if let Err(e) = server.serve(listener).await {
            tracing::error!(error = %e, "endpoint terminated");
        }
    }))
}
