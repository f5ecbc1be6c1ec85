//! The context/tool service.
//!
//! Four operations, each framed by breaker admission (where configured),
//! token verification, capability and audience checks, and telemetry on
//! every exit path.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use weft_core::Timestamp;
use weft_cred::{
    has_audience, has_capability, verify, verify_delegation, CapabilityClaims, CredError,
    SigningKey,
};
use weft_resilience::{CallTimer, CircuitBreaker, TelemetrySink, TtlCache};
use weft_wire::proto;
use weft_wire::{Metadata, Status, PEER_ADDR_KEY};

use crate::multimodal::{EchoProcessor, FrameProcessor};
use crate::store::ContextStore;
use crate::telemetry_hub::{TelemetryHub, TelemetrySubscription};
use crate::tools::ToolRegistry;

/// Scope required to subscribe to telemetry streams.
pub const TELEMETRY_SCOPE: &str = "telemetry:read";

/// Scope required to open a multimodal exchange.
pub const MULTIMODAL_SCOPE: &str = "tool:multimodal_exchange";

/// Metadata key carrying the capability token on streaming calls.
pub const TOKEN_METADATA_KEY: &str = "capability_token";

#[derive(Debug, Clone)]
pub struct ContextToolConfig {
    /// Name this instance answers to in audience checks. A provider that
    /// registered as `InventoryDB_Primary` runs with that name here.
    pub server_name: String,
    /// Scope required by `RequestContext`; deployment-specific.
    pub context_scope: String,
    pub cache_ttl: Duration,
    pub cache_max_entries: usize,
    pub breaker_threshold: u32,
    pub breaker_recovery: Duration,
    /// Queue depth for telemetry and multimodal stream sinks.
    pub stream_queue_depth: usize,
}

impl Default for ContextToolConfig {
    fn default() -> Self {
        Self {
            server_name: "ContextToolServer".to_string(),
            context_scope: "db:inventory:read".to_string(),
            cache_ttl: Duration::from_secs(60),
            cache_max_entries: 1024,
            breaker_threshold: 3,
            breaker_recovery: Duration::from_secs(30),
            stream_queue_depth: 64,
        }
    }
}

pub struct ContextToolService {
    config: ContextToolConfig,
    key: SigningKey,
    store: Arc<dyn ContextStore>,
    cache: TtlCache<String, proto::ContextResponse>,
    breaker: Mutex<CircuitBreaker>,
    hub: TelemetryHub,
    tools: ToolRegistry,
    processor: Arc<dyn FrameProcessor>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl ContextToolService {
    pub fn new(
        config: ContextToolConfig,
        key: SigningKey,
        store: Arc<dyn ContextStore>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        let cache = TtlCache::new(config.cache_max_entries);
        let breaker = Mutex::new(CircuitBreaker::new(
            config.breaker_threshold,
            config.breaker_recovery,
        ));
        Self {
            config,
            key,
            store,
            cache,
            breaker,
            hub: TelemetryHub::new(),
            tools: ToolRegistry::with_builtins(),
            processor: Arc::new(EchoProcessor),
            telemetry,
        }
    }

    pub fn config(&self) -> &ContextToolConfig {
        &self.config
    }

    /// Injection point for the in-process telemetry publisher.
    pub fn telemetry_hub(&self) -> TelemetryHub {
        self.hub.clone()
    }

    pub fn register_tool(&mut self, name: &str, handler: Arc<dyn crate::tools::ToolHandler>) {
        self.tools.register(name, handler);
    }

    pub fn set_processor(&mut self, processor: Arc<dyn FrameProcessor>) {
        self.processor = processor;
    }

    // -----------------------------------------------------------------------
    // RequestContext
    // -----------------------------------------------------------------------

    pub async fn request_context(
        &self,
        request: &proto::ContextRequest,
        metadata: &Metadata,
    ) -> Result<proto::ContextResponse, Status> {
        let peer = metadata.get(PEER_ADDR_KEY).unwrap_or("unknown");
        let mut timer = CallTimer::new("RequestContext", peer, Arc::clone(&self.telemetry));

        if !self.admit() {
            timer.finish("circuit_open");
            return Err(Status::unavailable("service temporarily unavailable"));
        }

        let claims = match self.authorize(&request.capability_token, &self.config.context_scope) {
            Ok(claims) => claims,
            Err(status) => return self.fail(timer, status),
        };
        timer.set_client(&claims.sub);

        let key = cache_key(&request.context_key, &request.parameters);
        if let Some(cached) = self.cache.get(&key) {
            timer.push_field("cache_hit", "true");
            timer.finish("success");
            return Ok(cached);
        }

        match self.store.fetch(&request.context_key).await {
            Ok(entry) => {
                let (value, mut entries) = match entry {
                    Some(entry) => (entry.value, entry.metadata),
                    None => (Vec::new(), Vec::new()),
                };
                entries.push(format!("timestamp:{}", Timestamp::now().to_rfc3339()));
                let response = proto::ContextResponse {
                    serialized_value: value,
                    metadata: entries,
                };
                self.cache
                    .insert(key, response.clone(), self.config.cache_ttl);
                self.settle(true);
                timer.push_field("cache_hit", "false");
                timer.finish("success");
                Ok(response)
            }
            Err(e) => {
                self.settle(false);
                timer.finish(format!("failure: {}", e));
                Err(Status::internal(format!("backend failure: {}", e)))
            }
        }
    }

    // -----------------------------------------------------------------------
    // SubscribeTelemetry
    // -----------------------------------------------------------------------

    pub fn subscribe_telemetry(
        &self,
        request: &proto::TelemetryRequest,
        metadata: &Metadata,
    ) -> Result<TelemetrySubscription, Status> {
        let peer = metadata.get(PEER_ADDR_KEY).unwrap_or("unknown");
        let mut timer = CallTimer::new("SubscribeTelemetry", peer, Arc::clone(&self.telemetry));
        timer.push_field("stream_id", &request.stream_id);

        let claims = match self.authorize(&request.capability_token, TELEMETRY_SCOPE) {
            Ok(claims) => claims,
            Err(status) => return self.fail(timer, status),
        };
        timer.set_client(&claims.sub);

        let subscription = self
            .hub
            .subscribe(&request.stream_id, self.config.stream_queue_depth);
        timer.finish("subscribed");
        Ok(subscription)
    }

    // -----------------------------------------------------------------------
    // MultiModalExchange
    // -----------------------------------------------------------------------

    /// Authorization comes from the call metadata and covers the stream's
    /// whole lifetime. The returned channel yields processed frames in
    /// input order.
    pub fn multimodal_exchange(
        &self,
        metadata: &Metadata,
        mut inbound: mpsc::Receiver<proto::MultiModalFrame>,
    ) -> Result<mpsc::Receiver<proto::MultiModalFrame>, Status> {
        let peer = metadata.get(PEER_ADDR_KEY).unwrap_or("unknown");
        let mut timer = CallTimer::new("MultiModalExchange", peer, Arc::clone(&self.telemetry));

        let token = match metadata.get(TOKEN_METADATA_KEY) {
            Some(token) => token,
            None => {
                return self.fail(
                    timer,
                    Status::invalid_argument(format!(
                        "missing '{}' metadata",
                        TOKEN_METADATA_KEY
                    )),
                )
            }
        };
        let claims = match self.authorize(token, MULTIMODAL_SCOPE) {
            Ok(claims) => claims,
            Err(status) => return self.fail(timer, status),
        };
        timer.set_client(&claims.sub);

        let (tx, rx) = mpsc::channel(self.config.stream_queue_depth);
        let processor = Arc::clone(&self.processor);
        let telemetry = Arc::clone(&self.telemetry);
        let client = claims.sub.clone();
        tokio::spawn(async move {
            let mut stream_timer = CallTimer::new("MultiModalExchange", &client, telemetry);
            let mut frames: u64 = 0;
            while let Some(frame) = inbound.recv().await {
                let processed = processor.process(frame);
                if tx.send(processed).await.is_err() {
                    break;
                }
                frames += 1;
            }
            stream_timer.push_field("frames", frames.to_string());
            stream_timer.finish("completed");
        });

        timer.finish("accepted");
        Ok(rx)
    }

    // -----------------------------------------------------------------------
    // InvokeTool
    // -----------------------------------------------------------------------

    pub async fn invoke_tool(
        &self,
        request: &proto::ToolRequest,
        metadata: &Metadata,
    ) -> Result<proto::ToolResponse, Status> {
        let peer = metadata.get(PEER_ADDR_KEY).unwrap_or("unknown");
        let mut timer = CallTimer::new("InvokeTool", peer, Arc::clone(&self.telemetry));
        timer.push_field("tool", &request.tool_name);

        if !self.admit() {
            timer.finish("circuit_open");
            return Err(Status::unavailable("service temporarily unavailable"));
        }

        let claims = match self.verify_token(&request.capability_token) {
            Ok(claims) => claims,
            Err(status) => return self.fail(timer, status),
        };
        timer.set_client(&claims.sub);

        // The scope is formed from the requested name: authority over
        // `tool:enhance_image` says nothing about `tool:sql_query`.
        let required = format!("tool:{}", request.tool_name);
        if !request.agent_delegation_proof.is_empty() {
            // A proof accompanying the call is always validated alongside
            // the primary token.
            match self.check_delegation(&claims, request, &required) {
                Ok(()) => timer.push_field("delegated", "true"),
                Err(status) => return self.fail(timer, status),
            }
        } else if !has_capability(&claims, &required) {
            return self.fail(
                timer,
                Status::permission_denied(format!("token lacks {}", required)),
            );
        }
        if !has_audience(&claims, &self.config.server_name) {
            return self.fail(
                timer,
                Status::permission_denied(format!("token not for {}", self.config.server_name)),
            );
        }

        match self.tools.get(&request.tool_name) {
            None => {
                // Soft miss: callers may probe for tools without tripping
                // the breaker.
                self.settle(true);
                timer.push_field("recognized", "false");
                timer.finish("success");
                Ok(proto::ToolResponse {
                    success: true,
                    outputs: HashMap::new(),
                    warnings: vec![format!("tool '{}' not recognized", request.tool_name)],
                })
            }
            Some(handler) => match handler.invoke(&request.arguments).await {
                Ok(outputs) => {
                    self.settle(true);
                    timer.finish("success");
                    Ok(proto::ToolResponse {
                        success: true,
                        outputs,
                        warnings: Vec::new(),
                    })
                }
                Err(e) => {
                    self.settle(false);
                    timer.finish(format!("failure: {}", e));
                    Err(Status::internal(format!("tool execution failed: {}", e)))
                }
            },
        }
    }

    // -----------------------------------------------------------------------
    // Shared plumbing
    // -----------------------------------------------------------------------

    fn admit(&self) -> bool {
        self.breaker
            .lock()
            .expect("breaker lock poisoned")
            .before_call()
    }

    fn settle(&self, success: bool) {
        self.breaker
            .lock()
            .expect("breaker lock poisoned")
            .after_call(success);
    }

    fn verify_token(&self, token: &str) -> Result<CapabilityClaims, Status> {
        if token.is_empty() {
            return Err(Status::unauthenticated("missing token"));
        }
        verify(token, &self.key).map_err(|e| Status::unauthenticated(e.to_string()))
    }

    fn authorize(&self, token: &str, scope: &str) -> Result<CapabilityClaims, Status> {
        let claims = self.verify_token(token)?;
        if !has_capability(&claims, scope) {
            return Err(Status::permission_denied(format!("token lacks {}", scope)));
        }
        if !has_audience(&claims, &self.config.server_name) {
            return Err(Status::permission_denied(format!(
                "token not for {}",
                self.config.server_name
            )));
        }
        Ok(claims)
    }

    fn check_delegation(
        &self,
        claims: &CapabilityClaims,
        request: &proto::ToolRequest,
        required: &str,
    ) -> Result<(), Status> {
        let proof = verify_delegation(
            claims,
            &request.agent_delegation_proof,
            &self.config.server_name,
            &self.key,
        )
        .map_err(|e| match e {
            CredError::DelegationRejected(_) => Status::permission_denied(e.to_string()),
            other => Status::unauthenticated(other.to_string()),
        })?;
        if !has_capability(claims, required) && !proof.grants(required) {
            return Err(Status::permission_denied(format!(
                "delegation proof lacks {}",
                required
            )));
        }
        Ok(())
    }

    fn fail<T>(&self, timer: CallTimer, status: Status) -> Result<T, Status> {
        timer.finish(format!("failure: {}", status));
        Err(status)
    }
}

/// Cache key: the context key plus its parameters in canonical (sorted)
/// order.
fn cache_key(context_key: &str, parameters: &HashMap<String, String>) -> String {
    let mut pairs: Vec<(&String, &String)> = parameters.iter().collect();
    pairs.sort();
    let mut key = format!("context::{}", context_key);
    for (k, v) in pairs {
        key.push_str("::");
        key.push_str(k);
        key.push('=');
        key.push_str(v);
    }
    key
}
