//! Wire glue: routes the context/tool service onto an [`RpcServer`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use weft_wire::proto::{self, decode_body, encode_body};
use weft_wire::{BidiHandler, Metadata, RpcServer, ServerStreamHandler, Status, UnaryHandler};

use crate::service::ContextToolService;

pub const REQUEST_CONTEXT_METHOD: &str = "ContextTool/RequestContext";
pub const SUBSCRIBE_TELEMETRY_METHOD: &str = "ContextTool/SubscribeTelemetry";
pub const MULTIMODAL_EXCHANGE_METHOD: &str = "ContextTool/MultiModalExchange";
pub const INVOKE_TOOL_METHOD: &str = "ContextTool/InvokeTool";

struct RequestContextRpc(Arc<ContextToolService>);

#[async_trait]
impl UnaryHandler for RequestContextRpc {
    async fn call(&self, metadata: Metadata, body: Vec<u8>) -> Result<Vec<u8>, Status> {
        let request = decode_body(&body)?;
        let response = self.0.request_context(&request, &metadata).await?;
        Ok(encode_body(&response))
    }
}

struct InvokeToolRpc(Arc<ContextToolService>);

#[async_trait]
impl UnaryHandler for InvokeToolRpc {
    async fn call(&self, metadata: Metadata, body: Vec<u8>) -> Result<Vec<u8>, Status> {
        let request = decode_body(&body)?;
        let response = self.0.invoke_tool(&request, &metadata).await?;
        Ok(encode_body(&response))
    }
}

struct SubscribeTelemetryRpc(Arc<ContextToolService>);

#[async_trait]
impl ServerStreamHandler for SubscribeTelemetryRpc {
    async fn call(
        &self,
        metadata: Metadata,
        body: Vec<u8>,
    ) -> Result<mpsc::Receiver<Vec<u8>>, Status> {
        let request: proto::TelemetryRequest = decode_body(&body)?;
        let mut subscription = self.0.subscribe_telemetry(&request, &metadata)?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            // Exit as soon as the transport stops taking frames, even on an
            // idle stream; dropping the subscription removes the sink from
            // the hub immediately.
            loop {
                tokio::select! {
                    frame = subscription.next() => match frame {
                        Some(frame) => {
                            if tx.send(encode_body(&frame)).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                    _ = tx.closed() => break,
                }
            }
        });
        Ok(rx)
    }
}

struct MultiModalRpc(Arc<ContextToolService>);

#[async_trait]
impl BidiHandler for MultiModalRpc {
    async fn call(
        &self,
        metadata: Metadata,
        mut inbound: mpsc::Receiver<Vec<u8>>,
    ) -> Result<mpsc::Receiver<Vec<u8>>, Status> {
        let (frame_tx, frame_rx) = mpsc::channel::<proto::MultiModalFrame>(64);
        let mut processed = self.0.multimodal_exchange(&metadata, frame_rx)?;

        tokio::spawn(async move {
            while let Some(body) = inbound.recv().await {
                match decode_body::<proto::MultiModalFrame>(&body) {
                    Ok(frame) => {
                        if frame_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(_) => {
                        tracing::debug!("skipping malformed multimodal frame");
                    }
                }
            }
        });

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            while let Some(frame) = processed.recv().await {
                if tx.send(encode_body(&frame)).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}

/// Register the context/tool service's methods on a server.
pub fn register_routes(service: &Arc<ContextToolService>, server: &mut RpcServer) {
    server.route_unary(
        REQUEST_CONTEXT_METHOD,
        Arc::new(RequestContextRpc(Arc::clone(service))),
    );
    server.route_unary(
        INVOKE_TOOL_METHOD,
        Arc::new(InvokeToolRpc(Arc::clone(service))),
    );
    server.route_server_stream(
        SUBSCRIBE_TELEMETRY_METHOD,
        Arc::new(SubscribeTelemetryRpc(Arc::clone(service))),
    );
    server.route_bidi(
        MULTIMODAL_EXCHANGE_METHOD,
        Arc::new(MultiModalRpc(Arc::clone(service))),
    );
}
