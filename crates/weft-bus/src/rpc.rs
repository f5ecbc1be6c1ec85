//! Wire glue: routes the event bus onto an [`RpcServer`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use weft_wire::proto::{self, decode_body, encode_body};
use weft_wire::{Metadata, RpcServer, ServerStreamHandler, Status, UnaryHandler};

use crate::service::EventBusService;

pub const PUBLISH_METHOD: &str = "EventBus/Publish";
pub const SUBSCRIBE_METHOD: &str = "EventBus/Subscribe";

struct PublishRpc(Arc<EventBusService>);

#[async_trait]
impl UnaryHandler for PublishRpc {
    async fn call(&self, metadata: Metadata, body: Vec<u8>) -> Result<Vec<u8>, Status> {
        let request = decode_body(&body)?;
        let response = self.0.publish(&request, &metadata)?;
        Ok(encode_body(&response))
    }
}

struct SubscribeRpc(Arc<EventBusService>);

#[async_trait]
impl ServerStreamHandler for SubscribeRpc {
    async fn call(
        &self,
        metadata: Metadata,
        body: Vec<u8>,
    ) -> Result<mpsc::Receiver<Vec<u8>>, Status> {
        let request: proto::EventSubscribeRequest = decode_body(&body)?;
        let mut subscription = self.0.subscribe(&request, &metadata)?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            // Exit as soon as the transport stops taking envelopes, even on
            // an idle stream; dropping the subscription removes the sink so
            // a disconnected peer leaves the fan-out set immediately.
            loop {
                tokio::select! {
                    envelope = subscription.next() => match envelope {
                        Some(envelope) => {
                            if tx.send(encode_body(&envelope)).await.is_err() {
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

/// Register the event bus's methods on a server.
pub fn register_routes(service: &Arc<EventBusService>, server: &mut RpcServer) {
    server.route_unary(PUBLISH_METHOD, Arc::new(PublishRpc(Arc::clone(service))));
    server.route_server_stream(
        SUBSCRIBE_METHOD,
        Arc::new(SubscribeRpc(Arc::clone(service))),
    );
}
