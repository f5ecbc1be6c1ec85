//! Wire glue: routes the registry service onto an [`RpcServer`].

use std::sync::Arc;

use async_trait::async_trait;

use weft_wire::proto::{decode_body, encode_body};
use weft_wire::{Metadata, RpcServer, Status, UnaryHandler};

use crate::service::RegistryService;

pub const REGISTER_METHOD: &str = "Discovery/Register";
pub const LOOKUP_METHOD: &str = "Discovery/Lookup";
pub const DEREGISTER_METHOD: &str = "Discovery/Deregister";

struct RegisterRpc(Arc<RegistryService>);

#[async_trait]
impl UnaryHandler for RegisterRpc {
    async fn call(&self, metadata: Metadata, body: Vec<u8>) -> Result<Vec<u8>, Status> {
        let request = decode_body(&body)?;
        let response = self.0.register(&request, &metadata)?;
        Ok(encode_body(&response))
    }
}

struct LookupRpc(Arc<RegistryService>);

#[async_trait]
impl UnaryHandler for LookupRpc {
    async fn call(&self, metadata: Metadata, body: Vec<u8>) -> Result<Vec<u8>, Status> {
        let request = decode_body(&body)?;
        let response = self.0.lookup(&request, &metadata)?;
        Ok(encode_body(&response))
    }
}

struct DeregisterRpc(Arc<RegistryService>);

#[async_trait]
impl UnaryHandler for DeregisterRpc {
    async fn call(&self, metadata: Metadata, body: Vec<u8>) -> Result<Vec<u8>, Status> {
        let request = decode_body(&body)?;
        let response = self.0.deregister(&request, &metadata)?;
        Ok(encode_body(&response))
    }
}

/// Register the registry's methods on a server.
pub fn register_routes(service: &Arc<RegistryService>, server: &mut RpcServer) {
    server.route_unary(REGISTER_METHOD, Arc::new(RegisterRpc(Arc::clone(service))));
    server.route_unary(LOOKUP_METHOD, Arc::new(LookupRpc(Arc::clone(service))));
    server.route_unary(
        DEREGISTER_METHOD,
        Arc::new(DeregisterRpc(Arc::clone(service))),
    );
}
