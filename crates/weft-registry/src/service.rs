//! The discovery registry service.
//!
//! Register requires the `registry:register` scope and, by convention, an
//! audience naming the registry itself. Lookup requires `registry:lookup`;
//! the requester's audience then acts as the enumeration access control.
//! An endpoint whose name the audience does not match is simply absent
//! from the result, so its existence never leaks.

use std::sync::Arc;
use std::time::Duration;

use weft_core::Timestamp;
use weft_cred::{has_audience, has_capability, verify, CapabilityClaims, SigningKey};
use weft_resilience::{CallTimer, TelemetrySink};
use weft_wire::proto;
use weft_wire::{Metadata, Status, PEER_ADDR_KEY};

use crate::directory::{EndpointDirectory, EndpointRecord};

/// Scope required to register an endpoint.
pub const REGISTER_SCOPE: &str = "registry:register";

/// Scope required to look up endpoints.
pub const LOOKUP_SCOPE: &str = "registry:lookup";

/// Metadata key carrying the registrant's externally reachable address.
/// Out-of-body because it is the caller's advertised address, not
/// necessarily what the connection would reveal.
pub const ADDRESS_METADATA_KEY: &str = "grpc-url";

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Name this registry answers to in audience checks.
    pub server_name: String,
    /// Optional maximum record age; stale records vanish from lookups.
    pub max_record_age: Option<Duration>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            server_name: "RegistryServer".to_string(),
            max_record_age: None,
        }
    }
}

pub struct RegistryService {
    config: RegistryConfig,
    key: SigningKey,
    directory: EndpointDirectory,
    telemetry: Arc<dyn TelemetrySink>,
}

impl RegistryService {
    pub fn new(config: RegistryConfig, key: SigningKey, telemetry: Arc<dyn TelemetrySink>) -> Self {
        let directory = EndpointDirectory::new(config.max_record_age);
        Self {
            config,
            key,
            directory,
            telemetry,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn directory(&self) -> &EndpointDirectory {
        &self.directory
    }

    pub fn register(
        &self,
        request: &proto::RegisterRequest,
        metadata: &Metadata,
    ) -> Result<proto::RegisterResponse, Status> {
        let peer = metadata.get(PEER_ADDR_KEY).unwrap_or("unknown");
        let mut timer = CallTimer::new("Register", peer, Arc::clone(&self.telemetry));
        timer.push_field("server_name", &request.server_name);

        let claims = match self.authenticate(&request.registration_token, REGISTER_SCOPE, true) {
            Ok(claims) => claims,
            Err(status) => return self.fail(timer, status),
        };
        timer.set_client(&claims.sub);

        let address = match metadata.get(ADDRESS_METADATA_KEY) {
            Some(address) => address.to_string(),
            None => {
                return self.fail(
                    timer,
                    Status::invalid_argument(format!("missing '{}' metadata", ADDRESS_METADATA_KEY)),
                )
            }
        };
        if request.server_name.is_empty() {
            return self.fail(timer, Status::invalid_argument("server_name must not be empty"));
        }

        self.directory.register(EndpointRecord {
            server_name: request.server_name.clone(),
            address,
            capabilities: request.capabilities.clone(),
            registered_at: Timestamp::now(),
        });

        tracing::info!(
            server_name = %request.server_name,
            client = %claims.sub,
            "endpoint registered"
        );
        timer.finish("success");
        Ok(proto::RegisterResponse {
            success: true,
            message: "registered successfully".to_string(),
        })
    }

    pub fn lookup(
        &self,
        request: &proto::LookupRequest,
        metadata: &Metadata,
    ) -> Result<proto::LookupResponse, Status> {
        let peer = metadata.get(PEER_ADDR_KEY).unwrap_or("unknown");
        let mut timer = CallTimer::new("Lookup", peer, Arc::clone(&self.telemetry));

        let claims = match self.authenticate(&request.requester_token, LOOKUP_SCOPE, false) {
            Ok(claims) => claims,
            Err(status) => return self.fail(timer, status),
        };
        timer.set_client(&claims.sub);

        let endpoints: Vec<proto::EndpointDescriptor> = self
            .directory
            .lookup(&request.capability_filter)
            .into_iter()
            .filter(|record| has_audience(&claims, &record.server_name))
            .map(|record| proto::EndpointDescriptor {
                server_name: record.server_name,
                grpc_url: record.address,
                capabilities: record.capabilities,
            })
            .collect();

        timer.push_field("found", endpoints.len().to_string());
        timer.finish("success");
        Ok(proto::LookupResponse { endpoints })
    }

    pub fn deregister(
        &self,
        request: &proto::DeregisterRequest,
        metadata: &Metadata,
    ) -> Result<proto::RegisterResponse, Status> {
        let peer = metadata.get(PEER_ADDR_KEY).unwrap_or("unknown");
        let mut timer = CallTimer::new("Deregister", peer, Arc::clone(&self.telemetry));
        timer.push_field("server_name", &request.server_name);

        let claims = match self.authenticate(&request.registration_token, REGISTER_SCOPE, true) {
            Ok(claims) => claims,
            Err(status) => return self.fail(timer, status),
        };
        timer.set_client(&claims.sub);

        let removed = self.directory.deregister(&request.server_name);
        timer.finish("success");
        Ok(proto::RegisterResponse {
            success: true,
            message: if removed {
                "deregistered".to_string()
            } else {
                "not registered".to_string()
            },
        })
    }

    fn authenticate(
        &self,
        token: &str,
        scope: &str,
        check_audience: bool,
    ) -> Result<CapabilityClaims, Status> {
        if token.is_empty() {
            return Err(Status::unauthenticated("missing token"));
        }
        let claims =
            verify(token, &self.key).map_err(|e| Status::unauthenticated(e.to_string()))?;
        if !has_capability(&claims, scope) {
            return Err(Status::permission_denied(format!("token lacks {}", scope)));
        }
        if check_audience && !has_audience(&claims, &self.config.server_name) {
            return Err(Status::permission_denied(format!(
                "token not for {}",
                self.config.server_name
            )));
        }
        Ok(claims)
    }

    fn fail<T>(&self, timer: CallTimer, status: Status) -> Result<T, Status> {
        timer.finish(format!("failure: {}", status));
        Err(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_cred::issue;
    use weft_resilience::InMemorySink;
    use weft_wire::StatusCode;

    fn make_key() -> SigningKey {
        SigningKey::from_bytes([0x42; 32])
    }

    fn make_service() -> (RegistryService, Arc<InMemorySink>) {
        let sink = Arc::new(InMemorySink::new());
        let service = RegistryService::new(
            RegistryConfig::default(),
            make_key(),
            Arc::clone(&sink) as Arc<dyn TelemetrySink>,
        );
        (service, sink)
    }

    fn register_token() -> String {
        issue(
            "provider-p",
            vec![REGISTER_SCOPE.into()],
            vec!["RegistryServer".into()],
            300,
            &make_key(),
        )
        .unwrap()
    }

    fn lookup_token(audience: Vec<&str>) -> String {
        issue(
            "agent-a",
            vec![LOOKUP_SCOPE.into()],
            audience.into_iter().map(String::from).collect(),
            300,
            &make_key(),
        )
        .unwrap()
    }

    fn register_metadata() -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert(ADDRESS_METADATA_KEY, "localhost:50051");
        metadata
    }

    fn make_register_request() -> proto::RegisterRequest {
        proto::RegisterRequest {
            server_name: "InventoryDB_Primary".into(),
            capabilities: vec!["db:inventory:read".into(), "tool:compute_pricing".into()],
            registration_token: register_token(),
        }
    }

    #[test]
    fn test_register_success() {
        let (service, sink) = make_service();
        let response = service
            .register(&make_register_request(), &register_metadata())
            .unwrap();
        assert!(response.success);
        assert_eq!(service.directory().len(), 1);

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, "success");
        assert_eq!(records[0].client, "provider-p");
    }

    #[test]
    fn test_register_missing_address_metadata() {
        let (service, _) = make_service();
        let err = service
            .register(&make_register_request(), &Metadata::new())
            .unwrap_err();
        assert_eq!(err.code, StatusCode::InvalidArgument);
        assert!(service.directory().is_empty());
    }

    #[test]
    fn test_register_missing_token() {
        let (service, _) = make_service();
        let mut request = make_register_request();
        request.registration_token = String::new();
        let err = service.register(&request, &register_metadata()).unwrap_err();
        assert_eq!(err.code, StatusCode::Unauthenticated);
    }

    #[test]
    fn test_register_garbage_token() {
        let (service, _) = make_service();
        let mut request = make_register_request();
        request.registration_token = "wft1.cap.garbage".into();
        let err = service.register(&request, &register_metadata()).unwrap_err();
        assert_eq!(err.code, StatusCode::Unauthenticated);
    }

    #[test]
    fn test_register_missing_scope() {
        let (service, _) = make_service();
        let mut request = make_register_request();
        request.registration_token = issue(
            "provider-p",
            vec!["registry:lookup".into()],
            vec!["RegistryServer".into()],
            300,
            &make_key(),
        )
        .unwrap();
        let err = service.register(&request, &register_metadata()).unwrap_err();
        assert_eq!(err.code, StatusCode::PermissionDenied);
    }

    #[test]
    fn test_register_wrong_audience() {
        let (service, _) = make_service();
        let mut request = make_register_request();
        request.registration_token = issue(
            "provider-p",
            vec![REGISTER_SCOPE.into()],
            vec!["SomeOtherServer".into()],
            300,
            &make_key(),
        )
        .unwrap();
        let err = service.register(&request, &register_metadata()).unwrap_err();
        assert_eq!(err.code, StatusCode::PermissionDenied);
    }

    #[test]
    fn test_lookup_returns_registered_endpoint() {
        let (service, _) = make_service();
        service
            .register(&make_register_request(), &register_metadata())
            .unwrap();

        let request = proto::LookupRequest {
            requester_token: lookup_token(vec!["InventoryDB_*"]),
            capability_filter: vec!["db:inventory:read".into()],
        };
        let response = service.lookup(&request, &Metadata::new()).unwrap();
        assert_eq!(response.endpoints.len(), 1);
        assert_eq!(response.endpoints[0].server_name, "InventoryDB_Primary");
        assert_eq!(response.endpoints[0].grpc_url, "localhost:50051");
    }

    #[test]
    fn test_lookup_audience_hides_endpoints() {
        let (service, _) = make_service();
        service
            .register(&make_register_request(), &register_metadata())
            .unwrap();

        // The requester's audience covers other servers only; the endpoint
        // must not be enumerable.
        let request = proto::LookupRequest {
            requester_token: lookup_token(vec!["OrdersDB_*"]),
            capability_filter: vec!["db:inventory:read".into()],
        };
        let response = service.lookup(&request, &Metadata::new()).unwrap();
        assert!(response.endpoints.is_empty());
    }

    #[test]
    fn test_lookup_missing_scope() {
        let (service, _) = make_service();
        let request = proto::LookupRequest {
            requester_token: register_token(),
            capability_filter: vec!["db:inventory:read".into()],
        };
        let err = service.lookup(&request, &Metadata::new()).unwrap_err();
        assert_eq!(err.code, StatusCode::PermissionDenied);
    }

    #[test]
    fn test_lookup_capability_filter_no_match() {
        let (service, _) = make_service();
        service
            .register(&make_register_request(), &register_metadata())
            .unwrap();
        let request = proto::LookupRequest {
            requester_token: lookup_token(vec!["*"]),
            capability_filter: vec!["db:billing:read".into()],
        };
        let response = service.lookup(&request, &Metadata::new()).unwrap();
        assert!(response.endpoints.is_empty());
    }

    #[test]
    fn test_deregister() {
        let (service, _) = make_service();
        service
            .register(&make_register_request(), &register_metadata())
            .unwrap();

        let request = proto::DeregisterRequest {
            server_name: "InventoryDB_Primary".into(),
            registration_token: register_token(),
        };
        let response = service.deregister(&request, &Metadata::new()).unwrap();
        assert!(response.success);
        assert_eq!(response.message, "deregistered");
        assert!(service.directory().is_empty());

        let response = service.deregister(&request, &Metadata::new()).unwrap();
        assert_eq!(response.message, "not registered");
    }

    #[test]
    fn test_every_exit_emits_one_record() {
        let (service, sink) = make_service();
        let _ = service.register(&make_register_request(), &Metadata::new());
        let _ = service.register(&make_register_request(), &register_metadata());
        let _ = service.lookup(
            &proto::LookupRequest {
                requester_token: String::new(),
                capability_filter: vec![],
            },
            &Metadata::new(),
        );
        assert_eq!(sink.records().len(), 3);
    }
}
