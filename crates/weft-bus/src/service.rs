//! The event bus service.
//!
//! Publish and subscribe scopes are formed from the topic and filter
//! respectively; both sides of the match use the one wildcard rule. There
//! is no segment-aware fallback: a token authorizing
//! `event:publish:inventory:*` covers every inventory topic, and nothing
//! else does.

use std::sync::Arc;

use weft_cred::{has_audience, has_capability, verify, CapabilityClaims, SigningKey};
use weft_resilience::{CallTimer, TelemetrySink};
use weft_wire::proto;
use weft_wire::{Metadata, Status, PEER_ADDR_KEY};

use crate::topics::{EventSubscription, TopicRegistry};

/// Scope prefix for publishing; the exact topic is appended.
pub const PUBLISH_SCOPE_PREFIX: &str = "event:publish:";

/// Scope prefix for subscribing; the topic filter is appended.
pub const SUBSCRIBE_SCOPE_PREFIX: &str = "event:subscribe:";

#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Name this bus answers to in audience checks.
    pub server_name: String,
    /// Queue depth for subscriber sinks.
    pub queue_depth: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            server_name: "EventBusServer".to_string(),
            queue_depth: 64,
        }
    }
}

pub struct EventBusService {
    config: EventBusConfig,
    key: SigningKey,
    topics: TopicRegistry,
    telemetry: Arc<dyn TelemetrySink>,
}

impl EventBusService {
    pub fn new(config: EventBusConfig, key: SigningKey, telemetry: Arc<dyn TelemetrySink>) -> Self {
        Self {
            config,
            key,
            topics: TopicRegistry::new(),
            telemetry,
        }
    }

    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }

    pub fn topics(&self) -> TopicRegistry {
        self.topics.clone()
    }

    pub fn publish(
        &self,
        request: &proto::EventPublishRequest,
        metadata: &Metadata,
    ) -> Result<proto::EventPublishResponse, Status> {
        let peer = metadata.get(PEER_ADDR_KEY).unwrap_or("unknown");
        let mut timer = CallTimer::new("Publish", peer, Arc::clone(&self.telemetry));
        timer.push_field("topic", &request.topic);

        let required = format!("{}{}", PUBLISH_SCOPE_PREFIX, request.topic);
        let claims = match self.authorize(&request.publisher_token, &required) {
            Ok(claims) => claims,
            Err(status) => return self.fail(timer, status),
        };
        timer.set_client(&claims.sub);

        if request.topic.is_empty() {
            return self.fail(timer, Status::invalid_argument("topic must not be empty"));
        }

        let (sequence_id, delivered) = self.topics.publish(&request.topic, &request.payload);
        tracing::debug!(
            topic = %request.topic,
            sequence_id,
            delivered,
            "event published"
        );
        timer.push_field("sequence_id", sequence_id.to_string());
        timer.push_field("delivered", delivered.to_string());
        timer.finish("success");
        Ok(proto::EventPublishResponse {
            success: true,
            message: "published".to_string(),
        })
    }

    pub fn subscribe(
        &self,
        request: &proto::EventSubscribeRequest,
        metadata: &Metadata,
    ) -> Result<EventSubscription, Status> {
        let peer = metadata.get(PEER_ADDR_KEY).unwrap_or("unknown");
        let mut timer = CallTimer::new("Subscribe", peer, Arc::clone(&self.telemetry));
        timer.push_field("topic_filter", &request.topic_filter);

        let required = format!("{}{}", SUBSCRIBE_SCOPE_PREFIX, request.topic_filter);
        let claims = match self.authorize(&request.subscriber_token, &required) {
            Ok(claims) => claims,
            Err(status) => return self.fail(timer, status),
        };
        timer.set_client(&claims.sub);

        let subscription = self
            .topics
            .subscribe(&request.topic_filter, self.config.queue_depth);
        timer.finish("subscribed");
        Ok(subscription)
    }

    fn authorize(&self, token: &str, scope: &str) -> Result<CapabilityClaims, Status> {
        if token.is_empty() {
            return Err(Status::unauthenticated("missing token"));
        }
        let claims =
            verify(token, &self.key).map_err(|e| Status::unauthenticated(e.to_string()))?;
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

    const SERVER: &str = "EventBusServer";

    fn make_key() -> SigningKey {
        SigningKey::from_bytes([0x42; 32])
    }

    fn make_service() -> (EventBusService, Arc<InMemorySink>) {
        let sink = Arc::new(InMemorySink::new());
        let service = EventBusService::new(
            EventBusConfig::default(),
            make_key(),
            Arc::clone(&sink) as Arc<dyn TelemetrySink>,
        );
        (service, sink)
    }

    fn token(capabilities: Vec<&str>, audience: Vec<&str>) -> String {
        issue(
            "agent-a",
            capabilities.into_iter().map(String::from).collect(),
            audience.into_iter().map(String::from).collect(),
            300,
            &make_key(),
        )
        .unwrap()
    }

    fn event_token() -> String {
        token(
            vec!["event:publish:inventory:*", "event:subscribe:inventory:*"],
            vec![SERVER],
        )
    }

    fn publish_request(topic: &str) -> proto::EventPublishRequest {
        proto::EventPublishRequest {
            topic: topic.into(),
            payload: br#"{"current_stock":9}"#.to_vec(),
            publisher_token: event_token(),
        }
    }

    #[tokio::test]
    async fn test_publish_delivers_to_matching_subscriber() {
        let (service, _) = make_service();
        let subscribe = proto::EventSubscribeRequest {
            topic_filter: "inventory:*:low_stock".into(),
            subscriber_token: event_token(),
        };
        let mut subscription = service.subscribe(&subscribe, &Metadata::new()).unwrap();

        let response = service
            .publish(
                &publish_request("inventory:prod_12345:low_stock"),
                &Metadata::new(),
            )
            .unwrap();
        assert!(response.success);

        let envelope = subscription.next().await.unwrap();
        assert_eq!(envelope.topic, "inventory:prod_12345:low_stock");
        assert_eq!(envelope.sequence_id, 1);
        assert_eq!(envelope.payload, br#"{"current_stock":9}"#);
    }

    #[tokio::test]
    async fn test_publish_wildcard_scope_covers_topic() {
        let (service, _) = make_service();
        // Scope event:publish:inventory:* grants the exact topic.
        assert!(service
            .publish(
                &publish_request("inventory:prod_12345:low_stock"),
                &Metadata::new()
            )
            .is_ok());
    }

    #[tokio::test]
    async fn test_publish_scope_outside_prefix_denied() {
        let (service, _) = make_service();
        let mut request = publish_request("orders:created");
        request.publisher_token = event_token();
        let err = service.publish(&request, &Metadata::new()).unwrap_err();
        assert_eq!(err.code, StatusCode::PermissionDenied);
    }

    #[tokio::test]
    async fn test_publish_requires_bus_audience() {
        let (service, _) = make_service();
        let mut request = publish_request("inventory:prod_12345:low_stock");
        request.publisher_token = token(vec!["event:publish:inventory:*"], vec!["OtherServer"]);
        let err = service.publish(&request, &Metadata::new()).unwrap_err();
        assert_eq!(err.code, StatusCode::PermissionDenied);
    }

    #[tokio::test]
    async fn test_publish_bad_token() {
        let (service, _) = make_service();
        let mut request = publish_request("inventory:prod_12345:low_stock");
        request.publisher_token = "garbage".into();
        let err = service.publish(&request, &Metadata::new()).unwrap_err();
        assert_eq!(err.code, StatusCode::Unauthenticated);
    }

    #[tokio::test]
    async fn test_subscribe_requires_filter_scope() {
        let (service, _) = make_service();
        let request = proto::EventSubscribeRequest {
            topic_filter: "orders:*".into(),
            subscriber_token: event_token(),
        };
        let err = service.subscribe(&request, &Metadata::new()).unwrap_err();
        assert_eq!(err.code, StatusCode::PermissionDenied);
    }

    #[tokio::test]
    async fn test_sequence_is_per_topic() {
        let (service, _) = make_service();
        service
            .publish(&publish_request("inventory:a:low_stock"), &Metadata::new())
            .unwrap();
        service
            .publish(&publish_request("inventory:a:low_stock"), &Metadata::new())
            .unwrap();
        service
            .publish(&publish_request("inventory:b:low_stock"), &Metadata::new())
            .unwrap();

        let topics = service.topics();
        assert_eq!(topics.sequence("inventory:a:low_stock"), Some(2));
        assert_eq!(topics.sequence("inventory:b:low_stock"), Some(1));
    }

    #[tokio::test]
    async fn test_subscriber_observes_increasing_sequence() {
        let (service, _) = make_service();
        let subscribe = proto::EventSubscribeRequest {
            topic_filter: "inventory:*".into(),
            subscriber_token: event_token(),
        };
        let mut subscription = service.subscribe(&subscribe, &Metadata::new()).unwrap();

        for _ in 0..4 {
            service
                .publish(&publish_request("inventory:a:low_stock"), &Metadata::new())
                .unwrap();
        }
        let mut last = 0;
        for _ in 0..4 {
            let envelope = subscription.next().await.unwrap();
            assert!(envelope.sequence_id > last);
            last = envelope.sequence_id;
        }
    }

    #[tokio::test]
    async fn test_every_exit_emits_one_record() {
        let (service, sink) = make_service();
        let _ = service.publish(&publish_request("inventory:a"), &Metadata::new());
        let mut bad = publish_request("inventory:a");
        bad.publisher_token = String::new();
        let _ = service.publish(&bad, &Metadata::new());
        assert_eq!(sink.records().len(), 2);
    }
}
