//! Service message schema.
//!
//! Hand-annotated prost messages; field numbers are stable and must never
//! be reused. The schema covers the discovery registry, the context/tool
//! service, and the event bus.

use prost::Message;
use std::collections::HashMap;

use crate::status::Status;

// ---------------------------------------------------------------------------
// Discovery registry
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RegisterRequest {
    #[prost(string, tag = "1")]
    pub server_name: ::prost::alloc::string::String,
    #[prost(string, repeated, tag = "2")]
    pub capabilities: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(string, tag = "3")]
    pub registration_token: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RegisterResponse {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(string, tag = "2")]
    pub message: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LookupRequest {
    #[prost(string, tag = "1")]
    pub requester_token: ::prost::alloc::string::String,
    #[prost(string, repeated, tag = "2")]
    pub capability_filter: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EndpointDescriptor {
    #[prost(string, tag = "1")]
    pub server_name: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub grpc_url: ::prost::alloc::string::String,
    #[prost(string, repeated, tag = "3")]
    pub capabilities: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LookupResponse {
    #[prost(message, repeated, tag = "1")]
    pub endpoints: ::prost::alloc::vec::Vec<EndpointDescriptor>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeregisterRequest {
    #[prost(string, tag = "1")]
    pub server_name: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub registration_token: ::prost::alloc::string::String,
}

// ---------------------------------------------------------------------------
// Context / tool service
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ContextRequest {
    #[prost(string, tag = "1")]
    pub context_key: ::prost::alloc::string::String,
    #[prost(map = "string, string", tag = "2")]
    pub parameters: HashMap<::prost::alloc::string::String, ::prost::alloc::string::String>,
    #[prost(string, tag = "3")]
    pub capability_token: ::prost::alloc::string::String,
    #[prost(string, tag = "4")]
    pub agent_delegation_proof: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ContextResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub serialized_value: ::prost::alloc::vec::Vec<u8>,
    #[prost(string, repeated, tag = "2")]
    pub metadata: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TelemetryRequest {
    #[prost(string, tag = "1")]
    pub stream_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub capability_token: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TelemetryFrame {
    #[prost(int64, tag = "1")]
    pub timestamp_ms: i64,
    #[prost(bytes = "vec", tag = "2")]
    pub payload: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TextChunk {
    #[prost(string, tag = "1")]
    pub content: ::prost::alloc::string::String,
    #[prost(uint64, tag = "2")]
    pub sequence: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ImageFrame {
    #[prost(bytes = "vec", tag = "1")]
    pub jpeg_data: ::prost::alloc::vec::Vec<u8>,
    #[prost(uint32, tag = "2")]
    pub width: u32,
    #[prost(uint32, tag = "3")]
    pub height: u32,
    #[prost(uint64, tag = "4")]
    pub sequence: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AudioFrame {
    #[prost(bytes = "vec", tag = "1")]
    pub pcm_data: ::prost::alloc::vec::Vec<u8>,
    #[prost(int64, tag = "2")]
    pub timestamp_ms: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BinaryBlob {
    #[prost(bytes = "vec", tag = "1")]
    pub data: ::prost::alloc::vec::Vec<u8>,
    #[prost(string, tag = "2")]
    pub mime_type: ::prost::alloc::string::String,
    #[prost(uint64, tag = "3")]
    pub sequence: u64,
}

/// Tagged union over the multimodal payload variants. A frame whose
/// `payload` decodes as `None` came from a schema revision this build does
/// not know; pass-through code forwards the frame whole rather than
/// dropping it.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MultiModalFrame {
    #[prost(oneof = "multi_modal_frame::Payload", tags = "1, 2, 3, 4")]
    pub payload: ::core::option::Option<multi_modal_frame::Payload>,
}

pub mod multi_modal_frame {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "1")]
        Text(super::TextChunk),
        #[prost(message, tag = "2")]
        Image(super::ImageFrame),
        #[prost(message, tag = "3")]
        Audio(super::AudioFrame),
        #[prost(message, tag = "4")]
        Blob(super::BinaryBlob),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ToolRequest {
    #[prost(string, tag = "1")]
    pub tool_name: ::prost::alloc::string::String,
    #[prost(map = "string, string", tag = "2")]
    pub arguments: HashMap<::prost::alloc::string::String, ::prost::alloc::string::String>,
    #[prost(string, tag = "3")]
    pub capability_token: ::prost::alloc::string::String,
    #[prost(string, tag = "4")]
    pub agent_delegation_proof: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ToolResponse {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(map = "string, bytes", tag = "2")]
    pub outputs: HashMap<::prost::alloc::string::String, ::prost::alloc::vec::Vec<u8>>,
    #[prost(string, repeated, tag = "3")]
    pub warnings: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

// ---------------------------------------------------------------------------
// Event bus
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EventPublishRequest {
    #[prost(string, tag = "1")]
    pub topic: ::prost::alloc::string::String,
    #[prost(bytes = "vec", tag = "2")]
    pub payload: ::prost::alloc::vec::Vec<u8>,
    #[prost(string, tag = "3")]
    pub publisher_token: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EventPublishResponse {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(string, tag = "2")]
    pub message: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EventSubscribeRequest {
    #[prost(string, tag = "1")]
    pub topic_filter: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub subscriber_token: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EventEnvelope {
    #[prost(string, tag = "1")]
    pub topic: ::prost::alloc::string::String,
    #[prost(bytes = "vec", tag = "2")]
    pub payload: ::prost::alloc::vec::Vec<u8>,
    #[prost(uint64, tag = "3")]
    pub sequence_id: u64,
}

// ---------------------------------------------------------------------------
// Body codec helpers
// ---------------------------------------------------------------------------

/// Decode a request body, mapping failures to `InvalidArgument`.
pub fn decode_body<M: Message + Default>(body: &[u8]) -> Result<M, Status> {
    M::decode(body).map_err(|e| Status::invalid_argument(format!("malformed request body: {}", e)))
}

/// Encode a message body.
pub fn encode_body<M: Message>(message: &M) -> Vec<u8> {
    message.encode_to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_roundtrip() {
        let req = RegisterRequest {
            server_name: "InventoryDB_Primary".into(),
            capabilities: vec!["db:inventory:read".into(), "tool:compute_pricing".into()],
            registration_token: "wft1.cap.abc".into(),
        };
        let decoded: RegisterRequest = decode_body(&encode_body(&req)).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn test_context_request_parameters_map() {
        let mut parameters = HashMap::new();
        parameters.insert("warehouse".to_string(), "NY".to_string());
        let req = ContextRequest {
            context_key: "inventory:prod_12345:stock_count".into(),
            parameters,
            capability_token: "t".into(),
            agent_delegation_proof: String::new(),
        };
        let decoded: ContextRequest = decode_body(&encode_body(&req)).unwrap();
        assert_eq!(decoded.parameters.get("warehouse").unwrap(), "NY");
    }

    #[test]
    fn test_multimodal_oneof_roundtrip() {
        let frame = MultiModalFrame {
            payload: Some(multi_modal_frame::Payload::Text(TextChunk {
                content: "hello".into(),
                sequence: 3,
            })),
        };
        let decoded: MultiModalFrame = decode_body(&encode_body(&frame)).unwrap();
        assert_eq!(decoded, frame);

        let image = MultiModalFrame {
            payload: Some(multi_modal_frame::Payload::Image(ImageFrame {
                jpeg_data: vec![0xFF, 0xD8],
                width: 64,
                height: 48,
                sequence: 4,
            })),
        };
        let decoded: MultiModalFrame = decode_body(&encode_body(&image)).unwrap();
        assert_eq!(decoded, image);
    }

    #[test]
    fn test_tool_response_outputs_map() {
        let mut outputs = HashMap::new();
        outputs.insert("recommended_price".to_string(), b"95.8".to_vec());
        let resp = ToolResponse {
            success: true,
            outputs,
            warnings: vec![],
        };
        let decoded: ToolResponse = decode_body(&encode_body(&resp)).unwrap();
        assert_eq!(decoded.outputs.get("recommended_price").unwrap(), b"95.8");
    }

    #[test]
    fn test_decode_body_rejects_garbage() {
        let result: Result<RegisterRequest, Status> = decode_body(&[0xFF, 0xFF, 0xFF, 0xFF]);
        assert!(result.is_err());
    }

    #[test]
    fn test_event_envelope_roundtrip() {
        let envelope = EventEnvelope {
            topic: "inventory:prod_12345:low_stock".into(),
            payload: br#"{"current_stock":9}"#.to_vec(),
            sequence_id: 1,
        };
        let decoded: EventEnvelope = decode_body(&encode_body(&envelope)).unwrap();
        assert_eq!(decoded, envelope);
    }
}
