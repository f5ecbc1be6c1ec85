//! Transport frames.
//!
//! Every message on a connection is one length-delimited [`Frame`]. A
//! frame belongs to a call (`call_id`), and the `kind` drives the call
//! state machine on each side. Field numbers are stable and must not be
//! reused.

use crate::metadata::Metadata;
use crate::status::{Status, StatusCode};

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MetadataPair {
    #[prost(string, tag = "1")]
    pub key: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub value: ::prost::alloc::string::String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum FrameKind {
    Unspecified = 0,
    /// Unary call: method, metadata, and full request body.
    Request = 1,
    /// Opens a server-stream or bidi call: method and metadata; the body
    /// carries the request for server-stream calls.
    StreamOpen = 2,
    /// One streamed message in either direction.
    Data = 3,
    /// Client half-close: no more client data will follow.
    ClientClose = 4,
    /// Unary response body; implies an OK status.
    Response = 5,
    /// Terminates a call with a status.
    Status = 6,
    /// Client cancellation.
    Cancel = 7,
    /// Server acknowledgment that a stream handler accepted the call;
    /// sent after authorization, before any Data.
    Opened = 8,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Frame {
    #[prost(uint64, tag = "1")]
    pub call_id: u64,
    #[prost(enumeration = "FrameKind", tag = "2")]
    pub kind: i32,
    #[prost(string, tag = "3")]
    pub method: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "4")]
    pub metadata: ::prost::alloc::vec::Vec<MetadataPair>,
    #[prost(bytes = "vec", tag = "5")]
    pub body: ::prost::alloc::vec::Vec<u8>,
    #[prost(uint32, tag = "6")]
    pub status_code: u32,
    #[prost(string, tag = "7")]
    pub status_message: ::prost::alloc::string::String,
}

impl Frame {
    pub fn request(call_id: u64, method: &str, metadata: &Metadata, body: Vec<u8>) -> Self {
        Self {
            call_id,
            kind: FrameKind::Request as i32,
            method: method.to_string(),
            metadata: metadata.to_pairs(),
            body,
            ..Default::default()
        }
    }

    pub fn stream_open(call_id: u64, method: &str, metadata: &Metadata, body: Vec<u8>) -> Self {
        Self {
            call_id,
            kind: FrameKind::StreamOpen as i32,
            method: method.to_string(),
            metadata: metadata.to_pairs(),
            body,
            ..Default::default()
        }
    }

    pub fn data(call_id: u64, body: Vec<u8>) -> Self {
        Self {
            call_id,
            kind: FrameKind::Data as i32,
            body,
            ..Default::default()
        }
    }

    pub fn client_close(call_id: u64) -> Self {
        Self {
            call_id,
            kind: FrameKind::ClientClose as i32,
            ..Default::default()
        }
    }

    pub fn response(call_id: u64, body: Vec<u8>) -> Self {
        Self {
            call_id,
            kind: FrameKind::Response as i32,
            body,
            ..Default::default()
        }
    }

    pub fn status(call_id: u64, status: &Status) -> Self {
        Self {
            call_id,
            kind: FrameKind::Status as i32,
            status_code: status.code.as_u32(),
            status_message: status.message.clone(),
            ..Default::default()
        }
    }

    pub fn cancel(call_id: u64) -> Self {
        Self {
            call_id,
            kind: FrameKind::Cancel as i32,
            ..Default::default()
        }
    }

    pub fn opened(call_id: u64) -> Self {
        Self {
            call_id,
            kind: FrameKind::Opened as i32,
            ..Default::default()
        }
    }

    /// Status carried by a `Status` frame.
    pub fn to_status(&self) -> Status {
        Status::new(
            StatusCode::from_u32(self.status_code),
            self.status_message.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_frame_roundtrip() {
        let mut metadata = Metadata::new();
        metadata.insert("grpc-url", "localhost:50051");
        let frame = Frame::request(7, "Discovery/Register", &metadata, vec![1, 2, 3]);

        let bytes = frame.encode_to_vec();
        let decoded = Frame::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(decoded.kind(), FrameKind::Request);
        assert_eq!(decoded.method, "Discovery/Register");
        assert_eq!(decoded.body, vec![1, 2, 3]);
        let restored = Metadata::from_pairs(decoded.metadata);
        assert_eq!(restored.get("grpc-url"), Some("localhost:50051"));
    }

    #[test]
    fn test_status_frame() {
        let status = Status::permission_denied("nope");
        let frame = Frame::status(3, &status);
        assert_eq!(frame.kind(), FrameKind::Status);
        assert_eq!(frame.to_status(), status);
    }

    #[test]
    fn test_unknown_kind_decodes_as_unspecified() {
        let mut frame = Frame::data(1, vec![]);
        frame.kind = 99;
        let bytes = frame.encode_to_vec();
        let decoded = Frame::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded.kind(), FrameKind::Unspecified);
    }

    #[test]
    fn test_control_frames_have_empty_bodies() {
        assert!(Frame::client_close(1).body.is_empty());
        assert!(Frame::cancel(1).body.is_empty());
        assert!(Frame::opened(1).body.is_empty());
    }
}
