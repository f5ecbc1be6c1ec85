//! Multimodal frame processing.
//!
//! The exchange stream hands every inbound frame to a [`FrameProcessor`]
//! and forwards the result in input order. Processors receive the whole
//! frame, so a variant the processor does not inspect (including one this
//! build cannot decode) passes through untouched.

use weft_wire::proto::MultiModalFrame;

/// Transform applied to each frame of a multimodal exchange.
pub trait FrameProcessor: Send + Sync {
    fn process(&self, frame: MultiModalFrame) -> MultiModalFrame;
}

/// Default exchange semantics: echo each frame back to the sender.
#[derive(Debug, Default)]
pub struct EchoProcessor;

impl FrameProcessor for EchoProcessor {
    fn process(&self, frame: MultiModalFrame) -> MultiModalFrame {
        frame
    }
}
