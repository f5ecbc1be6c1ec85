//! RPC client: one multiplexed connection, typed call entry points.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use prost::Message;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use crate::error::WireResult;
use crate::frame::{Frame, FrameKind};
use crate::metadata::Metadata;
use crate::status::Status;

type PendingMap = Arc<Mutex<HashMap<u64, mpsc::UnboundedSender<Frame>>>>;

/// A connection to one fabric endpoint. Cheap to clone; all clones share
/// the underlying socket and call-id space.
#[derive(Clone)]
pub struct RpcClient {
    next_id: Arc<AtomicU64>,
    out_tx: mpsc::Sender<Frame>,
    pending: PendingMap,
}

impl RpcClient {
    /// Connect and spawn the connection's reader and writer tasks.
    pub async fn connect(addr: &str) -> WireResult<Self> {
        let socket = TcpStream::connect(addr).await?;
        let (read_half, write_half) = socket.into_split();
        let mut reader = FramedRead::new(read_half, LengthDelimitedCodec::new());
        let mut writer = FramedWrite::new(write_half, LengthDelimitedCodec::new());

        let (out_tx, mut out_rx) = mpsc::channel::<Frame>(256);
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if writer.send(Bytes::from(frame.encode_to_vec())).await.is_err() {
                    break;
                }
            }
        });

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let dispatch = Arc::clone(&pending);
        tokio::spawn(async move {
            while let Some(item) = reader.next().await {
                let buf = match item {
                    Ok(buf) => buf,
                    Err(_) => break,
                };
                let frame = match Frame::decode(buf.freeze()) {
                    Ok(frame) => frame,
                    Err(_) => break,
                };
                let terminal = matches!(frame.kind(), FrameKind::Status | FrameKind::Response);
                let call_id = frame.call_id;
                let tx = {
                    let map = dispatch.lock().expect("pending map lock poisoned");
                    map.get(&call_id).cloned()
                };
                if let Some(tx) = tx {
                    let _ = tx.send(frame);
                }
                if terminal {
                    dispatch
                        .lock()
                        .expect("pending map lock poisoned")
                        .remove(&call_id);
                }
            }
            // Connection gone: wake every pending call with closed channels.
            dispatch.lock().expect("pending map lock poisoned").clear();
        });

        Ok(Self {
            next_id: Arc::new(AtomicU64::new(1)),
            out_tx,
            pending,
        })
    }

    fn begin_call(&self) -> (u64, mpsc::UnboundedReceiver<Frame>) {
        let call_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.pending
            .lock()
            .expect("pending map lock poisoned")
            .insert(call_id, tx);
        (call_id, rx)
    }

    fn end_call(&self, call_id: u64) {
        self.pending
            .lock()
            .expect("pending map lock poisoned")
            .remove(&call_id);
    }

    /// Issue a unary call.
    pub async fn unary(
        &self,
        method: &str,
        metadata: &Metadata,
        body: Vec<u8>,
    ) -> Result<Vec<u8>, Status> {
        let (call_id, mut rx) = self.begin_call();
        let frame = Frame::request(call_id, method, metadata, body);
        if self.out_tx.send(frame).await.is_err() {
            self.end_call(call_id);
            return Err(Status::unavailable("connection closed"));
        }

        while let Some(frame) = rx.recv().await {
            match frame.kind() {
                FrameKind::Response => return Ok(frame.body),
                FrameKind::Status => {
                    let status = frame.to_status();
                    return if status.is_ok() {
                        Ok(Vec::new())
                    } else {
                        Err(status)
                    };
                }
                _ => continue,
            }
        }
        self.end_call(call_id);
        Err(Status::unavailable("connection closed"))
    }

    /// Open a server-streaming call. Resolves once the server has accepted
    /// the stream (after authorization) or rejected it.
    pub async fn server_stream(
        &self,
        method: &str,
        metadata: &Metadata,
        body: Vec<u8>,
    ) -> Result<InboundStream, Status> {
        let (call_id, rx) = self.begin_call();
        let frame = Frame::stream_open(call_id, method, metadata, body);
        if self.out_tx.send(frame).await.is_err() {
            self.end_call(call_id);
            return Err(Status::unavailable("connection closed"));
        }
        self.await_opened(call_id, rx).await
    }

    /// Open a bidirectional-streaming call.
    pub async fn bidi(
        &self,
        method: &str,
        metadata: &Metadata,
    ) -> Result<(OutboundSink, InboundStream), Status> {
        let (call_id, rx) = self.begin_call();
        let frame = Frame::stream_open(call_id, method, metadata, Vec::new());
        if self.out_tx.send(frame).await.is_err() {
            self.end_call(call_id);
            return Err(Status::unavailable("connection closed"));
        }
        let inbound = self.await_opened(call_id, rx).await?;
        let outbound = OutboundSink {
            call_id,
            out_tx: self.out_tx.clone(),
        };
        Ok((outbound, inbound))
    }

    async fn await_opened(
        &self,
        call_id: u64,
        mut rx: mpsc::UnboundedReceiver<Frame>,
    ) -> Result<InboundStream, Status> {
        while let Some(frame) = rx.recv().await {
            match frame.kind() {
                FrameKind::Opened => {
                    return Ok(InboundStream {
                        call_id,
                        rx,
                        out_tx: self.out_tx.clone(),
                        pending: Arc::clone(&self.pending),
                        finished: false,
                    });
                }
                FrameKind::Status => {
                    let status = frame.to_status();
                    return Err(if status.is_ok() {
                        Status::internal("stream closed before it was opened")
                    } else {
                        status
                    });
                }
                _ => continue,
            }
        }
        self.end_call(call_id);
        Err(Status::unavailable("connection closed"))
    }
}

/// Client-side write half of a bidi call.
pub struct OutboundSink {
    call_id: u64,
    out_tx: mpsc::Sender<Frame>,
}

impl OutboundSink {
    pub async fn send(&self, body: Vec<u8>) -> Result<(), Status> {
        self.out_tx
            .send(Frame::data(self.call_id, body))
            .await
            .map_err(|_| Status::unavailable("connection closed"))
    }

    /// Half-close: signal that no more client data will follow.
    pub async fn close(&self) {
        let _ = self.out_tx.send(Frame::client_close(self.call_id)).await;
    }
}

/// Client-side read half of a streaming call. Dropping it before the
/// stream terminates cancels the call on the server.
pub struct InboundStream {
    call_id: u64,
    rx: mpsc::UnboundedReceiver<Frame>,
    out_tx: mpsc::Sender<Frame>,
    pending: PendingMap,
    finished: bool,
}

impl InboundStream {
    /// Next streamed message. `None` means the stream ended cleanly;
    /// `Some(Err(_))` carries the terminal failure status.
    pub async fn next(&mut self) -> Option<Result<Vec<u8>, Status>> {
        if self.finished {
            return None;
        }
        while let Some(frame) = self.rx.recv().await {
            match frame.kind() {
                FrameKind::Data => return Some(Ok(frame.body)),
                FrameKind::Status => {
                    self.finished = true;
                    let status = frame.to_status();
                    if status.is_ok() {
                        return None;
                    }
                    return Some(Err(status));
                }
                _ => continue,
            }
        }
        self.finished = true;
        None
    }

    /// Decode the next message as `M`.
    pub async fn next_message<M: Message + Default>(&mut self) -> Option<Result<M, Status>> {
        match self.next().await? {
            Ok(body) => Some(
                M::decode(body.as_slice())
                    .map_err(|e| Status::internal(format!("malformed stream message: {}", e))),
            ),
            Err(status) => Some(Err(status)),
        }
    }
}

impl Drop for InboundStream {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.out_tx.try_send(Frame::cancel(self.call_id));
        }
        if let Ok(mut map) = self.pending.lock() {
            map.remove(&self.call_id);
        }
    }
}
