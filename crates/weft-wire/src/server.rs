//! RPC server: connection accept loop, call demultiplexing, and handler
//! routing.
//!
//! Each accepted connection gets a reader task (this function) and a
//! writer task owning the outbound send queue; every call runs in its own
//! task. Stream handlers receive and return channels, so a slow peer only
//! ever backs up its own connection's queue.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use prost::Message;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use crate::error::WireResult;
use crate::frame::{Frame, FrameKind};
use crate::metadata::{Metadata, DEADLINE_MS_KEY, PEER_ADDR_KEY};
use crate::status::Status;

/// Handler for a unary method.
#[async_trait]
pub trait UnaryHandler: Send + Sync {
    async fn call(&self, metadata: Metadata, body: Vec<u8>) -> Result<Vec<u8>, Status>;
}

/// Handler for a server-streaming method. The returned channel's messages
/// become `Data` frames; closing it ends the stream with an OK status.
#[async_trait]
pub trait ServerStreamHandler: Send + Sync {
    async fn call(
        &self,
        metadata: Metadata,
        body: Vec<u8>,
    ) -> Result<mpsc::Receiver<Vec<u8>>, Status>;
}

/// Handler for a bidirectional-streaming method.
#[async_trait]
pub trait BidiHandler: Send + Sync {
    async fn call(
        &self,
        metadata: Metadata,
        inbound: mpsc::Receiver<Vec<u8>>,
    ) -> Result<mpsc::Receiver<Vec<u8>>, Status>;
}

enum Route {
    Unary(Arc<dyn UnaryHandler>),
    ServerStream(Arc<dyn ServerStreamHandler>),
    Bidi(Arc<dyn BidiHandler>),
}

/// Per-connection outbound queue depth.
const SEND_QUEUE_DEPTH: usize = 256;

/// Per-call inbound queue depth for bidi calls. The reader uses a
/// non-blocking write; frames beyond this bound are dropped.
const INBOUND_QUEUE_DEPTH: usize = 256;

struct ActiveCall {
    inbound: Option<mpsc::Sender<Vec<u8>>>,
    task: JoinHandle<()>,
}

/// Method router and accept loop.
#[derive(Default)]
pub struct RpcServer {
    routes: HashMap<String, Route>,
}

impl RpcServer {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    pub fn route_unary(&mut self, method: &str, handler: Arc<dyn UnaryHandler>) {
        self.routes.insert(method.to_string(), Route::Unary(handler));
    }

    pub fn route_server_stream(&mut self, method: &str, handler: Arc<dyn ServerStreamHandler>) {
        self.routes
            .insert(method.to_string(), Route::ServerStream(handler));
    }

    pub fn route_bidi(&mut self, method: &str, handler: Arc<dyn BidiHandler>) {
        self.routes.insert(method.to_string(), Route::Bidi(handler));
    }

    /// Accept connections until the listener fails.
    pub async fn serve(self, listener: TcpListener) -> WireResult<()> {
        let server = Arc::new(self);
        loop {
            let (socket, peer) = listener.accept().await?;
            let server = Arc::clone(&server);
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(socket, peer).await {
                    tracing::debug!(peer = %peer, error = %e, "connection ended");
                }
            });
        }
    }

    async fn handle_connection(
        self: Arc<Self>,
        socket: TcpStream,
        peer: SocketAddr,
    ) -> WireResult<()> {
        let (read_half, write_half) = socket.into_split();
        let mut reader = FramedRead::new(read_half, LengthDelimitedCodec::new());
        let mut writer = FramedWrite::new(write_half, LengthDelimitedCodec::new());

        let (out_tx, mut out_rx) = mpsc::channel::<Frame>(SEND_QUEUE_DEPTH);
        let writer_task = tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if writer.send(Bytes::from(frame.encode_to_vec())).await.is_err() {
                    break;
                }
            }
        });

        let mut calls: HashMap<u64, ActiveCall> = HashMap::new();

        while let Some(item) = reader.next().await {
            let buf = item?;
            let frame = Frame::decode(buf.freeze())?;
            let call_id = frame.call_id;

            match frame.kind() {
                FrameKind::Request => {
                    calls.retain(|_, call| !call.task.is_finished());
                    self.dispatch_unary(frame, peer, &out_tx);
                }
                FrameKind::StreamOpen => {
                    calls.retain(|_, call| !call.task.is_finished());
                    if let Some(call) = self.dispatch_stream(frame, peer, &out_tx) {
                        calls.insert(call_id, call);
                    }
                }
                FrameKind::Data => {
                    if let Some(call) = calls.get(&call_id) {
                        if let Some(tx) = &call.inbound {
                            // Non-blocking: drop on overflow rather than
                            // stalling the whole connection.
                            let _ = tx.try_send(frame.body);
                        }
                    }
                }
                FrameKind::ClientClose => {
                    if let Some(call) = calls.get_mut(&call_id) {
                        call.inbound = None;
                    }
                }
                FrameKind::Cancel => {
                    if let Some(call) = calls.remove(&call_id) {
                        call.task.abort();
                        tracing::debug!(call_id, "call cancelled by client");
                    }
                }
                _ => {
                    tracing::debug!(call_id, kind = frame.kind, "ignoring unexpected frame");
                }
            }
        }

        // Peer disconnected: tear every live call down so subscriber
        // registrations are released.
        for (_, call) in calls.drain() {
            call.task.abort();
        }
        writer_task.abort();
        Ok(())
    }

    fn dispatch_unary(&self, frame: Frame, peer: SocketAddr, out_tx: &mpsc::Sender<Frame>) {
        let call_id = frame.call_id;
        let out = out_tx.clone();

        let handler = match self.routes.get(&frame.method) {
            Some(Route::Unary(h)) => Arc::clone(h),
            Some(_) => {
                respond_status(
                    out,
                    call_id,
                    Status::unimplemented(format!("{} is a streaming method", frame.method)),
                );
                return;
            }
            None => {
                respond_status(
                    out,
                    call_id,
                    Status::unimplemented(format!("unknown method {}", frame.method)),
                );
                return;
            }
        };

        let mut metadata = Metadata::from_pairs(frame.metadata);
        metadata.insert(PEER_ADDR_KEY, peer.to_string());
        let body = frame.body;

        tokio::spawn(async move {
            let deadline = metadata
                .get(DEADLINE_MS_KEY)
                .and_then(|v| v.parse::<u64>().ok());
            let fut = handler.call(metadata, body);
            let result = match deadline {
                Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), fut).await {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::warn!(call_id, deadline_ms = ms, "unary call exceeded deadline");
                        Err(Status::deadline_exceeded("deadline exceeded"))
                    }
                },
                None => fut.await,
            };
            let frame = match result {
                Ok(body) => Frame::response(call_id, body),
                Err(status) => Frame::status(call_id, &status),
            };
            let _ = out.send(frame).await;
        });
    }

    fn dispatch_stream(
        &self,
        frame: Frame,
        peer: SocketAddr,
        out_tx: &mpsc::Sender<Frame>,
    ) -> Option<ActiveCall> {
        let call_id = frame.call_id;
        let out = out_tx.clone();

        let mut metadata = Metadata::from_pairs(frame.metadata);
        metadata.insert(PEER_ADDR_KEY, peer.to_string());
        let body = frame.body;

        match self.routes.get(&frame.method) {
            Some(Route::ServerStream(h)) => {
                let handler = Arc::clone(h);
                let task = tokio::spawn(async move {
                    match handler.call(metadata, body).await {
                        Ok(mut rx) => {
                            if out.send(Frame::opened(call_id)).await.is_err() {
                                return;
                            }
                            while let Some(item) = rx.recv().await {
                                if out.send(Frame::data(call_id, item)).await.is_err() {
                                    return;
                                }
                            }
                            let _ = out.send(Frame::status(call_id, &Status::ok())).await;
                        }
                        Err(status) => {
                            let _ = out.send(Frame::status(call_id, &status)).await;
                        }
                    }
                });
                Some(ActiveCall {
                    inbound: None,
                    task,
                })
            }
            Some(Route::Bidi(h)) => {
                let handler = Arc::clone(h);
                let (in_tx, in_rx) = mpsc::channel::<Vec<u8>>(INBOUND_QUEUE_DEPTH);
                let task = tokio::spawn(async move {
                    match handler.call(metadata, in_rx).await {
                        Ok(mut rx) => {
                            if out.send(Frame::opened(call_id)).await.is_err() {
                                return;
                            }
                            while let Some(item) = rx.recv().await {
                                if out.send(Frame::data(call_id, item)).await.is_err() {
                                    return;
                                }
                            }
                            let _ = out.send(Frame::status(call_id, &Status::ok())).await;
                        }
                        Err(status) => {
                            let _ = out.send(Frame::status(call_id, &status)).await;
                        }
                    }
                });
                Some(ActiveCall {
                    inbound: Some(in_tx),
                    task,
                })
            }
            Some(Route::Unary(_)) => {
                respond_status(
                    out,
                    call_id,
                    Status::unimplemented(format!("{} is a unary method", frame.method)),
                );
                None
            }
            None => {
                respond_status(
                    out,
                    call_id,
                    Status::unimplemented(format!("unknown method {}", frame.method)),
                );
                None
            }
        }
    }
}

fn respond_status(out: mpsc::Sender<Frame>, call_id: u64, status: Status) {
    tokio::spawn(async move {
        let _ = out.send(Frame::status(call_id, &status)).await;
    });
}
