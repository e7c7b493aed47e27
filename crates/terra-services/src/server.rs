//! Controller RPC server.
//!
//! One task per connection reads frames; every request runs in its own
//! handler task so a slow dispatch never holds up the connection. Replies
//! funnel through a per-connection writer task. A `Cancel` frame aborts the
//! matching handler if it is still running.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::AbortHandle;

use terra_core::wire::{self, ErrorCode, ErrorReply, Frame, MessageKind, WireError};
use terra_core::{FlowBatch, HelloRequest};

use crate::service::ShuffleService;

/// Replies buffered per connection before handlers wait on the writer.
const REPLY_QUEUE: usize = 64;

pub struct RpcServer {
    listener: TcpListener,
    service: Arc<dyn ShuffleService>,
    shutdown: broadcast::Receiver<()>,
}

impl RpcServer {
    pub async fn bind(
        addr: &str,
        service: Arc<dyn ShuffleService>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        Ok(Self {
            listener,
            service,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the shutdown signal fires.
    pub async fn run(mut self) -> Result<()> {
        tracing::info!(addr = %self.local_addr()?, "rpc server listening");
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("rpc server shutting down");
                    return Ok(());
                }

                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(a) => a,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    tracing::debug!(peer = %peer, "connection accepted");
                    tokio::spawn(serve_connection(
                        stream,
                        peer,
                        self.service.clone(),
                        self.shutdown.resubscribe(),
                    ));
                }
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    service: Arc<dyn ShuffleService>,
    mut shutdown: broadcast::Receiver<()>,
) {
    stream.set_nodelay(true).ok();
    let (mut reader, writer) = stream.into_split();
    let (replies, replies_rx) = mpsc::channel::<Frame>(REPLY_QUEUE);
    let writer_task = tokio::spawn(write_loop(writer, replies_rx, peer));
    let in_flight: Arc<DashMap<u64, AbortHandle>> = Arc::new(DashMap::new());

    loop {
        let frame = tokio::select! {
            _ = shutdown.recv() => break,
            read = wire::read_frame(&mut reader) => match read {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    tracing::debug!(peer = %peer, "connection closed by peer");
                    break;
                }
                Err(e) => {
                    tracing::warn!(peer = %peer, error = %e, "dropping connection");
                    break;
                }
            },
        };

        let request_id = frame.request_id;
        match frame.kind {
            MessageKind::Cancel => {
                if let Some((_, handler)) = in_flight.remove(&request_id) {
                    handler.abort();
                    tracing::debug!(peer = %peer, request_id, "request cancelled");
                }
            }
            MessageKind::HelloRequest | MessageKind::SubmitShuffleInfo => {
                let service = service.clone();
                let replies = replies.clone();
                let registry = in_flight.clone();
                let handle = tokio::spawn(async move {
                    let reply = handle_request(service.as_ref(), &frame).await;
                    registry.remove(&request_id);
                    let _ = replies.send(reply).await;
                });
                let abort = handle.abort_handle();
                in_flight.insert(request_id, abort);
                // The handler may have finished before it was registered.
                if handle.is_finished() {
                    in_flight.remove(&request_id);
                }
            }
            other => {
                tracing::warn!(peer = %peer, kind = ?other, "unexpected message kind");
                let reply = error_frame(
                    request_id,
                    ErrorCode::Unimplemented,
                    format!("{other:?} is not a request"),
                );
                if replies.send(reply).await.is_err() {
                    break;
                }
            }
        }
    }

    for handler in in_flight.iter() {
        handler.value().abort();
    }
    drop(replies);
    let _ = writer_task.await;
}

async fn write_loop(mut writer: OwnedWriteHalf, mut replies: mpsc::Receiver<Frame>, peer: SocketAddr) {
    while let Some(frame) = replies.recv().await {
        if let Err(e) = wire::write_frame(&mut writer, &frame).await {
            tracing::warn!(peer = %peer, error = %e, "write failed");
            return;
        }
    }
}

async fn handle_request(service: &dyn ShuffleService, frame: &Frame) -> Frame {
    let reply = match frame.kind {
        MessageKind::HelloRequest => {
            respond(frame, MessageKind::HelloReply, |req: HelloRequest| service.hello(req)).await
        }
        MessageKind::SubmitShuffleInfo => {
            respond(frame, MessageKind::ShuffleInfoReply, |batch: FlowBatch| {
                service.submit_shuffle_info(batch)
            })
            .await
        }
        other => Ok(error_frame(
            frame.request_id,
            ErrorCode::Unimplemented,
            format!("{other:?} is not a request"),
        )),
    };
    reply.unwrap_or_else(|e| {
        tracing::warn!(request_id = frame.request_id, error = %e, "reply could not be encoded");
        error_frame(frame.request_id, ErrorCode::Internal, e.to_string())
    })
}

/// Decode the request, run the handler and encode its reply.
async fn respond<Req, Resp, F, Fut>(
    frame: &Frame,
    reply_kind: MessageKind,
    handler: F,
) -> Result<Frame, WireError>
where
    Req: DeserializeOwned,
    Resp: Serialize,
    F: FnOnce(Req) -> Fut,
    Fut: Future<Output = Result<Resp>>,
{
    let request: Req = match frame.decode() {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(request_id = frame.request_id, error = %e, "bad request");
            return Ok(error_frame(frame.request_id, ErrorCode::BadRequest, e.to_string()));
        }
    };
    match handler(request).await {
        Ok(reply) => Frame::encode(reply_kind, frame.request_id, &reply),
        Err(e) => {
            let message = format!("{e:#}");
            tracing::warn!(request_id = frame.request_id, error = %message, "handler failed");
            Ok(error_frame(frame.request_id, ErrorCode::Internal, message))
        }
    }
}

fn error_frame(request_id: u64, code: ErrorCode, message: String) -> Frame {
    let reply = ErrorReply { code, message };
    // An error reply is two short strings; fall back to an empty payload
    // rather than leave the caller waiting.
    Frame::encode(MessageKind::Error, request_id, &reply)
        .unwrap_or_else(|_| Frame::empty(MessageKind::Error, request_id))
}
