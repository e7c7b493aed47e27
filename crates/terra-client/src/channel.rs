//! RPC channel: one TCP connection to the controller, shared by many calls.
//!
//! Callers enqueue frames without waiting; a writer task drains the queue
//! and a reader task pairs replies with pending calls by request id. Replies
//! are delivered on the reader task, so future callbacks run there.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use terra_core::config::ClientSettings;
use terra_core::wire::{self, ErrorReply, Frame, MessageKind, WireError};

use crate::error::{ChannelError, RpcFailure, SubmissionError};
use crate::future::{pair, ResolvedFuture};

type Responder = Box<dyn FnOnce(Result<Frame, RpcFailure>) + Send + Sync>;

/// Calls that have been sent and not yet answered.
#[derive(Default)]
struct PendingCalls {
    calls: DashMap<u64, Responder>,
    closed: AtomicBool,
    drained: Notify,
}

impl PendingCalls {
    /// Register a call. Fails if the channel closed in the meantime, in which
    /// case the call is not left behind for a sweep that already ran.
    fn register(&self, request_id: u64, responder: Responder) -> bool {
        self.calls.insert(request_id, responder);
        if self.closed.load(Ordering::SeqCst) {
            self.forget(request_id);
            return false;
        }
        true
    }

    fn deliver(&self, request_id: u64, outcome: Result<Frame, RpcFailure>) -> bool {
        let Some((_, responder)) = self.calls.remove(&request_id) else {
            return false;
        };
        responder(outcome);
        if self.calls.is_empty() {
            self.drained.notify_waiters();
        }
        true
    }

    /// Drop a call without answering it (its future was already resolved).
    fn forget(&self, request_id: u64) {
        self.calls.remove(&request_id);
        if self.calls.is_empty() {
            self.drained.notify_waiters();
        }
    }

    fn fail_all(&self, reason: &str) {
        let ids: Vec<u64> = self.calls.iter().map(|e| *e.key()).collect();
        for id in ids {
            self.deliver(id, Err(RpcFailure::ConnectionLost(reason.to_string())));
        }
        self.drained.notify_waiters();
    }
}

struct ChannelInner {
    addr: String,
    settings: ClientSettings,
    outbound: mpsc::Sender<Frame>,
    pending: Arc<PendingCalls>,
    next_id: AtomicU64,
    runtime: tokio::runtime::Handle,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for ChannelInner {
    fn drop(&mut self) {
        self.pending.closed.store(true, Ordering::SeqCst);
        self.pending.fail_all("channel dropped");
        for task in self.tasks.lock().unwrap_or_else(|e| e.into_inner()).drain(..) {
            task.abort();
        }
    }
}

/// A connection to the controller. Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    /// Connect to `addr` ("host:port"). Must be called within a Tokio runtime.
    pub async fn open(addr: &str, settings: ClientSettings) -> Result<Self, ChannelError> {
        let stream = tokio::time::timeout(settings.connect_timeout(), TcpStream::connect(addr))
            .await
            .map_err(|_| ChannelError::ConnectTimeout(addr.to_string()))?
            .map_err(|e| ChannelError::Connect(addr.to_string(), e))?;
        stream.set_nodelay(true).ok();

        let (read_half, write_half) = stream.into_split();
        let (outbound, outbound_rx) = mpsc::channel(settings.outbound_queue.max(1));
        let pending = Arc::new(PendingCalls::default());

        let writer = tokio::spawn(writer_loop(
            write_half,
            outbound_rx,
            pending.clone(),
            addr.to_string(),
        ));
        let reader = tokio::spawn(reader_loop(read_half, pending.clone(), addr.to_string()));

        tracing::info!(addr = %addr, "channel open");

        Ok(Self {
            inner: Arc::new(ChannelInner {
                addr: addr.to_string(),
                settings,
                outbound,
                pending,
                next_id: AtomicU64::new(1),
                runtime: tokio::runtime::Handle::current(),
                tasks: Mutex::new(vec![writer, reader]),
            }),
        })
    }

    pub fn addr(&self) -> &str {
        &self.inner.addr
    }

    pub fn is_closed(&self) -> bool {
        self.inner.pending.closed.load(Ordering::SeqCst)
    }

    /// Number of calls awaiting a reply.
    pub fn in_flight(&self) -> usize {
        self.inner.pending.calls.len()
    }

    /// Issue a call without waiting for the reply.
    ///
    /// A synchronous rejection is logged once and returned as `Err`; no
    /// future is created in that case.
    pub fn call<Req, Resp>(
        &self,
        kind: MessageKind,
        reply_kind: MessageKind,
        body: &Req,
    ) -> Result<ResolvedFuture<Resp>, SubmissionError>
    where
        Req: Serialize,
        Resp: DeserializeOwned + Clone + Send + 'static,
    {
        let result = self.try_call(kind, reply_kind, body);
        if let Err(e) = &result {
            tracing::warn!(addr = %self.inner.addr, ?kind, status = %e, "RPC failed");
        }
        result
    }

    fn try_call<Req, Resp>(
        &self,
        kind: MessageKind,
        reply_kind: MessageKind,
        body: &Req,
    ) -> Result<ResolvedFuture<Resp>, SubmissionError>
    where
        Req: Serialize,
        Resp: DeserializeOwned + Clone + Send + 'static,
    {
        let inner = &self.inner;
        if self.is_closed() {
            return Err(SubmissionError::ChannelClosed(inner.addr.clone()));
        }

        let request_id = inner.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = Frame::encode(kind, request_id, body)
            .map_err(|e| SubmissionError::Malformed(e.to_string()))?;

        let (future, completer) = pair::<Resp>();
        let responder: Responder = Box::new(move |outcome| {
            completer.complete(outcome.and_then(|frame| decode_reply(&frame, reply_kind)));
        });

        // Registered before sending so the reply cannot overtake it.
        if !inner.pending.register(request_id, responder) {
            return Err(SubmissionError::ChannelClosed(inner.addr.clone()));
        }
        if let Err(e) = inner.outbound.try_send(frame) {
            inner.pending.forget(request_id);
            return Err(match e {
                mpsc::error::TrySendError::Full(_) => {
                    SubmissionError::QueueFull(inner.addr.clone())
                }
                mpsc::error::TrySendError::Closed(_) => {
                    SubmissionError::ChannelClosed(inner.addr.clone())
                }
            });
        }

        let weak = Arc::downgrade(inner);
        future.set_cancel_hook(Box::new(move || withdraw(&weak, request_id)));

        if let Some(deadline) = inner.settings.request_timeout() {
            let weak = Arc::downgrade(inner);
            inner.runtime.spawn(async move {
                tokio::time::sleep(deadline).await;
                let Some(inner) = weak.upgrade() else { return };
                if inner.pending.deliver(request_id, Err(RpcFailure::Timeout)) {
                    tracing::warn!(addr = %inner.addr, request_id, "call timed out");
                    let _ = inner.outbound.try_send(Frame::empty(MessageKind::Cancel, request_id));
                }
            });
        }

        Ok(future)
    }

    /// Stop accepting calls, wait up to the shutdown grace for in-flight calls
    /// to finish, then fail whatever is left and release the connection.
    pub async fn close(&self) {
        let inner = &self.inner;
        if inner.pending.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let grace = inner.settings.shutdown_grace();
        let drained = tokio::time::timeout(grace, async {
            loop {
                let notified = inner.pending.drained.notified();
                if inner.pending.calls.is_empty() {
                    break;
                }
                notified.await;
            }
        })
        .await
        .is_ok();

        if !drained {
            tracing::warn!(
                addr = %inner.addr,
                in_flight = inner.pending.calls.len(),
                grace_ms = grace.as_millis() as u64,
                "channel closed with calls still in flight"
            );
        }
        inner.pending.fail_all("channel closed");

        for task in inner.tasks.lock().unwrap_or_else(|e| e.into_inner()).drain(..) {
            task.abort();
        }
        tracing::info!(addr = %inner.addr, "channel closed");
    }
}

/// Cancel hook: forget the call locally and tell the peer.
fn withdraw(weak: &Weak<ChannelInner>, request_id: u64) {
    let Some(inner) = weak.upgrade() else { return };
    inner.pending.forget(request_id);
    if inner
        .outbound
        .try_send(Frame::empty(MessageKind::Cancel, request_id))
        .is_err()
    {
        tracing::debug!(request_id, "cancel notice not sent");
    }
}

fn decode_reply<T: DeserializeOwned>(frame: &Frame, expected: MessageKind) -> Result<T, RpcFailure> {
    match frame.kind {
        kind if kind == expected => frame
            .decode()
            .map_err(|e| RpcFailure::Protocol(e.to_string())),
        MessageKind::Error => {
            let err: ErrorReply = frame
                .decode()
                .map_err(|e| RpcFailure::Protocol(e.to_string()))?;
            Err(RpcFailure::Status {
                code: err.code,
                message: err.message,
            })
        }
        other => Err(RpcFailure::Protocol(format!(
            "expected {:?}, got {:?}",
            expected, other
        ))),
    }
}

async fn writer_loop(
    mut write_half: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<Frame>,
    pending: Arc<PendingCalls>,
    addr: String,
) {
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = wire::write_frame(&mut write_half, &frame).await {
            tracing::warn!(addr = %addr, error = %e, "write failed, closing channel");
            pending.closed.store(true, Ordering::SeqCst);
            pending.fail_all(&e.to_string());
            return;
        }
    }
}

async fn reader_loop(mut read_half: OwnedReadHalf, pending: Arc<PendingCalls>, addr: String) {
    let reason = loop {
        match wire::read_frame(&mut read_half).await {
            Ok(Some(frame)) => match frame.kind {
                MessageKind::HelloReply | MessageKind::ShuffleInfoReply | MessageKind::Error => {
                    let request_id = frame.request_id;
                    if !pending.deliver(request_id, Ok(frame)) {
                        tracing::debug!(addr = %addr, request_id, "reply for unknown or finished call");
                    }
                }
                other => {
                    tracing::warn!(addr = %addr, kind = ?other, "unexpected frame from controller");
                }
            },
            Ok(None) => break "controller closed the connection".to_string(),
            Err(WireError::Io(e)) => break e.to_string(),
            Err(e) => {
                tracing::warn!(addr = %addr, error = %e, "protocol error, closing channel");
                break e.to_string();
            }
        }
    };

    pending.closed.store(true, Ordering::SeqCst);
    if !pending.calls.is_empty() {
        tracing::warn!(addr = %addr, in_flight = pending.calls.len(), %reason, "failing in-flight calls");
    }
    pending.fail_all(&reason);
}
