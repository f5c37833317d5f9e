//! Default TCP transport.
//!
//! One connection per process, established lazily on first use and cached.
//! A dedicated writer task owns the write half and receives frames over an
//! mpsc channel; the read loop decodes frames with a [`FrameBuffer`] and
//! routes them:
//!
//! ```text
//! unary callers ─┐
//! supervisor    ─┼─► mpsc::Sender<OutboundFrame> ─► writer task ─► socket
//! handlers      ─┘
//!
//! socket ─► read loop ─┬─► pending map (responses, by request id)
//!                      └─► dispatch stream (pushes)
//! ```
//!
//! A closed connection fails all pending calls, ends the dispatch stream,
//! and is discarded; the next call reconnects from scratch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};

use crate::codec::PayloadCodec;
use crate::error::{AgentError, Result};
use crate::protocol::{
    kind, rpc, Ack, CallRequest, CallResponse, DispatchMessage, Frame, FrameBuffer, Header,
    InvocationReport, OpenDispatchRequest, RegisterHandlerRequest, RegisterHandlerResponse,
    UnregisterHandlerRequest, HEADER_SIZE, ONE_WAY_REQUEST_ID,
};

use super::{DispatchEvent, DispatchStream, SessionTransport};

/// Read buffer size for the socket read loop.
const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Capacity of the writer task's frame queue.
const WRITER_CHANNEL_CAPACITY: usize = 64;

/// A frame ready to be written to the socket.
struct OutboundFrame {
    header: [u8; HEADER_SIZE],
    payload: Bytes,
}

/// Shared state of one live connection.
struct Connection {
    tx: mpsc::Sender<OutboundFrame>,
    /// Unary calls awaiting a response, by request id.
    pending: Mutex<HashMap<u32, oneshot::Sender<Result<Bytes>>>>,
    /// Sending half of the currently open dispatch stream, if any.
    dispatch: Mutex<Option<mpsc::Sender<Result<DispatchEvent>>>>,
    next_request_id: AtomicU32,
    closed: AtomicBool,
}

impl Connection {
    /// Spawn the writer task and read loop for a connected socket.
    fn spawn<R, W>(reader: R, writer: W) -> Arc<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(WRITER_CHANNEL_CAPACITY);

        let conn = Arc::new(Connection {
            tx,
            pending: Mutex::new(HashMap::new()),
            dispatch: Mutex::new(None),
            next_request_id: AtomicU32::new(1),
            closed: AtomicBool::new(false),
        });

        tokio::spawn(write_loop(rx, writer));
        tokio::spawn({
            let conn = conn.clone();
            async move { conn.read_loop(reader).await }
        });

        conn
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn next_request_id(&self) -> u32 {
        // Skips the reserved one-way id on wraparound.
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        if id == ONE_WAY_REQUEST_ID {
            self.next_request_id.fetch_add(1, Ordering::Relaxed)
        } else {
            id
        }
    }

    /// Install the sending half of a newly opened dispatch stream,
    /// superseding any previous one.
    fn set_dispatch(&self, tx: mpsc::Sender<Result<DispatchEvent>>) {
        *self.dispatch.lock().expect("dispatch lock poisoned") = Some(tx);
    }

    async fn send(&self, header: Header, payload: Bytes) -> Result<()> {
        let frame = OutboundFrame {
            header: header.encode(),
            payload,
        };
        self.tx
            .send(frame)
            .await
            .map_err(|_| AgentError::TransportUnavailable("connection closed".to_string()))
    }

    /// Issue a request and wait for its response payload.
    async fn unary(&self, rpc_id: u8, payload: Vec<u8>) -> Result<Bytes> {
        let request_id = self.next_request_id();
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending lock poisoned")
            .insert(request_id, tx);

        let header = Header::new(kind::REQUEST, rpc_id, request_id, payload.len() as u32);
        if let Err(err) = self.send(header, Bytes::from(payload)).await {
            self.pending
                .lock()
                .expect("pending lock poisoned")
                .remove(&request_id);
            return Err(err);
        }

        rx.await.map_err(|_| {
            AgentError::TransportUnavailable("connection closed before response".to_string())
        })?
    }

    async fn read_loop<R>(self: Arc<Self>, mut reader: R)
    where
        R: AsyncRead + Unpin,
    {
        let mut frames = FrameBuffer::new();
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        loop {
            let n = match reader.read(&mut buf).await {
                // EOF: the server went away. Benign for the dispatch stream.
                Ok(0) => return self.close(None).await,
                Ok(n) => n,
                Err(err) => {
                    return self
                        .close(Some(AgentError::StreamError(err.to_string())))
                        .await
                }
            };

            let parsed = match frames.push(&buf[..n]) {
                Ok(parsed) => parsed,
                Err(err) => return self.close(Some(err)).await,
            };

            for frame in parsed {
                self.route(frame).await;
            }
        }
    }

    async fn route(&self, frame: Frame) {
        match frame.header.kind {
            kind::RESPONSE | kind::ERROR => {
                let waiter = self
                    .pending
                    .lock()
                    .expect("pending lock poisoned")
                    .remove(&frame.header.request_id);

                let Some(waiter) = waiter else {
                    tracing::warn!(
                        request_id = frame.header.request_id,
                        "response for unknown request"
                    );
                    return;
                };

                let result = if frame.header.kind == kind::RESPONSE {
                    Ok(frame.payload)
                } else {
                    let message: String = PayloadCodec::decode(&frame.payload)
                        .unwrap_or_else(|_| "unknown remote error".to_string());
                    Err(AgentError::Remote(message))
                };
                let _ = waiter.send(result);
            }

            kind::PUSH => {
                let event = if frame.payload.is_empty() {
                    // Idle heartbeat.
                    DispatchEvent::Idle
                } else {
                    match PayloadCodec::decode::<DispatchMessage>(&frame.payload) {
                        Ok(DispatchMessage::Invoke(invocation)) => {
                            DispatchEvent::Invoke(invocation)
                        }
                        Ok(DispatchMessage::WorkCompleted) => DispatchEvent::WorkCompleted,
                        Err(err) => {
                            tracing::warn!(error = %err, "undecodable dispatch message");
                            return;
                        }
                    }
                };

                let tx = self
                    .dispatch
                    .lock()
                    .expect("dispatch lock poisoned")
                    .clone();
                if let Some(tx) = tx {
                    let _ = tx.send(Ok(event)).await;
                }
            }

            other => {
                tracing::warn!(kind = other, "unexpected inbound frame kind");
            }
        }
    }

    /// Tear the connection down: fail all pending calls, end the dispatch
    /// stream (with `error` if the close was not benign).
    async fn close(&self, error: Option<AgentError>) {
        self.closed.store(true, Ordering::Release);

        let pending = std::mem::take(&mut *self.pending.lock().expect("pending lock poisoned"));
        for (_, waiter) in pending {
            let _ = waiter.send(Err(AgentError::TransportUnavailable(
                "connection closed".to_string(),
            )));
        }

        let dispatch = self
            .dispatch
            .lock()
            .expect("dispatch lock poisoned")
            .take();
        if let Some(tx) = dispatch {
            if let Some(err) = error {
                let _ = tx.send(Err(err)).await;
            }
            // Dropping the sender ends the stream benignly.
        }
    }
}

async fn write_loop<W>(mut rx: mpsc::Receiver<OutboundFrame>, mut writer: W)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        if writer.write_all(&frame.header).await.is_err() {
            return;
        }
        if !frame.payload.is_empty() && writer.write_all(&frame.payload).await.is_err() {
            return;
        }
        if writer.flush().await.is_err() {
            return;
        }
    }
}

/// TCP implementation of [`SessionTransport`].
pub struct TcpTransport {
    addr: String,
    conn: tokio::sync::Mutex<Option<Arc<Connection>>>,
}

impl TcpTransport {
    /// Create a transport for the given server address. No connection is
    /// made until the first call.
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            addr: format!("{host}:{port}"),
            conn: tokio::sync::Mutex::new(None),
        }
    }

    /// Get the live connection, establishing one if needed.
    async fn connection(&self) -> Result<Arc<Connection>> {
        let mut guard = self.conn.lock().await;

        if let Some(conn) = guard.as_ref() {
            if !conn.is_closed() {
                return Ok(conn.clone());
            }
        }

        let stream = TcpStream::connect(&self.addr).await.map_err(|err| {
            AgentError::TransportUnavailable(format!("connect {}: {err}", self.addr))
        })?;
        let (reader, writer) = stream.into_split();
        let conn = Connection::spawn(reader, writer);
        *guard = Some(conn.clone());

        tracing::debug!(addr = %self.addr, "connected to dispatch server");
        Ok(conn)
    }
}

#[async_trait]
impl SessionTransport for TcpTransport {
    async fn ensure_connected(&self) -> Result<()> {
        self.connection().await.map(|_| ())
    }

    async fn register_handler(&self, request: RegisterHandlerRequest) -> Result<String> {
        let conn = self.connection().await?;
        let payload = PayloadCodec::encode(&request)?;
        let response = conn.unary(rpc::REGISTER_HANDLER, payload).await?;
        let decoded: RegisterHandlerResponse = PayloadCodec::decode(&response)?;
        Ok(decoded.id)
    }

    async fn unregister_handler(&self, id: &str) -> Result<()> {
        let conn = self.connection().await?;
        let payload = PayloadCodec::encode(&UnregisterHandlerRequest { id: id.to_string() })?;
        let response = conn.unary(rpc::UNREGISTER_HANDLER, payload).await?;
        let _: Ack = PayloadCodec::decode(&response)?;
        Ok(())
    }

    async fn report_invocation(&self, report: InvocationReport) -> Result<()> {
        let conn = self.connection().await?;
        let payload = PayloadCodec::encode(&report)?;
        let response = conn.unary(rpc::REPORT_INVOCATION, payload).await?;
        let _: Ack = PayloadCodec::decode(&response)?;
        Ok(())
    }

    async fn open_dispatch(&self, session_id: &str, version: &str) -> Result<DispatchStream> {
        let conn = self.connection().await?;
        let (tx, stream) = DispatchStream::channel();
        conn.set_dispatch(tx);

        let payload = PayloadCodec::encode(&OpenDispatchRequest {
            session_id: session_id.to_string(),
            version: version.to_string(),
        })?;
        let header = Header::new(
            kind::REQUEST,
            rpc::OPEN_DISPATCH,
            ONE_WAY_REQUEST_ID,
            payload.len() as u32,
        );
        conn.send(header, Bytes::from(payload)).await?;

        Ok(stream)
    }

    async fn call(&self, request: CallRequest) -> Result<CallResponse> {
        let conn = self.connection().await?;
        let payload = PayloadCodec::encode(&request)?;
        let response = conn.unary(rpc::CALL, payload).await?;
        PayloadCodec::decode(&response)
    }
}
