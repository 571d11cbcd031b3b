//! Execution server: the TCP side of the exchange.
//!
//! Accepts competitor connections and runs two tasks per session on the
//! local set: a reader that turns length-prefixed frames into engine events,
//! and a writer that drains the session's outbound channel. Framing errors
//! and login timeouts close the connection; the engine closes a session by
//! dropping its outbound sink, which shuts the write half down.

use crate::messages::{self, ClientMessage, ServerMessage, HEADER_SIZE, MAX_INBOUND_FRAME};
use crate::types::SessionId;
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

/// Seconds a fresh connection gets to deliver its LOGIN frame, in simulated
/// time (the controller divides by the speed factor).
pub const LOGIN_TIMEOUT_SECONDS: f64 = 5.0;

/// Transport-side events delivered to the engine, per session in FIFO order.
#[derive(Debug)]
pub enum SessionEvent {
    /// A connection was accepted; the engine owns the outbound sink.
    Connected {
        session_id: SessionId,
        sink: mpsc::UnboundedSender<ServerMessage>,
    },
    /// One decoded inbound frame.
    Message {
        session_id: SessionId,
        message: ClientMessage,
    },
    /// The socket closed or failed framing.
    Disconnected { session_id: SessionId },
}

/// Listens for competitor connections and owns per-session transport tasks.
pub struct ExecutionServer {
    listener: TcpListener,
    events: mpsc::UnboundedSender<SessionEvent>,
    login_timeout: Duration,
    next_session_id: SessionId,
}

impl ExecutionServer {
    /// Bind the execution endpoint.
    pub async fn bind(
        addr: SocketAddr,
        events: mpsc::UnboundedSender<SessionEvent>,
        login_timeout: Duration,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "execution server listening");
        Ok(Self {
            listener,
            events,
            login_timeout,
            next_session_id: 1,
        })
    }

    /// The bound address (useful when the port was 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Runs until the controller aborts it at shutdown.
    pub async fn run(mut self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let session_id = self.next_session_id;
                    self.next_session_id += 1;
                    if let Err(err) = stream.set_nodelay(true) {
                        warn!(session_id, %err, "could not set TCP_NODELAY");
                    }
                    debug!(session_id, %peer, "connection accepted");

                    let (sink, outbound) = mpsc::unbounded_channel();
                    if self
                        .events
                        .send(SessionEvent::Connected { session_id, sink })
                        .is_err()
                    {
                        // Engine is gone; the match is over.
                        return;
                    }
                    spawn_session(session_id, stream, outbound, self.events.clone(), self.login_timeout);
                }
                Err(err) => {
                    warn!(%err, "accept failed");
                }
            }
        }
    }
}

fn spawn_session(
    session_id: SessionId,
    stream: TcpStream,
    outbound: mpsc::UnboundedReceiver<ServerMessage>,
    events: mpsc::UnboundedSender<SessionEvent>,
    login_timeout: Duration,
) {
    let (read_half, write_half) = stream.into_split();
    tokio::task::spawn_local(read_task(session_id, read_half, events, login_timeout));
    tokio::task::spawn_local(write_task(session_id, write_half, outbound));
}

/// Read frames until EOF, a framing error or a login timeout, forwarding
/// decoded messages to the engine in arrival order.
async fn read_task(
    session_id: SessionId,
    mut reader: OwnedReadHalf,
    events: mpsc::UnboundedSender<SessionEvent>,
    login_timeout: Duration,
) {
    // The first frame must arrive within the login window.
    match timeout(login_timeout, read_frame(&mut reader)).await {
        Err(_) => {
            debug!(session_id, "login timeout");
        }
        Ok(first) => {
            if forward_frame(session_id, first, &events) {
                loop {
                    let frame = read_frame(&mut reader).await;
                    if !forward_frame(session_id, frame, &events) {
                        break;
                    }
                }
            }
        }
    }
    let _ = events.send(SessionEvent::Disconnected { session_id });
}

/// Returns false when the session should stop reading.
fn forward_frame(
    session_id: SessionId,
    frame: io::Result<Option<(u8, usize, Vec<u8>)>>,
    events: &mpsc::UnboundedSender<SessionEvent>,
) -> bool {
    match frame {
        Ok(Some((message_type, length, body))) => {
            match messages::decode_client(message_type, length, &body) {
                Ok(message) => events
                    .send(SessionEvent::Message {
                        session_id,
                        message,
                    })
                    .is_ok(),
                Err(err) => {
                    warn!(session_id, %err, "framing error");
                    false
                }
            }
        }
        Ok(None) => {
            debug!(session_id, "peer closed connection");
            false
        }
        Err(err) => {
            debug!(session_id, %err, "socket read failed");
            false
        }
    }
}

/// Read one length-prefixed frame. `Ok(None)` is a clean EOF at a frame
/// boundary; EOF mid-frame is an error.
async fn read_frame(reader: &mut OwnedReadHalf) -> io::Result<Option<(u8, usize, Vec<u8>)>> {
    let mut header = [0u8; HEADER_SIZE];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err),
    }
    let length = u16::from_be_bytes([header[0], header[1]]) as usize;
    let message_type = header[2];
    if length < HEADER_SIZE || length > MAX_INBOUND_FRAME {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("oversized or truncated frame: length {length}"),
        ));
    }
    let mut body = vec![0u8; length - HEADER_SIZE];
    reader.read_exact(&mut body).await?;
    Ok(Some((message_type, length, body)))
}

/// Drain the outbound channel onto the socket. When the engine drops the
/// sink the channel closes and the write half is shut down, closing the
/// session from the exchange side.
async fn write_task(
    session_id: SessionId,
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<ServerMessage>,
) {
    while let Some(message) = outbound.recv().await {
        let frame = messages::encode_server(&message);
        if let Err(err) = writer.write_all(&frame).await {
            debug!(session_id, %err, "socket write failed");
            return;
        }
    }
    let _ = writer.shutdown().await;
    debug!(session_id, "outbound channel closed");
}
