//! Connection handler - joins one document and pumps frames for its session

use std::sync::Arc;
use std::time::Duration;

use quire_core::{Curator, Session};
use quire_protocol::{ClientFrame, Parser, ProtocolError, ServerFrame};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::TransportError;

/// Per-connection timeouts
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// A joined client silent for this long is released
    pub session_timeout: Duration,
    /// Time allowed between connecting and a successful join
    pub handshake_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_secs(300),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    Close,
}

/// Handles a single client connection
pub struct ConnectionHandler {
    /// Unique client ID, for logs
    pub client_id: String,
    curator: Arc<Curator>,
    config: TransportConfig,
    parser: Parser,
    buf: Vec<u8>,
}

impl ConnectionHandler {
    pub fn new(client_id: String, curator: Arc<Curator>, config: TransportConfig) -> Self {
        Self {
            client_id,
            curator,
            config,
            parser: Parser::new(),
            buf: vec![0u8; 8192],
        }
    }

    /// Serve the connection until the client leaves, disconnects or times out
    pub async fn run<S>(mut self, mut stream: S) -> Result<(), TransportError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let Some(mut session) = self.handshake(&mut stream).await? else {
            return Ok(());
        };

        let result = self.pump(&mut stream, &mut session).await;
        self.curator.release(session).await;
        result
    }

    async fn handshake<S>(&mut self, stream: &mut S) -> Result<Option<Session>, TransportError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let deadline = Instant::now() + self.config.handshake_timeout;

        loop {
            while let Some(frame) = self.next_buffered(stream).await? {
                match frame {
                    ClientFrame::Join { author, path } => {
                        return match self.curator.create_or_join(&path, &author).await {
                            Ok(session) => {
                                info!(
                                    client = %self.client_id,
                                    session = %session.id(),
                                    path = %session.path(),
                                    author = %author,
                                    "Client joined"
                                );
                                Ok(Some(session))
                            }
                            Err(e) => {
                                warn!(client = %self.client_id, path = %path, error = %e, "Join refused");
                                send(stream, &ServerFrame::from(&e)).await?;
                                Ok(None)
                            }
                        };
                    }
                    ClientFrame::Ping => send(stream, &ServerFrame::Pong).await?,
                    ClientFrame::Leave => return Ok(None),
                    ClientFrame::Submit { .. } => {
                        send(stream, &ServerFrame::error("NOT_JOINED", "join a document first")).await?
                    }
                }
            }

            let n = tokio::time::timeout_at(deadline, stream.read(&mut self.buf))
                .await
                .map_err(|_| TransportError::HandshakeTimeout(self.config.handshake_timeout))??;
            if n == 0 {
                debug!(client = %self.client_id, "Client disconnected before joining");
                return Ok(None);
            }
            self.feed(stream, n).await?;
        }
    }

    async fn pump<S>(&mut self, stream: &mut S, session: &mut Session) -> Result<(), TransportError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let timeout = self.config.session_timeout;
        let idle = tokio::time::sleep(timeout);
        tokio::pin!(idle);

        // frames that arrived in the same read as the join
        if self.dispatch(stream, session).await? == Step::Close {
            return Ok(());
        }

        loop {
            tokio::select! {
                read = stream.read(&mut self.buf) => {
                    let n = read?;
                    if n == 0 {
                        info!(client = %self.client_id, session = %session.id(), "Client disconnected");
                        return Ok(());
                    }
                    idle.as_mut().reset(Instant::now() + timeout);
                    self.feed(stream, n).await?;
                    if self.dispatch(stream, session).await? == Step::Close {
                        return Ok(());
                    }
                }

                event = session.recv() => {
                    match event {
                        Some(event) => {
                            send(stream, &ServerFrame::from_outbound(session.id(), event)).await?;
                        }
                        None => {
                            send(stream, &ServerFrame::error("BINDER_CLOSED", "document closed")).await?;
                            return Ok(());
                        }
                    }
                }

                _ = &mut idle => {
                    info!(
                        client = %self.client_id,
                        session = %session.id(),
                        timeout = ?timeout,
                        "Session timed out"
                    );
                    return Ok(());
                }
            }
        }
    }

    async fn dispatch<S>(&mut self, stream: &mut S, session: &Session) -> Result<Step, TransportError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        while let Some(frame) = self.next_buffered(stream).await? {
            debug!(client = %self.client_id, frame = frame.name(), "Frame received");

            match frame {
                ClientFrame::Submit { operation } => {
                    if operation.author != session.author() {
                        let message = format!("operation author {} does not match session", operation.author);
                        send(stream, &ServerFrame::error("MALFORMED_OPERATION", message)).await?;
                        continue;
                    }
                    if let Err(e) = session.submit(operation).await {
                        send(stream, &ServerFrame::from(&e)).await?;
                        return Ok(Step::Close);
                    }
                }
                ClientFrame::Ping => send(stream, &ServerFrame::Pong).await?,
                ClientFrame::Leave => {
                    info!(client = %self.client_id, session = %session.id(), "Client left");
                    return Ok(Step::Close);
                }
                ClientFrame::Join { .. } => {
                    send(stream, &ServerFrame::error("ALREADY_JOINED", "connection is already joined")).await?
                }
            }
        }
        Ok(Step::Continue)
    }

    async fn feed<S>(&mut self, stream: &mut S, n: usize) -> Result<(), TransportError>
    where
        S: AsyncWrite + Unpin,
    {
        if let Err(e) = self.parser.feed(&self.buf[..n]) {
            send(stream, &ServerFrame::error("PROTOCOL", e.to_string())).await?;
            return Err(e.into());
        }
        Ok(())
    }

    /// Next buffered frame; malformed lines are answered and skipped
    async fn next_buffered<S>(&mut self, stream: &mut S) -> Result<Option<ClientFrame>, TransportError>
    where
        S: AsyncWrite + Unpin,
    {
        loop {
            match self.parser.parse() {
                Ok(frame) => return Ok(frame),
                Err(ProtocolError::InvalidJson(message)) => {
                    debug!(client = %self.client_id, error = %message, "Malformed frame");
                    send(stream, &ServerFrame::error("PROTOCOL", message)).await?;
                }
                Err(e) => {
                    send(stream, &ServerFrame::error("PROTOCOL", e.to_string())).await?;
                    return Err(e.into());
                }
            }
        }
    }
}

async fn send<S>(stream: &mut S, frame: &ServerFrame) -> Result<(), TransportError>
where
    S: AsyncWrite + Unpin,
{
    let data = frame.encode()?;
    stream.write_all(&data).await?;
    Ok(())
}
