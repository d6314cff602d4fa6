//! TCP transport for Quire

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use quire_core::Curator;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

use crate::error::TransportError;
use crate::handler::{ConnectionHandler, TransportConfig};

/// TCP Server for Quire
pub struct TcpServer {
    curator: Arc<Curator>,
    addr: SocketAddr,
    client_counter: AtomicU64,
    config: TransportConfig,
}

impl TcpServer {
    pub fn new(curator: Arc<Curator>, addr: SocketAddr) -> Self {
        Self {
            curator,
            addr,
            client_counter: AtomicU64::new(0),
            config: TransportConfig::default(),
        }
    }

    pub fn with_config(mut self, config: TransportConfig) -> Self {
        self.config = config;
        self
    }

    /// Bind the configured address and serve forever
    pub async fn run(&self) -> Result<(), TransportError> {
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %listener.local_addr()?, "Quire TCP server listening");
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<(), TransportError> {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let client_id = format!(
                        "tcp:{}:{}",
                        peer_addr,
                        self.client_counter.fetch_add(1, Ordering::Relaxed)
                    );
                    let curator = Arc::clone(&self.curator);
                    let config = self.config.clone();

                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(stream, client_id.clone(), curator, config).await {
                            error!(client = %client_id, error = %e, "Connection error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        client_id: String,
        curator: Arc<Curator>,
        config: TransportConfig,
    ) -> Result<(), TransportError> {
        debug!(client = %client_id, "Client connected");
        if let Err(e) = stream.set_nodelay(true) {
            debug!(client = %client_id, error = %e, "Could not set TCP_NODELAY");
        }

        ConnectionHandler::new(client_id.clone(), curator, config)
            .run(stream)
            .await?;

        debug!(client = %client_id, "Connection closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_core::{Anarchy, CuratorConfig, Outbound, Replica};
    use quire_protocol::{ClientFrame, Parser, ServerFrame};
    use quire_storage::MemoryStore;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    struct Peer {
        stream: TcpStream,
        parser: Parser,
        replica: Replica,
    }

    impl Peer {
        async fn join(addr: SocketAddr, author: &str, path: &str) -> Self {
            let mut peer = Self {
                stream: TcpStream::connect(addr).await.unwrap(),
                parser: Parser::new(),
                replica: Replica::new(author, "", 0),
            };
            peer.send(ClientFrame::join(author, path)).await;
            match peer.recv().await {
                ServerFrame::Joined { content, version, .. } => peer.replica.resync(content, version),
                other => panic!("unexpected frame {:?}", other),
            }
            peer
        }

        async fn send(&mut self, frame: ClientFrame) {
            self.stream.write_all(&frame.encode().unwrap()).await.unwrap();
        }

        async fn recv(&mut self) -> ServerFrame {
            let mut buf = [0u8; 1024];
            loop {
                if let Some(frame) = self.parser.next_frame().unwrap() {
                    return frame;
                }
                let n = self.stream.read(&mut buf).await.unwrap();
                assert!(n > 0, "server closed the connection");
                self.parser.feed(&buf[..n]).unwrap();
            }
        }

        /// Feed the next server frame into the replica
        async fn step(&mut self) -> ServerFrame {
            let frame = self.recv().await;
            let event = match frame.clone() {
                ServerFrame::Ack { version } => Outbound::Ack { version },
                ServerFrame::Broadcast { version, operation } => Outbound::Broadcast { version, operation },
                ServerFrame::Resync { content, version } => Outbound::Resync { content, version },
                other => panic!("unexpected frame {:?}", other),
            };
            if let Some(next) = self.replica.handle(&event).unwrap() {
                self.send(ClientFrame::submit(next)).await;
            }
            frame
        }
    }

    async fn start() -> SocketAddr {
        let curator = Arc::new(Curator::new(
            Arc::new(MemoryStore::new()),
            Arc::new(Anarchy { allow_create: true }),
            CuratorConfig::default(),
        ));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = TcpServer::new(curator, addr);
        tokio::spawn(async move { server.serve(listener).await });
        addr
    }

    #[tokio::test]
    async fn test_tcp_concurrent_edits_converge() {
        let addr = start().await;

        let mut x = Peer::join(addr, "x", "shared.txt").await;
        let op = x.replica.insert(0, "abc").unwrap().unwrap();
        x.send(ClientFrame::submit(op)).await;
        assert_eq!(x.step().await, ServerFrame::Ack { version: 1 });

        let mut y = Peer::join(addr, "y", "shared.txt").await;
        assert_eq!(y.replica.content(), "abc");
        assert_eq!(y.replica.version(), 1);

        let xop = x.replica.insert(1, "X").unwrap().unwrap();
        let yop = y.replica.insert(0, "Y").unwrap().unwrap();
        x.send(ClientFrame::submit(xop)).await;
        y.send(ClientFrame::submit(yop)).await;

        // each peer sees its own ack and the other's broadcast, in either order
        for _ in 0..2 {
            x.step().await;
            y.step().await;
        }

        assert_eq!(x.replica.content(), "YaXbc");
        assert_eq!(y.replica.content(), "YaXbc");
        assert_eq!(x.replica.version(), 3);
        assert_eq!(y.replica.version(), 3);
    }

    #[tokio::test]
    async fn test_tcp_ping_pong() {
        let addr = start().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"{\"type\":\"ping\"}\n").await.unwrap();

        let mut buf = [0u8; 64];
        let n = stream.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"{\"type\":\"pong\"}\n");
    }
}
