//! IngestServer - Controller TCP Listener
//!
//! ## Responsibilities
//!
//! - Accept controller connections, one task per connection
//! - Split each byte stream into event documents
//! - Normalize and dispatch documents in arrival order
//! - Write one acknowledgment line per document
//!
//! A connection's extractor buffer is owned by its task. Bytes left without
//! a closing marker when the peer disconnects are discarded.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::dispatch_orchestrator::{Acknowledgment, DispatchOrchestrator};
use crate::error::Result;
use crate::event_normalizer::normalize;
use crate::frame_extractor::FrameExtractor;

const READ_BUFFER_SIZE: usize = 4096;

/// TCP ingest server
pub struct IngestServer {
    orchestrator: Arc<DispatchOrchestrator>,
    next_connection_id: AtomicU64,
}

impl IngestServer {
    pub fn new(orchestrator: Arc<DispatchOrchestrator>) -> Self {
        Self {
            orchestrator,
            next_connection_id: AtomicU64::new(1),
        }
    }

    /// Bind `addr` and serve until `shutdown` resolves
    pub async fn serve<F>(&self, addr: SocketAddr, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(addr).await?;
        self.run_until(listener, shutdown).await
    }

    /// Serve an already bound listener until `shutdown` resolves
    ///
    /// Stops accepting on shutdown; connections already accepted keep running.
    pub async fn run_until<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(addr = %addr, "TCP ingest server listening");
        }

        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutting down TCP ingest server");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        }
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => self.handle_connection(socket, peer_addr),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        tracing::info!(connection_id = connection_id, peer = %peer_addr, "Client connected");

        let orchestrator = Arc::clone(&self.orchestrator);
        tokio::spawn(async move {
            if let Err(e) = run_connection(socket, orchestrator).await {
                tracing::warn!(connection_id = connection_id, error = %e, "Socket error");
            }
            tracing::info!(connection_id = connection_id, "Client disconnected");
        });
    }
}

/// Read until EOF, acknowledging each extracted document in order
async fn run_connection(
    mut socket: TcpStream,
    orchestrator: Arc<DispatchOrchestrator>,
) -> std::io::Result<()> {
    let mut extractor = FrameExtractor::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            break;
        }

        for frame in extractor.feed(&buf[..n]) {
            let ack = match normalize(&frame) {
                Ok(event) => orchestrator.process(event).await,
                Err(e) => {
                    tracing::warn!(error = %e, "Invalid XML received");
                    Acknowledgment::invalid_xml()
                }
            };
            socket.write_all(ack.to_line().as_bytes()).await?;
        }
    }

    if extractor.pending() > 0 {
        tracing::debug!(
            discarded_bytes = extractor.pending(),
            "Discarding unterminated input"
        );
    }
    Ok(())
}
