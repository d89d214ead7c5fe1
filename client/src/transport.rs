//! TCP connector for the client
//!
//! Mirrors the server transport for a single connection: a reader task
//! reassembles frames, a writer task drains the outbound queue, and
//! [`TcpClientTransport::update`] collects what arrived since the last tick.

use log::{debug, info, warn};
use shared::framing::{read_frame, write_frame, FrameError};
use shared::{DisconnectReason, TransportError};
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, PartialEq, Eq)]
pub enum ClientEvent {
    Received(Vec<u8>),
    Disconnected(DisconnectReason),
}

#[derive(Debug)]
enum NetworkMessage {
    Frame(Vec<u8>),
    Closed(DisconnectReason),
}

struct Link {
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    stop_reader: oneshot::Sender<()>,
}

pub struct TcpClientTransport {
    server_addr: SocketAddr,
    link: Option<Link>,
    network_rx: mpsc::UnboundedReceiver<NetworkMessage>,
    local_events: Vec<ClientEvent>,
}

impl TcpClientTransport {
    pub async fn connect(addr: &str) -> Result<Self, TransportError> {
        let connect_error = |source| TransportError::Connect {
            addr: addr.to_string(),
            source,
        };
        let stream = TcpStream::connect(addr).await.map_err(connect_error)?;
        let server_addr = stream.peer_addr().map_err(connect_error)?;
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }
        info!("Connected to {}", server_addr);

        let (mut read_half, mut write_half) = stream.into_split();
        let (network_tx, network_rx) = mpsc::unbounded_channel();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let reader_tx = network_tx.clone();
        tokio::spawn(async move {
            loop {
                let result = tokio::select! {
                    _ = &mut stop_rx => return,
                    result = read_frame(&mut read_half) => result,
                };
                match result {
                    Ok(bytes) => {
                        if reader_tx.send(NetworkMessage::Frame(bytes)).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        debug!("Read ended: {}", e);
                        let reason = match e {
                            FrameError::TooLarge(_) | FrameError::TooSmall(_) => {
                                DisconnectReason::ProtocolViolation
                            }
                            FrameError::Closed | FrameError::Io(_) => DisconnectReason::Unknown,
                        };
                        let _ = reader_tx.send(NetworkMessage::Closed(reason));
                        return;
                    }
                }
            }
        });

        tokio::spawn(async move {
            while let Some(packet) = outbound_rx.recv().await {
                if let Err(e) = write_frame(&mut write_half, &packet).await {
                    debug!("Write failed: {}", e);
                    let _ = network_tx.send(NetworkMessage::Closed(DisconnectReason::Unknown));
                    return;
                }
            }
            let _ = write_half.shutdown().await;
        });

        Ok(Self {
            server_addr,
            link: Some(Link {
                outbound: outbound_tx,
                stop_reader: stop_tx,
            }),
            network_rx,
            local_events: Vec::new(),
        })
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    pub fn send(&mut self, packet: Vec<u8>) -> Result<(), TransportError> {
        let Some(link) = &self.link else {
            warn!("Dropping {} byte packet, not connected", packet.len());
            return Err(TransportError::NotConnected);
        };
        if link.outbound.send(packet).is_err() {
            warn!("Writer is gone");
            return Err(TransportError::NotConnected);
        }
        Ok(())
    }

    /// Everything received since the last call, disconnect last
    pub fn update(&mut self) -> Vec<ClientEvent> {
        let mut events = std::mem::take(&mut self.local_events);
        while let Ok(message) = self.network_rx.try_recv() {
            match message {
                NetworkMessage::Frame(bytes) => {
                    if self.link.is_some() {
                        events.push(ClientEvent::Received(bytes));
                    } else {
                        warn!("Dropping {} bytes received after disconnect", bytes.len());
                    }
                }
                NetworkMessage::Closed(reason) => {
                    if self.teardown() {
                        info!("Connection to {} lost: {}", self.server_addr, reason);
                        events.push(ClientEvent::Disconnected(reason));
                    }
                }
            }
        }
        events
    }

    /// Closes the connection after flushing queued packets
    pub fn disconnect(&mut self, reason: DisconnectReason) {
        if self.teardown() {
            info!("Disconnected from {}: {}", self.server_addr, reason);
            self.local_events.push(ClientEvent::Disconnected(reason));
        }
    }

    fn teardown(&mut self) -> bool {
        match self.link.take() {
            Some(link) => {
                let _ = link.stop_reader.send(());
                true
            }
            None => false,
        }
    }
}

impl Drop for TcpClientTransport {
    fn drop(&mut self) {
        self.teardown();
    }
}
