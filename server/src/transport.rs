//! TCP transport for the server
//!
//! One accept task hands out connection ids; every connection then gets a
//! reader task that reassembles frames and a writer task that drains its
//! outbound queue. The tasks only talk to the server loop through mpsc
//! queues; [`TcpTransport::update`] is the non-blocking pump that flushes
//! outbound packets and collects everything received since the last call.

use log::{debug, error, info, warn};
use shared::framing::{read_frame, write_frame, FrameError};
use shared::{DisconnectReason, TransportError};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Identity of one accepted socket.
///
/// `id` is what the game sees and is reused after a disconnect; `serial`
/// is unique for the lifetime of the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetworkConnection {
    pub id: u8,
    pub serial: u64,
}

#[derive(Debug)]
pub enum TransportEvent {
    Connected(NetworkConnection),
    Received(NetworkConnection, Vec<u8>),
    Disconnected(NetworkConnection, DisconnectReason),
}

/// Messages from network tasks to the transport
#[derive(Debug)]
enum NetworkMessage {
    Accepted {
        connection: NetworkConnection,
        outbound: mpsc::UnboundedSender<Vec<u8>>,
        stop_reader: oneshot::Sender<()>,
    },
    Frame(NetworkConnection, Vec<u8>),
    Closed(NetworkConnection, DisconnectReason),
}

/// Connection ids in use; 0 is never handed out
#[derive(Debug)]
pub struct IdPool {
    used: [bool; 256],
}

impl Default for IdPool {
    fn default() -> Self {
        Self::new()
    }
}

impl IdPool {
    pub fn new() -> Self {
        let mut used = [false; 256];
        used[0] = true;
        Self { used }
    }

    /// Lowest free id in `1..=255`, or 0 when the pool is exhausted
    pub fn allocate(&mut self) -> u8 {
        match (1..=255u8).find(|id| !self.used[*id as usize]) {
            Some(id) => {
                self.used[id as usize] = true;
                id
            }
            None => 0,
        }
    }

    pub fn release(&mut self, id: u8) {
        if id != 0 {
            self.used[id as usize] = false;
        }
    }

    pub fn in_use(&self) -> usize {
        self.used.iter().filter(|used| **used).count() - 1
    }
}

struct ConnectionHandle {
    connection: NetworkConnection,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    stop_reader: oneshot::Sender<()>,
}

pub struct TcpTransport {
    local_addr: SocketAddr,
    pool: Arc<Mutex<IdPool>>,
    network_rx: mpsc::UnboundedReceiver<NetworkMessage>,
    accept_task: JoinHandle<()>,
    connections: HashMap<u8, ConnectionHandle>,
    outbound: Vec<(NetworkConnection, Vec<u8>)>,
    local_events: Vec<TransportEvent>,
}

impl TcpTransport {
    pub async fn listen(addr: &str) -> Result<Self, TransportError> {
        let bind_error = |source| TransportError::Bind {
            addr: addr.to_string(),
            source,
        };
        let listener = TcpListener::bind(addr).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;
        info!("Listening on {}", local_addr);

        let pool = Arc::new(Mutex::new(IdPool::new()));
        let (network_tx, network_rx) = mpsc::unbounded_channel();
        let accept_task = tokio::spawn(accept_loop(listener, Arc::clone(&pool), network_tx));

        Ok(Self {
            local_addr,
            pool,
            network_rx,
            accept_task,
            connections: HashMap::new(),
            outbound: Vec::new(),
            local_events: Vec::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn connection(&self, id: u8) -> Option<NetworkConnection> {
        self.connections.get(&id).map(|handle| handle.connection)
    }

    /// Queues a packet for the connection currently holding `id`
    pub fn send(&mut self, id: u8, packet: Vec<u8>) {
        match self.connection(id) {
            Some(connection) => self.outbound.push((connection, packet)),
            None => warn!("Dropping packet for unknown connection {}", id),
        }
    }

    /// Writes every queued packet to its connection's writer task
    pub fn flush(&mut self) {
        for (connection, packet) in std::mem::take(&mut self.outbound) {
            let Some(handle) = self.live_handle(connection) else {
                warn!(
                    "Dropping {} byte packet for closed connection {}",
                    packet.len(),
                    connection.id
                );
                continue;
            };
            if handle.outbound.send(packet).is_err() {
                warn!("Writer for connection {} is gone", connection.id);
            }
        }
    }

    /// Flushes outbound packets and returns every event since the last call
    pub fn update(&mut self) -> Vec<TransportEvent> {
        self.flush();

        let mut events = std::mem::take(&mut self.local_events);
        while let Ok(message) = self.network_rx.try_recv() {
            match message {
                NetworkMessage::Accepted {
                    connection,
                    outbound,
                    stop_reader,
                } => {
                    info!("Connection {} opened", connection.id);
                    self.connections.insert(
                        connection.id,
                        ConnectionHandle {
                            connection,
                            outbound,
                            stop_reader,
                        },
                    );
                    events.push(TransportEvent::Connected(connection));
                }
                NetworkMessage::Frame(connection, bytes) => {
                    if self.live_handle(connection).is_some() {
                        events.push(TransportEvent::Received(connection, bytes));
                    } else {
                        warn!(
                            "Dropping {} bytes from closed connection {}",
                            bytes.len(),
                            connection.id
                        );
                    }
                }
                NetworkMessage::Closed(connection, reason) => {
                    if self.teardown(connection) {
                        info!("Connection {} closed: {}", connection.id, reason);
                        events.push(TransportEvent::Disconnected(connection, reason));
                    }
                }
            }
        }
        events
    }

    /// Closes a connection; its `Disconnected` event is returned by the next `update`
    pub fn disconnect(&mut self, id: u8, reason: DisconnectReason) {
        let Some(connection) = self.connection(id) else {
            return;
        };
        self.flush();
        if self.teardown(connection) {
            info!("Disconnecting {}: {}", id, reason);
            self.local_events
                .push(TransportEvent::Disconnected(connection, reason));
        }
    }

    fn live_handle(&self, connection: NetworkConnection) -> Option<&ConnectionHandle> {
        self.connections
            .get(&connection.id)
            .filter(|handle| handle.connection == connection)
    }

    /// Drops the connection if it is still live; returns whether it was
    fn teardown(&mut self, connection: NetworkConnection) -> bool {
        if self.live_handle(connection).is_none() {
            return false;
        }
        if let Some(handle) = self.connections.remove(&connection.id) {
            // the writer drains what is queued, then shuts the socket down
            let _ = handle.stop_reader.send(());
            drop(handle.outbound);
        }
        match self.pool.lock() {
            Ok(mut pool) => pool.release(connection.id),
            Err(e) => error!("Id pool poisoned: {}", e),
        }
        true
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.accept_task.abort();
        for (_, handle) in self.connections.drain() {
            let _ = handle.stop_reader.send(());
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    pool: Arc<Mutex<IdPool>>,
    network_tx: mpsc::UnboundedSender<NetworkMessage>,
) {
    let mut next_serial: u64 = 0;
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("Accept failed: {}", e);
                continue;
            }
        };

        let id = match pool.lock() {
            Ok(mut pool) => pool.allocate(),
            Err(e) => {
                error!("Id pool poisoned: {}", e);
                0
            }
        };
        if id == 0 {
            warn!("Rejecting {}: no free connection id", addr);
            drop(stream);
            continue;
        }

        next_serial += 1;
        let connection = NetworkConnection {
            id,
            serial: next_serial,
        };
        debug!("Accepted {} as connection {}", addr, id);
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY for {}: {}", addr, e);
        }

        if !spawn_connection(stream, connection, &network_tx) {
            break;
        }
    }
}

/// Announces the connection to the transport, then starts its tasks.
///
/// The reader only starts once `Accepted` is queued so no frame can
/// overtake it. Returns false when the transport is gone.
fn spawn_connection(
    stream: TcpStream,
    connection: NetworkConnection,
    network_tx: &mpsc::UnboundedSender<NetworkMessage>,
) -> bool {
    let (read_half, write_half) = stream.into_split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = oneshot::channel();

    let accepted = NetworkMessage::Accepted {
        connection,
        outbound: outbound_tx,
        stop_reader: stop_tx,
    };
    if network_tx.send(accepted).is_err() {
        return false;
    }

    tokio::spawn(write_loop(write_half, outbound_rx, connection, network_tx.clone()));
    tokio::spawn(read_loop(read_half, stop_rx, connection, network_tx.clone()));
    true
}

async fn read_loop(
    mut read_half: OwnedReadHalf,
    mut stop: oneshot::Receiver<()>,
    connection: NetworkConnection,
    network_tx: mpsc::UnboundedSender<NetworkMessage>,
) {
    loop {
        let result = tokio::select! {
            _ = &mut stop => return,
            result = read_frame(&mut read_half) => result,
        };
        match result {
            Ok(bytes) => {
                if network_tx
                    .send(NetworkMessage::Frame(connection, bytes))
                    .is_err()
                {
                    return;
                }
            }
            Err(e) => {
                let reason = match e {
                    FrameError::TooLarge(_) | FrameError::TooSmall(_) => {
                        DisconnectReason::ProtocolViolation
                    }
                    FrameError::Closed | FrameError::Io(_) => DisconnectReason::Unknown,
                };
                debug!("Connection {} read ended: {}", connection.id, e);
                let _ = network_tx.send(NetworkMessage::Closed(connection, reason));
                return;
            }
        }
    }
}

async fn write_loop(
    mut write_half: OwnedWriteHalf,
    mut outbound_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    connection: NetworkConnection,
    network_tx: mpsc::UnboundedSender<NetworkMessage>,
) {
    while let Some(packet) = outbound_rx.recv().await {
        if let Err(e) = write_frame(&mut write_half, &packet).await {
            debug!("Connection {} write failed: {}", connection.id, e);
            let _ = network_tx.send(NetworkMessage::Closed(connection, DisconnectReason::Unknown));
            return;
        }
    }
    let _ = write_half.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::framing::encode_frame;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::time::{sleep, timeout, Instant};

    async fn pump_until<F>(transport: &mut TcpTransport, mut done: F) -> Vec<TransportEvent>
    where
        F: FnMut(&[TransportEvent]) -> bool,
    {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut events = Vec::new();
        while Instant::now() < deadline {
            events.extend(transport.update());
            if done(&events) {
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }
        events
    }

    fn connected_ids(events: &[TransportEvent]) -> Vec<u8> {
        events
            .iter()
            .filter_map(|e| match e {
                TransportEvent::Connected(c) => Some(c.id),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_id_pool_lowest_free() {
        let mut pool = IdPool::new();
        assert_eq!(pool.allocate(), 1);
        assert_eq!(pool.allocate(), 2);
        assert_eq!(pool.allocate(), 3);
        pool.release(2);
        assert_eq!(pool.allocate(), 2);
        assert_eq!(pool.in_use(), 3);
    }

    #[test]
    fn test_id_pool_exhaustion() {
        let mut pool = IdPool::new();
        for expected in 1..=255u8 {
            assert_eq!(pool.allocate(), expected);
        }
        assert_eq!(pool.allocate(), 0);
        pool.release(0);
        assert_eq!(pool.allocate(), 0);
        pool.release(17);
        assert_eq!(pool.allocate(), 17);
    }

    #[tokio::test]
    async fn test_receive_and_send_frames() {
        let mut transport = TcpTransport::listen("127.0.0.1:0").await.unwrap();
        let mut client = TcpStream::connect(transport.local_addr()).await.unwrap();

        let events = pump_until(&mut transport, |e| !e.is_empty()).await;
        assert_eq!(connected_ids(&events), vec![1]);

        client
            .write_all(&encode_frame(&[9, 0, 0, 0, 0, 1]).unwrap())
            .await
            .unwrap();
        let events = pump_until(&mut transport, |e| !e.is_empty()).await;
        match &events[..] {
            [TransportEvent::Received(c, bytes)] => {
                assert_eq!(c.id, 1);
                assert_eq!(bytes, &vec![9, 0, 0, 0, 0, 1]);
            }
            other => panic!("unexpected events {:?}", other),
        }

        transport.send(1, vec![1, 2, 3]);
        transport.flush();
        let mut buf = [0u8; 5];
        timeout(Duration::from_secs(5), client.read_exact(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(buf, [3, 0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_remote_close_reported_once() {
        let mut transport = TcpTransport::listen("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(transport.local_addr()).await.unwrap();
        pump_until(&mut transport, |e| !e.is_empty()).await;

        drop(client);
        let events = pump_until(&mut transport, |e| !e.is_empty()).await;
        assert!(matches!(
            events[..],
            [TransportEvent::Disconnected(c, DisconnectReason::Unknown)] if c.id == 1
        ));

        transport.send(1, vec![1, 2, 3]);
        transport.disconnect(1, DisconnectReason::Graceful);
        sleep(Duration::from_millis(20)).await;
        assert!(transport.update().is_empty());
    }

    #[tokio::test]
    async fn test_ids_reused_after_disconnect() {
        let mut transport = TcpTransport::listen("127.0.0.1:0").await.unwrap();
        let addr = transport.local_addr();
        let _a = TcpStream::connect(addr).await.unwrap();
        let _b = TcpStream::connect(addr).await.unwrap();
        let events = pump_until(&mut transport, |e| connected_ids(e).len() == 2).await;
        assert_eq!(connected_ids(&events), vec![1, 2]);
        let first = transport.connection(1).unwrap();

        transport.disconnect(1, DisconnectReason::Graceful);
        let events = transport.update();
        assert!(matches!(
            events[..],
            [TransportEvent::Disconnected(c, DisconnectReason::Graceful)] if c.id == 1
        ));

        let _c = TcpStream::connect(addr).await.unwrap();
        let events = pump_until(&mut transport, |e| !connected_ids(e).is_empty()).await;
        assert_eq!(connected_ids(&events), vec![1]);
        let reused = transport.connection(1).unwrap();
        assert_ne!(first.serial, reused.serial);
        assert_eq!(transport.connection_count(), 2);
    }

    #[tokio::test]
    async fn test_connection_rejected_when_ids_exhausted() {
        let mut transport = TcpTransport::listen("127.0.0.1:0").await.unwrap();
        {
            let mut pool = transport.pool.lock().unwrap();
            while pool.allocate() != 0 {}
        }

        let mut rejected = TcpStream::connect(transport.local_addr()).await.unwrap();
        let mut buf = [0u8; 1];
        let read = timeout(Duration::from_secs(5), rejected.read(&mut buf))
            .await
            .unwrap();
        assert!(matches!(read, Ok(0) | Err(_)));
        sleep(Duration::from_millis(20)).await;
        assert!(transport.update().is_empty());
        assert_eq!(transport.connection_count(), 0);

        transport.pool.lock().unwrap().release(42);
        let _accepted = TcpStream::connect(transport.local_addr()).await.unwrap();
        let events = pump_until(&mut transport, |e| !e.is_empty()).await;
        assert_eq!(connected_ids(&events), vec![42]);
    }

    #[tokio::test]
    async fn test_oversized_frame_is_protocol_violation() {
        let mut transport = TcpTransport::listen("127.0.0.1:0").await.unwrap();
        let mut client = TcpStream::connect(transport.local_addr()).await.unwrap();
        pump_until(&mut transport, |e| !e.is_empty()).await;

        client.write_all(&[0xFF, 0xFF]).await.unwrap();
        let events = pump_until(&mut transport, |e| !e.is_empty()).await;
        assert!(matches!(
            events[..],
            [TransportEvent::Disconnected(_, DisconnectReason::ProtocolViolation)]
        ));
    }
}
