//! Reference client for the dynamo session protocol.
//!
//! Connects over raw TCP or WebSocket, performs the handshake exchange
//! (installing the advertised route dictionary), then keeps the session
//! alive with heartbeats at the negotiated interval. Requests are tracked in
//! a pending map; a 1-second reaper expires anything older than the request
//! timeout by synthesizing an `err=true` response with code `DYN-504`, so a
//! caller always sees an answer for every request id.
//!
//! ```ignore
//! let mut client = Client::new();
//! client.connect("127.0.0.1:2250").await?;
//! let id = client.request("room.join", b"{}".to_vec()).await?;
//! while let Some(message) = client.recv().await {
//!     if message.id == id { /* ... */ }
//! }
//! ```

mod error;
mod transport;

pub use error::ClientError;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};

use dynamo_protocol::{
    decode_route, packet_codec, ClientHandshake, ClientHandshakeSys, ErrorPayload, Message,
    MessageCodec, MessageType, PacketType, ServerHandshake, CODE_TIMEOUT,
};
use futures::StreamExt;

use transport::{Reader, Writer};

/// Cap on in-flight requests, matching the server's expectations for a
/// well-behaved client.
const MAX_INFLIGHT: usize = 30;

struct PendingRequest {
    sent_at: Instant,
    _permit: OwnedSemaphorePermit,
}

pub struct Client {
    connected: Arc<AtomicBool>,
    codec: Arc<MessageCodec>,
    pending: Arc<Mutex<HashMap<u64, PendingRequest>>>,
    request_timeout: Duration,
    next_id: AtomicU64,
    handshake: ClientHandshake,
    heartbeat_interval: Option<Duration>,
    writer_tx: Option<mpsc::Sender<Vec<u8>>>,
    incoming_rx: Option<mpsc::Receiver<Message>>,
    close: Arc<Notify>,
    inflight: Arc<Semaphore>,
}

impl Client {
    pub fn new() -> Self {
        Self::with_request_timeout(Duration::from_secs(5))
    }

    pub fn with_request_timeout(request_timeout: Duration) -> Self {
        Self {
            connected: Arc::new(AtomicBool::new(false)),
            codec: Arc::new(MessageCodec::new()),
            pending: Arc::new(Mutex::new(HashMap::new())),
            request_timeout,
            next_id: AtomicU64::new(0),
            handshake: ClientHandshake {
                sys: ClientHandshakeSys {
                    platform: std::env::consts::OS.to_string(),
                    lib_version: env!("CARGO_PKG_VERSION").to_string(),
                    build_number: "1".to_string(),
                    version: "1.0".to_string(),
                },
                user: None,
            },
            heartbeat_interval: None,
            writer_tx: None,
            incoming_rx: None,
            close: Arc::new(Notify::new()),
            inflight: Arc::new(Semaphore::new(MAX_INFLIGHT)),
        }
    }

    /// Override the record sent inside the handshake packet.
    pub fn set_handshake_data(&mut self, handshake: ClientHandshake) {
        self.handshake = handshake;
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Heartbeat interval negotiated with the server, once connected.
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat_interval
    }

    /// Connect over raw TCP.
    pub async fn connect(&mut self, addr: &str) -> Result<(), ClientError> {
        let stream = TcpStream::connect(addr).await?;
        let (read_half, write_half) = stream.into_split();
        self.finish_connect(Reader::Tcp(read_half), Writer::Tcp(write_half))
            .await
    }

    /// Connect over WebSocket. Every client owns its connector; nothing is
    /// shared between dials.
    pub async fn connect_ws(&mut self, url: &str) -> Result<(), ClientError> {
        url::Url::parse(url).map_err(|err| ClientError::InvalidUrl(err.to_string()))?;
        let (ws, _) = tokio_tungstenite::connect_async(url).await?;
        let (sink, stream) = ws.split();
        self.finish_connect(
            Reader::Ws {
                stream,
                buffer: dynamo_protocol::PacketBuffer::new(),
            },
            Writer::Ws(sink),
        )
        .await
    }

    /// Handshake inline, then hand the halves to the background tasks.
    async fn finish_connect(&mut self, mut reader: Reader, mut writer: Writer) -> Result<(), ClientError> {
        let body = self.handshake.encode()?;
        writer
            .write_frame(&packet_codec::encode(PacketType::Handshake, &body)?)
            .await?;

        let packet = reader.next_packet().await?;
        if packet.kind != PacketType::Handshake {
            return Err(ClientError::HandshakeFailed(
                "first packet from the server is not a handshake".to_string(),
            ));
        }
        let server = ServerHandshake::decode(&packet.data)?;
        if server.code != 200 {
            return Err(ClientError::HandshakeFailed(format!(
                "server answered code {}",
                server.code
            )));
        }
        if let Some(dict) = server.sys.dict.clone() {
            self.codec.set_dictionary(dict);
        }
        writer
            .write_frame(&packet_codec::encode(PacketType::HandshakeAck, &[])?)
            .await?;

        tracing::debug!(
            heartbeat = server.sys.heartbeat,
            serializer = %server.sys.serializer,
            "handshake complete"
        );

        let heartbeat = Duration::from_secs(server.sys.heartbeat.max(1));
        self.heartbeat_interval = Some(heartbeat);
        self.connected.store(true, Ordering::SeqCst);
        self.close = Arc::new(Notify::new());

        let (writer_tx, writer_rx) = mpsc::channel::<Vec<u8>>(64);
        let (incoming_tx, incoming_rx) = mpsc::channel::<Message>(10);
        self.writer_tx = Some(writer_tx.clone());
        self.incoming_rx = Some(incoming_rx);

        tokio::spawn(write_loop(writer, writer_rx, Arc::clone(&self.connected)));
        tokio::spawn(read_loop(
            reader,
            Arc::clone(&self.codec),
            Arc::clone(&self.pending),
            incoming_tx.clone(),
            Arc::clone(&self.connected),
            Arc::clone(&self.close),
        ));
        tokio::spawn(heartbeat_loop(writer_tx, heartbeat, Arc::clone(&self.close)));
        tokio::spawn(reaper(
            Arc::clone(&self.pending),
            incoming_tx,
            self.request_timeout,
            Arc::clone(&self.close),
        ));
        Ok(())
    }

    /// Send a request; the response (or a synthesized timeout error) arrives
    /// on [`recv`](Self::recv) under the returned id.
    pub async fn request(&self, route: &str, data: Vec<u8>) -> Result<u64, ClientError> {
        let writer_tx = self.writer_tx.clone().ok_or(ClientError::NotConnected)?;
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let route = decode_route(route)?;

        // limits in-flight requests; the permit is held by the pending entry
        let permit = Arc::clone(&self.inflight)
            .acquire_owned()
            .await
            .map_err(|_| ClientError::ConnectionClosed)?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let message = Message::request(id, route, data);
        let frame = packet_codec::encode(PacketType::Data, &self.codec.encode(&message)?)?;

        self.pending.lock().insert(
            id,
            PendingRequest {
                sent_at: Instant::now(),
                _permit: permit,
            },
        );
        if writer_tx.send(frame).await.is_err() {
            self.pending.lock().remove(&id);
            return Err(ClientError::ConnectionClosed);
        }
        Ok(id)
    }

    /// Fire-and-forget notify.
    pub async fn notify(&self, route: &str, data: Vec<u8>) -> Result<(), ClientError> {
        let writer_tx = self.writer_tx.clone().ok_or(ClientError::NotConnected)?;
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let route = decode_route(route)?;
        let message = Message::notify(route, data);
        let frame = packet_codec::encode(PacketType::Data, &self.codec.encode(&message)?)?;
        writer_tx
            .send(frame)
            .await
            .map_err(|_| ClientError::ConnectionClosed)
    }

    /// Next server message: responses, pushes, or synthesized timeout
    /// errors. `None` once the connection is gone and drained.
    pub async fn recv(&mut self) -> Option<Message> {
        self.incoming_rx.as_mut()?.recv().await
    }

    pub fn disconnect(&mut self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            tracing::debug!("disconnecting");
        }
        self.close.notify_waiters();
        self.writer_tx = None;
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.disconnect();
    }
}

async fn write_loop(
    mut writer: Writer,
    mut frames: mpsc::Receiver<Vec<u8>>,
    connected: Arc<AtomicBool>,
) {
    while let Some(frame) = frames.recv().await {
        if let Err(err) = writer.write_frame(&frame).await {
            if connected.swap(false, Ordering::SeqCst) {
                tracing::debug!(error = %err, "write to server failed");
            }
            break;
        }
    }
    writer.close().await;
}

async fn read_loop(
    mut reader: Reader,
    codec: Arc<MessageCodec>,
    pending: Arc<Mutex<HashMap<u64, PendingRequest>>>,
    incoming_tx: mpsc::Sender<Message>,
    connected: Arc<AtomicBool>,
    close: Arc<Notify>,
) {
    loop {
        let packet = tokio::select! {
            packet = reader.next_packet() => packet,
            _ = close.notified() => return,
        };
        match packet {
            Ok(packet) => match packet.kind {
                PacketType::Data => match codec.decode(&packet.data) {
                    Ok(message) => {
                        if message.kind == MessageType::Response
                            && pending.lock().remove(&message.id).is_none()
                        {
                            // already reaped as a timeout; drop the late response
                            continue;
                        }
                        if incoming_tx.send(message).await.is_err() {
                            return;
                        }
                    }
                    Err(err) => tracing::warn!(error = %err, "undecodable data packet"),
                },
                PacketType::Kick => {
                    match ErrorPayload::from_bytes(&packet.data) {
                        Ok(reason) => tracing::warn!(
                            code = %reason.code,
                            msg = %reason.msg,
                            "kicked by the server, disconnecting"
                        ),
                        Err(_) => tracing::warn!("kicked by the server, disconnecting"),
                    }
                    connected.store(false, Ordering::SeqCst);
                    close.notify_waiters();
                    return;
                }
                PacketType::Heartbeat => {}
                other => tracing::debug!(kind = ?other, "unexpected packet from server"),
            },
            Err(err) => {
                if connected.swap(false, Ordering::SeqCst) {
                    tracing::debug!(error = %err, "server connection lost");
                }
                close.notify_waiters();
                return;
            }
        }
    }
}

async fn heartbeat_loop(writer_tx: mpsc::Sender<Vec<u8>>, interval: Duration, close: Arc<Notify>) {
    let Ok(frame) = packet_codec::encode(PacketType::Heartbeat, &[]) else {
        return;
    };
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = close.notified() => return,
        }
        if writer_tx.send(frame.clone()).await.is_err() {
            return;
        }
    }
}

/// Expires pending requests past the timeout, synthesizing an error
/// response so the caller is never left waiting.
async fn reaper(
    pending: Arc<Mutex<HashMap<u64, PendingRequest>>>,
    incoming_tx: mpsc::Sender<Message>,
    timeout: Duration,
    close: Arc<Notify>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = close.notified() => return,
        }
        let expired: Vec<u64> = {
            let mut pending = pending.lock();
            let ids: Vec<u64> = pending
                .iter()
                .filter(|(_, request)| request.sent_at.elapsed() > timeout)
                .map(|(id, _)| *id)
                .collect();
            for id in &ids {
                pending.remove(id);
            }
            ids
        };
        for id in expired {
            tracing::debug!(id, "request timed out");
            let payload = ErrorPayload::new(CODE_TIMEOUT, "request timed out");
            let message = Message::response_error(id, payload.to_bytes());
            if incoming_tx.send(message).await.is_err() {
                return;
            }
        }
    }
}
