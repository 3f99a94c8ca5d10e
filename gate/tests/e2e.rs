//! End-to-end gate scenarios over real sockets: handshake negotiation,
//! routed dispatch, server push, kick, timeouts and heartbeat enforcement.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dynamo_actor::{ActorSystem, Context, MessageEnvelope, Props};
use dynamo_client::Client;
use dynamo_gate::{
    AcceptorConfig, Gate, GateConfig, RoutedMessage, Session, SessionBound, SessionClosed,
};
use dynamo_protocol::{
    packet_codec, ClientHandshake, ErrorPayload, MessageType, PacketType, ServerHandshake,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[derive(Default)]
struct RoomLog {
    bound: Vec<Session>,
    closed: Vec<u64>,
    notifies: Vec<Vec<u8>>,
}

/// A "room" service: answers `join` requests, pushes on `poke` notifies,
/// kicks on `bad` notifies, and records session events.
fn room_props(log: Arc<Mutex<RoomLog>>) -> Props {
    Props::from_fn(move |ctx: &mut Context, env: &MessageEnvelope| {
        if let Some(routed) = env.message_as::<RoutedMessage>() {
            match (routed.kind, routed.route.method.as_str()) {
                (MessageType::Request, "join") => {
                    ctx.respond(MessageEnvelope::new(b"joined".to_vec()));
                }
                (MessageType::Request, "stall") => {
                    // never respond; the gate must synthesize the timeout
                }
                (MessageType::Notify, "poke") => {
                    log.lock().unwrap().notifies.push(routed.data.clone());
                    routed
                        .session
                        .push("room.event", b"poked".to_vec())
                        .unwrap();
                }
                (MessageType::Notify, "bad") => {
                    routed.session.kick();
                }
                _ => {}
            }
        } else if let Some(bound) = env.message_as::<SessionBound>() {
            log.lock().unwrap().bound.push(bound.session.clone());
        } else if let Some(closed) = env.message_as::<SessionClosed>() {
            log.lock().unwrap().closed.push(closed.session_id);
        }
    })
}

async fn start_gate(config: GateConfig) -> (Gate, std::net::SocketAddr, Arc<Mutex<RoomLog>>) {
    let system = ActorSystem::new();
    let gate = Gate::new(system, config).unwrap();
    gate.set_dictionary(HashMap::from([("room.join".to_string(), 1u16)]))
        .unwrap();
    let log = Arc::new(Mutex::new(RoomLog::default()));
    gate.register_service("room", room_props(Arc::clone(&log)))
        .unwrap();
    let addrs = gate.start().await.unwrap();
    (gate, addrs[0], log)
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn handshake_happy_path_and_routed_request() {
    let (_gate, addr, log) = start_gate(
        GateConfig::default().with_acceptor(AcceptorConfig::tcp("127.0.0.1:0")),
    )
    .await;

    let mut client = Client::new();
    client.connect(&addr.to_string()).await.unwrap();
    assert_eq!(client.heartbeat_interval(), Some(Duration::from_secs(30)));

    // session is bound once the ack lands
    eventually(|| !log.lock().unwrap().bound.is_empty()).await;

    // route travels compressed (dict code 1) and lands on the room service
    let id = client.request("room.join", b"{}".to_vec()).await.unwrap();
    let reply = client.recv().await.unwrap();
    assert_eq!(reply.kind, MessageType::Response);
    assert_eq!(reply.id, id);
    assert!(!reply.err);
    assert_eq!(reply.data, b"joined");
}

#[tokio::test]
async fn websocket_transport_with_push() {
    let (_gate, addr, log) = start_gate(
        GateConfig::default()
            .with_acceptor(AcceptorConfig::ws("127.0.0.1:0").with_path("/ws")),
    )
    .await;

    let mut client = Client::new();
    client
        .connect_ws(&format!("ws://{addr}/ws"))
        .await
        .unwrap();
    eventually(|| !log.lock().unwrap().bound.is_empty()).await;

    client.notify("room.poke", b"hello".to_vec()).await.unwrap();

    let push = client.recv().await.unwrap();
    assert_eq!(push.kind, MessageType::Push);
    assert_eq!(push.route.as_ref().map(|r| r.to_string()), Some("room.event".to_string()));
    assert_eq!(push.data, b"poked");
    assert_eq!(log.lock().unwrap().notifies, vec![b"hello".to_vec()]);
}

#[tokio::test]
async fn unknown_route_gets_an_error_response() {
    let (_gate, addr, _log) = start_gate(
        GateConfig::default().with_acceptor(AcceptorConfig::tcp("127.0.0.1:0")),
    )
    .await;

    let mut client = Client::new();
    client.connect(&addr.to_string()).await.unwrap();

    let id = client.request("lobby.list", b"".to_vec()).await.unwrap();
    let reply = client.recv().await.unwrap();
    assert_eq!(reply.id, id);
    assert!(reply.err);
    let payload = ErrorPayload::from_bytes(&reply.data).unwrap();
    assert_eq!(payload.code, "DYN-404");
}

#[tokio::test]
async fn stalled_handler_times_out_server_side() {
    let (_gate, addr, _log) = start_gate(
        GateConfig::default()
            .with_acceptor(AcceptorConfig::tcp("127.0.0.1:0"))
            .with_request_timeout(Duration::from_millis(200)),
    )
    .await;

    let mut client = Client::new();
    client.connect(&addr.to_string()).await.unwrap();

    let id = client.request("room.stall", b"".to_vec()).await.unwrap();
    let reply = tokio::time::timeout(Duration::from_secs(3), client.recv())
        .await
        .expect("server should answer with a timeout error")
        .unwrap();
    assert_eq!(reply.id, id);
    assert!(reply.err);
    let payload = ErrorPayload::from_bytes(&reply.data).unwrap();
    assert_eq!(payload.code, "DYN-504");
}

#[tokio::test]
async fn kicked_session_is_closed_and_published() {
    let (_gate, addr, log) = start_gate(
        GateConfig::default().with_acceptor(AcceptorConfig::tcp("127.0.0.1:0")),
    )
    .await;

    let mut client = Client::new();
    client.connect(&addr.to_string()).await.unwrap();
    eventually(|| !log.lock().unwrap().bound.is_empty()).await;
    let session_id = log.lock().unwrap().bound[0].id();

    client.notify("room.bad", b"".to_vec()).await.unwrap();

    // the kick packet disconnects the client and the close event reaches
    // the service
    eventually(|| !client.is_connected()).await;
    eventually(|| log.lock().unwrap().closed.contains(&session_id)).await;
}

#[tokio::test]
async fn protocol_violation_is_kicked_with_a_reason_code() {
    let (_gate, addr, _log) = start_gate(
        GateConfig::default().with_acceptor(AcceptorConfig::tcp("127.0.0.1:0")),
    )
    .await;

    // a data packet before any handshake is a violation
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(&packet_codec::encode(PacketType::Data, b"junk").unwrap())
        .await
        .unwrap();

    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await.unwrap();
    let (kind, length) = packet_codec::parse_header(&header).unwrap();
    assert_eq!(kind, PacketType::Kick);
    let mut body = vec![0u8; length];
    stream.read_exact(&mut body).await.unwrap();
    let reason = ErrorPayload::from_bytes(&body).unwrap();
    assert_eq!(reason.code, "DYN-400");
}

#[tokio::test]
async fn silent_client_is_closed_after_missed_heartbeats() {
    let (_gate, addr, log) = start_gate(
        GateConfig::default()
            .with_acceptor(AcceptorConfig::tcp("127.0.0.1:0"))
            .with_heartbeat_interval(Duration::from_secs(1))
            .with_handshake_timeout(Duration::from_secs(1)),
    )
    .await;

    // raw stream so no heartbeats are ever sent
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let hello = ClientHandshake::default().encode().unwrap();
    stream
        .write_all(&packet_codec::encode(PacketType::Handshake, &hello).unwrap())
        .await
        .unwrap();

    // read the handshake reply, then ack it
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await.unwrap();
    let (kind, length) = packet_codec::parse_header(&header).unwrap();
    assert_eq!(kind, PacketType::Handshake);
    let mut body = vec![0u8; length];
    stream.read_exact(&mut body).await.unwrap();
    let handshake = ServerHandshake::decode(&body).unwrap();
    assert_eq!(handshake.sys.heartbeat, 1);
    stream
        .write_all(&packet_codec::encode(PacketType::HandshakeAck, &[]).unwrap())
        .await
        .unwrap();

    eventually(|| !log.lock().unwrap().bound.is_empty()).await;

    // stay silent; the server must drop us once 2x the interval passes
    let closed = tokio::time::timeout(Duration::from_secs(6), async {
        let mut buf = [0u8; 64];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "server did not close the silent session");

    let session_id = log.lock().unwrap().bound[0].id();
    eventually(|| log.lock().unwrap().closed.contains(&session_id)).await;
}

#[tokio::test]
async fn text_ws_frame_is_a_protocol_violation() {
    use futures::SinkExt;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    let (_gate, addr, log) = start_gate(
        GateConfig::default().with_acceptor(AcceptorConfig::ws("127.0.0.1:0")),
    )
    .await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/"))
        .await
        .unwrap();
    ws.send(WsMessage::Text("not binary".into())).await.unwrap();

    // the violation closes the session before it was ever bound
    eventually(|| !log.lock().unwrap().closed.is_empty()).await;
    assert!(log.lock().unwrap().bound.is_empty());
}
