//! Single-room chat server.
//!
//! Run with: cargo run --bin chat-server
//!
//! Clients join with a `room.join` request, send lines with `room.message`
//! notifies, and receive `onMessage` pushes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dynamo_actor::{Actor, ActorSystem, Context, MessageEnvelope, Props};
use dynamo_gate::{AcceptorConfig, Gate, GateConfig, RoutedMessage, Session, SessionClosed};
use dynamo_protocol::MessageType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
struct JoinRequest {
    nickname: String,
}

#[derive(Debug, Serialize)]
struct ChatLine<'a> {
    from: &'a str,
    text: &'a str,
}

#[derive(Default)]
struct Room {
    members: HashMap<u64, (String, Session)>,
}

impl Room {
    fn broadcast(&self, line: &ChatLine<'_>) {
        let Ok(body) = serde_json::to_vec(line) else {
            return;
        };
        for (nickname, session) in self.members.values() {
            if let Err(err) = session.push("room.onMessage", body.clone()) {
                tracing::warn!(%nickname, error = %err, "push failed");
            }
        }
    }
}

struct RoomActor {
    room: Arc<Mutex<Room>>,
}

impl Actor for RoomActor {
    fn receive(&mut self, ctx: &mut Context, env: &MessageEnvelope) {
        if let Some(routed) = env.message_as::<RoutedMessage>() {
            match (routed.kind, routed.route.method.as_str()) {
                (MessageType::Request, "join") => {
                    let join: JoinRequest = match serde_json::from_slice(&routed.data) {
                        Ok(join) => join,
                        Err(_) => {
                            routed.session.kick();
                            return;
                        }
                    };
                    tracing::info!(nickname = %join.nickname, session = routed.session.id(), "joined");
                    let mut room = self.room.lock().unwrap();
                    room.broadcast(&ChatLine {
                        from: "room",
                        text: &format!("{} joined", join.nickname),
                    });
                    room.members
                        .insert(routed.session.id(), (join.nickname, routed.session.clone()));
                    ctx.respond(MessageEnvelope::new(b"{\"ok\":true}".to_vec()));
                }
                (MessageType::Notify, "message") => {
                    let room = self.room.lock().unwrap();
                    if let Some((nickname, _)) = room.members.get(&routed.session.id()) {
                        let text = String::from_utf8_lossy(&routed.data);
                        room.broadcast(&ChatLine {
                            from: nickname,
                            text: &text,
                        });
                    }
                }
                _ => {}
            }
        } else if let Some(closed) = env.message_as::<SessionClosed>() {
            let mut room = self.room.lock().unwrap();
            if let Some((nickname, _)) = room.members.remove(&closed.session_id) {
                tracing::info!(%nickname, "left");
                room.broadcast(&ChatLine {
                    from: "room",
                    text: &format!("{nickname} left"),
                });
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let system = ActorSystem::new();
    let gate = Gate::new(
        Arc::clone(&system),
        GateConfig::default()
            .with_acceptor(AcceptorConfig::tcp("0.0.0.0:2250"))
            .with_acceptor(AcceptorConfig::ws("0.0.0.0:2251").with_path("/ws")),
    )?;

    gate.set_dictionary(HashMap::from([
        ("room.join".to_string(), 1u16),
        ("room.message".to_string(), 2u16),
        ("room.onMessage".to_string(), 3u16),
    ]))?;

    let room = Arc::new(Mutex::new(Room::default()));
    gate.register_service(
        "room",
        Props::from_producer(move || {
            Box::new(RoomActor {
                room: Arc::clone(&room),
            })
        }),
    )?;

    tracing::info!("chat server on tcp://0.0.0.0:2250 and ws://0.0.0.0:2251/ws");
    gate.run().await?;
    Ok(())
}
