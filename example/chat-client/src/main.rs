//! Command-line chat client.
//!
//! Run with: cargo run --bin chat-client -- [addr] [nickname]

use dynamo_client::Client;
use dynamo_protocol::{ErrorPayload, MessageType};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let addr = args.next().unwrap_or_else(|| "127.0.0.1:2250".to_string());
    let nickname = args.next().unwrap_or_else(|| "anon".to_string());

    let mut client = Client::new();
    client.connect(&addr).await?;

    let join = serde_json::json!({ "nickname": nickname });
    client
        .request("room.join", serde_json::to_vec(&join)?)
        .await?;

    println!("connected to {addr} as {nickname}; type to chat, ctrl-d to quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        // collect the outgoing line first; the select arms must not touch
        // the client while `recv` is pending
        let mut outgoing = None;
        tokio::select! {
            message = client.recv() => {
                let Some(message) = message else {
                    println!("disconnected");
                    break;
                };
                match message.kind {
                    MessageType::Push => {
                        println!("{}", String::from_utf8_lossy(&message.data));
                    }
                    MessageType::Response if message.err => {
                        let payload = ErrorPayload::from_bytes(&message.data)
                            .unwrap_or_else(|_| ErrorPayload::new("DYN-500", "unknown error"));
                        eprintln!("error {}: {}", payload.code, payload.msg);
                    }
                    _ => {}
                }
            }
            line = lines.next_line() => {
                match line? {
                    Some(text) if !text.is_empty() => outgoing = Some(text),
                    Some(_) => {}
                    None => break,
                }
            }
        }
        if let Some(text) = outgoing {
            client.notify("room.message", text.into_bytes()).await?;
        }
    }

    client.disconnect();
    Ok(())
}
