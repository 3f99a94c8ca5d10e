//! Client-side transport halves for TCP and WebSocket.

use std::io::ErrorKind;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use dynamo_protocol::{packet_codec, Packet, PacketBuffer, HEAD_LENGTH};

use crate::error::ClientError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub(crate) enum Reader {
    Tcp(OwnedReadHalf),
    Ws {
        stream: SplitStream<WsStream>,
        buffer: PacketBuffer,
    },
}

impl Reader {
    /// The next complete packet off the wire.
    pub(crate) async fn next_packet(&mut self) -> Result<Packet, ClientError> {
        match self {
            Reader::Tcp(reader) => {
                let mut header = [0u8; HEAD_LENGTH];
                if let Err(err) = reader.read_exact(&mut header).await {
                    return Err(match err.kind() {
                        ErrorKind::UnexpectedEof => ClientError::ConnectionClosed,
                        _ => err.into(),
                    });
                }
                let (kind, length) = packet_codec::parse_header(&header)?;
                let mut data = vec![0u8; length];
                if let Err(err) = reader.read_exact(&mut data).await {
                    return Err(match err.kind() {
                        ErrorKind::UnexpectedEof => ClientError::ConnectionClosed,
                        _ => err.into(),
                    });
                }
                Ok(Packet::new(kind, data))
            }
            Reader::Ws { stream, buffer } => loop {
                if let Some(frame) = buffer.take_frame() {
                    let (mut packets, _) = packet_codec::decode(&frame)?;
                    if let Some(packet) = packets.pop() {
                        return Ok(packet);
                    }
                }
                match stream.next().await {
                    Some(Ok(WsMessage::Binary(data))) => buffer.extend_from_slice(&data),
                    Some(Ok(WsMessage::Close(_))) | None => {
                        return Err(ClientError::ConnectionClosed)
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => return Err(err.into()),
                }
            },
        }
    }
}

pub(crate) enum Writer {
    Tcp(OwnedWriteHalf),
    Ws(SplitSink<WsStream, WsMessage>),
}

impl Writer {
    pub(crate) async fn write_frame(&mut self, frame: &[u8]) -> Result<(), ClientError> {
        match self {
            Writer::Tcp(writer) => {
                writer.write_all(frame).await?;
                Ok(())
            }
            Writer::Ws(sink) => {
                sink.send(WsMessage::Binary(frame.to_vec())).await?;
                Ok(())
            }
        }
    }

    pub(crate) async fn close(&mut self) {
        match self {
            Writer::Tcp(writer) => {
                let _ = writer.shutdown().await;
            }
            Writer::Ws(sink) => {
                let _ = sink.send(WsMessage::Close(None)).await;
                let _ = sink.close().await;
            }
        }
    }
}
