//! WebSocket transport.
//!
//! Binary frames only; a frame carries one or more packets, and a packet may
//! straddle frames, so the reader buffers payloads and slices packets back
//! out. Text frames are a protocol violation and close the session.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;

use dynamo_protocol::PacketBuffer;

use super::{ConnReader, ConnWriter, Connection};
use crate::error::GateError;
use crate::gate::Gate;

pub struct WsFrameReader<S> {
    stream: SplitStream<WebSocketStream<S>>,
    buffer: PacketBuffer,
}

#[async_trait]
impl<S: AsyncRead + AsyncWrite + Unpin + Send> ConnReader for WsFrameReader<S> {
    async fn get_next_message(&mut self) -> Result<Vec<u8>, GateError> {
        loop {
            if let Some(frame) = self.buffer.take_frame() {
                return Ok(frame);
            }
            match self.stream.next().await {
                Some(Ok(WsMessage::Binary(data))) => {
                    self.buffer.extend_from_slice(&data);
                }
                Some(Ok(WsMessage::Text(_))) => {
                    return Err(GateError::ProtocolViolation(
                        "text frame on a binary protocol",
                    ));
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    return Err(GateError::ConnectionClosed);
                }
                Some(Ok(_)) => {
                    // ping/pong are handled by tungstenite
                    continue;
                }
                Some(Err(err)) => return Err(err.into()),
            }
        }
    }
}

pub struct WsFrameWriter<S> {
    sink: SplitSink<WebSocketStream<S>, WsMessage>,
}

#[async_trait]
impl<S: AsyncRead + AsyncWrite + Unpin + Send> ConnWriter for WsFrameWriter<S> {
    async fn write_frame(&mut self, frame: &[u8]) -> Result<(), GateError> {
        self.sink.send(WsMessage::Binary(frame.to_vec())).await?;
        Ok(())
    }

    async fn close(&mut self) {
        let _ = self.sink.send(WsMessage::Close(None)).await;
        let _ = self.sink.close().await;
    }
}

async fn upgrade<S>(stream: S, remote_addr: std::net::SocketAddr, path: Option<String>, gate: Gate)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let accepted = match path {
        Some(path) => {
            let check = move |request: &Request, response: Response| {
                if request.uri().path() == path {
                    Ok(response)
                } else {
                    let mut not_found = ErrorResponse::new(None);
                    *not_found.status_mut() = StatusCode::NOT_FOUND;
                    Err(not_found)
                }
            };
            tokio_tungstenite::accept_hdr_async(stream, check).await
        }
        None => tokio_tungstenite::accept_async(stream).await,
    };

    match accepted {
        Ok(ws) => {
            let (sink, stream) = ws.split();
            gate.bind_session(Connection {
                reader: Box::new(WsFrameReader {
                    stream,
                    buffer: PacketBuffer::new(),
                }),
                writer: Box::new(WsFrameWriter { sink }),
                remote_addr,
            });
        }
        Err(err) => {
            tracing::debug!(%remote_addr, error = %err, "websocket upgrade failed");
        }
    }
}

/// Accept loop for one WebSocket acceptor.
pub(crate) async fn serve(
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    path: Option<String>,
    gate: Gate,
) {
    loop {
        match listener.accept().await {
            Ok((stream, remote_addr)) => {
                let gate = gate.clone();
                let tls = tls.clone();
                let path = path.clone();
                tokio::spawn(async move {
                    match tls {
                        Some(acceptor) => match acceptor.accept(stream).await {
                            Ok(stream) => upgrade(stream, remote_addr, path, gate).await,
                            Err(err) => {
                                tracing::debug!(%remote_addr, error = %err, "tls accept failed");
                            }
                        },
                        None => upgrade(stream, remote_addr, path, gate).await,
                    }
                });
            }
            Err(err) => {
                tracing::warn!(error = %err, "websocket accept failed");
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    }
}
