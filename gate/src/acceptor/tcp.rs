//! Raw TCP transport: length-prefixed reads straight off the stream.

use std::io::ErrorKind;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use dynamo_protocol::{packet_codec, HEAD_LENGTH};

use super::{ConnReader, ConnWriter, Connection};
use crate::error::GateError;
use crate::gate::Gate;

pub struct TcpFrameReader<R> {
    inner: R,
}

impl<R> TcpFrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> ConnReader for TcpFrameReader<R> {
    /// Read exactly one packet: the 4-byte header, then the body it
    /// announces. Returns the whole frame, header included.
    async fn get_next_message(&mut self) -> Result<Vec<u8>, GateError> {
        let mut header = [0u8; HEAD_LENGTH];
        if let Err(err) = self.inner.read_exact(&mut header).await {
            return Err(match err.kind() {
                ErrorKind::UnexpectedEof => GateError::ConnectionClosed,
                _ => err.into(),
            });
        }
        let (_, length) = packet_codec::parse_header(&header)?;

        let mut frame = vec![0u8; HEAD_LENGTH + length];
        frame[..HEAD_LENGTH].copy_from_slice(&header);
        if let Err(err) = self.inner.read_exact(&mut frame[HEAD_LENGTH..]).await {
            return Err(match err.kind() {
                ErrorKind::UnexpectedEof => GateError::ShortRead,
                _ => err.into(),
            });
        }
        Ok(frame)
    }
}

pub struct TcpFrameWriter<W> {
    inner: W,
}

impl<W> TcpFrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> ConnWriter for TcpFrameWriter<W> {
    async fn write_frame(&mut self, frame: &[u8]) -> Result<(), GateError> {
        self.inner.write_all(frame).await?;
        self.inner.flush().await?;
        Ok(())
    }

    async fn close(&mut self) {
        let _ = self.inner.shutdown().await;
    }
}

/// Accept loop for one TCP acceptor.
pub(crate) async fn serve(listener: TcpListener, tls: Option<TlsAcceptor>, gate: Gate) {
    loop {
        match listener.accept().await {
            Ok((stream, remote_addr)) => {
                let gate = gate.clone();
                let tls = tls.clone();
                tokio::spawn(async move {
                    let connection = match tls {
                        Some(acceptor) => match acceptor.accept(stream).await {
                            Ok(stream) => {
                                let (reader, writer) = tokio::io::split(stream);
                                Connection {
                                    reader: Box::new(TcpFrameReader::new(reader)),
                                    writer: Box::new(TcpFrameWriter::new(writer)),
                                    remote_addr,
                                }
                            }
                            Err(err) => {
                                tracing::debug!(%remote_addr, error = %err, "tls accept failed");
                                return;
                            }
                        },
                        None => {
                            let (reader, writer) = stream.into_split();
                            Connection {
                                reader: Box::new(TcpFrameReader::new(reader)),
                                writer: Box::new(TcpFrameWriter::new(writer)),
                                remote_addr,
                            }
                        }
                    };
                    gate.bind_session(connection);
                });
            }
            Err(err) => {
                tracing::warn!(error = %err, "tcp accept failed");
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    }
}
