// Copyright (C) 2025 Marcus L. Hanestad <marlhan@proton.me>
//
// This file is part of Castbeam.
//
// Castbeam is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Castbeam is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with Castbeam.  If not, see <https://www.gnu.org/licenses/>.

use std::net::SocketAddr;
use std::pin::pin;
use std::time::Duration;

use anyhow::{Context, Result};
use cast_lib::packet::Packet;
use cast_lib::{read_packet, write_packet};
use futures::stream::unfold;
use http::RequestMethod;
use log::{debug, error, trace};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_stream::StreamExt;

use crate::media_server::{self, ActiveMedia};
use crate::{ClientId, Event};

/// Bytes read before deciding between HTTP and the control protocol.
const SNIFF_LEN: usize = 4;
const SNIFF_TIMEOUT: Duration = Duration::from_secs(10);

/// Accepts connections on the sender port and hands each one to the media
/// server or a control channel [`Connection`].
pub struct Dispatcher {
    listener: TcpListener,
    event_tx: mpsc::Sender<Event>,
    media_rx: watch::Receiver<ActiveMedia>,
}

impl Dispatcher {
    pub async fn bind(
        port: u16,
        event_tx: mpsc::Sender<Event>,
        media_rx: watch::Receiver<ActiveMedia>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port)))
            .await
            .with_context(|| format!("Failed to bind port {port}"))?;

        Ok(Self {
            listener,
            event_tx,
            media_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(self) -> Result<()> {
        let mut id: ClientId = 0;

        loop {
            let (stream, addr) = self.listener.accept().await?;
            debug!("id={id} Accepted connection from {addr}");

            let event_tx = self.event_tx.clone();
            let media_rx = self.media_rx.clone();
            tokio::spawn(async move {
                if let Err(err) = handle_connection(id, stream, event_tx, media_rx).await {
                    debug!("id={id} Connection ended with error: {err}");
                }
            });

            id += 1;
        }
    }
}

async fn handle_connection(
    id: ClientId,
    mut stream: TcpStream,
    event_tx: mpsc::Sender<Event>,
    media_rx: watch::Receiver<ActiveMedia>,
) -> Result<()> {
    let mut prefix = [0u8; SNIFF_LEN];
    tokio::time::timeout(SNIFF_TIMEOUT, stream.read_exact(&mut prefix))
        .await
        .context("Timed out waiting for first bytes")??;

    if RequestMethod::sniff(&prefix) {
        media_server::serve(id, &mut stream, prefix.to_vec(), &media_rx).await
    } else {
        let (read_half, write_half) = stream.into_split();
        Connection::new(id, event_tx)
            .run((&prefix[..]).chain(read_half), write_half)
            .await
    }
}

/// A control channel client (receiver or attach) connected to the sender.
pub struct Connection {
    id: ClientId,
    event_tx: mpsc::Sender<Event>,
}

impl Connection {
    pub fn new(id: ClientId, event_tx: mpsc::Sender<Event>) -> Self {
        Self { id, event_tx }
    }

    /// Relays packets between the peer and the session until either side
    /// closes. The session always sees a disconnect for every connect.
    pub async fn run<R, W>(self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let id = self.id;
        let (packet_tx, packet_rx) = mpsc::channel::<Packet>(32);
        self.event_tx
            .send(Event::ClientConnected { id, tx: packet_tx })
            .await?;

        let result = self.relay(reader, &mut writer, packet_rx).await;

        self.event_tx.send(Event::ClientDisconnected(id)).await?;
        result
    }

    async fn relay<R, W>(
        &self,
        reader: R,
        writer: &mut W,
        packet_rx: mpsc::Receiver<Packet>,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let id = self.id;

        enum Message {
            Incoming(Packet),
            Outgoing(Packet),
            Closed,
        }

        let incoming = unfold(Some(reader), |reader| async move {
            let mut reader = reader?;
            match read_packet(&mut reader).await {
                Ok(packet) => Some((Message::Incoming(packet), Some(reader))),
                Err(err) => {
                    debug!("Failed to receive packet: {err}");
                    Some((Message::Closed, None))
                }
            }
        });

        let outgoing = unfold(packet_rx, |mut packet_rx| async move {
            packet_rx
                .recv()
                .await
                .map(|packet| (Message::Outgoing(packet), packet_rx))
        });

        let mut messages = pin!(incoming.merge(outgoing));
        while let Some(msg) = messages.next().await {
            match msg {
                Message::Incoming(Packet::Ping) => {
                    write_packet(writer, &Packet::Pong).await?;
                }
                Message::Incoming(Packet::Pong) => trace!("id={id} Got pong"),
                Message::Incoming(packet) => {
                    trace!("id={id} Got packet: {packet:?}");
                    self.event_tx.send(Event::Packet { id, packet }).await?;
                }
                Message::Closed => break,
                Message::Outgoing(packet) => {
                    trace!("id={id} Sending packet: {packet:?}");
                    if let Err(err) = write_packet(writer, &packet).await {
                        error!("id={id} Failed to send packet: {err}");
                        break;
                    }
                }
            }
        }

        debug!("id={id} Connection closed");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cast_lib::models::ControlCommand;
    use tokio::io::AsyncWriteExt;

    async fn dispatcher() -> (SocketAddr, mpsc::Receiver<Event>, watch::Sender<ActiveMedia>) {
        let (event_tx, event_rx) = mpsc::channel(16);
        let (media_tx, media_rx) = watch::channel(ActiveMedia::default());
        let dispatcher = Dispatcher::bind(0, event_tx, media_rx).await.unwrap();
        let port = dispatcher.local_addr().unwrap().port();
        tokio::spawn(dispatcher.run());
        (SocketAddr::from(([127, 0, 0, 1], port)), event_rx, media_tx)
    }

    #[tokio::test]
    async fn control_connection() {
        let (addr, mut event_rx, _media_tx) = dispatcher().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        write_packet(&mut stream, &Packet::Connect("tv".to_owned()))
            .await
            .unwrap();

        let tx = match event_rx.recv().await.unwrap() {
            Event::ClientConnected { tx, .. } => tx,
            other => panic!("unexpected {other:?}"),
        };
        match event_rx.recv().await.unwrap() {
            Event::Packet { packet, .. } => assert_eq!(packet, Packet::Connect("tv".to_owned())),
            other => panic!("unexpected {other:?}"),
        }

        write_packet(&mut stream, &Packet::Ping).await.unwrap();
        assert_eq!(read_packet(&mut stream).await.unwrap(), Packet::Pong);

        tx.send(Packet::Control(ControlCommand::NextTrack))
            .await
            .unwrap();
        assert_eq!(
            read_packet(&mut stream).await.unwrap(),
            Packet::Control(ControlCommand::NextTrack)
        );

        drop(stream);
        assert!(matches!(
            event_rx.recv().await.unwrap(),
            Event::ClientDisconnected(_)
        ));
    }

    #[tokio::test]
    async fn http_on_same_port() {
        let (addr, mut event_rx, _media_tx) = dispatcher().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        stream
            .write_all(b"GET /cast HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        assert!(buf.starts_with(b"HTTP/1.1 204 No Content\r\n"));

        assert!(event_rx.try_recv().is_err());
    }
}
