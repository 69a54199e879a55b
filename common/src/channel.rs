//! Client side of the control channel.
//!
//! A [`ChannelClient`] owns one TCP connection to a sender at a time and can
//! be re-pointed at another sender ([`ChannelHandle::migrate`]) without the
//! application having to recreate it. Everything it observes is delivered as
//! [`ChannelEvent`]s on the application's event queue.

use std::pin::pin;
use std::time::Duration;

use anyhow::{anyhow, Result};
use cast_lib::models::HostTarget;
use cast_lib::packet::Packet;
use cast_lib::{read_packet, write_packet};
use futures::stream::unfold;
use log::{debug, error, info, trace, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::time::Instant;
use tokio_stream::StreamExt;

use crate::error::CastError;

/// Time between a forced disconnect and connecting to the new host.
pub const REBIND_DELAY: Duration = Duration::from_millis(100);
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub enum ChannelEvent {
    Connected(HostTarget),
    Disconnected(HostTarget),
    Packet(Packet),
    /// A connection attempt failed. While migrating, the previous target is
    /// kept.
    Unreachable(CastError),
}

#[derive(Debug, PartialEq)]
pub enum ChannelCommand {
    Send(Packet),
    Migrate(HostTarget),
    SetReconnect(bool),
    Shutdown,
}

/// What to do when asked to point the channel at `new`.
#[derive(Debug, PartialEq, Eq)]
pub enum MigrationAction {
    /// Same host: turn reconnection back on and reconnect if currently down.
    Resume { reconnect_now: bool },
    /// Different host: drop the connection and connect to the new target.
    Rebind,
}

pub fn plan_migration(current: &HostTarget, new: &HostTarget, connected: bool) -> MigrationAction {
    if current == new {
        MigrationAction::Resume {
            reconnect_now: !connected,
        }
    } else {
        MigrationAction::Rebind
    }
}

#[derive(Clone, Debug)]
pub struct ChannelHandle {
    cmd_tx: Sender<ChannelCommand>,
}

impl ChannelHandle {
    /// A handle not backed by any connection. Commands are delivered to the
    /// returned receiver instead.
    pub fn detached(buffer: usize) -> (Self, Receiver<ChannelCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(buffer);
        (Self { cmd_tx }, cmd_rx)
    }

    async fn command(&self, cmd: ChannelCommand) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| anyhow!("Control channel is closed"))
    }

    pub async fn send(&self, packet: Packet) -> Result<()> {
        self.command(ChannelCommand::Send(packet)).await
    }

    pub async fn migrate(&self, target: HostTarget) -> Result<()> {
        self.command(ChannelCommand::Migrate(target)).await
    }

    pub async fn set_reconnect(&self, enabled: bool) -> Result<()> {
        self.command(ChannelCommand::SetReconnect(enabled)).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.command(ChannelCommand::Shutdown).await
    }
}

enum ConnectionEnd {
    Closed,
    Rebind(HostTarget),
    Shutdown,
}

pub struct ChannelClient<E> {
    target: HostTarget,
    reconnect: bool,
    cmd_rx: Receiver<ChannelCommand>,
    event_tx: Sender<E>,
}

impl<E> ChannelClient<E>
where
    E: From<ChannelEvent> + Send + 'static,
{
    /// Starts a client that immediately connects to `target`.
    pub fn spawn(target: HostTarget, reconnect: bool, event_tx: Sender<E>) -> ChannelHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(100);

        let client = Self {
            target,
            reconnect,
            cmd_rx,
            event_tx,
        };

        tokio::spawn(async move {
            if let Err(err) = client.run().await {
                error!("Control channel exited with error: {err}");
            }
        });

        ChannelHandle { cmd_tx }
    }

    async fn emit(&self, event: ChannelEvent) -> Result<()> {
        self.event_tx
            .send(E::from(event))
            .await
            .map_err(|_| anyhow!("Event receiver dropped"))
    }

    async fn connect(target: &HostTarget) -> Result<TcpStream, CastError> {
        let unreachable = |err: String| {
            CastError::HostUnreachable(format!("{} ({err})", target.to_url()))
        };
        match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(target.authority())).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(err)) => Err(unreachable(err.to_string())),
            Err(_) => Err(unreachable("timed out".to_owned())),
        }
    }

    async fn run(mut self) -> Result<()> {
        let mut attempt = Some(self.target.clone());
        let mut retry_at: Option<Instant> = None;

        loop {
            if let Some(target) = attempt.take() {
                retry_at = None;
                info!("Connecting to {}...", target.to_url());
                match Self::connect(&target).await {
                    Ok(stream) => {
                        if target != self.target {
                            info!("Control channel moved to {}", target.to_url());
                            self.target = target.clone();
                        }
                        self.emit(ChannelEvent::Connected(target.clone())).await?;

                        let end = self.run_connection(stream).await;

                        self.emit(ChannelEvent::Disconnected(target)).await?;

                        match end {
                            ConnectionEnd::Shutdown => break,
                            ConnectionEnd::Rebind(new) => {
                                tokio::time::sleep(REBIND_DELAY).await;
                                attempt = Some(new);
                                continue;
                            }
                            ConnectionEnd::Closed => {
                                if self.reconnect {
                                    retry_at = Some(Instant::now() + RECONNECT_DELAY);
                                }
                            }
                        }
                    }
                    Err(err) => {
                        warn!("{err}");
                        if target != self.target {
                            debug!("Keeping previous target {}", self.target.to_url());
                        }
                        self.emit(ChannelEvent::Unreachable(err)).await?;
                        if self.reconnect {
                            retry_at = Some(Instant::now() + RECONNECT_DELAY);
                        }
                    }
                }
            }

            // Disconnected: wait for a command or the reconnect timer
            let timer = async {
                match retry_at {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        break;
                    };
                    match cmd {
                        ChannelCommand::Send(packet) => {
                            warn!("Not connected, dropping packet: {packet:?}");
                        }
                        ChannelCommand::Migrate(new) => match plan_migration(&self.target, &new, false) {
                            MigrationAction::Resume { .. } => {
                                self.reconnect = true;
                                attempt = Some(new);
                            }
                            MigrationAction::Rebind => attempt = Some(new),
                        },
                        ChannelCommand::SetReconnect(enabled) => {
                            self.reconnect = enabled;
                            if !enabled {
                                retry_at = None;
                            }
                        }
                        ChannelCommand::Shutdown => break,
                    }
                }
                _ = timer => attempt = Some(self.target.clone()),
            }
        }

        debug!("Control channel terminated");

        Ok(())
    }

    async fn run_connection(&mut self, mut stream: TcpStream) -> ConnectionEnd {
        let (tcp_stream_rx, mut tcp_stream_tx) = stream.split();

        enum Message {
            Packet(Packet),
            Closed,
            Command(ChannelCommand),
        }

        let packets_stream = unfold(Some(tcp_stream_rx), |state| async move {
            let mut tcp_stream = state?;
            match read_packet(&mut tcp_stream).await {
                Ok(p) => Some((Message::Packet(p), Some(tcp_stream))),
                Err(err) => {
                    debug!("Control channel read ended: {err}");
                    Some((Message::Closed, None))
                }
            }
        });

        let commands_stream = unfold(&mut self.cmd_rx, |cmd_rx| async move {
            cmd_rx.recv().await.map(|cmd| (Message::Command(cmd), cmd_rx))
        });

        let mut msg_stream = pin!(packets_stream.merge(commands_stream));

        let end = loop {
            let Some(msg) = msg_stream.next().await else {
                break ConnectionEnd::Shutdown;
            };

            match msg {
                Message::Closed => break ConnectionEnd::Closed,
                Message::Packet(packet) => {
                    trace!("Got packet: {packet:?}");
                    match packet {
                        Packet::Ping => {
                            if let Err(err) = write_packet(&mut tcp_stream_tx, &Packet::Pong).await {
                                warn!("Failed to answer ping: {err}");
                                break ConnectionEnd::Closed;
                            }
                        }
                        Packet::Pong => trace!("Got pong"),
                        Packet::None => (),
                        packet => {
                            if self
                                .event_tx
                                .send(E::from(ChannelEvent::Packet(packet)))
                                .await
                                .is_err()
                            {
                                break ConnectionEnd::Shutdown;
                            }
                        }
                    }
                }
                Message::Command(cmd) => match cmd {
                    ChannelCommand::Send(packet) => {
                        if let Err(err) = write_packet(&mut tcp_stream_tx, &packet).await {
                            warn!("Failed to send packet: {err}");
                            break ConnectionEnd::Closed;
                        }
                    }
                    ChannelCommand::Migrate(new) => {
                        match plan_migration(&self.target, &new, true) {
                            MigrationAction::Resume { .. } => self.reconnect = true,
                            MigrationAction::Rebind => {
                                info!("Changing server to: {}", new.to_url());
                                break ConnectionEnd::Rebind(new);
                            }
                        }
                    }
                    ChannelCommand::SetReconnect(enabled) => self.reconnect = enabled,
                    ChannelCommand::Shutdown => break ConnectionEnd::Shutdown,
                },
            }
        };

        // Closing our half is the disconnect acknowledgment: once this
        // returns the peer has been told and the socket is released.
        if let Err(err) = tcp_stream_tx.shutdown().await {
            trace!("Shutdown of control channel failed: {err}");
        }

        end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cast_lib::models::{ControlCommand, InvalidMessage};
    use tokio::net::TcpListener;

    async fn listener() -> (TcpListener, HostTarget) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, HostTarget::new("127.0.0.1", port))
    }

    async fn next(rx: &mut Receiver<ChannelEvent>) -> ChannelEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[test]
    fn migration_plans() {
        let a = HostTarget::new("10.0.0.2", 9880);
        let b = HostTarget::new("10.0.0.3", 9880);
        assert_eq!(
            plan_migration(&a, &a.clone(), true),
            MigrationAction::Resume {
                reconnect_now: false
            }
        );
        assert_eq!(
            plan_migration(&a, &a.clone(), false),
            MigrationAction::Resume {
                reconnect_now: true
            }
        );
        assert_eq!(plan_migration(&a, &b, true), MigrationAction::Rebind);
        assert_eq!(
            plan_migration(&a, &HostTarget::new("10.0.0.2", 9881), false),
            MigrationAction::Rebind
        );
    }

    #[tokio::test]
    async fn exchanges_packets_and_answers_ping() {
        let (listener, target) = listener().await;
        let (event_tx, mut event_rx) = mpsc::channel::<ChannelEvent>(16);
        let handle = ChannelClient::spawn(target.clone(), false, event_tx);

        let (mut server, _) = listener.accept().await.unwrap();
        assert!(matches!(next(&mut event_rx).await, ChannelEvent::Connected(t) if t == target));

        handle.send(Packet::Connect("tv".to_owned())).await.unwrap();
        assert_eq!(
            read_packet(&mut server).await.unwrap(),
            Packet::Connect("tv".to_owned())
        );

        write_packet(&mut server, &Packet::Ping).await.unwrap();
        assert_eq!(read_packet(&mut server).await.unwrap(), Packet::Pong);

        write_packet(&mut server, &Packet::Invalid(InvalidMessage::accepted()))
            .await
            .unwrap();
        assert!(matches!(
            next(&mut event_rx).await,
            ChannelEvent::Packet(Packet::Invalid(_))
        ));

        handle.shutdown().await.unwrap();
        assert!(matches!(
            next(&mut event_rx).await,
            ChannelEvent::Disconnected(_)
        ));
    }

    #[tokio::test]
    async fn rebinds_to_new_host() {
        let (first, first_target) = listener().await;
        let (second, second_target) = listener().await;
        let (event_tx, mut event_rx) = mpsc::channel::<ChannelEvent>(16);
        let handle = ChannelClient::spawn(first_target.clone(), false, event_tx);

        let (mut old, _) = first.accept().await.unwrap();
        assert!(matches!(next(&mut event_rx).await, ChannelEvent::Connected(_)));

        handle.migrate(second_target.clone()).await.unwrap();

        assert!(matches!(
            next(&mut event_rx).await,
            ChannelEvent::Disconnected(t) if t == first_target
        ));
        // Old server sees the close
        assert!(read_packet(&mut old).await.is_err());

        let (mut new, _) = second.accept().await.unwrap();
        assert!(matches!(
            next(&mut event_rx).await,
            ChannelEvent::Connected(t) if t == second_target
        ));

        handle
            .send(Packet::Control(ControlCommand::NextTrack))
            .await
            .unwrap();
        assert_eq!(
            read_packet(&mut new).await.unwrap(),
            Packet::Control(ControlCommand::NextTrack)
        );
    }

    #[tokio::test]
    async fn same_host_resumes_reconnection() {
        let (listener, target) = listener().await;
        let (event_tx, mut event_rx) = mpsc::channel::<ChannelEvent>(16);
        let handle = ChannelClient::spawn(target.clone(), false, event_tx);

        let (server, _) = listener.accept().await.unwrap();
        assert!(matches!(next(&mut event_rx).await, ChannelEvent::Connected(_)));

        // Server drops us; reconnection is off so nothing else happens
        drop(server);
        assert!(matches!(
            next(&mut event_rx).await,
            ChannelEvent::Disconnected(_)
        ));
        assert!(
            tokio::time::timeout(RECONNECT_DELAY * 2, listener.accept())
                .await
                .is_err()
        );

        handle.migrate(target.clone()).await.unwrap();
        let (_server, _) = listener.accept().await.unwrap();
        assert!(matches!(next(&mut event_rx).await, ChannelEvent::Connected(t) if t == target));
    }

    #[tokio::test]
    async fn failed_migration_keeps_previous_target() {
        let (listener, target) = listener().await;
        let (dead, dead_target) = self::listener().await;
        drop(dead);

        let (event_tx, mut event_rx) = mpsc::channel::<ChannelEvent>(16);
        let handle = ChannelClient::spawn(target.clone(), true, event_tx);

        let (_server, _) = listener.accept().await.unwrap();
        assert!(matches!(next(&mut event_rx).await, ChannelEvent::Connected(_)));

        handle.migrate(dead_target).await.unwrap();
        assert!(matches!(
            next(&mut event_rx).await,
            ChannelEvent::Disconnected(_)
        ));
        assert!(matches!(
            next(&mut event_rx).await,
            ChannelEvent::Unreachable(CastError::HostUnreachable(_))
        ));

        // Reconnection falls back to the old sender
        let (_server, _) = listener.accept().await.unwrap();
        assert!(matches!(next(&mut event_rx).await, ChannelEvent::Connected(t) if t == target));
    }
}
