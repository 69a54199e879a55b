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

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use common::channel::ChannelClient;
use common::discovery::Advertiser;
use log::{debug, error, info};
use receiver::api::ApiServer;
use receiver::cec::{CecClient, CEC_GRACE, CEC_PROBE_TIMEOUT};
use receiver::config::{PlayerKind, ReceiverConfig};
use receiver::player::{MpvArgs, MpvPlayer, Player, PlayerEvent, VlcArgs, VlcPlayer};
use receiver::session::{Flow, ReceiverSession};
use receiver::Event;
use tokio::sync::mpsc;

const PLAYER_EXIT_TIMEOUT: Duration = Duration::from_secs(3);

async fn run(config: ReceiverConfig) -> Result<()> {
    let (event_tx, event_rx) = mpsc::channel::<Event>(100);
    let (player_tx, player_rx) = mpsc::unbounded_channel::<PlayerEvent>();

    match config.player_kind() {
        PlayerKind::Mpv => {
            let player = MpvPlayer::new(&config.player, &config.ipc_path, player_tx);
            let session = ReceiverSession::new(
                config.session_config(),
                player,
                Box::new(MpvArgs),
                event_tx.clone(),
            );
            serve(config, session, event_tx, event_rx, player_rx).await
        }
        PlayerKind::Vlc => {
            let player = VlcPlayer::new(&config.player, &config.ipc_path, player_tx);
            let session = ReceiverSession::new(
                config.session_config(),
                player,
                Box::new(VlcArgs),
                event_tx.clone(),
            );
            serve(config, session, event_tx, event_rx, player_rx).await
        }
    }
}

async fn serve<P: Player>(
    config: ReceiverConfig,
    mut session: ReceiverSession<P, CecClient>,
    event_tx: mpsc::Sender<Event>,
    mut event_rx: mpsc::Receiver<Event>,
    mut player_rx: mpsc::UnboundedReceiver<PlayerEvent>,
) -> Result<()> {
    if config.disable_cec {
        session.cec_ready(None);
    } else {
        session.begin_cec_check();

        let (key_tx, mut key_rx) = mpsc::channel(16);
        let cec = CecClient::probe(CEC_PROBE_TIMEOUT, key_tx).await;

        if cec.is_some() {
            let event_tx = event_tx.clone();
            tokio::spawn(async move {
                while let Some(key) = key_rx.recv().await {
                    if event_tx.send(Event::CecKey(key)).await.is_err() {
                        break;
                    }
                }
            });

            tokio::time::sleep(CEC_GRACE).await;
        }

        session.cec_ready(cec);
    }

    let _advertiser = match &config.host {
        Some(target) => {
            session =
                session.with_channel(ChannelClient::spawn(target.clone(), true, event_tx.clone()));
            None
        }
        None => {
            let api = ApiServer::bind(config.port, event_tx.clone()).await?;
            tokio::spawn(async move {
                if let Err(err) = api.run().await {
                    error!("API server failed: {err}");
                }
            });

            let advertiser = Advertiser::start(&config.name, config.port)?;
            info!("{} waiting for connection...", config.name);
            Some(advertiser)
        }
    };

    {
        let event_tx = event_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("Got interrupt");
                let _ = event_tx.send(Event::Quit).await;
            }
        });
    }

    let result = loop {
        let event = tokio::select! {
            Some(event) = event_rx.recv() => event,
            Some(event) = player_rx.recv() => Event::Player(event),
            else => break Ok(()),
        };

        match session.handle(event).await {
            Flow::Continue => (),
            Flow::Close(None) => break Ok(()),
            Flow::Close(Some(err)) => break Err(err),
        }
    };

    let player_running = session.is_player_running();
    session.close().await;

    if player_running {
        let exited = tokio::time::timeout(PLAYER_EXIT_TIMEOUT, async {
            while let Some(event) = player_rx.recv().await {
                if let PlayerEvent::Exited(_) = event {
                    break;
                }
            }
        })
        .await;
        if exited.is_err() {
            debug!("Player did not exit in time");
        }
    }

    info!("Castbeam closed");

    Ok(result?)
}

fn main() -> Result<()> {
    let config = ReceiverConfig::parse();

    env_logger::Builder::from_default_env()
        .filter_module("receiver", common::log_level(config.quiet))
        .filter_module("common", common::log_level(config.quiet))
        .init();

    common::runtime()?.block_on(run(config))
}
