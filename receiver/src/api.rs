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

//! HTTP API of a receiver waiting in discovery mode.

use std::net::SocketAddr;

use anyhow::{anyhow, Result};
use cast_lib::models::{HostTarget, RemoteSignal};
use common::http_server::{read_request, write_response};
use http::{Request, RequestMethod, Response, StatusCode};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::Sender;
use tokio::sync::oneshot;

use crate::Event;

pub struct ApiServer {
    listener: TcpListener,
    event_tx: Sender<Event>,
}

enum Reply {
    Empty(StatusCode),
    Json(Vec<u8>),
}

fn parse_body<T: DeserializeOwned>(request: &Request) -> Option<T> {
    let body = request.body.as_deref()?;
    match serde_json::from_slice(body) {
        Ok(value) => Some(value),
        Err(err) => {
            debug!("Invalid request body: {err}");
            None
        }
    }
}

impl ApiServer {
    pub async fn bind(port: u16, event_tx: Sender<Event>) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        Ok(Self { listener, event_tx })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(self) -> Result<()> {
        info!("API listening on {:?}", self.listener.local_addr());

        let mut id = 0u64;

        loop {
            let (stream, addr) = self.listener.accept().await?;
            debug!("id={id} API connection from {addr}");

            let event_tx = self.event_tx.clone();
            tokio::spawn(async move {
                if let Err(err) = Self::serve(stream, &event_tx, id).await {
                    warn!("id={id} API request failed: {err}");
                }
            });

            id += 1;
        }
    }

    async fn serve(mut stream: TcpStream, event_tx: &Sender<Event>, id: u64) -> Result<()> {
        let Some(request) = read_request(&mut stream, Vec::new()).await? else {
            return Ok(());
        };

        debug!(
            "id={id} {} {}",
            request.method().to_str(),
            request.start_line.target
        );

        let reply = Self::route(&request, event_tx).await?;
        let response = match &reply {
            Reply::Empty(status) => Response::empty(*status),
            Reply::Json(body) => Response::json(StatusCode::Ok, body),
        };

        write_response(&mut stream, &response).await
    }

    async fn route(request: &Request, event_tx: &Sender<Event>) -> Result<Reply> {
        let forward = |event: Event| async move {
            event_tx
                .send(event)
                .await
                .map_err(|_| anyhow!("Receiver event loop has stopped"))
        };

        let reply = match (request.method(), request.path()) {
            (RequestMethod::Post, "/api/connect" | "/connect") => {
                match parse_body::<HostTarget>(request).filter(|t| t.port > 0) {
                    Some(target) => {
                        forward(Event::Connect(target)).await?;
                        Reply::Empty(StatusCode::Ok)
                    }
                    None => Reply::Empty(StatusCode::BadRequest),
                }
            }
            (RequestMethod::Post, "/api/remote" | "/remote") => {
                match parse_body::<RemoteSignal>(request) {
                    Some(signal) => {
                        forward(Event::Remote(signal)).await?;
                        Reply::Empty(StatusCode::Ok)
                    }
                    None => Reply::Empty(StatusCode::BadRequest),
                }
            }
            (RequestMethod::Get, "/api/attach") => {
                let (tx, rx) = oneshot::channel();
                forward(Event::AttachQuery(tx)).await?;
                let info = rx.await?;
                Reply::Json(serde_json::to_vec(&info)?)
            }
            (method, path) => {
                debug!("No route for {} {path}", method.to_str());
                Reply::Empty(StatusCode::NotFound)
            }
        };

        Ok(reply)
    }
}
