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

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use anyhow::Result;
use common::http_server::{read_request, write_response};
use http::{ByteRange, Request, RequestMethod, Response, StatusCode};
use log::{debug, trace};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;

use crate::media::mime_type;
use crate::ClientId;

/// Files currently exposed to the receiver.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ActiveMedia {
    pub cast: Option<PathBuf>,
    pub subs: Option<PathBuf>,
    pub cover: Option<PathBuf>,
}

impl ActiveMedia {
    fn for_path(&self, path: &str) -> Option<Option<&Path>> {
        match path {
            "/cast" => Some(self.cast.as_deref()),
            "/subs" => Some(self.subs.as_deref()),
            "/cover" => Some(self.cover.as_deref()),
            _ => None,
        }
    }
}

fn response(status: StatusCode) -> Response<'static> {
    Response::empty(status)
        .with_header("Access-Control-Allow-Origin", "*")
        .with_header("Connection", "close")
}

/// Serves a single request on `stream`. `prefix` holds the bytes consumed
/// while sniffing the connection.
pub async fn serve<S>(
    id: ClientId,
    stream: &mut S,
    prefix: Vec<u8>,
    media: &watch::Receiver<ActiveMedia>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let Some(request) = read_request(stream, prefix).await? else {
        return Ok(());
    };

    let path = request.path().split('?').next().unwrap_or_default();
    debug!("id={id} {} {path}", request.method().to_str());

    let file = match request.method() {
        RequestMethod::Get | RequestMethod::Head => media
            .borrow()
            .for_path(path)
            .map(|file| file.map(Path::to_path_buf)),
        _ => None,
    };

    match file {
        None => write_response(stream, &response(StatusCode::NotFound)).await,
        Some(None) => write_response(stream, &response(StatusCode::NoContent)).await,
        Some(Some(file)) => serve_file(id, stream, &request, &file).await,
    }
}

async fn serve_file<S>(id: ClientId, stream: &mut S, request: &Request, path: &Path) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut file = match File::open(path).await {
        Ok(file) => file,
        Err(err) => {
            debug!("id={id} Cannot open {}: {err}", path.display());
            return write_response(stream, &response(StatusCode::NotFound)).await;
        }
    };
    let total = file.metadata().await?.len();

    let (mut head, range) = match request.header("Range") {
        Some(value) => match ByteRange::parse(value, total) {
            Some(range) => {
                let mut head = response(StatusCode::PartialContent);
                head.set_header("Content-Range", range.content_range(total));
                (head, range)
            }
            None => {
                debug!("id={id} Unsatisfiable range {value} for {total} bytes");
                let mut head = response(StatusCode::RangeNotSatisfiable);
                head.set_header("Content-Range", format!("bytes */{total}"));
                return write_response(stream, &head).await;
            }
        },
        None => (
            response(StatusCode::Ok),
            ByteRange {
                start: 0,
                end: total.saturating_sub(1),
            },
        ),
    };

    let len = if total == 0 { 0 } else { range.len() };
    head.set_header("Content-Length", len.to_string());
    head.set_header("Content-Type", mime_type(path));
    head.set_header("Accept-Ranges", "bytes");
    write_response(stream, &head).await?;

    if request.method() == RequestMethod::Head || len == 0 {
        return Ok(());
    }

    file.seek(SeekFrom::Start(range.start)).await?;
    let sent = tokio::io::copy(&mut file.take(len), stream).await?;
    stream.flush().await?;
    trace!("id={id} Sent {sent} bytes of {}", path.display());

    Ok(())
}
