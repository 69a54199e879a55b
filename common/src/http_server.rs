use anyhow::{bail, Context, Result};
use http::{expected_request_len, Request, Response};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Reads one request from `stream`. `buf` holds bytes already consumed from
/// the stream (e.g. while sniffing the protocol). Returns `None` when the peer
/// closes before sending anything.
pub async fn read_request<R>(stream: &mut R, mut buf: Vec<u8>) -> Result<Option<Request>>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 4096];

    let len = loop {
        if let Some(len) = expected_request_len(&buf)? {
            if buf.len() >= len {
                break len;
            }
        }

        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            bail!("Connection closed in the middle of a request");
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let request = Request::parse(&buf[..len]).context("Malformed request")?;

    Ok(Some(request))
}

pub async fn write_response<W>(stream: &mut W, response: &Response<'_>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    response.serialize_into(&mut buf);
    stream.write_all(&buf).await?;
    stream.flush().await?;
    Ok(())
}
