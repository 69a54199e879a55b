pub mod models;
pub mod packet;

use anyhow::{bail, Result};
use models::Header;
use packet::Packet;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const HEADER_BUFFER_SIZE: usize = 5;
pub const MAX_BODY_SIZE: u32 = 32000 - 1;

/// Attempt to read and decode a control channel packet from `stream`.
pub async fn read_packet<R>(stream: &mut R) -> Result<Packet>
where
    R: AsyncRead + Unpin,
{
    let mut header_buf: [u8; HEADER_BUFFER_SIZE] = [0; HEADER_BUFFER_SIZE];

    stream.read_exact(&mut header_buf).await?;

    let header = Header::decode(header_buf);

    let mut body_string = String::new();

    if header.size > 0 {
        if header.size > MAX_BODY_SIZE {
            bail!(
                "Body size ({}) exceeds MAX_BODY_SIZE ({})",
                header.size,
                MAX_BODY_SIZE
            );
        }
        let mut body_buf = vec![0; header.size as usize];
        stream.read_exact(&mut body_buf).await?;
        body_string = String::from_utf8(body_buf)?;
    }

    Ok(Packet::decode(header, &body_string)?)
}

pub async fn write_packet<W>(stream: &mut W, packet: &Packet) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let bytes = packet.encode()?;
    stream.write_all(&bytes).await?;
    stream.flush().await?;
    Ok(())
}
