//! Frame Encoding
//!
//! Length-prefixed frames over any async byte stream.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Opt, ProtocolError, ProtocolResult, Request, Response, ResponseOpt};

/// Largest frame accepted from the peer
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Write one frame with an operation code and a string payload
pub async fn write_frame<W>(writer: &mut W, code: u8, payload: &[String]) -> ProtocolResult<()>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(payload)?;
    let len = 1 + body.len();
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }

    writer.write_all(&(len as u32).to_be_bytes()).await?;
    writer.write_all(&[code]).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame, or `None` if the peer closed the stream before sending
pub async fn read_frame<R>(reader: &mut R) -> ProtocolResult<Option<(u8, Vec<String>)>>
where
    R: AsyncRead + Unpin,
{
    // Read length (4 bytes, big-endian)
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;

    if len == 0 {
        return Err(ProtocolError::EmptyFrame);
    }
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }

    let mut code = [0u8; 1];
    reader.read_exact(&mut code).await?;

    let mut body = vec![0u8; len - 1];
    reader.read_exact(&mut body).await?;
    let payload = if body.is_empty() {
        Vec::new()
    } else {
        serde_json::from_slice(&body)?
    };

    Ok(Some((code[0], payload)))
}

pub async fn write_request<W>(writer: &mut W, request: &Request) -> ProtocolResult<()>
where
    W: AsyncWrite + Unpin,
{
    write_frame(writer, request.opt as u8, &request.payload).await
}

pub async fn read_request<R>(reader: &mut R) -> ProtocolResult<Option<Request>>
where
    R: AsyncRead + Unpin,
{
    let Some((code, payload)) = read_frame(reader).await? else {
        return Ok(None);
    };
    Ok(Some(Request {
        opt: Opt::try_from(code)?,
        payload,
    }))
}

pub async fn write_response<W>(writer: &mut W, response: &Response) -> ProtocolResult<()>
where
    W: AsyncWrite + Unpin,
{
    write_frame(writer, response.opt as u8, &response.payload).await
}

pub async fn read_response<R>(reader: &mut R) -> ProtocolResult<Option<Response>>
where
    R: AsyncRead + Unpin,
{
    let Some((code, payload)) = read_frame(reader).await? else {
        return Ok(None);
    };
    Ok(Some(Response {
        opt: ResponseOpt::try_from(code)?,
        payload,
    }))
}
