//! One JSON object per line over TCP. A connection carries exactly one
//! request and its reply.
pub mod protocol;

use anyhow::{anyhow, bail, Context, Result};
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::{
    io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpStream,
    time::timeout,
};

/// How long a client waits for the daemon to answer
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(30);

pub type Message = Map<String, Value>;

/// Read one line as raw bytes, `None` on EOF. Decoding is up to `parse_message`.
pub async fn read_line<R: AsyncBufReadExt + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut line = Vec::new();
    if reader.read_until(b'\n', &mut line).await? == 0 {
        return Ok(None);
    }
    Ok(Some(line))
}

pub async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, msg: &Value) -> Result<()> {
    let mut bytes = serde_json::to_vec(msg)?;
    bytes.push(b'\n');
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Decode a line into a JSON object
pub fn parse_message(line: &[u8]) -> Result<Message> {
    match serde_json::from_slice(line)? {
        Value::Object(map) => Ok(map),
        _ => bail!("message is not a JSON object"),
    }
}

/// Send one request and wait for its reply.
///
/// A daemon that doesn't answer within `wait` is reported as a `Receive Timeout`
/// error reply. The request is not cancelled on the daemon side.
pub async fn request(addr: &str, msg: &Value, wait: Duration) -> Result<Message> {
    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("Failed to connect to architect daemon at {}", addr))?;
    let (reader, mut writer) = stream.into_split();
    write_message(&mut writer, msg).await?;

    let mut reader = BufReader::new(reader);
    match timeout(wait, read_line(&mut reader)).await {
        Err(_) => {
            let mut reply = Message::new();
            reply.insert("error".into(), Value::from("Receive Timeout"));
            Ok(reply)
        }
        Ok(line) => {
            let line = line?.ok_or_else(|| anyhow!("Daemon closed the connection"))?;
            parse_message(&line).context("Bad reply from daemon")
        }
    }
}
