//! Line-oriented terminal client for the relay.

use std::io;
use std::time::Duration;

use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::time::timeout;

use crate::message;

pub const DISCONNECTED: &str = "[client] Disconnected from server\n";

/// How long incoming text is still printed after we stop sending.
const RECEIVE_GRACE: Duration = Duration::from_millis(200);

/// Relay `input` lines to the server on `stream` and copy everything the
/// server sends to `output`.
///
/// Sending stops after an empty line; end of input counts as one. The write
/// side is then shut down and incoming text gets a short grace period. If the
/// server closes first, the client stops immediately.
pub async fn run_client<S, I, O>(stream: S, input: I, output: O) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite,
    I: AsyncRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let (reader, writer) = tokio::io::split(stream);
    let send = send_lines(BufReader::new(input), writer);
    let receive = print_incoming(reader, output);
    tokio::pin!(send, receive);

    tokio::select! {
        sent = &mut send => {
            sent?;
            match timeout(RECEIVE_GRACE, &mut receive).await {
                Ok(received) => received,
                Err(_) => Ok(()),
            }
        }
        received = &mut receive => received,
    }
}

async fn send_lines<I, W>(input: I, mut writer: W) -> io::Result<()>
where
    I: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    loop {
        let line = lines.next_line().await?.unwrap_or_default();
        writer.write_all(format!("{line}\n").as_bytes()).await?;
        writer.flush().await?;
        if message::is_quit(&line) {
            break;
        }
    }
    writer.shutdown().await
}

async fn print_incoming<R, O>(mut reader: R, mut output: O) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; 4096];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            output.write_all(DISCONNECTED.as_bytes()).await?;
            return output.flush().await;
        }
        output
            .write_all(message::decode_lossy(&buf[..n]).as_bytes())
            .await?;
        output.flush().await?;
    }
}
