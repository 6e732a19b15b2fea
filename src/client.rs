use crate::error::{ChatError, Result};
use crate::protocol::{SentinelScanner, CHUNK_SIZE};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};

/// Printed instead of a reply when the server cannot be reached.
pub const NO_RESPONSE: &str = "response: ...";

pub async fn connect(addr: impl ToSocketAddrs) -> Result<TcpStream> {
    Ok(TcpStream::connect(addr).await?)
}

/// Connects, sends `message` and streams the reply into `on_text`.
pub async fn exchange<F: FnMut(&str)>(addr: impl ToSocketAddrs, message: &str, on_text: F) -> Result<String> {
    let mut stream = connect(addr).await?;
    send(&mut stream, message, on_text).await
}

/// Sends `message` and streams the reply into `on_text` as it arrives. Returns the whole
/// reply once the sentinel shows up.
pub async fn send<F: FnMut(&str)>(stream: &mut TcpStream, message: &str, mut on_text: F) -> Result<String> {
    stream.write_all(message.as_bytes()).await?;

    // Reads may split a multi-byte character; the decoder carries it to the next read.
    let mut decoder = encoding_rs::UTF_8.new_decoder_without_bom_handling();
    let mut scanner = SentinelScanner::new();
    let mut reply = String::new();
    let mut buf = vec![0u8; CHUNK_SIZE];

    while !scanner.is_finished() {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            // hand over whatever was held back as a possible sentinel start
            let rest = std::mem::take(&mut scanner).into_remainder();
            if !rest.is_empty() {
                on_text(&rest);
            }
            return Err(ChatError::ConnectionClosed);
        }
        let cap = decoder.max_utf8_buffer_length(n).unwrap_or(n * 3 + 4);
        let mut chunk = String::with_capacity(cap);
        let _ = decoder.decode_to_string(&buf[..n], &mut chunk, false);

        let scan = scanner.push(&chunk);
        if !scan.text.is_empty() {
            on_text(&scan.text);
            reply.push_str(&scan.text);
        }
    }
    Ok(reply)
}
