use sentinel_chat::client;
use sentinel_chat::protocol::SENTINEL;
use sentinel_chat::ChatError;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// One-shot server that reads the message and answers with `writes`, pausing between
/// them so each lands in its own read on the client side.
async fn scripted_peer(writes: Vec<Vec<u8>>, close_after: bool) -> (SocketAddr, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.set_nodelay(true).unwrap();
        let mut buf = [0u8; 1024];
        let n = stream.read(&mut buf).await.unwrap();
        for w in writes {
            stream.write_all(&w).await.unwrap();
            stream.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        if !close_after {
            // keep the socket open until the client is done
            let _ = stream.read(&mut buf).await;
        }
        String::from_utf8_lossy(&buf[..n]).into_owned()
    });
    (addr, handle)
}

#[tokio::test]
async fn character_split_across_reads_survives() {
    let ni = "你".as_bytes().to_vec();
    let writes = vec![ni[..1].to_vec(), ni[1..].to_vec(), SENTINEL.as_bytes().to_vec()];
    let (addr, peer) = scripted_peer(writes, false).await;

    let mut stream = client::connect(addr).await.unwrap();
    let mut pieces = Vec::new();
    let reply = client::send(&mut stream, "hello", |t| pieces.push(t.to_string())).await.unwrap();
    drop(stream);

    assert_eq!(reply, "你");
    assert_eq!(pieces, vec!["你".to_string()]);
    assert_eq!(peer.await.unwrap(), "hello");
}

#[tokio::test]
async fn held_back_tail_is_delivered_when_the_peer_closes() {
    let (addr, _peer) = scripted_peer(vec![b"abcEN".to_vec()], true).await;

    let mut seen = String::new();
    let err = client::exchange(addr, "hello", |t| seen.push_str(t)).await.unwrap_err();
    assert!(matches!(err, ChatError::ConnectionClosed));
    assert_eq!(seen, "abcEN");
}

#[tokio::test]
async fn closed_port_fails_to_connect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client::connect(addr).await.unwrap_err();
    assert!(matches!(err, ChatError::Io(_)));
    assert_eq!(client::NO_RESPONSE, "response: ...");
}
