//! End-to-end tests of the pipelining engine over an in-memory duplex
//! transport, with the test body playing the server.

use std::time::Duration;

use bytes::Bytes;
use redpipe::Command;
use redpipe::Connection;
use redpipe::ConnectionConfig;
use redpipe::Error;
use redpipe::Value;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::DuplexStream;

fn connect() -> (Connection, DuplexStream) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    (Connection::new(client, ConnectionConfig::default()), server)
}

/// Read exactly the bytes the engine is expected to have written.
async fn expect_request(server: &mut DuplexStream, expected: &[u8]) {
    let mut buf = vec![0u8; expected.len()];
    server.read_exact(&mut buf).await.unwrap();
    assert_eq!(
        buf,
        expected,
        "wire bytes: {:?} != {:?}",
        String::from_utf8_lossy(&buf),
        String::from_utf8_lossy(expected)
    );
}

#[tokio::test]
async fn test_submit_and_reply() {
    let (conn, mut server) = connect();

    let handle = conn.submit(Command::new("PING")).unwrap();
    expect_request(&mut server, b"*1\r\n$4\r\nPING\r\n").await;

    server.write_all(b"+PONG\r\n").await.unwrap();

    let reply = handle.await.unwrap();
    assert_eq!(reply, Value::SimpleString(Bytes::from("PONG")));
}

#[tokio::test]
async fn test_fifo_correlation_single_read() {
    let (conn, mut server) = connect();

    let h1 = conn.submit(Command::new("GET").arg("a")).unwrap();
    let h2 = conn.submit(Command::new("GET").arg("b")).unwrap();
    let h3 = conn.submit(Command::new("GET").arg("c")).unwrap();

    expect_request(
        &mut server,
        b"*2\r\n$3\r\nGET\r\n$1\r\na\r\n\
          *2\r\n$3\r\nGET\r\n$1\r\nb\r\n\
          *2\r\n$3\r\nGET\r\n$1\r\nc\r\n",
    )
    .await;

    // All three replies delivered in one write.
    server
        .write_all(b"$3\r\none\r\n$3\r\ntwo\r\n$-1\r\n")
        .await
        .unwrap();

    assert_eq!(h1.await.unwrap(), Value::BulkString(Bytes::from("one")));
    assert_eq!(h2.await.unwrap(), Value::BulkString(Bytes::from("two")));
    assert_eq!(h3.await.unwrap(), Value::Nil);
}

#[tokio::test]
async fn test_fifo_correlation_byte_fragmented() {
    let (conn, mut server) = connect();

    let h1 = conn.submit(Command::new("GET").arg("a")).unwrap();
    let h2 = conn.submit(Command::new("GET").arg("b")).unwrap();

    expect_request(
        &mut server,
        b"*2\r\n$3\r\nGET\r\n$1\r\na\r\n*2\r\n$3\r\nGET\r\n$1\r\nb\r\n",
    )
    .await;

    // Dribble the reply bytes one at a time.
    for byte in b"$3\r\none\r\n+OK\r\n" {
        server.write_all(&[*byte]).await.unwrap();
        server.flush().await.unwrap();
    }

    assert_eq!(h1.await.unwrap(), Value::BulkString(Bytes::from("one")));
    assert_eq!(h2.await.unwrap(), Value::SimpleString(Bytes::from("OK")));
}

#[tokio::test]
async fn test_server_error_is_not_fatal() {
    let (conn, mut server) = connect();

    let h1 = conn.submit(Command::new("BOGUS")).unwrap();
    let h2 = conn.submit(Command::new("PING")).unwrap();

    expect_request(&mut server, b"*1\r\n$5\r\nBOGUS\r\n*1\r\n$4\r\nPING\r\n").await;
    server
        .write_all(b"-ERR unknown command 'BOGUS'\r\n+PONG\r\n")
        .await
        .unwrap();

    match h1.await {
        Err(Error::Server(message)) => assert!(message.contains("unknown command")),
        other => panic!("expected server error, got {:?}", other),
    }

    // The error was delivered to its own caller only; the pipeline lives.
    assert_eq!(
        h2.await.unwrap(),
        Value::SimpleString(Bytes::from("PONG"))
    );
    assert!(!conn.is_broken());
}

#[tokio::test]
async fn test_protocol_error_fails_everything() {
    let (conn, mut server) = connect();

    let h1 = conn.submit(Command::new("PING")).unwrap();
    let h2 = conn.submit(Command::new("PING")).unwrap();
    expect_request(&mut server, b"*1\r\n$4\r\nPING\r\n*1\r\n$4\r\nPING\r\n").await;

    // '?' is not a RESP type tag.
    server.write_all(b"?garbage\r\n").await.unwrap();

    for handle in [h1, h2] {
        match handle.await {
            Err(Error::Broken(cause)) => {
                assert!(matches!(*cause, Error::Protocol(_)), "cause: {:?}", cause)
            }
            other => panic!("expected broken connection, got {:?}", other),
        }
    }

    // Later submits fail synchronously with the same terminal error.
    match conn.submit(Command::new("PING")) {
        Err(Error::Broken(cause)) => assert!(matches!(*cause, Error::Protocol(_))),
        other => panic!("expected synchronous failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_eof_fails_outstanding() {
    let (conn, mut server) = connect();

    let handle = conn.submit(Command::new("PING")).unwrap();
    expect_request(&mut server, b"*1\r\n$4\r\nPING\r\n").await;

    drop(server);

    match handle.await {
        Err(Error::Broken(cause)) => assert!(matches!(*cause, Error::Closed)),
        other => panic!("expected broken connection, got {:?}", other),
    }
    assert!(conn.is_broken());
}

#[tokio::test]
async fn test_shutdown_carries_cause_and_rejects_submit() {
    let (conn, mut server) = connect();

    let handle = conn.submit(Command::new("PING")).unwrap();
    expect_request(&mut server, b"*1\r\n$4\r\nPING\r\n").await;

    conn.shutdown(Error::Timeout);

    match handle.await {
        Err(Error::Broken(cause)) => assert!(matches!(*cause, Error::Timeout)),
        other => panic!("expected broken connection, got {:?}", other),
    }

    match conn.submit(Command::new("PING")) {
        Err(Error::Broken(cause)) => assert!(matches!(*cause, Error::Timeout)),
        other => panic!("expected synchronous failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_cancelled_handle_does_not_shift_fifo() {
    let (conn, mut server) = connect();

    let abandoned = conn.submit(Command::new("GET").arg("a")).unwrap();
    drop(abandoned);
    let kept = conn.submit(Command::new("GET").arg("b")).unwrap();

    expect_request(
        &mut server,
        b"*2\r\n$3\r\nGET\r\n$1\r\na\r\n*2\r\n$3\r\nGET\r\n$1\r\nb\r\n",
    )
    .await;

    // First reply belongs to the abandoned slot and is discarded; the
    // second must still land on `kept`.
    server.write_all(b"$5\r\nstale\r\n$5\r\nfresh\r\n").await.unwrap();

    assert_eq!(
        kept.await.unwrap(),
        Value::BulkString(Bytes::from("fresh"))
    );
    assert!(!conn.is_broken());
}

#[tokio::test]
async fn test_subscribe_push_and_mode_transitions() {
    let (conn, mut server) = connect();

    // Enter subscribed mode.
    let sub = conn.submit(Command::new("SUBSCRIBE").arg("news")).unwrap();
    expect_request(&mut server, b"*2\r\n$9\r\nSUBSCRIBE\r\n$4\r\nnews\r\n").await;
    server
        .write_all(b"*3\r\n$9\r\nsubscribe\r\n$4\r\nnews\r\n:1\r\n")
        .await
        .unwrap();

    let ack = sub.await.unwrap();
    assert_eq!(
        ack.as_array().and_then(|a| a.first()).and_then(Value::as_str),
        Some("subscribe")
    );

    // An unsolicited push bypasses the reply queue.
    server
        .write_all(b"*3\r\n$7\r\nmessage\r\n$4\r\nnews\r\n$5\r\nhello\r\n")
        .await
        .unwrap();
    let push = conn.next_push().await.unwrap();
    assert_eq!(
        push,
        Value::Array(vec![
            Value::from("message"),
            Value::from("news"),
            Value::from("hello"),
        ])
    );

    // The unsubscribe acknowledgement resolves its slot and leaves
    // subscribed mode.
    let unsub = conn.submit(Command::new("UNSUBSCRIBE").arg("news")).unwrap();
    expect_request(&mut server, b"*2\r\n$11\r\nUNSUBSCRIBE\r\n$4\r\nnews\r\n").await;
    server
        .write_all(b"*3\r\n$11\r\nunsubscribe\r\n$4\r\nnews\r\n:0\r\n")
        .await
        .unwrap();
    unsub.await.unwrap();

    // Back in normal mode, ordinary replies correlate as usual.
    let ping = conn.submit(Command::new("PING")).unwrap();
    expect_request(&mut server, b"*1\r\n$4\r\nPING\r\n").await;
    server.write_all(b"+PONG\r\n").await.unwrap();
    assert_eq!(
        ping.await.unwrap(),
        Value::SimpleString(Bytes::from("PONG"))
    );
}

#[tokio::test]
async fn test_subscription_ack_interleaved_with_pushes() {
    let (conn, mut server) = connect();

    let sub = conn.submit(Command::new("SUBSCRIBE").arg("a")).unwrap();
    expect_request(&mut server, b"*2\r\n$9\r\nSUBSCRIBE\r\n$1\r\na\r\n").await;
    server
        .write_all(b"*3\r\n$9\r\nsubscribe\r\n$1\r\na\r\n:1\r\n")
        .await
        .unwrap();
    sub.await.unwrap();

    // A push arrives before the next command's acknowledgement; the
    // acknowledgement must still land on its slot, not the sink.
    let ping = conn.submit(Command::new("PING")).unwrap();
    expect_request(&mut server, b"*1\r\n$4\r\nPING\r\n").await;
    server
        .write_all(b"*3\r\n$7\r\nmessage\r\n$1\r\na\r\n$2\r\nhi\r\n+PONG\r\n")
        .await
        .unwrap();

    assert_eq!(
        ping.await.unwrap(),
        Value::SimpleString(Bytes::from("PONG"))
    );
    let push = conn.next_push().await.unwrap();
    assert_eq!(push.as_array().map(|a| a.len()), Some(3));
}

#[tokio::test]
async fn test_multichannel_subscribe_does_not_shift_fifo() {
    let (conn, mut server) = connect();

    // One slot, two channels, two acknowledgements; a pipelined command
    // behind the subscribe must still get its own reply.
    let sub = conn.submit(Command::new("SUBSCRIBE").arg("a").arg("b")).unwrap();
    let ping = conn.submit(Command::new("PING")).unwrap();
    expect_request(
        &mut server,
        b"*3\r\n$9\r\nSUBSCRIBE\r\n$1\r\na\r\n$1\r\nb\r\n*1\r\n$4\r\nPING\r\n",
    )
    .await;
    server
        .write_all(
            b"*3\r\n$9\r\nsubscribe\r\n$1\r\na\r\n:1\r\n\
              *3\r\n$9\r\nsubscribe\r\n$1\r\nb\r\n:2\r\n\
              +PONG\r\n",
        )
        .await
        .unwrap();

    let ack = sub.await.unwrap();
    assert_eq!(
        ack.as_array().and_then(|a| a.get(1)).and_then(Value::as_str),
        Some("a")
    );
    assert_eq!(
        ping.await.unwrap(),
        Value::SimpleString(Bytes::from("PONG"))
    );
    assert!(!conn.is_broken());

    // The surplus acknowledgement surfaced through the push sink.
    let surplus = conn.next_push().await.unwrap();
    assert_eq!(
        surplus.as_array().and_then(|a| a.get(1)).and_then(Value::as_str),
        Some("b")
    );
}

#[tokio::test]
async fn test_reply_handle_is_debuggable() {
    let (conn, mut server) = connect();

    let handle = conn.submit(Command::new("PING")).unwrap();
    assert!(format!("{:?}", handle).contains("ReplyHandle"));

    expect_request(&mut server, b"*1\r\n$4\r\nPING\r\n").await;
    server.write_all(b"+PONG\r\n").await.unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_unexpected_reply_is_fatal() {
    let (conn, mut server) = connect();

    // A reply with no command outstanding cannot be correlated.
    server.write_all(b"+OK\r\n").await.unwrap();

    for _ in 0..200 {
        if conn.is_broken() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert!(conn.is_broken());

    match conn.submit(Command::new("PING")) {
        Err(Error::Broken(cause)) => assert!(matches!(*cause, Error::UnexpectedReply)),
        other => panic!("expected synchronous failure, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_read_timeout_fails_outstanding() {
    let (client, mut server) = tokio::io::duplex(64 * 1024);
    let config = ConnectionConfig {
        read_timeout: Some(Duration::from_millis(100)),
        ..ConnectionConfig::default()
    };
    let conn = Connection::new(client, config);

    let handle = conn.submit(Command::new("PING")).unwrap();
    expect_request(&mut server, b"*1\r\n$4\r\nPING\r\n").await;

    // The server never replies.
    match handle.await {
        Err(Error::Broken(cause)) => assert!(matches!(*cause, Error::Timeout)),
        other => panic!("expected timeout, got {:?}", other),
    }

    match conn.submit(Command::new("PING")) {
        Err(Error::Broken(cause)) => assert!(matches!(*cause, Error::Timeout)),
        other => panic!("expected synchronous failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_push_sink_closes_after_shutdown() {
    let (conn, mut server) = connect();

    let sub = conn.submit(Command::new("SUBSCRIBE").arg("a")).unwrap();
    expect_request(&mut server, b"*2\r\n$9\r\nSUBSCRIBE\r\n$1\r\na\r\n").await;
    server
        .write_all(b"*3\r\n$9\r\nsubscribe\r\n$1\r\na\r\n:1\r\n")
        .await
        .unwrap();
    sub.await.unwrap();

    drop(server);
    assert_eq!(conn.next_push().await, None);
}
