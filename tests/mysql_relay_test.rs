//! Dual-adapter MySQL relay tests.
//!
//! The property under test is correlator isolation: with several clients
//! multiplexed through the same adapter pair, every backend reply must
//! reach exactly the client whose connection produced it, and replies for
//! departed clients are dropped rather than misrouted.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};

use gatehouse_proxy::audit::MemorySink;
use gatehouse_proxy::protocol::mysql::codec::{build_frame, read_packet, write_packet};
use gatehouse_proxy::protocol::mysql::packets::{COM_QUERY, COM_QUIT};
use gatehouse_proxy::server::MysqlRelayProxy;

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Mock backend: one echo server per connection.
///
/// Echoes every packet back with the payload unchanged, so a client can
/// verify that the reply it receives is the one for *its* request.
async fn start_echo_backend() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                loop {
                    match read_packet(&mut stream).await {
                        Ok(Some(frame)) => {
                            if frame.get(1) == Some(&COM_QUIT) {
                                return;
                            }
                            if write_packet(&mut stream, &frame).await.is_err() {
                                return;
                            }
                        }
                        _ => return,
                    }
                }
            });
        }
    });

    addr
}

/// Send a COM_QUERY packet carrying `text` and return the echoed payload.
async fn query_round_trip(stream: &mut TcpStream, text: &str) -> Vec<u8> {
    let mut payload = vec![COM_QUERY];
    payload.extend_from_slice(text.as_bytes());
    let frame = build_frame(0, &payload);

    write_packet(stream, &frame).await.unwrap();
    let reply = read_packet(stream).await.unwrap().expect("reply expected");
    reply[1..].to_vec()
}

#[tokio::test]
async fn concurrent_clients_never_receive_each_others_replies() {
    let backend_addr = start_echo_backend().await;
    let sink = Arc::new(MemorySink::new());

    let mut proxy = MysqlRelayProxy::new(
        backend_addr.ip().to_string(),
        backend_addr.port(),
        Arc::clone(&sink) as Arc<dyn gatehouse_proxy::audit::AuditSink>,
        "req-7",
        "alice",
    );
    let proxy_addr = proxy.start_server(0).await.unwrap();
    let correlator = proxy.correlator();

    let mut handles = Vec::new();
    for client_idx in 0..4 {
        let handle = tokio::spawn(async move {
            let mut stream = TcpStream::connect(proxy_addr).await.unwrap();
            for i in 0..25 {
                let text = format!("SELECT 'client-{}-{}'", client_idx, i);
                let reply = timeout(TEST_TIMEOUT, query_round_trip(&mut stream, &text))
                    .await
                    .unwrap();
                // The echoed payload must be exactly this client's request
                assert_eq!(reply[0], COM_QUERY);
                assert_eq!(&reply[1..], text.as_bytes());
            }
            write_packet(&mut stream, &build_frame(0, &[COM_QUIT]))
                .await
                .unwrap();
        });
        handles.push(handle);
    }

    for handle in handles {
        timeout(TEST_TIMEOUT, handle).await.unwrap().unwrap();
    }

    // All statements audited: 4 clients x 25 queries
    assert_eq!(sink.len().await, 100);

    // Pairings are removed once both sides close
    for _ in 0..50 {
        if correlator.active_pairs().await == 0 {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(correlator.active_pairs().await, 0);
}

#[tokio::test]
async fn each_client_gets_its_own_backend_pairing() {
    let backend_addr = start_echo_backend().await;
    let sink = Arc::new(MemorySink::new());

    let mut proxy = MysqlRelayProxy::new(
        backend_addr.ip().to_string(),
        backend_addr.port(),
        Arc::clone(&sink) as Arc<dyn gatehouse_proxy::audit::AuditSink>,
        "req-8",
        "bob",
    );
    let proxy_addr = proxy.start_server(0).await.unwrap();
    let correlator = proxy.correlator();

    let mut a = TcpStream::connect(proxy_addr).await.unwrap();
    let mut b = TcpStream::connect(proxy_addr).await.unwrap();

    // Exercise both so the pairings definitely exist
    let reply_a = timeout(TEST_TIMEOUT, query_round_trip(&mut a, "SELECT 'a'"))
        .await
        .unwrap();
    let reply_b = timeout(TEST_TIMEOUT, query_round_trip(&mut b, "SELECT 'b'"))
        .await
        .unwrap();
    assert_eq!(&reply_a[1..], b"SELECT 'a'");
    assert_eq!(&reply_b[1..], b"SELECT 'b'");

    assert_eq!(correlator.active_pairs().await, 2);

    // Dropping one client removes exactly its pairing
    drop(a);
    for _ in 0..50 {
        if correlator.active_pairs().await == 1 {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(correlator.active_pairs().await, 1);

    // The surviving client still works
    let reply_b = timeout(TEST_TIMEOUT, query_round_trip(&mut b, "SELECT 'still-b'"))
        .await
        .unwrap();
    assert_eq!(&reply_b[1..], b"SELECT 'still-b'");
}

#[tokio::test]
async fn prepared_execute_packets_are_relayed_but_not_audited() {
    let backend_addr = start_echo_backend().await;
    let sink = Arc::new(MemorySink::new());

    let mut proxy = MysqlRelayProxy::new(
        backend_addr.ip().to_string(),
        backend_addr.port(),
        Arc::clone(&sink) as Arc<dyn gatehouse_proxy::audit::AuditSink>,
        "req-9",
        "carol",
    );
    let proxy_addr = proxy.start_server(0).await.unwrap();

    let mut stream = TcpStream::connect(proxy_addr).await.unwrap();

    // COM_STMT_PREPARE carries the statement text
    let mut payload = vec![0x16]; // COM_STMT_PREPARE
    payload.extend_from_slice(b"SELECT * FROM t WHERE id = ?");
    write_packet(&mut stream, &build_frame(0, &payload))
        .await
        .unwrap();
    let reply = timeout(TEST_TIMEOUT, read_packet(&mut stream))
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(reply[1], 0x16);

    // COM_STMT_EXECUTE carries only parameters; relayed, not audited
    let execute = build_frame(0, &[0x17, 0x01, 0x00, 0x00, 0x00]);
    write_packet(&mut stream, &execute).await.unwrap();
    let reply = timeout(TEST_TIMEOUT, read_packet(&mut stream))
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(reply[1], 0x17);

    assert_eq!(
        sink.statements().await,
        vec!["SELECT * FROM t WHERE id = ?"]
    );
}

#[tokio::test]
async fn shutdown_closes_all_pairings() {
    let backend_addr = start_echo_backend().await;
    let sink = Arc::new(MemorySink::new());

    let mut proxy = MysqlRelayProxy::new(
        backend_addr.ip().to_string(),
        backend_addr.port(),
        Arc::clone(&sink) as Arc<dyn gatehouse_proxy::audit::AuditSink>,
        "req-10",
        "dave",
    );
    let proxy_addr = proxy.start_server(0).await.unwrap();
    let correlator = proxy.correlator();

    let mut stream = TcpStream::connect(proxy_addr).await.unwrap();
    let _ = timeout(TEST_TIMEOUT, query_round_trip(&mut stream, "SELECT 1"))
        .await
        .unwrap();
    assert_eq!(correlator.active_pairs().await, 1);

    proxy.shutdown_server();

    for _ in 0..50 {
        if correlator.active_pairs().await == 0 {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(correlator.active_pairs().await, 0);

    // New connections are no longer accepted
    sleep(Duration::from_millis(100)).await;
    let reconnect = TcpStream::connect(proxy_addr).await;
    match reconnect {
        Ok(mut s) => {
            // Accept loop is gone; the socket closes without a reply
            let frame = build_frame(0, &[COM_QUERY, b'x']);
            let _ = write_packet(&mut s, &frame).await;
            let reply = timeout(TEST_TIMEOUT, read_packet(&mut s)).await.unwrap();
            assert!(matches!(reply, Ok(None) | Err(_)));
        }
        Err(_) => {}
    }
}
