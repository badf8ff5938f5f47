// chat_transport/tests/line_server_integration_test.rs

use std::net::SocketAddr;
use std::time::Duration;

use chat_models::payloads::{Envelope, PingPayload, PongPayload};
use chat_transport::client::transport::LineClient;
use chat_transport::error::TransportError;
use chat_transport::frame::LineReader;
use chat_transport::message::decode_envelope;
use chat_transport::outbound::{outbound_channel, spawn_writer};
use chat_transport::server::transport::LineServer;
use log::{info, warn, LevelFilter};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

// 辅助函数：初始化日志，仅用于测试，避免多次初始化
fn init_test_logger() {
    let _ = env_logger::builder().filter_level(LevelFilter::Info).is_test(true).try_init();
}

// on_connect 回调：对 ping 回复 pong，无法解码的行被忽略，连接关闭时通知测试主任务。
async fn ping_pong_handler(stream: TcpStream, peer_addr: SocketAddr, closed_tx: mpsc::UnboundedSender<SocketAddr>) {
    let (read_half, write_half) = stream.into_split();
    let (channel, receiver) = outbound_channel(16);
    let writer = spawn_writer(write_half, receiver);
    let mut reader = LineReader::new(read_half, 1024);

    loop {
        match reader.next_line().await {
            Ok(Some(line)) => match decode_envelope(&line) {
                Ok(Envelope::Ping(_)) => {
                    let _ = channel.send(&Envelope::Pong(PongPayload {}));
                }
                Ok(other) => info!("[Test Server] 忽略 {} 的消息: {}", peer_addr, other.message_type()),
                Err(e) => warn!("[Test Server] {} 发来无法解码的行: {}", peer_addr, e),
            },
            Ok(None) => break,
            Err(e) if e.is_frame_error() => warn!("[Test Server] 丢弃一行: {}", e),
            Err(_) => break,
        }
    }

    channel.close();
    let _ = writer.await;
    let _ = closed_tx.send(peer_addr);
}

async fn start_server() -> (SocketAddr, mpsc::UnboundedReceiver<SocketAddr>, tokio::task::JoinHandle<()>) {
    let server = LineServer::bind("127.0.0.1:0").await.expect("无法绑定到随机端口");
    let addr = server.local_addr();
    let (closed_tx, closed_rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
        let on_connect = move |stream: TcpStream, peer_addr: SocketAddr| {
            let tx = closed_tx.clone();
            ping_pong_handler(stream, peer_addr, tx)
        };
        let _ = server.serve(on_connect).await;
    });
    (addr, closed_rx, handle)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_server_answers_ping_and_survives_garbage() {
    init_test_logger();
    let (addr, _closed_rx, server_handle) = start_server().await;

    let mut client = LineClient::connect(addr).await.expect("客户端连接失败");
    client.send_raw("this is not json").await.unwrap();
    client.send_raw(&"x".repeat(4096)).await.unwrap();
    client.send(&Envelope::Ping(PingPayload {})).await.unwrap();

    let reply = client.recv_timeout(Duration::from_secs(5)).await.expect("等待 pong 失败");
    assert_eq!(reply, Some(Envelope::Pong(PongPayload {})));

    // 没有更多回复
    let silence = client.recv_timeout(Duration::from_millis(200)).await;
    assert!(matches!(silence, Err(TransportError::Timeout)), "不应收到额外消息: {:?}", silence);

    server_handle.abort();
    let _ = server_handle.await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_client_shutdown_is_seen_as_eof() {
    init_test_logger();
    let (addr, mut closed_rx, server_handle) = start_server().await;

    let mut client = LineClient::connect(addr).await.expect("客户端连接失败");
    client.shutdown().await.unwrap();

    let closed = tokio::time::timeout(Duration::from_secs(5), closed_rx.recv())
        .await
        .expect("服务器未在超时内结束连接处理");
    assert!(closed.is_some());

    // 服务器关闭写端后客户端读到 EOF
    let eof = client.recv_timeout(Duration::from_secs(5)).await.expect("读取 EOF 失败");
    assert_eq!(eof, None);

    server_handle.abort();
    let _ = server_handle.await;
}
