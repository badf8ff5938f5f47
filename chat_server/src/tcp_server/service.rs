// chat_server/src/tcp_server/service.rs

//! 聊天服务的核心服务：监听端口，为每个连接运行读循环并管理其写任务。

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chat_transport::frame::LineReader;
use chat_transport::outbound::{outbound_channel, spawn_writer};
use chat_transport::server::transport::LineServer;
use log::{debug, error, info, warn};
use tokio::net::TcpStream;

use crate::config::ServerConfig;
use crate::db::Collaborators;
use crate::error::AppError;
use crate::tcp_server::client_connection::ClientConnection;
use crate::tcp_server::dispatcher::{DispatchOutcome, Dispatcher};
use crate::tcp_server::session_registry::SessionRegistry;

/// 连接关闭后等待写任务写完剩余消息的最长时间。
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// 聊天服务，封装了配置、会话注册表与分发器。
pub struct ChatService {
    config: ServerConfig,
    registry: Arc<SessionRegistry>,
    dispatcher: Arc<Dispatcher>,
}

impl ChatService {
    pub fn new(config: ServerConfig, collaborators: Collaborators) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let dispatcher = Arc::new(Dispatcher::new(registry.clone(), collaborators, &config));
        info!("[ChatService] 新实例已创建。");
        Self {
            config,
            registry,
            dispatcher,
        }
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.registry.clone()
    }

    /// 按配置绑定监听地址。
    pub async fn bind(&self) -> Result<LineServer, AppError> {
        let listen_addr = self.config.bind_addr();
        info!("[ChatService] 配置: host={}, port={}", self.config.host, self.config.port);
        let server = LineServer::bind(listen_addr.as_str()).await?;
        Ok(server)
    }

    /// 在已绑定的监听器上接受连接，正常情况下不会返回。
    pub async fn serve(&self, server: LineServer) -> Result<()> {
        let dispatcher = self.dispatcher.clone();
        let registry = self.registry.clone();
        let config = self.config.clone();

        let on_connect = move |stream: TcpStream, peer_addr: SocketAddr| {
            let dispatcher = dispatcher.clone();
            let registry = registry.clone();
            let config = config.clone();
            async move {
                serve_connection(stream, peer_addr, dispatcher, registry, config).await;
            }
        };

        server.serve(on_connect).await.context("聊天服务监听循环异常结束")?;
        warn!("[ChatService] 监听循环意外返回。");
        Ok(())
    }

    /// 绑定并开始服务。
    pub async fn start(&self) -> Result<()> {
        info!("[ChatService] 正在启动聊天服务...");
        let server = self
            .bind()
            .await
            .with_context(|| format!("无法绑定监听地址 {}", self.config.bind_addr()))?;
        self.serve(server).await
    }
}

/// 单个连接的完整生命周期：读循环结束后清理会话，并等待写任务把剩余消息写完。
async fn serve_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    registry: Arc<SessionRegistry>,
    config: ServerConfig,
) {
    let (read_half, write_half) = stream.into_split();
    let (channel, receiver) = outbound_channel(config.outbound_queue_capacity);
    let mut writer = spawn_writer(write_half, receiver);
    let mut connection = ClientConnection::new(peer_addr, channel, registry);
    let mut reader = LineReader::new(read_half, config.max_line_bytes);
    let connection_id = connection.connection_id();
    debug!("[ChatService] 连接 {} ({}) 开始读取", connection_id, peer_addr);

    loop {
        match reader.next_line().await {
            Ok(Some(line)) => {
                if dispatcher.dispatch_line(&mut connection, &line).await == DispatchOutcome::Close {
                    debug!("[ChatService] 连接 {} 按分发结果关闭", connection_id);
                    break;
                }
            }
            Ok(None) => {
                info!("[ChatService] 连接 {} ({}) 对端已关闭", connection_id, peer_addr);
                break;
            }
            Err(e) if e.is_frame_error() => {
                warn!("[ChatService] 连接 {} 丢弃一行: {}", connection_id, e);
            }
            Err(e) => {
                warn!("[ChatService] 连接 {} 读取失败: {}", connection_id, e);
                break;
            }
        }
    }

    connection.teardown();
    drop(connection);

    match tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("[ChatService] 连接 {} 的写任务异常结束: {:?}", connection_id, e),
        Err(_) => {
            warn!("[ChatService] 连接 {} 的写任务未能在超时内结束，已中止", connection_id);
            writer.abort();
        }
    }
    drop(reader);
}
