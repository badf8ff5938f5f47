// chat_transport/src/server/transport.rs

//! 包含服务端 TCP 监听、接受连接的逻辑。

use std::future::Future;
use std::net::SocketAddr;

use log::{error, info, warn};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};

use crate::error::TransportError;

/// `LineServer` 负责监听地址并接受连接。
///
/// 先 `bind` 再 `serve`，这样调用方 (例如测试绑定 `127.0.0.1:0` 时) 可以在开始服务前拿到实际端口。
pub struct LineServer {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl LineServer {
    /// 绑定监听地址。
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("[LineServer] 正在监听地址: {}", local_addr);
        Ok(Self { listener, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 开始接受连接，对每个连接在新的 Tokio 任务中调用 `on_connect`。
    ///
    /// 单次 accept 失败只记录日志，监听继续；此函数正常情况下不会返回。
    pub async fn serve<F, Fut>(self, on_connect: F) -> Result<(), TransportError>
    where
        F: Fn(TcpStream, SocketAddr) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        loop {
            match self.listener.accept().await {
                Ok((tcp_stream, peer_addr)) => {
                    info!("[LineServer] 从 {} 接受了新的 TCP 连接", peer_addr);
                    if let Err(e) = tcp_stream.set_nodelay(true) {
                        warn!("[LineServer] 为 {} 设置 TCP_NODELAY 失败: {}", peer_addr, e);
                    }

                    let on_connect_callback = on_connect.clone();
                    tokio::spawn(async move {
                        on_connect_callback(tcp_stream, peer_addr).await;
                    });
                }
                Err(e) => {
                    error!("[LineServer] 接受 TCP 连接失败: {}。服务器将继续运行。", e);
                }
            }
        }
    }
}
