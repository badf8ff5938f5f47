// chat_transport/src/client/transport.rs

//! 客户端传输层：连接服务器，按行发送和接收 `Envelope`。

use std::net::SocketAddr;
use std::time::Duration;

use chat_models::payloads::Envelope;
use log::{debug, info};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::error::TransportError;
use crate::frame::{LineReader, DEFAULT_MAX_LINE_BYTES};
use crate::message::{decode_envelope, encode_envelope};

/// 一个活动的客户端连接。
pub struct LineClient {
    reader: LineReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl LineClient {
    /// 连接到指定地址的服务器。
    pub async fn connect(addr: SocketAddr) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (read_half, writer) = stream.into_split();
        info!("[LineClient] 已连接到 {}", addr);
        Ok(Self {
            reader: LineReader::new(read_half, DEFAULT_MAX_LINE_BYTES),
            writer,
        })
    }

    /// 发送一条 `Envelope`。
    pub async fn send(&mut self, envelope: &Envelope) -> Result<(), TransportError> {
        let line = encode_envelope(envelope)?;
        debug!("[LineClient] 发送: {}", envelope.message_type());
        self.send_raw(&line).await
    }

    /// 原样发送一行文本 (可用于发送非法数据)，自动补上结尾的 `\n`。
    pub async fn send_raw(&mut self, line: &str) -> Result<(), TransportError> {
        self.writer.write_all(line.as_bytes()).await?;
        if !line.ends_with('\n') {
            self.writer.write_all(b"\n").await?;
        }
        self.writer.flush().await?;
        Ok(())
    }

    /// 接收下一条 `Envelope`。`Ok(None)` 表示服务器已关闭连接。
    pub async fn recv(&mut self) -> Result<Option<Envelope>, TransportError> {
        match self.reader.next_line().await? {
            Some(line) => Ok(Some(decode_envelope(&line)?)),
            None => Ok(None),
        }
    }

    /// 带超时的接收。超时返回 `TransportError::Timeout`，连接仍然可用。
    pub async fn recv_timeout(&mut self, wait: Duration) -> Result<Option<Envelope>, TransportError> {
        match tokio::time::timeout(wait, self.recv()).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }

    /// 主动关闭写方向，服务器会读到 EOF。
    pub async fn shutdown(&mut self) -> Result<(), TransportError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
