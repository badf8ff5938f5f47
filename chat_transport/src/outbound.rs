// chat_transport/src/outbound.rs

//! 每个连接的出站通道与写任务。
//!
//! 任意任务都可以通过克隆的 `OutboundChannel` 向某个连接推送消息；
//! 真正写 socket 的只有该连接自己的写任务 (`spawn_writer`)，
//! 所以每条消息都以完整的一行写出，不会与其他消息交错。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chat_models::payloads::Envelope;
use log::{debug, warn};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::TransportError;
use crate::message::encode_envelope;

/// 出站队列默认容量。
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

#[derive(Debug)]
struct CloseSignal {
    closed: AtomicBool,
    notify: Notify,
}

/// 某个连接的出站通道句柄，可以廉价克隆并跨任务共享。
///
/// 每个通道带有一个唯一的 `connection_id`，
/// 会话注册表用它判断"注册表中的通道是否仍是调用者自己的那一个"。
#[derive(Debug, Clone)]
pub struct OutboundChannel {
    connection_id: Uuid,
    sender: mpsc::Sender<String>,
    shutdown: Arc<CloseSignal>,
}

/// 写任务持有的接收端。
#[derive(Debug)]
pub struct OutboundReceiver {
    connection_id: Uuid,
    receiver: mpsc::Receiver<String>,
    shutdown: Arc<CloseSignal>,
}

/// 创建一对出站通道与接收端。`capacity` 为 0 时按 1 处理。
pub fn outbound_channel(capacity: usize) -> (OutboundChannel, OutboundReceiver) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let connection_id = Uuid::new_v4();
    let shutdown = Arc::new(CloseSignal {
        closed: AtomicBool::new(false),
        notify: Notify::new(),
    });
    (
        OutboundChannel {
            connection_id,
            sender,
            shutdown: shutdown.clone(),
        },
        OutboundReceiver {
            connection_id,
            receiver,
            shutdown,
        },
    )
}

impl OutboundChannel {
    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    /// 两个句柄是否指向同一个物理连接。
    pub fn same_channel(&self, other: &OutboundChannel) -> bool {
        self.connection_id == other.connection_id
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.closed.load(Ordering::Acquire) || self.sender.is_closed()
    }

    /// 把一条 `Envelope` 编码为一行并放入出站队列，不等待。
    ///
    /// 队列已满时返回 `QueueFull`，消息被丢弃；通道关闭后返回 `ChannelClosed`。
    pub fn send(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let line = encode_envelope(envelope)?;
        self.send_line(line)
    }

    /// 放入一行已编码的文本，必要时补上结尾的 `\n`。
    pub fn send_line(&self, mut line: String) -> Result<(), TransportError> {
        if self.shutdown.closed.load(Ordering::Acquire) {
            return Err(TransportError::ChannelClosed);
        }
        if !line.ends_with('\n') {
            line.push('\n');
        }
        self.sender.try_send(line).map_err(|e| match e {
            TrySendError::Full(_) => TransportError::QueueFull,
            TrySendError::Closed(_) => TransportError::ChannelClosed,
        })
    }

    /// 关闭通道：不再接受新消息，写任务写完已排队的消息后关闭写端。可重复调用。
    pub fn close(&self) {
        if !self.shutdown.closed.swap(true, Ordering::AcqRel) {
            self.shutdown.notify.notify_one();
        }
    }
}

impl OutboundReceiver {
    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }
}

/// 为一个连接启动写任务。
///
/// 写任务在以下情况退出：通道被 `close()` (先写完队列中剩余的消息)、
/// 所有发送端都已释放、或写 socket 失败。退出前关闭写端。
pub fn spawn_writer<W>(mut writer: W, outbound: OutboundReceiver) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let OutboundReceiver {
            connection_id,
            mut receiver,
            shutdown,
        } = outbound;
        let mut written: u64 = 0;

        loop {
            tokio::select! {
                biased;
                maybe_line = receiver.recv() => {
                    match maybe_line {
                        Some(line) => {
                            if let Err(e) = write_line(&mut writer, &line).await {
                                warn!("[写任务 {}] 写入 socket 失败: {}，写任务退出", connection_id, e);
                                break;
                            }
                            written += 1;
                        }
                        None => {
                            debug!("[写任务 {}] 所有发送端已释放", connection_id);
                            break;
                        }
                    }
                }
                _ = shutdown.notify.notified() => {
                    receiver.close();
                    while let Ok(line) = receiver.try_recv() {
                        if write_line(&mut writer, &line).await.is_err() {
                            break;
                        }
                        written += 1;
                    }
                    debug!("[写任务 {}] 收到关闭信号，剩余消息已写出", connection_id);
                    break;
                }
            }
        }

        shutdown.closed.store(true, Ordering::Release);
        if let Err(e) = writer.shutdown().await {
            debug!("[写任务 {}] 关闭写端时出错 (可忽略): {}", connection_id, e);
        }
        debug!("[写任务 {}] 已退出，共写出 {} 行", connection_id, written);
    })
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}
