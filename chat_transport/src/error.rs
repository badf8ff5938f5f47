// chat_transport/src/error.rs

//! 定义传输工具库相关的错误类型。

use thiserror::Error;

/// 传输层的统一错误类型，覆盖读写、分帧与出站队列。
#[derive(Error, Debug)]
pub enum TransportError {
    /// 底层 I/O 错误。
    #[error("I/O错误: {0}")]
    Io(#[from] std::io::Error),

    /// 当 serde 序列化失败时返回。
    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 单行长度超过上限，超长部分已被丢弃直到下一个换行符。
    #[error("行长度超过上限 {limit} 字节")]
    LineTooLong { limit: usize },

    /// 一行内容不是合法的 UTF-8。
    #[error("行内容不是合法的 UTF-8")]
    InvalidUtf8,

    /// 出站通道已关闭 (写任务已退出或连接已被关闭)。
    #[error("发送错误: 通道已关闭")]
    ChannelClosed,

    /// 出站队列已满，本条消息被丢弃。
    #[error("发送错误: 出站队列已满")]
    QueueFull,

    /// 等待对端数据超时 (仅客户端工具使用)。
    #[error("等待数据超时")]
    Timeout,

    /// 收到的一行无法解码为 `Envelope` (仅客户端工具使用)。
    #[error("解码错误: {0}")]
    Decode(#[from] DecodeError),
}

impl TransportError {
    /// 单行级别的分帧错误：该行被丢弃，但连接仍可继续读取。
    pub fn is_frame_error(&self) -> bool {
        matches!(self, TransportError::LineTooLong { .. } | TransportError::InvalidUtf8)
    }
}

/// 把一行文本解码为 `Envelope` 时可能出现的错误。
#[derive(Error, Debug)]
pub enum DecodeError {
    /// 不是合法的 JSON 对象。
    #[error("JSON 格式错误: {0}")]
    Malformed(String),

    /// 合法 JSON，但缺少字符串类型的 `type` 字段。
    #[error("缺少 type 字段")]
    MissingType,

    /// `type` 不是协议已知的判别符。
    #[error("未知的消息类型: {0}")]
    UnknownType(String),

    /// `type` 已知，但其余字段与该类型的载荷不匹配。
    #[error("消息类型 {message_type} 的载荷无效: {source}")]
    InvalidPayload {
        message_type: String,
        #[source]
        source: serde_json::Error,
    },
}

impl DecodeError {
    /// 若已识别出判别符，返回它。
    pub fn message_type(&self) -> Option<&str> {
        match self {
            DecodeError::UnknownType(t) => Some(t),
            DecodeError::InvalidPayload { message_type, .. } => Some(message_type),
            _ => None,
        }
    }
}
