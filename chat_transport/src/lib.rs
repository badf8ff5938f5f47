//! `chat_transport` 提供聊天服务所用的行协议传输工具。
//!
//! 线上格式是"每行一个 JSON 对象"，`\n` 为帧分隔符。
//!
//! 主要模块包括：
//! - `frame`: 行分帧读取器 `LineReader`。
//! - `message`: `Envelope` 与单行文本之间的编码/解码。
//! - `outbound`: 每个连接的出站通道 `OutboundChannel` 与单写者写任务。
//! - `error`: 库中使用的错误类型 `TransportError` 与 `DecodeError`。
//! - `server`: TCP 监听与接受循环 `LineServer`。
//! - `client`: 测试与调试用的客户端 `LineClient`。

pub mod client;
pub mod error;
pub mod frame;
pub mod message;
pub mod outbound;
pub mod server;

pub use error::{DecodeError, TransportError};
pub use frame::LineReader;
pub use outbound::{outbound_channel, spawn_writer, OutboundChannel, OutboundReceiver};
