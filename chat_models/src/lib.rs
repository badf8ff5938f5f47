//! `chat_models` 公共模型库 crate。
//!
//! 本 crate 集中定义了聊天服务端与其客户端之间共享的数据结构与枚举类型：
//! - **线上载荷 (`payloads`)**: 每一种 `type` 判别符对应的载荷结构体，以及把它们收拢起来的 `Envelope` 标签枚举。
//! - **消息记录 (`message_models`)**: 路由器交给持久化协作方的私聊/群聊记录，以及用户、群组、消息的 ID 类型。
//! - **通用枚举 (`enums`)**: 内容类型 (`ContentType`) 与会话类型 (`ChatType`)。
//!
//! 所有模型都派生 `Serialize`/`Deserialize`、`Debug` 与 `Clone`。

pub mod enums; // 通用枚举
pub mod message_models; // 私聊/群聊消息记录与 ID 类型
pub mod payloads; // 线上载荷与 Envelope

pub use enums::{ChatType, ContentType};
pub use message_models::{FileMeta, FriendRequestId, GroupId, GroupMessage, MessageId, PrivateMessage, UserId};
pub use payloads::Envelope;
