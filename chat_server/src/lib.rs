//! `chat_server` 聊天服务端核心库。
//!
//! 接受客户端的长连接，完成认证后把私聊与群聊消息路由给在线的接收方。
//! 认证、持久化、群组与用户目录等能力通过 `db` 中的协作方接口访问。
//!
//! 主要模块包括：
//! - `config`: 应用配置的加载与保存。
//! - `db`: 协作方接口与内存实现 `MemoryStore`。
//! - `error`: 应用特定的错误类型。
//! - `tcp_server`: 会话注册表、连接生命周期、分发器、路由器与服务入口。

pub mod config;
pub mod db;
pub mod error;
pub mod tcp_server;
