//! 聊天服务的 TCP 服务端。
//!
//! - `session_registry`: 在线会话表 `userId -> 出站通道`。
//! - `client_connection`: 单个连接的生命周期与状态机。
//! - `dispatcher`: 把一行文本解码并分发给对应的处理函数。
//! - `message_router`: 私聊/群聊消息的路由与投递。
//! - `query_handlers`: 历史、好友、群组与用户资料查询。
//! - `account_handlers`: 注册与好友请求。
//! - `service`: 监听端口并为每个连接运行读循环。

pub mod account_handlers;
pub mod client_connection;
pub mod dispatcher;
pub mod message_router;
pub mod query_handlers;
pub mod service;
pub mod session_registry;
