// chat_transport/src/server/mod.rs

//! 服务端模块：TCP 监听与连接接受循环。
//!
//! `transport` 子模块提供 `LineServer`，它只负责接受连接，
//! 每个连接的读写与业务处理交给上层传入的回调。

pub mod transport;
