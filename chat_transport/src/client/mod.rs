// chat_transport/src/client/mod.rs

//! 客户端模块：以行协议连接服务器、收发 `Envelope`。
//! 主要供集成测试和调试工具使用。

pub mod transport;
