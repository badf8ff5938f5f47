use chat_transport::error::TransportError;
use thiserror::Error;

/// 协作方 (认证、持久化、群组与用户目录) 返回的错误。
///
/// 这些错误从不会导致连接断开：调用方记录日志后降级处理
/// (跳过持久化、丢弃消息或回复 `success: false`)。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("存储后端不可用: {0}")]
    Unavailable(String),

    #[error("数据无效: {0}")]
    Invalid(String),
}

/// 应用的主要错误类型
#[derive(Error, Debug)]
pub enum AppError {
    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("传输错误: {0}")]
    Transport(#[from] TransportError),
}
