// chat_server/src/tcp_server/session_registry.rs

//! 会话注册表：`userId -> 出站通道`。

use chat_models::UserId;
use chat_transport::outbound::OutboundChannel;
use dashmap::DashMap;
use log::{debug, info};

/// 进程内所有在线会话的表，每个用户最多对应一个出站通道。
///
/// 由 `main` (或测试) 构造后以 `Arc<SessionRegistry>` 显式传递给连接与路由器。
/// 所有操作都基于 `DashMap` 的分片锁完成，单个操作对其他任务要么完全可见要么完全不可见。
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<UserId, OutboundChannel>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// 插入或替换用户的出站通道，返回被替换掉的旧通道 (若有)。
    ///
    /// 旧通道不会被关闭或清空，它所属的连接继续存在，只是不再接收推送。
    pub fn register(&self, user_id: UserId, channel: OutboundChannel) -> Option<OutboundChannel> {
        let connection_id = channel.connection_id();
        let previous = self.sessions.insert(user_id, channel);
        info!(
            "[会话注册表] 用户 {} 已注册 (连接 {})，当前在线 {} 人",
            user_id,
            connection_id,
            self.sessions.len()
        );
        previous
    }

    /// 仅当注册表中该用户的通道就是 `channel` 时才移除，返回是否移除。
    ///
    /// 同一用户在新连接上重新登录后，旧连接的清理不会误删新会话。
    pub fn unregister(&self, user_id: UserId, channel: &OutboundChannel) -> bool {
        let removed = self
            .sessions
            .remove_if(&user_id, |_, stored| stored.same_channel(channel))
            .is_some();
        if removed {
            info!(
                "[会话注册表] 用户 {} 已注销 (连接 {})，当前在线 {} 人",
                user_id,
                channel.connection_id(),
                self.sessions.len()
            );
        } else {
            debug!(
                "[会话注册表] 用户 {} 的注销请求被忽略：连接 {} 已不是当前会话",
                user_id,
                channel.connection_id()
            );
        }
        removed
    }

    /// 查找用户的出站通道；`None` 表示离线。
    pub fn lookup(&self, user_id: UserId) -> Option<OutboundChannel> {
        self.sessions.get(&user_id).map(|entry| entry.value().clone())
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.sessions.contains_key(&user_id)
    }

    pub fn online_count(&self) -> usize {
        self.sessions.len()
    }
}
