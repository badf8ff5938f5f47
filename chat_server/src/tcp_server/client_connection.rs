use std::net::SocketAddr;
use std::sync::Arc;

use chat_models::payloads::Envelope;
use chat_models::UserId;
use chat_transport::outbound::OutboundChannel;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use uuid::Uuid;

use crate::tcp_server::session_registry::SessionRegistry;

/// 连接的生命周期状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unauthenticated,
    Authenticated { user_id: UserId },
    Closed,
}

/// 一个物理连接从接受到关闭的全部状态。
///
/// 负责在认证成功时把自己的出站通道登记到会话注册表，
/// 并在关闭时 (`teardown`，也由 `Drop` 触发) 只注销属于自己的那一项。
#[derive(Debug)]
pub struct ClientConnection {
    connection_id: Uuid,
    addr: SocketAddr,
    state: ConnectionState,
    channel: OutboundChannel,
    registry: Arc<SessionRegistry>,
    creation_time: DateTime<Utc>,
}

impl ClientConnection {
    pub fn new(addr: SocketAddr, channel: OutboundChannel, registry: Arc<SessionRegistry>) -> Self {
        Self {
            connection_id: channel.connection_id(),
            addr,
            state: ConnectionState::Unauthenticated,
            channel,
            registry,
            creation_time: Utc::now(),
        }
    }

    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// 已认证时返回会话身份。
    pub fn user_id(&self) -> Option<UserId> {
        match self.state {
            ConnectionState::Authenticated { user_id } => Some(user_id),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    /// 向本连接发送一条消息。失败只记录日志，返回是否已放入出站队列。
    pub fn send(&self, envelope: &Envelope) -> bool {
        match self.channel.send(envelope) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "[连接 {}] 向 {} 发送 {} 失败: {}",
                    self.connection_id,
                    self.addr,
                    envelope.message_type(),
                    e
                );
                false
            }
        }
    }

    /// 认证成功：登记到会话注册表并进入 `Authenticated` 状态。
    ///
    /// 本连接此前以另一个身份登录时，先注销旧身份。
    /// 同一用户在其他连接上的旧会话被直接替换，那个连接不会被关闭。
    pub fn authenticate(&mut self, user_id: UserId) {
        if self.is_closed() {
            warn!("[连接 {}] 已关闭的连接不能再认证", self.connection_id);
            return;
        }
        if let ConnectionState::Authenticated { user_id: previous_user } = self.state {
            if previous_user != user_id {
                info!(
                    "[连接 {}] 身份由用户 {} 切换为用户 {}",
                    self.connection_id, previous_user, user_id
                );
                self.registry.unregister(previous_user, &self.channel);
            }
        }

        if let Some(previous) = self.registry.register(user_id, self.channel.clone()) {
            if !previous.same_channel(&self.channel) {
                warn!(
                    "[连接 {}] 用户 {} 在新连接上重复登录，旧连接 {} 不再接收推送但不会被关闭",
                    self.connection_id,
                    user_id,
                    previous.connection_id()
                );
            }
        }
        self.state = ConnectionState::Authenticated { user_id };
    }

    /// 关闭连接：注销会话 (仅当注册表中仍是本连接) 并关闭出站通道。
    ///
    /// 只执行一次，重复调用无效果。
    pub fn teardown(&mut self) {
        let previous = std::mem::replace(&mut self.state, ConnectionState::Closed);
        match previous {
            ConnectionState::Closed => return,
            ConnectionState::Authenticated { user_id } => {
                self.registry.unregister(user_id, &self.channel);
            }
            ConnectionState::Unauthenticated => {}
        }
        self.channel.close();

        let lifetime = Utc::now().signed_duration_since(self.creation_time);
        info!(
            "[连接 {}] 来自 {} 的连接已关闭 (持续 {} 毫秒, 关闭前状态 {:?})",
            self.connection_id,
            self.addr,
            lifetime.num_milliseconds(),
            previous
        );
    }
}

impl Drop for ClientConnection {
    fn drop(&mut self) {
        if !self.is_closed() {
            debug!("[连接 {}] 在 Drop 中执行清理", self.connection_id);
        }
        self.teardown();
    }
}
