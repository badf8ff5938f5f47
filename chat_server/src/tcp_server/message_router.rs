// chat_server/src/tcp_server/message_router.rs

//! 负责把已认证用户发来的私聊/群聊消息路由到当前在线的接收方。
//!
//! 投递是尽力而为的：接收方离线不是错误，持久化失败只记录日志，
//! 单个接收方推送失败不影响其他接收方。

use std::sync::Arc;

use chat_models::payloads::{now_millis, ChatGroupReceive, ChatGroupSend, ChatPrivateReceive, ChatPrivateSend, Envelope};
use chat_models::{GroupMessage, PrivateMessage, UserId};
use chat_transport::message::encode_envelope;
use log::{debug, error, info, warn};

use crate::db::{GroupDirectory, MessageStore};
use crate::tcp_server::session_registry::SessionRegistry;

/// 私聊路由的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivateRouteOutcome {
    /// 已放入接收方的出站队列
    Delivered,
    /// 接收方不在线 (或其通道已不可用)
    RecipientOffline,
    /// 缺少接收方或内容，未推送
    Rejected,
}

/// 群聊路由的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupRouteOutcome {
    /// 缺少群 ID 或内容
    Rejected,
    /// 发送者不是群成员，或成员检查失败
    NotMember,
    /// 已向在线成员扇出 (不含发送者)
    Fanout { delivered: usize, offline: usize },
}

pub struct MessageRouter {
    registry: Arc<SessionRegistry>,
    messages: Arc<dyn MessageStore>,
    groups: Arc<dyn GroupDirectory>,
}

/// 客户端没有给出有效时间戳时使用服务器当前时间。
fn effective_timestamp(client_timestamp: i64) -> i64 {
    if client_timestamp > 0 {
        client_timestamp
    } else {
        now_millis()
    }
}

impl MessageRouter {
    pub fn new(registry: Arc<SessionRegistry>, messages: Arc<dyn MessageStore>, groups: Arc<dyn GroupDirectory>) -> Self {
        Self {
            registry,
            messages,
            groups,
        }
    }

    /// 路由一条私聊消息。`sender` 是连接的认证身份，客户端填写的 `fromUserId` 被忽略。
    pub async fn route_private(&self, sender: UserId, send: ChatPrivateSend) -> PrivateRouteOutcome {
        if let Some(claimed) = send.from_user_id {
            if claimed != sender {
                warn!("[MessageRouter] 用户 {} 发送的私聊声称来自 {}，已改写为会话身份", sender, claimed);
            }
        }

        let message = PrivateMessage {
            from_user_id: sender,
            to_user_id: send.to_user_id,
            content: send.content.unwrap_or_default(),
            content_type: send.content_type.unwrap_or_default(),
            file: send.file,
            timestamp: effective_timestamp(send.timestamp),
        };

        // 无效消息同样尝试持久化
        if let Err(e) = self.messages.persist_private_message(&message).await {
            warn!("[MessageRouter] 保存用户 {} 的私聊消息失败: {}，继续投递", sender, e);
        }

        let to_user_id = match message.to_user_id {
            Some(to) if !message.content.is_empty() => to,
            _ => {
                debug!("[MessageRouter] 用户 {} 的私聊缺少接收方或内容，不推送", sender);
                return PrivateRouteOutcome::Rejected;
            }
        };

        let Some(channel) = self.registry.lookup(to_user_id) else {
            debug!("[MessageRouter] 用户 {} 不在线，私聊消息仅保存", to_user_id);
            return PrivateRouteOutcome::RecipientOffline;
        };

        let envelope = Envelope::ChatPrivateReceive(ChatPrivateReceive::from_message(&message, to_user_id));
        match channel.send(&envelope) {
            Ok(()) => {
                debug!("[MessageRouter] 私聊 {} -> {} 已投递", sender, to_user_id);
                PrivateRouteOutcome::Delivered
            }
            Err(e) => {
                warn!("[MessageRouter] 向用户 {} 推送私聊失败: {}", to_user_id, e);
                PrivateRouteOutcome::RecipientOffline
            }
        }
    }

    /// 路由一条群聊消息：校验成员资格、持久化，再推送给除发送者外的每个在线成员。
    pub async fn route_group(&self, sender: UserId, send: ChatGroupSend) -> GroupRouteOutcome {
        let (Some(group_id), Some(content)) = (send.group_id, send.content.filter(|c| !c.is_empty())) else {
            debug!("[MessageRouter] 用户 {} 的群聊缺少群 ID 或内容，已丢弃", sender);
            return GroupRouteOutcome::Rejected;
        };

        match self.groups.is_group_member(group_id, sender).await {
            Ok(true) => {}
            Ok(false) => {
                warn!("[MessageRouter] 用户 {} 不是群 {} 的成员，消息已丢弃", sender, group_id);
                return GroupRouteOutcome::NotMember;
            }
            Err(e) => {
                error!("[MessageRouter] 检查用户 {} 的群 {} 成员资格失败: {}，消息已丢弃", sender, group_id, e);
                return GroupRouteOutcome::NotMember;
            }
        }

        let message = GroupMessage {
            from_user_id: sender,
            group_id,
            content,
            content_type: send.content_type.unwrap_or_default(),
            file: send.file,
            timestamp: effective_timestamp(send.timestamp),
        };

        let message_id = match self.messages.persist_group_message(&message).await {
            Ok(id) => Some(id),
            Err(e) => {
                error!("[MessageRouter] 保存群 {} 的消息失败: {}，仍继续投递", group_id, e);
                None
            }
        };

        let members = match self.groups.get_group_members(group_id).await {
            Ok(members) => members,
            Err(e) => {
                error!("[MessageRouter] 获取群 {} 成员列表失败: {}", group_id, e);
                return GroupRouteOutcome::Fanout { delivered: 0, offline: 0 };
            }
        };

        let envelope = Envelope::ChatGroupReceive(ChatGroupReceive::from_message(&message, message_id));
        let line = match encode_envelope(&envelope) {
            Ok(line) => line,
            Err(e) => {
                error!("[MessageRouter] 编码群 {} 的推送消息失败: {}", group_id, e);
                return GroupRouteOutcome::Fanout { delivered: 0, offline: 0 };
            }
        };

        let mut delivered = 0;
        let mut offline = 0;
        for member in members.into_iter().filter(|m| *m != sender) {
            match self.registry.lookup(member) {
                Some(channel) => match channel.send_line(line.clone()) {
                    Ok(()) => delivered += 1,
                    Err(e) => {
                        warn!("[MessageRouter] 向群 {} 成员 {} 推送失败: {}", group_id, member, e);
                        offline += 1;
                    }
                },
                None => offline += 1,
            }
        }

        info!(
            "[MessageRouter] 群 {} 消息 (id {:?}) 来自用户 {}: 在线投递 {} 人, 离线 {} 人",
            group_id, message_id, sender, delivered, offline
        );
        GroupRouteOutcome::Fanout { delivered, offline }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chat_models::ContentType;
    use chat_transport::frame::LineReader;
    use chat_transport::message::decode_envelope;
    use chat_transport::outbound::{outbound_channel, spawn_writer};
    use tokio::io::DuplexStream;

    use crate::config::{SeedData, SeedGroup, SeedUser};
    use crate::db::MemoryStore;

    fn seed() -> SeedData {
        SeedData {
            users: vec![
                SeedUser::new(1, "u1", "p1"),
                SeedUser::new(2, "u2", "p2"),
                SeedUser::new(3, "u3", "p3"),
                SeedUser::new(4, "u4", "p4"),
                SeedUser::new(7, "u7", "p7"),
                SeedUser::new(42, "u42", "p42"),
            ],
            groups: vec![SeedGroup {
                id: 9,
                name: "nine".to_string(),
                avatar: None,
                members: vec![1, 2, 3],
            }],
            friendships: vec![],
        }
    }

    fn setup() -> (Arc<SessionRegistry>, Arc<MemoryStore>, MessageRouter) {
        let registry = Arc::new(SessionRegistry::new());
        let store = Arc::new(MemoryStore::from_seed(&seed()));
        let router = MessageRouter::new(registry.clone(), store.clone(), store.clone());
        (registry, store, router)
    }

    /// 为用户登记一个真实的出站通道，返回可以读取推送内容的一端。
    fn attach(registry: &SessionRegistry, user_id: UserId) -> LineReader<DuplexStream> {
        let (channel, receiver) = outbound_channel(16);
        let (client, server) = tokio::io::duplex(16 * 1024);
        spawn_writer(server, receiver);
        registry.register(user_id, channel);
        LineReader::new(client, 64 * 1024)
    }

    async fn next_envelope(reader: &mut LineReader<DuplexStream>) -> Option<Envelope> {
        match tokio::time::timeout(Duration::from_millis(500), reader.next_line()).await {
            Ok(Ok(Some(line))) => Some(decode_envelope(&line).expect("推送内容应可解码")),
            _ => None,
        }
    }

    #[tokio::test]
    /// 伪造的 fromUserId 被改写为会话身份后投递给在线接收方。
    async fn test_private_delivery_overwrites_sender() {
        let (registry, store, router) = setup();
        let mut receiver = attach(&registry, 7);

        let outcome = router
            .route_private(
                42,
                ChatPrivateSend {
                    from_user_id: Some(99),
                    to_user_id: Some(7),
                    content: Some("hi".to_string()),
                    timestamp: 123,
                    ..ChatPrivateSend::default()
                },
            )
            .await;
        assert_eq!(outcome, PrivateRouteOutcome::Delivered);

        match next_envelope(&mut receiver).await {
            Some(Envelope::ChatPrivateReceive(msg)) => {
                assert_eq!(msg.from_user_id, 42);
                assert_eq!(msg.to_user_id, 7);
                assert_eq!(msg.content, "hi");
                assert_eq!(msg.content_type, ContentType::Text);
                assert_eq!(msg.timestamp, 123);
            }
            other => panic!("预期收到私聊推送，实际为 {:?}", other),
        }
        assert_eq!(store.private_persist_calls(), 1);
    }

    #[tokio::test]
    /// 协议未列出的 contentType 按客户端原值转发与保存。
    async fn test_unknown_content_type_relayed_verbatim() {
        let (registry, store, router) = setup();
        let (channel, receiver) = outbound_channel(16);
        let (client, server) = tokio::io::duplex(16 * 1024);
        spawn_writer(server, receiver);
        registry.register(7, channel);
        let mut raw = LineReader::new(client, 64 * 1024);

        let line = r#"{"type":"chat_private_send","toUserId":7,"content":"x","contentType":"sticker"}"#;
        let Ok(Envelope::ChatPrivateSend(send)) = decode_envelope(line) else {
            panic!("私聊发送应可解码");
        };
        assert_eq!(router.route_private(1, send).await, PrivateRouteOutcome::Delivered);

        let pushed = tokio::time::timeout(Duration::from_millis(500), raw.next_line())
            .await
            .expect("等待推送超时")
            .unwrap()
            .expect("应收到一行推送");
        assert!(pushed.contains(r#""contentType":"sticker""#), "{}", pushed);

        let stored = store.stored_messages().await;
        assert_eq!(stored[0].content_type, ContentType::Other("sticker".to_string()));
    }

    #[tokio::test]
    /// 接收方离线时消息只被保存一次，没有错误。
    async fn test_private_offline_persists_once() {
        let (_registry, store, router) = setup();
        let outcome = router
            .route_private(
                42,
                ChatPrivateSend {
                    to_user_id: Some(7),
                    content: Some("later".to_string()),
                    ..ChatPrivateSend::default()
                },
            )
            .await;
        assert_eq!(outcome, PrivateRouteOutcome::RecipientOffline);
        assert_eq!(store.private_persist_calls(), 1);

        let stored = store.stored_messages().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].sender_id, 42);
        assert!(stored[0].timestamp > 0, "缺省的时间戳应由服务器补齐");
    }

    #[tokio::test]
    /// 缺少接收方或内容的私聊不推送，但仍尝试持久化。
    async fn test_private_rejected_still_persisted() {
        let (registry, store, router) = setup();
        let mut receiver = attach(&registry, 7);

        let outcome = router
            .route_private(
                42,
                ChatPrivateSend {
                    to_user_id: Some(7),
                    content: Some(String::new()),
                    ..ChatPrivateSend::default()
                },
            )
            .await;
        assert_eq!(outcome, PrivateRouteOutcome::Rejected);

        let outcome = router.route_private(42, ChatPrivateSend::default()).await;
        assert_eq!(outcome, PrivateRouteOutcome::Rejected);

        assert_eq!(store.private_persist_calls(), 2);
        assert!(next_envelope(&mut receiver).await.is_none());
    }

    #[tokio::test]
    /// 持久化失败不影响在线投递。
    async fn test_private_persist_failure_does_not_block_delivery() {
        let (registry, store, router) = setup();
        let mut receiver = attach(&registry, 7);
        store.set_persistence_failure(true);

        let outcome = router
            .route_private(
                42,
                ChatPrivateSend {
                    to_user_id: Some(7),
                    content: Some("still here".to_string()),
                    ..ChatPrivateSend::default()
                },
            )
            .await;
        assert_eq!(outcome, PrivateRouteOutcome::Delivered);
        assert!(matches!(next_envelope(&mut receiver).await, Some(Envelope::ChatPrivateReceive(_))));
    }

    #[tokio::test]
    /// 群 9 = {1,2,3}，1 与 2 在线：只有 2 收到，携带生成的消息 ID。
    async fn test_group_fanout_excludes_sender() {
        let (registry, store, router) = setup();
        let mut sender = attach(&registry, 1);
        let mut member = attach(&registry, 2);
        let mut outsider = attach(&registry, 4);

        let outcome = router
            .route_group(
                1,
                ChatGroupSend {
                    group_id: Some(9),
                    content: Some("hello group".to_string()),
                    ..ChatGroupSend::default()
                },
            )
            .await;
        assert_eq!(outcome, GroupRouteOutcome::Fanout { delivered: 1, offline: 1 });

        match next_envelope(&mut member).await {
            Some(Envelope::ChatGroupReceive(msg)) => {
                assert_eq!(msg.group_id, 9);
                assert_eq!(msg.from_user_id, 1);
                assert!(msg.id.is_some(), "推送应携带生成的消息 ID");
            }
            other => panic!("成员 2 应收到群消息，实际为 {:?}", other),
        }
        assert!(next_envelope(&mut sender).await.is_none(), "发送者不应收到自己的群消息");
        assert!(next_envelope(&mut outsider).await.is_none(), "非成员不应收到群消息");
        assert_eq!(store.group_persist_calls(), 1);
    }

    #[tokio::test]
    /// 非成员发送的群消息被丢弃，不持久化也不推送。
    async fn test_group_non_member_dropped() {
        let (registry, store, router) = setup();
        let mut member = attach(&registry, 2);

        let outcome = router
            .route_group(
                4,
                ChatGroupSend {
                    group_id: Some(9),
                    content: Some("let me in".to_string()),
                    ..ChatGroupSend::default()
                },
            )
            .await;
        assert_eq!(outcome, GroupRouteOutcome::NotMember);
        assert_eq!(store.group_persist_calls(), 0);
        assert!(next_envelope(&mut member).await.is_none());

        store.set_membership_failure(true);
        let outcome = router
            .route_group(
                1,
                ChatGroupSend {
                    group_id: Some(9),
                    content: Some("x".to_string()),
                    ..ChatGroupSend::default()
                },
            )
            .await;
        assert_eq!(outcome, GroupRouteOutcome::NotMember);
    }

    #[tokio::test]
    /// 群消息持久化失败时仍投递，只是没有消息 ID。
    async fn test_group_persist_failure_delivers_without_id() {
        let (registry, store, router) = setup();
        let mut member = attach(&registry, 3);
        store.set_persistence_failure(true);

        let outcome = router
            .route_group(
                2,
                ChatGroupSend {
                    group_id: Some(9),
                    content: Some("no id".to_string()),
                    ..ChatGroupSend::default()
                },
            )
            .await;
        assert_eq!(outcome, GroupRouteOutcome::Fanout { delivered: 1, offline: 1 });
        match next_envelope(&mut member).await {
            Some(Envelope::ChatGroupReceive(msg)) => assert_eq!(msg.id, None),
            other => panic!("成员 3 应收到群消息，实际为 {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_group_missing_fields_rejected() {
        let (_registry, store, router) = setup();
        let outcome = router
            .route_group(
                1,
                ChatGroupSend {
                    content: Some("where".to_string()),
                    ..ChatGroupSend::default()
                },
            )
            .await;
        assert_eq!(outcome, GroupRouteOutcome::Rejected);
        assert_eq!(store.group_persist_calls(), 0);
    }
}
