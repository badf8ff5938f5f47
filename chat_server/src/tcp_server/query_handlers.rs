// chat_server/src/tcp_server/query_handlers.rs

//! 只读查询：历史消息、好友列表、群组列表与用户资料。
//!
//! 每个请求总会得到对应类型的响应；协作方出错时以 `success: false`
//! (或空列表) 回复，连接保持不变。

use std::sync::Arc;

use chat_models::payloads::{
    ChatHistoryRequest, ChatHistoryResponse, FriendItem, FriendListResponse, GroupItem, GroupListResponse,
    HistoryMessageItem, UserInfoResponse,
};
use chat_models::{ChatType, UserId};
use log::{debug, error, warn};

use crate::config::ServerConfig;
use crate::db::{Collaborators, HistoryQuery, StoredMessage};
use crate::tcp_server::session_registry::SessionRegistry;

pub struct QueryHandlers {
    registry: Arc<SessionRegistry>,
    collaborators: Collaborators,
    default_history_limit: u32,
    max_history_limit: u32,
}

impl QueryHandlers {
    pub fn new(registry: Arc<SessionRegistry>, collaborators: Collaborators, settings: &ServerConfig) -> Self {
        let max_history_limit = settings.max_history_limit.max(1);
        Self {
            registry,
            collaborators,
            default_history_limit: settings.default_history_limit.clamp(1, max_history_limit),
            max_history_limit,
        }
    }

    /// 把请求中的 limit 收敛到 `[1, max_history_limit]`，缺省时使用默认值。
    fn history_limit(&self, requested: Option<u32>) -> usize {
        let limit = requested.unwrap_or(self.default_history_limit);
        limit.clamp(1, self.max_history_limit) as usize
    }

    pub async fn chat_history(&self, user_id: UserId, request: ChatHistoryRequest) -> ChatHistoryResponse {
        let Some(chat_type) = request.chat_type.as_deref().and_then(ChatType::from_wire) else {
            debug!("[查询] 用户 {} 的历史请求 chatType 无效: {:?}", user_id, request.chat_type);
            return ChatHistoryResponse::failure(None, "无效的会话类型");
        };
        let query = HistoryQuery {
            limit: self.history_limit(request.limit),
            before_timestamp: request.before_timestamp,
        };

        let result = match chat_type {
            ChatType::Private => {
                let Some(target) = request.target_user_id else {
                    return ChatHistoryResponse::failure(Some(chat_type), "缺少 targetUserId");
                };
                self.collaborators.messages.private_history(user_id, target, query).await
            }
            ChatType::Group => {
                let Some(group_id) = request.group_id else {
                    return ChatHistoryResponse::failure(Some(chat_type), "缺少 groupId");
                };
                match self.collaborators.groups.is_group_member(group_id, user_id).await {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!("[查询] 用户 {} 不是群 {} 的成员，拒绝查询历史", user_id, group_id);
                        return ChatHistoryResponse::failure(Some(chat_type), "不是该群成员");
                    }
                    Err(e) => {
                        error!("[查询] 检查群 {} 成员资格失败: {}", group_id, e);
                        return ChatHistoryResponse::failure(Some(chat_type), "查询失败");
                    }
                }
                self.collaborators.messages.group_history(group_id, query).await
            }
        };

        match result {
            Ok(messages) => ChatHistoryResponse {
                chat_type: Some(chat_type),
                success: true,
                message: String::new(),
                messages: messages.into_iter().map(history_item).collect(),
            },
            Err(e) => {
                error!("[查询] 用户 {} 查询 {} 历史失败: {}", user_id, chat_type, e);
                ChatHistoryResponse::failure(Some(chat_type), "查询失败")
            }
        }
    }

    pub async fn friend_list(&self, user_id: UserId) -> FriendListResponse {
        match self.collaborators.users.friend_list(user_id).await {
            Ok(friends) => FriendListResponse {
                friends: friends
                    .into_iter()
                    .map(|profile| FriendItem {
                        online: self.registry.is_online(profile.uid),
                        uid: profile.uid,
                        username: profile.username,
                        avatar_url: profile.avatar_url,
                    })
                    .collect(),
            },
            Err(e) => {
                error!("[查询] 获取用户 {} 的好友列表失败: {}", user_id, e);
                FriendListResponse::default()
            }
        }
    }

    pub async fn group_list(&self, user_id: UserId) -> GroupListResponse {
        match self.collaborators.groups.list_groups(user_id).await {
            Ok(groups) => GroupListResponse {
                groups: groups
                    .into_iter()
                    .map(|g| GroupItem {
                        id: g.id,
                        name: g.name,
                        avatar: g.avatar,
                    })
                    .collect(),
            },
            Err(e) => {
                error!("[查询] 获取用户 {} 的群组列表失败: {}", user_id, e);
                GroupListResponse::default()
            }
        }
    }

    /// 查询用户资料；请求未指定 `userId` 时查询自己。
    pub async fn user_info(&self, user_id: UserId, requested: Option<UserId>) -> UserInfoResponse {
        let target = requested.unwrap_or(user_id);
        match self.collaborators.users.user_profile(target).await {
            Ok(Some(profile)) => UserInfoResponse {
                success: true,
                message: String::new(),
                online: self.registry.is_online(profile.uid),
                uid: Some(profile.uid),
                username: Some(profile.username),
                avatar_url: profile.avatar_url,
                gender: profile.gender,
                birthday: profile.birthday,
                tele: profile.tele,
            },
            Ok(None) => UserInfoResponse::failure("用户不存在"),
            Err(e) => {
                error!("[查询] 获取用户 {} 的资料失败: {}", target, e);
                UserInfoResponse::failure("查询失败")
            }
        }
    }
}

fn history_item(message: StoredMessage) -> HistoryMessageItem {
    HistoryMessageItem {
        id: message.id,
        sender_id: message.sender_id,
        receiver_id: message.receiver_id,
        group_id: message.group_id,
        content: message.content,
        content_type: message.content_type,
        file: message.file,
        timestamp: message.timestamp,
        is_read: u8::from(message.is_read),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_models::{ContentType, FileMeta, GroupMessage, PrivateMessage};
    use chat_transport::outbound::outbound_channel;

    use crate::config::SeedData;
    use crate::db::{MemoryStore, MessageStore};

    fn setup(settings: ServerConfig) -> (Arc<SessionRegistry>, Arc<MemoryStore>, QueryHandlers) {
        let registry = Arc::new(SessionRegistry::new());
        let store = Arc::new(MemoryStore::from_seed(&SeedData::default()));
        let handlers = QueryHandlers::new(registry.clone(), Collaborators::from_store(store.clone()), &settings);
        (registry, store, handlers)
    }

    async fn seed_private(store: &MemoryStore, count: i64) {
        for ts in 1..=count {
            store
                .persist_private_message(&PrivateMessage {
                    from_user_id: 1,
                    to_user_id: Some(2),
                    content: format!("m{}", ts),
                    content_type: ContentType::Text,
                    file: FileMeta::default(),
                    timestamp: ts,
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_history_limit_is_clamped() {
        let settings = ServerConfig {
            default_history_limit: 3,
            max_history_limit: 5,
            ..ServerConfig::default()
        };
        let (_registry, store, handlers) = setup(settings);
        seed_private(&store, 10).await;

        let request = |limit: Option<u32>| ChatHistoryRequest {
            chat_type: Some("private".to_string()),
            target_user_id: Some(2),
            limit,
            ..ChatHistoryRequest::default()
        };

        assert_eq!(handlers.chat_history(1, request(None)).await.messages.len(), 3);
        assert_eq!(handlers.chat_history(1, request(Some(100))).await.messages.len(), 5);
        let one = handlers.chat_history(1, request(Some(0))).await;
        assert_eq!(one.messages.len(), 1);
        assert_eq!(one.messages[0].content, "m10");
    }

    #[tokio::test]
    async fn test_history_rejects_bad_requests() {
        let (_registry, _store, handlers) = setup(ServerConfig::default());

        let bad_type = handlers
            .chat_history(
                1,
                ChatHistoryRequest {
                    chat_type: Some("channel".to_string()),
                    ..ChatHistoryRequest::default()
                },
            )
            .await;
        assert!(!bad_type.success);
        assert_eq!(bad_type.chat_type, None);

        let no_target = handlers
            .chat_history(
                1,
                ChatHistoryRequest {
                    chat_type: Some("private".to_string()),
                    ..ChatHistoryRequest::default()
                },
            )
            .await;
        assert!(!no_target.success);
        assert_eq!(no_target.chat_type, Some(ChatType::Private));
    }

    #[tokio::test]
    /// 群历史只对成员开放。
    async fn test_group_history_requires_membership() {
        let (_registry, store, handlers) = setup(ServerConfig::default());
        store
            .persist_group_message(&GroupMessage {
                from_user_id: 2,
                group_id: 9,
                content: "g".to_string(),
                content_type: ContentType::Text,
                file: FileMeta::default(),
                timestamp: 1,
            })
            .await
            .unwrap();

        let request = ChatHistoryRequest {
            chat_type: Some("group".to_string()),
            group_id: Some(9),
            ..ChatHistoryRequest::default()
        };
        let member = handlers.chat_history(1, request.clone()).await;
        assert!(member.success);
        assert_eq!(member.messages.len(), 1);
        assert_eq!(member.messages[0].group_id, Some(9));

        let outsider = handlers.chat_history(404, request).await;
        assert!(!outsider.success);
    }

    #[tokio::test]
    /// 好友列表的在线状态来自会话注册表。
    async fn test_friend_list_online_flags() {
        let (registry, _store, handlers) = setup(ServerConfig::default());
        let (channel, _rx) = outbound_channel(4);
        registry.register(3, channel);

        let response = handlers.friend_list(1).await;
        let flags: Vec<(UserId, bool)> = response.friends.iter().map(|f| (f.uid, f.online)).collect();
        assert_eq!(flags, vec![(2, false), (3, true)]);
    }

    #[tokio::test]
    async fn test_user_info() {
        let (_registry, _store, handlers) = setup(ServerConfig::default());
        let me = handlers.user_info(1, None).await;
        assert!(me.success);
        assert_eq!(me.username.as_deref(), Some("alice"));
        assert!(!me.online);

        let missing = handlers.user_info(1, Some(404)).await;
        assert!(!missing.success);
    }

    #[tokio::test]
    async fn test_group_list() {
        let (_registry, _store, handlers) = setup(ServerConfig::default());
        let response = handlers.group_list(2).await;
        assert_eq!(response.groups.len(), 1);
        assert_eq!(response.groups[0].id, 9);
        assert!(handlers.group_list(404).await.groups.is_empty());
    }
}
