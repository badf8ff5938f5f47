//! 外部协作方接口。
//!
//! 认证、消息持久化、群组成员与用户目录都通过这里的 trait 访问，
//! 服务端核心只依赖这些窄接口。`memory_store` 提供一个基于内存的实现，
//! 由配置中的种子数据初始化，二进制程序与集成测试都使用它。

pub mod memory_store;

use std::sync::Arc;

use async_trait::async_trait;
use chat_models::{ContentType, FileMeta, FriendRequestId, GroupId, GroupMessage, MessageId, PrivateMessage, UserId};

use crate::error::StoreError;

pub use memory_store::MemoryStore;

/// 认证通过的用户。
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedUser {
    pub uid: UserId,
    pub username: String,
    pub avatar_url: Option<String>,
}

/// 脱敏后的用户资料 (不含密码)。
#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub uid: UserId,
    pub username: String,
    pub avatar_url: Option<String>,
    pub gender: Option<u8>,
    pub birthday: Option<String>,
    pub tele: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupSummary {
    pub id: GroupId,
    pub name: String,
    pub avatar: Option<String>,
}

/// 持久化层保存的一条消息，私聊时 `receiver_id` 有值，群聊时 `group_id` 有值。
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: Option<UserId>,
    pub group_id: Option<GroupId>,
    pub content: String,
    pub content_type: ContentType,
    pub file: FileMeta,
    pub timestamp: i64,
    pub is_read: bool,
}

/// 历史查询条件：最多 `limit` 条，且严格早于 `before_timestamp` (若有)。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryQuery {
    pub limit: usize,
    pub before_timestamp: Option<i64>,
}

/// 注册结果。用户名冲突属于正常结果而不是错误。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Registered(UserId),
    UsernameTaken,
}

/// 创建好友请求的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendRequestOutcome {
    Created(FriendRequestId),
    UnknownUser,
    AlreadyFriends,
    /// 同方向已有待处理的请求
    AlreadyPending,
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// 凭据错误返回 `Ok(None)`；`Err` 只表示后端故障。
    async fn authenticate(&self, uid: UserId, password: &str) -> Result<Option<AuthenticatedUser>, StoreError>;

    /// 创建新账号并分配 uid。调用方保证用户名与密码非空。
    async fn register_user(&self, username: &str, password: &str) -> Result<RegistrationOutcome, StoreError>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn persist_private_message(&self, message: &PrivateMessage) -> Result<(), StoreError>;

    /// 保存群聊消息并返回生成的消息 ID。
    async fn persist_group_message(&self, message: &GroupMessage) -> Result<MessageId, StoreError>;

    /// 两个用户之间的私聊记录，按时间升序返回最近的若干条。
    async fn private_history(&self, user_a: UserId, user_b: UserId, query: HistoryQuery) -> Result<Vec<StoredMessage>, StoreError>;

    async fn group_history(&self, group_id: GroupId, query: HistoryQuery) -> Result<Vec<StoredMessage>, StoreError>;
}

#[async_trait]
pub trait GroupDirectory: Send + Sync {
    async fn get_group_members(&self, group_id: GroupId) -> Result<Vec<UserId>, StoreError>;

    async fn is_group_member(&self, group_id: GroupId, user_id: UserId) -> Result<bool, StoreError>;

    /// 用户所在的全部群组。
    async fn list_groups(&self, user_id: UserId) -> Result<Vec<GroupSummary>, StoreError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn friend_list(&self, user_id: UserId) -> Result<Vec<UserProfile>, StoreError>;

    async fn user_profile(&self, user_id: UserId) -> Result<Option<UserProfile>, StoreError>;

    /// 记录一条 `from -> to` 的待处理好友请求。
    async fn create_friend_request(&self, from: UserId, to: UserId) -> Result<FriendRequestOutcome, StoreError>;
}

/// 服务端用到的全部协作方，各自以 trait 对象共享。
#[derive(Clone)]
pub struct Collaborators {
    pub authenticator: Arc<dyn Authenticator>,
    pub messages: Arc<dyn MessageStore>,
    pub groups: Arc<dyn GroupDirectory>,
    pub users: Arc<dyn UserDirectory>,
}

impl Collaborators {
    /// 用同一个实现了全部接口的存储构造协作方集合。
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: Authenticator + MessageStore + GroupDirectory + UserDirectory + 'static,
    {
        Self {
            authenticator: store.clone(),
            messages: store.clone(),
            groups: store.clone(),
            users: store,
        }
    }
}
