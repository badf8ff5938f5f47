// chat_server/src/db/memory_store.rs

//! 基于内存的协作方实现。
//!
//! 群组在构造时由种子数据确定，之后只读。用户与好友关系同样来自种子数据，
//! 注册会新增用户；好友请求与消息记录保存在 `tokio::sync::Mutex` 保护的列表中，
//! 各类 ID 自增生成。
//! 另外提供调用计数与故障注入开关，方便测试观察路由器的行为。

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use chat_models::payloads::FRIEND_REQUEST_PENDING;
use chat_models::{FriendRequestId, GroupId, GroupMessage, MessageId, PrivateMessage, UserId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, info};
use tokio::sync::Mutex;

use crate::config::{SeedData, SeedGroup, SeedUser};
use crate::db::{
    AuthenticatedUser, Authenticator, FriendRequestOutcome, GroupDirectory, GroupSummary, HistoryQuery, MessageStore,
    RegistrationOutcome, StoredMessage, UserDirectory, UserProfile,
};
use crate::error::StoreError;

/// 一条好友请求记录。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FriendRequestRecord {
    pub id: FriendRequestId,
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub status: u8,
}

#[derive(Debug)]
pub struct MemoryStore {
    users: DashMap<UserId, SeedUser>,
    usernames: DashMap<String, UserId>,
    groups: HashMap<GroupId, SeedGroup>,
    friendships: DashMap<UserId, BTreeSet<UserId>>,
    friend_requests: Mutex<Vec<FriendRequestRecord>>,
    messages: Mutex<Vec<StoredMessage>>,
    next_user_id: AtomicI64,
    next_friend_request_id: AtomicI64,
    next_message_id: AtomicI64,
    private_persist_calls: AtomicUsize,
    group_persist_calls: AtomicUsize,
    fail_persistence: AtomicBool,
    fail_membership: AtomicBool,
}

impl MemoryStore {
    pub fn from_seed(seed: &SeedData) -> Self {
        let users: DashMap<UserId, SeedUser> = seed.users.iter().map(|u| (u.uid, u.clone())).collect();
        let usernames: DashMap<String, UserId> = seed.users.iter().map(|u| (u.username.clone(), u.uid)).collect();
        let next_user_id = seed.users.iter().map(|u| u.uid).max().unwrap_or(0).max(0) + 1;
        let groups: HashMap<GroupId, SeedGroup> = seed.groups.iter().map(|g| (g.id, g.clone())).collect();

        let friendships: DashMap<UserId, BTreeSet<UserId>> = DashMap::new();
        for (a, b) in &seed.friendships {
            if a == b {
                continue;
            }
            friendships.entry(*a).or_default().insert(*b);
            friendships.entry(*b).or_default().insert(*a);
        }

        info!(
            "[MemoryStore] 已载入种子数据: {} 个用户, {} 个群组, {} 条好友关系",
            users.len(),
            groups.len(),
            seed.friendships.len()
        );

        Self {
            users,
            usernames,
            groups,
            friendships,
            friend_requests: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
            next_user_id: AtomicI64::new(next_user_id),
            next_friend_request_id: AtomicI64::new(1),
            next_message_id: AtomicI64::new(1),
            private_persist_calls: AtomicUsize::new(0),
            group_persist_calls: AtomicUsize::new(0),
            fail_persistence: AtomicBool::new(false),
            fail_membership: AtomicBool::new(false),
        }
    }

    /// 打开后所有持久化调用都返回 `Unavailable`。
    pub fn set_persistence_failure(&self, fail: bool) {
        self.fail_persistence.store(fail, Ordering::SeqCst);
    }

    /// 打开后群成员检查与成员列表查询都返回 `Unavailable`。
    pub fn set_membership_failure(&self, fail: bool) {
        self.fail_membership.store(fail, Ordering::SeqCst);
    }

    /// 私聊持久化被调用的次数 (包括失败的调用)。
    pub fn private_persist_calls(&self) -> usize {
        self.private_persist_calls.load(Ordering::SeqCst)
    }

    pub fn group_persist_calls(&self) -> usize {
        self.group_persist_calls.load(Ordering::SeqCst)
    }

    /// 当前保存的全部消息的快照。
    pub async fn stored_messages(&self) -> Vec<StoredMessage> {
        self.messages.lock().await.clone()
    }

    pub async fn friend_requests(&self) -> Vec<FriendRequestRecord> {
        self.friend_requests.lock().await.clone()
    }

    fn check_persistence(&self) -> Result<(), StoreError> {
        if self.fail_persistence.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("持久化后端不可用".to_string()));
        }
        Ok(())
    }

    fn check_membership(&self) -> Result<(), StoreError> {
        if self.fail_membership.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("群组目录不可用".to_string()));
        }
        Ok(())
    }

    fn profile_of(user: &SeedUser) -> UserProfile {
        UserProfile {
            uid: user.uid,
            username: user.username.clone(),
            avatar_url: user.avatar_url.clone(),
            gender: user.gender,
            birthday: user.birthday.clone(),
            tele: user.tele.clone(),
        }
    }

    async fn append(&self, mut record: StoredMessage) -> MessageId {
        let id = self.next_message_id.fetch_add(1, Ordering::SeqCst);
        record.id = id;
        self.messages.lock().await.push(record);
        id
    }

    async fn select<F>(&self, query: HistoryQuery, filter: F) -> Vec<StoredMessage>
    where
        F: Fn(&StoredMessage) -> bool,
    {
        let messages = self.messages.lock().await;
        let mut selected: Vec<StoredMessage> = messages
            .iter()
            .filter(|m| filter(m))
            .filter(|m| query.before_timestamp.map_or(true, |before| m.timestamp < before))
            .cloned()
            .collect();
        drop(messages);

        selected.sort_by_key(|m| (m.timestamp, m.id));
        let skip = selected.len().saturating_sub(query.limit);
        selected.split_off(skip)
    }
}

#[async_trait]
impl Authenticator for MemoryStore {
    async fn authenticate(&self, uid: UserId, password: &str) -> Result<Option<AuthenticatedUser>, StoreError> {
        match self.users.get(&uid) {
            Some(user) if user.password == password => Ok(Some(AuthenticatedUser {
                uid: user.uid,
                username: user.username.clone(),
                avatar_url: user.avatar_url.clone(),
            })),
            Some(_) => {
                debug!("[MemoryStore] 用户 {} 密码不匹配", uid);
                Ok(None)
            }
            None => {
                debug!("[MemoryStore] 用户 {} 不存在", uid);
                Ok(None)
            }
        }
    }

    async fn register_user(&self, username: &str, password: &str) -> Result<RegistrationOutcome, StoreError> {
        let username = username.trim();
        match self.usernames.entry(username.to_string()) {
            Entry::Occupied(_) => {
                debug!("[MemoryStore] 用户名 {} 已存在", username);
                Ok(RegistrationOutcome::UsernameTaken)
            }
            Entry::Vacant(slot) => {
                let uid = self.next_user_id.fetch_add(1, Ordering::SeqCst);
                slot.insert(uid);
                self.users.insert(uid, SeedUser::new(uid, username, password));
                info!("[MemoryStore] 新用户 {} 注册成功, uid={}", username, uid);
                Ok(RegistrationOutcome::Registered(uid))
            }
        }
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn persist_private_message(&self, message: &PrivateMessage) -> Result<(), StoreError> {
        self.private_persist_calls.fetch_add(1, Ordering::SeqCst);
        self.check_persistence()?;
        let receiver_id = message
            .to_user_id
            .ok_or_else(|| StoreError::Invalid("私聊消息缺少接收者".to_string()))?;

        self.append(StoredMessage {
            id: 0,
            sender_id: message.from_user_id,
            receiver_id: Some(receiver_id),
            group_id: None,
            content: message.content.clone(),
            content_type: message.content_type.clone(),
            file: message.file.clone(),
            timestamp: message.timestamp,
            is_read: false,
        })
        .await;
        Ok(())
    }

    async fn persist_group_message(&self, message: &GroupMessage) -> Result<MessageId, StoreError> {
        self.group_persist_calls.fetch_add(1, Ordering::SeqCst);
        self.check_persistence()?;
        let id = self
            .append(StoredMessage {
                id: 0,
                sender_id: message.from_user_id,
                receiver_id: None,
                group_id: Some(message.group_id),
                content: message.content.clone(),
                content_type: message.content_type.clone(),
                file: message.file.clone(),
                timestamp: message.timestamp,
                is_read: false,
            })
            .await;
        Ok(id)
    }

    async fn private_history(&self, user_a: UserId, user_b: UserId, query: HistoryQuery) -> Result<Vec<StoredMessage>, StoreError> {
        self.check_persistence()?;
        Ok(self
            .select(query, |m| {
                m.group_id.is_none()
                    && ((m.sender_id == user_a && m.receiver_id == Some(user_b))
                        || (m.sender_id == user_b && m.receiver_id == Some(user_a)))
            })
            .await)
    }

    async fn group_history(&self, group_id: GroupId, query: HistoryQuery) -> Result<Vec<StoredMessage>, StoreError> {
        self.check_persistence()?;
        Ok(self.select(query, |m| m.group_id == Some(group_id)).await)
    }
}

#[async_trait]
impl GroupDirectory for MemoryStore {
    async fn get_group_members(&self, group_id: GroupId) -> Result<Vec<UserId>, StoreError> {
        self.check_membership()?;
        Ok(self.groups.get(&group_id).map(|g| g.members.clone()).unwrap_or_default())
    }

    async fn is_group_member(&self, group_id: GroupId, user_id: UserId) -> Result<bool, StoreError> {
        self.check_membership()?;
        Ok(self
            .groups
            .get(&group_id)
            .map_or(false, |g| g.members.contains(&user_id)))
    }

    async fn list_groups(&self, user_id: UserId) -> Result<Vec<GroupSummary>, StoreError> {
        self.check_membership()?;
        let mut groups: Vec<GroupSummary> = self
            .groups
            .values()
            .filter(|g| g.members.contains(&user_id))
            .map(|g| GroupSummary {
                id: g.id,
                name: g.name.clone(),
                avatar: g.avatar.clone(),
            })
            .collect();
        groups.sort_by_key(|g| g.id);
        Ok(groups)
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn friend_list(&self, user_id: UserId) -> Result<Vec<UserProfile>, StoreError> {
        let friend_ids: Vec<UserId> = match self.friendships.get(&user_id) {
            Some(ids) => ids.iter().copied().collect(),
            None => return Ok(Vec::new()),
        };
        Ok(friend_ids
            .iter()
            .filter_map(|id| self.users.get(id).map(|user| Self::profile_of(&user)))
            .collect())
    }

    async fn user_profile(&self, user_id: UserId) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.users.get(&user_id).map(|user| Self::profile_of(&user)))
    }

    async fn create_friend_request(&self, from: UserId, to: UserId) -> Result<FriendRequestOutcome, StoreError> {
        if !self.users.contains_key(&to) {
            return Ok(FriendRequestOutcome::UnknownUser);
        }
        if self.friendships.get(&from).map_or(false, |friends| friends.contains(&to)) {
            return Ok(FriendRequestOutcome::AlreadyFriends);
        }

        let mut requests = self.friend_requests.lock().await;
        let pending = requests
            .iter()
            .any(|r| r.from_user_id == from && r.to_user_id == to && r.status == FRIEND_REQUEST_PENDING);
        if pending {
            return Ok(FriendRequestOutcome::AlreadyPending);
        }

        let id = self.next_friend_request_id.fetch_add(1, Ordering::SeqCst);
        requests.push(FriendRequestRecord {
            id,
            from_user_id: from,
            to_user_id: to,
            status: FRIEND_REQUEST_PENDING,
        });
        debug!("[MemoryStore] 好友请求 {}: {} -> {}", id, from, to);
        Ok(FriendRequestOutcome::Created(id))
    }
}
