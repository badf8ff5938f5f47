//! 聊天协议的全部线上载荷定义。
//!
//! 线上格式为"每行一个 JSON 对象"，顶层的 `type` 字段是判别符，
//! 其余字段与判别符对应的载荷平铺在同一层，字段名使用 camelCase。
//! `Envelope` 把所有载荷收拢为一个带标签的枚举，入站解码与出站编码都经过它。

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::enums::{ChatType, ContentType};
use crate::message_models::{FileMeta, FriendRequestId, GroupId, GroupMessage, MessageId, PrivateMessage, UserId};

// 判别符常量：与客户端约定，禁止随意修改。
pub const REGISTER_REQUEST: &str = "register_request";
pub const REGISTER_RESPONSE: &str = "register_response";
pub const LOGIN_REQUEST: &str = "login_request";
pub const LOGIN_RESPONSE: &str = "login_response";
pub const LOGOUT_REQUEST: &str = "logout_request";
pub const LOGOUT_RESPONSE: &str = "logout_response";
pub const CHAT_PRIVATE_SEND: &str = "chat_private_send";
pub const CHAT_PRIVATE_RECEIVE: &str = "chat_private_receive";
pub const CHAT_GROUP_SEND: &str = "chat_group_send";
pub const CHAT_GROUP_RECEIVE: &str = "chat_group_receive";
pub const CHAT_HISTORY_REQUEST: &str = "chat_history_request";
pub const CHAT_HISTORY_RESPONSE: &str = "chat_history_response";
pub const FRIEND_ADD_REQUEST: &str = "friend_add_request";
pub const FRIEND_ADD_RESPONSE: &str = "friend_add_response";
pub const FRIEND_LIST_REQUEST: &str = "friend_list_request";
pub const FRIEND_LIST_RESPONSE: &str = "friend_list_response";
pub const GROUP_LIST_REQUEST: &str = "group_list_request";
pub const GROUP_LIST_RESPONSE: &str = "group_list_response";
pub const USER_INFO_REQUEST: &str = "user_info_request";
pub const USER_INFO_RESPONSE: &str = "user_info_response";
pub const PING: &str = "ping";
pub const PONG: &str = "pong";

/// 当前协议认识的全部判别符。不在此列表中的 `type` 视为未知消息类型。
pub const KNOWN_MESSAGE_TYPES: &[&str] = &[
    REGISTER_REQUEST,
    REGISTER_RESPONSE,
    LOGIN_REQUEST,
    LOGIN_RESPONSE,
    LOGOUT_REQUEST,
    LOGOUT_RESPONSE,
    CHAT_PRIVATE_SEND,
    CHAT_PRIVATE_RECEIVE,
    CHAT_GROUP_SEND,
    CHAT_GROUP_RECEIVE,
    CHAT_HISTORY_REQUEST,
    CHAT_HISTORY_RESPONSE,
    FRIEND_ADD_REQUEST,
    FRIEND_ADD_RESPONSE,
    FRIEND_LIST_REQUEST,
    FRIEND_LIST_RESPONSE,
    GROUP_LIST_REQUEST,
    GROUP_LIST_RESPONSE,
    USER_INFO_REQUEST,
    USER_INFO_RESPONSE,
    PING,
    PONG,
];

/// 判断一个判别符是否为协议已知的消息类型。
pub fn is_known_message_type(message_type: &str) -> bool {
    KNOWN_MESSAGE_TYPES.contains(&message_type)
}

/// 线上传输的基本单元。
///
/// 使用 serde 的内部标签 (`tag = "type"`)，因此序列化结果形如
/// `{"type":"chat_private_send","toUserId":7,"content":"hi",...}`。
/// 一旦构造完成即视为不可变值。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    RegisterRequest(RegisterRequest),
    RegisterResponse(RegisterResponse),
    LoginRequest(LoginRequest),
    LoginResponse(LoginResponse),
    LogoutRequest(LogoutRequest),
    LogoutResponse(LogoutResponse),
    ChatPrivateSend(ChatPrivateSend),
    ChatPrivateReceive(ChatPrivateReceive),
    ChatGroupSend(ChatGroupSend),
    ChatGroupReceive(ChatGroupReceive),
    ChatHistoryRequest(ChatHistoryRequest),
    ChatHistoryResponse(ChatHistoryResponse),
    FriendAddRequest(FriendAddRequest),
    FriendAddResponse(FriendAddResponse),
    FriendListRequest(FriendListRequest),
    FriendListResponse(FriendListResponse),
    GroupListRequest(GroupListRequest),
    GroupListResponse(GroupListResponse),
    UserInfoRequest(UserInfoRequest),
    UserInfoResponse(UserInfoResponse),
    Ping(PingPayload),
    Pong(PongPayload),
}

impl Envelope {
    /// 返回此消息的判别符字符串。
    pub fn message_type(&self) -> &'static str {
        match self {
            Envelope::RegisterRequest(_) => REGISTER_REQUEST,
            Envelope::RegisterResponse(_) => REGISTER_RESPONSE,
            Envelope::LoginRequest(_) => LOGIN_REQUEST,
            Envelope::LoginResponse(_) => LOGIN_RESPONSE,
            Envelope::LogoutRequest(_) => LOGOUT_REQUEST,
            Envelope::LogoutResponse(_) => LOGOUT_RESPONSE,
            Envelope::ChatPrivateSend(_) => CHAT_PRIVATE_SEND,
            Envelope::ChatPrivateReceive(_) => CHAT_PRIVATE_RECEIVE,
            Envelope::ChatGroupSend(_) => CHAT_GROUP_SEND,
            Envelope::ChatGroupReceive(_) => CHAT_GROUP_RECEIVE,
            Envelope::ChatHistoryRequest(_) => CHAT_HISTORY_REQUEST,
            Envelope::ChatHistoryResponse(_) => CHAT_HISTORY_RESPONSE,
            Envelope::FriendAddRequest(_) => FRIEND_ADD_REQUEST,
            Envelope::FriendAddResponse(_) => FRIEND_ADD_RESPONSE,
            Envelope::FriendListRequest(_) => FRIEND_LIST_REQUEST,
            Envelope::FriendListResponse(_) => FRIEND_LIST_RESPONSE,
            Envelope::GroupListRequest(_) => GROUP_LIST_REQUEST,
            Envelope::GroupListResponse(_) => GROUP_LIST_RESPONSE,
            Envelope::UserInfoRequest(_) => USER_INFO_REQUEST,
            Envelope::UserInfoResponse(_) => USER_INFO_RESPONSE,
            Envelope::Ping(_) => PING,
            Envelope::Pong(_) => PONG,
        }
    }
}

/// 当前 UTC 时间的毫秒时间戳。
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

// ---------------------------------------------------------------------------
// 注册 / 登录 / 登出
// ---------------------------------------------------------------------------

/// 注册请求：客户端 -> 服务器。未登录的连接也可以发送。
#[derive(Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "******"))
            .finish()
    }
}

/// 注册响应：成功时携带新分配的 uid。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<UserId>,
}

impl RegisterResponse {
    pub fn success(uid: UserId) -> Self {
        Self {
            success: true,
            message: "注册成功".to_string(),
            uid: Some(uid),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            uid: None,
        }
    }
}

/// 登录请求：客户端 -> 服务器。
#[derive(Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(default)]
    pub uid: Option<UserId>,
    #[serde(default)]
    pub password: Option<String>,
}

// 手写 Debug，避免密码出现在日志里。
impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("uid", &self.uid)
            .field("password", &self.password.as_ref().map(|_| "******"))
            .finish()
    }
}

/// 登录响应：服务器 -> 客户端。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<UserId>,
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub timestamp: i64,
}

impl LoginResponse {
    /// 构造登录成功的响应。
    pub fn success(uid: UserId, username: Option<String>, avatar_url: Option<String>) -> Self {
        Self {
            uid: Some(uid),
            success: true,
            message: "登录成功".to_string(),
            username,
            avatar_url,
            timestamp: now_millis(),
        }
    }

    /// 构造登录失败的响应。
    pub fn failure(uid: Option<UserId>, message: impl Into<String>) -> Self {
        Self {
            uid,
            success: false,
            message: message.into(),
            username: None,
            avatar_url: None,
            timestamp: now_millis(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct LogoutRequest {}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct LogoutResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

// ---------------------------------------------------------------------------
// 私聊
// ---------------------------------------------------------------------------

/// 私聊发送：客户端 -> 服务器。
///
/// `from_user_id` 虽然会被解析，但服务端总会用会话身份覆盖它。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChatPrivateSend {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_user_id: Option<UserId>,
    #[serde(default)]
    pub to_user_id: Option<UserId>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub content_type: Option<ContentType>,
    #[serde(flatten)]
    pub file: FileMeta,
    #[serde(default)]
    pub timestamp: i64,
}

/// 私聊接收：服务器 -> 客户端。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatPrivateReceive {
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub content: String,
    pub content_type: ContentType,
    #[serde(flatten)]
    pub file: FileMeta,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    #[serde(default)]
    pub is_read: u8,
}

impl ChatPrivateReceive {
    /// 由已投递的私聊记录构造推送载荷。接收方必须存在。
    pub fn from_message(message: &PrivateMessage, to_user_id: UserId) -> Self {
        Self {
            from_user_id: message.from_user_id,
            to_user_id,
            content: message.content.clone(),
            content_type: message.content_type.clone(),
            file: message.file.clone(),
            timestamp: message.timestamp,
            id: None,
            is_read: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// 群聊
// ---------------------------------------------------------------------------

/// 群聊发送：客户端 -> 服务器。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChatGroupSend {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_user_id: Option<UserId>,
    #[serde(default)]
    pub group_id: Option<GroupId>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub content_type: Option<ContentType>,
    #[serde(flatten)]
    pub file: FileMeta,
    #[serde(default)]
    pub timestamp: i64,
}

/// 群聊接收：服务器 -> 客户端，`id` 为持久化层生成的消息标识。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatGroupReceive {
    pub group_id: GroupId,
    pub from_user_id: UserId,
    pub content: String,
    pub content_type: ContentType,
    #[serde(flatten)]
    pub file: FileMeta,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    #[serde(default)]
    pub is_read: u8,
}

impl ChatGroupReceive {
    pub fn from_message(message: &GroupMessage, id: Option<MessageId>) -> Self {
        Self {
            group_id: message.group_id,
            from_user_id: message.from_user_id,
            content: message.content.clone(),
            content_type: message.content_type.clone(),
            file: message.file.clone(),
            timestamp: message.timestamp,
            id,
            is_read: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// 历史记录
// ---------------------------------------------------------------------------

/// 历史消息请求：客户端 -> 服务器。
///
/// `chat_type` 保留为原始字符串，由处理器判断是否合法，
/// 这样非法取值能得到一个 `success: false` 的响应而不是被当作格式错误丢弃。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistoryRequest {
    #[serde(default)]
    pub chat_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// 只拉取早于此时间戳的消息，用于向前翻页。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_timestamp: Option<i64>,
}

/// 历史记录中的一条消息。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMessageItem {
    pub id: MessageId,
    pub sender_id: UserId,
    /// 私聊时存在
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<UserId>,
    /// 群聊时存在
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
    pub content: String,
    pub content_type: ContentType,
    #[serde(flatten)]
    pub file: FileMeta,
    pub timestamp: i64,
    #[serde(default)]
    pub is_read: u8,
}

/// 历史消息响应：服务器 -> 客户端。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistoryResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_type: Option<ChatType>,
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub messages: Vec<HistoryMessageItem>,
}

impl ChatHistoryResponse {
    pub fn failure(chat_type: Option<ChatType>, message: impl Into<String>) -> Self {
        Self {
            chat_type,
            success: false,
            message: message.into(),
            messages: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// 好友 / 群组 / 用户资料
// ---------------------------------------------------------------------------

/// 好友请求刚创建时的状态 (0 待处理, 1 同意, 2 拒绝)。
pub const FRIEND_REQUEST_PENDING: u8 = 0;

/// 添加好友请求：客户端 -> 服务器。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FriendAddRequest {
    #[serde(default)]
    pub to_user_id: Option<UserId>,
}

/// 添加好友响应：成功时带有生成的请求 ID 与请求状态。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FriendAddResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<FriendRequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u8>,
}

impl FriendAddResponse {
    pub fn pending(request_id: FriendRequestId) -> Self {
        Self {
            success: true,
            message: "好友请求发送成功".to_string(),
            request_id: Some(request_id),
            status: Some(FRIEND_REQUEST_PENDING),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            ..Self::default()
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct FriendListRequest {}

/// 好友列表中的一项，`online` 来自会话注册表。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FriendItem {
    pub uid: UserId,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub online: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct FriendListResponse {
    #[serde(default)]
    pub friends: Vec<FriendItem>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct GroupListRequest {}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GroupItem {
    pub id: GroupId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct GroupListResponse {
    #[serde(default)]
    pub groups: Vec<GroupItem>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserInfoRequest {
    #[serde(default)]
    pub user_id: Option<UserId>,
}

/// 用户资料响应 (脱敏后的资料)。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserInfoResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// 0 未知, 1 男, 2 女
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<u8>,
    /// ISO 日期字符串，如 1990-01-01
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthday: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tele: Option<String>,
    #[serde(default)]
    pub online: bool,
}

impl UserInfoResponse {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// 心跳
// ---------------------------------------------------------------------------

/// Ping 载荷，目前为空。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct PingPayload {}

/// Pong 载荷，目前为空。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct PongPayload {}
