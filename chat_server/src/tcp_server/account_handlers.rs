// chat_server/src/tcp_server/account_handlers.rs

//! 账号相关的写操作：注册新用户与发起好友请求。
//!
//! 与查询处理器一样，每个请求总会得到对应类型的响应，
//! 校验失败与协作方错误都以 `success: false` 回复，连接保持不变。

use chat_models::payloads::{FriendAddRequest, FriendAddResponse, RegisterRequest, RegisterResponse};
use chat_models::UserId;
use log::{error, info, warn};

use crate::db::{Collaborators, FriendRequestOutcome, RegistrationOutcome};

pub struct AccountHandlers {
    collaborators: Collaborators,
}

impl AccountHandlers {
    pub fn new(collaborators: Collaborators) -> Self {
        Self { collaborators }
    }

    /// 注册。用户名去掉首尾空白后不能为空，密码不能为空白。
    pub async fn register(&self, request: RegisterRequest) -> RegisterResponse {
        let Some(username) = request.username.as_deref().map(str::trim).filter(|u| !u.is_empty()) else {
            return RegisterResponse::failure("用户名不能为空");
        };
        let Some(password) = request.password.as_deref().filter(|p| !p.trim().is_empty()) else {
            return RegisterResponse::failure("密码不能为空");
        };

        match self.collaborators.authenticator.register_user(username, password).await {
            Ok(RegistrationOutcome::Registered(uid)) => {
                info!("[账号] 用户 {} 注册成功, uid={}", username, uid);
                RegisterResponse::success(uid)
            }
            Ok(RegistrationOutcome::UsernameTaken) => {
                warn!("[账号] 注册失败: 用户名 {} 已存在", username);
                RegisterResponse::failure("用户名已存在")
            }
            Err(e) => {
                error!("[账号] 注册用户 {} 时出错: {}", username, e);
                RegisterResponse::failure("系统错误，请稍后重试")
            }
        }
    }

    /// 向 `toUserId` 发起好友请求，请求创建后处于待处理状态。
    pub async fn friend_add(&self, user_id: UserId, request: FriendAddRequest) -> FriendAddResponse {
        let Some(to_user_id) = request.to_user_id.filter(|to| *to != user_id) else {
            return FriendAddResponse::failure("目标用户ID无效");
        };

        match self.collaborators.users.create_friend_request(user_id, to_user_id).await {
            Ok(FriendRequestOutcome::Created(request_id)) => {
                info!("[账号] 用户 {} 向 {} 发起好友请求 {}", user_id, to_user_id, request_id);
                FriendAddResponse::pending(request_id)
            }
            Ok(FriendRequestOutcome::UnknownUser) => FriendAddResponse::failure("目标用户不存在"),
            Ok(FriendRequestOutcome::AlreadyFriends) => FriendAddResponse::failure("已经是好友关系"),
            Ok(FriendRequestOutcome::AlreadyPending) => FriendAddResponse::failure("已发送过好友请求，请等待对方处理"),
            Err(e) => {
                error!("[账号] 用户 {} 发起好友请求失败: {}", user_id, e);
                FriendAddResponse::failure("发送好友请求失败")
            }
        }
    }
}
