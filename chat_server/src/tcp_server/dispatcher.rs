// chat_server/src/tcp_server/dispatcher.rs

//! 协议分发器：把一行文本解码为 `Envelope`，并交给对应的处理函数。
//!
//! 除 `login_request`、`register_request` 与 `ping` 外，所有请求都要求连接已认证；
//! 未认证连接发来的其他请求被静默丢弃。

use std::sync::{Arc, LazyLock};

use chat_models::payloads::{Envelope, LoginRequest, LoginResponse, LogoutResponse, PongPayload};
use chat_transport::error::DecodeError;
use chat_transport::message::decode_envelope;
use log::{debug, error, info, warn};
use regex::Regex;

use crate::config::ServerConfig;
use crate::db::Collaborators;
use crate::tcp_server::account_handlers::AccountHandlers;
use crate::tcp_server::client_connection::ClientConnection;
use crate::tcp_server::message_router::MessageRouter;
use crate::tcp_server::query_handlers::QueryHandlers;
use crate::tcp_server::session_registry::SessionRegistry;

/// 处理完一行后连接应继续读取还是关闭。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Continue,
    Close,
}

static TYPE_FIELD: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r#""type"\s*:\s*"([^"]{0,64})""#).ok());
static UID_FIELD: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#""(uid|fromUserId|toUserId|groupId)"\s*:\s*"?(-?\d{1,19})"#).ok());

/// 从无法解析的行中尽量提取可识别的字段用于日志，从不包含密码。
fn describe_malformed(line: &str) -> String {
    let mut parts = Vec::new();
    if let Some(caps) = TYPE_FIELD.as_ref().and_then(|re| re.captures(line)) {
        parts.push(format!("type={}", &caps[1]));
    }
    if let Some(re) = UID_FIELD.as_ref() {
        for caps in re.captures_iter(line).take(4) {
            parts.push(format!("{}={}", &caps[1], &caps[2]));
        }
    }
    if parts.is_empty() {
        format!("无可识别字段, 长度 {} 字节", line.len())
    } else {
        parts.join(", ")
    }
}

pub struct Dispatcher {
    collaborators: Collaborators,
    router: MessageRouter,
    queries: QueryHandlers,
    accounts: AccountHandlers,
}

impl Dispatcher {
    pub fn new(registry: Arc<SessionRegistry>, collaborators: Collaborators, settings: &ServerConfig) -> Self {
        let router = MessageRouter::new(registry.clone(), collaborators.messages.clone(), collaborators.groups.clone());
        let queries = QueryHandlers::new(registry, collaborators.clone(), settings);
        let accounts = AccountHandlers::new(collaborators.clone());
        Self {
            collaborators,
            router,
            queries,
            accounts,
        }
    }

    /// 处理从连接读到的一行。格式错误与未知类型只记录日志，连接保持打开。
    pub async fn dispatch_line(&self, conn: &mut ClientConnection, line: &str) -> DispatchOutcome {
        match decode_envelope(line) {
            Ok(envelope) => self.dispatch(conn, envelope).await,
            Err(DecodeError::UnknownType(message_type)) => {
                warn!("[Dispatcher] 连接 {} 发来未知消息类型 '{}'，已忽略", conn.connection_id(), message_type);
                DispatchOutcome::Continue
            }
            Err(e) => {
                warn!(
                    "[Dispatcher] 连接 {} 发来无法解析的消息 ({}): {}",
                    conn.connection_id(),
                    describe_malformed(line),
                    e
                );
                DispatchOutcome::Continue
            }
        }
    }

    pub async fn dispatch(&self, conn: &mut ClientConnection, envelope: Envelope) -> DispatchOutcome {
        let envelope = match envelope {
            Envelope::LoginRequest(request) => return self.handle_login(conn, request).await,
            Envelope::Ping(_) => {
                conn.send(&Envelope::Pong(PongPayload {}));
                return DispatchOutcome::Continue;
            }
            // 注册不改变连接的认证状态
            Envelope::RegisterRequest(request) => {
                let response = self.accounts.register(request).await;
                conn.send(&Envelope::RegisterResponse(response));
                return DispatchOutcome::Continue;
            }
            other => other,
        };

        let Some(user_id) = conn.user_id() else {
            debug!(
                "[Dispatcher] 未认证的连接 {} 发送了 {}，已丢弃",
                conn.connection_id(),
                envelope.message_type()
            );
            return DispatchOutcome::Continue;
        };

        let message_type = envelope.message_type();
        match envelope {
            Envelope::LogoutRequest(_) => {
                info!("[Dispatcher] 用户 {} 请求登出 (连接 {})", user_id, conn.connection_id());
                conn.send(&Envelope::LogoutResponse(LogoutResponse {
                    success: true,
                    message: "已登出".to_string(),
                }));
                conn.teardown();
                DispatchOutcome::Close
            }
            Envelope::ChatPrivateSend(send) => {
                self.router.route_private(user_id, send).await;
                DispatchOutcome::Continue
            }
            Envelope::ChatGroupSend(send) => {
                self.router.route_group(user_id, send).await;
                DispatchOutcome::Continue
            }
            Envelope::ChatHistoryRequest(request) => {
                let response = self.queries.chat_history(user_id, request).await;
                conn.send(&Envelope::ChatHistoryResponse(response));
                DispatchOutcome::Continue
            }
            Envelope::FriendAddRequest(request) => {
                let response = self.accounts.friend_add(user_id, request).await;
                conn.send(&Envelope::FriendAddResponse(response));
                DispatchOutcome::Continue
            }
            Envelope::FriendListRequest(_) => {
                let response = self.queries.friend_list(user_id).await;
                conn.send(&Envelope::FriendListResponse(response));
                DispatchOutcome::Continue
            }
            Envelope::GroupListRequest(_) => {
                let response = self.queries.group_list(user_id).await;
                conn.send(&Envelope::GroupListResponse(response));
                DispatchOutcome::Continue
            }
            Envelope::UserInfoRequest(request) => {
                let response = self.queries.user_info(user_id, request.user_id).await;
                conn.send(&Envelope::UserInfoResponse(response));
                DispatchOutcome::Continue
            }
            // 已在上面处理
            Envelope::LoginRequest(_) | Envelope::Ping(_) | Envelope::RegisterRequest(_) => DispatchOutcome::Continue,
            Envelope::RegisterResponse(_)
            | Envelope::LoginResponse(_)
            | Envelope::LogoutResponse(_)
            | Envelope::ChatPrivateReceive(_)
            | Envelope::ChatGroupReceive(_)
            | Envelope::ChatHistoryResponse(_)
            | Envelope::FriendAddResponse(_)
            | Envelope::FriendListResponse(_)
            | Envelope::GroupListResponse(_)
            | Envelope::UserInfoResponse(_)
            | Envelope::Pong(_) => {
                warn!("[Dispatcher] 用户 {} 发送了只应由服务器发出的消息 {}，已忽略", user_id, message_type);
                DispatchOutcome::Continue
            }
        }
    }

    /// 登录。成功后继续读取；任何失败都回复失败响应并关闭连接。
    async fn handle_login(&self, conn: &mut ClientConnection, request: LoginRequest) -> DispatchOutcome {
        let (Some(uid), Some(password)) = (request.uid, request.password.as_deref().filter(|p| !p.is_empty())) else {
            warn!("[Dispatcher] 连接 {} 的登录请求缺少 uid 或密码", conn.connection_id());
            conn.send(&Envelope::LoginResponse(LoginResponse::failure(request.uid, "缺少 uid 或密码")));
            return DispatchOutcome::Close;
        };

        match self.collaborators.authenticator.authenticate(uid, password).await {
            Ok(Some(user)) => {
                conn.authenticate(user.uid);
                conn.send(&Envelope::LoginResponse(LoginResponse::success(
                    user.uid,
                    Some(user.username),
                    user.avatar_url,
                )));
                info!("[Dispatcher] 用户 {} 登录成功 (连接 {}, 地址 {})", user.uid, conn.connection_id(), conn.addr());
                DispatchOutcome::Continue
            }
            Ok(None) => {
                warn!("[Dispatcher] 用户 {} 登录失败: 凭据错误 (连接 {})", uid, conn.connection_id());
                conn.send(&Envelope::LoginResponse(LoginResponse::failure(Some(uid), "用户名或密码错误")));
                DispatchOutcome::Close
            }
            Err(e) => {
                error!("[Dispatcher] 用户 {} 登录时认证服务出错: {}", uid, e);
                conn.send(&Envelope::LoginResponse(LoginResponse::failure(Some(uid), "服务器内部错误")));
                DispatchOutcome::Close
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// 格式错误的登录行中可以提取 type 与 uid，但密码不会出现在日志描述里。
    fn test_describe_malformed_never_contains_password() {
        let line = r#"{"type":"login_request","uid":42,"password":"hunter2""#;
        let described = describe_malformed(line);
        assert!(described.contains("type=login_request"), "{}", described);
        assert!(described.contains("uid=42"), "{}", described);
        assert!(!described.contains("hunter2"), "{}", described);
    }

    #[test]
    fn test_describe_malformed_without_fields() {
        let described = describe_malformed("garbage");
        assert!(described.contains("7 字节"), "{}", described);
    }
}
