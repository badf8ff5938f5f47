//! 聊天消息记录模型。
//!
//! 这里的结构体是服务端内部传递给持久化协作方的"消息记录"，
//! 它们由路由器在覆盖发送者身份之后构造，与线上的发送/接收载荷相互独立。

use serde::{Deserialize, Serialize};

use crate::enums::ContentType;

/// 用户的稳定数字标识 (对应数据库中的 uid)。
pub type UserId = i64;
/// 群组标识。
pub type GroupId = i64;
/// 持久化层生成的消息标识。
pub type MessageId = i64;
/// 好友请求 ID，由持久化层生成。
pub type FriendRequestId = i64;

/// 可选的文件元数据，图片/文件类消息会携带。
///
/// 在线上格式中这些字段与消息其余字段平铺在同一层 (`fileUrl`、`fileSize`、`fileName`)。
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl FileMeta {
    /// 三个字段都为空时返回 `true`。
    pub fn is_empty(&self) -> bool {
        self.file_url.is_none() && self.file_size.is_none() && self.file_name.is_none()
    }
}

/// 一条私聊消息记录。
///
/// `from_user_id` 永远是服务端认证过的会话身份，不会取自客户端。
/// `to_user_id` 保持为 `Option`：字段缺失的消息会被拒绝投递，但仍会尽力交给持久化层。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PrivateMessage {
    pub from_user_id: UserId,
    pub to_user_id: Option<UserId>,
    pub content: String,
    pub content_type: ContentType,
    pub file: FileMeta,
    /// 客户端产生的时间戳 (毫秒)。
    pub timestamp: i64,
}

/// 一条群聊消息记录。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GroupMessage {
    pub from_user_id: UserId,
    pub group_id: GroupId,
    pub content: String,
    pub content_type: ContentType,
    pub file: FileMeta,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_meta_is_empty() {
        assert!(FileMeta::default().is_empty());
        let meta = FileMeta {
            file_name: Some("a.png".to_string()),
            ..FileMeta::default()
        };
        assert!(!meta.is_empty());
    }

    #[test]
    /// 空的文件元数据序列化后不应输出任何字段。
    fn test_empty_file_meta_serializes_to_empty_object() {
        let json = serde_json::to_string(&FileMeta::default()).expect("序列化 FileMeta 失败");
        assert_eq!(json, "{}");
    }
}
