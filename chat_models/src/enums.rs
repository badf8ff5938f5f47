//! 通用枚举模块。
//!
//! 本模块定义了聊天协议中多处共用的枚举类型，例如消息内容类型 (`ContentType`)
//! 与历史记录查询的会话类型 (`ChatType`)。线上格式统一使用小写字符串。

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// 聊天消息的内容类型，对应线上的 `contentType` 字段。
///
/// 客户端缺省此字段时按纯文本处理。无法识别的取值保存在 `Other` 中，
/// 转发给接收方时原样写回，不会改写成别的值。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ContentType {
    /// 纯文本
    #[default]
    Text,
    /// 图片
    Image,
    /// 通用文件
    File,
    /// 语音/音频
    Audio,
    /// 视频
    Video,
    /// 协议未列出的内容类型，保留客户端的原始字符串
    Other(String),
}

impl ContentType {
    /// 线上使用的字符串形式。
    pub fn as_str(&self) -> &str {
        match self {
            ContentType::Text => "text",
            ContentType::Image => "image",
            ContentType::File => "file",
            ContentType::Audio => "audio",
            ContentType::Video => "video",
            ContentType::Other(raw) => raw,
        }
    }
}

impl From<String> for ContentType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "text" => ContentType::Text,
            "image" => ContentType::Image,
            "file" => ContentType::File,
            "audio" => ContentType::Audio,
            "video" => ContentType::Video,
            _ => ContentType::Other(value),
        }
    }
}

impl Serialize for ContentType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ContentType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(ContentType::from)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 历史记录请求中的会话类型 (`chatType`)：私聊或群聊。
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Private,
    Group,
}

impl ChatType {
    /// 解析客户端传来的 `chatType` 字符串，无法识别时返回 `None`。
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "private" => Some(ChatType::Private),
            "group" => Some(ChatType::Group),
            _ => None,
        }
    }
}

impl fmt::Display for ChatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatType::Private => f.write_str("private"),
            ChatType::Group => f.write_str("group"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// 未知的内容类型字符串保留在 `Other` 中，序列化时原样输出。
    fn test_unknown_content_type_is_kept_verbatim() {
        let parsed: ContentType = serde_json::from_str("\"sticker\"").expect("未知类型应被接受");
        assert_eq!(parsed, ContentType::Other("sticker".to_string()));
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"sticker\"");
        assert_eq!(parsed.to_string(), "sticker");

        let image: ContentType = serde_json::from_str("\"image\"").expect("image 应可解析");
        assert_eq!(image, ContentType::Image);
        assert_eq!(serde_json::to_string(&image).unwrap(), "\"image\"");
    }

    #[test]
    fn test_content_type_defaults_to_text() {
        assert_eq!(ContentType::default(), ContentType::Text);
        assert_eq!(ContentType::Text.to_string(), "text");
    }

    #[test]
    /// 会话类型只接受 "private" 与 "group" 两种取值。
    fn test_chat_type_from_wire() {
        assert_eq!(ChatType::from_wire("group"), Some(ChatType::Group));
        assert_eq!(ChatType::from_wire("private"), Some(ChatType::Private));
        assert_eq!(ChatType::from_wire("channel"), None);
    }
}
