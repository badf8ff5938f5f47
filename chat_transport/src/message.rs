// chat_transport/src/message.rs

//! `Envelope` 与单行文本之间的编码/解码。
//!
//! 解码分两步：先解析为通用的 JSON 值并读取 `type` 判别符，
//! 再按判别符把整个对象反序列化为对应的载荷。
//! 这样调用方能区分"根本不是 JSON""未知类型"与"已知类型但字段不对"三种情况。

use chat_models::payloads::{is_known_message_type, Envelope};
use serde_json::Value;

use crate::error::{DecodeError, TransportError};

/// 把一条 `Envelope` 编码为一行文本 (不含结尾的 `\n`)。
pub fn encode_envelope(envelope: &Envelope) -> Result<String, TransportError> {
    let line = serde_json::to_string(envelope)?;
    Ok(line)
}

/// 把一行文本解码为 `Envelope`。
pub fn decode_envelope(line: &str) -> Result<Envelope, DecodeError> {
    let value: Value = serde_json::from_str(line).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let message_type = match value.get("type").and_then(Value::as_str) {
        Some(t) => t.to_string(),
        None => {
            if value.is_object() {
                return Err(DecodeError::MissingType);
            }
            return Err(DecodeError::Malformed("顶层不是 JSON 对象".to_string()));
        }
    };

    if !is_known_message_type(&message_type) {
        return Err(DecodeError::UnknownType(message_type));
    }

    serde_json::from_value(value).map_err(|source| DecodeError::InvalidPayload { message_type, source })
}
