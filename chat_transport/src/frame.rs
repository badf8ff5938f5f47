// chat_transport/src/frame.rs

//! 以 `\n` 为分隔符的行分帧读取器。
//!
//! 规则：
//! - 每一行去掉结尾的 `\n` 与可能存在的 `\r`；空行直接跳过。
//! - 单行超过 `max_line_bytes` 时返回 `LineTooLong`，并丢弃该行剩余部分直到下一个换行符。
//! - 流结束前最后一段没有换行符的数据也视为一行。
//! - 非 UTF-8 的行返回 `InvalidUtf8`，连接可以继续读取下一行。
//!
//! `next_line` 可以安全地放在 `tokio::select!` / `timeout` 中被取消：
//! 已读入的半行数据保存在读取器内部，下次调用继续拼接。

use log::debug;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

use crate::error::TransportError;

/// 单行默认长度上限 (64 KiB)。
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;

pub struct LineReader<R> {
    inner: BufReader<R>,
    max_line_bytes: usize,
    buf: Vec<u8>,
    discarding: bool,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(reader: R, max_line_bytes: usize) -> Self {
        Self {
            inner: BufReader::new(reader),
            max_line_bytes: max_line_bytes.max(1),
            buf: Vec::new(),
            discarding: false,
        }
    }

    /// 读取下一行。`Ok(None)` 表示对端已关闭 (EOF)。
    ///
    /// 返回 `is_frame_error()` 为真的错误时，仅当前行被丢弃，可以继续调用。
    pub async fn next_line(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            if self.discarding {
                if !self.skip_to_newline().await? {
                    return Ok(None);
                }
                self.discarding = false;
            }

            let remaining = (self.max_line_bytes + 1).saturating_sub(self.buf.len()) as u64;
            (&mut self.inner).take(remaining).read_until(b'\n', &mut self.buf).await?;

            let terminated = self.buf.last() == Some(&b'\n');
            if !terminated {
                if self.buf.len() > self.max_line_bytes {
                    self.buf.clear();
                    self.discarding = true;
                    return Err(TransportError::LineTooLong { limit: self.max_line_bytes });
                }
                if self.buf.is_empty() {
                    return Ok(None);
                }
                // EOF 前的最后半行
            } else {
                self.buf.pop();
                if self.buf.last() == Some(&b'\r') {
                    self.buf.pop();
                }
            }

            if self.buf.is_empty() {
                continue;
            }

            let decoded = std::str::from_utf8(&self.buf).map(str::to_owned);
            self.buf.clear();
            return match decoded {
                Ok(line) => Ok(Some(line)),
                Err(_) => Err(TransportError::InvalidUtf8),
            };
        }
    }

    /// 丢弃数据直到 (并包括) 下一个换行符。遇到 EOF 返回 `false`。
    async fn skip_to_newline(&mut self) -> Result<bool, TransportError> {
        let mut skipped = 0usize;
        loop {
            let (consumed, found) = {
                let available = self.inner.fill_buf().await?;
                if available.is_empty() {
                    debug!("[LineReader] 丢弃超长行时遇到 EOF，已丢弃 {} 字节", skipped);
                    return Ok(false);
                }
                match available.iter().position(|b| *b == b'\n') {
                    Some(pos) => (pos + 1, true),
                    None => (available.len(), false),
                }
            };
            self.inner.consume(consumed);
            skipped += consumed;
            if found {
                debug!("[LineReader] 超长行剩余部分已丢弃 {} 字节", skipped);
                return Ok(true);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(data: &'static [u8], max: usize) -> LineReader<&'static [u8]> {
        LineReader::new(data, max)
    }

    #[tokio::test]
    /// CRLF 与空行的处理，以及 EOF 前没有换行符的最后一行。
    async fn test_lines_crlf_empty_and_trailing() {
        let mut r = reader(b"first\r\n\n\nsecond\nlast", 64);
        assert_eq!(r.next_line().await.unwrap().as_deref(), Some("first"));
        assert_eq!(r.next_line().await.unwrap().as_deref(), Some("second"));
        assert_eq!(r.next_line().await.unwrap().as_deref(), Some("last"));
        assert_eq!(r.next_line().await.unwrap(), None);
        assert_eq!(r.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    /// 超长行报错后被整体丢弃，下一行照常读取。
    async fn test_overlong_line_is_discarded() {
        let mut r = reader(b"0123456789abcdef\nok\n", 8);
        let err = r.next_line().await.unwrap_err();
        assert!(matches!(err, TransportError::LineTooLong { limit: 8 }), "实际错误: {:?}", err);
        assert!(err.is_frame_error());
        assert_eq!(r.next_line().await.unwrap().as_deref(), Some("ok"));
        assert_eq!(r.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    /// 恰好等于上限的行不算超长。
    async fn test_line_exactly_at_limit_is_accepted() {
        let mut r = reader(b"12345678\n", 8);
        assert_eq!(r.next_line().await.unwrap().as_deref(), Some("12345678"));
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_reported_and_skipped() {
        let mut r = reader(b"\xff\xfe\nfine\n", 64);
        let err = r.next_line().await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidUtf8));
        assert_eq!(r.next_line().await.unwrap().as_deref(), Some("fine"));
    }

    #[tokio::test]
    /// 分多次到达的一行应被完整拼接。
    async fn test_line_split_across_reads() {
        let (client, server) = tokio::io::duplex(64);
        let mut r = LineReader::new(server, 1024);
        let writer = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            let mut client = client;
            client.write_all(b"{\"type\":").await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            client.write_all(b"\"ping\"}\n").await.unwrap();
        });
        assert_eq!(r.next_line().await.unwrap().as_deref(), Some("{\"type\":\"ping\"}"));
        writer.await.unwrap();
        assert_eq!(r.next_line().await.unwrap(), None);
    }
}
