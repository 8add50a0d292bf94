// ==========================================
// 贷款数据带导入系统 - 邮箱提供者接口
// ==========================================
// 职责: 列出消息 / 下载附件 / 标记已读
// 实现者: LocalMailbox（目录）;外部邮箱服务按同一 trait 接入
// ==========================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::TransientError;

#[derive(Debug, Error)]
pub enum MailboxError {
    #[error("邮箱不可用: {0}")]
    Unavailable(String),

    #[error("消息不存在: {0}")]
    MessageNotFound(String),

    #[error("附件不存在: {message_id}/{attachment_id}")]
    AttachmentNotFound {
        message_id: String,
        attachment_id: String,
    },

    #[error("消息格式错误: {0}")]
    InvalidMessage(String),

    #[error("邮箱 IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

impl TransientError for MailboxError {
    /// 服务不可用与 IO 故障可重试;消息/附件缺失与格式错误重试无意义
    fn is_transient(&self) -> bool {
        matches!(self, MailboxError::Unavailable(_) | MailboxError::Io(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub attachment_id: String,
    pub file_name: String,
    pub size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxMessage {
    pub message_id: String,
    pub folder: Option<String>,
    pub sender: String,
    pub subject: String,
    pub body: Option<String>,
    pub received_at: DateTime<Utc>,
    pub unread: bool,
    pub attachments: Vec<AttachmentRef>,
}

// ==========================================
// MailboxFilter - 扫描过滤条件
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MailboxFilter {
    /// 含下界
    pub since: Option<DateTime<Utc>>,
    /// 不含上界
    pub until: Option<DateTime<Utc>>,
    pub unread_only: bool,
    pub subject_contains: Option<String>,
    pub sender_contains: Option<String>,
    pub folder: Option<String>,
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

impl MailboxFilter {
    pub fn matches(&self, message: &MailboxMessage) -> bool {
        if let Some(since) = self.since {
            if message.received_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if message.received_at >= until {
                return false;
            }
        }
        if self.unread_only && !message.unread {
            return false;
        }
        if let Some(needle) = &self.subject_contains {
            if !contains_ignore_case(&message.subject, needle) {
                return false;
            }
        }
        if let Some(needle) = &self.sender_contains {
            if !contains_ignore_case(&message.sender, needle) {
                return false;
            }
        }
        if let Some(folder) = &self.folder {
            let in_folder = message
                .folder
                .as_deref()
                .map(|f| f.eq_ignore_ascii_case(folder))
                .unwrap_or(false);
            if !in_folder {
                return false;
            }
        }
        true
    }
}

// ==========================================
// MailboxProvider Trait
// ==========================================
#[async_trait]
pub trait MailboxProvider: Send + Sync {
    /// 列出满足过滤条件的消息（按接收时间升序）
    async fn list_messages(&self, filter: &MailboxFilter) -> Result<Vec<MailboxMessage>, MailboxError>;

    async fn fetch_attachment(&self, message_id: &str, attachment: &AttachmentRef) -> Result<Vec<u8>, MailboxError>;

    async fn mark_read(&self, message_id: &str) -> Result<(), MailboxError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn message() -> MailboxMessage {
        MailboxMessage {
            message_id: "m1".to_string(),
            folder: Some("Inbox".to_string()),
            sender: "tapes@acme-capital.com".to_string(),
            subject: "March Tape".to_string(),
            body: None,
            received_at: Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap(),
            unread: true,
            attachments: vec![],
        }
    }

    #[test]
    fn test_filter_window_is_half_open() {
        let msg = message();
        let filter = MailboxFilter {
            since: Some(Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap()),
            until: Some(Utc.with_ymd_and_hms(2024, 3, 6, 0, 0, 0).unwrap()),
            ..Default::default()
        };
        assert!(filter.matches(&msg));

        let filter = MailboxFilter {
            until: Some(Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap()),
            ..Default::default()
        };
        assert!(!filter.matches(&msg));
    }

    #[test]
    fn test_filter_substrings_and_folder() {
        let mut msg = message();
        let filter = MailboxFilter {
            subject_contains: Some("tape".to_string()),
            sender_contains: Some("ACME".to_string()),
            folder: Some("inbox".to_string()),
            unread_only: true,
            ..Default::default()
        };
        assert!(filter.matches(&msg));

        msg.unread = false;
        assert!(!filter.matches(&msg));
    }

    #[test]
    fn test_transient_classification() {
        assert!(MailboxError::Unavailable("503".into()).is_transient());
        assert!(MailboxError::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "slow")).is_transient());
        assert!(!MailboxError::MessageNotFound("m1".into()).is_transient());
        assert!(!MailboxError::AttachmentNotFound {
            message_id: "m1".into(),
            attachment_id: "a1".into(),
        }
        .is_transient());
        assert!(!MailboxError::InvalidMessage("no sender".into()).is_transient());
    }
}
