// ==========================================
// 贷款数据带导入系统 - 目录邮箱
// ==========================================
// 布局: <root>/<消息目录>/message.json + 附件文件
// message.json: id / folder / sender / subject / body / received_at / unread
// ==========================================

use crate::acquisition::mailbox::{AttachmentRef, MailboxError, MailboxFilter, MailboxMessage, MailboxProvider};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

const MESSAGE_FILE: &str = "message.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MessageFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default)]
    folder: Option<String>,
    sender: String,
    subject: String,
    #[serde(default)]
    body: Option<String>,
    received_at: DateTime<Utc>,
    #[serde(default = "default_unread")]
    unread: bool,
}

fn default_unread() -> bool {
    true
}

pub struct LocalMailbox {
    root: PathBuf,
}

impl LocalMailbox {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn message_dir(&self, message_id: &str) -> PathBuf {
        self.root.join(message_id)
    }

    async fn read_message_file(dir: &Path) -> Result<MessageFile, MailboxError> {
        let raw = tokio::fs::read_to_string(dir.join(MESSAGE_FILE)).await?;
        serde_json::from_str(&raw)
            .map_err(|e| MailboxError::InvalidMessage(format!("{}: {}", dir.display(), e)))
    }

    async fn load_message(dir: &Path) -> Result<MailboxMessage, MailboxError> {
        let file = Self::read_message_file(dir).await?;
        let dir_name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let mut attachments = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !metadata.is_file() || name == MESSAGE_FILE {
                continue;
            }
            attachments.push(AttachmentRef {
                attachment_id: name.clone(),
                file_name: name,
                size: Some(metadata.len()),
            });
        }
        attachments.sort_by(|a, b| a.file_name.cmp(&b.file_name));

        Ok(MailboxMessage {
            // 消息 ID 即目录名,用于回查附件
            message_id: dir_name,
            folder: file.folder,
            sender: file.sender,
            subject: file.subject,
            body: file.body,
            received_at: file.received_at,
            unread: file.unread,
            attachments,
        })
    }
}

#[async_trait]
impl MailboxProvider for LocalMailbox {
    async fn list_messages(&self, filter: &MailboxFilter) -> Result<Vec<MailboxMessage>, MailboxError> {
        if !self.root.is_dir() {
            return Err(MailboxError::Unavailable(format!(
                "邮箱目录不存在: {}",
                self.root.display()
            )));
        }

        let mut messages = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let dir = entry.path();
            if !dir.join(MESSAGE_FILE).is_file() {
                continue;
            }
            let message = Self::load_message(&dir).await?;
            if filter.matches(&message) {
                messages.push(message);
            }
        }
        messages.sort_by(|a, b| {
            a.received_at
                .cmp(&b.received_at)
                .then_with(|| a.message_id.cmp(&b.message_id))
        });
        debug!(count = messages.len(), root = %self.root.display(), "目录邮箱列举完成");
        Ok(messages)
    }

    async fn fetch_attachment(&self, message_id: &str, attachment: &AttachmentRef) -> Result<Vec<u8>, MailboxError> {
        let dir = self.message_dir(message_id);
        if !dir.join(MESSAGE_FILE).is_file() {
            return Err(MailboxError::MessageNotFound(message_id.to_string()));
        }
        // 附件 ID 只能是目录内的文件名
        let name = Path::new(&attachment.attachment_id)
            .file_name()
            .filter(|n| *n != MESSAGE_FILE)
            .ok_or_else(|| MailboxError::AttachmentNotFound {
                message_id: message_id.to_string(),
                attachment_id: attachment.attachment_id.clone(),
            })?;
        let path = dir.join(name);
        if !path.is_file() {
            return Err(MailboxError::AttachmentNotFound {
                message_id: message_id.to_string(),
                attachment_id: attachment.attachment_id.clone(),
            });
        }
        Ok(tokio::fs::read(path).await?)
    }

    async fn mark_read(&self, message_id: &str) -> Result<(), MailboxError> {
        let dir = self.message_dir(message_id);
        if !dir.join(MESSAGE_FILE).is_file() {
            return Err(MailboxError::MessageNotFound(message_id.to_string()));
        }
        let mut file = Self::read_message_file(&dir).await?;
        file.unread = false;
        let raw = serde_json::to_string_pretty(&file)
            .map_err(|e| MailboxError::InvalidMessage(e.to_string()))?;
        tokio::fs::write(dir.join(MESSAGE_FILE), raw).await?;
        Ok(())
    }
}
