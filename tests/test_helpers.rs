// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时数据库、文件夹具写入、Mock 协作方
// ==========================================

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tape_ingest::acquisition::{AttachmentRef, MailboxError, MailboxFilter, MailboxMessage, MailboxProvider};
use tape_ingest::ai::completion::{CompletionBackend, MappingSuggestion, SellerSuggestion};
use tape_ingest::ai::llm_client::LlmError;
use tape_ingest::app::{AppState, Collaborators};
use tape_ingest::domain::field_registry::CanonicalFieldSpec;
use tape_ingest::domain::seller::SellerHint;
use tempfile::TempDir;

/// 三行标准数据带（全部列命中别名）
pub const THREE_ROW_CSV: &str = "Loan Number,Current Bal,State\n\
L-1,\"$1,234.50\",CA\n\
L-2,\"1,234.5\",TX\n\
L-3,(500),NY\n";

/// 创建临时目录与数据库路径
///
/// # 返回
/// - TempDir: 临时目录（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> (TempDir, String) {
    let dir = TempDir::new().expect("临时目录创建失败");
    let db_path = dir.path().join("portfolio.db").to_string_lossy().to_string();
    (dir, db_path)
}

/// 写入夹具文件
pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("夹具写入失败");
    path
}

pub async fn build_state(db_path: &str, collaborators: Collaborators) -> AppState {
    AppState::new(db_path.to_string(), collaborators)
        .await
        .expect("AppState 初始化失败")
}

// ==========================================
// MockCompletionBackend
// ==========================================
#[derive(Default)]
pub struct MockCompletionBackend {
    pub mappings: Vec<MappingSuggestion>,
    pub seller: Option<SellerSuggestion>,
    mapping_calls: AtomicUsize,
    seller_calls: AtomicUsize,
}

impl MockCompletionBackend {
    pub fn with_mappings(mappings: Vec<(&str, Option<&str>, f32)>) -> Self {
        Self {
            mappings: mappings
                .into_iter()
                .map(|(column, target, confidence)| MappingSuggestion {
                    source_column: column.to_string(),
                    target_field: target.map(|t| t.to_string()),
                    confidence,
                })
                .collect(),
            ..Default::default()
        }
    }

    pub fn with_seller(name: &str, confidence: f32) -> Self {
        Self {
            seller: Some(SellerSuggestion {
                seller_name: Some(name.to_string()),
                trade_name: None,
                confidence,
            }),
            ..Default::default()
        }
    }

    pub fn mapping_calls(&self) -> usize {
        self.mapping_calls.load(Ordering::SeqCst)
    }

    pub fn seller_calls(&self) -> usize {
        self.seller_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionBackend for MockCompletionBackend {
    async fn suggest_mapping(
        &self,
        columns: &[String],
        _fields: &[CanonicalFieldSpec],
    ) -> Result<Vec<MappingSuggestion>, LlmError> {
        self.mapping_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .mappings
            .iter()
            .filter(|m| columns.contains(&m.source_column))
            .cloned()
            .collect())
    }

    async fn suggest_seller(
        &self,
        _hint: &SellerHint,
        _known_sellers: &[String],
    ) -> Result<Option<SellerSuggestion>, LlmError> {
        self.seller_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.seller.clone())
    }
}

// ==========================================
// MemoryMailbox
// ==========================================
#[derive(Default)]
pub struct MemoryMailbox {
    messages: Mutex<Vec<MailboxMessage>>,
    files: Mutex<HashMap<(String, String), Vec<u8>>>,
    fail_listing: bool,
}

impl MemoryMailbox {
    /// 列举消息始终失败的邮箱
    pub fn failing() -> Self {
        Self {
            fail_listing: true,
            ..Default::default()
        }
    }

    pub fn add_message(&self, message: MailboxMessage, files: Vec<(&str, &[u8])>) {
        let mut store = self.files.lock().unwrap();
        for (name, bytes) in files {
            store.insert((message.message_id.clone(), name.to_string()), bytes.to_vec());
        }
        self.messages.lock().unwrap().push(message);
    }

    pub fn is_unread(&self, message_id: &str) -> bool {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .any(|m| m.message_id == message_id && m.unread)
    }
}

#[async_trait]
impl MailboxProvider for MemoryMailbox {
    async fn list_messages(&self, filter: &MailboxFilter) -> Result<Vec<MailboxMessage>, MailboxError> {
        if self.fail_listing {
            return Err(MailboxError::Unavailable("mock outage".to_string()));
        }
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect())
    }

    async fn fetch_attachment(&self, message_id: &str, attachment: &AttachmentRef) -> Result<Vec<u8>, MailboxError> {
        self.files
            .lock()
            .unwrap()
            .get(&(message_id.to_string(), attachment.attachment_id.clone()))
            .cloned()
            .ok_or_else(|| MailboxError::AttachmentNotFound {
                message_id: message_id.to_string(),
                attachment_id: attachment.attachment_id.clone(),
            })
    }

    async fn mark_read(&self, message_id: &str) -> Result<(), MailboxError> {
        let mut messages = self.messages.lock().unwrap();
        let message = messages
            .iter_mut()
            .find(|m| m.message_id == message_id)
            .ok_or_else(|| MailboxError::MessageNotFound(message_id.to_string()))?;
        message.unread = false;
        Ok(())
    }
}

pub fn attachment(name: &str) -> AttachmentRef {
    AttachmentRef {
        attachment_id: name.to_string(),
        file_name: name.to_string(),
        size: None,
    }
}

pub fn mail_message(id: &str, sender: &str, subject: &str, attachments: Vec<AttachmentRef>) -> MailboxMessage {
    MailboxMessage {
        message_id: id.to_string(),
        folder: Some("Inbox".to_string()),
        sender: sender.to_string(),
        subject: subject.to_string(),
        body: None,
        received_at: chrono::Utc::now(),
        unread: true,
        attachments,
    }
}

pub fn collaborators_with(
    mailbox: Option<Arc<dyn MailboxProvider>>,
    completion: Option<Arc<dyn CompletionBackend>>,
) -> Collaborators {
    Collaborators {
        mailbox,
        completion,
        decryptor: None,
    }
}
