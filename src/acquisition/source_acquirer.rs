// ==========================================
// 贷款数据带导入系统 - 来源获取
// ==========================================
// 模式: 直接上传（单个文件）/ 邮箱扫描（消息 → 卖方上下文 → 表格附件）
// 红线: 单条消息或单个附件失败只记录并跳过,不中断扫描
// 红线: 邮箱调用在任何存储事务之外完成
// ==========================================

use crate::acquisition::mailbox::{MailboxFilter, MailboxMessage, MailboxProvider};
use crate::domain::seller::{SellerContext, SellerHint};
use crate::domain::types::SourceOrigin;
use crate::engine::seller_resolver::{ResolvePolicy, SellerResolver};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::ContainerFormat;
use crate::retry::RetryPolicy;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// 来源消息摘要
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageRef {
    pub message_id: String,
    pub sender: String,
    pub subject: String,
    pub received_at: DateTime<Utc>,
}

impl From<&MailboxMessage> for MessageRef {
    fn from(message: &MailboxMessage) -> Self {
        Self {
            message_id: message.message_id.clone(),
            sender: message.sender.clone(),
            subject: message.subject.clone(),
            received_at: message.received_at,
        }
    }
}

// ==========================================
// AcquiredSource - 已获取的文件
// ==========================================
#[derive(Debug, Clone)]
pub struct AcquiredSource {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub password: Option<String>,
    pub origin: SourceOrigin,
    pub message: Option<MessageRef>,
    /// 扫描模式下已解析的卖方上下文（上传模式由调用方解析）
    pub context: Option<SellerContext>,
}

/// 被跳过的来源
#[derive(Debug)]
pub struct AcquisitionFailure {
    pub message: Option<MessageRef>,
    pub file_name: Option<String>,
    pub error: ImportError,
}

impl AcquisitionFailure {
    /// 用于结果文件名的标签
    pub fn label(&self) -> String {
        match (&self.file_name, &self.message) {
            (Some(name), _) => name.clone(),
            (None, Some(msg)) => format!("message:{}", msg.message_id),
            (None, None) => "unknown".to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct MailboxScan {
    pub sources: Vec<AcquiredSource>,
    pub failures: Vec<AcquisitionFailure>,
    pub messages_matched: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub policy: ResolvePolicy,
    /// 全部附件下载成功后标记已读（试运行不标记）
    pub mark_read: bool,
    /// 覆盖卖方登记的解密密码
    pub password: Option<String>,
}

// ==========================================
// SourceAcquirer
// ==========================================
pub struct SourceAcquirer {
    mailbox: Option<Arc<dyn MailboxProvider>>,
    retry: RetryPolicy,
}

impl SourceAcquirer {
    pub fn new(mailbox: Option<Arc<dyn MailboxProvider>>, retry: RetryPolicy) -> Self {
        Self { mailbox, retry }
    }

    pub fn has_mailbox(&self) -> bool {
        self.mailbox.is_some()
    }

    /// 上传模式: 读取单个本地文件
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn acquire_upload(&self, path: &Path, password: Option<String>) -> ImportResult<AcquiredSource> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| ImportError::Acquisition(format!("无效的文件路径: {}", path.display())))?;

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ImportError::Acquisition(format!("{}: {}", path.display(), e)))?;

        debug!(file_name = %file_name, size = bytes.len(), "上传文件已读取");
        Ok(AcquiredSource {
            file_name,
            bytes,
            password,
            origin: SourceOrigin::Upload,
            message: None,
            context: None,
        })
    }

    /// 扫描模式
    ///
    /// 邮箱列举在重试耗尽后返回 Acquisition 错误;此后的失败逐条记录在 failures 中。
    #[instrument(skip_all)]
    pub async fn scan(
        &self,
        filter: &MailboxFilter,
        resolver: &dyn SellerResolver,
        options: &ScanOptions,
    ) -> ImportResult<MailboxScan> {
        let mailbox = self
            .mailbox
            .as_deref()
            .ok_or_else(|| ImportError::Acquisition("未配置邮箱".to_string()))?;

        let messages = self
            .retry
            .run("mailbox.list_messages", || mailbox.list_messages(filter))
            .await?;

        let mut scan = MailboxScan {
            messages_matched: messages.len(),
            ..Default::default()
        };
        info!(matched = messages.len(), "邮箱扫描: 消息列举完成");

        for message in &messages {
            self.acquire_message(mailbox, message, resolver, options, &mut scan).await;
        }

        info!(
            sources = scan.sources.len(),
            failures = scan.failures.len(),
            "邮箱扫描完成"
        );
        Ok(scan)
    }

    async fn acquire_message(
        &self,
        mailbox: &dyn MailboxProvider,
        message: &MailboxMessage,
        resolver: &dyn SellerResolver,
        options: &ScanOptions,
        scan: &mut MailboxScan,
    ) {
        let message_ref = MessageRef::from(message);

        let tabular: Vec<_> = message
            .attachments
            .iter()
            .filter(|a| ContainerFormat::from_extension(&a.file_name).is_some())
            .collect();
        if tabular.is_empty() {
            debug!(message_id = %message.message_id, "消息无表格附件,跳过");
            scan.failures.push(AcquisitionFailure {
                message: Some(message_ref),
                file_name: None,
                error: ImportError::Acquisition("消息中没有表格附件".to_string()),
            });
            return;
        }

        let hint = SellerHint {
            sender: Some(message.sender.clone()),
            subject: Some(message.subject.clone()),
            body: message.body.clone(),
            ..Default::default()
        };
        let context = match resolver.resolve(&hint, options.policy).await {
            Ok(context) => context,
            Err(err) => {
                warn!(message_id = %message.message_id, error = %err, "消息卖方解析失败");
                scan.failures.push(AcquisitionFailure {
                    message: Some(message_ref),
                    file_name: None,
                    error: err,
                });
                return;
            }
        };

        let password = options.password.clone().or_else(|| context.tape_password.clone());
        let mut all_fetched = true;

        for attachment in tabular {
            let fetched = self
                .retry
                .run("mailbox.fetch_attachment", || {
                    mailbox.fetch_attachment(&message.message_id, attachment)
                })
                .await;
            match fetched {
                Ok(bytes) => scan.sources.push(AcquiredSource {
                    file_name: attachment.file_name.clone(),
                    bytes,
                    password: password.clone(),
                    origin: SourceOrigin::Mailbox,
                    message: Some(message_ref.clone()),
                    context: Some(context.clone()),
                }),
                Err(err) => {
                    all_fetched = false;
                    warn!(
                        message_id = %message.message_id,
                        file_name = %attachment.file_name,
                        error = %err,
                        "附件下载失败"
                    );
                    scan.failures.push(AcquisitionFailure {
                        message: Some(message_ref.clone()),
                        file_name: Some(attachment.file_name.clone()),
                        error: err.into(),
                    });
                }
            }
        }

        if options.mark_read && all_fetched && !options.policy.dry_run {
            let marked = self
                .retry
                .run("mailbox.mark_read", || mailbox.mark_read(&message.message_id))
                .await;
            if let Err(err) = marked {
                warn!(message_id = %message.message_id, error = %err, "标记已读失败");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::mailbox::{AttachmentRef, MailboxError};
    use crate::domain::seller::SellerResolution;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MemoryMailbox {
        messages: Vec<MailboxMessage>,
        files: HashMap<(String, String), Vec<u8>>,
        read: Mutex<Vec<String>>,
        fetches: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MailboxProvider for MemoryMailbox {
        async fn list_messages(&self, filter: &MailboxFilter) -> Result<Vec<MailboxMessage>, MailboxError> {
            Ok(self.messages.iter().filter(|m| filter.matches(m)).cloned().collect())
        }

        async fn fetch_attachment(&self, message_id: &str, attachment: &AttachmentRef) -> Result<Vec<u8>, MailboxError> {
            self.fetches.lock().unwrap().push(attachment.attachment_id.clone());
            self.files
                .get(&(message_id.to_string(), attachment.attachment_id.clone()))
                .cloned()
                .ok_or_else(|| MailboxError::AttachmentNotFound {
                    message_id: message_id.to_string(),
                    attachment_id: attachment.attachment_id.clone(),
                })
        }

        async fn mark_read(&self, message_id: &str) -> Result<(), MailboxError> {
            self.read.lock().unwrap().push(message_id.to_string());
            Ok(())
        }
    }

    struct FixedResolver;

    #[async_trait]
    impl SellerResolver for FixedResolver {
        async fn resolve(&self, hint: &SellerHint, _policy: ResolvePolicy) -> ImportResult<SellerContext> {
            if hint.sender.as_deref() == Some("stranger@nowhere.com") {
                return Err(ImportError::UnresolvedSeller("stranger".to_string()));
            }
            Ok(SellerContext {
                seller_id: Some(1),
                seller_name: "Acme".to_string(),
                trade_id: None,
                trade_name: None,
                resolution: SellerResolution::Rule,
                tape_password: Some("secret".to_string()),
            })
        }
    }

    fn attachment(name: &str) -> AttachmentRef {
        AttachmentRef {
            attachment_id: name.to_string(),
            file_name: name.to_string(),
            size: None,
        }
    }

    fn message(id: &str, sender: &str, attachments: Vec<AttachmentRef>) -> MailboxMessage {
        MailboxMessage {
            message_id: id.to_string(),
            folder: None,
            sender: sender.to_string(),
            subject: "Tape".to_string(),
            body: None,
            received_at: Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap(),
            unread: true,
            attachments,
        }
    }

    fn mailbox() -> Arc<MemoryMailbox> {
        let mut files = HashMap::new();
        files.insert(("m1".to_string(), "tape.csv".to_string()), b"Loan Number\nL1\n".to_vec());
        Arc::new(MemoryMailbox {
            messages: vec![
                message("m1", "ops@acme.com", vec![attachment("tape.csv"), attachment("logo.png")]),
                message("m2", "ops@acme.com", vec![attachment("memo.pdf")]),
                message("m3", "stranger@nowhere.com", vec![attachment("x.csv")]),
                message("m4", "ops@acme.com", vec![attachment("missing.xlsx")]),
            ],
            files,
            read: Mutex::new(Vec::new()),
            fetches: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_scan_records_failures_and_continues() {
        let mailbox = mailbox();
        let acquirer = SourceAcquirer::new(Some(mailbox.clone()), RetryPolicy::none());
        let options = ScanOptions {
            mark_read: true,
            ..Default::default()
        };

        let scan = acquirer
            .scan(&MailboxFilter::default(), &FixedResolver, &options)
            .await
            .unwrap();

        assert_eq!(scan.messages_matched, 4);
        assert_eq!(scan.sources.len(), 1);
        assert_eq!(scan.sources[0].file_name, "tape.csv");
        assert_eq!(scan.sources[0].password.as_deref(), Some("secret"));
        assert_eq!(scan.failures.len(), 3);
        assert_eq!(*mailbox.read.lock().unwrap(), vec!["m1".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_attachment_is_fetched_once() {
        let mailbox = mailbox();
        let acquirer = SourceAcquirer::new(Some(mailbox.clone()), RetryPolicy::new(4, 0));

        let scan = acquirer
            .scan(&MailboxFilter::default(), &FixedResolver, &ScanOptions::default())
            .await
            .unwrap();

        assert_eq!(scan.sources.len(), 1);
        let fetches = mailbox.fetches.lock().unwrap();
        let missing = fetches.iter().filter(|id| id.as_str() == "missing.xlsx").count();
        assert_eq!(missing, 1);
    }

    #[tokio::test]
    async fn test_dry_run_scan_does_not_mark_read() {
        let mailbox = mailbox();
        let acquirer = SourceAcquirer::new(Some(mailbox.clone()), RetryPolicy::none());
        let options = ScanOptions {
            mark_read: true,
            policy: ResolvePolicy {
                dry_run: true,
                ..Default::default()
            },
            ..Default::default()
        };
        acquirer
            .scan(&MailboxFilter::default(), &FixedResolver, &options)
            .await
            .unwrap();
        assert!(mailbox.read.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scan_without_mailbox_is_acquisition_error() {
        let acquirer = SourceAcquirer::new(None, RetryPolicy::none());
        let result = acquirer
            .scan(&MailboxFilter::default(), &FixedResolver, &ScanOptions::default())
            .await;
        assert!(matches!(result, Err(ImportError::Acquisition(_))));
    }

    #[tokio::test]
    async fn test_upload_missing_file() {
        let acquirer = SourceAcquirer::new(None, RetryPolicy::none());
        let result = acquirer
            .acquire_upload(Path::new("/nonexistent/tape.csv"), None)
            .await;
        assert!(matches!(result, Err(ImportError::Acquisition(_))));
    }
}
