// ==========================================
// 贷款数据带导入系统 - 来源获取层
// ==========================================

pub mod local_mailbox;
pub mod mailbox;
pub mod source_acquirer;

pub use local_mailbox::LocalMailbox;
pub use mailbox::{AttachmentRef, MailboxError, MailboxFilter, MailboxMessage, MailboxProvider};
pub use source_acquirer::{AcquiredSource, AcquisitionFailure, MailboxScan, MessageRef, ScanOptions, SourceAcquirer};
