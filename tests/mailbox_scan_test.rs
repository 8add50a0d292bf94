// ==========================================
// 邮箱扫描集成测试
// ==========================================
// 测试目标: 邮件附件获取、卖方规则匹配、单条失败隔离、标记已读
// ==========================================

mod test_helpers;

use std::sync::Arc;
use tape_ingest::acquisition::{MailboxFilter, MailboxProvider};
use tape_ingest::ai::completion::CompletionBackend;
use tape_ingest::api::ApiError;
use tape_ingest::domain::{FieldMapping, IngestOptions, RunState};
use tape_ingest::repository::{ImportRunRepository, PortfolioRepository, SellerRepository};
use test_helpers::{
    attachment, build_state, collaborators_with, create_test_db, mail_message, MemoryMailbox,
    MockCompletionBackend, THREE_ROW_CSV,
};

fn mark_read() -> IngestOptions {
    IngestOptions {
        mark_read: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_empty_mailbox_yields_no_results() {
    let (_dir, db_path) = create_test_db();
    let mailbox = Arc::new(MemoryMailbox::default());
    let state = build_state(
        &db_path,
        collaborators_with(Some(mailbox as Arc<dyn MailboxProvider>), None),
    )
    .await;

    let results = state
        .ingest_api
        .scan_mailbox(&MailboxFilter::default(), IngestOptions::default())
        .await
        .unwrap();
    assert!(results.is_empty());
    assert_eq!(state.repositories.run_repo.count_runs().await.unwrap(), 0);
}

#[tokio::test]
async fn test_rule_matched_attachment_is_imported_and_marked_read() {
    let (_dir, db_path) = create_test_db();
    let mailbox = Arc::new(MemoryMailbox::default());
    mailbox.add_message(
        mail_message("m-1", "tapes@acme.com", "March tape", vec![attachment("tape.csv")]),
        vec![("tape.csv", THREE_ROW_CSV.as_bytes())],
    );
    let state = build_state(
        &db_path,
        collaborators_with(Some(mailbox.clone() as Arc<dyn MailboxProvider>), None),
    )
    .await;
    let seller = state.repositories.seller_repo.create_seller("Acme").await.unwrap();
    state
        .repositories
        .seller_repo
        .add_rule(seller.seller_id, Some("@acme\\.com$"), None, 10)
        .await
        .unwrap();

    let results = state
        .ingest_api
        .scan_mailbox(&MailboxFilter::default(), mark_read())
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.state, RunState::Complete, "failure: {:?}", result.failure);
    assert_eq!(result.seller_id, Some(seller.seller_id));
    assert_eq!(result.created, 3);
    assert!(!mailbox.is_unread("m-1"));

    let count = state
        .repositories
        .portfolio_repo()
        .count_assets(seller.seller_id)
        .await
        .unwrap();
    assert_eq!(count, 3);
}

#[tokio::test]
async fn test_one_bad_message_does_not_stop_the_scan() {
    let (_dir, db_path) = create_test_db();
    let mailbox = Arc::new(MemoryMailbox::default());
    mailbox.add_message(
        mail_message("m-1", "tapes@acme.com", "March tape", vec![attachment("tape.csv")]),
        vec![("tape.csv", THREE_ROW_CSV.as_bytes())],
    );
    // 无可识别卖方
    mailbox.add_message(
        mail_message("m-2", "someone@unknown.org", "hello", vec![attachment("loans.csv")]),
        vec![("loans.csv", THREE_ROW_CSV.as_bytes())],
    );
    // 附件不是数据表
    mailbox.add_message(
        mail_message("m-3", "tapes@acme.com", "see attached", vec![attachment("memo.pdf")]),
        vec![("memo.pdf", b"%PDF-1.4".as_slice())],
    );
    let state = build_state(
        &db_path,
        collaborators_with(Some(mailbox.clone() as Arc<dyn MailboxProvider>), None),
    )
    .await;
    let seller = state.repositories.seller_repo.create_seller("Acme").await.unwrap();
    state
        .repositories
        .seller_repo
        .add_rule(seller.seller_id, Some("acme\\.com"), None, 10)
        .await
        .unwrap();

    let results = state
        .ingest_api
        .scan_mailbox(&MailboxFilter::default(), mark_read())
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    let complete: Vec<_> = results.iter().filter(|r| r.state == RunState::Complete).collect();
    let failed: Vec<_> = results.iter().filter(|r| r.state == RunState::Failed).collect();
    assert_eq!(complete.len(), 1);
    assert_eq!(failed.len(), 2);
    assert!(failed.iter().all(|r| r.failure.is_some()));

    assert!(!mailbox.is_unread("m-1"));
    assert!(mailbox.is_unread("m-2"));
    assert_eq!(state.repositories.run_repo.count_runs().await.unwrap(), 3);
}

#[tokio::test]
async fn test_dry_run_scan_leaves_mailbox_untouched() {
    let (_dir, db_path) = create_test_db();
    let mailbox = Arc::new(MemoryMailbox::default());
    mailbox.add_message(
        mail_message("m-1", "tapes@acme.com", "March tape", vec![attachment("tape.csv")]),
        vec![("tape.csv", THREE_ROW_CSV.as_bytes())],
    );
    let state = build_state(
        &db_path,
        collaborators_with(Some(mailbox.clone() as Arc<dyn MailboxProvider>), None),
    )
    .await;
    let seller = state.repositories.seller_repo.create_seller("Acme").await.unwrap();
    state
        .repositories
        .seller_repo
        .add_rule(seller.seller_id, None, Some("tape"), 1)
        .await
        .unwrap();

    let options = IngestOptions {
        dry_run: true,
        mark_read: true,
        ..Default::default()
    };
    let results = state
        .ingest_api
        .scan_mailbox(&MailboxFilter::default(), options)
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].created, 3);
    assert!(mailbox.is_unread("m-1"));
    assert_eq!(
        state
            .repositories
            .portfolio_repo()
            .count_assets(seller.seller_id)
            .await
            .unwrap(),
        0
    );
    assert_eq!(state.repositories.run_repo.count_runs().await.unwrap(), 0);
}

#[tokio::test]
async fn test_ai_seller_inference_when_no_rule_matches() {
    let (_dir, db_path) = create_test_db();
    let mailbox = Arc::new(MemoryMailbox::default());
    mailbox.add_message(
        mail_message("m-1", "ops@servicer.net", "Acme pool update", vec![attachment("tape.csv")]),
        vec![("tape.csv", THREE_ROW_CSV.as_bytes())],
    );
    let backend = Arc::new(MockCompletionBackend::with_seller("acme", 0.9));
    let state = build_state(
        &db_path,
        collaborators_with(
            Some(mailbox as Arc<dyn MailboxProvider>),
            Some(backend.clone() as Arc<dyn CompletionBackend>),
        ),
    )
    .await;
    let seller = state.repositories.seller_repo.create_seller("Acme").await.unwrap();

    let results = state
        .ingest_api
        .scan_mailbox(&MailboxFilter::default(), IngestOptions::default())
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].state, RunState::Complete, "failure: {:?}", results[0].failure);
    assert_eq!(results[0].seller_id, Some(seller.seller_id));
    assert_eq!(backend.seller_calls(), 1);
}

#[tokio::test]
async fn test_mailbox_outage_is_an_error() {
    let (_dir, db_path) = create_test_db();
    let mailbox = Arc::new(MemoryMailbox::failing());
    let state = build_state(
        &db_path,
        collaborators_with(Some(mailbox as Arc<dyn MailboxProvider>), None),
    )
    .await;
    let result = state
        .ingest_api
        .scan_mailbox(&MailboxFilter::default(), IngestOptions::default())
        .await;
    assert!(matches!(result, Err(ApiError::AcquisitionError(_))));
}

#[tokio::test]
async fn test_scan_rejects_mapping_override_and_inverted_window() {
    let (_dir, db_path) = create_test_db();
    let mailbox = Arc::new(MemoryMailbox::default());
    let state = build_state(
        &db_path,
        collaborators_with(Some(mailbox as Arc<dyn MailboxProvider>), None),
    )
    .await;

    let options = IngestOptions {
        manual_mapping: Some(FieldMapping::new()),
        ..Default::default()
    };
    let result = state
        .ingest_api
        .scan_mailbox(&MailboxFilter::default(), options)
        .await;
    assert!(matches!(result, Err(ApiError::InvalidInput(_))));

    let now = chrono::Utc::now();
    let filter = MailboxFilter {
        since: Some(now),
        until: Some(now - chrono::Duration::days(1)),
        ..Default::default()
    };
    let result = state
        .ingest_api
        .scan_mailbox(&filter, IngestOptions::default())
        .await;
    assert!(matches!(result, Err(ApiError::InvalidInput(_))));
}

#[tokio::test]
async fn test_local_mailbox_directory_scan() {
    let (dir, db_path) = create_test_db();
    let message_dir = dir.path().join("mail").join("msg-001");
    std::fs::create_dir_all(&message_dir).unwrap();
    std::fs::write(
        message_dir.join("message.json"),
        r#"{"sender":"tapes@acme.com","subject":"April tape","received_at":"2024-04-02T09:00:00Z"}"#,
    )
    .unwrap();
    std::fs::write(message_dir.join("april.csv"), THREE_ROW_CSV).unwrap();

    let mailbox = Arc::new(tape_ingest::acquisition::LocalMailbox::new(dir.path().join("mail")));
    let state = build_state(
        &db_path,
        collaborators_with(Some(mailbox.clone() as Arc<dyn MailboxProvider>), None),
    )
    .await;
    let seller = state.repositories.seller_repo.create_seller("Acme").await.unwrap();
    state
        .repositories
        .seller_repo
        .add_rule(seller.seller_id, Some("acme"), Some("tape"), 5)
        .await
        .unwrap();

    let results = state
        .ingest_api
        .scan_mailbox(&MailboxFilter::default(), mark_read())
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].file_name, "april.csv");
    assert_eq!(results[0].created, 3);

    let remaining = mailbox
        .list_messages(&MailboxFilter {
            unread_only: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(remaining.is_empty());
}
