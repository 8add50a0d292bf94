// ==========================================
// 贷款数据带导入系统 - 命令行入口
// ==========================================
// 子命令: ingest-file / scan-mailbox（每次调用二选一）
// 输出: ImportBatchResult JSON（stdout）;日志写 stderr
// 退出码: 任一结果为 FAILED 时非零
// ==========================================

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tape_ingest::acquisition::{LocalMailbox, MailboxFilter, MailboxProvider};
use tape_ingest::app::{AppState, Collaborators};
use tape_ingest::db::get_default_db_path;
use tape_ingest::domain::IngestOptions;
use tape_ingest::logging;

#[derive(Parser)]
#[command(name = "tape-ingest")]
#[command(about = "供应商贷款数据带导入")]
#[command(version)]
struct Cli {
    /// 数据库路径（默认取 TAPE_INGEST_DB_PATH 或用户数据目录）
    #[arg(long, global = true)]
    db: Option<String>,

    /// 以 JSON 行格式输出日志
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 导入单个文件
    IngestFile {
        path: PathBuf,
        /// 卖方 ID 或名称
        #[arg(long)]
        seller: Option<String>,
        /// 交易 ID 或名称
        #[arg(long)]
        trade: Option<String>,
        /// 按 ID 加载映射配置并原样应用
        #[arg(long)]
        mapping_artifact_id: Option<i64>,
        #[command(flatten)]
        run: RunArgs,
    },
    /// 扫描目录邮箱并导入附件
    ScanMailbox {
        /// 邮箱根目录（每条消息一个子目录）
        #[arg(long)]
        mailbox_dir: PathBuf,
        /// 起始时间（含）: RFC 3339 或 YYYY-MM-DD
        #[arg(long, value_parser = parse_instant)]
        since: Option<DateTime<Utc>>,
        /// 截止时间（不含）
        #[arg(long, value_parser = parse_instant)]
        until: Option<DateTime<Utc>>,
        #[arg(long)]
        unread_only: bool,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        sender: Option<String>,
        #[arg(long)]
        folder: Option<String>,
        /// 附件下载完成后标记已读
        #[arg(long)]
        mark_read: bool,
        #[command(flatten)]
        run: RunArgs,
    },
}

#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    auto_create: bool,
    #[arg(long)]
    dry_run: bool,
    #[arg(long)]
    disable_ai: bool,
    /// 工作表名称或 0 起序号
    #[arg(long)]
    sheet: Option<String>,
    #[arg(long, default_value_t = 0)]
    skip_rows: usize,
    #[arg(long)]
    row_limit: Option<usize>,
    #[arg(long)]
    batch_size: Option<usize>,
    /// 只插入未出现过的身份,不更新已有记录
    #[arg(long)]
    insert_only: bool,
    #[arg(long)]
    save_mapping_as: Option<String>,
    /// 保存的映射配置设为该卖方默认
    #[arg(long, requires = "save_mapping_as")]
    default_mapping: bool,
    /// 解密密码（优先于卖方登记的密码）
    #[arg(long)]
    password: Option<String>,
}

impl RunArgs {
    fn into_options(self) -> IngestOptions {
        IngestOptions {
            auto_create: self.auto_create,
            dry_run: self.dry_run,
            disable_ai: self.disable_ai,
            sheet_selector: self.sheet,
            skip_rows: self.skip_rows,
            row_limit: self.row_limit,
            batch_size: self.batch_size,
            update_existing: !self.insert_only,
            save_mapping_as: self.save_mapping_as,
            save_mapping_as_default: self.default_mapping,
            password: self.password,
            ..Default::default()
        }
    }
}

fn parse_instant(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| format!("无法解析时间: {}", raw))
}

fn emit<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if cli.json_logs {
        logging::init_json();
    } else {
        logging::init();
    }
    tracing::info!(version = tape_ingest::VERSION, "{}", tape_ingest::APP_NAME);

    let db_path = cli.db.unwrap_or_else(get_default_db_path);

    let any_failed = match cli.command {
        Commands::IngestFile {
            path,
            seller,
            trade,
            mapping_artifact_id,
            run,
        } => {
            let state = AppState::new(db_path, Collaborators::from_env(None))
                .await
                .context("初始化失败")?;
            let auto_create = run.auto_create;
            let mut options = run.into_options();
            options.mapping_artifact_id = mapping_artifact_id;

            let result = state
                .ingest_api
                .ingest_file(
                    &path.to_string_lossy(),
                    seller.as_deref(),
                    trade.as_deref(),
                    auto_create,
                    options,
                )
                .await?;
            emit(&result)?;
            result.is_failed()
        }
        Commands::ScanMailbox {
            mailbox_dir,
            since,
            until,
            unread_only,
            subject,
            sender,
            folder,
            mark_read,
            run,
        } => {
            let mailbox: Arc<dyn MailboxProvider> = Arc::new(LocalMailbox::new(mailbox_dir));
            let state = AppState::new(db_path, Collaborators::from_env(Some(mailbox)))
                .await
                .context("初始化失败")?;
            let filter = MailboxFilter {
                since,
                until,
                unread_only,
                subject_contains: subject,
                sender_contains: sender,
                folder,
            };
            let mut options = run.into_options();
            options.mark_read = mark_read;

            let results = state.ingest_api.scan_mailbox(&filter, options).await?;
            emit(&results)?;
            results.iter().any(|r| r.is_failed())
        }
    };

    if any_failed {
        std::process::exit(1);
    }
    Ok(())
}
