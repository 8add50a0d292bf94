// ==========================================
// 贷款数据带导入系统 - 应用状态
// ==========================================
// 职责: 组装共享连接、配置、仓储、引擎与 API 实例
// ==========================================

use crate::acquisition::mailbox::MailboxProvider;
use crate::acquisition::source_acquirer::SourceAcquirer;
use crate::ai::completion::CompletionBackend;
use crate::ai::llm_backend::LlmCompletionBackend;
use crate::ai::llm_client::{LlmClient, LlmConfig};
use crate::api::error::{ApiError, ApiResult};
use crate::api::ingest_api::IngestApi;
use crate::config::{ConfigManager, IngestConfigReader};
use crate::db::{init_schema, open_sqlite_connection};
use crate::domain::field_registry::FieldRegistry;
use crate::engine::orchestrator::IngestOrchestrator;
use crate::engine::repositories::IngestRepositories;
use crate::engine::seller_resolver::SellerResolverImpl;
use crate::importer::file_parser::{TabularReader, WorkbookDecryptor};
use crate::importer::tape_importer_impl::TapeImporterImpl;
use std::sync::{Arc, Mutex};
use tracing::info;

/// 可注入的外部能力
#[derive(Clone, Default)]
pub struct Collaborators {
    pub mailbox: Option<Arc<dyn MailboxProvider>>,
    pub completion: Option<Arc<dyn CompletionBackend>>,
    pub decryptor: Option<Arc<dyn WorkbookDecryptor>>,
}

impl Collaborators {
    /// AI 后端按环境变量配置（未配置网关时为 None）
    pub fn from_env(mailbox: Option<Arc<dyn MailboxProvider>>) -> Self {
        let completion = LlmConfig::from_env().map(|config| {
            Arc::new(LlmCompletionBackend::new(LlmClient::new(config))) as Arc<dyn CompletionBackend>
        });
        Self {
            mailbox,
            completion,
            decryptor: None,
        }
    }
}

/// 应用状态
pub struct AppState {
    pub db_path: String,
    pub config: Arc<ConfigManager>,
    pub registry: Arc<FieldRegistry>,
    pub repositories: IngestRepositories,
    pub ingest_api: Arc<IngestApi>,
}

impl AppState {
    /// 打开数据库、建表并组装全部组件
    pub async fn new(db_path: String, collaborators: Collaborators) -> ApiResult<Self> {
        info!(db_path = %db_path, "初始化 AppState");

        let conn = open_sqlite_connection(&db_path)
            .map_err(|e| ApiError::DatabaseConnectionError(format!("无法打开数据库: {}", e)))?;
        init_schema(&conn).map_err(|e| ApiError::DatabaseError(format!("建表失败: {}", e)))?;
        let conn = Arc::new(Mutex::new(conn));

        // ===== 配置 / 注册表 / 仓储 =====
        let config = Arc::new(ConfigManager::from_connection(conn.clone())?);
        let registry = Arc::new(FieldRegistry::standard());
        let repositories = IngestRepositories::from_connection(conn);

        // ===== 卖方解析 =====
        let mut resolver = SellerResolverImpl::new(repositories.seller_repo.clone());
        if let Some(backend) = &collaborators.completion {
            if config.get_ai_enabled().await? {
                resolver = resolver.with_completion(
                    backend.clone(),
                    config.get_ai_confidence_threshold().await?,
                    config.ai_retry_policy().await?,
                );
            }
        }

        // ===== 来源获取 / 导入器 =====
        let acquirer = SourceAcquirer::new(collaborators.mailbox.clone(), config.mailbox_retry_policy().await?);
        let importer = TapeImporterImpl::new(repositories.portfolio_repo(), registry.clone());
        let reader = match &collaborators.decryptor {
            Some(decryptor) => TabularReader::with_decryptor(decryptor.clone()),
            None => TabularReader::new(),
        };

        let mut orchestrator = IngestOrchestrator::new(
            config.clone(),
            registry.clone(),
            acquirer,
            Arc::new(resolver),
            Arc::new(importer),
            repositories.artifact_repo.clone(),
            repositories.run_repo.clone(),
        )
        .with_reader(reader);
        let ai_configured = collaborators.completion.is_some();
        if let Some(backend) = collaborators.completion {
            orchestrator = orchestrator.with_completion(backend);
        }

        info!(
            registry_version = registry.version(),
            ai = ai_configured,
            "AppState 初始化完成"
        );
        Ok(Self {
            db_path,
            config,
            registry,
            repositories,
            ingest_api: Arc::new(IngestApi::new(orchestrator)),
        })
    }
}
