// ==========================================
// 贷款数据带导入系统 - 映射配置 Repository
// ==========================================
// 职责: mapping_artifact 表读写
// 红线: 每个卖方至多一个默认配置,清除旧默认与写入新默认在同一事务内完成
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::field_registry::REGISTRY_VERSION;
use crate::domain::mapping::{FieldMapping, MappingArtifact};
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};
use tracing::info;

// ==========================================
// MappingArtifactRepository Trait
// ==========================================
#[async_trait]
pub trait MappingArtifactRepository: Send + Sync {
    async fn get_default_for_seller(&self, seller_id: i64) -> RepositoryResult<Option<MappingArtifact>>;

    async fn get(&self, artifact_id: i64) -> RepositoryResult<Option<MappingArtifact>>;

    async fn list_for_seller(&self, seller_id: i64) -> RepositoryResult<Vec<MappingArtifact>>;

    /// 保存配置（同卖方同名则覆盖）,返回 artifact_id
    ///
    /// is_default=true 时在同一事务内清除该卖方的旧默认。
    async fn save(&self, artifact: &MappingArtifact) -> RepositoryResult<i64>;

    async fn increment_usage(&self, artifact_id: i64) -> RepositoryResult<()>;
}

// ==========================================
// MappingArtifactRepositoryImpl
// ==========================================
pub struct MappingArtifactRepositoryImpl {
    conn: Arc<Mutex<Connection>>,
}

const SELECT_COLUMNS: &str = r#"
    SELECT artifact_id, name, seller_id, resolution_method, source_columns, mapping_json,
           is_default, usage_count, created_at, updated_at, last_used_at
    FROM mapping_artifact
"#;

struct ArtifactRow {
    artifact_id: i64,
    name: String,
    seller_id: Option<i64>,
    resolution_method: String,
    source_columns: String,
    mapping_json: String,
    is_default: bool,
    usage_count: i64,
    created_at: String,
    updated_at: String,
    last_used_at: Option<String>,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<ArtifactRow> {
    Ok(ArtifactRow {
        artifact_id: row.get(0)?,
        name: row.get(1)?,
        seller_id: row.get(2)?,
        resolution_method: row.get(3)?,
        source_columns: row.get(4)?,
        mapping_json: row.get(5)?,
        is_default: row.get::<_, i64>(6)? != 0,
        usage_count: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
        last_used_at: row.get(10)?,
    })
}

fn parse_timestamp(raw: &str) -> RepositoryResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::ValidationError(format!("时间戳格式错误 {}: {}", raw, e)))
}

impl ArtifactRow {
    fn into_artifact(self) -> RepositoryResult<MappingArtifact> {
        let source_columns: Vec<String> = serde_json::from_str(&self.source_columns)?;
        let mapping: FieldMapping = serde_json::from_str(&self.mapping_json)?;
        Ok(MappingArtifact {
            artifact_id: Some(self.artifact_id),
            name: self.name,
            seller_id: self.seller_id,
            resolution_method: self.resolution_method,
            source_columns,
            mapping,
            is_default: self.is_default,
            usage_count: self.usage_count,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            last_used_at: self.last_used_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

impl MappingArtifactRepositoryImpl {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn lock(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }
}

#[async_trait]
impl MappingArtifactRepository for MappingArtifactRepositoryImpl {
    async fn get_default_for_seller(&self, seller_id: i64) -> RepositoryResult<Option<MappingArtifact>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("{} WHERE seller_id = ?1 AND is_default = 1", SELECT_COLUMNS),
                params![seller_id],
                read_row,
            )
            .optional()?;
        row.map(ArtifactRow::into_artifact).transpose()
    }

    async fn get(&self, artifact_id: i64) -> RepositoryResult<Option<MappingArtifact>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("{} WHERE artifact_id = ?1", SELECT_COLUMNS),
                params![artifact_id],
                read_row,
            )
            .optional()?;
        row.map(ArtifactRow::into_artifact).transpose()
    }

    async fn list_for_seller(&self, seller_id: i64) -> RepositoryResult<Vec<MappingArtifact>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE seller_id = ?1 ORDER BY is_default DESC, usage_count DESC, artifact_id ASC",
            SELECT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![seller_id], read_row)?;

        let mut artifacts = Vec::new();
        for row in rows {
            artifacts.push(row?.into_artifact()?);
        }
        Ok(artifacts)
    }

    async fn save(&self, artifact: &MappingArtifact) -> RepositoryResult<i64> {
        if artifact.is_default && artifact.seller_id.is_none() {
            return Err(RepositoryError::ValidationError(
                "默认映射配置必须归属某个卖方".to_string(),
            ));
        }

        let source_columns = serde_json::to_string(&artifact.source_columns)?;
        let mapping_json = serde_json::to_string(&artifact.mapping)?;
        let now = Utc::now().to_rfc3339();

        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        // 读-改-写: 清除旧默认与写入在同一事务内
        if artifact.is_default {
            tx.execute(
                "UPDATE mapping_artifact SET is_default = 0, updated_at = ?2 WHERE seller_id = ?1 AND is_default = 1",
                params![artifact.seller_id, now],
            )?;
        }

        let existing: Option<i64> = tx
            .query_row(
                "SELECT artifact_id FROM mapping_artifact WHERE seller_id IS ?1 AND name = ?2",
                params![artifact.seller_id, artifact.name],
                |row| row.get(0),
            )
            .optional()?;

        let artifact_id = match existing {
            Some(artifact_id) => {
                tx.execute(
                    r#"
                    UPDATE mapping_artifact SET
                        resolution_method = ?2,
                        source_columns = ?3,
                        mapping_json = ?4,
                        registry_version = ?5,
                        is_default = ?6,
                        updated_at = ?7
                    WHERE artifact_id = ?1
                    "#,
                    params![
                        artifact_id,
                        artifact.resolution_method,
                        source_columns,
                        mapping_json,
                        REGISTRY_VERSION,
                        artifact.is_default as i32,
                        now,
                    ],
                )?;
                artifact_id
            }
            None => {
                tx.execute(
                    r#"
                    INSERT INTO mapping_artifact (
                        name, seller_id, resolution_method, source_columns, mapping_json,
                        registry_version, is_default, usage_count, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?8)
                    "#,
                    params![
                        artifact.name,
                        artifact.seller_id,
                        artifact.resolution_method,
                        source_columns,
                        mapping_json,
                        REGISTRY_VERSION,
                        artifact.is_default as i32,
                        now,
                    ],
                )?;
                tx.last_insert_rowid()
            }
        };

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        info!(
            artifact_id,
            name = %artifact.name,
            seller_id = ?artifact.seller_id,
            is_default = artifact.is_default,
            "映射配置已保存"
        );
        Ok(artifact_id)
    }

    async fn increment_usage(&self, artifact_id: i64) -> RepositoryResult<()> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE mapping_artifact SET usage_count = usage_count + 1, last_used_at = ?2 WHERE artifact_id = ?1",
            params![artifact_id, Utc::now().to_rfc3339()],
        )?;
        if changed == 0 {
            return Err(RepositoryError::NotFound {
                entity: "MappingArtifact".to_string(),
                id: artifact_id.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::mapping::ColumnResolution;
    use crate::domain::types::ResolutionTier;

    fn repo() -> MappingArtifactRepositoryImpl {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO seller (seller_id, name, created_at) VALUES (1, 'Acme', '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        MappingArtifactRepositoryImpl::from_connection(Arc::new(Mutex::new(conn)))
    }

    fn artifact(name: &str, is_default: bool) -> MappingArtifact {
        let resolutions = vec![ColumnResolution {
            source_column: "Loan #".to_string(),
            target_field: Some("loan_number".to_string()),
            tier: ResolutionTier::Alias,
            confidence: None,
        }];
        MappingArtifact::from_resolutions(name, Some(1), &resolutions, is_default)
    }

    #[tokio::test]
    async fn test_saving_new_default_clears_previous() {
        let repo = repo();
        let first = repo.save(&artifact("v1", true)).await.unwrap();
        let second = repo.save(&artifact("v2", true)).await.unwrap();
        assert_ne!(first, second);

        let default = repo.get_default_for_seller(1).await.unwrap().unwrap();
        assert_eq!(default.artifact_id, Some(second));

        let all = repo.list_for_seller(1).await.unwrap();
        assert_eq!(all.iter().filter(|a| a.is_default).count(), 1);
    }

    #[tokio::test]
    async fn test_save_same_name_overwrites_and_usage_increments() {
        let repo = repo();
        let id = repo.save(&artifact("monthly", false)).await.unwrap();
        let again = repo.save(&artifact("monthly", true)).await.unwrap();
        assert_eq!(id, again);

        repo.increment_usage(id).await.unwrap();
        let loaded = repo.get(id).await.unwrap().unwrap();
        assert_eq!(loaded.usage_count, 1);
        assert!(loaded.last_used_at.is_some());
        assert_eq!(loaded.mapping.target_of("Loan #"), Some("loan_number"));
    }

    #[tokio::test]
    async fn test_default_requires_seller() {
        let repo = repo();
        let mut orphan = artifact("orphan", true);
        orphan.seller_id = None;
        assert!(matches!(
            repo.save(&orphan).await,
            Err(RepositoryError::ValidationError(_))
        ));
    }
}
