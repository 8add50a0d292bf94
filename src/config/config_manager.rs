// ==========================================
// 贷款数据带导入系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::ingest_config_trait::IngestConfigReader;
use crate::db::open_sqlite_connection;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use thiserror::Error;

// ==========================================
// ConfigError - 配置错误
// ==========================================
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置读取失败 (key: {key}): {message}")]
    ReadError { key: String, message: String },

    #[error("配置值格式错误 (key: {key}, value: {value}): {message}")]
    InvalidValue {
        key: String,
        value: String,
        message: String,
    },

    #[error("数据库锁获取失败: {0}")]
    LockError(String),

    #[error("数据库错误: {0}")]
    Database(#[from] rusqlite::Error),
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, ConfigError> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, ConfigError> {
        {
            let conn_guard = conn
                .lock()
                .map_err(|e| ConfigError::LockError(e.to_string()))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 读取 global scope 的配置值
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, ConfigError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ConfigError::LockError(e.to_string()))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(ConfigError::ReadError {
                key: key.to_string(),
                message: e.to_string(),
            }),
        }
    }

    /// 写入 global scope 的配置值（存在则覆盖）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ConfigError::LockError(e.to_string()))?;

        conn.execute(
            r#"
            INSERT INTO config_kv (scope_id, key, value, updated_at)
            VALUES ('global', ?1, ?2, datetime('now'))
            ON CONFLICT(scope_id, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![key, value],
        )?;
        Ok(())
    }

    /// 获取所有 global 配置的快照
    pub fn get_config_snapshot(&self) -> Result<HashMap<String, String>, ConfigError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ConfigError::LockError(e.to_string()))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        let mut snapshot = HashMap::new();
        for row in rows {
            let (key, value) = row?;
            snapshot.insert(key, value);
        }
        Ok(snapshot)
    }

    /// 读取并解析配置值;缺失返回默认值,格式错误返回 InvalidValue
    fn get_parsed_or_default<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get_global_config_value(key)? {
            None => Ok(default),
            Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.clone(),
                message: e.to_string(),
            }),
        }
    }
}

#[async_trait]
impl IngestConfigReader for ConfigManager {
    // ===== AI 层级 =====

    async fn get_ai_confidence_threshold(&self) -> Result<f32, ConfigError> {
        let value = self.get_parsed_or_default(config_keys::AI_CONFIDENCE_THRESHOLD, 0.75f32)?;
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::InvalidValue {
                key: config_keys::AI_CONFIDENCE_THRESHOLD.to_string(),
                value: value.to_string(),
                message: "必须位于 [0, 1]".to_string(),
            });
        }
        Ok(value)
    }

    async fn get_ai_max_attempts(&self) -> Result<u32, ConfigError> {
        self.get_parsed_or_default(config_keys::AI_MAX_ATTEMPTS, 3)
    }

    async fn get_ai_enabled(&self) -> Result<bool, ConfigError> {
        self.get_parsed_or_default(config_keys::AI_ENABLED, true)
    }

    // ===== 邮箱 =====

    async fn get_mailbox_max_attempts(&self) -> Result<u32, ConfigError> {
        self.get_parsed_or_default(config_keys::MAILBOX_MAX_ATTEMPTS, 3)
    }

    async fn get_retry_backoff_ms(&self) -> Result<u64, ConfigError> {
        self.get_parsed_or_default(config_keys::RETRY_BACKOFF_MS, 200)
    }

    // ===== 导入 =====

    async fn get_default_batch_size(&self) -> Result<usize, ConfigError> {
        let value = self.get_parsed_or_default(config_keys::DEFAULT_BATCH_SIZE, 500usize)?;
        if value == 0 {
            return Err(ConfigError::InvalidValue {
                key: config_keys::DEFAULT_BATCH_SIZE.to_string(),
                value: "0".to_string(),
                message: "批大小必须大于 0".to_string(),
            });
        }
        Ok(value)
    }

    async fn get_max_reported_errors(&self) -> Result<usize, ConfigError> {
        self.get_parsed_or_default(config_keys::MAX_REPORTED_ERRORS, 100)
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // AI
    pub const AI_CONFIDENCE_THRESHOLD: &str = "ai_confidence_threshold";
    pub const AI_MAX_ATTEMPTS: &str = "ai_max_attempts";
    pub const AI_ENABLED: &str = "ai_enabled";

    // 邮箱
    pub const MAILBOX_MAX_ATTEMPTS: &str = "mailbox_max_attempts";
    pub const RETRY_BACKOFF_MS: &str = "retry_backoff_ms";

    // 导入
    pub const DEFAULT_BATCH_SIZE: &str = "default_batch_size";
    pub const MAX_REPORTED_ERRORS: &str = "max_reported_errors";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[tokio::test]
    async fn test_defaults_when_keys_missing() {
        let config = manager();
        assert_eq!(config.get_ai_confidence_threshold().await.unwrap(), 0.75);
        assert_eq!(config.get_default_batch_size().await.unwrap(), 500);
        assert_eq!(config.get_max_reported_errors().await.unwrap(), 100);
        assert!(config.get_ai_enabled().await.unwrap());

        let policy = config.ai_retry_policy().await.unwrap();
        assert_eq!(policy.max_attempts, 3);
    }

    #[tokio::test]
    async fn test_override_and_malformed_value() {
        let config = manager();
        config
            .set_global_config_value(config_keys::DEFAULT_BATCH_SIZE, "25")
            .unwrap();
        assert_eq!(config.get_default_batch_size().await.unwrap(), 25);

        config
            .set_global_config_value(config_keys::AI_CONFIDENCE_THRESHOLD, "high")
            .unwrap();
        let err = config.get_ai_confidence_threshold().await.unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
