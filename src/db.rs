// ==========================================
// 贷款数据带导入系统 - SQLite 连接与建库
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键 / busy_timeout）
// - 幂等建表,记录 schema_version
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::path::PathBuf;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 2;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 幂等建表并写入当前 schema_version
///
/// 金额/利率以 TEXT 存储十进制字符串,避免浮点误差。
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 默认数据库路径
///
/// 优先级: TAPE_INGEST_DB_PATH → <data_dir>/tape-ingest/portfolio.db → ./tape_ingest.db
pub fn get_default_db_path() -> String {
    if let Ok(path) = std::env::var("TAPE_INGEST_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./tape_ingest.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("tape-ingest");
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("portfolio.db");
        }
    }

    path.to_string_lossy().to_string()
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- ===== 配置 =====
CREATE TABLE IF NOT EXISTS config_scope (
    scope_id TEXT PRIMARY KEY,
    scope_type TEXT NOT NULL,
    scope_key TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(scope_type, scope_key)
);

INSERT OR IGNORE INTO config_scope (scope_id, scope_type, scope_key)
VALUES ('global', 'GLOBAL', 'global');

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id TEXT NOT NULL REFERENCES config_scope(scope_id) ON DELETE CASCADE,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

-- ===== 卖方 / 交易 =====
CREATE TABLE IF NOT EXISTS seller (
    seller_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE COLLATE NOCASE,
    tape_password TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS trade (
    trade_id INTEGER PRIMARY KEY AUTOINCREMENT,
    seller_id INTEGER NOT NULL REFERENCES seller(seller_id) ON DELETE CASCADE,
    name TEXT NOT NULL COLLATE NOCASE,
    created_at TEXT NOT NULL,
    UNIQUE(seller_id, name)
);

CREATE TABLE IF NOT EXISTS seller_rule (
    rule_id INTEGER PRIMARY KEY AUTOINCREMENT,
    seller_id INTEGER NOT NULL REFERENCES seller(seller_id) ON DELETE CASCADE,
    sender_pattern TEXT,
    subject_pattern TEXT,
    priority INTEGER NOT NULL DEFAULT 100
);

-- ===== 资产及分组记录 =====
CREATE TABLE IF NOT EXISTS asset (
    asset_id INTEGER PRIMARY KEY AUTOINCREMENT,
    seller_id INTEGER NOT NULL REFERENCES seller(seller_id),
    trade_id INTEGER REFERENCES trade(trade_id),
    loan_number TEXT NOT NULL,
    asset_status TEXT,
    asset_type TEXT,
    acquisition_date TEXT,
    purchase_price TEXT,
    servicer_name TEXT,
    lien_position INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(seller_id, loan_number)
);

CREATE TABLE IF NOT EXISTS loan (
    asset_id INTEGER PRIMARY KEY REFERENCES asset(asset_id) ON DELETE CASCADE,
    original_balance TEXT,
    current_balance TEXT,
    interest_rate TEXT,
    origination_date TEXT,
    maturity_date TEXT,
    next_due_date TEXT,
    paid_through_date TEXT,
    monthly_payment TEXT,
    escrow_balance TEXT,
    deferred_balance TEXT,
    loan_type TEXT,
    rate_type TEXT,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS property (
    asset_id INTEGER PRIMARY KEY REFERENCES asset(asset_id) ON DELETE CASCADE,
    property_address TEXT,
    property_city TEXT,
    property_state TEXT,
    property_zip TEXT,
    property_county TEXT,
    property_type TEXT,
    year_built INTEGER,
    square_feet INTEGER,
    occupancy TEXT,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS foreclosure (
    asset_id INTEGER PRIMARY KEY REFERENCES asset(asset_id) ON DELETE CASCADE,
    fc_status TEXT,
    fc_referral_date TEXT,
    fc_first_legal_date TEXT,
    fc_sale_date TEXT,
    fc_attorney TEXT,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS valuation (
    valuation_id INTEGER PRIMARY KEY AUTOINCREMENT,
    asset_id INTEGER NOT NULL REFERENCES asset(asset_id) ON DELETE CASCADE,
    valuation_source TEXT NOT NULL,
    valuation_date TEXT NOT NULL,
    valuation_value TEXT,
    updated_at TEXT NOT NULL,
    UNIQUE(asset_id, valuation_source, valuation_date)
);

CREATE TABLE IF NOT EXISTS bankruptcy (
    asset_id INTEGER PRIMARY KEY REFERENCES asset(asset_id) ON DELETE CASCADE,
    bk_chapter INTEGER,
    bk_filing_date TEXT,
    bk_case_number TEXT,
    bk_discharge_date TEXT,
    bk_dismissal_date TEXT,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS modification (
    modification_id INTEGER PRIMARY KEY AUTOINCREMENT,
    asset_id INTEGER NOT NULL REFERENCES asset(asset_id) ON DELETE CASCADE,
    modification_date TEXT NOT NULL,
    modification_type TEXT,
    modified_rate TEXT,
    modified_balance TEXT,
    modified_maturity_date TEXT,
    updated_at TEXT NOT NULL,
    UNIQUE(asset_id, modification_date)
);

CREATE TABLE IF NOT EXISTS special_flags (
    asset_id INTEGER PRIMARY KEY REFERENCES asset(asset_id) ON DELETE CASCADE,
    is_heloc INTEGER,
    in_litigation INTEGER,
    in_forbearance INTEGER,
    updated_at TEXT NOT NULL
);

-- ===== 映射配置 =====
CREATE TABLE IF NOT EXISTS mapping_artifact (
    artifact_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    seller_id INTEGER REFERENCES seller(seller_id) ON DELETE CASCADE,
    resolution_method TEXT NOT NULL,
    source_columns TEXT NOT NULL,
    mapping_json TEXT NOT NULL,
    registry_version INTEGER NOT NULL,
    is_default INTEGER NOT NULL DEFAULT 0,
    usage_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    last_used_at TEXT
);

-- 每个卖方至多一个默认映射
CREATE UNIQUE INDEX IF NOT EXISTS ux_mapping_artifact_default
    ON mapping_artifact(seller_id) WHERE is_default = 1;

-- ===== 运行台账 =====
CREATE TABLE IF NOT EXISTS import_run (
    run_id TEXT PRIMARY KEY,
    file_name TEXT NOT NULL,
    seller_id INTEGER,
    trade_id INTEGER,
    state TEXT NOT NULL,
    total_rows INTEGER NOT NULL,
    created INTEGER NOT NULL,
    updated INTEGER NOT NULL,
    skipped INTEGER NOT NULL,
    error_count INTEGER NOT NULL,
    failed_batches INTEGER NOT NULL,
    result_json TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_import_run_seller ON import_run(seller_id, finished_at);
"#;
