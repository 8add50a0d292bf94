// ==========================================
// 贷款数据带导入系统 - 卖方 / 交易模型
// ==========================================
// 对齐: seller / trade / seller_rule 表
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seller {
    pub seller_id: i64,
    pub name: String,
    /// 该卖方数据带的解密密码（可选）
    #[serde(skip_serializing)]
    pub tape_password: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: i64,
    pub seller_id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// 发件人/主题规则,按 priority 升序匹配
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellerRule {
    pub rule_id: i64,
    pub seller_id: i64,
    pub sender_pattern: Option<String>,
    pub subject_pattern: Option<String>,
    pub priority: i32,
}

// ==========================================
// SellerHint - 卖方解析输入
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SellerHint {
    pub seller_id: Option<i64>,
    pub trade_id: Option<i64>,
    pub seller_name: Option<String>,
    pub trade_name: Option<String>,
    // 邮件元信息（扫描模式）
    pub sender: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
}

impl SellerHint {
    pub fn has_message_context(&self) -> bool {
        self.sender.is_some() || self.subject.is_some() || self.body.is_some()
    }
}

/// 卖方是如何被解析出来的
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SellerResolution {
    ExplicitId,
    ExplicitName,
    Rule,
    Ai,
    Created,
    /// 试运行下的自动创建: 不落库,仅占位
    Provisional,
}

// ==========================================
// SellerContext - 卖方/交易上下文
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellerContext {
    /// 试运行占位上下文为 None
    pub seller_id: Option<i64>,
    pub seller_name: String,
    pub trade_id: Option<i64>,
    pub trade_name: Option<String>,
    pub resolution: SellerResolution,
    #[serde(skip_serializing)]
    pub tape_password: Option<String>,
}

impl SellerContext {
    pub fn from_seller(seller: &Seller, trade: Option<&Trade>, resolution: SellerResolution) -> Self {
        Self {
            seller_id: Some(seller.seller_id),
            seller_name: seller.name.clone(),
            trade_id: trade.map(|t| t.trade_id),
            trade_name: trade.map(|t| t.name.clone()),
            resolution,
            tape_password: seller.tape_password.clone(),
        }
    }

    pub fn is_provisional(&self) -> bool {
        self.resolution == SellerResolution::Provisional
    }
}
