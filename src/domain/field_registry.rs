// ==========================================
// 贷款数据带导入系统 - 标准字段注册表
// ==========================================
// 职责: 标准字段定义（名称 / 分组 / 值类型 / 描述 / 别名）
// 用途: 驱动 AI 提示构造、别名匹配、类型转换与校验
// 红线: 进程启动时加载一次,运行期只读;显式传入,不作为全局状态
// ==========================================

use crate::domain::types::{FieldValueType, TargetGroup};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 内置注册表版本号（字段增删或别名调整时递增）
pub const REGISTRY_VERSION: u32 = 3;

// ==========================================
// CanonicalFieldSpec - 标准字段定义
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalFieldSpec {
    pub name: String,
    pub group: TargetGroup,
    pub value_type: FieldValueType,
    pub description: String,
    pub aliases: Vec<String>,
    /// 整个文件必须能映射到该字段,否则映射失败
    pub required: bool,
    /// 分组自然键的组成字段
    pub identity: bool,
}

impl CanonicalFieldSpec {
    fn new(
        name: &str,
        group: TargetGroup,
        value_type: FieldValueType,
        description: &str,
        aliases: &[&str],
    ) -> Self {
        Self {
            name: name.to_string(),
            group,
            value_type,
            description: description.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            required: false,
            identity: false,
        }
    }

    fn required(mut self) -> Self {
        self.required = true;
        self
    }

    fn identity(mut self) -> Self {
        self.identity = true;
        self
    }
}

/// 列名标准化: 小写、`_`/`-`/`.` 等视为空白、压缩空白
///
/// 保留 `#` 与 `%`,它们在供应商列名中有语义（"Loan #", "Rate %"）。
pub fn normalize_header(raw: &str) -> String {
    let mapped: String = raw
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '#' || c == '%' {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ==========================================
// FieldRegistry - 注册表
// ==========================================
#[derive(Debug, Clone)]
pub struct FieldRegistry {
    version: u32,
    fields: Vec<CanonicalFieldSpec>,
    by_name: HashMap<String, usize>,
    by_alias: HashMap<String, usize>,
}

impl FieldRegistry {
    /// 由字段列表构造注册表
    ///
    /// 同一标准化键出现多次时保留第一次出现的字段,冲突可用 `validate()` 检出。
    pub fn from_specs(version: u32, fields: Vec<CanonicalFieldSpec>) -> Self {
        let mut by_name = HashMap::new();
        let mut by_alias = HashMap::new();

        for (idx, spec) in fields.iter().enumerate() {
            by_name.entry(spec.name.clone()).or_insert(idx);
            by_alias.entry(normalize_header(&spec.name)).or_insert(idx);
            for alias in &spec.aliases {
                by_alias.entry(normalize_header(alias)).or_insert(idx);
            }
        }

        Self {
            version,
            fields,
            by_name,
            by_alias,
        }
    }

    /// 内置标准注册表
    pub fn standard() -> Self {
        Self::from_specs(REGISTRY_VERSION, standard_fields())
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn fields(&self) -> &[CanonicalFieldSpec] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&CanonicalFieldSpec> {
        self.by_name.get(name).map(|&idx| &self.fields[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// 按标准字段名或别名解析源列名（大小写/空白不敏感）
    pub fn resolve_alias(&self, source_column: &str) -> Option<&CanonicalFieldSpec> {
        let key = normalize_header(source_column);
        if key.is_empty() {
            return None;
        }
        self.by_alias.get(&key).map(|&idx| &self.fields[idx])
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &CanonicalFieldSpec> {
        self.fields.iter().filter(|f| f.required)
    }

    pub fn fields_in(&self, group: TargetGroup) -> impl Iterator<Item = &CanonicalFieldSpec> {
        self.fields.iter().filter(move |f| f.group == group)
    }

    /// 检查重名与别名冲突,返回问题描述列表
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let mut seen: HashMap<String, &str> = HashMap::new();

        for spec in &self.fields {
            let mut keys = vec![normalize_header(&spec.name)];
            keys.extend(spec.aliases.iter().map(|a| normalize_header(a)));
            keys.sort();
            keys.dedup();

            for key in keys {
                if let Some(owner) = seen.get(&key) {
                    problems.push(format!(
                        "别名冲突: '{}' 同时属于 {} 和 {}",
                        key, owner, spec.name
                    ));
                } else {
                    seen.insert(key, spec.name.as_str());
                }
            }
        }

        problems
    }
}

fn standard_fields() -> Vec<CanonicalFieldSpec> {
    use FieldValueType::*;
    use TargetGroup::*;

    vec![
        // ===== 资产 =====
        CanonicalFieldSpec::new(
            "loan_number",
            Asset,
            Text,
            "Seller-assigned loan identifier; the natural key of the asset within a seller",
            &["Loan Number", "Loan #", "Loan No", "Loan ID", "LoanID", "Loan Num", "Account Number", "Acct #", "Servicer Loan Number"],
        )
        .required()
        .identity(),
        CanonicalFieldSpec::new(
            "asset_status",
            Asset,
            Text,
            "Current asset status (performing, delinquent, REO, paid off)",
            &["Status", "Loan Status", "Asset Status"],
        ),
        CanonicalFieldSpec::new(
            "asset_type",
            Asset,
            Text,
            "Asset classification such as NPL, RPL, REO",
            &["Asset Type", "Asset Class"],
        ),
        CanonicalFieldSpec::new(
            "acquisition_date",
            Asset,
            Date,
            "Date the asset was acquired",
            &["Acquisition Date", "Acq Date", "Purchase Date", "Boarding Date"],
        ),
        CanonicalFieldSpec::new(
            "purchase_price",
            Asset,
            Money,
            "Price paid for the asset",
            &["Purchase Price", "Bid Price", "Acquisition Price"],
        ),
        CanonicalFieldSpec::new(
            "servicer_name",
            Asset,
            Text,
            "Name of the servicer",
            &["Servicer", "Servicer Name"],
        ),
        CanonicalFieldSpec::new(
            "lien_position",
            Asset,
            Integer,
            "Lien position (1 = first lien)",
            &["Lien Position", "Lien", "Lien Pos"],
        ),
        // ===== 贷款 =====
        CanonicalFieldSpec::new(
            "original_balance",
            Loan,
            Money,
            "Original principal balance at origination",
            &["Original Balance", "Orig Bal", "Original Principal Balance", "Orig UPB", "Original Loan Amount"],
        ),
        CanonicalFieldSpec::new(
            "current_balance",
            Loan,
            Money,
            "Current unpaid principal balance",
            &["Current Balance", "Current Bal", "Curr Bal", "UPB", "Unpaid Principal Balance", "Current UPB", "Principal Balance"],
        ),
        CanonicalFieldSpec::new(
            "interest_rate",
            Loan,
            Rate,
            "Current note interest rate in percent",
            &["Interest Rate", "Int Rate", "Note Rate", "Current Rate", "Rate"],
        ),
        CanonicalFieldSpec::new(
            "origination_date",
            Loan,
            Date,
            "Loan origination date",
            &["Origination Date", "Orig Date", "Note Date", "First Payment Date"],
        ),
        CanonicalFieldSpec::new(
            "maturity_date",
            Loan,
            Date,
            "Scheduled maturity date",
            &["Maturity Date", "Maturity", "Mat Date"],
        ),
        CanonicalFieldSpec::new(
            "next_due_date",
            Loan,
            Date,
            "Next payment due date",
            &["Next Due Date", "Next Payment Due", "Due Date", "NDD"],
        ),
        CanonicalFieldSpec::new(
            "paid_through_date",
            Loan,
            Date,
            "Date through which the loan is paid",
            &["Paid Through Date", "Paid To Date", "PTD"],
        ),
        CanonicalFieldSpec::new(
            "monthly_payment",
            Loan,
            Money,
            "Scheduled principal and interest payment",
            &["Monthly Payment", "P&I", "P&I Payment", "PI Payment", "Payment Amount"],
        ),
        CanonicalFieldSpec::new(
            "escrow_balance",
            Loan,
            Money,
            "Escrow account balance",
            &["Escrow Balance", "Escrow Bal"],
        ),
        CanonicalFieldSpec::new(
            "deferred_balance",
            Loan,
            Money,
            "Deferred (non-interest-bearing) principal balance",
            &["Deferred Balance", "Deferred Principal", "Non Interest Bearing Balance"],
        ),
        CanonicalFieldSpec::new(
            "loan_type",
            Loan,
            Text,
            "Loan product type (conventional, FHA, VA, HELOC)",
            &["Loan Type", "Product", "Product Type"],
        ),
        CanonicalFieldSpec::new(
            "rate_type",
            Loan,
            Text,
            "Rate structure (ARM or FIXED)",
            &["Rate Type", "ARM/Fixed", "Amortization Type"],
        ),
        // ===== 抵押物 =====
        CanonicalFieldSpec::new(
            "property_address",
            Property,
            Text,
            "Street address of the collateral",
            &["Property Address", "Address", "Street Address", "Prop Address"],
        ),
        CanonicalFieldSpec::new(
            "property_city",
            Property,
            Text,
            "City of the collateral",
            &["City", "Property City", "Prop City"],
        ),
        CanonicalFieldSpec::new(
            "property_state",
            Property,
            Text,
            "Two-letter state code of the collateral",
            &["State", "Property State", "Prop State", "ST"],
        ),
        CanonicalFieldSpec::new(
            "property_zip",
            Property,
            Text,
            "ZIP code of the collateral",
            &["Zip", "Zip Code", "Property Zip", "Postal Code"],
        ),
        CanonicalFieldSpec::new(
            "property_county",
            Property,
            Text,
            "County of the collateral",
            &["County", "Property County"],
        ),
        CanonicalFieldSpec::new(
            "property_type",
            Property,
            Text,
            "Collateral type (SFR, CONDO, 2-4 UNIT, ...)",
            &["Property Type", "Prop Type", "Collateral Type"],
        ),
        CanonicalFieldSpec::new(
            "year_built",
            Property,
            Integer,
            "Year the structure was built",
            &["Year Built", "Yr Built"],
        ),
        CanonicalFieldSpec::new(
            "square_feet",
            Property,
            Integer,
            "Living area in square feet",
            &["Square Feet", "Sq Ft", "SqFt", "Living Area"],
        ),
        CanonicalFieldSpec::new(
            "occupancy",
            Property,
            Text,
            "Occupancy status (owner, tenant, vacant)",
            &["Occupancy", "Occupancy Status", "Occupied"],
        ),
        // ===== 止赎 =====
        CanonicalFieldSpec::new(
            "fc_status",
            Foreclosure,
            Text,
            "Foreclosure status",
            &["FC Status", "Foreclosure Status"],
        ),
        CanonicalFieldSpec::new(
            "fc_referral_date",
            Foreclosure,
            Date,
            "Date the loan was referred to foreclosure",
            &["FC Referral Date", "Foreclosure Referral Date", "Referral Date"],
        ),
        CanonicalFieldSpec::new(
            "fc_first_legal_date",
            Foreclosure,
            Date,
            "First legal action date",
            &["First Legal Date", "FC First Legal", "First Legal"],
        ),
        CanonicalFieldSpec::new(
            "fc_sale_date",
            Foreclosure,
            Date,
            "Scheduled or completed foreclosure sale date",
            &["FC Sale Date", "Sale Date", "Foreclosure Sale Date"],
        ),
        CanonicalFieldSpec::new(
            "fc_attorney",
            Foreclosure,
            Text,
            "Foreclosure attorney or firm",
            &["FC Attorney", "Foreclosure Attorney", "Attorney"],
        ),
        // ===== 估值 =====
        CanonicalFieldSpec::new(
            "valuation_value",
            Valuation,
            Money,
            "Most recent property value",
            &["Value", "Property Value", "BPO Value", "Current Value", "AVM Value", "Appraised Value"],
        ),
        CanonicalFieldSpec::new(
            "valuation_date",
            Valuation,
            Date,
            "Effective date of the valuation",
            &["Value Date", "Valuation Date", "BPO Date", "AVM Date", "Appraisal Date"],
        )
        .identity(),
        CanonicalFieldSpec::new(
            "valuation_source",
            Valuation,
            Text,
            "Valuation source (BPO, AVM, APPRAISAL); defaults to TAPE",
            &["Value Source", "Valuation Source", "Valuation Type", "Value Type"],
        )
        .identity(),
        // ===== 破产 =====
        CanonicalFieldSpec::new(
            "bk_chapter",
            Bankruptcy,
            Integer,
            "Bankruptcy chapter (7, 11, 13)",
            &["BK Chapter", "Bankruptcy Chapter", "Chapter"],
        ),
        CanonicalFieldSpec::new(
            "bk_filing_date",
            Bankruptcy,
            Date,
            "Bankruptcy filing date",
            &["BK Filing Date", "BK File Date", "Bankruptcy Filing Date"],
        ),
        CanonicalFieldSpec::new(
            "bk_case_number",
            Bankruptcy,
            Text,
            "Bankruptcy case number",
            &["BK Case Number", "BK Case #", "Case Number"],
        ),
        CanonicalFieldSpec::new(
            "bk_discharge_date",
            Bankruptcy,
            Date,
            "Bankruptcy discharge date",
            &["BK Discharge Date", "Discharge Date"],
        ),
        CanonicalFieldSpec::new(
            "bk_dismissal_date",
            Bankruptcy,
            Date,
            "Bankruptcy dismissal date",
            &["BK Dismissal Date", "Dismissal Date"],
        ),
        // ===== 贷款修改 =====
        CanonicalFieldSpec::new(
            "modification_date",
            Modification,
            Date,
            "Effective date of the loan modification",
            &["Mod Date", "Modification Date", "Mod Effective Date"],
        )
        .identity(),
        CanonicalFieldSpec::new(
            "modification_type",
            Modification,
            Text,
            "Modification program or type",
            &["Mod Type", "Modification Type", "Mod Program"],
        ),
        CanonicalFieldSpec::new(
            "modified_rate",
            Modification,
            Rate,
            "Interest rate after modification",
            &["Mod Rate", "Modified Rate", "Modification Rate"],
        ),
        CanonicalFieldSpec::new(
            "modified_balance",
            Modification,
            Money,
            "Principal balance after modification",
            &["Mod Balance", "Modified Balance", "Mod UPB"],
        ),
        CanonicalFieldSpec::new(
            "modified_maturity_date",
            Modification,
            Date,
            "Maturity date after modification",
            &["Mod Maturity Date", "Modified Maturity Date", "Mod Maturity"],
        ),
        // ===== 特殊标志 =====
        CanonicalFieldSpec::new(
            "is_heloc",
            Special,
            Boolean,
            "Whether the loan is a home equity line of credit",
            &["HELOC", "Is HELOC", "HELOC Flag"],
        ),
        CanonicalFieldSpec::new(
            "in_litigation",
            Special,
            Boolean,
            "Whether the loan is in active litigation",
            &["Litigation", "In Litigation", "Litigation Flag"],
        ),
        CanonicalFieldSpec::new(
            "in_forbearance",
            Special,
            Boolean,
            "Whether the loan is under a forbearance plan",
            &["Forbearance", "In Forbearance", "Forbearance Flag"],
        ),
        CanonicalFieldSpec::new(
            "legacy_type",
            Special,
            LegacyType,
            "Generic legacy 'type' column that may carry property, rate, product or asset type tokens",
            &["Type"],
        ),
    ]
}
