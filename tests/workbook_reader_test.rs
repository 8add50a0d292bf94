// ==========================================
// 工作簿读取集成测试
// ==========================================
// 测试目标: .xlsx 工作表选择、数值与日期单元格渲染、注入解密器
// 夹具: fixtures/two_sheet_tape.xlsx
//   - Summary: 说明文字
//   - Loans: Loan Number / Current Bal / Origination Date（日期格式）/ State
// ==========================================

mod test_helpers;

use std::sync::Arc;
use tape_ingest::app::Collaborators;
use tape_ingest::domain::{IngestOptions, RunState};
use tape_ingest::importer::{ImportError, ImportResult, ReadOptions, SheetSelector, TabularReader, WorkbookDecryptor};
use tape_ingest::repository::PortfolioRepository;
use test_helpers::{build_state, create_test_db};

const WORKBOOK: &[u8] = include_bytes!("fixtures/two_sheet_tape.xlsx");

fn read_sheet(sheet: SheetSelector) -> ImportResult<tape_ingest::domain::RawTabularDataset> {
    let options = ReadOptions {
        sheet,
        ..Default::default()
    };
    TabularReader::new().read_bytes("tape.xlsx", WORKBOOK, &options)
}

/// 带 EncryptionInfo 流名的 OLE 复合文件头
fn encrypted_blob() -> Vec<u8> {
    let mut bytes = vec![0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
    bytes.extend(vec![0u8; 56]);
    for unit in "EncryptionInfo".encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    bytes
}

struct FixtureDecryptor {
    password: &'static str,
}

impl WorkbookDecryptor for FixtureDecryptor {
    fn decrypt(&self, _bytes: &[u8], password: &str) -> ImportResult<Vec<u8>> {
        if password != self.password {
            return Err(ImportError::UnreadableFile("密码错误".to_string()));
        }
        Ok(WORKBOOK.to_vec())
    }
}

#[test]
fn test_first_sheet_is_default() {
    let dataset = read_sheet(SheetSelector::First).unwrap();
    assert_eq!(dataset.metadata.sheet.as_deref(), Some("Summary"));
    assert_eq!(dataset.metadata.format, "workbook");
    assert!(dataset.metadata.detected_encoding.is_none());
    assert_eq!(dataset.columns, vec!["Report"]);
}

#[test]
fn test_sheet_by_name_renders_numbers_and_dates() {
    let dataset = read_sheet(SheetSelector::Name("loans".to_string())).unwrap();
    assert_eq!(dataset.metadata.sheet.as_deref(), Some("Loans"));
    assert_eq!(
        dataset.columns,
        vec!["Loan Number", "Current Bal", "Origination Date", "State"]
    );
    assert_eq!(dataset.len(), 2);

    let first = &dataset.rows[0];
    assert_eq!(first.row_number, 2);
    assert_eq!(first.cell(0), Some("L-1"));
    assert_eq!(first.cell(1), Some("1234.5"));
    assert_eq!(first.cell(2), Some("2024-03-01"));

    // 整数值浮点渲染为整数文本
    let second = &dataset.rows[1];
    assert_eq!(second.cell(1), Some("500"));
    assert_eq!(second.cell(2), Some("2023-03-15"));
    assert_eq!(second.cell(3), Some("TX"));
}

#[test]
fn test_sheet_by_index_and_out_of_range() {
    let dataset = read_sheet(SheetSelector::Index(1)).unwrap();
    assert_eq!(dataset.metadata.sheet.as_deref(), Some("Loans"));

    let err = read_sheet(SheetSelector::Index(5)).unwrap_err();
    assert!(matches!(err, ImportError::UnreadableFile(_)));
    let err = read_sheet(SheetSelector::Name("Trades".to_string())).unwrap_err();
    assert!(matches!(err, ImportError::UnreadableFile(_)));
}

#[test]
fn test_encrypted_workbook_opens_through_decryptor() {
    let reader = TabularReader::with_decryptor(Arc::new(FixtureDecryptor { password: "s3cret" }));
    let options = ReadOptions {
        sheet: SheetSelector::Name("Loans".to_string()),
        password: Some("s3cret".to_string()),
        ..Default::default()
    };
    let dataset = reader.read_bytes("locked.xlsx", &encrypted_blob(), &options).unwrap();
    assert_eq!(dataset.len(), 2);
    assert_eq!(dataset.rows[0].cell(2), Some("2024-03-01"));

    let wrong = ReadOptions {
        password: Some("guess".to_string()),
        ..options.clone()
    };
    assert!(reader.read_bytes("locked.xlsx", &encrypted_blob(), &wrong).is_err());

    // 未注入解密器
    let plain = TabularReader::new();
    let err = plain.read_bytes("locked.xlsx", &encrypted_blob(), &options).unwrap_err();
    assert!(matches!(err, ImportError::UnreadableFile(_)));
}

#[tokio::test]
async fn test_workbook_ingest_with_sheet_selector() {
    let (dir, db_path) = create_test_db();
    let state = build_state(&db_path, Collaborators::default()).await;
    let path = dir.path().join("march.xlsx");
    std::fs::write(&path, WORKBOOK).unwrap();

    let options = IngestOptions {
        sheet_selector: Some("Loans".to_string()),
        ..Default::default()
    };
    let result = state
        .ingest_api
        .ingest_file(&path.to_string_lossy(), Some("Acme"), None, true, options)
        .await
        .unwrap();

    assert_eq!(result.state, RunState::Complete, "failure: {:?}", result.failure);
    assert_eq!(result.sheet.as_deref(), Some("Loans"));
    assert_eq!(result.created, 2);
    assert_eq!(result.error_count, 0);

    let asset = state
        .repositories
        .portfolio_repo()
        .find_asset(result.seller_id.unwrap(), "L-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(asset.current_balance.as_deref(), Some("1234.50"));
    assert_eq!(asset.property_state.as_deref(), Some("CA"));
}
