// ==========================================
// 贷款数据带导入系统 - 表格读取器
// ==========================================
// 支持: 工作簿 (.xlsx/.xlsm/.xlsb/.xls/.ods) / 分隔文本 (.csv/.txt/.tsv)
// 选择: 按扩展名;无扩展名时按内容嗅探
// 红线: 空单元格统一为 None;行数限制在完整解析之后应用
// 红线: 不支持的扩展名或无法解码的内容报 UnreadableFile,不做静默降级
// ==========================================

use crate::domain::dataset::{RawTabularDataset, RawTabularRow, SourceMetadata};
use crate::importer::data_cleaner::excel_serial_to_date;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::text_decoder::decode_text;
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

const OLE_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const ZIP_MAGIC: [u8; 4] = [b'P', b'K', 0x03, 0x04];

// ==========================================
// 读取参数
// ==========================================

/// 工作表选择
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SheetSelector {
    #[default]
    First,
    /// 按名称（忽略大小写）
    Name(String),
    /// 按位置（0 起）
    Index(usize),
}

impl FromStr for SheetSelector {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(SheetSelector::First);
        }
        Ok(match trimmed.parse::<usize>() {
            Ok(idx) => SheetSelector::Index(idx),
            Err(_) => SheetSelector::Name(trimmed.to_string()),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    pub sheet: SheetSelector,
    /// 表头之前跳过的物理行数
    pub skip_rows: usize,
    pub row_limit: Option<usize>,
    pub password: Option<String>,
}

/// 加密工作簿解密能力（外部注入）
pub trait WorkbookDecryptor: Send + Sync {
    /// 返回解密后的工作簿字节
    fn decrypt(&self, bytes: &[u8], password: &str) -> ImportResult<Vec<u8>>;
}

// ==========================================
// 容器格式
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    Workbook,
    Delimited,
}

impl ContainerFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerFormat::Workbook => "workbook",
            ContainerFormat::Delimited => "delimited",
        }
    }

    /// 扩展名是否属于可读的表格格式
    pub fn from_extension(file_name: &str) -> Option<Self> {
        let ext = Path::new(file_name).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Some(ContainerFormat::Workbook),
            "csv" | "txt" | "tsv" => Some(ContainerFormat::Delimited),
            _ => None,
        }
    }

    /// 按扩展名选择,无扩展名时嗅探内容
    pub fn detect(file_name: &str, bytes: &[u8]) -> ImportResult<Self> {
        if let Some(format) = Self::from_extension(file_name) {
            return Ok(format);
        }
        match Path::new(file_name).extension().and_then(|e| e.to_str()) {
            Some(other) => Err(ImportError::UnreadableFile(format!(
                "不支持的文件扩展名: .{}",
                other
            ))),
            None => {
                if bytes.starts_with(&ZIP_MAGIC) || bytes.starts_with(&OLE_MAGIC) {
                    Ok(ContainerFormat::Workbook)
                } else {
                    Ok(ContainerFormat::Delimited)
                }
            }
        }
    }
}

/// 是否为加密的 OOXML 包（OLE 复合文件内含 EncryptionInfo 流）
pub fn is_encrypted_workbook(bytes: &[u8]) -> bool {
    if !bytes.starts_with(&OLE_MAGIC) {
        return false;
    }
    let marker: Vec<u8> = "EncryptionInfo"
        .encode_utf16()
        .flat_map(|unit| unit.to_le_bytes())
        .collect();
    bytes.windows(marker.len()).any(|w| w == marker.as_slice())
}

// ==========================================
// 单元格网格（格式读取器的中间产物）
// ==========================================
struct CellGrid {
    /// (物理行号, 单元格)
    rows: Vec<(usize, Vec<Option<String>>)>,
    sheet: Option<String>,
    encoding: Option<String>,
}

trait GridReader {
    fn read_grid(&self, bytes: &[u8], options: &ReadOptions) -> ImportResult<CellGrid>;
}

fn normalize_cell(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// ==========================================
// 分隔文本读取
// ==========================================
struct DelimitedReader {
    tab_default: bool,
}

/// 在首个非空行上统计候选分隔符（忽略引号内字符）
fn sniff_delimiter(text: &str) -> u8 {
    let line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let mut counts: HashMap<u8, usize> = HashMap::new();
    let mut in_quotes = false;
    for b in line.bytes() {
        match b {
            b'"' => in_quotes = !in_quotes,
            b',' | b'\t' | b';' | b'|' if !in_quotes => *counts.entry(b).or_insert(0) += 1,
            _ => {}
        }
    }
    [b',', b'\t', b';', b'|']
        .into_iter()
        .max_by_key(|d| (counts.get(d).copied().unwrap_or(0), *d == b','))
        .filter(|d| counts.get(d).copied().unwrap_or(0) > 0)
        .unwrap_or(b',')
}

impl GridReader for DelimitedReader {
    fn read_grid(&self, bytes: &[u8], _options: &ReadOptions) -> ImportResult<CellGrid> {
        let decoded = decode_text(bytes)?;
        let delimiter = if self.tab_default {
            b'\t'
        } else {
            sniff_delimiter(&decoded.text)
        };
        debug!(delimiter = %(delimiter as char).escape_default(), "分隔符已确定");

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(decoded.text.as_bytes());

        let mut rows = Vec::new();
        for (idx, result) in reader.records().enumerate() {
            let record = result?;
            let line = record
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(idx + 1);
            rows.push((line, record.iter().map(normalize_cell).collect()));
        }

        Ok(CellGrid {
            rows,
            sheet: None,
            encoding: Some(decoded.encoding),
        })
    }
}

// ==========================================
// 工作簿读取
// ==========================================
struct WorkbookReader {
    decryptor: Option<Arc<dyn WorkbookDecryptor>>,
}

fn render_cell(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => normalize_cell(s),
        Data::Int(i) => Some(i.to_string()),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                Some(format!("{}", *f as i64))
            } else {
                Some(f.to_string())
            }
        }
        Data::Bool(b) => Some(b.to_string()),
        Data::DateTime(dt) => {
            let serial = dt.as_f64();
            excel_serial_to_date(serial)
                .map(|d| d.format("%Y-%m-%d").to_string())
                .or_else(|| Some(serial.to_string()))
        }
        Data::DateTimeIso(s) | Data::DurationIso(s) => normalize_cell(s),
    }
}

impl WorkbookReader {
    fn unlock(&self, bytes: &[u8], options: &ReadOptions) -> ImportResult<Vec<u8>> {
        let password = options.password.as_deref().ok_or_else(|| {
            ImportError::UnreadableFile("工作簿已加密,但未提供密码".to_string())
        })?;
        let decryptor = self.decryptor.as_ref().ok_or_else(|| {
            ImportError::UnreadableFile("工作簿已加密,但未配置解密器".to_string())
        })?;
        decryptor.decrypt(bytes, password)
    }
}

impl GridReader for WorkbookReader {
    fn read_grid(&self, bytes: &[u8], options: &ReadOptions) -> ImportResult<CellGrid> {
        let content = if is_encrypted_workbook(bytes) {
            info!("检测到加密工作簿,尝试解密");
            self.unlock(bytes, options)?
        } else {
            bytes.to_vec()
        };

        let mut workbook = open_workbook_auto_from_rs(Cursor::new(content))?;
        let sheet_names = workbook.sheet_names();
        if sheet_names.is_empty() {
            return Err(ImportError::UnreadableFile("工作簿无工作表".to_string()));
        }

        let sheet_name = match &options.sheet {
            SheetSelector::First => sheet_names[0].clone(),
            SheetSelector::Index(idx) => sheet_names.get(*idx).cloned().ok_or_else(|| {
                ImportError::UnreadableFile(format!(
                    "工作表序号 {} 越界（共 {} 个）",
                    idx,
                    sheet_names.len()
                ))
            })?,
            SheetSelector::Name(name) => sheet_names
                .iter()
                .find(|s| s.eq_ignore_ascii_case(name))
                .cloned()
                .ok_or_else(|| {
                    ImportError::UnreadableFile(format!(
                        "工作表 {} 不存在,可选: {:?}",
                        name, sheet_names
                    ))
                })?,
        };

        let range = workbook.worksheet_range(&sheet_name)?;
        let first_row = range.start().map(|(r, _)| r as usize).unwrap_or(0);

        let rows = range
            .rows()
            .enumerate()
            .map(|(idx, cells)| (first_row + idx + 1, cells.iter().map(render_cell).collect()))
            .collect();

        Ok(CellGrid {
            rows,
            sheet: Some(sheet_name),
            encoding: None,
        })
    }
}

// ==========================================
// TabularReader - 统一入口
// ==========================================
#[derive(Clone, Default)]
pub struct TabularReader {
    decryptor: Option<Arc<dyn WorkbookDecryptor>>,
}

impl TabularReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_decryptor(decryptor: Arc<dyn WorkbookDecryptor>) -> Self {
        Self {
            decryptor: Some(decryptor),
        }
    }

    pub fn read_path(&self, path: &Path, options: &ReadOptions) -> ImportResult<RawTabularDataset> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        self.read_bytes(&file_name, &bytes, options)
    }

    /// 解析字节为原始数据集
    pub fn read_bytes(&self, file_name: &str, bytes: &[u8], options: &ReadOptions) -> ImportResult<RawTabularDataset> {
        if bytes.is_empty() {
            return Err(ImportError::UnreadableFile(format!("{} 为空文件", file_name)));
        }

        let format = ContainerFormat::detect(file_name, bytes)?;
        let grid = match format {
            ContainerFormat::Workbook => WorkbookReader {
                decryptor: self.decryptor.clone(),
            }
            .read_grid(bytes, options)?,
            ContainerFormat::Delimited => {
                let tab_default = file_name.to_ascii_lowercase().ends_with(".tsv");
                DelimitedReader { tab_default }.read_grid(bytes, options)?
            }
        };

        let dataset = assemble(grid, file_name, format, options)?;
        info!(
            file_name,
            format = format.as_str(),
            sheet = ?dataset.metadata.sheet,
            encoding = ?dataset.metadata.detected_encoding,
            columns = dataset.columns.len(),
            rows = dataset.rows.len(),
            "表格读取完成"
        );
        Ok(dataset)
    }
}

/// 表头去重与补名: 空表头 → "Column{n}",重复表头 → "名称 (2)"
fn build_headers(raw: &[Option<String>]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    raw.iter()
        .enumerate()
        .map(|(idx, cell)| {
            let base = cell.clone().unwrap_or_else(|| format!("Column{}", idx + 1));
            let count = seen.entry(base.to_lowercase()).or_insert(0);
            *count += 1;
            if *count == 1 {
                base
            } else {
                format!("{} ({})", base, count)
            }
        })
        .collect()
}

fn assemble(
    grid: CellGrid,
    file_name: &str,
    format: ContainerFormat,
    options: &ReadOptions,
) -> ImportResult<RawTabularDataset> {
    let mut rows = grid
        .rows
        .into_iter()
        .filter(|(line, _)| *line > options.skip_rows)
        .skip_while(|(_, cells)| cells.iter().all(|c| c.is_none()));

    let (_, header_cells) = rows.next().ok_or_else(|| {
        ImportError::UnreadableFile(format!("{} 中未找到表头行", file_name))
    })?;
    let columns = build_headers(&header_cells);
    let width = columns.len();

    let mut data: Vec<RawTabularRow> = rows
        .map(|(row_number, mut cells)| {
            cells.resize(width, None);
            RawTabularRow { row_number, cells }
        })
        .filter(|row| !row.is_blank())
        .collect();

    if let Some(limit) = options.row_limit {
        data.truncate(limit);
    }

    Ok(RawTabularDataset {
        columns,
        rows: data,
        metadata: SourceMetadata {
            file_name: file_name.to_string(),
            sheet: grid.sheet,
            detected_encoding: grid.encoding,
            format: format.as_str().to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_csv(text: &str, options: &ReadOptions) -> ImportResult<RawTabularDataset> {
        TabularReader::new().read_bytes("tape.csv", text.as_bytes(), options)
    }

    #[test]
    fn test_csv_basic_and_null_normalization() {
        let dataset = read_csv(
            "Loan Number,Current Bal,State\nL1,\"1,000.00\",CA\nL2,, \n",
            &ReadOptions::default(),
        )
        .unwrap();

        assert_eq!(dataset.columns, vec!["Loan Number", "Current Bal", "State"]);
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.rows[0].row_number, 2);
        assert_eq!(dataset.rows[0].cell(1), Some("1,000.00"));
        assert_eq!(dataset.rows[1].cells, vec![Some("L2".to_string()), None, None]);
        assert_eq!(dataset.metadata.detected_encoding.as_deref(), Some("UTF-8"));
        assert_eq!(dataset.metadata.format, "delimited");
    }

    #[test]
    fn test_skip_rows_and_row_limit() {
        let text = "Vendor Report\nGenerated 2024-01-01\nLoan #,UPB\nA,1\nB,2\nC,3\n";
        let options = ReadOptions {
            skip_rows: 2,
            row_limit: Some(2),
            ..Default::default()
        };
        let dataset = read_csv(text, &options).unwrap();
        assert_eq!(dataset.columns, vec!["Loan #", "UPB"]);
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.rows[0].row_number, 4);
        assert_eq!(dataset.rows[1].cell(0), Some("B"));
    }

    #[test]
    fn test_semicolon_delimiter_and_duplicate_headers() {
        let dataset = read_csv("Loan;Rate;Rate;\nL1;5;6;x\n", &ReadOptions::default()).unwrap();
        assert_eq!(dataset.columns, vec!["Loan", "Rate", "Rate (2)", "Column4"]);
        assert_eq!(dataset.rows[0].cell(3), Some("x"));
    }

    #[test]
    fn test_unsupported_extension_is_unreadable() {
        let result = TabularReader::new().read_bytes("tape.pdf", b"%PDF-1.4", &ReadOptions::default());
        assert!(matches!(result, Err(ImportError::UnreadableFile(_))));
    }

    #[test]
    fn test_extensionless_text_is_sniffed_as_delimited() {
        let result = TabularReader::new()
            .read_bytes("attachment", b"Loan Number\tState\nL1\tTX\n", &ReadOptions::default())
            .unwrap();
        assert_eq!(result.columns, vec!["Loan Number", "State"]);
    }

    #[test]
    fn test_encrypted_workbook_requires_password() {
        let mut bytes = OLE_MAGIC.to_vec();
        bytes.extend(
            "EncryptionInfo"
                .encode_utf16()
                .flat_map(|u| u.to_le_bytes()),
        );
        assert!(is_encrypted_workbook(&bytes));

        let result = TabularReader::new().read_bytes("locked.xlsx", &bytes, &ReadOptions::default());
        match result {
            Err(ImportError::UnreadableFile(msg)) => assert!(msg.contains("密码")),
            other => panic!("unexpected: {:?}", other.map(|d| d.columns)),
        }
    }

    #[test]
    fn test_sheet_selector_parse() {
        assert_eq!("".parse::<SheetSelector>().unwrap(), SheetSelector::First);
        assert_eq!("2".parse::<SheetSelector>().unwrap(), SheetSelector::Index(2));
        assert_eq!(
            "Tape".parse::<SheetSelector>().unwrap(),
            SheetSelector::Name("Tape".to_string())
        );
    }
}
