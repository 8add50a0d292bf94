// ==========================================
// 贷款数据带导入系统 - 分隔文本解码
// ==========================================
// 职责: 按固定顺序尝试解码器,首个成功者胜出
// 顺序: BOM 嗅探 → UTF-8（严格）→ Windows-1252
// 红线: 全部失败时报 UnreadableFile,不得替换字符静默降级
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};

/// 解码器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextDecoder {
    /// 依据字节序标记（UTF-8 / UTF-16LE / UTF-16BE）
    Bom,
    Utf8,
    Windows1252,
}

pub const DECODER_ORDER: [TextDecoder; 3] = [TextDecoder::Bom, TextDecoder::Utf8, TextDecoder::Windows1252];

/// 解码结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedText {
    pub text: String,
    /// 命中的编码名称（写入来源元信息）
    pub encoding: String,
}

impl TextDecoder {
    fn try_decode(&self, bytes: &[u8]) -> Option<DecodedText> {
        match self {
            TextDecoder::Bom => {
                let (encoding, bom_len) = Encoding::for_bom(bytes)?;
                let text = encoding.decode_without_bom_handling_and_without_replacement(&bytes[bom_len..])?;
                Some(DecodedText {
                    text: text.into_owned(),
                    encoding: encoding.name().to_string(),
                })
            }
            TextDecoder::Utf8 => {
                let text = UTF_8.decode_without_bom_handling_and_without_replacement(bytes)?;
                Some(DecodedText {
                    text: text.into_owned(),
                    encoding: UTF_8.name().to_string(),
                })
            }
            TextDecoder::Windows1252 => {
                let (text, had_errors) = WINDOWS_1252.decode_without_bom_handling(bytes);
                if had_errors {
                    return None;
                }
                Some(DecodedText {
                    text: text.into_owned(),
                    encoding: WINDOWS_1252.name().to_string(),
                })
            }
        }
    }
}

/// 依次尝试解码器
///
/// 含 NUL 字符的结果视为二进制内容,继续尝试下一个解码器。
pub fn decode_text(bytes: &[u8]) -> ImportResult<DecodedText> {
    for decoder in DECODER_ORDER {
        if let Some(decoded) = decoder.try_decode(bytes) {
            if decoded.text.contains('\0') {
                continue;
            }
            tracing::debug!(encoding = %decoded.encoding, ?decoder, "文本解码成功");
            return Ok(decoded);
        }
    }
    Err(ImportError::UnreadableFile(
        "无法解码文本内容（疑似二进制文件）".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_with_bom() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("Loan Number\nL1".as_bytes());
        let decoded = decode_text(&bytes).unwrap();
        assert_eq!(decoded.encoding, "UTF-8");
        assert!(decoded.text.starts_with("Loan Number"));
    }

    #[test]
    fn test_utf16le_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "A,B".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let decoded = decode_text(&bytes).unwrap();
        assert_eq!(decoded.encoding, "UTF-16LE");
        assert_eq!(decoded.text, "A,B");
    }

    #[test]
    fn test_latin1_falls_back_to_windows_1252() {
        // "Café" 的 Latin-1 编码,不是合法 UTF-8
        let bytes = vec![b'C', b'a', b'f', 0xE9];
        let decoded = decode_text(&bytes).unwrap();
        assert_eq!(decoded.encoding, "windows-1252");
        assert_eq!(decoded.text, "Café");
    }

    #[test]
    fn test_binary_content_is_rejected() {
        let bytes = vec![0x00, 0x01, 0x02, 0x00];
        assert!(matches!(decode_text(&bytes), Err(ImportError::UnreadableFile(_))));
    }
}
