//! 图像头解析.
//!
//! 只取打包与装配阶段需要的两个字段: temporal_reference 和
//! picture_coding_type, 其后的 vbv_delay 等字段不做解码.

use std::fmt;

use liu_core::BitReader;

use crate::error::ParseError;
use crate::start_code;

/// 图像编码类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictureType {
    /// 帧内编码 (关键帧)
    I,
    /// 前向预测编码
    P,
    /// 双向预测编码
    B,
    /// DC 帧内编码 (仅 MPEG-1)
    D,
}

impl PictureType {
    /// 从 picture_coding_type 字段值识别
    ///
    /// 0 和大于 4 的值为保留值, 视为码流损坏.
    pub fn from_code(code: u32) -> Result<Self, ParseError> {
        match code {
            1 => Ok(PictureType::I),
            2 => Ok(PictureType::P),
            3 => Ok(PictureType::B),
            4 => Ok(PictureType::D),
            other => Err(ParseError::InvalidPictureType(other as u8)),
        }
    }

    /// 是否为关键帧 (I 帧)
    pub fn is_keyframe(&self) -> bool {
        matches!(self, PictureType::I)
    }
}

impl fmt::Display for PictureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            PictureType::I => 'I',
            PictureType::P => 'P',
            PictureType::B => 'B',
            PictureType::D => 'D',
        };
        write!(f, "{c}")
    }
}

/// 图像头信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictureHeader {
    /// 显示顺序号 (GOP 内, 10 位)
    pub temporal_reference: u16,
    /// 编码类型
    pub picture_type: PictureType,
}

/// 解析图像头
///
/// `data` 必须从 4 字节起始码 `00 00 01 00` 开始.
pub fn parse_picture_header(data: &[u8]) -> Result<PictureHeader, ParseError> {
    if data.len() < 4 {
        return Err(ParseError::TruncatedHeader("图像头起始码"));
    }
    if data[0..3] != [0x00, 0x00, 0x01] || data[3] != start_code::PICTURE_CODE {
        return Err(ParseError::InvalidStartCode {
            expected: start_code::PICTURE_CODE,
        });
    }

    let r = &mut BitReader::new(&data[4..]);
    let temporal_reference = r
        .read_bits(10)
        .map_err(|_| ParseError::TruncatedHeader("图像头"))? as u16;
    let code = r
        .read_bits(3)
        .map_err(|_| ParseError::TruncatedHeader("图像头"))?;
    let picture_type = PictureType::from_code(code)?;

    Ok(PictureHeader {
        temporal_reference,
        picture_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn picture_bytes(ty: u8) -> [u8; 8] {
        [0x00, 0x00, 0x01, 0x00, 0x00, (ty << 3) | 0x07, 0xFF, 0xF8]
    }

    #[test]
    fn test_parse_picture_types() {
        for (code, ty) in [
            (1u8, PictureType::I),
            (2, PictureType::P),
            (3, PictureType::B),
            (4, PictureType::D),
        ] {
            let hdr = parse_picture_header(&picture_bytes(code)).unwrap();
            assert_eq!(hdr.picture_type, ty);
            assert_eq!(hdr.temporal_reference, 0);
        }
    }

    #[test]
    fn test_temporal_reference() {
        // temporal_reference = 0x2A5 (10 位), 其后 I 帧
        let data = [0x00, 0x00, 0x01, 0x00, 0xA9, 0x4F, 0xFF, 0xF8];
        let hdr = parse_picture_header(&data).unwrap();
        assert_eq!(hdr.temporal_reference, 0x2A5);
        assert_eq!(hdr.picture_type, PictureType::I);
    }

    #[test]
    fn test_invalid_picture_type() {
        assert_eq!(
            parse_picture_header(&picture_bytes(0)),
            Err(ParseError::InvalidPictureType(0))
        );
        for code in 5..8 {
            assert_eq!(
                parse_picture_header(&picture_bytes(code)),
                Err(ParseError::InvalidPictureType(code))
            );
        }
    }

    #[test]
    fn test_truncated() {
        let data = picture_bytes(1);
        assert_eq!(
            parse_picture_header(&data[..5]),
            Err(ParseError::TruncatedHeader("图像头"))
        );
        assert_eq!(
            parse_picture_header(&data[..2]),
            Err(ParseError::TruncatedHeader("图像头起始码"))
        );
    }

    #[test]
    fn test_wrong_start_code() {
        let mut data = picture_bytes(1);
        data[3] = 0xB3;
        assert_eq!(
            parse_picture_header(&data),
            Err(ParseError::InvalidStartCode { expected: 0x00 })
        );
    }

    #[test]
    fn test_keyframe_and_display() {
        assert!(PictureType::I.is_keyframe());
        assert!(!PictureType::P.is_keyframe());
        assert_eq!(format!("{}", PictureType::B), "B");
    }
}
