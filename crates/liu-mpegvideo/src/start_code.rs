//! MPEG-1/2 起始码扫描与分类.
//!
//! 起始码格式: `00 00 01 xx`, 其中 xx 标识后续结构的类型.
//!
//! [`StartCodeScanner`] 携带一个 32 位移位累加器, 支持跨块续扫:
//! 对同一字节流的任意切分方式 (包括在起始码内部切开), 扫描结果
//! 与对逻辑上拼接后的完整流一次性扫描完全一致.

/// 起始码前缀 `00 00 01` 的长度
pub const PREFIX_LEN: usize = 3;

/// 图像头起始码的类型字节
pub const PICTURE_CODE: u8 = 0x00;
/// 用户数据起始码的类型字节
pub const USER_DATA_CODE: u8 = 0xB2;
/// 序列头起始码的类型字节
pub const SEQUENCE_HEADER_CODE: u8 = 0xB3;
/// 序列错误起始码的类型字节
pub const SEQUENCE_ERROR_CODE: u8 = 0xB4;
/// 扩展起始码的类型字节
pub const EXTENSION_CODE: u8 = 0xB5;
/// 序列结束起始码的类型字节
pub const SEQUENCE_END_CODE: u8 = 0xB7;
/// GOP 头起始码的类型字节
pub const GOP_CODE: u8 = 0xB8;

/// MPEG-1/2 起始码类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartCode {
    /// 图像头 (0x00)
    Picture,
    /// 条带 (slice, 0x01-0xAF)
    Slice(u8),
    /// 用户数据 (0xB2)
    UserData,
    /// 序列头 (0xB3)
    SequenceHeader,
    /// 序列错误 (0xB4)
    SequenceError,
    /// 扩展 (0xB5)
    Extension,
    /// 序列结束 (0xB7)
    SequenceEnd,
    /// 图像组头 (GOP, 0xB8)
    Gop,
    /// 其他 (保留值或系统层起始码)
    Other(u8),
}

impl StartCode {
    /// 从类型字节识别起始码
    pub fn from_byte(code: u8) -> Self {
        match code {
            PICTURE_CODE => StartCode::Picture,
            0x01..=0xAF => StartCode::Slice(code),
            USER_DATA_CODE => StartCode::UserData,
            SEQUENCE_HEADER_CODE => StartCode::SequenceHeader,
            SEQUENCE_ERROR_CODE => StartCode::SequenceError,
            EXTENSION_CODE => StartCode::Extension,
            SEQUENCE_END_CODE => StartCode::SequenceEnd,
            GOP_CODE => StartCode::Gop,
            other => StartCode::Other(other),
        }
    }

    /// 是否为条带起始码
    pub fn is_slice(&self) -> bool {
        matches!(self, StartCode::Slice(_))
    }
}

/// 跨块起始码扫描器
///
/// 内部为一个 32 位移位累加器, 初值 `0xFFFF_FFFF`.
/// 逐字节移入数据, 当累加器高 3 字节为 `00 00 01` 时,
/// 当前字节即为类型字节.
#[derive(Debug)]
pub struct StartCodeScanner {
    acc: u32,
}

impl StartCodeScanner {
    /// 创建新的扫描器
    pub fn new() -> Self {
        Self { acc: 0xFFFF_FFFF }
    }

    /// 重置累加器 (流重置时调用)
    pub fn reset(&mut self) {
        self.acc = 0xFFFF_FFFF;
    }

    /// 在 `data` 中继续扫描, 返回下一个类型字节在 `data` 中的下标
    ///
    /// 未找到时返回 `None`, 累加器保留尾部字节, 下次调用从逻辑上
    /// 衔接的位置继续. 找到时累加器为 `0x000001xx`, 对 `data`
    /// 类型字节之后的剩余部分再次调用即可继续扫描.
    pub fn scan(&mut self, data: &[u8]) -> Option<usize> {
        let len = data.len();
        let mut i = 0;

        // 前 3 字节逐个移入累加器, 处理跨块前缀
        while i < len && i < PREFIX_LEN {
            self.acc = (self.acc << 8) | u32::from(data[i]);
            if self.acc & 0xFFFF_FF00 == 0x0000_0100 {
                return Some(i);
            }
            i += 1;
        }

        // 块内部分: 候选位置 i 的前缀完全落在本块中.
        // data[i-1] 大于 1 时, i、i+1、i+2 处都不可能是类型字节,
        // 可整跳 3 字节; 等于 1 时只需检查 i 本身.
        while i < len {
            let b = data[i - 1];
            if b > 1 {
                i += 3;
            } else if b == 1 {
                if data[i - 3] == 0 && data[i - 2] == 0 {
                    self.acc = 0x0000_0100 | u32::from(data[i]);
                    return Some(i);
                }
                i += 3;
            } else {
                i += 1;
            }
        }

        // 未找到: 重建累加器为末尾字节, 供下次调用衔接
        if len >= 4 {
            self.acc = u32::from_be_bytes([
                data[len - 4],
                data[len - 3],
                data[len - 2],
                data[len - 1],
            ]);
        }
        None
    }
}

impl Default for StartCodeScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// 在字节切片内查找任意起始码
///
/// 返回 (前缀 `00 00 01` 的起始下标, 类型字节).
pub fn find_any_start_code(data: &[u8]) -> Option<(usize, u8)> {
    if data.len() < 4 {
        return None;
    }
    (0..data.len() - 3)
        .find(|&i| data[i] == 0x00 && data[i + 1] == 0x00 && data[i + 2] == 0x01)
        .map(|i| (i, data[i + 3]))
}

/// 在字节切片内查找指定类型的起始码
///
/// 返回前缀 `00 00 01` 的起始下标.
pub fn find_start_code(data: &[u8], code: u8) -> Option<usize> {
    if data.len() < 4 {
        return None;
    }
    (0..data.len() - 3).find(|&i| {
        data[i] == 0x00 && data[i + 1] == 0x00 && data[i + 2] == 0x01 && data[i + 3] == code
    })
}
