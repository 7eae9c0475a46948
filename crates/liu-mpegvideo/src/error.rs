//! 解析级错误类型.
//!
//! 与 `liu_core::LiuError` 的分工: 解析错误在流装配器内部被吸收,
//! 只表现为丢弃或延迟的输出块 (外加一条日志), 不会作为硬错误
//! 传播给调用方; 只有接口约定被违反时才会向调用方返回 `LiuError`.

use thiserror::Error;

/// 码流头部解析错误
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// 数据未以期望的起始码开头
    #[error("起始码不匹配: 期望 0x{expected:02X}, 实际为其他")]
    InvalidStartCode {
        /// 期望的类型字节
        expected: u8,
    },

    /// 已识别起始码, 但后续字节不足以完成头部解码
    #[error("头部被截断: {0}")]
    TruncatedHeader(&'static str),

    /// picture_coding_type 为保留值 (0 或大于 4), 视为码流损坏
    #[error("无效的图像编码类型: {0}")]
    InvalidPictureType(u8),

    /// 序列头声明的尺寸超出合理范围 [16, 4096]
    #[error("序列尺寸超出范围: {width}x{height}")]
    SequenceOutOfRange {
        /// 声明的宽度
        width: u32,
        /// 声明的高度
        height: u32,
    },
}
