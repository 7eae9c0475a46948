//! 统一错误类型定义.
//!
//! 所有 Liu crate 共用的错误类型, 支持跨模块传播.

use thiserror::Error;

/// Liu 框架统一错误类型
#[derive(Debug, Error)]
pub enum LiuError {
    /// 无效参数 (调用方违反了接口约定)
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 已到达数据末尾
    #[error("已到达数据末尾")]
    Eof,
}

/// Liu 框架统一 Result 类型
pub type LiuResult<T> = Result<T, LiuError>;
