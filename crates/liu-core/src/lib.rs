//! # liu-core
//!
//! Liu 多媒体框架基础库, 提供各 crate 共用的基础设施:
//!
//! - [`error`]: 统一错误类型 [`LiuError`] 与 [`LiuResult`]
//! - [`bitreader`]: 大端位序的比特流读取器 [`BitReader`]
//! - [`rational`]: 有理数 [`Rational`], 用于帧率与宽高比

pub mod bitreader;
pub mod error;
pub mod rational;

pub use bitreader::BitReader;
pub use error::{LiuError, LiuResult};
pub use rational::Rational;
