//! 序列头解析.
//!
//! 从 `00 00 01 B3` 开始的字节片解码出 [`SequenceInfo`], 并继续
//! 解析紧随其后的扩展起始码 (仅 MPEG-2 码流存在), 将 profile /
//! level / 尺寸扩展位 / 码率扩展位 / 帧率扩展合并进记录.
//!
//! 任何一步数据不足都会使整次解析失败, 不产生部分结果.

use liu_core::{BitReader, Rational};
use log::trace;

use crate::error::ParseError;
use crate::start_code::{self, find_any_start_code};

/// 序列扩展的 extension_start_code_identifier
const EXT_ID_SEQUENCE: u32 = 1;

/// bit_rate_value 的逃逸值, 表示可变码率
const BIT_RATE_ESCAPE: u64 = 0x3FFFF;

/// 尺寸的合理范围下界 (像素)
const MIN_DIMENSION: u32 = 16;
/// 尺寸的合理范围上界 (像素)
const MAX_DIMENSION: u32 = 4096;

/// 序列级结构化元数据
///
/// 每解析到一个新的序列头块就重新计算一次, 与上一份逐字段比较,
/// 有差异时触发格式变更通知.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceInfo {
    /// MPEG 版本 (1 或 2, 取决于是否存在序列扩展)
    pub mpeg_version: u8,
    /// 图像宽度 (像素, 已合并扩展位)
    pub width: u32,
    /// 图像高度 (像素, 已合并扩展位)
    pub height: u32,
    /// 帧率
    pub fps: Rational,
    /// 像素宽高比
    pub pixel_aspect_ratio: Rational,
    /// 码率 (bits/s), 0 表示可变码率
    pub bit_rate: u64,
    /// Profile (仅 MPEG-2)
    pub profile: Option<u8>,
    /// Level (仅 MPEG-2)
    pub level: Option<u8>,
    /// 逐行序列 (MPEG-1 恒为 true)
    pub progressive: bool,
}

/// aspect_ratio_information 映射到像素宽高比
///
/// 码 0 按方像素处理, 沿用原实现的近似策略, 不视为错误.
fn par_from_code(code: u32) -> Rational {
    match code {
        2 => Rational::new(4, 3),
        3 => Rational::new(16, 9),
        4 => Rational::new(221, 100),
        _ => Rational::new(1, 1),
    }
}

/// frame_rate_code 映射到帧率
///
/// 码 1-8 为标准表; 其余 (0、9 及以上的保留值) 一律近似为
/// 30000/1001, 沿用原实现的策略.
fn fps_from_code(code: u32) -> Rational {
    match code {
        1 => Rational::new(24000, 1001),
        2 => Rational::new(24, 1),
        3 => Rational::new(25, 1),
        4 => Rational::new(30000, 1001),
        5 => Rational::new(30, 1),
        6 => Rational::new(50, 1),
        7 => Rational::new(60000, 1001),
        8 => Rational::new(60, 1),
        _ => Rational::new(30000, 1001),
    }
}

fn bits(r: &mut BitReader<'_>, n: u32, what: &'static str) -> Result<u32, ParseError> {
    r.read_bits(n).map_err(|_| ParseError::TruncatedHeader(what))
}

fn skip(r: &mut BitReader<'_>, n: u32, what: &'static str) -> Result<(), ParseError> {
    r.skip_bits(n).map_err(|_| ParseError::TruncatedHeader(what))
}

/// 解析序列头 (含紧随其后的序列扩展)
///
/// `data` 必须从 4 字节起始码 `00 00 01 B3` 开始, 以块尾为界.
pub fn parse_sequence_header(data: &[u8]) -> Result<SequenceInfo, ParseError> {
    if data.len() < 4 {
        return Err(ParseError::TruncatedHeader("序列头起始码"));
    }
    if data[0..3] != [0x00, 0x00, 0x01] || data[3] != start_code::SEQUENCE_HEADER_CODE {
        return Err(ParseError::InvalidStartCode {
            expected: start_code::SEQUENCE_HEADER_CODE,
        });
    }

    let r = &mut BitReader::new(&data[4..]);
    let mut width = bits(r, 12, "序列头")?;
    let mut height = bits(r, 12, "序列头")?;
    let pixel_aspect_ratio = par_from_code(bits(r, 4, "序列头")?);
    let mut fps = fps_from_code(bits(r, 4, "序列头")?);
    let mut bit_rate_value = u64::from(bits(r, 18, "序列头")?);
    skip(r, 1, "序列头")?; // marker_bit
    skip(r, 10, "序列头")?; // vbv_buffer_size_value
    skip(r, 1, "序列头")?; // constrained_parameters_flag

    // 可选的量化矩阵, 各由一个标志位引导
    if bits(r, 1, "序列头")? == 1 {
        skip(r, 64 * 8, "帧内量化矩阵")?;
    }
    if bits(r, 1, "序列头")? == 1 {
        skip(r, 64 * 8, "非帧内量化矩阵")?;
    }

    let mut info = SequenceInfo {
        mpeg_version: 1,
        width,
        height,
        fps,
        pixel_aspect_ratio,
        bit_rate: 0,
        profile: None,
        level: None,
        progressive: true,
    };

    // 序列头主体始终在字节边界结束, 其后可能跟随扩展起始码.
    // 扫描到缓冲区末尾或第一个非扩展起始码为止.
    let mut rest = &data[4 + r.byte_position()..];
    while let Some((pos, code)) = find_any_start_code(rest) {
        if code != start_code::EXTENSION_CODE {
            break;
        }
        let er = &mut BitReader::new(&rest[pos + 4..]);
        if bits(er, 4, "扩展头")? == EXT_ID_SEQUENCE {
            // 序列扩展: 存在即为 MPEG-2 码流
            let profile_level = bits(er, 8, "序列扩展")?;
            let progressive = bits(er, 1, "序列扩展")? == 1;
            skip(er, 2, "序列扩展")?; // chroma_format
            let h_ext = bits(er, 2, "序列扩展")?;
            let v_ext = bits(er, 2, "序列扩展")?;
            let bit_rate_ext = bits(er, 12, "序列扩展")?;
            skip(er, 1, "序列扩展")?; // marker_bit
            skip(er, 8, "序列扩展")?; // vbv_buffer_size_extension
            skip(er, 1, "序列扩展")?; // low_delay
            let fps_n_ext = bits(er, 2, "序列扩展")?;
            let fps_d_ext = bits(er, 5, "序列扩展")?;

            info.mpeg_version = 2;
            info.profile = Some(((profile_level >> 4) & 0x07) as u8);
            info.level = Some((profile_level & 0x0F) as u8);
            info.progressive = progressive;
            width |= h_ext << 12;
            height |= v_ext << 12;
            bit_rate_value |= u64::from(bit_rate_ext) << 18;
            fps = Rational::new(
                fps.num * (fps_n_ext as i32 + 1),
                fps.den * (fps_d_ext as i32 + 1),
            );
        }
        rest = &rest[pos + 4..];
    }

    info.width = width;
    info.height = height;
    info.fps = fps;
    // 逃逸值表示可变码率, 编码为 0; 否则单位为 400 bps
    info.bit_rate = if bit_rate_value == BIT_RATE_ESCAPE {
        0
    } else {
        bit_rate_value * 400
    };

    if !(MIN_DIMENSION..=MAX_DIMENSION).contains(&width)
        || !(MIN_DIMENSION..=MAX_DIMENSION).contains(&height)
    {
        return Err(ParseError::SequenceOutOfRange { width, height });
    }

    trace!(
        "序列头: {}x{} fps={} par={} bit_rate={} mpeg{}",
        info.width,
        info.height,
        info.fps,
        info.pixel_aspect_ratio,
        info.bit_rate,
        info.mpeg_version,
    );
    Ok(info)
}
