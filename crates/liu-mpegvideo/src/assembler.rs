//! 流装配器: 打包器之上的输出层.
//!
//! 正向播放时把打包器产出的逻辑块直接转为输出块, 并在序列头变化
//! 时发出格式变更事件. 反向播放时维护 gather / decode 两条队列:
//! 输入段先逆序收集, 遇到不连续标记后逐段移入解码队列, 每找到
//! 一个关键帧就从关键帧起按时间线顺序冲刷一轮, 关键帧之前的字节
//! 不可解码, 予以丢弃.
//!
//! 解析错误在此层被吸收: 损坏的块被丢弃并记一条日志, 随后的输出
//! 块带上不连续标记, 不向调用方传播错误.

use std::collections::VecDeque;

use bytes::Bytes;
use liu_core::LiuResult;
use log::{debug, warn};

use crate::block::BlockFlags;
use crate::error::ParseError;
use crate::packetiser::Packetiser;
use crate::picture::{parse_picture_header, PictureType};
use crate::sequence::{parse_sequence_header, SequenceInfo};
use crate::start_code::{self, find_start_code};

/// 装配完成的输出块
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputBlock {
    /// 块数据 (字节与输入流逐字节一致)
    pub data: Bytes,
    /// 显示时间戳
    pub pts: Option<u64>,
    /// 是否含关键帧 (I 帧)
    pub is_keyframe: bool,
    /// 与上一输出块之间是否存在数据缺口
    pub discontinuous: bool,
}

/// 装配器对外的事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// 序列级元数据发生变化 (含首次确定)
    FormatChanged(SequenceInfo),
    /// 一个输出块
    Block(OutputBlock),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// 尚未见到可解析的序列头, 所有非序列块被丢弃
    NoSequenceYet,
    /// 正常输出
    Streaming,
}

/// 反向队列中的一段输入
#[derive(Debug)]
struct ReverseChunk {
    data: Bytes,
    pts: Option<u64>,
}

/// 跨段滑动的 6 字节关键帧探测窗口
///
/// 匹配 `00 00 01 00` 图像起始码且 picture_coding_type 为 I 帧.
/// 窗口逐字节推进, 可跨越 decode 队列的段边界.
#[derive(Debug)]
struct KeyframeWindow {
    buf: [u8; 6],
    filled: usize,
}

impl KeyframeWindow {
    fn new() -> Self {
        Self {
            buf: [0; 6],
            filled: 0,
        }
    }

    fn push(&mut self, byte: u8) {
        self.buf.rotate_left(1);
        self.buf[5] = byte;
        if self.filled < 6 {
            self.filled += 1;
        }
    }

    fn is_intra_picture(&self) -> bool {
        self.filled == 6
            && self.buf[0..4] == [0x00, 0x00, 0x01, 0x00]
            && (self.buf[5] >> 3) & 0x07 == 1
    }
}

/// 流装配器
#[derive(Debug)]
pub struct StreamAssembler {
    packetiser: Packetiser,
    state: State,
    seq_info: Option<SequenceInfo>,
    forward: bool,
    /// 下一输出块需带不连续标记 (输入标记或内部丢块所致)
    pending_discont: bool,
    /// 反向模式: 逆序收集队列, 队首为最新一段
    gather: VecDeque<ReverseChunk>,
    /// 反向模式: 待输出队列, 队首为时间线上最早一段
    decode: VecDeque<ReverseChunk>,
    events: VecDeque<StreamEvent>,
}

impl StreamAssembler {
    /// 创建正向播放的装配器
    pub fn new() -> Self {
        Self {
            packetiser: Packetiser::new(),
            state: State::NoSequenceYet,
            seq_info: None,
            forward: true,
            pending_discont: false,
            gather: VecDeque::new(),
            decode: VecDeque::new(),
            events: VecDeque::new(),
        }
    }

    /// 当前已知的序列级元数据
    pub fn sequence_info(&self) -> Option<&SequenceInfo> {
        self.seq_info.as_ref()
    }

    /// 送入一段输入
    ///
    /// `discont` 表示本段与前一段之间存在缺口 (寻址、丢包或反向
    /// 播放的片段边界).
    pub fn push(&mut self, data: &[u8], pts: Option<u64>, discont: bool) -> LiuResult<()> {
        if self.forward {
            if discont {
                self.pending_discont = true;
            }
            self.packetiser.add_chunk(data, pts)?;
            self.drain_forward();
        } else {
            if discont {
                self.process_gather();
            }
            self.gather.push_front(ReverseChunk {
                data: Bytes::copy_from_slice(data),
                pts,
            });
        }
        Ok(())
    }

    /// 取出下一个事件, 无事件时返回 `None`
    pub fn pull_event(&mut self) -> Option<StreamEvent> {
        self.events.pop_front()
    }

    /// 切换播放方向, 先按原方向冲刷未完成的数据
    pub fn set_direction(&mut self, forward: bool) {
        if forward == self.forward {
            return;
        }
        if self.forward {
            self.packetiser.flush();
            self.drain_forward();
            self.packetiser.reset();
        } else {
            self.flush_reverse();
        }
        self.forward = forward;
        self.pending_discont = true;
    }

    /// 流结束: 冲刷所有滞留数据
    ///
    /// 反向模式下即使未确认关键帧也尽力输出剩余段.
    pub fn end_of_stream(&mut self) {
        if self.forward {
            self.packetiser.flush();
            self.drain_forward();
        } else {
            self.flush_reverse();
        }
    }

    /// 完全复位, 可立即处理全新的流
    ///
    /// 元数据一并清空, 新流的首个序列头会再次触发格式变更事件.
    pub fn reset(&mut self) {
        self.packetiser.reset();
        self.state = State::NoSequenceYet;
        self.seq_info = None;
        self.pending_discont = false;
        self.gather.clear();
        self.decode.clear();
        self.events.clear();
    }

    fn drain_forward(&mut self) {
        while let Some((desc, data)) = self.packetiser.next_block() {
            let mut is_keyframe = false;

            if desc.flags.contains(BlockFlags::SEQUENCE) {
                match parse_sequence_header(&data) {
                    Ok(info) => {
                        self.update_sequence_info(info);
                        self.state = State::Streaming;
                    }
                    Err(e) => {
                        // 沿用上一份有效元数据, 丢弃本块
                        warn!("序列头解析失败, 丢弃块: {e}");
                        self.pending_discont = true;
                        continue;
                    }
                }
            }

            if self.state == State::NoSequenceYet {
                debug!("尚未见到序列头, 丢弃 {} 字节", data.len());
                self.pending_discont = true;
                continue;
            }

            if desc.flags.contains(BlockFlags::PICTURE) {
                match block_picture_type(&data) {
                    Ok(ty) => is_keyframe = ty.is_keyframe(),
                    Err(e) => {
                        warn!("图像头解析失败, 丢弃块: {e}");
                        self.pending_discont = true;
                        continue;
                    }
                }
            }

            self.events.push_back(StreamEvent::Block(OutputBlock {
                data,
                pts: desc.pts,
                is_keyframe,
                discontinuous: std::mem::take(&mut self.pending_discont),
            }));
        }
    }

    fn update_sequence_info(&mut self, info: SequenceInfo) {
        if self.seq_info.as_ref() != Some(&info) {
            debug!(
                "格式变更: {}x{} fps={} mpeg{}",
                info.width, info.height, info.fps, info.mpeg_version
            );
            self.seq_info = Some(info.clone());
            self.events.push_back(StreamEvent::FormatChanged(info));
        }
    }

    /// 把收集队列逐段移入解码队列, 每找到一个关键帧就冲刷一轮
    ///
    /// 收集队列队首为最新一段, 逐个前插后解码队列恢复时间线顺序.
    /// 一批收集数据可能产出多个冲刷轮次, 各轮的首块都带不连续标记.
    fn process_gather(&mut self) {
        while let Some(chunk) = self.gather.pop_front() {
            self.decode.push_front(chunk);
            if let Some(k) = self.scan_decode_keyframe() {
                if k > 0 {
                    debug!("关键帧前 {k} 字节不可解码, 丢弃");
                    self.discard_decode_prefix(k);
                }
                self.flush_decode();
            }
        }
    }

    /// 在解码队列首段中查找 I 帧图像起始码, 返回段内字节偏移
    ///
    /// 滑动窗口可越过首段末尾, 最多再取后续段的 5 个字节,
    /// 因此命中的起始位置必然落在首段之内.
    fn scan_decode_keyframe(&self) -> Option<usize> {
        let first = self.decode.front()?;
        let mut window = KeyframeWindow::new();
        let mut pos = 0usize;
        for &byte in first.data.iter() {
            window.push(byte);
            pos += 1;
            if window.is_intra_picture() {
                return Some(pos - 6);
            }
        }
        let mut lookahead = 0;
        for chunk in self.decode.iter().skip(1) {
            for &byte in chunk.data.iter() {
                if lookahead == 5 {
                    return None;
                }
                window.push(byte);
                pos += 1;
                lookahead += 1;
                if window.is_intra_picture() {
                    return Some(pos - 6);
                }
            }
        }
        None
    }

    /// 丢弃解码队列拼接流的前 `k` 个字节
    fn discard_decode_prefix(&mut self, mut k: usize) {
        while k > 0 {
            let Some(front) = self.decode.front_mut() else {
                return;
            };
            if front.data.len() <= k {
                k -= front.data.len();
                self.decode.pop_front();
            } else {
                front.data = front.data.slice(k..);
                k = 0;
            }
        }
    }

    /// 按时间线顺序输出解码队列, 首段带不连续标记
    fn flush_decode(&mut self) {
        let mut first = true;
        while let Some(chunk) = self.decode.pop_front() {
            if let Some(pos) = find_start_code(&chunk.data, start_code::SEQUENCE_HEADER_CODE) {
                if let Ok(info) = parse_sequence_header(&chunk.data[pos..]) {
                    self.update_sequence_info(info);
                }
            }
            let is_keyframe = block_picture_type(&chunk.data)
                .map(|ty| ty.is_keyframe())
                .unwrap_or(false);
            self.events.push_back(StreamEvent::Block(OutputBlock {
                data: chunk.data,
                pts: chunk.pts,
                is_keyframe,
                discontinuous: std::mem::take(&mut self.pending_discont) || first,
            }));
            first = false;
        }
    }

    fn flush_reverse(&mut self) {
        self.process_gather();
        if !self.decode.is_empty() {
            debug!("未确认关键帧, 尽力输出剩余 {} 段", self.decode.len());
            self.flush_decode();
        }
    }
}

impl Default for StreamAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// 在块内定位图像起始码并解出编码类型
fn block_picture_type(data: &[u8]) -> Result<PictureType, ParseError> {
    let pos = find_start_code(data, start_code::PICTURE_CODE)
        .ok_or(ParseError::TruncatedHeader("图像头起始码"))?;
    parse_picture_header(&data[pos..]).map(|h| h.picture_type)
}
