//! 打包器: 把任意切分的字节流重组为逻辑块.
//!
//! 每个逻辑块以同步起始码 (序列头 / GOP 头 / 图像头) 引导, 一直
//! 延伸到下一个同步起始码之前. 紧跟在 GOP 头后的第一个图像头并入
//! GOP 块, 不单独成块.
//!
//! 时间戳采用双槽进位: 每个输入块都刷新当前槽, 原有效值先推入
//! 备用槽. 图像起始码落在本输入块内时取当前槽, 否则说明起始码
//! 前缀跨越了输入块边界, 取备用槽. 取用即清空, 同一时间戳不会
//! 归属两个块.

use bytes::Bytes;
use liu_core::LiuResult;
use log::trace;

use crate::block::{BlockDescriptor, BlockFlags, BlockStore, BlockType};
use crate::start_code::{self, StartCode, StartCodeScanner};

/// 流打包器
#[derive(Debug, Default)]
pub struct Packetiser {
    scanner: StartCodeScanner,
    store: BlockStore,
    /// 已送入的总字节数, 即下一输入块的起始偏移
    total_offset: u64,
    /// 当前输入块的起始偏移
    chunk_offset: u64,
    current_pts: Option<u64>,
    previous_pts: Option<u64>,
    /// 最近一次遇到的同步起始码类型
    last_sync: Option<BlockType>,
}

impl Packetiser {
    /// 创建新的打包器
    pub fn new() -> Self {
        Self::default()
    }

    /// 送入一段字节, 扫描其中的起始码并推进块边界
    ///
    /// `pts` 为该段数据携带的显示时间戳 (若有). 返回错误仅在内部
    /// 偏移约定被破坏时发生, 正常输入不会触发.
    pub fn add_chunk(&mut self, data: &[u8], pts: Option<u64>) -> LiuResult<()> {
        self.chunk_offset = self.total_offset;
        // 当前槽有效则先进位, 之后无条件以本段时间戳覆盖:
        // 不带时间戳的输入段不得让图像继承更早段的时间戳
        if self.current_pts.is_some() {
            self.previous_pts = self.current_pts.take();
        }
        self.current_pts = pts;
        self.store.push_bytes(data);

        let mut local = 0;
        while let Some(pos) = self.scanner.scan(&data[local..]) {
            let type_pos = local + pos;
            let code = data[type_pos];
            // 起始码前缀可能跨越输入块边界, 块起点按绝对偏移回退
            let block_start =
                self.chunk_offset + type_pos as u64 - start_code::PREFIX_LEN as u64;
            self.dispatch(StartCode::from_byte(code), block_start)?;
            local = type_pos + 1;
        }

        self.total_offset += data.len() as u64;
        Ok(())
    }

    fn dispatch(&mut self, code: StartCode, block_start: u64) -> LiuResult<()> {
        match code {
            StartCode::SequenceHeader => {
                trace!("序列头 @ {block_start}");
                self.store.start_block(BlockType::Sequence, block_start)?;
                self.last_sync = Some(BlockType::Sequence);
            }
            StartCode::Gop => {
                trace!("GOP 头 @ {block_start}");
                self.store.start_block(BlockType::Gop, block_start)?;
                self.last_sync = Some(BlockType::Gop);
            }
            StartCode::Picture => {
                // 起始码落在本输入块内取当前槽, 跨边界取备用槽
                let pts = if block_start >= self.chunk_offset {
                    self.current_pts.take()
                } else {
                    self.previous_pts.take()
                };
                if self.last_sync == Some(BlockType::Gop) {
                    // GOP 后的第一个图像并入 GOP 块
                    self.store.append(BlockFlags::PICTURE);
                } else {
                    self.store.start_block(BlockType::Picture, block_start)?;
                }
                if let Some(p) = pts {
                    self.store.set_open_pts(p);
                }
                self.last_sync = Some(BlockType::Picture);
            }
            _ => {
                // 条带 / 扩展 / 用户数据等都归入当前打开的块
                self.store.append(BlockFlags::empty());
            }
        }
        Ok(())
    }

    /// 关闭当前打开的块 (流末尾或方向切换时调用)
    pub fn flush(&mut self) {
        self.store.complete(self.total_offset);
        self.last_sync = None;
    }

    /// 完全复位, 可立即处理全新的流
    pub fn reset(&mut self) {
        self.scanner.reset();
        self.store.clear();
        self.total_offset = 0;
        self.chunk_offset = 0;
        self.current_pts = None;
        self.previous_pts = None;
        self.last_sync = None;
    }

    /// 取出最老的已完成块
    pub fn next_block(&mut self) -> Option<(BlockDescriptor, Bytes)> {
        let block = self.store.peek_oldest()?;
        self.store.advance();
        Some(block)
    }

    /// 已完成且未取出的块数量
    pub fn pending_blocks(&self) -> usize {
        self.store.completed_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEQ: [u8; 12] = [
        0x00, 0x00, 0x01, 0xB3, 0x78, 0x04, 0x38, 0x13, 0xFF, 0xFF, 0xE0, 0x00,
    ];
    const GOP: [u8; 8] = [0x00, 0x00, 0x01, 0xB8, 0x00, 0x08, 0x00, 0x40];

    fn picture(ty: u8) -> [u8; 8] {
        [0x00, 0x00, 0x01, 0x00, 0x00, (ty << 3) | 0x07, 0xFF, 0xF8]
    }

    fn slice() -> [u8; 8] {
        [0x00, 0x00, 0x01, 0x01, 0x5A, 0x5A, 0x5A, 0x5A]
    }

    #[test]
    fn test_blocks_with_gop_merge() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&SEQ);
        stream.extend_from_slice(&GOP);
        stream.extend_from_slice(&picture(1));
        stream.extend_from_slice(&slice());

        let mut p = Packetiser::new();
        p.add_chunk(&stream, Some(1000)).unwrap();
        p.flush();

        let (desc, data) = p.next_block().unwrap();
        assert_eq!(desc.block_type, BlockType::Sequence);
        assert_eq!(desc.offset, 0);
        assert_eq!(&data[..], &SEQ);

        // GOP 与其后首个图像合并为一个块
        let (desc, data) = p.next_block().unwrap();
        assert_eq!(desc.block_type, BlockType::Gop);
        assert_eq!(desc.flags, BlockFlags::GOP | BlockFlags::PICTURE);
        assert_eq!(desc.offset, 12);
        assert_eq!(data.len(), GOP.len() + 16);
        assert_eq!(desc.pts, Some(1000));

        assert!(p.next_block().is_none());
    }

    #[test]
    fn test_picture_without_gop_starts_block() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&SEQ);
        stream.extend_from_slice(&picture(2));
        stream.extend_from_slice(&picture(3));

        let mut p = Packetiser::new();
        p.add_chunk(&stream, None).unwrap();
        p.flush();

        let (desc, _) = p.next_block().unwrap();
        assert_eq!(desc.block_type, BlockType::Sequence);
        let (desc, _) = p.next_block().unwrap();
        assert_eq!(desc.block_type, BlockType::Picture);
        assert_eq!(desc.flags, BlockFlags::PICTURE);
        let (desc, _) = p.next_block().unwrap();
        assert_eq!(desc.block_type, BlockType::Picture);
    }

    #[test]
    fn test_pts_carry_across_chunk_boundary() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&SEQ);
        stream.extend_from_slice(&picture(1));
        // 在图像起始码前缀中间切开: 前缀前 2 字节留在第一段
        let split = SEQ.len() + 2;

        let mut p = Packetiser::new();
        p.add_chunk(&stream[..split], Some(100)).unwrap();
        p.add_chunk(&stream[split..], Some(200)).unwrap();
        p.flush();

        let (_, _) = p.next_block().unwrap();
        let (desc, _) = p.next_block().unwrap();
        assert_eq!(desc.block_type, BlockType::Picture);
        // 起始码始于第一段内, 时间戳应取进位的旧值
        assert_eq!(desc.pts, Some(100));
    }

    #[test]
    fn test_pts_taken_from_current_chunk() {
        let mut p = Packetiser::new();
        p.add_chunk(&SEQ, Some(100)).unwrap();
        p.add_chunk(&picture(1), Some(200)).unwrap();
        p.flush();

        let (_, _) = p.next_block().unwrap();
        let (desc, _) = p.next_block().unwrap();
        assert_eq!(desc.pts, Some(200));
    }

    #[test]
    fn test_untimestamped_chunk_does_not_inherit_pts() {
        let mut p = Packetiser::new();
        p.add_chunk(&SEQ, Some(100)).unwrap();
        // 不带时间戳的输入段: 其中的图像不得继承前一段的时间戳
        p.add_chunk(&picture(1), None).unwrap();
        p.flush();

        let (desc, _) = p.next_block().unwrap();
        assert_eq!(desc.block_type, BlockType::Sequence);
        let (desc, _) = p.next_block().unwrap();
        assert_eq!(desc.block_type, BlockType::Picture);
        assert_eq!(desc.pts, None, "图像起始于本段之内, 只能取本段的时间戳");
    }

    #[test]
    fn test_pts_consumed_once() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&picture(1));
        stream.extend_from_slice(&picture(2));

        let mut p = Packetiser::new();
        p.add_chunk(&stream, Some(500)).unwrap();
        p.flush();

        let (desc, _) = p.next_block().unwrap();
        assert_eq!(desc.pts, Some(500));
        // 第二个图像不能重复取同一时间戳
        let (desc, _) = p.next_block().unwrap();
        assert_eq!(desc.pts, None);
    }

    #[test]
    fn test_leading_garbage_ignored() {
        let mut stream = vec![0xAB, 0xCD, 0xEF];
        stream.extend_from_slice(&GOP);
        stream.extend_from_slice(&picture(1));

        let mut p = Packetiser::new();
        p.add_chunk(&stream, None).unwrap();
        p.flush();

        let (desc, data) = p.next_block().unwrap();
        assert_eq!(desc.offset, 3, "首个同步起始码之前的字节不属于任何块");
        assert_eq!(&data[..4], &[0x00, 0x00, 0x01, 0xB8]);
        assert!(p.next_block().is_none());
    }

    #[test]
    fn test_reset_then_fresh_stream() {
        let mut p = Packetiser::new();
        p.add_chunk(&SEQ, Some(7)).unwrap();
        p.reset();

        p.add_chunk(&GOP, None).unwrap();
        p.add_chunk(&picture(1), None).unwrap();
        p.flush();

        let (desc, _) = p.next_block().unwrap();
        assert_eq!(desc.offset, 0, "复位后偏移从 0 重新计数");
        assert_eq!(desc.block_type, BlockType::Gop);
        assert_eq!(desc.pts, None, "复位后不保留旧时间戳");
        assert!(p.next_block().is_none());
    }

    #[test]
    fn test_flush_clears_gop_merge_state() {
        let mut p = Packetiser::new();
        p.add_chunk(&GOP, None).unwrap();
        p.flush();
        assert!(p.next_block().is_some());

        // flush 之后的图像必须开启新块, 而不是并入已关闭的 GOP 块
        p.add_chunk(&picture(2), None).unwrap();
        p.flush();
        let (desc, _) = p.next_block().unwrap();
        assert_eq!(desc.block_type, BlockType::Picture);
    }
}
