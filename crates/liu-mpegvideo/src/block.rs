//! 块描述符与块存储.
//!
//! 打包器把字节流切分成以同步起始码 (序列头 / GOP / 图像) 引导的
//! 逻辑块. [`BlockStore`] 保存已完成块的描述符队列和一条字节积累
//! 队列, 字节在首次被取用时才从积累队列中惰性切出.

use std::collections::VecDeque;

use bytes::{Buf, Bytes, BytesMut};
use liu_core::{LiuError, LiuResult};

bitflags::bitflags! {
    /// 块内容标志, 记录块中出现过哪些头部
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BlockFlags: u32 {
        /// 含序列头
        const SEQUENCE = 1 << 0;
        /// 含 GOP 头
        const GOP = 1 << 1;
        /// 含图像头
        const PICTURE = 1 << 2;
    }
}

/// 块的引导类型 (块内第一个同步起始码)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    /// 以序列头引导
    Sequence,
    /// 以 GOP 头引导
    Gop,
    /// 以图像头引导
    Picture,
}

impl BlockType {
    /// 对应的内容标志
    pub fn flag(self) -> BlockFlags {
        match self {
            BlockType::Sequence => BlockFlags::SEQUENCE,
            BlockType::Gop => BlockFlags::GOP,
            BlockType::Picture => BlockFlags::PICTURE,
        }
    }
}

/// 块描述符
///
/// `offset` 是块在整个输入流中的绝对字节偏移, 同一存储内严格递增.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDescriptor {
    /// 引导类型
    pub block_type: BlockType,
    /// 内容标志 (合并块会累积多个标志)
    pub flags: BlockFlags,
    /// 流内绝对字节偏移
    pub offset: u64,
    /// 块长度 (关闭时确定)
    pub length: u32,
    /// 归属的显示时间戳
    pub pts: Option<u64>,
}

/// 已完成块: 描述符加惰性切出的数据
#[derive(Debug)]
struct StoredBlock {
    desc: BlockDescriptor,
    data: Option<Bytes>,
}

/// 块存储
///
/// 同一时刻至多一个打开的块; 块只会被后续的 [`BlockStore::start_block`]
/// 或 [`BlockStore::complete`] 关闭. 积累队列以 `origin` 记录队首
/// 字节对应的流偏移, 块偏移之前的残余字节在取数据时被丢弃.
#[derive(Debug, Default)]
pub struct BlockStore {
    completed: VecDeque<StoredBlock>,
    open: Option<BlockDescriptor>,
    queue: BytesMut,
    origin: u64,
}

impl BlockStore {
    /// 创建空存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 向积累队列追加字节
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.queue.extend_from_slice(data);
    }

    /// 在 `offset` 处开启一个新块, 同时关闭当前打开的块
    ///
    /// `offset` 不大于打开块的偏移属于接口约定违反, 返回错误且
    /// 不改变任何状态.
    pub fn start_block(&mut self, block_type: BlockType, offset: u64) -> LiuResult<()> {
        if let Some(mut open) = self.open.take() {
            if offset <= open.offset {
                self.open = Some(open);
                return Err(LiuError::InvalidArgument(format!(
                    "块偏移未递增: {offset} <= 打开块的偏移"
                )));
            }
            open.length = (offset - open.offset) as u32;
            self.completed.push_back(StoredBlock {
                desc: open,
                data: None,
            });
        }
        self.open = Some(BlockDescriptor {
            block_type,
            flags: block_type.flag(),
            offset,
            length: 0,
            pts: None,
        });
        Ok(())
    }

    /// 向打开的块并入内容标志
    ///
    /// 没有打开的块时为空操作 (首个同步起始码之前的内容).
    pub fn append(&mut self, flags: BlockFlags) {
        if let Some(open) = &mut self.open {
            open.flags |= flags;
        }
    }

    /// 流末尾处关闭打开的块
    pub fn complete(&mut self, end_offset: u64) {
        if let Some(mut open) = self.open.take() {
            if end_offset <= open.offset {
                // 零长度块不可能由合法输入产生, 直接丢弃
                return;
            }
            open.length = (end_offset - open.offset) as u32;
            self.completed.push_back(StoredBlock {
                desc: open,
                data: None,
            });
        }
    }

    /// 为打开的块设置时间戳, 仅在尚未设置时生效
    pub fn set_open_pts(&mut self, pts: u64) {
        if let Some(open) = &mut self.open {
            if open.pts.is_none() {
                open.pts = Some(pts);
            }
        }
    }

    /// 查看最老的已完成块
    ///
    /// 首次查看时从积累队列切出块数据 (块偏移之前的残余字节被
    /// 丢弃); 数据不足时返回 `None`. 重复查看返回同一份数据.
    pub fn peek_oldest(&mut self) -> Option<(BlockDescriptor, Bytes)> {
        let block = self.completed.front_mut()?;
        if block.data.is_none() {
            let skip = (block.desc.offset - self.origin) as usize;
            let length = block.desc.length as usize;
            if self.queue.len() < skip + length {
                return None;
            }
            if skip > 0 {
                self.queue.advance(skip);
                self.origin += skip as u64;
            }
            block.data = Some(self.queue.split_to(length).freeze());
            self.origin += length as u64;
        }
        Some((block.desc.clone(), block.data.clone()?))
    }

    /// 丢弃最老的已完成块
    pub fn advance(&mut self) {
        self.completed.pop_front();
    }

    /// 已完成块的数量
    pub fn completed_len(&self) -> usize {
        self.completed.len()
    }

    /// 是否存在打开的块
    pub fn has_open(&self) -> bool {
        self.open.is_some()
    }

    /// 完全复位
    pub fn clear(&mut self) {
        self.completed.clear();
        self.open = None;
        self.queue.clear();
        self.origin = 0;
    }
}
