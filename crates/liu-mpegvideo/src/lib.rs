//! # liu-mpegvideo
//!
//! Liu 多媒体框架 MPEG-1/2 视频基本流打包与解析库.
//!
//! 接收任意切分的字节流, 定位起始码并重组为以序列头 / GOP /
//! 图像头引导的逻辑输出块, 解析序列级元数据 (尺寸、帧率、宽高比、
//! 码率、profile/level), 并支持反向播放的块重排.
//!
//! ## 使用示例
//!
//! ```rust
//! use liu_mpegvideo::{StreamAssembler, StreamEvent};
//!
//! // 1920x1080 @ 25fps: 序列头 + GOP 头 + I 帧图像头
//! let mut stream = Vec::new();
//! stream.extend_from_slice(&[
//!     0x00, 0x00, 0x01, 0xB3, 0x78, 0x04, 0x38, 0x13, 0xFF, 0xFF, 0xE0, 0x00,
//! ]);
//! stream.extend_from_slice(&[0x00, 0x00, 0x01, 0xB8, 0x00, 0x08, 0x00, 0x40]);
//! stream.extend_from_slice(&[0x00, 0x00, 0x01, 0x00, 0x00, 0x0F, 0xFF, 0xF8]);
//!
//! let mut assembler = StreamAssembler::new();
//! assembler.push(&stream, Some(0), false)?;
//! assembler.end_of_stream();
//!
//! match assembler.pull_event() {
//!     Some(StreamEvent::FormatChanged(info)) => {
//!         assert_eq!((info.width, info.height), (1920, 1080));
//!     }
//!     other => panic!("期望格式变更事件, 得到 {other:?}"),
//! }
//! # Ok::<(), liu_mpegvideo::LiuError>(())
//! ```

pub mod assembler;
pub mod block;
pub mod error;
pub mod packetiser;
pub mod picture;
pub mod sequence;
pub mod start_code;

// 重导出常用类型
pub use assembler::{OutputBlock, StreamAssembler, StreamEvent};
pub use block::{BlockDescriptor, BlockFlags, BlockType};
pub use error::ParseError;
pub use packetiser::Packetiser;
pub use picture::{parse_picture_header, PictureHeader, PictureType};
pub use sequence::{parse_sequence_header, SequenceInfo};
pub use start_code::{StartCode, StartCodeScanner};

pub use liu_core::{LiuError, LiuResult, Rational};
