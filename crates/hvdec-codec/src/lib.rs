//! # hvdec-codec
//!
//! hvdec HEVC 解码桥, 连接外部解码引擎与宿主管线.
//!
//! 本 crate 不实现 HEVC 解码本身, 只负责两侧的衔接:
//! - 解析带外配置记录, 在任何帧数据之前把参数集送入引擎
//! - 按长度前缀或起始码约定把输入数据块切分为 NAL 单元
//! - 推动引擎解码并把引擎警告转发给宿主
//! - 让引擎直接写入宿主输出缓冲区 (零拷贝), 不满足条件时回退到平面拷贝
//! - 引擎输出与宿主像素格式之间的映射以及输出协商
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hvdec_codec::{Decoder, DecoderSettings, HevcDecoder, Packet, SystemMemoryPipeline};
//!
//! let host = Arc::new(SystemMemoryPipeline::new());
//! let mut dec = HevcDecoder::new(DecoderSettings::default(), host, || my_engine())?;
//! dec.start()?;
//! if let Some(frame) = dec.handle_packet(&Packet::from_data(chunk))? {
//!     // frame.buffer 即宿主输出缓冲区
//! }
//! ```

pub mod codec_parameters;
pub mod decoder;
pub mod decoders;
pub mod engine;
pub mod frame;
pub mod host;
pub mod packet;
pub mod parsers;

// 重导出常用类型
pub use codec_parameters::{CodecParameters, StreamFormatHint};
pub use decoder::Decoder;
pub use decoders::hevc::{DecoderSettings, EngineFactory, HevcDecoder, StreamMode};
pub use engine::{
    BufferAllocation, BufferRelease, DecodeEngine, DecodeStatus, DecodedPicture, EngineFault,
    PictureAllocator, PictureSlot, PictureSpec, PlaneBinding, PlaneTag,
};
pub use frame::VideoFrame;
pub use host::{
    HostPipeline, MapFlags, MappedFrame, OutputBuffer, OutputState, SystemBuffer,
    SystemMemoryPipeline,
};
pub use packet::Packet;
