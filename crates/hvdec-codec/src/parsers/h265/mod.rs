//! H.265/HEVC 码流解析器.
//!
//! 提供解码桥需要的码流层能力:
//! - NAL 单元类型识别 (2 字节 NAL 头)
//! - 长度前缀 (packetized) 码流的 NAL 切分
//! - 起始码 (Annex B) 码流的 NAL 切分
//! - HEVCDecoderConfigurationRecord 解析
//!
//! # HEVC NAL 头部 (2 字节)
//! ```text
//! ┌────────────────────────────────────────────┐
//! │ forbidden(1) | type(6) | layer_id(6) | tid(3) │
//! └────────────────────────────────────────────┘
//! ```

pub mod config_record;
pub mod nal;

pub use config_record::{ConfigurationRecord, ParameterSetArray};
pub use nal::{
    HevcNalUnitType, LengthPrefixedNals, NalHeader, NalUnit, StartCodeNals,
    append_length_prefixed, read_length_prefix, split_length_prefixed, starts_with_start_code,
};
