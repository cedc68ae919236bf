//! # hvdec-scale
//!
//! hvdec 平面拷贝与位深转换库.
//!
//! 零拷贝不可用时, 解码出的平面需要复制到宿主单独分配的输出缓冲区,
//! 同时把每个平面的位深对齐到输出格式的存储位深:
//! - 位深相同: 逐行字节复制 (跨距与行宽一致时整块复制)
//! - 源位深更高: 16 位采样右移, 写 16 位或收窄到 8 位
//! - 源位深更低: 左移扩展到 16 位采样

pub mod convert;

pub use convert::{DepthConversion, PlaneInput, PlaneOutput, convert_plane};
