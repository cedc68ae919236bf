//! # hvdec
//!
//! HEVC 解码桥: 把外部 HEVC 解码引擎接入宿主媒体管线.
//!
//! 解码桥负责引擎与宿主之间的全部衔接:
//! - **参数集注入**: 解析带外配置记录, 在帧数据之前送入参数集
//! - **NAL 解复用**: 长度前缀封装与起始码字节流两种码流约定
//! - **零拷贝输出**: 引擎直接解码到宿主输出缓冲区
//! - **格式转换**: 零拷贝不可用时逐平面拷贝并转换位深
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use hvdec::codec::{DecoderSettings, StreamMode};
//!
//! let settings = DecoderSettings {
//!     mode: StreamMode::Raw,
//!     ..DecoderSettings::default()
//! };
//! println!("工作线程: {}", settings.worker_threads());
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `hvdec-core` | 错误类型、像素格式、有理数 |
//! | `hvdec-codec` | 引擎/宿主契约、码流解析、HEVC 解码会话 |
//! | `hvdec-scale` | 平面拷贝与位深转换 |

pub mod config;
pub mod logging;

/// 核心类型与工具
pub use hvdec_core as core;

/// 解码桥
pub use hvdec_codec as codec;

/// 平面拷贝与位深转换
pub use hvdec_scale as scale;

pub use config::Config;

/// 获取 hvdec 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
