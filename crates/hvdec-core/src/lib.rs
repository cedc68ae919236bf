//! # hvdec-core
//!
//! hvdec 核心库, 提供基础类型定义、错误处理和工具函数.
//!
//! HEVC 解码桥各 crate 共用的底层设施: 统一错误类型、输出像素格式、
//! 色度布局、有理数 (帧率) 以及时间戳常量.

pub mod error;
pub mod pixel_format;
pub mod rational;
pub mod timestamp;

// 重导出常用类型
pub use error::{HvError, HvResult};
pub use pixel_format::{ChromaLayout, PixelFormat};
pub use rational::Rational;
pub use timestamp::NOPTS_VALUE;
