//! 输出像素格式解析.
//!
//! ```text
//! 单色                 8..=16 位  → gray8 (高位深由拷贝路径收窄)
//! 4:2:0/4:2:2/4:4:4    8 位       → 8 位平面格式
//!                      9..=16 位  → 10 位小端格式 (>10 位由拷贝路径截断)
//! 其他                            → 不支持
//! ```

use hvdec_core::{ChromaLayout, PixelFormat};

/// 按色度布局与统一位深选择输出格式
pub fn resolve_format(chroma: ChromaLayout, bit_depth: u32) -> Option<PixelFormat> {
    let high_depth = match bit_depth {
        8 => false,
        9..=16 => true,
        _ => return None,
    };
    let format = match (chroma, high_depth) {
        (ChromaLayout::Mono, _) => PixelFormat::Gray8,
        (ChromaLayout::Yuv420, false) => PixelFormat::Yuv420p,
        (ChromaLayout::Yuv420, true) => PixelFormat::Yuv420p10le,
        (ChromaLayout::Yuv422, false) => PixelFormat::Yuv422p,
        (ChromaLayout::Yuv422, true) => PixelFormat::Yuv422p10le,
        (ChromaLayout::Yuv444, false) => PixelFormat::Yuv444p,
        (ChromaLayout::Yuv444, true) => PixelFormat::Yuv444p10le,
    };
    Some(format)
}

/// 零拷贝是否可用: 格式存在且存储位深与图像位深完全一致
pub fn resolve_exact_format(chroma: ChromaLayout, bit_depth: u32) -> Option<PixelFormat> {
    resolve_format(chroma, bit_depth).filter(|format| format.bits_per_component() == bit_depth)
}
